use std::sync::Mutex;

use fastembed::{ImageEmbedding, ImageEmbeddingModel, ImageInitOptions};

use super::{EmbedError, ImageEmbedder};

const DEFAULT_MODEL: ImageEmbeddingModel = ImageEmbeddingModel::ClipVitB32;
const DEFAULT_DIMENSIONS: usize = 512;
pub const MODEL_NAME: &str = "clip-vit-b32";

/// Local image embedding provider using fastembed with ONNX runtime.
///
/// Runs the CLIP ViT-B/32 vision tower; the model files are downloaded on
/// first use and cached by fastembed.
///
/// Files go through the trait's `embed_file`, which reads the bytes and
/// decodes by content. Staged uploads and catalog paths carry no reliable
/// extension.
pub struct LocalImageEmbedder {
    model: Mutex<ImageEmbedding>,
}

impl LocalImageEmbedder {
    pub fn new() -> Result<Self, EmbedError> {
        let options = ImageInitOptions::new(DEFAULT_MODEL).with_show_download_progress(true);
        let model = ImageEmbedding::try_new(options)
            .map_err(|e| EmbedError::ModelLoad(e.to_string()))?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }

    fn single(mut vectors: Vec<Vec<f32>>) -> Result<Vec<f32>, EmbedError> {
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            n => Err(EmbedError::EncodingFailed(format!(
                "expected 1 embedding vector, got {n}"
            ))),
        }
    }
}

impl ImageEmbedder for LocalImageEmbedder {
    fn embed_bytes(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| EmbedError::EncodingFailed("embedding model lock poisoned".into()))?;
        let vectors = model
            .embed_bytes(&[image], None)
            .map_err(|e| EmbedError::EncodingFailed(e.to_string()))?;
        Self::single(vectors)
    }

    fn dimensions(&self) -> usize {
        DEFAULT_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn provider_type(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::LazyLock;

    use super::*;

    /// Shared model instance across all tests to avoid parallel download races
    /// and redundant model loads.
    static EMBEDDER: LazyLock<LocalImageEmbedder> =
        LazyLock::new(|| LocalImageEmbedder::new().unwrap());

    #[test]
    #[ignore = "downloads the CLIP model"]
    fn undecodable_bytes_fail_to_encode() {
        let err = EMBEDDER.embed_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, EmbedError::EncodingFailed(_)), "got {err}");
    }

    #[test]
    #[ignore = "downloads the CLIP model"]
    fn missing_file_is_io_error() {
        let err = EMBEDDER
            .embed_file(Path::new("/nonexistent/bachpan/face.jpg"))
            .unwrap_err();
        assert!(matches!(err, EmbedError::Io(_)), "got {err}");
    }

    #[test]
    #[ignore = "downloads the CLIP model"]
    fn provider_reports_512_dimensions() {
        assert_eq!(EMBEDDER.dimensions(), 512);
        assert_eq!(EMBEDDER.provider_type(), "local");
    }
}
