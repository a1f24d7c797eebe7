pub mod local;

use std::fmt;
use std::path::Path;

/// Errors that can occur during embedding.
#[derive(Debug)]
pub enum EmbedError {
    /// Failed to load or initialize the embedding model.
    ModelLoad(String),
    /// The model could not turn the image into a vector (undecodable image,
    /// inference failure).
    EncodingFailed(String),
    /// The image file could not be read.
    Io(String),
}

impl fmt::Display for EmbedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoad(msg) => write!(f, "model load error: {msg}"),
            Self::EncodingFailed(msg) => write!(f, "encoding failed: {msg}"),
            Self::Io(msg) => write!(f, "failed to read image: {msg}"),
        }
    }
}

impl std::error::Error for EmbedError {}

/// Trait abstracting image-to-vector embedding.
///
/// Implementations are synchronous and may take a long time per call; async
/// callers run them on the blocking pool.
pub trait ImageEmbedder: Send + Sync {
    /// Embed one encoded image (JPEG, PNG, ...) into a vector.
    fn embed_bytes(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError>;

    /// Embed an image stored on disk.
    fn embed_file(&self, path: &Path) -> Result<Vec<f32>, EmbedError> {
        let bytes = std::fs::read(path)
            .map_err(|e| EmbedError::Io(format!("{}: {e}", path.display())))?;
        self.embed_bytes(&bytes)
    }

    /// Dimensionality of the output vectors.
    fn dimensions(&self) -> usize;

    /// Model identifier string.
    fn model_name(&self) -> &str;

    /// Provider type identifier (e.g., "local", "mock").
    fn provider_type(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{InFlight, Staged, StagedImage};
    use crate::testutil::{PNG_SIGNATURE, SniffingEmbedder};

    #[test]
    fn staged_upload_file_is_decoded_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let png = [PNG_SIGNATURE, b"pixels".as_slice()].concat();
        let staged = StagedImage::stage(&png, Some(dir.path()), &InFlight::default()).unwrap();
        let Staged::Disk(path) = &staged.staged else {
            panic!("expected disk staging");
        };
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("upload"));

        assert_eq!(SniffingEmbedder.embed_file(path).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn catalog_file_without_extension_is_decoded_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face");
        std::fs::write(&path, [PNG_SIGNATURE, b"pixels".as_slice()].concat()).unwrap();
        assert_eq!(SniffingEmbedder.embed_file(&path).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SniffingEmbedder
            .embed_file(Path::new("/nonexistent/bachpan/face.jpg"))
            .unwrap_err();
        assert!(matches!(err, EmbedError::Io(_)), "got {err}");
    }
}
