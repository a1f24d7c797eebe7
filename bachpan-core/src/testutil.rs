//! Test doubles for the embedding layer, shared by the core and server tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::embedding::{EmbedError, ImageEmbedder};

/// Deterministic embedder backed by a table of image bytes → vector.
///
/// Unknown bytes fail with `EncodingFailed`, standing in for an image the
/// model cannot decode.
pub struct MockEmbedder {
    dimensions: usize,
    table: HashMap<Vec<u8>, Vec<f32>>,
    calls: AtomicUsize,
    files_seen: Mutex<Vec<PathBuf>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            table: HashMap::new(),
            calls: AtomicUsize::new(0),
            files_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_image(mut self, bytes: &[u8], embedding: Vec<f32>) -> Self {
        self.table.insert(bytes.to_vec(), embedding);
        self
    }

    /// Number of embed calls that reached the table lookup.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Paths passed to `embed_file`, in call order.
    pub fn files_seen(&self) -> Vec<PathBuf> {
        self.files_seen.lock().unwrap().clone()
    }
}

impl ImageEmbedder for MockEmbedder {
    fn embed_bytes(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table
            .get(image)
            .cloned()
            .ok_or_else(|| EmbedError::EncodingFailed("unsupported image format".into()))
    }

    fn embed_file(&self, path: &Path) -> Result<Vec<f32>, EmbedError> {
        self.files_seen.lock().unwrap().push(path.to_path_buf());
        let bytes = std::fs::read(path)
            .map_err(|e| EmbedError::Io(format!("{}: {e}", path.display())))?;
        self.embed_bytes(&bytes)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "test-embedder"
    }

    fn provider_type(&self) -> &str {
        "mock"
    }
}

/// Embedder whose every call fails.
pub struct FailingEmbedder {
    dimensions: usize,
}

impl FailingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl ImageEmbedder for FailingEmbedder {
    fn embed_bytes(&self, _image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::EncodingFailed("mock embedder failure".into()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "failing-embedder"
    }

    fn provider_type(&self) -> &str {
        "mock-failing"
    }
}

/// Wraps a `MockEmbedder` and sleeps before every call, simulating model
/// inference latency.
pub struct SlowEmbedder {
    inner: MockEmbedder,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(inner: MockEmbedder, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl ImageEmbedder for SlowEmbedder {
    fn embed_bytes(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        std::thread::sleep(self.delay);
        self.inner.embed_bytes(image)
    }

    fn embed_file(&self, path: &Path) -> Result<Vec<f32>, EmbedError> {
        std::thread::sleep(self.delay);
        self.inner.embed_file(path)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        "slow-embedder"
    }

    fn provider_type(&self) -> &str {
        "mock-slow"
    }
}

pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
pub const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Embedder that tells image formats apart by their leading bytes, the way
/// an image decoder sniffs content. It only implements `embed_bytes`, so
/// files reach it through the trait's default `embed_file`.
pub struct SniffingEmbedder;

impl ImageEmbedder for SniffingEmbedder {
    fn embed_bytes(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        if image.starts_with(PNG_SIGNATURE) {
            Ok(vec![1.0, 0.0])
        } else if image.starts_with(JPEG_SIGNATURE) {
            Ok(vec![0.0, 1.0])
        } else {
            Err(EmbedError::EncodingFailed("unrecognized image format".into()))
        }
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "sniffing-embedder"
    }

    fn provider_type(&self) -> &str {
        "mock"
    }
}

/// Number of entries left in `dir` (0 when the directory is missing).
pub fn dir_entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
}
