//! Request-scoped holding area for an uploaded query image.
//!
//! A `StagedImage` owns the upload for exactly one request. Dropping it (on
//! success, error, timeout, or when the request future is dropped) removes
//! the temp file and releases the in-flight slot.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempPath;

use crate::error::MatchError;

const UPLOAD_PREFIX: &str = "tmp_";
const UPLOAD_SUFFIX: &str = ".upload";

/// Counts staged uploads that are still alive.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(&self.0))
    }
}

#[derive(Debug)]
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub enum Staged {
    Memory(Arc<[u8]>),
    /// Deleted from disk when dropped.
    Disk(TempPath),
}

#[derive(Debug)]
pub struct StagedImage {
    pub staged: Staged,
    _slot: InFlightGuard,
}

impl StagedImage {
    /// Stage `image` in memory, or in a `tmp_*` file under `dir` when given.
    pub fn stage(image: &[u8], dir: Option<&Path>, in_flight: &InFlight) -> Result<Self, MatchError> {
        let slot = in_flight.acquire();
        let staged = match dir {
            None => Staged::Memory(Arc::from(image)),
            Some(dir) => Staged::Disk(write_temp(image, dir)?),
        };
        Ok(Self {
            staged,
            _slot: slot,
        })
    }
}

fn write_temp(image: &[u8], dir: &Path) -> Result<TempPath, MatchError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        MatchError::Internal(format!(
            "failed to create upload directory '{}': {e}",
            dir.display()
        ))
    })?;
    let mut file = tempfile::Builder::new()
        .prefix(UPLOAD_PREFIX)
        .suffix(UPLOAD_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| MatchError::Internal(format!("failed to stage upload: {e}")))?;
    file.write_all(image)
        .and_then(|()| file.flush())
        .map_err(|e| MatchError::Internal(format!("failed to stage upload: {e}")))?;
    Ok(file.into_temp_path())
}
