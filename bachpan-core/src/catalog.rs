//! Reference catalog: the known images a query is matched against.

use std::path::PathBuf;

use crate::config::CatalogConfig;

/// Where a catalog image's bytes come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Read from disk when the reference set is built.
    Path(PathBuf),
    /// Already in memory.
    Bytes(Vec<u8>),
}

/// One image of the reference catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub identifier: String,
    pub source: ImageSource,
}

impl CatalogItem {
    /// A file-backed item identified by its path as written.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            identifier: path.display().to_string(),
            source: ImageSource::Path(path),
        }
    }

    pub fn from_bytes(identifier: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            identifier: identifier.into(),
            source: ImageSource::Bytes(bytes),
        }
    }
}

/// Resolve the configured catalog into items.
///
/// Explicit `images` come first in configured order, followed by the
/// directory scan sorted by file name. Files are not opened here; unreadable
/// images surface later in the build report.
pub fn resolve(config: &CatalogConfig) -> Result<Vec<CatalogItem>, String> {
    let mut items: Vec<CatalogItem> = config
        .images
        .iter()
        .map(|p| CatalogItem::from_path(p.clone()))
        .collect();

    if let Some(dir) = &config.directory {
        let read_dir = std::fs::read_dir(dir).map_err(|e| {
            format!("failed to read catalog directory '{}': {e}", dir.display())
        })?;
        let mut found = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| {
                format!("failed to read catalog directory '{}': {e}", dir.display())
            })?;
            let path = entry.path();
            if path.is_file() && has_extension(&path, &config.extensions) {
                found.push(path);
            }
        }
        found.sort();
        items.extend(found.into_iter().map(CatalogItem::from_path));
    }

    Ok(items)
}

fn has_extension(path: &std::path::Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}
