//! The reference set: known images and their embeddings.
//!
//! A `ReferenceSet` is built once from a catalog and never mutated afterwards.
//! Growing the set produces a new snapshot via [`ReferenceSet::extend`]; the
//! service swaps snapshots atomically so readers never see a partial set.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogItem, ImageSource};
use crate::embedding::{EmbedError, ImageEmbedder};
use crate::error::MatchError;
use crate::similarity;

/// A known image and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEntry {
    pub identifier: String,
    pub embedding: Vec<f32>,
}

/// Why a catalog entry was left out of the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Unreadable { message: String },
    EmbeddingFailed { message: String },
    DimensionMismatch { expected: usize, got: usize },
    DegenerateVector,
    DuplicateIdentifier,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable { message } => write!(f, "unreadable: {message}"),
            Self::EmbeddingFailed { message } => write!(f, "embedding failed: {message}"),
            Self::DimensionMismatch { expected, got } => {
                write!(f, "dimension mismatch: expected {expected}, got {got}")
            }
            Self::DegenerateVector => write!(f, "embedding has zero magnitude"),
            Self::DuplicateIdentifier => write!(f, "duplicate identifier"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildFailure {
    pub identifier: String,
    pub reason: FailureReason,
}

/// Outcome of a build: what was loaded and what was excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub built_at: DateTime<Utc>,
    /// Catalog items considered in this build.
    pub total: usize,
    /// Entries in the resulting set.
    pub loaded: usize,
    pub failures: Vec<BuildFailure>,
}

impl BuildReport {
    /// True when at least one catalog entry was excluded.
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failure_for(&self, identifier: &str) -> Option<&FailureReason> {
        self.failures
            .iter()
            .find(|f| f.identifier == identifier)
            .map(|f| &f.reason)
    }
}

/// Immutable collection of reference embeddings sharing one dimension.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    entries: Vec<ReferenceEntry>,
    index: HashMap<String, usize>,
    dimensions: usize,
}

impl ReferenceSet {
    /// A set with nothing to compare against.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Embed every catalog item and collect the usable ones.
    ///
    /// Individual failures are recorded in the report and never abort the
    /// build. Fails only when the catalog is empty or nothing is usable.
    pub fn build(
        catalog: impl IntoIterator<Item = CatalogItem>,
        embedder: &dyn ImageEmbedder,
    ) -> Result<(Self, BuildReport), MatchError> {
        let mut builder = Builder::new(expected_dimensions(embedder));
        builder.embed_all(catalog, embedder);
        builder.finish()
    }

    /// Build a new snapshot holding the current entries plus `catalog`.
    ///
    /// `self` is left untouched. New items whose identifier already exists
    /// are rejected as duplicates.
    pub fn extend(
        &self,
        catalog: impl IntoIterator<Item = CatalogItem>,
        embedder: &dyn ImageEmbedder,
    ) -> Result<(Self, BuildReport), MatchError> {
        let mut builder = Builder::seeded(self, expected_dimensions(embedder));
        builder.embed_all(catalog, embedder);
        builder.finish()
    }

    /// Build a set from precomputed embeddings, applying the same rules as
    /// [`ReferenceSet::build`].
    pub fn from_entries(
        entries: impl IntoIterator<Item = ReferenceEntry>,
    ) -> Result<(Self, BuildReport), MatchError> {
        let mut builder = Builder::new(None);
        for entry in entries {
            builder.total += 1;
            if builder.claim(&entry.identifier) {
                builder.admit(entry.identifier, entry.embedding);
            }
        }
        builder.finish()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension shared by every entry; 0 for an empty set.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn get(&self, identifier: &str) -> Option<&ReferenceEntry> {
        self.index.get(identifier).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }
}

fn expected_dimensions(embedder: &dyn ImageEmbedder) -> Option<usize> {
    Some(embedder.dimensions()).filter(|&d| d > 0)
}

struct Builder {
    entries: Vec<ReferenceEntry>,
    seen: HashSet<String>,
    dimensions: Option<usize>,
    failures: Vec<BuildFailure>,
    total: usize,
}

impl Builder {
    fn new(dimensions: Option<usize>) -> Self {
        Self {
            entries: Vec::new(),
            seen: HashSet::new(),
            dimensions,
            failures: Vec::new(),
            total: 0,
        }
    }

    fn seeded(existing: &ReferenceSet, dimensions: Option<usize>) -> Self {
        let mut builder = Self::new(dimensions);
        if !existing.is_empty() {
            builder.dimensions = Some(existing.dimensions);
        }
        builder.entries = existing.entries.clone();
        builder.seen = existing.index.keys().cloned().collect();
        builder
    }

    fn embed_all(
        &mut self,
        catalog: impl IntoIterator<Item = CatalogItem>,
        embedder: &dyn ImageEmbedder,
    ) {
        for item in catalog {
            self.total += 1;
            if !self.claim(&item.identifier) {
                continue;
            }
            let result = match &item.source {
                ImageSource::Path(path) => embedder.embed_file(path),
                ImageSource::Bytes(bytes) => embedder.embed_bytes(bytes),
            };
            match result {
                Ok(embedding) => self.admit(item.identifier, embedding),
                Err(EmbedError::Io(message)) => {
                    self.fail(item.identifier, FailureReason::Unreadable { message })
                }
                Err(e) => self.fail(
                    item.identifier,
                    FailureReason::EmbeddingFailed {
                        message: e.to_string(),
                    },
                ),
            }
        }
    }

    /// Reserve an identifier; later occurrences are rejected as duplicates.
    fn claim(&mut self, identifier: &str) -> bool {
        if self.seen.insert(identifier.to_string()) {
            true
        } else {
            self.fail(identifier.to_string(), FailureReason::DuplicateIdentifier);
            false
        }
    }

    fn admit(&mut self, identifier: String, embedding: Vec<f32>) {
        if similarity::is_degenerate(&embedding) {
            self.fail(identifier, FailureReason::DegenerateVector);
            return;
        }
        match self.dimensions {
            Some(expected) if expected != embedding.len() => {
                self.fail(
                    identifier,
                    FailureReason::DimensionMismatch {
                        expected,
                        got: embedding.len(),
                    },
                );
            }
            _ => {
                self.dimensions = Some(embedding.len());
                self.entries.push(ReferenceEntry {
                    identifier,
                    embedding,
                });
            }
        }
    }

    fn fail(&mut self, identifier: String, reason: FailureReason) {
        log::warn!("excluding reference '{identifier}': {reason}");
        self.failures.push(BuildFailure { identifier, reason });
    }

    fn finish(self) -> Result<(ReferenceSet, BuildReport), MatchError> {
        if self.total == 0 {
            return Err(MatchError::BuildFailed("reference catalog is empty".into()));
        }
        if self.entries.is_empty() {
            return Err(MatchError::BuildFailed(format!(
                "none of the {} catalog entries produced a usable embedding",
                self.total
            )));
        }

        let index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.identifier.clone(), i))
            .collect();
        let set = ReferenceSet {
            dimensions: self.dimensions.unwrap_or(0),
            entries: self.entries,
            index,
        };
        let report = BuildReport {
            built_at: Utc::now(),
            total: self.total,
            loaded: set.len(),
            failures: self.failures,
        };
        log::info!(
            "reference set built: {} entries, {} excluded, {} dimensions",
            report.loaded,
            report.failures.len(),
            set.dimensions
        );
        Ok((set, report))
    }
}
