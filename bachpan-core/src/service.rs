//! The matching service: the public entry point for image queries.
//!
//! Owns the shared reference snapshot and its lifecycle:
//!
//! ```text
//! Uninitialized → Initializing → Ready | Degraded
//!                             ↘ Failed   (first build produced nothing)
//! ```
//!
//! The snapshot lives in an `ArcSwapOption`. Queries load it once and never
//! lock; builds run under a single-writer lock and publish a complete new
//! snapshot with one atomic store. Rebuilding is always explicit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use crate::catalog::CatalogItem;
use crate::embedding::ImageEmbedder;
use crate::error::MatchError;
use crate::rank::{top_k, MatchResult};
use crate::reference::{BuildReport, ReferenceSet};
use crate::similarity;
use crate::staging::{InFlight, Staged, StagedImage};

/// What a query does when the reference set is not built yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessMode {
    /// Wait for the build to finish (bounded by the request timeout).
    #[default]
    Block,
    /// Return `NotReady` immediately.
    FailFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    Ready,
    /// Usable, but some catalog entries were excluded.
    Degraded,
    Failed,
}

impl ServiceState {
    fn after_build(report: &BuildReport) -> Self {
        if report.is_degraded() {
            Self::Degraded
        } else {
            Self::Ready
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOptions {
    pub default_k: usize,
    pub readiness: ReadinessMode,
    pub timeout: Option<Duration>,
    pub upload_dir: Option<PathBuf>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            default_k: 5,
            readiness: ReadinessMode::Block,
            timeout: Some(Duration::from_secs(30)),
            upload_dir: None,
        }
    }
}

/// A built reference set together with the report of how it was built.
#[derive(Debug)]
pub struct Snapshot {
    pub set: ReferenceSet,
    pub report: BuildReport,
}

pub struct MatchService {
    embedder: Arc<dyn ImageEmbedder>,
    options: MatchOptions,
    snapshot: ArcSwapOption<Snapshot>,
    state: watch::Sender<ServiceState>,
    writer: Mutex<()>,
    in_flight: InFlight,
}

impl MatchService {
    pub fn new(embedder: Arc<dyn ImageEmbedder>, options: MatchOptions) -> Self {
        let (state, _) = watch::channel(ServiceState::Uninitialized);
        Self {
            embedder,
            options,
            snapshot: ArcSwapOption::empty(),
            state,
            writer: Mutex::new(()),
            in_flight: InFlight::default(),
        }
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    pub fn embedder(&self) -> &Arc<dyn ImageEmbedder> {
        &self.embedder
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    /// The current snapshot, if a build has completed.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }

    pub fn report(&self) -> Option<BuildReport> {
        self.snapshot().map(|s| s.report.clone())
    }

    /// Uploads currently staged by in-progress requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// First build of the reference set.
    ///
    /// Fails with `InvalidInput` if the service was already initialized;
    /// use [`MatchService::rebuild`] to replace the set.
    pub async fn initialize(&self, catalog: Vec<CatalogItem>) -> Result<BuildReport, MatchError> {
        let _writer = self.writer.try_lock().map_err(|_| MatchError::BuildInProgress)?;
        if self.snapshot.load().is_some() {
            return Err(MatchError::InvalidInput(
                "reference set is already initialized; use rebuild".into(),
            ));
        }
        self.replace(catalog).await
    }

    /// Explicit re-initialization from a fresh catalog.
    ///
    /// Queries keep using the previous snapshot until the new one is
    /// complete. On error the previous snapshot and state stay in place.
    pub async fn rebuild(&self, catalog: Vec<CatalogItem>) -> Result<BuildReport, MatchError> {
        let _writer = self.writer.try_lock().map_err(|_| MatchError::BuildInProgress)?;
        log::info!("rebuilding reference set from {} catalog items", catalog.len());
        self.replace(catalog).await
    }

    /// Add catalog items to the current set.
    ///
    /// Waits for any running build, then publishes a new snapshot holding the
    /// old entries plus the new ones. The returned report accumulates the
    /// failures of every build that contributed to the snapshot.
    pub async fn append(&self, catalog: Vec<CatalogItem>) -> Result<BuildReport, MatchError> {
        let _writer = self.writer.lock().await;
        let current = self.snapshot.load_full().ok_or(MatchError::NotReady)?;
        let embedder = Arc::clone(&self.embedder);
        let base = Arc::clone(&current);
        let (set, added) = tokio::task::spawn_blocking(move || {
            base.set.extend(catalog, embedder.as_ref())
        })
        .await
        .map_err(|e| MatchError::Internal(format!("reference build task failed: {e}")))??;

        let mut failures = current.report.failures.clone();
        failures.extend(added.failures);
        let report = BuildReport {
            built_at: added.built_at,
            total: current.report.total + added.total,
            loaded: set.len(),
            failures,
        };
        self.publish(set, report.clone());
        Ok(report)
    }

    /// Wait until a snapshot is available.
    ///
    /// Returns `NotReady` if the first build failed.
    pub async fn wait_ready(&self) -> Result<Arc<Snapshot>, MatchError> {
        let mut rx = self.state.subscribe();
        loop {
            // Read state before the snapshot: the writer stores the snapshot
            // first, so a usable state here guarantees the load succeeds.
            let state = *rx.borrow_and_update();
            if let Some(snapshot) = self.snapshot.load_full() {
                return Ok(snapshot);
            }
            if state == ServiceState::Failed {
                return Err(MatchError::NotReady);
            }
            if rx.changed().await.is_err() {
                return Err(MatchError::NotReady);
            }
        }
    }

    /// Match an image against the reference set using the configured timeout.
    pub async fn match_image(
        &self,
        image: &[u8],
        k: Option<usize>,
    ) -> Result<Vec<MatchResult>, MatchError> {
        self.match_image_with_timeout(image, k, self.options.timeout)
            .await
    }

    /// Match with an explicit deadline (`None` waits indefinitely).
    ///
    /// Dropping the returned future cancels the request; the staged upload is
    /// released either way.
    pub async fn match_image_with_timeout(
        &self,
        image: &[u8],
        k: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<Vec<MatchResult>, MatchError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_match(image, k))
                .await
                .map_err(|_| {
                    log::warn!("match request timed out after {limit:?}");
                    MatchError::TimedOut(limit)
                })?,
            None => self.run_match(image, k).await,
        }
    }

    async fn run_match(
        &self,
        image: &[u8],
        k: Option<usize>,
    ) -> Result<Vec<MatchResult>, MatchError> {
        let started = Instant::now();
        if image.is_empty() {
            return Err(MatchError::InvalidInput("image payload is empty".into()));
        }
        let k = self.resolve_k(k)?;
        let snapshot = self.current_snapshot().await?;

        let staged = self.stage_upload(image).await?;
        let query = self.embed_staged(&staged).await?;
        drop(staged);

        let expected = snapshot.set.dimensions();
        if expected > 0 && query.len() != expected {
            return Err(MatchError::EmbeddingFailed(format!(
                "query embedding has {} dimensions, reference set has {expected}",
                query.len()
            )));
        }
        if similarity::is_degenerate(&query) {
            return Err(MatchError::EmbeddingFailed(
                "query embedding has zero magnitude".into(),
            ));
        }

        let results = top_k(&query, &snapshot.set, k);
        log::debug!(
            "matched {} bytes against {} references: {} results in {:?}",
            image.len(),
            snapshot.set.len(),
            results.len(),
            started.elapsed()
        );
        Ok(results)
    }

    fn resolve_k(&self, k: Option<usize>) -> Result<usize, MatchError> {
        match k {
            None => Ok(self.options.default_k),
            Some(0) => Err(MatchError::InvalidInput(
                "k must be a positive integer".into(),
            )),
            Some(k) => Ok(k),
        }
    }

    async fn current_snapshot(&self) -> Result<Arc<Snapshot>, MatchError> {
        if let Some(snapshot) = self.snapshot.load_full() {
            return Ok(snapshot);
        }
        match self.options.readiness {
            ReadinessMode::FailFast => Err(MatchError::NotReady),
            ReadinessMode::Block => self.wait_ready().await,
        }
    }

    /// Disk staging runs on the blocking pool. If the request is dropped
    /// meanwhile, the finished `StagedImage` is dropped with the task output.
    async fn stage_upload(&self, image: &[u8]) -> Result<StagedImage, MatchError> {
        let Some(dir) = self.options.upload_dir.clone() else {
            return StagedImage::stage(image, None, &self.in_flight);
        };
        let image: Arc<[u8]> = Arc::from(image);
        let in_flight = self.in_flight.clone();
        tokio::task::spawn_blocking(move || StagedImage::stage(&image, Some(dir.as_path()), &in_flight))
            .await
            .map_err(|e| MatchError::Internal(format!("staging task failed: {e}")))?
    }

    async fn embed_staged(&self, staged: &StagedImage) -> Result<Vec<f32>, MatchError> {
        let embedder = Arc::clone(&self.embedder);
        let task = match &staged.staged {
            Staged::Memory(bytes) => {
                let bytes = Arc::clone(bytes);
                tokio::task::spawn_blocking(move || embedder.embed_bytes(&bytes))
            }
            Staged::Disk(path) => {
                let path = path.to_path_buf();
                tokio::task::spawn_blocking(move || embedder.embed_file(&path))
            }
        };
        task.await
            .map_err(|e| MatchError::Internal(format!("embedding task failed: {e}")))?
            .map_err(|e| {
                log::error!("query embedding failed: {e}");
                MatchError::EmbeddingFailed(e.to_string())
            })
    }

    /// Build a fresh set and publish it. Caller holds the writer lock.
    async fn replace(&self, catalog: Vec<CatalogItem>) -> Result<BuildReport, MatchError> {
        let first_build = self.snapshot.load().is_none();
        if first_build {
            self.set_state(ServiceState::Initializing);
        }

        let embedder = Arc::clone(&self.embedder);
        let built = tokio::task::spawn_blocking(move || {
            ReferenceSet::build(catalog, embedder.as_ref())
        })
        .await
        .map_err(|e| MatchError::Internal(format!("reference build task failed: {e}")))
        .and_then(|result| result);

        match built {
            Ok((set, report)) => {
                self.publish(set, report.clone());
                Ok(report)
            }
            Err(e) => {
                log::error!("reference set build failed: {e}");
                if first_build {
                    self.set_state(ServiceState::Failed);
                }
                Err(e)
            }
        }
    }

    fn publish(&self, set: ReferenceSet, report: BuildReport) {
        let state = ServiceState::after_build(&report);
        self.snapshot.store(Some(Arc::new(Snapshot { set, report })));
        self.set_state(state);
    }

    fn set_state(&self, next: ServiceState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            log::info!("match service state: {previous:?} -> {next:?}");
        }
    }
}
