//! Per-task sync orchestration
//!
//! One run claims the task, detects new releases, appends their tracks to
//! the destination playlist in chunks, records what was delivered in the
//! ledger and advances `last_run_at`. Failures are logged with the task
//! context and reported as an outcome; they never propagate to the caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::detector::{DetectedReleases, ReleaseDetector};
use super::processing::ProcessingTracker;
use crate::auth::CredentialProvider;
use crate::catalog::CatalogApi;
use crate::database::{LedgerStore, TaskStore};
use crate::error::RadarError;
use crate::models::{LedgerEntry, LedgerItemKind, WatchTask};
use crate::otel::Metrics;
use crate::sync::{RetryManager, TaskRunner};

/// Maximum number of URIs per playlist append request
pub const PLAYLIST_CHUNK_SIZE: usize = 100;

/// Result of one orchestrated run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Run finished; counts are zero when nothing new was released
    Completed { albums: usize, tracks_added: usize },
    /// Run aborted; the message carries the error
    Failed(String),
    /// Another run of the same task holds the claim
    AlreadyRunning,
}

impl RunOutcome {
    /// Label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::Failed(_) => "failed",
            RunOutcome::AlreadyRunning => "skipped",
        }
    }

    pub fn tracks_added(&self) -> usize {
        match self {
            RunOutcome::Completed { tracks_added, .. } => *tracks_added,
            _ => 0,
        }
    }
}

/// Runs watch tasks end to end
pub struct SyncOrchestrator {
    detector: ReleaseDetector,
    tasks: Arc<dyn TaskStore>,
    ledger: Arc<dyn LedgerStore>,
    credentials: Arc<dyn CredentialProvider>,
    catalog: Arc<dyn CatalogApi>,
    retry: RetryManager,
    processing: ProcessingTracker,
    metrics: Option<Arc<Metrics>>,
    chunk_size: usize,
}

impl SyncOrchestrator {
    pub fn new(
        detector: ReleaseDetector,
        tasks: Arc<dyn TaskStore>,
        ledger: Arc<dyn LedgerStore>,
        credentials: Arc<dyn CredentialProvider>,
        catalog: Arc<dyn CatalogApi>,
        retry: RetryManager,
    ) -> Self {
        Self {
            detector,
            tasks,
            ledger,
            credentials,
            catalog,
            retry,
            processing: ProcessingTracker::new(),
            metrics: None,
            chunk_size: PLAYLIST_CHUNK_SIZE,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Whether a run of the task is currently in flight
    pub fn is_processing(&self, task_id: i64) -> bool {
        self.processing.is_processing(task_id)
    }

    /// Shared handle on the processing claims
    pub fn tracker(&self) -> ProcessingTracker {
        self.processing.clone()
    }

    /// Run one task
    pub async fn run(&self, task_id: i64) -> RunOutcome {
        let Some(_claim) = self.processing.try_claim(task_id) else {
            warn!(task_id, "Task is already being processed, skipping");
            self.record_metrics(&RunOutcome::AlreadyRunning, Instant::now());
            return RunOutcome::AlreadyRunning;
        };

        let started = Instant::now();

        let task = match self.tasks.find_by_id(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(task_id, "Task not found");
                let outcome = RunOutcome::Failed(RadarError::TaskNotFound(task_id).to_string());
                self.record_metrics(&outcome, started);
                return outcome;
            }
            Err(e) => {
                error!(task_id, error = %e, "Failed to load task");
                let outcome = RunOutcome::Failed(RadarError::from(e).to_string());
                self.record_metrics(&outcome, started);
                return outcome;
            }
        };

        let outcome = match self.sync_task(&task).await {
            Ok(outcome) => {
                info!(
                    task_id,
                    user_id = %task.user_id,
                    playlist_id = task.playlist_id.as_deref().unwrap_or_default(),
                    added_tracks = outcome.tracks_added(),
                    "Task executed successfully"
                );
                outcome
            }
            Err(e) => {
                error!(
                    task_id,
                    user_id = %task.user_id,
                    playlist_id = task.playlist_id.as_deref().unwrap_or_default(),
                    error = %e,
                    "Failed to execute task"
                );
                RunOutcome::Failed(e.to_string())
            }
        };

        if let Err(e) = self.tasks.update_last_run_at(task_id, Utc::now()).await {
            error!(task_id, error = %e, "Failed to update last run time");
        }

        self.record_metrics(&outcome, started);
        outcome
    }

    async fn sync_task(&self, task: &WatchTask) -> Result<RunOutcome, RadarError> {
        let task_id = task.id_or_default();
        let playlist_id = task
            .playlist_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(RadarError::MissingDestination(task_id))?;

        let detected = self.detector.detect_task(task).await?;
        if detected.is_empty() {
            return Ok(RunOutcome::Completed {
                albums: 0,
                tracks_added: 0,
            });
        }

        if !detected.tracks.is_empty() {
            let bearer = self.credentials.valid_bearer_for(&task.user_id).await?;
            let uris: Vec<String> = detected.tracks.iter().map(|t| t.uri.clone()).collect();
            self.append_tracks(&bearer, playlist_id, &uris).await?;
        }

        self.record_delivered(task_id, &detected).await?;

        Ok(RunOutcome::Completed {
            albums: detected.albums.len(),
            tracks_added: detected.tracks.len(),
        })
    }

    /// Append URIs in request-sized chunks, preserving order
    async fn append_tracks(
        &self,
        bearer: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), RadarError> {
        let catalog = &*self.catalog;

        for (index, chunk) in uris.chunks(self.chunk_size).enumerate() {
            self.retry
                .execute(|| catalog.append_to_playlist(bearer, playlist_id, chunk))
                .await?;
            debug!(playlist_id, chunk = index, size = chunk.len(), "Appended tracks");
        }

        Ok(())
    }

    async fn record_delivered(
        &self,
        task_id: i64,
        detected: &DetectedReleases,
    ) -> Result<(), RadarError> {
        let now = Utc::now();
        let candidates = detected
            .albums
            .iter()
            .map(|album| (LedgerItemKind::Album, album.id.as_str()))
            .chain(
                detected
                    .tracks
                    .iter()
                    .map(|track| (LedgerItemKind::Track, track.id.as_str())),
            );

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (kind, external_id) in candidates {
            if !seen.insert((kind, external_id)) {
                continue;
            }
            if self.ledger.exists(task_id, external_id, kind).await? {
                continue;
            }
            entries.push(LedgerEntry::new(task_id, external_id, kind, now));
        }

        if !entries.is_empty() {
            self.ledger.append(&entries).await?;
        }
        Ok(())
    }

    fn record_metrics(&self, outcome: &RunOutcome, started: Instant) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_task(
                outcome.label(),
                outcome.tracks_added() as u64,
                started.elapsed().as_secs_f64(),
            );
        }
    }
}

#[async_trait]
impl TaskRunner for SyncOrchestrator {
    async fn run_task(&self, task_id: i64) -> RunOutcome {
        self.run(task_id).await
    }
}
