//! Ingestion pipeline: fetch → snapshot file → parse → publish
//!
//! Runs are serialized by an internal lock, so the snapshot file is never
//! written by two runs at once. A failed run leaves the catalog untouched.
//! Completion is published on a `watch` channel so the HTTP layer can gate
//! on readiness.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::services::catalog::Catalog;
use crate::services::fetcher::{FetchError, PlaylistFetcher};
use crate::services::m3u_parser::parse_playlist;
use crate::services::metrics::{CATALOG_CHANNELS, INGEST_RUNS};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to fetch playlist: {0}")]
    Fetch(#[from] FetchError),
    #[error("Failed to read snapshot {}: {source}", .path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the parsed bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Fresh download from the source URL
    Downloaded,
    /// Download failed; a snapshot left by an earlier process was used
    StaleSnapshot,
}

/// Outcome of the latest ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum IngestStatus {
    /// No run has finished yet
    Pending,
    #[serde(rename_all = "camelCase")]
    Ready {
        generation: u64,
        channels: usize,
        source: SnapshotSource,
    },
    /// The last run failed; `generation` is still being served
    #[serde(rename_all = "camelCase")]
    Failed { generation: u64, error: String },
}

impl IngestStatus {
    /// True once any run has finished, successfully or not
    pub fn is_settled(&self) -> bool {
        !matches!(self, IngestStatus::Pending)
    }
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub generation: u64,
    pub channels: usize,
    pub dropped_entries: usize,
    pub snapshot_bytes: usize,
    pub source: SnapshotSource,
}

pub struct Ingestor {
    fetcher: PlaylistFetcher,
    catalog: Arc<Catalog>,
    source_url: String,
    snapshot_path: PathBuf,
    snapshot_fallback: bool,
    run_lock: Mutex<()>,
    status_tx: watch::Sender<IngestStatus>,
}

impl Ingestor {
    pub fn new(config: &Config, catalog: Arc<Catalog>) -> Result<Self, IngestError> {
        let fetcher = PlaylistFetcher::from_config(config)?;
        let (status_tx, _) = watch::channel(IngestStatus::Pending);

        Ok(Self {
            fetcher,
            catalog,
            source_url: config.m3u_url.clone(),
            snapshot_path: config.snapshot_path.clone(),
            snapshot_fallback: config.snapshot_fallback,
            run_lock: Mutex::new(()),
            status_tx,
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn status(&self) -> IngestStatus {
        self.status_tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.status_tx.borrow().is_settled()
    }

    /// Receiver that observes every status change
    pub fn subscribe(&self) -> watch::Receiver<IngestStatus> {
        self.status_tx.subscribe()
    }

    /// Wait until the first run has finished
    pub async fn wait_ready(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so this only errors if `self` is gone
        let _ = rx.wait_for(IngestStatus::is_settled).await;
    }

    /// Start the first run in the background and return immediately
    pub fn spawn_initial(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            // Errors are logged and recorded in the status inside run_once
            let _ = self.run_once().await;
        })
    }

    /// Run the whole pipeline once and publish the result.
    pub async fn run_once(&self) -> Result<IngestReport, IngestError> {
        let _guard = self.run_lock.lock().await;
        tracing::info!("Ingesting playlist: {}", self.source_url);

        match self.ingest().await {
            Ok(report) => {
                let outcome = match report.source {
                    SnapshotSource::Downloaded => "success",
                    SnapshotSource::StaleSnapshot => "stale_snapshot",
                };
                INGEST_RUNS.with_label_values(&[outcome]).inc();
                CATALOG_CHANNELS.set(report.channels as i64);

                tracing::info!(
                    "Catalog ready: {} channels from {} bytes (generation {}, {} entries without URL dropped)",
                    report.channels,
                    report.snapshot_bytes,
                    report.generation,
                    report.dropped_entries
                );

                self.status_tx.send_replace(IngestStatus::Ready {
                    generation: report.generation,
                    channels: report.channels,
                    source: report.source,
                });
                Ok(report)
            }
            Err(err) => {
                INGEST_RUNS.with_label_values(&["failed"]).inc();
                let generation = self.catalog.generation();
                tracing::error!(
                    "Ingestion failed, keeping catalog generation {}: {}",
                    generation,
                    err
                );

                self.status_tx.send_replace(IngestStatus::Failed {
                    generation,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn ingest(&self) -> Result<IngestReport, IngestError> {
        let fetched = self
            .fetcher
            .fetch_to_file(&self.source_url, &self.snapshot_path)
            .await;

        let source = match fetched {
            Ok(fetch) => {
                tracing::info!(
                    "Playlist downloaded: {:.2} MB in {} ms ({} attempts)",
                    fetch.bytes as f64 / 1024.0 / 1024.0,
                    fetch.elapsed.as_millis(),
                    fetch.attempts
                );
                SnapshotSource::Downloaded
            }
            Err(err) => {
                if !self.can_use_stale_snapshot().await {
                    return Err(err.into());
                }
                tracing::warn!(
                    "Download failed ({}), loading previous snapshot {}",
                    err,
                    self.snapshot_path.display()
                );
                SnapshotSource::StaleSnapshot
            }
        };

        let raw = fs::read(&self.snapshot_path)
            .await
            .map_err(|source| IngestError::Snapshot {
                path: self.snapshot_path.clone(),
                source,
            })?;

        let text = String::from_utf8_lossy(&raw);
        let parsed = parse_playlist(&text);
        let channels = parsed.channels.len();
        let generation = self.catalog.replace(parsed.channels);

        Ok(IngestReport {
            generation,
            channels,
            dropped_entries: parsed.dropped_entries,
            snapshot_bytes: raw.len(),
            source,
        })
    }

    /// Only the first generation may come from a leftover snapshot
    async fn can_use_stale_snapshot(&self) -> bool {
        self.snapshot_fallback
            && self.catalog.generation() == 0
            && fs::try_exists(&self.snapshot_path).await.unwrap_or(false)
    }
}
