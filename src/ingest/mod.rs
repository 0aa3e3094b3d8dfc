use crate::error::{ExtractError, FetchError, IngestionError};
use crate::models::{Snapshot, SnapshotEntry};
use crate::scrapers::extractor::OddsExtractor;
use crate::scrapers::fetcher::PageFetcher;
use crate::scrapers::normalizer;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// First retry delay; doubles per attempt
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// How much fetched markup to log when the extractor reports drift
const DRIFT_SAMPLE_BYTES: usize = 600;

/// Observable cache lifecycle: EMPTY -> REFRESHING -> READY -> STALE -> ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Refreshing,
    Ready,
    Stale,
}

/// Holds the latest normalized snapshot and orchestrates refreshes.
///
/// The snapshot is the one piece of shared mutable state in the process.
/// Refreshes are serialized through `refresh_gate`: concurrent callers that
/// find the snapshot stale queue on the gate and re-check freshness once
/// they hold it, so an in-flight scrape is shared instead of duplicated;
/// browser sessions are far too slow to waste on duplicate work.
pub struct OddsCache {
    fetcher: Arc<dyn PageFetcher>,
    extractor: OddsExtractor,
    fetch_retries: u32,
    retry_backoff: Duration,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    refresh_gate: Mutex<()>,
}

impl OddsCache {
    pub fn new(fetcher: Arc<dyn PageFetcher>, extractor: OddsExtractor, fetch_retries: u32) -> Self {
        Self {
            fetcher,
            extractor,
            fetch_retries: fetch_retries.max(1),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            snapshot: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Shrink the backoff so failure-path tests don't sit in real sleeps
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Return the current snapshot, refreshing first if it is older than
    /// `max_age`. A failed refresh falls back to the previous snapshot when
    /// one exists; `NeverPopulated` is reserved for the case where nothing
    /// has ever been captured and a fresh attempt also failed.
    pub async fn get_snapshot(&self, max_age: Duration) -> Result<Arc<Snapshot>, IngestionError> {
        if let Some(snapshot) = self.fresh_snapshot(max_age).await {
            return Ok(snapshot);
        }

        let _gate = self.refresh_gate.lock().await;
        // Whoever held the gate before us may have just installed a fresh
        // snapshot; take it instead of scraping again
        if let Some(snapshot) = self.fresh_snapshot(max_age).await {
            return Ok(snapshot);
        }

        match self.refresh().await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                let previous = self.snapshot.read().await.clone();
                match previous {
                    Some(stale) => {
                        // STALE, not EMPTY: a transient failure must not
                        // blank data we already have
                        tracing::warn!("refresh failed, serving stale snapshot: {}", err);
                        Ok(stale)
                    }
                    None => {
                        tracing::error!("refresh failed with no snapshot to fall back on: {}", err);
                        Err(IngestionError::NeverPopulated {
                            source: Box::new(err),
                        })
                    }
                }
            }
        }
    }

    /// Current lifecycle state, for logging and the health surface
    pub async fn state(&self, max_age: Duration) -> CacheState {
        if self.refresh_gate.try_lock().is_err() {
            return CacheState::Refreshing;
        }
        match self.fresh_snapshot(max_age).await {
            Some(_) => CacheState::Ready,
            None if self.snapshot.read().await.is_some() => CacheState::Stale,
            None => CacheState::Empty,
        }
    }

    async fn fresh_snapshot(&self, max_age: Duration) -> Option<Arc<Snapshot>> {
        let guard = self.snapshot.read().await;
        let snapshot = guard.as_ref()?;
        let age = (Utc::now() - snapshot.captured_at).to_std().ok()?;
        (age <= max_age).then(|| Arc::clone(snapshot))
    }

    /// Run one full Fetch -> Extract -> Normalize pass and install the result.
    /// Only the fetch step is retried: site load and network hiccups are
    /// transient, a broken selector set is not.
    async fn refresh(&self) -> Result<Arc<Snapshot>, IngestionError> {
        let html = self.fetch_with_retries().await?;

        let raw_records = self.extractor.extract(&html).map_err(|err| {
            log_extract_failure(&err, &html);
            IngestionError::Extraction { source: err }
        })?;

        let captured_at = Utc::now();
        let batch = normalizer::normalize(raw_records, captured_at);
        let snapshot = Arc::new(Snapshot {
            captured_at,
            entries: batch
                .pairs
                .into_iter()
                .map(|(fixture, odds)| SnapshotEntry { fixture, odds })
                .collect(),
            rejected: batch.rejected,
        });

        tracing::info!(
            "snapshot refreshed: {} fixtures, {} rejected",
            snapshot.entries.len(),
            snapshot.rejected
        );

        *self.snapshot.write().await = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn fetch_with_retries(&self) -> Result<String, IngestionError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetcher.fetch_page().await {
                Ok(html) => return Ok(html),
                Err(err) if attempt < self.fetch_retries => {
                    let backoff = self.retry_backoff * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        "fetch attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        self.fetch_retries,
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return Err(upstream_unavailable(attempt, err));
                }
            }
        }
    }
}

fn upstream_unavailable(attempts: u32, source: FetchError) -> IngestionError {
    IngestionError::UpstreamUnavailable { attempts, source }
}

fn log_extract_failure(err: &ExtractError, html: &str) {
    // A markup sample is the only way to diagnose drift after the fact
    let sample: String = html.chars().take(DRIFT_SAMPLE_BYTES).collect();
    tracing::error!("extraction failed ({}); markup sample: {}", err, sample);
}
