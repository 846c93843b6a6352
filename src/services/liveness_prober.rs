//! Liveness Prober
//!
//! Checks channel stream URLs in fixed-size concurrent batches. A HEAD request
//! is tried first; anything short of a success answer is retried once as a
//! GET. Only one pass runs at a time and completed passes start a cooldown
//! window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ProbePolicy, ProberConfig};
use crate::errors::{ProbeError, ProbeResult};
use crate::models::{ChannelRecord, Liveness};
use crate::services::catalog::CatalogHandle;
use crate::services::stream_fetcher::{FetchResponse, StreamFetcher};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    pub probed: usize,
    pub reachable: usize,
    pub unreachable: usize,
}

impl ProbeSummary {
    fn record(&mut self, liveness: Liveness) {
        self.probed += 1;
        match liveness {
            Liveness::Reachable => self.reachable += 1,
            Liveness::Unreachable => self.unreachable += 1,
            Liveness::Unknown => {}
        }
    }
}

/// How a probe pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Completed(ProbeSummary),
    /// Another pass was in flight; nothing was probed
    AlreadyRunning,
    /// A pass completed recently; nothing was probed
    CoolingDown { remaining: Duration },
    /// Stopped between batches; records not reached are still `Unknown`
    Cancelled(ProbeSummary),
}

impl ProbeOutcome {
    pub fn summary(&self) -> Option<ProbeSummary> {
        match self {
            Self::Completed(summary) | Self::Cancelled(summary) => Some(*summary),
            _ => None,
        }
    }
}

/// Clears the in-progress flag when a pass ends, however it ends, and wakes
/// callers queued behind it
struct PassGuard<'a> {
    running: &'a AtomicBool,
    idle: &'a Notify,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

pub struct LivenessProber {
    fetcher: Arc<dyn StreamFetcher>,
    config: ProberConfig,
    running: AtomicBool,
    idle: Notify,
    last_completed: Mutex<Option<Instant>>,
}

impl LivenessProber {
    pub fn new(fetcher: Arc<dyn StreamFetcher>, config: ProberConfig) -> Self {
        Self {
            fetcher,
            config,
            running: AtomicBool::new(false),
            idle: Notify::new(),
            last_completed: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Probe every record in place, honouring the cooldown window
    pub async fn probe(&self, channels: &mut [ChannelRecord]) -> ProbeOutcome {
        self.run_pass(channels, false, &CancellationToken::new())
            .await
    }

    /// Probe every record in place, ignoring the cooldown window
    pub async fn force_probe(&self, channels: &mut [ChannelRecord]) -> ProbeOutcome {
        self.run_pass(channels, true, &CancellationToken::new())
            .await
    }

    /// Probe a snapshot of the catalog and write the results back by id
    pub async fn probe_catalog(&self, catalog: &CatalogHandle, force: bool) -> ProbeOutcome {
        self.probe_catalog_with_cancel(catalog, force, &CancellationToken::new())
            .await
    }

    /// Like [`Self::probe_catalog`], but a pass already in flight is waited
    /// out instead of reported as [`ProbeOutcome::AlreadyRunning`]. Results of
    /// that earlier pass belong to whatever the catalog held when it started.
    pub async fn probe_catalog_after_current(
        &self,
        catalog: &CatalogHandle,
        force: bool,
    ) -> ProbeOutcome {
        loop {
            // Registered before the attempt so a pass ending in between still wakes us
            let idle = self.idle.notified();
            match self.probe_catalog(catalog, force).await {
                ProbeOutcome::AlreadyRunning => {
                    debug!("Waiting for the running liveness pass to finish");
                    idle.await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Run [`Self::probe_catalog`] on a background task
    pub fn spawn_catalog_probe(self: &Arc<Self>, catalog: CatalogHandle, force: bool) -> ProbeTask {
        let token = CancellationToken::new();
        let prober = Arc::clone(self);
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            prober
                .probe_catalog_with_cancel(&catalog, force, &task_token)
                .await
        });
        ProbeTask { token, handle }
    }

    async fn probe_catalog_with_cancel(
        &self,
        catalog: &CatalogHandle,
        force: bool,
        token: &CancellationToken,
    ) -> ProbeOutcome {
        let mut snapshot = catalog.read().await.all().to_vec();
        // Start from a clean slate so only results from this pass are applied
        for channel in snapshot.iter_mut() {
            channel.liveness = Liveness::Unknown;
        }

        let outcome = self.run_pass(&mut snapshot, force, token).await;

        if outcome.summary().is_some() {
            let results: Vec<(Uuid, Liveness)> = snapshot
                .iter()
                .filter(|c| c.liveness != Liveness::Unknown)
                .map(|c| (c.id, c.liveness))
                .collect();
            let changed = catalog.write().await.apply_liveness(results);
            debug!("Applied liveness to catalog: {} records changed", changed);
        }
        outcome
    }

    async fn run_pass(
        &self,
        channels: &mut [ChannelRecord],
        force: bool,
        token: &CancellationToken,
    ) -> ProbeOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Liveness pass already in progress, skipping");
            return ProbeOutcome::AlreadyRunning;
        }
        let _guard = PassGuard {
            running: &self.running,
            idle: &self.idle,
        };

        if !force {
            if let Some(remaining) = self.cooldown_remaining() {
                debug!("Liveness pass skipped, cooling down for {:?}", remaining);
                return ProbeOutcome::CoolingDown { remaining };
            }
        }

        let batch_size = self.config.batch_size.max(1);
        info!(
            "Probing {} channels in batches of {}",
            channels.len(),
            batch_size
        );

        let mut summary = ProbeSummary::default();
        for (index, batch) in channels.chunks_mut(batch_size).enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(self.config.batch_pause) => {}
                }
            }
            if token.is_cancelled() {
                info!(
                    "Liveness pass cancelled after {} channels",
                    summary.probed
                );
                return ProbeOutcome::Cancelled(summary);
            }

            let results = join_all(batch.iter().map(|c| self.probe_url(&c.stream_url))).await;
            for (channel, liveness) in batch.iter_mut().zip(results) {
                debug!("Channel '{}' is {}", channel.name, liveness);
                channel.liveness = liveness;
                summary.record(liveness);
            }
        }

        self.mark_completed();
        info!(
            "Liveness pass complete: {} reachable, {} unreachable",
            summary.reachable, summary.unreachable
        );
        ProbeOutcome::Completed(summary)
    }

    async fn probe_url(&self, url: &str) -> Liveness {
        match self.attempt(url, false).await {
            Ok(_) => return Liveness::Reachable,
            Err(e) => debug!("HEAD probe failed for {}: {}, retrying with GET", url, e),
        }

        match self.attempt(url, true).await {
            Ok(_) => Liveness::Reachable,
            Err(ProbeError::Status { status }) => {
                debug!("GET probe for {} answered {}", url, status);
                Liveness::Unreachable
            }
            Err(e) => match self.config.policy {
                ProbePolicy::Lenient => {
                    warn!("Probe for {} inconclusive ({}), keeping channel listed", url, e);
                    Liveness::Reachable
                }
                ProbePolicy::Strict => {
                    debug!("Probe for {} failed: {}", url, e);
                    Liveness::Unreachable
                }
            },
        }
    }

    async fn attempt(&self, url: &str, use_get: bool) -> ProbeResult<FetchResponse> {
        let timeout = self.config.probe_timeout;
        let request = async {
            if use_get {
                self.fetcher.get(url).await
            } else {
                self.fetcher.head(url).await
            }
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| ProbeError::Timeout {
                url: url.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .and_then(FetchResponse::error_for_status)
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        let last = *self
            .last_completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        last.and_then(|at| self.config.cooldown.checked_sub(at.elapsed()))
            .filter(|remaining| !remaining.is_zero())
    }

    fn mark_completed(&self) {
        *self
            .last_completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
    }
}

/// A probe pass running on its own task
pub struct ProbeTask {
    token: CancellationToken,
    handle: JoinHandle<ProbeOutcome>,
}

impl ProbeTask {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the pass to end
    pub async fn join(self) -> ProbeOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Probe task ended abnormally: {}", e);
                ProbeOutcome::Cancelled(ProbeSummary::default())
            }
        }
    }
}
