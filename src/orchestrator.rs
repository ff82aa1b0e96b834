//! Top-level coordinator of one bulk ingestion run.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::CatalogCache;
use crate::configuration::BulkProcessingConfiguration;
use crate::filter::SetFilterChain;
use crate::processor::{Collaborators, SetProcessor};
use crate::progress::{Progress, ProgressKind};
use crate::ratelimit::RateLimiter;
use crate::report::{RunReport, RunState, SetProcessingOutcome, SetStatus};
use crate::throttle::MemoryThrottle;
use crate::types::{CatalogSet, IngestError, RawPayload, SourceError};

pub struct BulkIngestionOrchestrator {
    collaborators: Collaborators,
    limiter: Arc<RateLimiter>,
    throttle: Option<MemoryThrottle>,
    progress: Progress,
}

/// Progress bookkeeping for the dispatch and drain phases.
struct Tally {
    total: usize,
    done: usize,
    last_item: String,
    last_emit: Option<Instant>,
}

impl BulkIngestionOrchestrator {
    pub fn new(collaborators: Collaborators, limiter: Arc<RateLimiter>) -> Self {
        Self {
            collaborators,
            limiter,
            throttle: None,
            progress: Progress::noop(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Consulted before each dispatch when the run enables memory throttling.
    pub fn with_throttle(mut self, throttle: MemoryThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Runs one ingestion. Only a failed manifest fetch is an error; every
    /// other problem, including cancellation, is itemized in the report.
    pub async fn run(
        &self,
        config: BulkProcessingConfiguration,
        cancel: &CancellationToken,
    ) -> Result<RunReport, IngestError> {
        let mut report = RunReport::new();
        log::info!("🚚 Starting ingestion run {}", report.run_id);

        report.transition(RunState::FetchingManifest);
        let manifest = match self.fetch_manifest(cancel).await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return Ok(self.finish(report, cancel, VecDeque::new())),
            Err(e) => {
                report.transition(RunState::FatalError);
                log::error!("❌ Manifest fetch failed, aborting run {}: {}", report.run_id, e);
                return Err(if e.is_unauthorized() {
                    IngestError::Unauthorized(e)
                } else {
                    IngestError::Manifest(e)
                });
            }
        };

        report.transition(RunState::Filtering);
        let selected = self.select_sets(&manifest, &config, &mut report);
        log::info!(
            "📚 {} of {} sets selected",
            selected.len(),
            report.sets_in_manifest
        );
        self.progress.progress(
            ProgressKind::Manifest,
            selected.len(),
            report.sets_in_manifest,
            "selected",
            "sets",
        );

        let cache = self.load_cache(&config, cancel, &mut report).await;

        report.transition(RunState::Dispatching);
        if cancel.is_cancelled() {
            return Ok(self.finish(report, cancel, selected));
        }

        let cadence = config.refresh_cadence;
        let throttle = self
            .throttle
            .as_ref()
            .filter(|_| config.memory_throttling)
            .cloned();
        let workers = config.workers.max(1);
        let processor = Arc::new(SetProcessor::new(
            self.collaborators.clone(),
            self.limiter.clone(),
            Arc::new(cache),
            self.progress.clone(),
            Arc::new(config),
        ));

        let mut pending = selected;
        let mut tally = Tally {
            total: pending.len(),
            done: 0,
            last_item: String::new(),
            last_emit: None,
        };
        let mut in_flight: JoinSet<SetProcessingOutcome> = JoinSet::new();
        let mut paused = false;

        while !cancel.is_cancelled() {
            while in_flight.len() < workers && !pending.is_empty() {
                if throttle.as_ref().is_some_and(MemoryThrottle::should_pause) {
                    if !paused {
                        log::warn!("⏸️ Memory above threshold, holding dispatch");
                        paused = true;
                    }
                    break;
                }
                if paused {
                    log::info!("▶️ Memory back under threshold, resuming dispatch");
                    paused = false;
                }
                let Some(set) = pending.pop_front() else {
                    break;
                };
                let processor = processor.clone();
                let cancel = cancel.clone();
                log::debug!("dispatching set {}", set.code);
                in_flight.spawn(async move { processor.process(&set, &cancel).await });
            }

            if pending.is_empty() {
                break;
            }

            if in_flight.is_empty() {
                // held back with nothing running: wait for memory to recover
                if let Some(throttle) = &throttle {
                    if throttle.wait_until_clear(cadence, cancel).await.is_err() {
                        break;
                    }
                }
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                joined = in_flight.join_next() => {
                    if let Some(joined) = joined {
                        self.absorb(&mut report, &mut tally, joined);
                    }
                }
                _ = tokio::time::sleep(cadence) => {}
            }
            self.emit_progress(&mut tally, cadence, false);
        }

        report.transition(RunState::Draining);
        if cancel.is_cancelled() {
            log::info!(
                "🛑 Cancellation requested, draining {} in-flight sets",
                in_flight.len()
            );
        }
        while let Some(joined) = in_flight.join_next().await {
            self.absorb(&mut report, &mut tally, joined);
            self.emit_progress(&mut tally, cadence, false);
        }
        self.emit_progress(&mut tally, cadence, true);

        Ok(self.finish(report, cancel, pending))
    }

    async fn fetch_manifest(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<RawPayload>>, SourceError> {
        let Ok(_token) = self.limiter.acquire(cancel).await else {
            return Ok(None);
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            fetched = self.collaborators.source.fetch_manifest() => fetched.map(Some),
        }
    }

    fn select_sets(
        &self,
        manifest: &[RawPayload],
        config: &BulkProcessingConfiguration,
        report: &mut RunReport,
    ) -> VecDeque<CatalogSet> {
        report.sets_in_manifest = manifest.len();
        let chain = SetFilterChain::from_config(config);
        let mut selected = VecDeque::new();

        for payload in manifest {
            match CatalogSet::from_payload(payload) {
                Ok(set) if chain.should_include(&set) => selected.push_back(set),
                Ok(_) => {}
                Err(e) => {
                    let (code, name) = CatalogSet::describe_payload(payload);
                    log::warn!("rejecting manifest entry {}: {}", code, e);
                    report.record_manifest_rejection(code, name, e.to_string());
                }
            }
        }
        report.sets_selected = selected.len();
        selected
    }

    /// Builds the per-run cache. A missing rulings dataset degrades the run
    /// instead of failing it.
    async fn load_cache(
        &self,
        config: &BulkProcessingConfiguration,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> CatalogCache {
        let mut cache = CatalogCache::new();
        if !config.process_rulings || config.sets_only {
            return cache;
        }

        let fetched = {
            let Ok(_token) = self.limiter.acquire(cancel).await else {
                return cache;
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return cache,
                fetched = self.collaborators.source.fetch_rulings() => fetched,
            }
        };
        match fetched {
            Ok(payloads) => {
                let rejected = cache.load_rulings(&payloads);
                if rejected > 0 {
                    report.warn(format!("skipped {rejected} malformed rulings"));
                }
                log::info!("📜 Loaded {} rulings", cache.ruling_count());
            }
            Err(e) => report.warn(format!(
                "rulings dataset unavailable, continuing without rulings: {e}"
            )),
        }
        cache
    }

    fn absorb(
        &self,
        report: &mut RunReport,
        tally: &mut Tally,
        joined: Result<SetProcessingOutcome, JoinError>,
    ) {
        match joined {
            Ok(outcome) => {
                if outcome.status != SetStatus::Cancelled {
                    tally.done += 1;
                    tally.last_item.clone_from(&outcome.set_name);
                }
                if outcome.cards_failed() > 0 {
                    log::info!(
                        "set {} finished with {} card failures",
                        outcome.set_code,
                        outcome.cards_failed()
                    );
                }
                report.record(outcome);
            }
            Err(e) => report.warn(format!("set worker stopped abnormally: {e}")),
        }
    }

    fn emit_progress(&self, tally: &mut Tally, cadence: std::time::Duration, force: bool) {
        let due = tally
            .last_emit
            .map_or(true, |last| last.elapsed() >= cadence);
        if !(force || due) {
            return;
        }
        tally.last_emit = Some(Instant::now());
        self.progress
            .progress(ProgressKind::Sets, tally.done, tally.total, "processed", &tally.last_item);
    }

    fn finish(
        &self,
        mut report: RunReport,
        cancel: &CancellationToken,
        undispatched: VecDeque<CatalogSet>,
    ) -> RunReport {
        if cancel.is_cancelled() {
            report
                .unfinished_sets
                .extend(undispatched.into_iter().map(|s| s.code));
            report.transition(RunState::Cancelled);
        } else {
            report.transition(RunState::Completed);
        }
        log::info!("🏁 {}", report.summary());
        self.progress.completed(&report.summary());
        report
    }
}
