use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use super::{CardRecordProcessor, Collaborators, ProcessedCard};
use crate::cache::CatalogCache;
use crate::configuration::BulkProcessingConfiguration;
use crate::progress::{Progress, ProgressKind};
use crate::ratelimit::RateLimiter;
use crate::report::{CardFailure, FailureStage, SetProcessingOutcome};
use crate::trigram::{TrigramEntry, TrigramIndexBuilder};
use crate::types::{
    content_type_for, BlobMetadata, CardError, CatalogSet, ImageWriteRequest, RawPayload,
    RulingRecord, SetRecord, SourceError,
};

/// One set's unit of work. Never returns an error: every failure ends up in
/// the outcome.
pub struct SetProcessor {
    collaborators: Collaborators,
    limiter: Arc<RateLimiter>,
    cache: Arc<CatalogCache>,
    progress: Progress,
    config: Arc<BulkProcessingConfiguration>,
    cards: CardRecordProcessor,
    trigrams: TrigramIndexBuilder,
}

impl SetProcessor {
    pub fn new(
        collaborators: Collaborators,
        limiter: Arc<RateLimiter>,
        cache: Arc<CatalogCache>,
        progress: Progress,
        config: Arc<BulkProcessingConfiguration>,
    ) -> Self {
        Self {
            collaborators,
            limiter,
            cache,
            progress,
            config,
            cards: CardRecordProcessor::new(),
            trigrams: TrigramIndexBuilder::new(),
        }
    }

    pub async fn process(&self, set: &CatalogSet, cancel: &CancellationToken) -> SetProcessingOutcome {
        let outcome = SetProcessingOutcome::new(&set.code, &set.name);
        if cancel.is_cancelled() {
            return outcome.cancelled();
        }
        if self.config.sets_only {
            return self.process_set_only(set, cancel, outcome).await;
        }

        let fetched = {
            let _token = match self.limiter.acquire(cancel).await {
                Ok(token) => token,
                Err(_) => return outcome.cancelled(),
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return outcome.cancelled(),
                fetched = self.collaborators.source.fetch_set_cards(set) => fetched,
            }
        };
        let raw_cards = match fetched {
            Ok(cards) => cards,
            Err(e) => {
                if e.is_unauthorized() {
                    log::error!("🔒 source rejected card fetch for set {}: {}", set.code, e);
                } else {
                    log::warn!("card fetch failed for set {}: {}", set.code, e);
                }
                return outcome.failed(FailureStage::Fetch, e);
            }
        };

        let Some((processed, outcome)) = self.process_cards(set, &raw_cards, cancel, outcome) else {
            log::info!("⏹️ set {} cancelled before its data was written", set.code);
            return SetProcessingOutcome::new(&set.code, &set.name).cancelled();
        };

        let mut outcome = match self.write_records(set, &processed, outcome).await {
            Ok(outcome) => outcome,
            Err(failed) => return failed,
        };

        if self.config.download_images {
            self.store_images(set, &processed, cancel, &mut outcome).await;
        }

        log::debug!(
            "set {}: {}/{} cards, {} rulings, {} images",
            set.code,
            outcome.cards_succeeded,
            outcome.cards_attempted,
            outcome.rulings_succeeded,
            outcome.images_written
        );
        self.progress.set_completed(&set.name);
        outcome
    }

    async fn process_set_only(
        &self,
        set: &CatalogSet,
        cancel: &CancellationToken,
        mut outcome: SetProcessingOutcome,
    ) -> SetProcessingOutcome {
        if let Err(e) = self
            .collaborators
            .catalog
            .write_set_record(&SetRecord::from(set))
            .await
        {
            log::warn!("set record write failed for {}: {:#}", set.code, e);
            return outcome.failed(FailureStage::RecordWrite, format!("{e:#}"));
        }
        if self.config.download_images {
            self.store_icon(set, cancel, &mut outcome).await;
        }
        self.progress.set_completed(&set.name);
        outcome
    }

    /// Runs every card through the record processor in source order. `None`
    /// when the run was cancelled part way.
    fn process_cards(
        &self,
        set: &CatalogSet,
        raw_cards: &[RawPayload],
        cancel: &CancellationToken,
        mut outcome: SetProcessingOutcome,
    ) -> Option<(Vec<ProcessedCard>, SetProcessingOutcome)> {
        let total = raw_cards.len();
        self.progress
            .progress(ProgressKind::Cards, 0, total, "processing", &set.name);

        let mut processed = Vec::with_capacity(total);
        for raw in raw_cards {
            if cancel.is_cancelled() {
                return None;
            }
            outcome.cards_attempted += 1;
            match self.cards.process(raw, set, &self.cache, &self.config) {
                Ok(card) => processed.push(card),
                Err(e) => {
                    let failure = card_failure(set, raw, &e);
                    log::warn!(
                        "skipping card {} in set {}: {}",
                        failure.card_id.as_deref().unwrap_or("?"),
                        set.code,
                        e
                    );
                    outcome.card_failures.push(failure);
                }
            }
        }
        Some((processed, outcome))
    }

    /// Writes set, card, artist, ruling and index records in that order.
    /// `Err` carries the failed outcome.
    async fn write_records(
        &self,
        set: &CatalogSet,
        processed: &[ProcessedCard],
        mut outcome: SetProcessingOutcome,
    ) -> Result<SetProcessingOutcome, SetProcessingOutcome> {
        let catalog = &self.collaborators.catalog;
        let fail = |outcome: SetProcessingOutcome, stage: FailureStage, e: anyhow::Error| {
            log::warn!("{:?} failed for set {}: {:#}", stage, set.code, e);
            outcome.failed(stage, format!("{e:#}"))
        };

        if let Err(e) = catalog.write_set_record(&SetRecord::from(set)).await {
            return Err(fail(outcome, FailureStage::RecordWrite, e));
        }

        let records: Vec<_> = processed.iter().map(|p| p.record.clone()).collect();
        if let Err(e) = catalog.write_card_records(&records).await {
            return Err(fail(outcome, FailureStage::RecordWrite, e));
        }
        outcome.cards_succeeded = records.len();

        let artists = self
            .cache
            .unseen_artists(processed.iter().flat_map(|p| p.artists.clone()).collect());
        if let Err(e) = catalog.write_artist_records(&artists).await {
            return Err(fail(outcome, FailureStage::RecordWrite, e));
        }
        self.cache.mark_artists_written(&artists);

        let rulings: Vec<RulingRecord> = processed.iter().flat_map(|p| p.rulings.clone()).collect();
        outcome.rulings_attempted = rulings.len();
        if let Err(e) = catalog.write_ruling_records(&rulings).await {
            return Err(fail(outcome, FailureStage::RulingWrite, e));
        }
        outcome.rulings_succeeded = rulings.len();

        let entries: Vec<TrigramEntry> = processed
            .iter()
            .map(|p| self.trigrams.build(p.record.id.as_str(), &p.record.name))
            .collect();
        if let Err(e) = self.collaborators.index.write_trigram_entries(&entries).await {
            log::error!(
                "index write failed for set {} after {} cards were stored: {:#}",
                set.code,
                outcome.cards_succeeded,
                e
            );
            return Err(outcome.failed(FailureStage::IndexWrite, format!("{e:#}")));
        }

        Ok(outcome)
    }

    async fn store_images(
        &self,
        set: &CatalogSet,
        processed: &[ProcessedCard],
        cancel: &CancellationToken,
        outcome: &mut SetProcessingOutcome,
    ) {
        self.store_icon(set, cancel, outcome).await;
        for card in processed {
            for request in &card.images {
                if cancel.is_cancelled() {
                    return;
                }
                match self.store_binary(request, cancel).await {
                    Ok(()) => outcome.images_written += 1,
                    Err(_) if cancel.is_cancelled() => return,
                    Err(e) => {
                        log::warn!("{}", e);
                        outcome.card_failures.push(CardFailure {
                            set_code: set.code.clone(),
                            card_id: Some(card.record.id.clone()),
                            card_name: Some(card.record.name.clone()),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    async fn store_icon(
        &self,
        set: &CatalogSet,
        cancel: &CancellationToken,
        outcome: &mut SetProcessingOutcome,
    ) {
        let Some(uri) = set.icon_uri.as_deref() else {
            return;
        };
        match self
            .store_binary(&ImageWriteRequest::set_icon(set, uri), cancel)
            .await
        {
            Ok(()) => outcome.images_written += 1,
            Err(e) => {
                log::warn!("set icon for {}: {}", set.code, e);
                outcome.card_failures.push(CardFailure {
                    set_code: set.code.clone(),
                    card_id: None,
                    card_name: None,
                    error: e.to_string(),
                });
            }
        }
    }

    async fn store_binary(
        &self,
        request: &ImageWriteRequest,
        cancel: &CancellationToken,
    ) -> Result<(), CardError> {
        let image_error = |reason: String| CardError::Image {
            card_id: request.owner_id.clone(),
            uri: request.source_uri.clone(),
            reason,
        };

        let binary = {
            let _token = self
                .limiter
                .acquire(cancel)
                .await
                .map_err(|e| image_error(e.to_string()))?;
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SourceError::Cancelled),
                fetched = self.collaborators.source.fetch_binary(&request.source_uri) => fetched,
            };
            fetched.map_err(|e| image_error(e.to_string()))?
        };

        let metadata = BlobMetadata {
            content_type: binary
                .content_type
                .clone()
                .unwrap_or_else(|| content_type_for(&request.path).to_string()),
            owner_id: request.owner_id.clone(),
            kind: request.kind.clone(),
            source_uri: request.source_uri.clone(),
            byte_len: binary.content.len(),
            sha256: hex::encode(Sha256::digest(&binary.content)),
        };
        self.collaborators
            .blobs
            .write_binary(&request.path, &binary.content, &metadata)
            .await
            .map_err(|e| image_error(format!("{e:#}")))
    }
}

fn card_failure(set: &CatalogSet, raw: &RawPayload, error: &CardError) -> CardFailure {
    let field = |name: &str| raw.get(name).and_then(|v| v.as_str()).map(str::to_string);
    CardFailure {
        set_code: set.code.clone(),
        card_id: field("id"),
        card_name: field("name"),
        error: error.to_string(),
    }
}
