//! In-memory collaborators shared by the pipeline's unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::progress::{ProgressKind, ProgressSink};
use crate::source::{Binary, CatalogSource};
use crate::storage::{BinaryWriter, CatalogWriter, SearchIndexWriter};
use crate::trigram::TrigramEntry;
use crate::types::{
    ArtistRecord, BlobMetadata, CanonicalCardRecord, CatalogSet, RawPayload, RulingRecord,
    SetRecord, SourceError,
};

pub(crate) fn set_payload(code: &str) -> RawPayload {
    json!({
        "id": format!("set-{code}"),
        "code": code,
        "name": format!("Set {}", code.to_uppercase()),
        "released_at": "2020-01-01",
        "digital": false,
        "icon_svg_uri": format!("https://icons/{code}.svg")
    })
}

pub(crate) fn card_payload(code: &str, n: usize) -> RawPayload {
    json!({
        "id": format!("{code}-{n}"),
        "oracle_id": format!("oracle-{code}-{n}"),
        "set_id": format!("set-{code}"),
        "set": code,
        "name": format!("Card {n} of {code}"),
        "collector_number": n.to_string(),
        "finishes": ["nonfoil", "foil"],
        "artist": format!("Artist {n}"),
        "artist_ids": [format!("artist-{n}")],
        "image_uris": { "normal": format!("https://img/{code}/{n}.jpg") }
    })
}

#[derive(Default)]
pub(crate) struct MemorySource {
    pub manifest: Vec<RawPayload>,
    pub cards: HashMap<String, Vec<RawPayload>>,
    pub failing_sets: HashSet<String>,
    pub rulings: Vec<RawPayload>,
    pub manifest_status: Option<u16>,
    pub rulings_fail: bool,
    pub failing_binaries: HashSet<String>,
    pub fetch_delay: Option<Duration>,
    pub manifest_delay: Option<Duration>,
    pub card_fetches: AtomicUsize,
    pub binary_fetches: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MemorySource {
    /// `sets` codes, each with `cards_per_set` well-formed cards.
    pub fn with_sets(codes: &[&str], cards_per_set: usize) -> Self {
        let mut source = Self::default();
        for code in codes {
            source.manifest.push(set_payload(code));
            source.cards.insert(
                code.to_string(),
                (1..=cards_per_set).map(|n| card_payload(code, n)).collect(),
            );
        }
        source
    }
}

#[async_trait]
impl CatalogSource for MemorySource {
    async fn fetch_manifest(&self) -> Result<Vec<RawPayload>, SourceError> {
        if let Some(delay) = self.manifest_delay {
            tokio::time::sleep(delay).await;
        }
        match self.manifest_status {
            Some(status @ (401 | 403)) => Err(SourceError::Unauthorized(status)),
            Some(status) => Err(SourceError::Status {
                status,
                url: "memory://sets".into(),
            }),
            None => Ok(self.manifest.clone()),
        }
    }

    async fn fetch_set_cards(&self, set: &CatalogSet) -> Result<Vec<RawPayload>, SourceError> {
        self.card_fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_sets.contains(&set.code) {
            return Err(SourceError::Status {
                status: 503,
                url: format!("memory://cards/{}", set.code),
            });
        }
        Ok(self.cards.get(&set.code).cloned().unwrap_or_default())
    }

    async fn fetch_rulings(&self) -> Result<Vec<RawPayload>, SourceError> {
        if self.rulings_fail {
            return Err(SourceError::Http("connection reset".into()));
        }
        Ok(self.rulings.clone())
    }

    async fn fetch_binary(&self, uri: &str) -> Result<Binary, SourceError> {
        self.binary_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_binaries.contains(uri) {
            return Err(SourceError::Status {
                status: 404,
                url: uri.to_string(),
            });
        }
        Ok(Binary {
            content: uri.as_bytes().to_vec(),
            content_type: None,
        })
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    pub sets: Mutex<Vec<SetRecord>>,
    pub cards: Mutex<Vec<CanonicalCardRecord>>,
    pub artists: Mutex<Vec<ArtistRecord>>,
    pub rulings: Mutex<Vec<RulingRecord>>,
    pub trigrams: Mutex<Vec<TrigramEntry>>,
    pub blobs: Mutex<Vec<(String, BlobMetadata)>>,
    pub fail_cards: AtomicBool,
    pub fail_artists_once: AtomicBool,
    pub fail_index: AtomicBool,
}

impl MemoryStore {
    pub fn card_ids(&self) -> Vec<String> {
        self.cards.lock().unwrap().iter().map(|c| c.id.clone()).collect()
    }
}

#[async_trait]
impl CatalogWriter for MemoryStore {
    async fn write_set_record(&self, set: &SetRecord) -> Result<()> {
        self.sets.lock().unwrap().push(set.clone());
        Ok(())
    }

    async fn write_card_records(&self, batch: &[CanonicalCardRecord]) -> Result<()> {
        if self.fail_cards.load(Ordering::SeqCst) {
            bail!("card store unavailable");
        }
        self.cards.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }

    async fn write_artist_records(&self, batch: &[ArtistRecord]) -> Result<()> {
        if self.fail_artists_once.swap(false, Ordering::SeqCst) {
            bail!("artist store unavailable");
        }
        self.artists.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }

    async fn write_ruling_records(&self, batch: &[RulingRecord]) -> Result<()> {
        self.rulings.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

#[async_trait]
impl SearchIndexWriter for MemoryStore {
    async fn write_trigram_entries(&self, batch: &[TrigramEntry]) -> Result<()> {
        if self.fail_index.load(Ordering::SeqCst) {
            bail!("index store unavailable");
        }
        self.trigrams.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

#[async_trait]
impl BinaryWriter for MemoryStore {
    async fn write_binary(&self, path: &str, _content: &[u8], metadata: &BlobMetadata) -> Result<()> {
        self.blobs
            .lock()
            .unwrap()
            .push((path.to_string(), metadata.clone()));
        Ok(())
    }
}

/// Cancels `token` once `after` sets have completed.
pub(crate) struct CancelAfterSets {
    pub token: CancellationToken,
    pub after: usize,
    pub completed: AtomicUsize,
    pub finished: AtomicBool,
}

impl CancelAfterSets {
    pub fn new(token: CancellationToken, after: usize) -> Self {
        Self {
            token,
            after,
            completed: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        }
    }
}

impl ProgressSink for CancelAfterSets {
    fn on_progress(&self, _: ProgressKind, _: usize, _: usize, _: &str, _: &str) {}

    fn on_set_completed(&self, _name: &str) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if done >= self.after {
            self.token.cancel();
        }
    }

    fn on_completed(&self, _message: &str) {
        self.finished.store(true, Ordering::SeqCst);
    }
}
