//! Lookup data owned by one ingestion run.
//!
//! The orchestrator builds a cache at the start of a run, shares it with the
//! set workers behind an `Arc`, and drops it when the run ends.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::types::{ArtistRecord, RawPayload, Ruling};

#[derive(Default)]
pub struct CatalogCache {
    rulings: HashMap<String, Vec<Ruling>>,
    artists_seen: Mutex<HashSet<String>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes the rulings dataset by oracle id. Returns how many entries were
    /// rejected as malformed.
    pub fn load_rulings(&mut self, payloads: &[RawPayload]) -> usize {
        let mut rejected = 0;
        for payload in payloads {
            match Ruling::from_payload(payload) {
                Ok(ruling) => self
                    .rulings
                    .entry(ruling.oracle_id.clone())
                    .or_default()
                    .push(ruling),
                Err(e) => {
                    log::debug!("skipping ruling: {}", e);
                    rejected += 1;
                }
            }
        }
        rejected
    }

    pub fn rulings_for(&self, oracle_id: &str) -> &[Ruling] {
        self.rulings
            .get(oracle_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn ruling_count(&self) -> usize {
        self.rulings.values().map(Vec::len).sum()
    }

    /// Drops artists already written during this run, and duplicates within
    /// `artists`. Nothing is marked until [`mark_artists_written`] is called.
    ///
    /// [`mark_artists_written`]: CatalogCache::mark_artists_written
    pub fn unseen_artists(&self, artists: Vec<ArtistRecord>) -> Vec<ArtistRecord> {
        let seen = self
            .artists_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut batch = HashSet::new();
        artists
            .into_iter()
            .filter(|a| !seen.contains(&a.id) && batch.insert(a.id.clone()))
            .collect()
    }

    pub fn mark_artists_written(&self, artists: &[ArtistRecord]) {
        let mut seen = self
            .artists_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        seen.extend(artists.iter().map(|a| a.id.clone()));
    }
}
