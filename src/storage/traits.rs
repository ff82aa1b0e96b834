use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::report::RunReport;
use crate::trigram::TrigramEntry;
use crate::types::{ArtistRecord, BlobMetadata, CanonicalCardRecord, RulingRecord, SetRecord};

/// Structured catalog records. Every write is an upsert keyed by the record id,
/// so re-running a set converges instead of duplicating.
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    async fn write_set_record(&self, set: &SetRecord) -> Result<()>;
    async fn write_card_records(&self, batch: &[CanonicalCardRecord]) -> Result<()>;
    async fn write_artist_records(&self, batch: &[ArtistRecord]) -> Result<()>;
    async fn write_ruling_records(&self, batch: &[RulingRecord]) -> Result<()>;
}

#[async_trait]
pub trait SearchIndexWriter: Send + Sync {
    /// Replaces the fragments of every partition key in the batch.
    async fn write_trigram_entries(&self, batch: &[TrigramEntry]) -> Result<()>;
}

#[async_trait]
pub trait BinaryWriter: Send + Sync {
    async fn write_binary(&self, path: &str, content: &[u8], metadata: &BlobMetadata) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub card_id: String,
    pub name: String,
    pub set_code: Option<String>,
    pub matched: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCounts {
    pub sets: u64,
    pub cards: u64,
    pub artists: u64,
    pub rulings: u64,
    pub indexed_names: u64,
}

pub trait StorageRead {
    /// Ranks partition keys by how many of `fragments` they contain.
    fn search(&self, fragments: &[String], limit: usize) -> Result<Vec<SearchHit>>;
    fn counts(&self) -> Result<CatalogCounts>;
    fn load_last_report(&self) -> Result<Option<RunReport>>;
}

pub trait ReportStore {
    fn save_report(&self, report: &RunReport) -> Result<()>;
}
