use async_trait::async_trait;

use crate::types::{CatalogSet, RawPayload, SourceError};

pub mod http;

pub use http::ScryfallSource;

/// Binary content fetched from the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binary {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

/// Read access to the external catalog. Payloads are returned raw and are
/// validated by the pipeline, so one bad entry never poisons a whole listing.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Every set the source publishes.
    async fn fetch_manifest(&self) -> Result<Vec<RawPayload>, SourceError>;

    /// All printings belonging to `set`, in source order.
    async fn fetch_set_cards(&self, set: &CatalogSet) -> Result<Vec<RawPayload>, SourceError>;

    /// The complete rulings dataset.
    async fn fetch_rulings(&self) -> Result<Vec<RawPayload>, SourceError>;

    async fn fetch_binary(&self, uri: &str) -> Result<Binary, SourceError>;
}
