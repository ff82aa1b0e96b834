use std::sync::Arc;

use crate::source::CatalogSource;
use crate::storage::{BinaryWriter, CatalogWriter, SearchIndexWriter};

mod card;
mod set;

pub use card::{CardRecordProcessor, ProcessedCard};
pub use set::SetProcessor;

/// The external systems a run reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn CatalogSource>,
    pub catalog: Arc<dyn CatalogWriter>,
    pub index: Arc<dyn SearchIndexWriter>,
    pub blobs: Arc<dyn BinaryWriter>,
}
