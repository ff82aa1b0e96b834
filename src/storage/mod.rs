pub mod file;
pub mod sqlite;
pub mod traits;

pub use file::FileBlobStore;
pub use sqlite::SqliteStorage;
pub use traits::{
    BinaryWriter, CatalogCounts, CatalogWriter, ReportStore, SearchHit, SearchIndexWriter,
    StorageRead,
};
