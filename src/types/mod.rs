mod catalog;
mod error;
mod records;

pub use catalog::{ArtistRef, CardFace, CatalogCard, CatalogSet, Finishes, RawPayload, Ruling};
pub use error::{Cancelled, CardError, IngestError, PayloadError, SourceError};
pub use records::{
    content_type_for, ArtistRecord, BlobMetadata, CanonicalCardRecord, ImageWriteRequest,
    RulingRecord, SetRecord,
};
