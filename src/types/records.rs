use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{CatalogCard, CatalogSet, Finishes};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRecord {
    pub id: String,
    pub code: String,
    pub name: String,
    pub set_type: Option<String>,
    pub released_at: Option<NaiveDate>,
    pub digital: bool,
    pub card_count: u32,
    pub parent_code: Option<String>,
}

impl From<&CatalogSet> for SetRecord {
    fn from(set: &CatalogSet) -> Self {
        Self {
            id: set.id.clone(),
            code: set.code.clone(),
            name: set.name.clone(),
            set_type: set.set_type.clone(),
            released_at: set.released_at,
            digital: set.digital,
            card_count: set.card_count,
            parent_code: set.parent_code.clone(),
        }
    }
}

/// The storage shape of a card, independent of the source's JSON layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCardRecord {
    pub id: String,
    pub oracle_id: Option<String>,
    pub set_id: String,
    pub set_code: String,
    pub name: String,
    pub collector_number: String,
    pub rarity: Option<String>,
    pub finishes: Finishes,
    pub artist: Option<String>,
    pub artist_ids: Vec<String>,
    pub type_line: Option<String>,
    pub mana_cost: Option<String>,
    pub released_at: Option<NaiveDate>,
    pub lang: String,
    pub face_names: Vec<String>,
}

impl From<&CatalogCard> for CanonicalCardRecord {
    fn from(card: &CatalogCard) -> Self {
        Self {
            id: card.id.clone(),
            oracle_id: card.oracle_id.clone(),
            set_id: card.set_id.clone(),
            set_code: card.set_code.clone(),
            name: card.name.clone(),
            collector_number: card.collector_number.clone(),
            rarity: card.rarity.clone(),
            finishes: card.finishes,
            artist: card.artist.clone(),
            artist_ids: card.artist_ids.clone(),
            type_line: card.type_line.clone(),
            mana_cost: card.mana_cost.clone(),
            released_at: card.released_at,
            lang: card.lang.clone(),
            face_names: card.faces.iter().map(|f| f.name.clone()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulingRecord {
    pub card_id: String,
    pub oracle_id: String,
    pub source: String,
    pub published_at: Option<NaiveDate>,
    pub comment: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub content_type: String,
    pub owner_id: String,
    pub kind: String,
    pub source_uri: String,
    pub byte_len: usize,
    pub sha256: String,
}

/// A binary the pipeline wants stored; content is fetched from `source_uri`
/// right before the write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageWriteRequest {
    pub owner_id: String,
    pub kind: String,
    pub source_uri: String,
    pub path: String,
}

impl ImageWriteRequest {
    pub fn card(card: &CatalogCard, face: Option<usize>, kind: &str, uri: &str) -> Self {
        let file = match face {
            Some(i) => format!("{i}-{kind}"),
            None => kind.to_string(),
        };
        Self {
            owner_id: card.id.clone(),
            kind: kind.to_string(),
            source_uri: uri.to_string(),
            path: format!(
                "cards/{}/{}/{}.{}",
                card.set_code,
                card.id,
                file,
                extension_for(kind, uri)
            ),
        }
    }

    pub fn set_icon(set: &CatalogSet, uri: &str) -> Self {
        Self {
            owner_id: set.id.clone(),
            kind: "icon".to_string(),
            source_uri: uri.to_string(),
            path: format!("sets/{}/icon.svg", set.code),
        }
    }
}

fn extension_for(kind: &str, uri: &str) -> &'static str {
    let path = uri.split('?').next().unwrap_or(uri);
    if kind == "png" || path.ends_with(".png") {
        "png"
    } else if path.ends_with(".svg") {
        "svg"
    } else {
        "jpg"
    }
}

pub fn content_type_for(path: &str) -> &'static str {
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".svg") {
        "image/svg+xml"
    } else if path.ends_with(".jpg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}
