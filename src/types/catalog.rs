use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PayloadError;

/// Untyped JSON exactly as it came from the catalog source.
pub type RawPayload = Value;

#[derive(Deserialize)]
struct RawSet {
    id: Option<String>,
    code: Option<String>,
    name: Option<String>,
    set_type: Option<String>,
    released_at: Option<String>,
    #[serde(default)]
    card_count: u32,
    #[serde(default)]
    digital: bool,
    icon_svg_uri: Option<String>,
    search_uri: Option<String>,
    parent_set_code: Option<String>,
}

#[derive(Deserialize)]
struct RawFace {
    name: Option<String>,
    image_uris: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
struct RawCard {
    id: Option<String>,
    oracle_id: Option<String>,
    set_id: Option<String>,
    set: Option<String>,
    name: Option<String>,
    collector_number: Option<String>,
    rarity: Option<String>,
    finishes: Option<Vec<String>>,
    foil: Option<bool>,
    nonfoil: Option<bool>,
    artist: Option<String>,
    #[serde(default)]
    artist_ids: Vec<String>,
    type_line: Option<String>,
    mana_cost: Option<String>,
    released_at: Option<String>,
    lang: Option<String>,
    image_uris: Option<BTreeMap<String, String>>,
    card_faces: Option<Vec<RawFace>>,
}

#[derive(Deserialize)]
struct RawRuling {
    oracle_id: Option<String>,
    source: Option<String>,
    published_at: Option<String>,
    comment: Option<String>,
}

/// A catalog set as listed in the bulk manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSet {
    pub id: String,
    pub code: String,
    pub name: String,
    pub set_type: Option<String>,
    pub released_at: Option<NaiveDate>,
    pub digital: bool,
    pub card_count: u32,
    pub icon_uri: Option<String>,
    /// Source-provided listing of the set's cards, when the source exposes one.
    pub search_uri: Option<String>,
    pub parent_code: Option<String>,
}

impl CatalogSet {
    pub fn from_payload(payload: &RawPayload) -> Result<Self, PayloadError> {
        let raw = RawSet::deserialize(payload)?;
        let id = required(raw.id, "id")?;
        let code = required(raw.code, "code")?.to_ascii_lowercase();
        let name = raw.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| code.clone());
        let released_at = raw
            .released_at
            .as_deref()
            .map(|s| parse_date("released_at", s))
            .transpose()?;

        Ok(Self {
            id,
            code,
            name,
            set_type: raw.set_type,
            released_at,
            digital: raw.digital,
            card_count: raw.card_count,
            icon_uri: raw.icon_svg_uri,
            search_uri: raw.search_uri,
            parent_code: raw.parent_set_code.map(|c| c.to_ascii_lowercase()),
        })
    }

    /// Best-effort label for a manifest entry that failed validation.
    pub fn describe_payload(payload: &RawPayload) -> (String, String) {
        let code = payload
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_ascii_lowercase();
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&code)
            .to_string();
        (code, name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finishes {
    pub nonfoil: bool,
    pub foil: bool,
    pub etched: bool,
}

impl Finishes {
    fn from_list(list: &[String]) -> Result<Self, PayloadError> {
        let mut out = Finishes::default();
        for finish in list {
            match finish.as_str() {
                "nonfoil" => out.nonfoil = true,
                "foil" => out.foil = true,
                "etched" => out.etched = true,
                // glossy is a print treatment, not a separately sold finish
                "glossy" => {}
                other => {
                    return Err(PayloadError::InvalidField {
                        field: "finishes",
                        value: other.to_string(),
                    })
                }
            }
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardFace {
    pub name: String,
    pub image_uris: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

/// A validated card belonging to one catalog set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogCard {
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
    pub image_uris: BTreeMap<String, String>,
    pub faces: Vec<CardFace>,
}

impl CatalogCard {
    pub fn from_payload(payload: &RawPayload, set: &CatalogSet) -> Result<Self, PayloadError> {
        let raw = RawCard::deserialize(payload)?;
        let id = required(raw.id, "id")?;
        let name = required(raw.name, "name")?;
        let set_id = required(raw.set_id, "set_id")?;
        if set_id != set.id {
            return Err(PayloadError::SetMismatch {
                card_id: id,
                expected: set.id.clone(),
                actual: set_id,
            });
        }

        let finishes = match (raw.finishes, raw.foil, raw.nonfoil) {
            (Some(list), _, _) => Finishes::from_list(&list)?,
            (None, foil, nonfoil) if foil.is_some() || nonfoil.is_some() => Finishes {
                foil: foil.unwrap_or(false),
                nonfoil: nonfoil.unwrap_or(false),
                etched: false,
            },
            _ => return Err(PayloadError::MissingField("finishes")),
        };

        let released_at = raw
            .released_at
            .as_deref()
            .map(|s| parse_date("released_at", s))
            .transpose()?;

        let faces = raw
            .card_faces
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, face)| CardFace {
                name: face
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("{name} ({i})")),
                image_uris: face.image_uris.unwrap_or_default(),
            })
            .collect();

        Ok(Self {
            id,
            oracle_id: raw.oracle_id.filter(|o| !o.is_empty()),
            set_id,
            set_code: raw
                .set
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or_else(|| set.code.clone()),
            name,
            collector_number: raw.collector_number.unwrap_or_default(),
            rarity: raw.rarity,
            finishes,
            artist: raw.artist.filter(|a| !a.trim().is_empty()),
            artist_ids: raw.artist_ids,
            type_line: raw.type_line,
            mana_cost: raw.mana_cost,
            released_at,
            lang: raw.lang.unwrap_or_else(|| "en".to_string()),
            image_uris: raw.image_uris.unwrap_or_default(),
            faces,
        })
    }

    /// Pairs artist ids with names. `"A & B"` with two ids yields two artists;
    /// any other shape attributes the full credit to every id.
    pub fn artists(&self) -> Vec<ArtistRef> {
        let Some(credit) = self.artist.as_deref() else {
            return Vec::new();
        };
        let names: Vec<&str> = credit.split(" & ").map(str::trim).collect();
        if names.len() == self.artist_ids.len() {
            return self
                .artist_ids
                .iter()
                .zip(names)
                .map(|(id, name)| ArtistRef {
                    id: id.clone(),
                    name: name.to_string(),
                })
                .collect();
        }
        self.artist_ids
            .iter()
            .map(|id| ArtistRef {
                id: id.clone(),
                name: credit.to_string(),
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruling {
    pub oracle_id: String,
    pub source: String,
    pub published_at: Option<NaiveDate>,
    pub comment: String,
}

impl Ruling {
    pub fn from_payload(payload: &RawPayload) -> Result<Self, PayloadError> {
        let raw = RawRuling::deserialize(payload)?;
        Ok(Self {
            oracle_id: required(raw.oracle_id, "oracle_id")?,
            source: raw.source.unwrap_or_else(|| "unknown".to_string()),
            published_at: raw
                .published_at
                .as_deref()
                .map(|s| parse_date("published_at", s))
                .transpose()?,
            comment: required(raw.comment, "comment")?,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, PayloadError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PayloadError::MissingField(field)),
    }
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, PayloadError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| PayloadError::InvalidField {
        field,
        value: value.to_string(),
    })
}
