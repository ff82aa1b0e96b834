use serde::{Deserialize, Serialize};

use crate::storage::{CatalogCounts, SearchHit};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<SearchHitResponse>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHitResponse {
    pub card_id: String,
    pub name: String,
    pub set_code: Option<String>,
    pub score: u32,
}

impl From<SearchHit> for SearchHitResponse {
    fn from(hit: SearchHit) -> Self {
        Self {
            card_id: hit.card_id,
            name: hit.name,
            set_code: hit.set_code,
            score: hit.matched,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub sets: u64,
    pub cards: u64,
    pub artists: u64,
    pub rulings: u64,
    pub indexed_names: u64,
}

impl From<CatalogCounts> for StatsResponse {
    fn from(counts: CatalogCounts) -> Self {
        Self {
            sets: counts.sets,
            cards: counts.cards,
            artists: counts.artists,
            rulings: counts.rulings,
            indexed_names: counts.indexed_names,
        }
    }
}
