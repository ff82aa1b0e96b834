#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use cardindex::source::{Binary, CatalogSource};
use cardindex::types::{CatalogSet, RawPayload, SourceError};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn set_json(code: &str, name: &str, released_at: &str, icon: Option<String>) -> Value {
    json!({
        "id": format!("set-{code}"),
        "code": code,
        "name": name,
        "released_at": released_at,
        "digital": false,
        "icon_svg_uri": icon,
    })
}

pub fn card_json(code: &str, id: &str, name: &str, artist: &str, image: Option<String>) -> Value {
    let mut card = json!({
        "id": id,
        "oracle_id": format!("oracle-{id}"),
        "set_id": format!("set-{code}"),
        "set": code,
        "name": name,
        "collector_number": "1",
        "finishes": ["nonfoil"],
        "artist": artist,
        "artist_ids": [format!("artist-{}", artist.to_lowercase().replace(' ', "-"))],
    });
    if let Some(uri) = image {
        card["image_uris"] = json!({ "normal": uri });
    }
    card
}

pub fn ruling_json(card_id: &str, comment: &str) -> Value {
    json!({
        "oracle_id": format!("oracle-{card_id}"),
        "source": "wotc",
        "published_at": "2004-10-04",
        "comment": comment,
    })
}

/// Alpha and Beta, with Black Lotus printed in both.
pub fn fixture() -> (Vec<RawPayload>, HashMap<String, Vec<RawPayload>>, Vec<RawPayload>) {
    let manifest = vec![
        set_json("lea", "Limited Edition Alpha", "1993-08-05", None),
        set_json("leb", "Limited Edition Beta", "1993-10-04", None),
    ];

    let mut cards = HashMap::new();
    cards.insert(
        "lea".to_string(),
        vec![
            card_json("lea", "lea-lotus", "Black Lotus", "Christopher Rush", None),
            card_json("lea", "lea-petal", "Lotus Petal", "April Lee", None),
            card_json("lea", "lea-mox", "Mox Pearl", "Dan Frazier", None),
        ],
    );
    cards.insert(
        "leb".to_string(),
        vec![card_json(
            "leb",
            "leb-lotus",
            "Black Lotus",
            "Christopher Rush",
            None,
        )],
    );

    let rulings = vec![ruling_json("lea-lotus", "Sacrifice is a cost.")];

    (manifest, cards, rulings)
}

pub struct FixtureSource {
    pub manifest: Vec<RawPayload>,
    pub cards: HashMap<String, Vec<RawPayload>>,
    pub rulings: Vec<RawPayload>,
}

impl FixtureSource {
    pub fn new() -> Self {
        let (manifest, cards, rulings) = fixture();
        Self {
            manifest,
            cards,
            rulings,
        }
    }
}

#[async_trait]
impl CatalogSource for FixtureSource {
    async fn fetch_manifest(&self) -> Result<Vec<RawPayload>, SourceError> {
        Ok(self.manifest.clone())
    }

    async fn fetch_set_cards(&self, set: &CatalogSet) -> Result<Vec<RawPayload>, SourceError> {
        Ok(self.cards.get(&set.code).cloned().unwrap_or_default())
    }

    async fn fetch_rulings(&self) -> Result<Vec<RawPayload>, SourceError> {
        Ok(self.rulings.clone())
    }

    async fn fetch_binary(&self, uri: &str) -> Result<Binary, SourceError> {
        Err(SourceError::Status {
            status: 404,
            url: uri.to_string(),
        })
    }
}

pub const LOTUS_IMAGE: &[u8] = b"\xff\xd8\xff\xe0 not really a jpeg";

/// Serves a one-set catalog the way a Scryfall-compatible API would.
pub async fn mock_catalog_api() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/sets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "has_more": false,
            "data": [set_json("lea", "Limited Edition Alpha", "1993-08-05", Some(format!("{base}/icons/lea.svg")))],
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cards/search"))
        .and(query_param("q", "e:lea"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "has_more": true,
            "next_page": format!("{base}/cards/page2"),
            "data": [card_json("lea", "lea-lotus", "Black Lotus", "Christopher Rush", Some(format!("{base}/img/lea-lotus.jpg")))],
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cards/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "has_more": false,
            "data": [card_json("lea", "lea-mox", "Mox Pearl", "Dan Frazier", Some(format!("{base}/img/lea-mox.jpg")))],
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bulk-data/rulings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "bulk_data",
            "type": "rulings",
            "download_uri": format!("{base}/bulk/rulings.json"),
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bulk/rulings.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([ruling_json("lea-lotus", "Sacrifice is a cost.")])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/lea-lotus.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(LOTUS_IMAGE),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/icons/lea.svg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/svg+xml")
                .set_body_string("<svg/>"),
        )
        .mount(&server)
        .await;

    // /img/lea-mox.jpg is deliberately unmounted: wiremock answers 404.
    server
}
