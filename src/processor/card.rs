use crate::cache::CatalogCache;
use crate::configuration::BulkProcessingConfiguration;
use crate::types::{
    ArtistRecord, CanonicalCardRecord, CardError, CatalogCard, CatalogSet, ImageWriteRequest,
    RawPayload, RulingRecord,
};

/// Everything one card contributes to the stores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedCard {
    pub record: CanonicalCardRecord,
    pub rulings: Vec<RulingRecord>,
    pub images: Vec<ImageWriteRequest>,
    pub artists: Vec<ArtistRecord>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CardRecordProcessor;

impl CardRecordProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(
        &self,
        raw: &RawPayload,
        set: &CatalogSet,
        cache: &CatalogCache,
        config: &BulkProcessingConfiguration,
    ) -> Result<ProcessedCard, CardError> {
        let card = CatalogCard::from_payload(raw, set)?;

        let rulings = match (config.process_rulings, card.oracle_id.as_deref()) {
            (true, Some(oracle_id)) => cache
                .rulings_for(oracle_id)
                .iter()
                .map(|r| RulingRecord {
                    card_id: card.id.clone(),
                    oracle_id: r.oracle_id.clone(),
                    source: r.source.clone(),
                    published_at: r.published_at,
                    comment: r.comment.clone(),
                })
                .collect(),
            _ => Vec::new(),
        };

        let images = if config.download_images {
            image_requests(&card, &config.image_kinds)
        } else {
            Vec::new()
        };

        let artists = card
            .artists()
            .into_iter()
            .map(|a| ArtistRecord {
                id: a.id,
                name: a.name,
            })
            .collect();

        Ok(ProcessedCard {
            record: CanonicalCardRecord::from(&card),
            rulings,
            images,
            artists,
        })
    }
}

/// Top-level images win; double-faced cards only carry them per face.
fn image_requests(card: &CatalogCard, kinds: &[String]) -> Vec<ImageWriteRequest> {
    let mut out = Vec::new();
    for kind in kinds {
        if let Some(uri) = card.image_uris.get(kind) {
            out.push(ImageWriteRequest::card(card, None, kind, uri));
            continue;
        }
        for (i, face) in card.faces.iter().enumerate() {
            if let Some(uri) = face.image_uris.get(kind) {
                out.push(ImageWriteRequest::card(card, Some(i), kind, uri));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PayloadError;
    use serde_json::json;

    fn set() -> CatalogSet {
        CatalogSet::from_payload(&json!({ "id": "s1", "code": "lea", "name": "Limited Edition Alpha" }))
            .unwrap()
    }

    fn cache() -> CatalogCache {
        let mut cache = CatalogCache::new();
        cache.load_rulings(&[
            json!({ "oracle_id": "o1", "source": "wotc", "published_at": "2004-10-04", "comment": "Sacrifice is a cost." }),
        ]);
        cache
    }

    fn lotus() -> RawPayload {
        json!({
            "id": "c1",
            "oracle_id": "o1",
            "set_id": "s1",
            "set": "lea",
            "name": "Black Lotus",
            "collector_number": "232",
            "rarity": "rare",
            "finishes": ["nonfoil"],
            "artist": "Christopher Rush",
            "artist_ids": ["a1"],
            "image_uris": { "normal": "https://img/c1.jpg", "png": "https://img/c1.png" }
        })
    }

    #[test]
    fn card_maps_to_records() {
        let processed = CardRecordProcessor::new()
            .process(&lotus(), &set(), &cache(), &BulkProcessingConfiguration::default())
            .unwrap();

        assert_eq!(processed.record.id, "c1");
        assert_eq!(processed.record.set_code, "lea");
        assert!(processed.record.finishes.nonfoil);
        assert_eq!(processed.rulings.len(), 1);
        assert_eq!(processed.rulings[0].card_id, "c1");
        assert_eq!(
            processed.artists,
            vec![ArtistRecord {
                id: "a1".into(),
                name: "Christopher Rush".into()
            }]
        );
        assert!(processed.images.is_empty());
    }

    #[test]
    fn rulings_follow_configuration() {
        let config = BulkProcessingConfiguration {
            process_rulings: false,
            ..Default::default()
        };
        let processed = CardRecordProcessor::new()
            .process(&lotus(), &set(), &cache(), &config)
            .unwrap();
        assert!(processed.rulings.is_empty());
    }

    #[test]
    fn images_are_requested_per_kind() {
        let config = BulkProcessingConfiguration {
            download_images: true,
            image_kinds: vec!["normal".into(), "png".into(), "art_crop".into()],
            ..Default::default()
        };
        let processed = CardRecordProcessor::new()
            .process(&lotus(), &set(), &cache(), &config)
            .unwrap();
        let paths: Vec<_> = processed.images.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["cards/lea/c1/normal.jpg", "cards/lea/c1/png.png"]);
    }

    #[test]
    fn face_images_are_used_when_the_card_has_none() {
        let raw = json!({
            "id": "c2",
            "set_id": "s1",
            "name": "Delver of Secrets // Insectile Aberration",
            "finishes": ["nonfoil", "foil"],
            "card_faces": [
                { "name": "Delver of Secrets", "image_uris": { "normal": "https://img/f0.jpg" } },
                { "name": "Insectile Aberration", "image_uris": { "normal": "https://img/f1.jpg" } }
            ]
        });
        let config = BulkProcessingConfiguration {
            download_images: true,
            ..Default::default()
        };
        let processed = CardRecordProcessor::new()
            .process(&raw, &set(), &cache(), &config)
            .unwrap();
        assert_eq!(processed.images.len(), 2);
        assert_eq!(processed.images[1].path, "cards/lea/c2/1-normal.jpg");
        assert_eq!(processed.record.face_names.len(), 2);
    }

    #[test]
    fn malformed_card_is_an_error() {
        let raw = json!({ "id": "c3", "set_id": "s1", "finishes": ["nonfoil"] });
        let err = CardRecordProcessor::new()
            .process(&raw, &set(), &cache(), &BulkProcessingConfiguration::default())
            .unwrap_err();
        assert_eq!(err, CardError::Malformed(PayloadError::MissingField("name")));
    }
}
