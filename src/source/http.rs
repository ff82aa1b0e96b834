use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{Binary, CatalogSource};
use crate::types::{CatalogSet, RawPayload, SourceError};

pub const DEFAULT_BASE_URL: &str = "https://api.scryfall.com/";

#[derive(Deserialize)]
struct ListPage {
    #[serde(default)]
    data: Vec<RawPayload>,
    #[serde(default)]
    has_more: bool,
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct BulkDataItem {
    download_uri: String,
}

/// Client for a Scryfall-compatible REST API.
#[derive(Clone)]
pub struct ScryfallSource {
    client: Client,
    base_url: Url,
}

impl ScryfallSource {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, SourceError> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| SourceError::Http(e.to_string()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json;q=0.9,*/*;q=0.8"),
        );
        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(path)
            .map_err(|e| SourceError::Http(e.to_string()))
    }

    fn set_search_url(&self, set: &CatalogSet) -> Result<Url, SourceError> {
        if let Some(uri) = set.search_uri.as_deref() {
            return Url::parse(uri).map_err(|e| SourceError::Http(e.to_string()));
        }
        let mut url = self.endpoint("cards/search")?;
        url.query_pairs_mut()
            .append_pair("q", &format!("e:{}", set.code))
            .append_pair("unique", "prints")
            .append_pair("include_extras", "true")
            .append_pair("include_variations", "true")
            .append_pair("order", "set");
        Ok(url)
    }

    async fn send(&self, url: &str) -> Result<Option<reqwest::Response>, SourceError> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(SourceError::Unauthorized(status.as_u16()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            s if !s.is_success() => Err(SourceError::Status {
                status: s.as_u16(),
                url: url.to_string(),
            }),
            _ => Ok(Some(response)),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, SourceError> {
        match self.send(url).await? {
            Some(response) => Ok(Some(response.json::<T>().await?)),
            None => Ok(None),
        }
    }

    /// Follows `next_page` links until the listing is exhausted.
    async fn get_list(&self, first: Url) -> Result<Option<Vec<RawPayload>>, SourceError> {
        let mut out = Vec::new();
        let mut next = Some(first.to_string());
        let mut first_page = true;

        while let Some(url) = next.take() {
            let Some(page) = self.get_json::<ListPage>(&url).await? else {
                if first_page {
                    return Ok(None);
                }
                return Err(SourceError::Status {
                    status: 404,
                    url,
                });
            };
            first_page = false;
            out.extend(page.data);
            if page.has_more {
                next = page.next_page;
            }
        }
        Ok(Some(out))
    }
}

#[async_trait]
impl CatalogSource for ScryfallSource {
    async fn fetch_manifest(&self) -> Result<Vec<RawPayload>, SourceError> {
        let url = self.endpoint("sets")?;
        self.get_list(url.clone())
            .await?
            .ok_or_else(|| SourceError::Status {
                status: 404,
                url: url.to_string(),
            })
    }

    async fn fetch_set_cards(&self, set: &CatalogSet) -> Result<Vec<RawPayload>, SourceError> {
        let url = self.set_search_url(set)?;
        // the search endpoint answers 404 when a set has no cards
        Ok(self.get_list(url).await?.unwrap_or_default())
    }

    async fn fetch_rulings(&self) -> Result<Vec<RawPayload>, SourceError> {
        let url = self.endpoint("bulk-data/rulings")?;
        let item = self
            .get_json::<BulkDataItem>(url.as_str())
            .await?
            .ok_or_else(|| SourceError::Status {
                status: 404,
                url: url.to_string(),
            })?;
        let rulings = self.get_json::<Vec<RawPayload>>(&item.download_uri).await?;
        rulings.ok_or(SourceError::Status {
            status: 404,
            url: item.download_uri,
        })
    }

    async fn fetch_binary(&self, uri: &str) -> Result<Binary, SourceError> {
        let response = self.send(uri).await?.ok_or_else(|| SourceError::Status {
            status: 404,
            url: uri.to_string(),
        })?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content = response.bytes().await?.to_vec();
        Ok(Binary {
            content,
            content_type,
        })
    }
}
