use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Metadata service returned status {0}")]
    Status(u16),
}

/// What the metadata service extracted from a page. `meta` holds the raw
/// `<meta>` properties (`og:title`, `og:price:amount`, ...).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub meta: HashMap<String, String>,
    pub price: Option<String>,
    pub currency: Option<String>,
    pub image: Option<String>,
}

impl PageMetadata {
    pub fn name(&self) -> Option<&str> {
        self.pick("og:title", &self.title)
    }

    pub fn price_text(&self) -> Option<&str> {
        self.pick("og:price:amount", &self.price)
    }

    pub fn currency(&self) -> Option<&str> {
        self.pick("og:price:currency", &self.currency)
    }

    pub fn image(&self) -> Option<&str> {
        self.pick("og:image", &self.image)
    }

    // Open Graph property first, then the plain field. Blank counts as absent.
    fn pick<'a>(&'a self, key: &str, fallback: &'a Option<String>) -> Option<&'a str> {
        self.meta
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .or_else(|| fallback.as_deref().map(str::trim).filter(|v| !v.is_empty()))
    }
}

#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageMetadata, FetchError>;
}

/// Client for `GET {base}/meta-fetcher?url=...`.
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, url: &str) -> Result<PageMetadata, FetchError> {
        let response = self
            .client
            .get(format!("{}/meta-fetcher", self.base_url))
            .query(&[("url", url)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.json::<PageMetadata>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(meta: &[(&str, &str)]) -> PageMetadata {
        PageMetadata {
            meta: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn open_graph_wins_over_plain_fields() {
        let mut metadata = page(&[("og:title", "OG Title"), ("og:image", "https://img/og.png")]);
        metadata.title = Some("Plain".into());
        metadata.image = Some("https://img/plain.png".into());

        assert_eq!(metadata.name(), Some("OG Title"));
        assert_eq!(metadata.image(), Some("https://img/og.png"));
    }

    #[test]
    fn blank_values_fall_through() {
        let mut metadata = page(&[("og:title", "  "), ("og:price:amount", "")]);
        metadata.title = Some("Fallback".into());
        metadata.price = Some("12.50".into());

        assert_eq!(metadata.name(), Some("Fallback"));
        assert_eq!(metadata.price_text(), Some("12.50"));
        assert_eq!(metadata.currency(), None);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let metadata: PageMetadata = serde_json::from_str(r#"{"title":"Only title"}"#).unwrap();
        assert_eq!(metadata.name(), Some("Only title"));
        assert!(metadata.meta.is_empty());
        assert_eq!(metadata.image(), None);
    }
}
