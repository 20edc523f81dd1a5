//! Workshop item metadata lookup.
//!
//! The metadata page is scraped, not queried; the markup has been
//! stable for years but the parse stays deliberately forgiving. The
//! provider sits behind a trait so the rest of the system never touches
//! HTTP directly.

use async_trait::async_trait;
use modvault_model::{AppId, ItemMetadata, WorkshopItemId};
use regex::Regex;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Contract for obtaining an item's metadata snapshot at submission.
#[async_trait]
pub trait ItemMetadataProvider: Send + Sync {
    async fn fetch_metadata(&self, item_id: WorkshopItemId) -> Result<ItemMetadata, ScrapeError>;
}

/// Scrapes `steamcommunity.com/sharedfiles/filedetails/?id=…`.
pub struct WorkshopPageScraper {
    http: reqwest::Client,
    base_url: String,
    title_re: Regex,
    app_re: Regex,
    author_re: Regex,
    preview_re: Regex,
    size_re: Regex,
}

impl std::fmt::Debug for WorkshopPageScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkshopPageScraper")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl WorkshopPageScraper {
    pub fn new() -> Self {
        Self::with_base_url("https://steamcommunity.com")
    }

    /// Base-URL override used by tests to point at a local server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            title_re: Regex::new(r#"<div class="workshopItemTitle">([^<]+)</div>"#)
                .expect("static regex"),
            app_re: Regex::new(r#"steamcommunity\.com/app/(\d+)"#).expect("static regex"),
            author_re: Regex::new(r#"<div class="friendBlockContent">\s*([^<\r\n]+?)<br"#)
                .expect("static regex"),
            preview_re: Regex::new(r#"id="previewImageMain"[^>]*src="([^"]+)""#)
                .expect("static regex"),
            size_re: Regex::new(r#"<div class="detailsStatRight">\s*([\d.,]+)\s*(KB|MB|GB)\s*</div>"#)
                .expect("static regex"),
        }
    }

    /// Pure parse of a fetched page, split out for testability.
    fn parse_page(&self, html: &str, item_id: WorkshopItemId) -> ItemMetadata {
        let title = self
            .title_re
            .captures(html)
            .map(|c| c[1].trim().to_string());
        let app_id = self
            .app_re
            .captures(html)
            .and_then(|c| c[1].parse::<u32>().ok())
            .map(AppId);
        let author = self
            .author_re
            .captures(html)
            .map(|c| c[1].trim().to_string())
            .filter(|a| !a.is_empty());
        let preview_url = self.preview_re.captures(html).map(|c| c[1].to_string());
        let declared_size = self
            .size_re
            .captures(html)
            .and_then(|c| parse_size(&c[1], &c[2]));

        let valid = title.is_some() && app_id.is_some();
        ItemMetadata {
            item_id,
            app_id: app_id.unwrap_or(AppId(0)),
            title: title.unwrap_or_default(),
            author,
            preview_url,
            declared_size,
            valid,
        }
    }
}

impl Default for WorkshopPageScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemMetadataProvider for WorkshopPageScraper {
    async fn fetch_metadata(&self, item_id: WorkshopItemId) -> Result<ItemMetadata, ScrapeError> {
        let url = format!(
            "{}/sharedfiles/filedetails/?id={}",
            self.base_url, item_id
        );
        let html = self.http.get(&url).send().await?.text().await?;
        Ok(self.parse_page(&html, item_id))
    }
}

fn parse_size(number: &str, unit: &str) -> Option<u64> {
    let value: f64 = number.replace(',', "").parse().ok()?;
    let multiplier = match unit {
        "KB" => 1024.0,
        "MB" => 1024.0 * 1024.0,
        "GB" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}
