use crate::ids::{AppId, WorkshopItemId};
use serde::{Deserialize, Serialize};

/// Snapshot of scraped workshop item metadata, taken once at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub item_id: WorkshopItemId,
    pub app_id: AppId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Size the workshop page declares for the item, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,
    /// False when the page could not be parsed into a usable item.
    pub valid: bool,
}

impl ItemMetadata {
    /// Placeholder metadata for tests and for items scraped without a title.
    pub fn invalid(item_id: WorkshopItemId, app_id: AppId) -> Self {
        Self {
            item_id,
            app_id,
            title: String::new(),
            author: None,
            preview_url: None,
            declared_size: None,
            valid: false,
        }
    }
}
