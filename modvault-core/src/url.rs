//! Workshop URL validation.

use modvault_model::WorkshopItemId;
use url::Url;

/// Extracts the numeric item id from a workshop URL.
///
/// Accepts any `steamcommunity.com` URL whose query carries
/// `id=<digits>`, which covers both the `sharedfiles/filedetails` and
/// `workshop/filedetails` page forms. Returns `None` for anything
/// else; the caller maps that to `InvalidUrl`.
pub fn parse_workshop_url(raw: &str) -> Option<WorkshopItemId> {
    let parsed = Url::parse(raw.trim()).ok()?;
    match parsed.scheme() {
        "http" | "https" => {}
        _ => return None,
    }
    let host = parsed.host_str()?;
    if host != "steamcommunity.com" && !host.ends_with(".steamcommunity.com") {
        return None;
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .and_then(|(_, value)| {
            if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                value.parse().ok()
            } else {
                None
            }
        })
}
