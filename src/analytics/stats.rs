use serde::Serialize;

use crate::models::{ClickEvent, StoreState};

/// Per-link summary for the statistics view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStats {
    pub id: String,
    pub short_url: String,
    pub original: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub expired: bool,
    pub clicks: u64,
    /// Most recent first
    pub click_details: Vec<ClickEvent>,
}

/// Summaries for every link, in store order (newest first)
pub fn collect_stats(state: &StoreState, base_url: &str, now: i64) -> Vec<LinkStats> {
    state
        .links
        .iter()
        .map(|link| LinkStats {
            id: link.id.clone(),
            short_url: link.short_url(base_url),
            original: link.original.clone(),
            created_at: link.created_at,
            expires_at: link.expires_at,
            expired: link.is_expired(now),
            clicks: link.clicks,
            click_details: link.click_details.clone(),
        })
        .collect()
}
