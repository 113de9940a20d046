use crate::error::{StateLoadError, StorageResult};
use crate::models::{LinkRecord, StoreState};
use crate::storage::Persistence;
use tracing::warn;

/// Key holding the JSON array of link records
pub const LINKS_KEY: &str = "short_links_v1";

/// Read and validate the persisted link collection.
///
/// A missing blob is an empty collection. Anything that does not parse as
/// an array of complete records, or that breaks the store invariants for
/// `click_history_limit`, is rejected as a whole. Histories longer than
/// the limit (left behind by a larger limit) are cut to the newest entries.
pub fn try_load_links(
    persistence: &dyn Persistence,
    click_history_limit: Option<usize>,
) -> Result<Vec<LinkRecord>, StateLoadError> {
    let Some(raw) = persistence.read(LINKS_KEY)? else {
        return Ok(Vec::new());
    };

    let mut links: Vec<LinkRecord> = serde_json::from_str(&raw)?;
    if let Some(limit) = click_history_limit {
        for link in &mut links {
            link.click_details.truncate(limit);
        }
    }

    let state = StoreState::new(links);
    state
        .check_invariants(click_history_limit)
        .map_err(StateLoadError::Inconsistent)?;

    Ok(state.links)
}

/// Like [`try_load_links`], but falls back to an empty collection on any error
pub fn load_links(
    persistence: &dyn Persistence,
    click_history_limit: Option<usize>,
) -> Vec<LinkRecord> {
    match try_load_links(persistence, click_history_limit) {
        Ok(links) => links,
        Err(e) => {
            warn!(error = %e, "discarding persisted link state, starting empty");
            Vec::new()
        }
    }
}

/// Serialize the full collection and overwrite the persisted blob
pub fn save_links(persistence: &dyn Persistence, links: &[LinkRecord]) -> StorageResult<()> {
    let json = serde_json::to_string(links).map_err(anyhow::Error::from)?;
    persistence.write(LINKS_KEY, &json)
}
