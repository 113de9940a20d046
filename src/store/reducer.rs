use std::collections::HashSet;

use crate::models::StoreState;
use crate::shortcode::{self, MAX_LEN};
use crate::store::Action;

/// Rounds of `-xxxx` suffixing tried when an inserted id collides
pub const ADD_LINK_SUFFIX_ATTEMPTS: usize = 4;
const ADD_LINK_SUFFIX_LEN: usize = 4;

/// Knobs that change how transitions treat records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReducerOptions {
    /// Keep at most this many click details per record, newest first.
    /// `None` keeps all of them, so `clicks == click_details.len()` holds.
    pub click_history_limit: Option<usize>,
}

/// Derive the next state from `state`, `action` and the wall-clock `now`.
///
/// Deterministic except for the random suffix chosen when an added id
/// collides with an existing one.
pub fn reduce(
    mut state: StoreState,
    action: Action,
    now: i64,
    options: &ReducerOptions,
) -> StoreState {
    match action {
        Action::AddLink(mut record) => {
            let existing = state.ids();
            if existing.contains(&record.id) {
                record.id = dedupe_id(&record.id, &existing);
            }
            state.links.insert(0, record);
        }
        Action::IncrementClick { id, detail } => {
            if let Some(link) = state.links.iter_mut().find(|link| link.id == id) {
                link.clicks += 1;
                link.click_details.insert(0, detail);
                if let Some(limit) = options.click_history_limit {
                    link.click_details.truncate(limit);
                }
            }
        }
        Action::RemoveExpired => {
            state.links.retain(|link| !link.is_expired(now));
        }
    }
    state
}

/// Append `-xxxx` to `id` until it no longer collides, at most
/// [`ADD_LINK_SUFFIX_ATTEMPTS`] times. The last candidate is returned
/// even if it still collides.
fn dedupe_id(id: &str, existing: &HashSet<String>) -> String {
    let max_base = MAX_LEN - ADD_LINK_SUFFIX_LEN - 1;
    let base: String = id.chars().take(max_base).collect();

    let mut candidate = id.to_string();
    for _ in 0..ADD_LINK_SUFFIX_ATTEMPTS {
        candidate = format!("{base}-{}", shortcode::disambiguator(ADD_LINK_SUFFIX_LEN));
        if !existing.contains(&candidate) {
            return candidate;
        }
    }
    tracing::warn!(id = %candidate, "inserting record with colliding id");
    candidate
}
