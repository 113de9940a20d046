use std::time::Duration;
use tracing::debug;

use crate::analytics::geo::{lookup_with_timeout, GeoLookup};
use crate::models::ClickEvent;
use crate::store::{Action, StoreHandle};

/// Ambient details about who opened a link. Blank values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickContext {
    pub referrer: Option<String>,
    /// Client identifier, e.g. a user agent string
    pub source: Option<String>,
}

impl ClickContext {
    pub fn new(referrer: Option<String>, source: Option<String>) -> Self {
        Self { referrer, source }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Open the link `id`: record the click and return the URL to visit.
///
/// Unknown and expired links return `None` and record nothing. The geo
/// lookup is bounded by `geo_timeout`; on failure the click is recorded
/// without a location.
pub async fn open_link(
    store: &StoreHandle,
    id: &str,
    context: ClickContext,
    geo: Option<&dyn GeoLookup>,
    geo_timeout: Duration,
    now: i64,
) -> Option<String> {
    let original = store.with_state(|state| {
        state
            .get(id)
            .filter(|link| !link.is_expired(now))
            .map(|link| link.original.clone())
    })?;

    let geo = match geo {
        Some(geo) => lookup_with_timeout(geo, geo_timeout).await,
        None => None,
    };

    let detail = ClickEvent {
        timestamp: now,
        referrer: non_blank(context.referrer),
        source: non_blank(context.source),
        geo,
    };
    debug!(id, has_geo = detail.geo.is_some(), "recording click");
    store.dispatch(Action::IncrementClick {
        id: id.to_string(),
        detail,
    });

    Some(original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoInfo, LinkRecord};
    use crate::storage::MemoryStorage;
    use crate::store::{LinkStore, ManualClock, ReducerOptions};
    use async_trait::async_trait;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;
    const TIMEOUT: Duration = Duration::from_millis(200);

    struct FixedLookup;

    #[async_trait]
    impl GeoLookup for FixedLookup {
        async fn lookup(&self) -> Option<GeoInfo> {
            Some(GeoInfo {
                country: Some("Kenya".to_string()),
                city: Some("Nairobi".to_string()),
            })
        }
    }

    fn handle_with(links: Vec<LinkRecord>) -> StoreHandle {
        let handle = StoreHandle::new(LinkStore::with_options(
            Arc::new(MemoryStorage::new()),
            Arc::new(ManualClock::new(NOW)),
            ReducerOptions::default(),
        ));
        for link in links.into_iter().rev() {
            handle.dispatch(Action::AddLink(link));
        }
        handle
    }

    #[tokio::test]
    async fn test_open_records_click_with_geo() {
        let handle = handle_with(vec![LinkRecord::new("abc", "https://a.b", NOW, None)]);
        let context = ClickContext::new(Some("https://ref.example".into()), Some("  ".into()));

        let url = open_link(&handle, "abc", context, Some(&FixedLookup), TIMEOUT, NOW).await;

        assert_eq!(url.as_deref(), Some("https://a.b"));
        let link = handle.get("abc").unwrap();
        assert_eq!(link.clicks, 1);
        let detail = &link.click_details[0];
        assert_eq!(detail.timestamp, NOW);
        assert_eq!(detail.referrer.as_deref(), Some("https://ref.example"));
        assert_eq!(detail.source, None);
        assert_eq!(detail.geo.as_ref().unwrap().city.as_deref(), Some("Nairobi"));
    }

    #[tokio::test]
    async fn test_open_without_geo() {
        let handle = handle_with(vec![LinkRecord::new("abc", "https://a.b", NOW, None)]);
        open_link(&handle, "abc", ClickContext::default(), None, TIMEOUT, NOW).await;
        assert_eq!(handle.get("abc").unwrap().click_details[0].geo, None);
    }

    #[tokio::test]
    async fn test_expired_and_unknown_links_do_not_open() {
        let handle = handle_with(vec![LinkRecord::new("old", "https://a.b", NOW - 10, Some(NOW))]);
        let before = handle.snapshot();

        assert!(open_link(&handle, "old", ClickContext::default(), None, TIMEOUT, NOW)
            .await
            .is_none());
        assert!(open_link(&handle, "nope", ClickContext::default(), None, TIMEOUT, NOW)
            .await
            .is_none());
        assert_eq!(handle.snapshot(), before);
    }
}
