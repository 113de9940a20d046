use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Nullable but required: a missing key is an error, unlike serde's
/// default handling of `Option` fields.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// A single short-link record as held by the store and persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LinkRecord {
    pub id: String,
    pub original: String,
    pub created_at: i64,
    #[serde(deserialize_with = "nullable")]
    pub expires_at: Option<i64>,
    pub clicks: u64,
    /// Most recent first.
    pub click_details: Vec<ClickEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClickEvent {
    pub timestamp: i64,
    #[serde(deserialize_with = "nullable")]
    pub referrer: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub source: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub geo: Option<GeoInfo>,
}

/// Coarse, best-effort location of the clicking client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Whole store state. `links` is ordered newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
    pub links: Vec<LinkRecord>,
}

impl LinkRecord {
    /// Create a fresh record with no clicks.
    pub fn new(
        id: impl Into<String>,
        original: impl Into<String>,
        created_at: i64,
        expires_at: Option<i64>,
    ) -> Self {
        Self {
            id: id.into(),
            original: original.into(),
            created_at,
            expires_at,
            clicks: 0,
            click_details: Vec::new(),
        }
    }

    /// A record with `expires_at <= now` is expired; `None` never expires.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// Public short URL for this record, e.g. `https://lnk.example/r/promo`.
    pub fn short_url(&self, base_url: &str) -> String {
        format!("{}/r/{}", base_url.trim_end_matches('/'), self.id)
    }
}

impl ClickEvent {
    pub fn source_label(&self) -> &str {
        self.source.as_deref().unwrap_or("unknown")
    }

    pub fn referrer_label(&self) -> &str {
        self.referrer.as_deref().unwrap_or("direct")
    }

    /// "City Country", or "unknown" when nothing was resolved.
    pub fn geo_label(&self) -> String {
        let label = self
            .geo
            .as_ref()
            .map(|geo| {
                format!(
                    "{} {}",
                    geo.city.as_deref().unwrap_or(""),
                    geo.country.as_deref().unwrap_or("")
                )
                .trim()
                .to_string()
            })
            .unwrap_or_default();

        if label.is_empty() {
            "unknown".to_string()
        } else {
            label
        }
    }
}

impl StoreState {
    pub fn new(links: Vec<LinkRecord>) -> Self {
        Self { links }
    }

    pub fn get(&self, id: &str) -> Option<&LinkRecord> {
        self.links.iter().find(|link| link.id == id)
    }

    pub fn ids(&self) -> HashSet<String> {
        self.links.iter().map(|link| link.id.clone()).collect()
    }

    /// Check the structural invariants: pairwise distinct ids, and for
    /// every record `clicks == click_details.len()`.
    ///
    /// With a `click_history_limit` the oldest details are dropped while
    /// `clicks` keeps counting, so the check becomes
    /// `clicks >= click_details.len()` and `click_details.len() <= limit`.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self, click_history_limit: Option<usize>) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.links.len());
        for link in &self.links {
            if !seen.insert(link.id.as_str()) {
                return Err(format!("duplicate id '{}'", link.id));
            }

            let details = link.click_details.len();
            let consistent = match click_history_limit {
                None => link.clicks == details as u64,
                Some(limit) => link.clicks >= details as u64 && details <= limit,
            };
            if !consistent {
                return Err(format!(
                    "record '{}' has {} clicks but {} click details",
                    link.id, link.clicks, details
                ));
            }
        }
        Ok(())
    }
}
