//! Click analytics: the click-open flow that feeds `INCREMENT_CLICK`,
//! best-effort geo enrichment, and per-link statistics.

pub mod click;
pub mod geo;
pub mod stats;

pub use click::{open_link, ClickContext};
pub use geo::{lookup_with_timeout, GeoLookup, HttpGeoLookup};
pub use stats::{collect_stats, LinkStats};
