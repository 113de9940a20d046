mod link;

pub use link::{ClickEvent, GeoInfo, LinkRecord, StoreState};
