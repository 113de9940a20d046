use serde::{Deserialize, Serialize};

use crate::models::{ClickEvent, LinkRecord};

/// Every state transition the link store understands.
///
/// Serializes as `{"type": "ADD_LINK", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    AddLink(LinkRecord),
    IncrementClick { id: String, detail: ClickEvent },
    RemoveExpired,
}

impl Action {
    /// Wire name of the action, for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Action::AddLink(_) => "ADD_LINK",
            Action::IncrementClick { .. } => "INCREMENT_CLICK",
            Action::RemoveExpired => "REMOVE_EXPIRED",
        }
    }
}
