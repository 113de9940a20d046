use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

use crate::logging::{Level, LogEmitter, LogEvent, Stack};
use crate::models::StoreState;
use crate::store::{Action, Dispatch};

const PACKAGE: &str = "api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    fn snapshot_key(self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
        }
    }
}

/// Dispatch pipeline that reports every transition to a log emitter.
///
/// Purely an observer: the wrapped dispatcher sees exactly the actions it
/// would have seen without it, and emission never feeds back into state.
pub struct Logged<D> {
    inner: D,
    source: String,
    emitter: Arc<dyn LogEmitter>,
}

/// Compose logging around `inner`, producing the same dispatch contract.
///
/// `source` labels every event so several pipelines can share one sink.
pub fn with_logging<D: Dispatch>(
    inner: D,
    source: impl Into<String>,
    emitter: Arc<dyn LogEmitter>,
) -> Logged<D> {
    Logged {
        inner,
        source: source.into(),
        emitter,
    }
}

impl<D> Logged<D> {
    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn emit(&self, phase: Phase, action: &Value, state: &StoreState) {
        let snapshot = match serde_json::to_value(state) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "failed to serialize state snapshot");
                return;
            }
        };

        let mut message = Map::new();
        message.insert("phase".to_string(), serde_json::json!(phase));
        message.insert("source".to_string(), Value::String(self.source.clone()));
        message.insert("action".to_string(), action.clone());
        message.insert(phase.snapshot_key().to_string(), snapshot);

        self.emitter.emit(LogEvent::new(
            Stack::Frontend,
            Level::Info,
            PACKAGE,
            Value::Object(message).to_string(),
        ));
    }
}

impl<D: Dispatch> Dispatch for Logged<D> {
    fn dispatch(&mut self, action: Action) {
        let action_value = serde_json::to_value(&action).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize action");
            Value::String(action.kind().to_string())
        });

        self.emit(Phase::Before, &action_value, self.inner.state());
        self.inner.dispatch(action);
        self.emit(Phase::After, &action_value, self.inner.state());
    }

    fn state(&self) -> &StoreState {
        self.inner.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinkRecord;
    use crate::storage::MemoryStorage;
    use crate::store::{LinkStore, ManualClock, ReducerOptions};
    use std::sync::{Mutex, PoisonError};

    const NOW: i64 = 1_700_000_000_000;

    #[derive(Default)]
    struct RecordingEmitter {
        events: Mutex<Vec<LogEvent>>,
    }

    impl RecordingEmitter {
        fn messages(&self) -> Vec<Value> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|e| serde_json::from_str(&e.message).unwrap())
                .collect()
        }
    }

    impl LogEmitter for RecordingEmitter {
        fn emit(&self, event: LogEvent) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }
    }

    fn store() -> LinkStore {
        LinkStore::with_options(
            Arc::new(MemoryStorage::new()),
            Arc::new(ManualClock::new(NOW)),
            ReducerOptions::default(),
        )
    }

    #[test]
    fn test_emits_before_and_after() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mut logged = with_logging(store(), "Store", emitter.clone());

        let record = LinkRecord::new("abc", "https://a.b", NOW, None);
        logged.dispatch(Action::AddLink(record));

        let messages = emitter.messages();
        assert_eq!(messages.len(), 2);

        assert_eq!(messages[0]["phase"], "before");
        assert_eq!(messages[0]["source"], "Store");
        assert_eq!(messages[0]["action"]["type"], "ADD_LINK");
        assert_eq!(messages[0]["before"]["links"], serde_json::json!([]));
        assert!(messages[0].get("after").is_none());

        assert_eq!(messages[1]["phase"], "after");
        assert_eq!(messages[1]["after"]["links"][0]["id"], "abc");
    }

    #[test]
    fn test_events_use_collector_vocabulary() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mut logged = with_logging(store(), "Store", emitter.clone());
        logged.dispatch(Action::RemoveExpired);

        let events = emitter.events.lock().unwrap_or_else(PoisonError::into_inner);
        assert!(events.iter().all(|e| e.stack == Stack::Frontend
            && e.level == Level::Info
            && e.package == "api"));
    }

    #[test]
    fn test_does_not_alter_transitions() {
        let emitter = Arc::new(RecordingEmitter::default());
        let mut logged = with_logging(store(), "Store", emitter);
        let mut bare = store();

        let actions = [
            Action::AddLink(LinkRecord::new("abc", "https://a.b", NOW, Some(NOW - 1))),
            Action::AddLink(LinkRecord::new("def", "https://c.d", NOW, None)),
            Action::RemoveExpired,
        ];
        for action in actions {
            logged.dispatch(action.clone());
            bare.dispatch(action);
        }

        assert_eq!(logged.state(), bare.state());
        assert_eq!(logged.inner().state(), bare.state());
    }
}
