use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::logging::LogEvent;
use crate::storage::Persistence;

/// Key holding the buffered log events
pub const LOGS_KEY: &str = "app_logs_v1";
pub const DEFAULT_LOG_BUFFER_CAPACITY: usize = 2000;

/// Bounded local store for log events that could not be delivered.
/// When full, the oldest entries are dropped first.
pub struct LogBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<LogEvent>>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl LogBuffer {
    /// Memory-only buffer
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
            persistence: None,
        }
    }

    /// Buffer that writes through to `persistence` and starts from whatever
    /// a previous session left there. Unreadable history is discarded.
    pub fn persistent(capacity: usize, persistence: Arc<dyn Persistence>) -> Self {
        let mut loaded: VecDeque<LogEvent> = match persistence.read(LOGS_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unreadable log buffer");
                VecDeque::new()
            }),
            Ok(None) => VecDeque::new(),
            Err(e) => {
                warn!(error = %e, "failed to read log buffer");
                VecDeque::new()
            }
        };
        while loaded.len() > capacity {
            loaded.pop_front();
        }

        Self {
            capacity,
            entries: Mutex::new(loaded),
            persistence: Some(persistence),
        }
    }

    pub fn push(&self, event: LogEvent) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if self.capacity == 0 {
            return;
        }
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);

        if let Some(persistence) = &self.persistence {
            let written = serde_json::to_string(&*entries)
                .map_err(anyhow::Error::from)
                .and_then(|json| persistence.write(LOGS_KEY, &json).map_err(Into::into));
            if let Err(e) = written {
                warn!(error = %e, "failed to persist log buffer");
            }
        }
    }

    /// All buffered events, oldest first
    pub fn entries(&self) -> Vec<LogEvent> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
