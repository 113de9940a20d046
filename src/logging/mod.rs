//! Structured log events for the external log sink, and the dispatch
//! middleware that produces them.
//!
//! This is separate from the crate's own `tracing` diagnostics: these
//! events are domain data shipped to a collector, with a local ring buffer
//! as fallback when the collector cannot be reached.

mod buffer;
mod emitter;
mod event;
mod middleware;

pub use buffer::{LogBuffer, DEFAULT_LOG_BUFFER_CAPACITY, LOGS_KEY};
pub use emitter::{BufferedEmitter, HttpLogEmitter, LogEmitter};
pub use event::{Level, LogEvent, Stack};
pub use middleware::{with_logging, Logged, Phase};
