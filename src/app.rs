//! The per-process application context.
//!
//! `LinkApp` is constructed once and handed to whatever drives it (the
//! CLI, an embedding UI). It owns the single dispatch pipeline
//! (`logging(core)`), the log buffer, the optional geo lookup and the
//! sweeper timer. Dropping it stops the sweeper; [`LinkApp::shutdown`]
//! also settles log events still on their way to the collector.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::analytics::{collect_stats, open_link, ClickContext, GeoLookup, HttpGeoLookup, LinkStats};
use crate::config::Config;
use crate::error::SubmissionError;
use crate::logging::{
    with_logging, BufferedEmitter, HttpLogEmitter, LogBuffer, LogEmitter, LogEvent,
};
use crate::models::LinkRecord;
use crate::storage::{FileStorage, Persistence};
use crate::store::{Action, Clock, Dispatch, LinkStore, ReducerOptions, StoreHandle, SystemClock};
use crate::submission::{prepare_batch, SubmissionRow};
use crate::sweeper::Sweeper;

/// Longest [`LinkApp::shutdown`] waits for the log sink before buffering
/// whatever is still in flight
pub const LOG_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

pub struct LinkApp {
    config: Config,
    store: StoreHandle,
    log_buffer: Arc<LogBuffer>,
    emitter: Arc<dyn LogEmitter>,
    geo: Option<Arc<dyn GeoLookup>>,
    clock: Arc<dyn Clock>,
    sweeper: Option<Sweeper>,
}

impl LinkApp {
    /// Build the context from configuration, persisting under the
    /// configured data directory
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let persistence: Arc<dyn Persistence> =
            Arc::new(FileStorage::new(&config.storage.data_dir)?);

        let geo: Option<Arc<dyn GeoLookup>> = match &config.analytics.geo_lookup_url {
            Some(url) => Some(Arc::new(HttpGeoLookup::new(
                url,
                config.analytics.geo_timeout(),
            )?)),
            None => None,
        };

        Self::with_parts(config, persistence, Arc::new(SystemClock), geo)
    }

    /// Build the context from explicit collaborators
    pub fn with_parts(
        config: Config,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        geo: Option<Arc<dyn GeoLookup>>,
    ) -> anyhow::Result<Self> {
        let log_buffer = Arc::new(LogBuffer::persistent(
            config.log_sink.buffer_capacity,
            Arc::clone(&persistence),
        ));

        let emitter: Arc<dyn LogEmitter> = match &config.log_sink.endpoint {
            Some(endpoint) => Arc::new(HttpLogEmitter::new(
                endpoint,
                config.log_sink.token.as_deref(),
                Arc::clone(&log_buffer),
            )?),
            None => Arc::new(BufferedEmitter::new(Arc::clone(&log_buffer))),
        };

        let core = LinkStore::with_options(
            persistence,
            Arc::clone(&clock),
            ReducerOptions {
                click_history_limit: config.analytics.click_history_limit,
            },
        );
        let store = StoreHandle::new(with_logging(
            core,
            config.log_sink.source_label.clone(),
            Arc::clone(&emitter),
        ));

        Ok(Self {
            config,
            store,
            log_buffer,
            emitter,
            geo,
            clock,
            sweeper: None,
        })
    }

    /// Start the expiration sweeper; a no-op if it is already running.
    /// Must be called from within a tokio runtime.
    pub fn start_sweeper(&mut self) {
        if self.sweeper.is_none() {
            let interval = self.config.sweeper.interval();
            info!("Starting expiration sweeper (every {}s)", interval.as_secs());
            self.sweeper = Some(Sweeper::spawn(self.store.clone(), interval));
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Validate and add a batch of rows. Either every row becomes a record
    /// or none does.
    pub fn submit(&self, rows: &[SubmissionRow]) -> Result<Vec<LinkRecord>, SubmissionError> {
        let existing = self.store.with_state(|state| state.ids());
        let limits = self.config.submission.limits();
        let records = prepare_batch(rows, &existing, self.now(), &limits)?;

        let mut added = Vec::with_capacity(records.len());
        for record in records {
            // ADD_LINK inserts at the front, possibly under a new id
            let stored = self.store.update(|store| {
                store.dispatch(Action::AddLink(record.clone()));
                store.state().links.first().cloned()
            });
            added.push(stored.unwrap_or(record));
        }
        info!(count = added.len(), "added links");
        Ok(added)
    }

    /// Record a click on `id` and return the URL to visit
    pub async fn open(&self, id: &str, context: ClickContext) -> Option<String> {
        open_link(
            &self.store,
            id,
            context,
            self.geo.as_deref(),
            self.config.analytics.geo_timeout(),
            self.now(),
        )
        .await
    }

    /// Purge expired links now; returns how many were removed
    pub fn sweep(&self) -> usize {
        self.store.remove_expired()
    }

    pub fn stats(&self) -> Vec<LinkStats> {
        let now = self.now();
        self.store
            .with_state(|state| collect_stats(state, &self.config.short_base_url, now))
    }

    /// Log events that could not be delivered, oldest first
    pub fn log_entries(&self) -> Vec<LogEvent> {
        self.log_buffer.entries()
    }

    /// Stop the sweeper, then give pending log deliveries up to
    /// [`LOG_FLUSH_TIMEOUT`] before buffering them locally
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop().await;
        }
        self.emitter.flush(LOG_FLUSH_TIMEOUT).await;
    }
}
