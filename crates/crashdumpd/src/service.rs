//! Collection service
//!
//! Owns the state that outlives a single collection (topology cache, failure
//! ledger and reset context) and allows at most one collection in flight.
//! Collections run on the blocking pool since every bus transaction is a
//! blocking round trip.

use chrono::Utc;
use crashdump_lib::{
    format_timestamp, CollectionSummary, Collector, CrashdumpMetrics, FailureLedger, LogKind,
    LogStore, ResetContext, StoreError, StoredLog, StructuredLogger, TopologyCache, TriggerType,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("a collection is already in progress")]
    Busy,
    #[error("no processors available for collection")]
    Unavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to serialize crash dump: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("collection task failed: {0}")]
    Task(String),
}

/// State carried from one collection to the next
#[derive(Debug, Default)]
struct CollectionState {
    topology: TopologyCache,
    ledger: FailureLedger,
}

/// Clears the in-flight flag when the collection finishes or is abandoned
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct CrashdumpService {
    collector: Arc<Collector>,
    store: LogStore,
    state: Arc<Mutex<CollectionState>>,
    reset: Arc<ResetContext>,
    busy: Arc<AtomicBool>,
    last: Arc<Mutex<Option<CollectionSummary>>>,
    metrics: CrashdumpMetrics,
    logger: StructuredLogger,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CrashdumpService {
    pub fn new(collector: Collector, store: LogStore) -> Self {
        let logger = StructuredLogger::new(collector.config().platform_name.clone());
        Self {
            collector: Arc::new(collector),
            store,
            state: Arc::new(Mutex::new(CollectionState::default())),
            reset: Arc::new(ResetContext::new()),
            busy: Arc::new(AtomicBool::new(false)),
            last: Arc::new(Mutex::new(None)),
            metrics: CrashdumpMetrics::new(),
            logger,
        }
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Summary of the most recent finished collection
    pub fn last_summary(&self) -> Option<CollectionSummary> {
        lock(&self.last).clone()
    }

    /// Run processor discovery, returning how many processors were identified
    pub async fn discover(&self) -> Result<usize, ServiceError> {
        let collector = Arc::clone(&self.collector);
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || {
            let mut state = lock(&state);
            collector.discover(&mut state.topology)
        })
        .await
        .map_err(|e| ServiceError::Task(e.to_string()))
    }

    /// Record a host reset seen while a collection may be running
    pub fn notify_reset(&self) {
        self.reset.mark_reset();
        info!("Host reset recorded");
    }

    /// Start a collection in the background.
    ///
    /// Rejected with [`ServiceError::Busy`] while another collection runs and
    /// with [`ServiceError::Unavailable`] when no processor can be identified.
    pub async fn trigger(
        &self,
        trigger: TriggerType,
    ) -> Result<JoinHandle<Result<CollectionSummary, ServiceError>>, ServiceError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ServiceError::Busy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let known = lock(&self.state).topology.valid_count();
        if known == 0 && self.discover().await? == 0 {
            return Err(ServiceError::Unavailable);
        }

        info!(trigger = %trigger, "Collection triggered");
        let service = self.clone();
        Ok(tokio::spawn(async move {
            let _guard = guard;
            let result = service.collect(trigger).await;
            if let Err(e) = &result {
                error!(error = %e, "Collection failed");
            }
            result
        }))
    }

    async fn collect(&self, trigger: TriggerType) -> Result<CollectionSummary, ServiceError> {
        let collector = Arc::clone(&self.collector);
        let state = Arc::clone(&self.state);
        let reset = Arc::clone(&self.reset);
        let timestamp = format_timestamp(Utc::now());
        let run_trigger = trigger.clone();

        let report = tokio::task::spawn_blocking(move || {
            let mut state = lock(&state);
            let CollectionState { topology, ledger } = &mut *state;
            collector.run_collection(topology, ledger, &reset, &run_trigger, &timestamp)
        })
        .await
        .map_err(|e| ServiceError::Task(e.to_string()))?;

        if report.summary.cpus_collected == 0 {
            return Err(ServiceError::Unavailable);
        }

        let contents = report.document.to_json_pretty()?;
        let stored = self.store.write(
            LogKind::for_trigger(&trigger),
            &report.summary.timestamp,
            &contents,
        )?;
        self.logger.log_stored(&stored.name, contents.len());
        self.refresh_stored_gauge();

        let mut summary = report.summary;
        summary.log_name = Some(stored.name);
        *lock(&self.last) = Some(summary.clone());
        Ok(summary)
    }

    fn refresh_stored_gauge(&self) {
        if let Ok(logs) = self.store.list() {
            let stored = logs.iter().filter(|l| l.kind == LogKind::Stored).count();
            self.metrics.set_stored_logs(stored as i64);
        }
    }

    pub fn list_logs(&self) -> Result<Vec<StoredLog>, ServiceError> {
        Ok(self.store.list()?)
    }

    pub fn read_log(&self, name: &str) -> Result<String, ServiceError> {
        Ok(self.store.read(name)?)
    }

    pub fn delete_logs(&self) -> Result<usize, ServiceError> {
        let deleted = self.store.delete_all()?;
        self.refresh_stored_gauge();
        Ok(deleted)
    }
}
