use std::sync::Arc;

use tokio::sync::watch;

use crate::order;
use crate::types::{JobStatus, ResultRecord, SortSpec};

#[derive(Debug, Clone, Default)]
struct StoreState {
    /// Sequence number of the fetch that produced `status` (0 = none yet).
    seq: u64,
    status: JobStatus,
}

/// Holds the current [`JobStatus`] and notifies readers when it changes.
///
/// Cloning the store is cheap and every clone sees the same state. Only the
/// [`JobController`](crate::JobController) writes to it; everything public
/// here is read-only.
#[derive(Debug, Clone)]
pub struct JobStateStore {
    tx: Arc<watch::Sender<StoreState>>,
}

impl Default for JobStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStateStore {
    /// A store holding the idle "ready" snapshot.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StoreState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current snapshot.
    pub fn current(&self) -> JobStatus {
        self.tx.borrow().status.clone()
    }

    pub fn results(&self) -> Vec<ResultRecord> {
        self.tx.borrow().status.results.clone()
    }

    /// The current results in the order `spec` asks for. The stored order
    /// is left untouched.
    pub fn ordered_results(&self, spec: SortSpec) -> Vec<ResultRecord> {
        order::order(&self.tx.borrow().status.results, spec)
    }

    /// Sequence number of the last applied fetch, 0 before the first one.
    pub fn last_applied_seq(&self) -> u64 {
        self.tx.borrow().seq
    }

    /// Watch for snapshot changes.
    pub fn subscribe(&self) -> StatusWatch {
        StatusWatch {
            rx: self.tx.subscribe(),
        }
    }

    /// Replace the snapshot with the result of fetch `seq`.
    ///
    /// Returns `false` and leaves the store alone when a fetch issued later
    /// than `seq` has already been applied.
    pub(crate) fn apply(&self, seq: u64, status: JobStatus) -> bool {
        self.tx.send_if_modified(|state| {
            if seq <= state.seq {
                return false;
            }
            state.seq = seq;
            state.status = status;
            true
        })
    }

    /// Attach a transient error from failed fetch `seq` to the current
    /// snapshot. Same staleness rule as [`apply`](Self::apply).
    pub(crate) fn annotate_error(&self, seq: u64, message: String) -> bool {
        self.tx.send_if_modified(|state| {
            if seq <= state.seq {
                return false;
            }
            state.seq = seq;
            state.status.error = Some(message);
            true
        })
    }

    /// Mark the job as finished with a client-side failure. Fields the
    /// service reported are kept.
    pub(crate) fn record_failure(&self, error: String, status_message: &str) {
        self.tx.send_modify(|state| {
            state.status.is_running = false;
            state.status.error = Some(error);
            state.status.status_message = status_message.to_string();
        });
    }
}

/// Read handle that can await snapshot changes.
#[derive(Debug, Clone)]
pub struct StatusWatch {
    rx: watch::Receiver<StoreState>,
}

impl StatusWatch {
    /// Wait for the next change. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn current(&self) -> JobStatus {
        self.rx.borrow().status.clone()
    }
}
