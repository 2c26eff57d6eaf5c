use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::{JobTransport, ScrapeClient};
use crate::config::{ClientConfig, MIN_POLL_INTERVAL};
use crate::error::{ClientError, Result, TransportError};
use crate::store::JobStateStore;
use crate::types::{JobParameters, JobStatus, ParameterInput, SubmissionAck};
use crate::validate::ParameterValidator;

const SUBMIT_FAILED_MESSAGE: &str = "submission failed";
const POLL_FAILED_MESSAGE: &str = "status polling failed";
const CANCELLED_MESSAGE: &str = "cancelled";

/// A status fetch tagged with the sequence number it was issued under.
type PollResult = (u64, std::result::Result<JobStatus, TransportError>);

/// Lifecycle of the job a [`JobController`] is tracking.
///
/// `Idle → Submitting → Polling → Completed | Failed`. A new job may be
/// started from `Idle`, `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
}

impl JobPhase {
    /// A job is being submitted or polled.
    pub fn is_active(self) -> bool {
        matches!(self, JobPhase::Submitting | JobPhase::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

/// Submits scrape jobs and polls their status into a [`JobStateStore`].
///
/// The controller is the only writer of its store. At most one job is
/// tracked at a time; the polling loop runs as a background Tokio task and
/// is cancelled when the job reaches a terminal phase, when
/// [`cancel()`](Self::cancel) is called, or when the controller is dropped.
///
/// # Example
/// ```no_run
/// use scrape_job_client::{JobController, JobPhase, ParameterInput};
///
/// # async fn example() -> scrape_job_client::Result<()> {
/// let controller = JobController::from_env();
/// controller.start_job(&ParameterInput::new(30, Some(100.0), Some(500.0)))?;
///
/// if controller.wait_for_terminal().await == JobPhase::Completed {
///     for record in controller.store().results() {
///         println!("{} {}", record.code, record.display_price());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct JobController<T: JobTransport + 'static> {
    transport: Arc<T>,
    config: ClientConfig,
    validator: ParameterValidator,
    store: JobStateStore,
    phase: Arc<watch::Sender<JobPhase>>,
    seq: Arc<AtomicU64>,
    cancel: Mutex<CancellationToken>,
}

impl JobController<ScrapeClient> {
    /// Controller talking HTTP to the service named in `config`.
    pub fn connect(config: ClientConfig) -> Self {
        let client = ScrapeClient::from_config(&config);
        Self::new(client, config)
    }

    /// Controller configured from environment variables.
    /// See [`ClientConfig::from_env`].
    pub fn from_env() -> Self {
        Self::connect(ClientConfig::from_env())
    }
}

impl<T: JobTransport + 'static> JobController<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let (phase, _rx) = watch::channel(JobPhase::Idle);
        Self {
            transport: Arc::new(transport),
            validator: ParameterValidator::new(config.max_desired_count),
            config,
            store: JobStateStore::new(),
            phase: Arc::new(phase),
            seq: Arc::new(AtomicU64::new(0)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn store(&self) -> &JobStateStore {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn phase(&self) -> JobPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<JobPhase> {
        self.phase.subscribe()
    }

    /// Validate `input` and, if no job is in flight, start submitting it.
    ///
    /// Returns once the job has been claimed; submission and polling run in
    /// a spawned task. Observe progress through [`store()`](Self::store) and
    /// [`subscribe_phase()`](Self::subscribe_phase). Must be called from
    /// within a Tokio runtime.
    ///
    /// Fails without touching the store when the input is invalid or a job
    /// is already submitting or polling.
    pub fn start_job(&self, input: &ParameterInput) -> Result<()> {
        let params = self.validator.validate(input)?;

        let mut busy = None;
        self.phase.send_if_modified(|phase| {
            if phase.is_active() {
                busy = Some(*phase);
                return false;
            }
            *phase = JobPhase::Submitting;
            true
        });
        if let Some(phase) = busy {
            tracing::warn!(?phase, "Rejecting job start, a job is already in flight");
            return Err(ClientError::JobInFlight(phase));
        }

        let token = CancellationToken::new();
        {
            let mut current = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            current.cancel();
            *current = token.clone();
        }

        let run = JobRun {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            store: self.store.clone(),
            phase: Arc::clone(&self.phase),
            seq: Arc::clone(&self.seq),
        };
        tokio::spawn(run.run(params, token));
        Ok(())
    }

    /// Fetch the status once and apply it, e.g. to show a job that was
    /// started elsewhere. Rejected while this controller has a job in flight.
    pub async fn refresh(&self) -> Result<JobStatus> {
        let phase = self.phase();
        if phase.is_active() {
            return Err(ClientError::JobInFlight(phase));
        }
        let seq = next_seq(&self.seq);
        let status = self.transport.fetch_status().await?;
        if !self.store.apply(seq, status) {
            tracing::debug!(seq, "Discarding stale refresh response");
        }
        Ok(self.store.current())
    }

    /// Stop tracking the active job. It ends in [`JobPhase::Failed`].
    /// Does nothing when no job is in flight.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Wait until the current job leaves `Submitting`/`Polling` and return
    /// the phase it ended in. Returns immediately when no job is active.
    pub async fn wait_for_terminal(&self) -> JobPhase {
        let mut rx = self.phase.subscribe();
        let phase = match rx.wait_for(|phase| !phase.is_active()).await {
            Ok(phase) => *phase,
            Err(_) => self.phase(),
        };
        phase
    }
}

impl<T: JobTransport + 'static> Drop for JobController<T> {
    fn drop(&mut self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

fn next_seq(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

/// Everything the background task of one job needs.
struct JobRun<T> {
    transport: Arc<T>,
    config: ClientConfig,
    store: JobStateStore,
    phase: Arc<watch::Sender<JobPhase>>,
    seq: Arc<AtomicU64>,
}

#[derive(Default)]
struct PollTracker {
    consecutive_failures: u32,
    seen_running: bool,
    idle_polls: u32,
}

impl<T: JobTransport + 'static> JobRun<T> {
    async fn run(self, params: JobParameters, cancel: CancellationToken) {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Job cancelled");
                self.store
                    .record_failure("polling cancelled".to_string(), CANCELLED_MESSAGE);
                JobPhase::Failed
            }
            phase = self.drive(&params) => phase,
        };
        self.set_phase(outcome);
    }

    async fn drive(&self, params: &JobParameters) -> JobPhase {
        tracing::info!(
            count = params.desired_count(),
            min_price = params.min_price(),
            max_price = params.max_price(),
            "Submitting scrape job"
        );

        match self.transport.submit_job(params).await {
            Ok(ack) => log_ack(&ack),
            Err(e) => {
                tracing::error!(error = %e, "Scrape job submission failed");
                self.store.record_failure(e.to_string(), SUBMIT_FAILED_MESSAGE);
                return JobPhase::Failed;
            }
        }

        self.set_phase(JobPhase::Polling);
        self.poll_until_terminal().await
    }

    async fn poll_until_terminal(&self) -> JobPhase {
        let period = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: FuturesUnordered<BoxFuture<'static, PollResult>> =
            FuturesUnordered::new();
        let mut tracker = PollTracker::default();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if in_flight.len() >= self.config.max_in_flight.max(1) {
                        tracing::debug!(in_flight = in_flight.len(), "Skipping poll tick");
                        continue;
                    }
                    let seq = next_seq(&self.seq);
                    let transport = Arc::clone(&self.transport);
                    in_flight.push(async move { (seq, transport.fetch_status().await) }.boxed());
                }
                Some((seq, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    if let Some(phase) = self.handle_poll(seq, result, &mut tracker) {
                        return phase;
                    }
                }
            }
        }
    }

    /// Apply one poll result. Returns the terminal phase when the job ended.
    fn handle_poll(
        &self,
        seq: u64,
        result: std::result::Result<JobStatus, TransportError>,
        tracker: &mut PollTracker,
    ) -> Option<JobPhase> {
        match result {
            Ok(status) => {
                let running = status.is_running;
                let progress = status.progress_percent;
                let reported_error = status.error.clone();

                if !self.store.apply(seq, status) {
                    tracing::debug!(seq, "Discarding stale status response");
                    return None;
                }
                tracker.consecutive_failures = 0;

                if let Some(error) = reported_error {
                    tracing::error!(seq, %error, "Job service reported a failure");
                    return Some(JobPhase::Failed);
                }

                if running {
                    tracker.seen_running = true;
                    tracing::debug!(seq, progress, "Job running");
                    return None;
                }

                if tracker.seen_running {
                    tracing::info!(
                        seq,
                        results = self.store.current().results.len(),
                        "Job completed"
                    );
                    return Some(JobPhase::Completed);
                }

                tracker.idle_polls += 1;
                if tracker.idle_polls > self.config.startup_grace_polls {
                    tracing::info!(
                        seq,
                        idle_polls = tracker.idle_polls,
                        "Job never reported running, treating it as completed"
                    );
                    return Some(JobPhase::Completed);
                }
                None
            }
            Err(e) => {
                if !self.store.annotate_error(seq, e.to_string()) {
                    tracing::debug!(seq, error = %e, "Discarding stale poll failure");
                    return None;
                }
                tracker.consecutive_failures += 1;
                tracing::warn!(
                    seq,
                    failures = tracker.consecutive_failures,
                    error = %e,
                    "Status poll failed"
                );

                if tracker.consecutive_failures >= self.config.max_consecutive_failures {
                    tracing::error!(
                        failures = tracker.consecutive_failures,
                        "Giving up on status polling"
                    );
                    self.store.record_failure(
                        format!(
                            "Status polling failed {} times in a row: {}",
                            tracker.consecutive_failures, e
                        ),
                        POLL_FAILED_MESSAGE,
                    );
                    return Some(JobPhase::Failed);
                }
                None
            }
        }
    }

    fn set_phase(&self, phase: JobPhase) {
        tracing::info!(?phase, "Job phase changed");
        self.phase.send_replace(phase);
    }
}

fn log_ack(ack: &SubmissionAck) {
    match ack.message() {
        Some(message) => tracing::info!(%message, "Scrape job accepted"),
        None => tracing::info!("Scrape job accepted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_predicates() {
        assert!(!JobPhase::Idle.is_active());
        assert!(JobPhase::Submitting.is_active());
        assert!(JobPhase::Polling.is_active());
        assert!(JobPhase::Completed.is_terminal());
        assert!(JobPhase::Failed.is_terminal());
        assert!(!JobPhase::Idle.is_terminal());
    }

    #[test]
    fn test_next_seq_is_monotonic() {
        let counter = AtomicU64::new(0);
        assert_eq!(next_seq(&counter), 1);
        assert_eq!(next_seq(&counter), 2);
        assert_eq!(next_seq(&counter), 3);
    }

    #[test]
    fn test_connect_uses_config() {
        let config = ClientConfig::builder()
            .with_base_url("http://scraper.internal:5000/")
            .with_max_desired_count(50)
            .build();
        let controller = JobController::connect(config);
        assert_eq!(controller.transport().endpoint(), "http://scraper.internal:5000");
        assert_eq!(controller.phase(), JobPhase::Idle);
        assert_eq!(controller.config().max_desired_count, 50);
    }

    #[test]
    fn test_validation_failure_leaves_controller_idle() {
        let controller = JobController::connect(ClientConfig::default());
        let err = controller
            .start_job(&ParameterInput::new(30, Some(500.0), Some(100.0)))
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(controller.phase(), JobPhase::Idle);
    }

    #[tokio::test]
    async fn test_wait_for_terminal_when_idle() {
        let controller = JobController::connect(ClientConfig::default());
        assert_eq!(controller.wait_for_terminal().await, JobPhase::Idle);
    }
}
