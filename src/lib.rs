//! # scrape-job-client
//!
//! Async Rust client for the stock scraper job service. The service runs a
//! long scrape job that collects ticker codes and closing prices within a
//! price range; this crate submits the job, polls its progress, and keeps
//! the latest snapshot available to a UI.
//!
//! - [`ParameterValidator`] checks form input before anything hits the network.
//! - [`ScrapeClient`] talks to `POST /api/scrape` and `GET /api/status`.
//! - [`JobController`] runs the polling loop and writes the [`JobStateStore`].
//! - [`order()`] produces sorted views of the results.
//!
//! ## Quick Start
//!
//! ```no_run
//! use scrape_job_client::{
//!     ClientConfig, JobController, JobPhase, ParameterInput, SortDirection, SortKey, SortSpec,
//! };
//!
//! # async fn example() -> scrape_job_client::Result<()> {
//! let controller = JobController::connect(ClientConfig::from_env());
//!
//! controller.start_job(&ParameterInput::from_form("30", "100", "500"))?;
//!
//! // The final snapshot and the phase change land on separate channels,
//! // so wait on both.
//! let mut status = controller.store().subscribe();
//! let mut phase = controller.subscribe_phase();
//! loop {
//!     if !phase.borrow_and_update().is_active() {
//!         break;
//!     }
//!     tokio::select! {
//!         changed = status.changed() => {
//!             if !changed {
//!                 break;
//!             }
//!             let snapshot = status.current();
//!             println!("{:>3}% {}", snapshot.progress_percent, snapshot.headline());
//!         }
//!         changed = phase.changed() => {
//!             if changed.is_err() {
//!                 break;
//!             }
//!         }
//!     }
//! }
//!
//! if controller.wait_for_terminal().await == JobPhase::Completed {
//!     let by_price = SortSpec::new(SortKey::Price, SortDirection::Descending);
//!     for record in controller.store().ordered_results(by_price) {
//!         println!("{} {}", record.code, record.display_price());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod order;
pub mod poller;
pub mod store;
pub mod types;
pub mod validate;

pub use client::{JobTransport, ScrapeClient};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ClientError, Result, TransportError, TransportErrorKind, ValidationError};
pub use order::order;
pub use poller::{JobController, JobPhase};
pub use store::{JobStateStore, StatusWatch};
pub use types::{
    JobParameters, JobStatus, ParameterInput, ResultRecord, SortDirection, SortKey, SortSpec,
    SubmissionAck,
};
pub use validate::ParameterValidator;
