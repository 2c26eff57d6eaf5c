//! Submit a scrape job and follow its progress until it finishes.
//!
//! Reads the service address from `SCRAPER_API_BASE_URL` (or `.env`).
//!
//! ```sh
//! cargo run --example watch_job -- 30 100 500
//! ```

use scrape_job_client::{
    ClientConfig, JobController, JobPhase, ParameterInput, SortDirection, SortKey, SortSpec,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let field = |i: usize, default: &'static str| args.get(i).map(String::as_str).unwrap_or(default);
    let input = ParameterInput::from_form(field(0, "30"), field(1, "100"), field(2, "500"));

    let config = ClientConfig::from_env();
    println!("Job service: {}", config.base_url);
    let controller = JobController::connect(config);

    // Show whatever the service is doing right now.
    match controller.refresh().await {
        Ok(status) => println!("Current status: {}", status.headline()),
        Err(e) => eprintln!("Status check failed: {}", e),
    }

    controller.start_job(&input)?;

    let mut status = controller.store().subscribe();
    let mut phase = controller.subscribe_phase();
    loop {
        if !phase.borrow_and_update().is_active() {
            break;
        }
        tokio::select! {
            changed = status.changed() => {
                if !changed {
                    break;
                }
                let snapshot = status.current();
                let marker = if snapshot.has_error() { "!" } else { " " };
                println!(" {marker}[{:>3}%] {}", snapshot.progress_percent, snapshot.headline());
            }
            changed = phase.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    match controller.wait_for_terminal().await {
        JobPhase::Completed => {
            let results = controller
                .store()
                .ordered_results(SortSpec::new(SortKey::Code, SortDirection::Ascending));
            println!("Done! {} record(s)", results.len());
            for record in &results {
                println!("  {:<6} {:>12}", record.code, record.display_price());
            }
        }
        JobPhase::Failed => eprintln!("Failed: {}", controller.store().current().headline()),
        other => eprintln!("Stopped in unexpected phase {:?}", other),
    }

    Ok(())
}
