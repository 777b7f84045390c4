//! Parley Garbage Collection Worker
//!
//! Periodically reclaims sessions past their hard TTL or inactivity
//! threshold and backfills freed slots from the queue:
//! 1. Runs the expiry reaper on a configurable interval
//! 2. Reconciles the waiting queue after any reclaim
//! 3. Backs off after consecutive failures

use parley_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    scheduler::reaper,
    VERSION,
};
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting Parley GC Worker v{}", VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repo = Repository::new(db);

    // Check for command line arguments for a single manual pass
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "once" {
        info!("Running a single garbage collection pass...");

        match reaper::run_gc(&repo, &config.scheduler).await {
            Ok(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Err(e) => {
                error!(error = %e, "Garbage collection failed");
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }

        return Ok(());
    }

    info!(
        interval_secs = config.scheduler.gc_interval_secs,
        "GC worker ready, starting periodic passes..."
    );

    // Circuit breaker state
    let mut consecutive_failures = 0;
    const MAX_FAILURES: u32 = 5;
    const CIRCUIT_BREAK_DURATION: std::time::Duration = std::time::Duration::from_secs(30);

    let mut interval = tokio::time::interval(config.scheduler.gc_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // Start the reap loop
    loop {
        // Circuit breaker check
        if consecutive_failures >= MAX_FAILURES {
            warn!(
                failures = consecutive_failures,
                "Circuit breaker open, pausing..."
            );
            tokio::time::sleep(CIRCUIT_BREAK_DURATION).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = interval.tick() => {
                match reaper::run_gc(&repo, &config.scheduler).await {
                    Ok(report) => {
                        consecutive_failures = 0;
                        if report.hard_expired + report.inactivity_expired > 0 {
                            info!(
                                hard_expired = report.hard_expired,
                                inactivity_expired = report.inactivity_expired,
                                queue_activated = report.queue_activated,
                                "Reclaimed sessions"
                            );
                        }
                    }
                    Err(e) => {
                        // Non-fatal: the next tick retries the same
                        // idempotent pass.
                        consecutive_failures += 1;
                        error!(
                            error = %e,
                            failures = consecutive_failures,
                            "Garbage collection pass failed"
                        );
                    }
                }
            }
        }
    }

    info!("GC worker shutting down");
    Ok(())
}
