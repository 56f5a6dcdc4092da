//! Workload generator for PulseVault validation
//!
//! A standalone CLI tool that wires the engine in-process, generates a
//! synthetic TSDB workload, runs a windowed aggregation over it, and
//! prints the result.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin loadgen -- \
//!   --metrics 10 \
//!   --hosts 5 \
//!   --samples-per-series 600 \
//!   --scrape-interval 1s \
//!   --aggregation sum \
//!   --step 60s
//! ```

use clap::Parser;
use pulsevault::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Workload generator for PulseVault
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of unique metric names to generate
    #[arg(long, default_value = "10")]
    metrics: usize,

    /// Number of unique hosts (one series per metric per host)
    #[arg(long, default_value = "5")]
    hosts: usize,

    /// Samples per series
    #[arg(long, default_value = "600")]
    samples_per_series: usize,

    /// Spacing between consecutive samples of a series
    #[arg(long, default_value = "1s")]
    scrape_interval: humantime::Duration,

    /// Aggregation to run over the generated window
    #[arg(long, default_value = "sum")]
    aggregation: String,

    /// Query bucket width
    #[arg(long, default_value = "60s")]
    step: humantime::Duration,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Deterministic value patterns, one per metric slot.
fn value_for(metric: usize, sample: usize) -> f64 {
    match metric % 3 {
        // Sine wave (CPU-like)
        0 => 50.0 + 40.0 * ((sample as f64) / 30.0).sin(),
        // Monotonic counter (request counts)
        1 => (sample as f64) * 7.0,
        // Constant with deterministic jitter (memory-like)
        _ => 4096.0 + ((sample * metric) % 97) as f64,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    pulsevault::telemetry::init_for_component("pulsevault-loadgen", &args.log_level)?;

    let aggregation: Aggregation = args.aggregation.parse()?;
    let step = args.step.as_micros() as i64;
    let interval = args.scrape_interval.as_micros() as i64;

    let config = Config::default();
    config.validate()?;

    let clock = Arc::new(BoundedClock::default());
    let index = Arc::new(SeriesIndex::new());
    let store = Arc::new(SampleStore::new(config.store.clone(), Arc::clone(&clock))?);
    let ingester = Ingester::new(Arc::clone(&index), Arc::clone(&store));
    let engine = QueryEngine::new(Arc::clone(&index), Arc::clone(&store));

    // Generate the whole window ending now, oldest first, inside the
    // lateness window.
    let span = interval * args.samples_per_series as i64;
    let window_start = clock.now_micros();
    let window_end = window_start + span;

    info!(
        metrics = args.metrics,
        hosts = args.hosts,
        samples_per_series = args.samples_per_series,
        "Generating workload"
    );

    for metric in 0..args.metrics {
        let name = format!("metric_{metric}");
        for host in 0..args.hosts {
            let identity = MetricIdentity::new(
                name.clone(),
                vec![Label::new("host", format!("host-{host}"))],
            )?;
            for sample in 0..args.samples_per_series {
                let timestamp = window_start + sample as i64 * interval;
                let result =
                    ingester.ingest(&identity, Sample::new(timestamp, value_for(metric, sample)));
                if let Err(e) = result {
                    warn!(identity = %identity, error = %e, "Sample rejected");
                }
            }
        }
    }

    let stats = ingester.stats();
    info!(
        accepted = stats.accepted,
        rejected_late = stats.rejected_late,
        rejected_invalid = stats.rejected_invalid,
        backpressured = stats.backpressured,
        series = index.series_count(),
        unsealed_bytes = store.unsealed_bytes(),
        "Ingestion complete"
    );

    for metric in 0..args.metrics {
        let request = QueryRequest {
            name: format!("metric_{metric}"),
            matchers: vec![],
            range: TimeRange::new(window_start, window_end),
            aggregation,
            step,
        };
        let points = engine.query(&request, &CancellationToken::new())?;
        println!("{} {}:", request.name, aggregation.as_str());
        for point in points {
            println!("  [{}] {:.3}", point.timestamp, point.value);
        }
    }

    Ok(())
}
