//! Command implementations for the ocean-mapper CLI
//!
//! Library errors are turned into `anyhow` errors here, with context
//! naming what the command was doing.

use crate::cli::args::{Args, Commands, ConvertArgs, InspectArgs};
use crate::config::{MapperConfig, QcMode};
use crate::ingest;
use crate::jobs::JobStore;
use crate::models::{ProcessingStats, SensorType};
use crate::pipeline::OVERLAY_REGISTRY;
use crate::processor::{BatchProcessor, discover_inputs};
use crate::qc::{AnomalyDetector, QualityRuleEngine};
use anyhow::{Context, Result, bail};
use colored::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::debug;

/// Set up structured logging on stderr
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ocean_mapper={}", log_level)));

    // try_init so a second call (tests, embedding) is harmless
    let result = if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if result.is_ok() {
        debug!("Logging initialized at level: {}", log_level);
    }
}

/// Run the selected command
pub async fn run(args: Args, store: JobStore, cancelled: Arc<AtomicBool>) -> Result<()> {
    setup_logging(&args);

    match &args.command {
        Some(Commands::Convert(convert)) => {
            run_convert(convert, args.quiet, store, cancelled).await?;
        }
        Some(Commands::Overlays) => run_overlays(),
        Some(Commands::Inspect(inspect)) => run_inspect(inspect).await?,
        None => bail!("No command given, see --help"),
    }
    Ok(())
}

async fn run_convert(
    args: &ConvertArgs,
    quiet: bool,
    store: JobStore,
    cancelled: Arc<AtomicBool>,
) -> Result<ProcessingStats> {
    let config = args.to_config().context("Invalid conversion settings")?;
    let inputs = discover_inputs(&args.inputs).context("Failed to discover input files")?;
    debug!("Discovered {} input files", inputs.len());

    let processor = BatchProcessor::new(config, store)?
        .with_progress(!quiet)
        .with_cancel_flag(cancelled);
    let stats = processor
        .process(&inputs, &args.sensor)
        .await
        .context("Batch conversion failed")?;

    if stats.jobs_failed > 0 {
        bail!(
            "{} of {} conversion jobs failed",
            stats.jobs_failed,
            inputs.len()
        );
    }
    Ok(stats)
}

fn run_overlays() {
    println!("{}", "Available overlays".bright_green().bold());
    for (selector, kind) in OVERLAY_REGISTRY {
        println!(
            "  {} {} v{}",
            selector.bright_cyan(),
            kind.name(),
            kind.version()
        );
        println!("      {}", kind.description());
        println!("      layers: {}", kind.layers().join(", "));
    }
}

async fn run_inspect(args: &InspectArgs) -> Result<()> {
    let sensor = match &args.sensor {
        Some(label) => label.parse::<SensorType>()?,
        None => SensorType::from_path(&args.file).with_context(|| {
            format!(
                "Cannot tell the sensor type of {}, pass --sensor",
                args.file.display()
            )
        })?,
    };
    let qc_mode: QcMode = args.qc_mode.parse()?;
    if qc_mode == QcMode::Skip {
        bail!("Nothing to inspect with --qc-mode skip");
    }

    let file = args.file.clone();
    let dataset = tokio::task::spawn_blocking(move || ingest::read_dataset(&file, sensor))
        .await
        .context("Inspection task aborted")?
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let config = MapperConfig::default();
    let report = QualityRuleEngine::new(config.quality_control).evaluate(&dataset, sensor.as_str());
    let detection =
        (qc_mode == QcMode::Auto).then(|| AnomalyDetector::new(config.detector).detect(&dataset));

    if args.json {
        let payload = json!({
            "file": args.file,
            "sensor_type": sensor,
            "points": dataset.len(),
            "quality": report,
            "detection": detection,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{}", "Quality Report".bright_green().bold());
    println!("  {} {}", "File:".bright_cyan(), args.file.display());
    println!("  {} {}", "Sensor:".bright_cyan(), sensor);
    println!("  {} {}", "Points:".bright_cyan(), dataset.len());
    println!("  {} {:?}", "Status:".bright_cyan(), report.status);
    println!(
        "  {} {:.3}",
        "Quality score:".bright_cyan(),
        report.quality_score
    );
    println!(
        "  {} {}",
        "Rule anomalies:".bright_cyan(),
        report.anomalies.len()
    );
    for (field, stats) in &report.statistics {
        println!(
            "    {} n={} min={:.3} max={:.3} mean={:.3} sd={:.3}",
            field, stats.count, stats.min, stats.max, stats.mean, stats.std_dev
        );
    }

    if let Some(detection) = &detection {
        println!(
            "  {} {} (confidence {:.2})",
            "Detected anomalies:".bright_cyan(),
            detection.anomalies.len(),
            detection.confidence
        );
    }

    let mut anomalies: Vec<_> = report.anomalies.iter().collect();
    if let Some(detection) = &detection {
        anomalies.extend(detection.anomalies.iter());
    }
    for anomaly in anomalies.iter().take(20) {
        let line = format!("    [{}] {}: {}", anomaly.severity, anomaly.kind, anomaly.description);
        match anomaly.severity {
            crate::models::Severity::High => println!("{}", line.bright_red()),
            _ => println!("{}", line.yellow()),
        }
    }
    if anomalies.len() > 20 {
        println!("    ... and {} more", anomalies.len() - 20);
    }

    Ok(())
}
