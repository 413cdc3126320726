//! Batch execution of conversion jobs.
//!
//! Runs one [`ConversionJob`] per input file with bounded parallelism,
//! records every job in a [`JobStore`], reuses outputs of earlier runs
//! with the same content fingerprint and reports progress on the
//! terminal.

pub mod cache;
pub mod discovery;

#[cfg(test)]
pub mod tests;

pub use cache::{CachedOutputs, content_fingerprint, find_cached, output_stem};
pub use discovery::{discover_inputs, is_supported_input};

use crate::config::MapperConfig;
use crate::constants::BATCH_CHUNK_SIZE;
use crate::error::{MapperError, Result};
use crate::jobs::{JobOutcome, JobRecord, JobStore};
use crate::models::{ProcessingStats, SensorType};
use crate::pipeline::ConversionJob;

use colored::*;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use sysinfo::System;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How a single job in a batch ended
#[derive(Debug)]
enum JobResult {
    Converted(JobOutcome),
    Cached(JobOutcome),
    Cancelled,
    Failed,
}

/// Work done on the blocking pool for one job
enum Done {
    Converted(crate::pipeline::ConversionResult),
    Cached(CachedOutputs),
}

/// Runs conversion jobs for many inputs
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    config: Arc<MapperConfig>,
    store: JobStore,
    system_monitor: Arc<Mutex<System>>,
    cancelled: Arc<AtomicBool>,
    show_progress: bool,
}

impl BatchProcessor {
    /// Create a processor writing job records into `store`
    pub fn new(config: MapperConfig, store: JobStore) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            store,
            system_monitor: Arc::new(Mutex::new(System::new())),
            cancelled: Arc::new(AtomicBool::new(false)),
            show_progress: true,
        })
    }

    /// Toggle the progress bar and the printed summary
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Share a cancellation flag with the caller
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Request cancellation: queued jobs never start, running jobs stop
    /// at their next stage boundary
    pub async fn cancel(&self) -> usize {
        self.cancelled.store(true, Ordering::SeqCst);
        let cancelled = self.store.cancel_pending().await;
        warn!("Cancellation requested, {} queued jobs cancelled", cancelled);
        cancelled
    }

    /// Check if system is under memory pressure
    async fn check_memory_pressure(&self) -> bool {
        let mut system = self.system_monitor.lock().await;
        system.refresh_memory();

        let used_memory = system.used_memory() as f64;
        let total_memory = system.total_memory() as f64;

        if total_memory == 0.0 {
            return false;
        }

        let memory_usage = used_memory / total_memory;
        let is_pressure = memory_usage > self.config.memory_threshold;

        if is_pressure {
            debug!(
                "Memory pressure detected: {:.1}% usage (threshold: {:.1}%)",
                memory_usage * 100.0,
                self.config.memory_threshold * 100.0
            );
        }

        is_pressure
    }

    /// Convert every input with the given sensor type
    pub async fn process(&self, inputs: &[PathBuf], sensor_label: &str) -> Result<ProcessingStats> {
        let sensor: SensorType = sensor_label.parse()?;
        let start_time = Instant::now();

        if self.show_progress {
            println!("{}", "Starting ocean mapping conversion".bright_green().bold());
            println!("  {} {}", "Inputs:".bright_cyan(), inputs.len());
            println!("  {} {}", "Sensor:".bright_cyan(), sensor);
            println!(
                "  {} {}",
                "Output:".bright_cyan(),
                self.config.output_dir.display()
            );
        }

        let mut jobs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let id = self.store.create(input.clone(), sensor.as_str()).await;
            jobs.push((id, input.clone()));
        }

        let pb = if self.show_progress {
            let pb = ProgressBar::new(jobs.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb.set_message("Converting");
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut stats = ProcessingStats::default();
        for chunk in jobs.chunks(BATCH_CHUNK_SIZE) {
            let mut concurrent_limit = self.config.max_concurrent_jobs.min(chunk.len()).max(1);
            if self.check_memory_pressure().await {
                concurrent_limit = (concurrent_limit / 2).max(1);
                debug!(
                    "Memory pressure detected, reducing concurrency to {}",
                    concurrent_limit
                );
            }

            stats = stream::iter(chunk.iter().cloned())
                .map(|(id, path)| {
                    let pb = pb.clone();
                    async move {
                        if let Some(file_name) = path.file_name() {
                            pb.set_message(format!("Converting: {}", file_name.to_string_lossy()));
                        }
                        let result = self.run_one(id, path, sensor).await;
                        pb.inc(1);
                        result
                    }
                })
                .buffer_unordered(concurrent_limit)
                .fold(stats, |mut stats, result| async move {
                    match result {
                        JobResult::Converted(outcome) => {
                            stats.jobs_completed += 1;
                            stats.total_points += outcome.total_points.unwrap_or(0);
                            stats.output_files.extend(outcome.output_files);
                        }
                        JobResult::Cached(outcome) => {
                            stats.jobs_completed += 1;
                            stats.jobs_cached += 1;
                            stats.total_points += outcome.total_points.unwrap_or(0);
                            stats.output_files.extend(outcome.output_files);
                        }
                        JobResult::Cancelled => stats.jobs_cancelled += 1,
                        JobResult::Failed => stats.jobs_failed += 1,
                    }
                    stats
                })
                .await;
        }

        pb.finish_with_message("All inputs processed");
        stats.output_files.sort();
        stats.processing_time_ms = start_time.elapsed().as_millis();

        info!(
            "Batch finished: {} completed ({} cached), {} failed, {} cancelled in {}ms",
            stats.jobs_completed,
            stats.jobs_cached,
            stats.jobs_failed,
            stats.jobs_cancelled,
            stats.processing_time_ms
        );

        if self.show_progress {
            print_summary(&stats);
        }

        Ok(stats)
    }

    async fn run_one(&self, id: Uuid, path: PathBuf, sensor: SensorType) -> JobResult {
        if self.cancelled.load(Ordering::SeqCst) {
            // Already cancelled by cancel_pending() in the common case
            let _ = self.store.cancel(id).await;
            return JobResult::Cancelled;
        }
        if let Err(e) = self.store.mark_processing(id).await {
            debug!("Job {} not started: {}", id, e);
            return JobResult::Cancelled;
        }

        let config = Arc::clone(&self.config);
        let cancelled = Arc::clone(&self.cancelled);
        let input = path.clone();
        let work = task::spawn_blocking(move || -> Result<Done> {
            let fingerprint = content_fingerprint(&input, sensor, &config)?;
            if !config.force_reprocess {
                if let Some(cached) = find_cached(&config, output_stem(&input), &fingerprint) {
                    return Ok(Done::Cached(cached));
                }
            }

            ConversionJob::new(input, sensor.as_str(), config)?
                .with_id(id)
                .with_fingerprint(fingerprint)
                .with_cancel_flag(cancelled)
                .run()
                .map(Done::Converted)
        });

        match work.await {
            Ok(Ok(Done::Cached(cached))) => {
                debug!("Reusing cached outputs for {}", path.display());
                let outcome = JobOutcome {
                    output_files: cached.files,
                    quality_score: cached.quality_score,
                    total_points: cached.total_points,
                    cached: true,
                };
                match self.store.complete(id, outcome.clone()).await {
                    Ok(_) => JobResult::Cached(outcome),
                    Err(e) => self.discard(id, e),
                }
            }
            Ok(Ok(Done::Converted(result))) => {
                let outcome = JobOutcome {
                    output_files: result.output_files,
                    quality_score: Some(result.quality.quality_score),
                    total_points: Some(result.metadata.total_points),
                    cached: false,
                };
                match self.store.complete(id, outcome.clone()).await {
                    Ok(_) => JobResult::Converted(outcome),
                    Err(e) => self.discard(id, e),
                }
            }
            Ok(Err(MapperError::Interrupted { reason })) => {
                warn!("{}", reason);
                self.record(self.store.cancel(id).await);
                JobResult::Cancelled
            }
            Ok(Err(e)) => {
                error!("Failed to convert {}: {}", path.display(), e);
                self.record(self.store.fail(id, e.to_string()).await);
                JobResult::Failed
            }
            Err(e) => {
                error!("Conversion task for {} aborted: {}", path.display(), e);
                self.record(self.store.fail(id, format!("conversion task aborted: {}", e)).await);
                JobResult::Failed
            }
        }
    }

    /// The store refused a completion, which happens when the job was
    /// cancelled while it ran
    fn discard(&self, id: Uuid, reason: MapperError) -> JobResult {
        debug!("Result of job {} not recorded: {}", id, reason);
        JobResult::Cancelled
    }

    fn record(&self, update: Result<JobRecord>) {
        if let Err(e) = update {
            warn!("Could not update job record: {}", e);
        }
    }
}

fn print_summary(stats: &ProcessingStats) {
    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        stats.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Jobs completed:".bright_cyan(),
        stats.jobs_completed.to_string().bright_white()
    );
    if stats.jobs_cached > 0 {
        println!(
            "  {} {}",
            "Reused from cache:".bright_cyan(),
            stats.jobs_cached.to_string().bright_white()
        );
    }
    if stats.jobs_failed > 0 {
        println!(
            "  {} {}",
            "Jobs failed:".bright_red(),
            stats.jobs_failed.to_string().bright_red().bold()
        );
    }
    if stats.jobs_cancelled > 0 {
        println!(
            "  {} {}",
            "Jobs cancelled:".bright_yellow(),
            stats.jobs_cancelled.to_string().bright_yellow()
        );
    }
    println!(
        "  {} {}",
        "Total points:".bright_cyan(),
        stats.total_points.to_string().bright_white().bold()
    );
    println!(
        "  {} {}",
        "Files written:".bright_cyan(),
        stats.output_files.len().to_string().bright_white()
    );
}
