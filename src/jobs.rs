//! Job status tracking for batch conversions.
//!
//! A [`JobStore`] is an explicit handle: the binary creates one at start-up,
//! hands clones to whatever schedules work, and clears it at shutdown.

use crate::error::{MapperError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        })
    }
}

/// Everything known about one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub input: PathBuf,
    pub sensor_type: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub output_files: Vec<PathBuf>,
    pub quality_score: Option<f64>,
    pub total_points: Option<usize>,
    pub cached: bool,
    #[serde(skip)]
    sequence: u64,
}

/// Outcome recorded when a job finishes successfully
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOutcome {
    pub output_files: Vec<PathBuf>,
    pub quality_score: Option<f64>,
    pub total_points: Option<usize>,
    pub cached: bool,
}

/// Aggregate counts over the store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobMetrics {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub active: usize,
    /// Completed over completed + failed, in percent
    pub success_rate: f64,
}

#[derive(Debug, Default)]
struct StoreInner {
    jobs: HashMap<Uuid, JobRecord>,
    next_sequence: u64,
}

/// Shared, cloneable job registry
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queued job and return its id
    pub async fn create(&self, input: impl Into<PathBuf>, sensor_type: impl Into<String>) -> Uuid {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let record = JobRecord {
            id: Uuid::new_v4(),
            input: input.into(),
            sensor_type: sensor_type.into(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            error: None,
            output_files: Vec::new(),
            quality_score: None,
            total_points: None,
            cached: false,
            sequence,
        };
        let id = record.id;
        debug!("Job {} queued for {}", id, record.input.display());
        inner.jobs.insert(id, record);
        id
    }

    async fn transition(
        &self,
        id: Uuid,
        update: impl FnOnce(&mut JobRecord) -> Result<()>,
    ) -> Result<JobRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| MapperError::validation(format!("Job not found: {}", id)))?;
        update(record)?;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Move a queued job to processing. Fails if it is no longer queued,
    /// which is how a cancelled job is kept from starting.
    pub async fn mark_processing(&self, id: Uuid) -> Result<JobRecord> {
        self.transition(id, |record| {
            if record.status != JobStatus::Queued {
                return Err(MapperError::validation(format!(
                    "Cannot start job with status: {}",
                    record.status
                )));
            }
            record.status = JobStatus::Processing;
            Ok(())
        })
        .await
    }

    /// Record a finished job. A job cancelled while it was running stays
    /// cancelled.
    pub async fn complete(&self, id: Uuid, outcome: JobOutcome) -> Result<JobRecord> {
        self.transition(id, |record| {
            reject_cancelled(record, "complete")?;
            record.status = JobStatus::Completed;
            record.output_files = outcome.output_files;
            record.quality_score = outcome.quality_score;
            record.total_points = outcome.total_points;
            record.cached = outcome.cached;
            Ok(())
        })
        .await
    }

    pub async fn fail(&self, id: Uuid, error: impl Into<String>) -> Result<JobRecord> {
        let error = error.into();
        self.transition(id, |record| {
            reject_cancelled(record, "fail")?;
            record.status = JobStatus::Failed;
            record.error = Some(error);
            Ok(())
        })
        .await
    }

    /// Cancel a queued or processing job. Work already running is not
    /// interrupted by this call, but its result is no longer recorded.
    pub async fn cancel(&self, id: Uuid) -> Result<JobRecord> {
        let record = self
            .transition(id, |record| {
                if !record.status.is_active() {
                    return Err(MapperError::validation(format!(
                        "Cannot cancel job with status: {}",
                        record.status
                    )));
                }
                record.status = JobStatus::Cancelled;
                Ok(())
            })
            .await?;
        info!("Job {} cancelled", id);
        Ok(record)
    }

    /// Cancel every job that has not started; returns how many were cancelled
    pub async fn cancel_pending(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let mut cancelled = 0;
        for record in inner.jobs.values_mut() {
            if record.status == JobStatus::Queued {
                record.status = JobStatus::Cancelled;
                record.updated_at = now;
                cancelled += 1;
            }
        }
        cancelled
    }

    pub async fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.inner.read().await.jobs.get(&id).cloned()
    }

    /// Jobs newest first, optionally filtered by status
    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Vec<JobRecord> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<JobRecord> = inner
            .jobs
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        jobs.into_iter().skip(offset).take(limit).collect()
    }

    pub async fn metrics(&self) -> JobMetrics {
        let inner = self.inner.read().await;
        let mut metrics = JobMetrics {
            total: inner.jobs.len(),
            ..Default::default()
        };
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Queued => metrics.queued += 1,
                JobStatus::Processing => metrics.processing += 1,
                JobStatus::Completed => metrics.completed += 1,
                JobStatus::Failed => metrics.failed += 1,
                JobStatus::Cancelled => metrics.cancelled += 1,
            }
        }
        metrics.active = metrics.queued + metrics.processing;

        let processed = metrics.completed + metrics.failed;
        if processed > 0 {
            let rate = metrics.completed as f64 / processed as f64 * 100.0;
            metrics.success_rate = (rate * 100.0).round() / 100.0;
        }
        metrics
    }

    /// Drop every record
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        let count = inner.jobs.len();
        inner.jobs.clear();
        debug!("Cleared {} job records", count);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.jobs.is_empty()
    }
}

fn reject_cancelled(record: &JobRecord, action: &str) -> Result<()> {
    if record.status == JobStatus::Cancelled {
        return Err(MapperError::validation(format!(
            "Cannot {} job with status: {}",
            action, record.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_job_lifecycle() {
        let store = JobStore::new();
        let id = store.create("a.csv", "mbes").await;

        assert_eq!(store.get(id).await.unwrap().status, JobStatus::Queued);
        store.mark_processing(id).await.unwrap();

        let done = store
            .complete(
                id,
                JobOutcome {
                    output_files: vec![PathBuf::from("out/a.parquet")],
                    quality_score: Some(0.9),
                    total_points: Some(10),
                    cached: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.quality_score, Some(0.9));
        assert!(done.updated_at >= done.created_at);
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let store = JobStore::new();
        let queued = store.create("a.csv", "mbes").await;
        let finished = store.create("b.csv", "mbes").await;
        store.fail(finished, "boom").await.unwrap();

        assert_eq!(
            store.cancel(queued).await.unwrap().status,
            JobStatus::Cancelled
        );
        let err = store.cancel(finished).await.unwrap_err();
        assert!(err.to_string().contains("Cannot cancel job with status: failed"));
        assert!(store.cancel(Uuid::new_v4()).await.is_err());

        // A cancelled job can no longer start
        assert!(store.mark_processing(queued).await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_running_job_stays_cancelled() {
        let store = JobStore::new();
        let id = store.create("a.csv", "mbes").await;
        store.mark_processing(id).await.unwrap();
        store.cancel(id).await.unwrap();

        let err = store
            .complete(id, JobOutcome::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot complete job with status: cancelled"));
        assert!(store.fail(id, "late").await.is_err());

        let record = store.get(id).await.unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_cancel_pending_leaves_running_jobs() {
        let store = JobStore::new();
        let running = store.create("a.csv", "mbes").await;
        store.create("b.csv", "mbes").await;
        store.create("c.csv", "mbes").await;
        store.mark_processing(running).await.unwrap();

        assert_eq!(store.cancel_pending().await, 2);
        assert_eq!(store.get(running).await.unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let store = JobStore::new();
        let mut ids = Vec::new();
        for name in ["a.csv", "b.csv", "c.csv", "d.csv"] {
            ids.push(store.create(name, "lidar").await);
        }
        store.fail(ids[1], "bad").await.unwrap();

        let all = store.list(None, 10, 0).await;
        let order: Vec<Uuid> = all.iter().map(|j| j.id).collect();
        assert_eq!(order, vec![ids[3], ids[2], ids[1], ids[0]]);

        let page = store.list(None, 2, 1).await;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[2]);

        let failed = store.list(Some(JobStatus::Failed), 10, 0).await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("bad"));
    }

    #[tokio::test]
    async fn test_metrics_and_clear() {
        let store = JobStore::new();
        assert_eq!(store.metrics().await.success_rate, 0.0);

        let ids: Vec<Uuid> = futures::future::join_all(
            (0..3).map(|i| store.create(format!("{}.csv", i), "mbes")),
        )
        .await;
        store.complete(ids[0], JobOutcome::default()).await.unwrap();
        store.complete(ids[1], JobOutcome::default()).await.unwrap();
        store.fail(ids[2], "x").await.unwrap();
        store.create("queued.csv", "mbes").await;

        let metrics = store.metrics().await;
        assert_eq!(metrics.total, 4);
        assert_eq!(metrics.completed, 2);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.active, 1);
        assert_eq!(metrics.success_rate, 66.67);

        store.clear().await;
        assert!(store.is_empty().await);
    }
}
