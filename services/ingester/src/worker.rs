//! Queue consumer: claims ingest jobs and runs them through the processor.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use metrics::{counter, gauge, histogram};
use tracing::{error, info, warn};

use ingestion::{DatasetProcessor, IngestionError, RetryPolicy, UnitState};
use storage::{ClaimedJob, IngestJob, IngestQueue, IngestTask, ResultStore};

/// What to do with a unit after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry,
    Fail,
}

/// Transient failures are retried while attempts remain; anything else
/// fails the unit for good.
pub fn disposition(err: &IngestionError, attempt: u32, policy: &RetryPolicy) -> Disposition {
    if err.is_retryable() && policy.allows_retry(attempt) {
        Disposition::Retry
    } else {
        Disposition::Fail
    }
}

/// Run one job's task: ingest a unit or store a dataset's metadata.
pub async fn run_task<S: ResultStore + 'static>(
    processor: &DatasetProcessor<S>,
    job: &IngestJob,
) -> Result<(), IngestionError> {
    match &job.task {
        IngestTask::Unit(unit) => {
            let report = processor.ingest_unit(unit, &job.storm).await?;
            counter!("psa_units_loaded_total").increment(1);
            counter!("psa_contours_written_total").increment(report.contours);
            counter!("psa_samples_written_total").increment(report.samples);
        }
        IngestTask::Metadata(dataset) => {
            processor.process_metadata(dataset).await?;
            counter!("psa_metadata_stored_total").increment(1);
        }
    }
    Ok(())
}

/// One consumer of the ingest stream.
pub struct Worker<S> {
    name: String,
    queue: IngestQueue,
    processor: Arc<DatasetProcessor<S>>,
    block_ms: usize,
    stale_after_ms: usize,
}

impl<S: ResultStore + 'static> Worker<S> {
    pub fn new(
        name: String,
        queue: IngestQueue,
        processor: Arc<DatasetProcessor<S>>,
        block_ms: usize,
        stale_after_ms: usize,
    ) -> Self {
        Self {
            name,
            queue,
            processor,
            block_ms,
            stale_after_ms,
        }
    }

    /// Process jobs until the queue has nothing left to hand out. Returns
    /// the number of jobs handled.
    pub async fn drain(&mut self) -> Result<usize> {
        let mut handled = 0;
        for job in self
            .queue
            .reclaim_stale(&self.name, self.stale_after_ms, 100)
            .await?
        {
            self.handle(job).await;
            handled += 1;
        }
        while let Some(job) = self.queue.claim_next(&self.name, self.block_ms).await? {
            self.handle(job).await;
            handled += 1;
        }
        Ok(handled)
    }

    /// Process jobs forever.
    pub async fn run_forever(&mut self) -> Result<()> {
        info!(worker = %self.name, "Waiting for ingest jobs");
        loop {
            match self.queue.reclaim_stale(&self.name, self.stale_after_ms, 10).await {
                Ok(jobs) => {
                    for job in jobs {
                        warn!(worker = %self.name, unit = %job.job.key(), "Reclaimed stale job");
                        self.handle(job).await;
                    }
                }
                Err(e) => warn!(error = %e, "Error reclaiming stale jobs"),
            }

            match self.queue.claim_next(&self.name, self.block_ms).await {
                Ok(Some(job)) => self.handle(job).await,
                Ok(None) => {
                    if let Ok(depth) = self.queue.queue_depth().await {
                        gauge!("psa_ingest_queue_depth").set(depth as f64);
                    }
                }
                Err(e) => {
                    error!(error = %e, "Error claiming job");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle(&mut self, claimed: ClaimedJob) {
        let job = &claimed.job;
        let unit_key = job.key();
        info!(
            worker = %self.name,
            job_id = %job.id,
            unit = %unit_key,
            attempt = job.attempt,
            "Processing ingest job"
        );
        self.record_state(&unit_key, UnitState::Pending).await;

        let start = Instant::now();
        let result = run_task(&self.processor, job).await;
        histogram!("psa_unit_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(()) => {
                self.record_state(&unit_key, UnitState::Loaded).await;
                if let Err(e) = self.queue.ack(&claimed.entry_id).await {
                    error!(error = %e, unit = %unit_key, "Failed to acknowledge job");
                }
            }
            Err(e) => {
                let policy = &self.processor.config().retry;
                match disposition(&e, job.attempt, policy) {
                    Disposition::Retry => {
                        counter!("psa_unit_retries_total").increment(1);
                        warn!(unit = %unit_key, attempt = job.attempt, error = %e, "Unit failed, requeueing");
                        tokio::time::sleep(policy.delay()).await;
                        if let Err(e) = self.queue.requeue(&claimed).await {
                            error!(error = %e, unit = %unit_key, "Failed to requeue job");
                        }
                    }
                    Disposition::Fail => {
                        counter!("psa_units_failed_total").increment(1);
                        error!(unit = %unit_key, attempt = job.attempt, error = %e, "Unit failed");
                        self.record_state(&unit_key, UnitState::Failed).await;
                        if let Err(e) = self.queue.fail(&claimed, &e.to_string()).await {
                            error!(error = %e, unit = %unit_key, "Failed to record failed job");
                        }
                    }
                }
            }
        }
    }

    async fn record_state(&mut self, unit_key: &str, state: UnitState) {
        if let Err(e) = self.queue.record_state(unit_key, state.as_str()).await {
            warn!(error = %e, unit = %unit_key, "Failed to record unit state");
        }
    }
}
