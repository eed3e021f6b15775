//! Redis Streams-based queue of ingest units.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use redis::{aio::MultiplexedConnection, streams::*, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use psa_common::{IngestUnit, ManifestDataset, PsaError, PsaResult, StormContext};

const STREAM_KEY: &str = "psa:ingest:jobs";
const CONSUMER_GROUP: &str = "ingesters";
const FAILED_KEY: &str = "psa:ingest:failed";
const FAILED_CHANNEL: &str = "psa:ingest:failed";
const STATE_KEY: &str = "psa:ingest:state";

/// Redis Streams job queue for ingest units.
pub struct IngestQueue {
    conn: MultiplexedConnection,
}

impl IngestQueue {
    /// Connect to Redis and initialize the stream.
    pub async fn connect(redis_url: &str) -> PsaResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| PsaError::QueueError(format!("Redis connection failed: {}", e)))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PsaError::QueueError(format!("Redis connection failed: {}", e)))?;

        // Create consumer group if it doesn't exist
        let _: Result<(), _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(STREAM_KEY)
            .arg(CONSUMER_GROUP)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        Ok(Self { conn })
    }

    /// Enqueue an ingest job.
    pub async fn enqueue(&mut self, job: &IngestJob) -> PsaResult<String> {
        let job_json = serde_json::to_string(job)?;

        let entry_id: String = redis::cmd("XADD")
            .arg(STREAM_KEY)
            .arg("*")
            .arg("job_id")
            .arg(job.id.to_string())
            .arg("unit")
            .arg(job.key())
            .arg("data")
            .arg(&job_json)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| PsaError::QueueError(format!("Enqueue failed: {}", e)))?;

        Ok(entry_id)
    }

    /// Claim the next job for `consumer_name`, blocking up to `block_ms`.
    pub async fn claim_next(
        &mut self,
        consumer_name: &str,
        block_ms: usize,
    ) -> PsaResult<Option<ClaimedJob>> {
        let opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, consumer_name)
            .count(1)
            .block(block_ms);

        let result: StreamReadReply = self
            .conn
            .xread_options(&[STREAM_KEY], &[">"], &opts)
            .await
            .map_err(|e| PsaError::QueueError(format!("Read failed: {}", e)))?;

        for stream_key in result.keys {
            for entry in stream_key.ids {
                if let Some(claimed) = self.parse_entry(&entry).await? {
                    return Ok(Some(claimed));
                }
            }
        }

        Ok(None)
    }

    /// Take over entries another consumer has held for at least
    /// `min_idle_ms` without acknowledging them.
    pub async fn reclaim_stale(
        &mut self,
        consumer_name: &str,
        min_idle_ms: usize,
        count: usize,
    ) -> PsaResult<Vec<ClaimedJob>> {
        let pending: StreamPendingCountReply = self
            .conn
            .xpending_count(STREAM_KEY, CONSUMER_GROUP, "-", "+", count)
            .await
            .map_err(|e| PsaError::QueueError(format!("XPENDING failed: {}", e)))?;

        let stale: Vec<String> = pending
            .ids
            .into_iter()
            .filter(|p| p.last_delivered_ms >= min_idle_ms)
            .map(|p| p.id)
            .collect();
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = self
            .conn
            .xclaim(STREAM_KEY, CONSUMER_GROUP, consumer_name, min_idle_ms, &stale[..])
            .await
            .map_err(|e| PsaError::QueueError(format!("XCLAIM failed: {}", e)))?;

        let mut jobs = Vec::with_capacity(claimed.ids.len());
        for entry in &claimed.ids {
            if let Some(job) = self.parse_entry(entry).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// Acknowledge a finished entry.
    pub async fn ack(&mut self, entry_id: &str) -> PsaResult<()> {
        let _: i64 = self
            .conn
            .xack(STREAM_KEY, CONSUMER_GROUP, &[entry_id])
            .await
            .map_err(|e| PsaError::QueueError(format!("XACK failed: {}", e)))?;
        Ok(())
    }

    /// Put the job back on the stream as its next attempt and acknowledge
    /// the current entry.
    pub async fn requeue(&mut self, claimed: &ClaimedJob) -> PsaResult<String> {
        let entry_id = self.enqueue(&claimed.job.next_attempt()).await?;
        self.ack(&claimed.entry_id).await?;
        Ok(entry_id)
    }

    /// Record the unit in the failed registry, announce it and acknowledge
    /// the entry.
    pub async fn fail(&mut self, claimed: &ClaimedJob, error: &str) -> PsaResult<()> {
        let key = claimed.job.key();
        let record = FailedUnit {
            job_id: claimed.job.id,
            unit: key.clone(),
            attempt: claimed.job.attempt,
            error: error.to_string(),
            failed_at: Utc::now(),
        };
        let data = serde_json::to_string(&record)?;

        let _: () = self
            .conn
            .hset(FAILED_KEY, &key, &data)
            .await
            .map_err(|e| PsaError::QueueError(format!("Store failure failed: {}", e)))?;

        let _: () = self
            .conn
            .publish(FAILED_CHANNEL, &data)
            .await
            .map_err(|e| PsaError::QueueError(format!("Publish failed: {}", e)))?;

        self.ack(&claimed.entry_id).await
    }

    /// Every unit that exhausted its retries or failed permanently.
    pub async fn failed_units(&mut self) -> PsaResult<Vec<FailedUnit>> {
        let entries: HashMap<String, String> = self
            .conn
            .hgetall(FAILED_KEY)
            .await
            .map_err(|e| PsaError::QueueError(format!("HGETALL failed: {}", e)))?;

        let mut units = entries
            .values()
            .map(|v| serde_json::from_str(v).map_err(PsaError::from))
            .collect::<PsaResult<Vec<FailedUnit>>>()?;
        units.sort_by(|a, b| a.unit.cmp(&b.unit));
        Ok(units)
    }

    /// Record the lifecycle state of a unit.
    pub async fn record_state(&mut self, unit_key: &str, state: &str) -> PsaResult<()> {
        let _: () = self
            .conn
            .hset(STATE_KEY, unit_key, state)
            .await
            .map_err(|e| PsaError::QueueError(format!("Store state failed: {}", e)))?;
        Ok(())
    }

    /// Get queue depth (entries in the stream).
    pub async fn queue_depth(&mut self) -> PsaResult<u64> {
        let info: StreamInfoStreamReply = self
            .conn
            .xinfo_stream(STREAM_KEY)
            .await
            .map_err(|e| PsaError::QueueError(format!("XINFO failed: {}", e)))?;

        Ok(info.length as u64)
    }

    /// Decode a stream entry. Undecodable entries are acknowledged and
    /// skipped so they cannot block the group.
    async fn parse_entry(&mut self, entry: &StreamId) -> PsaResult<Option<ClaimedJob>> {
        let decoded = entry
            .map
            .get("data")
            .ok_or_else(|| "missing data field".to_string())
            .and_then(|data| {
                redis::from_redis_value::<Vec<u8>>(data).map_err(|e| e.to_string())
            })
            .and_then(|bytes| {
                serde_json::from_slice::<IngestJob>(&bytes).map_err(|e| e.to_string())
            });

        match decoded {
            Ok(job) => Ok(Some(ClaimedJob {
                entry_id: entry.id.clone(),
                job,
            })),
            Err(error) => {
                warn!(entry_id = %entry.id, error = %error, "Dropping undecodable queue entry");
                self.ack(&entry.id).await?;
                Ok(None)
            }
        }
    }
}

/// What a queue entry asks the worker to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestTask {
    /// Contour and sample one `(dataset, variable, date)` unit.
    Unit(IngestUnit),
    /// Capture and store a dataset's metadata.
    Metadata(ManifestDataset),
}

/// A task plus the storm it is clipped against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: Uuid,
    pub task: IngestTask,
    pub storm: StormContext,
    /// Zero for the first try.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl IngestJob {
    pub fn new(unit: IngestUnit, storm: StormContext) -> Self {
        Self::with_task(IngestTask::Unit(unit), storm)
    }

    pub fn metadata(dataset: ManifestDataset, storm: StormContext) -> Self {
        Self::with_task(IngestTask::Metadata(dataset), storm)
    }

    fn with_task(task: IngestTask, storm: StormContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            storm,
            attempt: 0,
            created_at: Utc::now(),
        }
    }

    /// Stable identifier of the task, used for unit state and failures.
    pub fn key(&self) -> String {
        match &self.task {
            IngestTask::Unit(unit) => unit.key(),
            IngestTask::Metadata(dataset) => format!("{}:{}:metadata", dataset.psa_id, dataset.id),
        }
    }

    /// Same job, one attempt later.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// A job read from the stream, with the entry id needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub entry_id: String,
    pub job: IngestJob,
}

/// Entry of the failed-unit registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUnit {
    pub job_id: Uuid,
    pub unit: String,
    pub attempt: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}
