//! In-process result store for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo::{Intersects, Rect};
use tokio::sync::RwLock;

use psa_common::{BoundingBox, PsaError, PsaResult, VariableSpec};

use crate::store::{ContourRecord, RecordQuery, ResultStore, SampleRecord, VariableRecord};

type Slot = (i64, Option<DateTime<Utc>>);

#[derive(Default)]
struct State {
    variables: Vec<VariableRecord>,
    contours: HashMap<Slot, Vec<ContourRecord>>,
    samples: HashMap<Slot, Vec<SampleRecord>>,
    dataset_metadata: HashMap<i64, serde_json::Value>,
}

/// [`ResultStore`] kept in memory behind a lock.
///
/// Replaces swap the whole slot under one write lock. `fail_writes` makes
/// the next few replaces fail with a database error.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    failing_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` contour or sample replaces.
    pub fn fail_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Total number of contour records across all slots.
    pub async fn contour_count(&self) -> usize {
        self.state.read().await.contours.values().map(Vec::len).sum()
    }

    pub async fn sample_count(&self) -> usize {
        self.state.read().await.samples.values().map(Vec::len).sum()
    }

    pub async fn variables(&self) -> Vec<VariableRecord> {
        self.state.read().await.variables.clone()
    }

    fn check_write(&self) -> PsaResult<()> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PsaError::DatabaseError("Insert failed: injected failure".to_string()));
        }
        Ok(())
    }
}

fn bbox_rect(bbox: &BoundingBox) -> Rect<f64> {
    Rect::new((bbox.min_x, bbox.min_y), (bbox.max_x, bbox.max_y))
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn get_or_create_variable(
        &self,
        psa_id: i64,
        spec: &VariableSpec,
    ) -> PsaResult<VariableRecord> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .variables
            .iter()
            .find(|v| v.psa_id == psa_id && v.name == spec.name)
        {
            return Ok(existing.clone());
        }

        let record = VariableRecord::from_spec(state.variables.len() as i64 + 1, psa_id, spec);
        state.variables.push(record.clone());
        Ok(record)
    }

    async fn update_variable(&self, record: &VariableRecord) -> PsaResult<()> {
        let mut state = self.state.write().await;
        let existing = state
            .variables
            .iter_mut()
            .find(|v| v.id == record.id)
            .ok_or_else(|| PsaError::DatabaseError(format!("No variable with id {}", record.id)))?;
        existing.color_bar = record.color_bar.clone();
        existing.metadata = record.metadata.clone();
        Ok(())
    }

    async fn replace_contours(
        &self,
        variable_id: i64,
        date: Option<DateTime<Utc>>,
        records: &[ContourRecord],
    ) -> PsaResult<u64> {
        self.check_write()?;
        let mut state = self.state.write().await;
        state.contours.insert((variable_id, date), records.to_vec());
        Ok(records.len() as u64)
    }

    async fn replace_samples(
        &self,
        variable_id: i64,
        date: Option<DateTime<Utc>>,
        records: &[SampleRecord],
    ) -> PsaResult<u64> {
        self.check_write()?;
        let mut state = self.state.write().await;
        state.samples.insert((variable_id, date), records.to_vec());
        Ok(records.len() as u64)
    }

    async fn find_contours(&self, query: &RecordQuery) -> PsaResult<Vec<ContourRecord>> {
        let state = self.state.read().await;
        let window = query.bbox.as_ref().map(bbox_rect);
        let mut found: Vec<ContourRecord> = state
            .contours
            .get(&(query.variable_id, query.date))
            .into_iter()
            .flatten()
            .filter(|r| window.map_or(true, |w| r.geometry.intersects(&w)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.value.total_cmp(&b.value));
        Ok(found)
    }

    async fn find_samples(&self, query: &RecordQuery) -> PsaResult<Vec<SampleRecord>> {
        let state = self.state.read().await;
        let window = query.bbox.as_ref().map(bbox_rect);
        Ok(state
            .samples
            .get(&(query.variable_id, query.date))
            .into_iter()
            .flatten()
            .filter(|r| window.map_or(true, |w| r.point.intersects(&w)))
            .cloned()
            .collect())
    }

    async fn save_dataset_metadata(
        &self,
        dataset_id: i64,
        metadata: &serde_json::Value,
    ) -> PsaResult<()> {
        let mut state = self.state.write().await;
        state.dataset_metadata.insert(dataset_id, metadata.clone());
        Ok(())
    }

    async fn dataset_metadata(&self, dataset_id: i64) -> PsaResult<Option<serde_json::Value>> {
        Ok(self.state.read().await.dataset_metadata.get(&dataset_id).cloned())
    }
}
