use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, instrument, warn};

use topo_core::Outcome;

use crate::execution_record::{ActionRecord, ActionStatus};
use crate::metrics::ActionMetrics;

const DEFAULT_HISTORY: usize = 1000;
const EVENT_BUFFER: usize = 1000;

/// Event emitted when an action record changes
#[derive(Clone, Debug)]
pub enum ActionEvent {
    Started(ActionRecord),
    Dispatched(String),
    /// Terminal record
    Finished(ActionRecord),
}

/// Tracker for dispatched actions
#[derive(Clone)]
pub struct ActionTracker {
    active: Arc<RwLock<HashMap<String, ActionRecord>>>,

    /// Most recent terminal records, oldest first
    completed: Arc<RwLock<VecDeque<ActionRecord>>>,

    metrics: Arc<ActionMetrics>,

    max_history: usize,

    event_sender: broadcast::Sender<ActionEvent>,
}

impl ActionTracker {
    pub fn new(metrics: Arc<ActionMetrics>) -> Self {
        Self::with_history_size(metrics, DEFAULT_HISTORY)
    }

    pub fn with_history_size(metrics: Arc<ActionMetrics>, max_history: usize) -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            active: Arc::new(RwLock::new(HashMap::new())),
            completed: Arc::new(RwLock::new(VecDeque::new())),
            metrics,
            max_history,
            event_sender: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActionEvent> {
        self.event_sender.subscribe()
    }

    /// Start tracking an action, returning its record id
    #[instrument(skip(self, record), fields(correlation_id = %record.correlation_id, action = %record.action))]
    pub async fn track(&self, record: ActionRecord) -> String {
        let record_id = record.record_id.clone();
        self.metrics.action_started(&record.action);
        let _ = self.event_sender.send(ActionEvent::Started(record.clone()));

        self.active.write().await.insert(record_id.clone(), record);
        debug!("Tracking action");
        record_id
    }

    #[instrument(skip(self))]
    pub async fn mark_dispatched(&self, record_id: &str) -> Result<()> {
        let mut active = self.active.write().await;
        let Some(record) = active.get_mut(record_id) else {
            warn!(record_id = %record_id, "Action record not found for dispatch");
            return Err(anyhow::anyhow!("Action record {} not found", record_id));
        };

        record.update_status(ActionStatus::Dispatched);
        let _ = self
            .event_sender
            .send(ActionEvent::Dispatched(record_id.to_string()));
        Ok(())
    }

    /// Close a record with its terminal outcome
    #[instrument(skip(self, outcome), fields(success = outcome.success))]
    pub async fn finish(&self, record_id: &str, outcome: &Outcome) -> Result<()> {
        let Some(mut record) = self.active.write().await.remove(record_id) else {
            warn!(record_id = %record_id, "Action record not found for completion");
            return Err(anyhow::anyhow!("Action record {} not found", record_id));
        };

        record.finish(outcome);
        let duration_ms = record.duration_ms();
        match record.status {
            ActionStatus::Completed => self.metrics.action_succeeded(&record.action, duration_ms),
            ActionStatus::Rejected => self.metrics.action_rejected(&record.action),
            _ => self.metrics.action_failed(&record.action, duration_ms),
        }

        debug!(
            correlation_id = %record.correlation_id,
            status = %record.status,
            duration_ms,
            "Action finished"
        );
        let _ = self.event_sender.send(ActionEvent::Finished(record.clone()));

        let mut completed = self.completed.write().await;
        completed.push_back(record);
        while completed.len() > self.max_history {
            completed.pop_front();
        }
        Ok(())
    }

    pub async fn get(&self, record_id: &str) -> Option<ActionRecord> {
        if let Some(record) = self.active.read().await.get(record_id) {
            return Some(record.clone());
        }
        self.completed
            .read()
            .await
            .iter()
            .find(|r| r.record_id == record_id)
            .cloned()
    }

    /// Most recent terminal record for a correlation id
    pub async fn find_by_correlation(&self, correlation_id: &str) -> Option<ActionRecord> {
        self.completed
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.correlation_id == correlation_id)
            .cloned()
    }

    pub async fn list_active(&self) -> Vec<ActionRecord> {
        self.active.read().await.values().cloned().collect()
    }

    /// Up to `limit` terminal records, newest first
    pub async fn list_recent(&self, limit: usize) -> Vec<ActionRecord> {
        self.completed
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn metrics(&self) -> Arc<ActionMetrics> {
        Arc::clone(&self.metrics)
    }
}
