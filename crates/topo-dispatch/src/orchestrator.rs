//! Dispatch Orchestrator
//!
//! A batch runs in three steps:
//!
//! 1. Expansion: batch requests become one `CreateNode` action per member,
//!    with ids and positions from the allocator.
//! 2. Waves: actions are validated in submission order against the cache.
//!    Consecutive valid actions with disjoint footprints form a wave whose
//!    gateway calls are in flight together. An action overlapping the wave
//!    (or a full wave) first waits for the wave to finish.
//! 3. Reconciliation: finished waves are applied to the cache in submission
//!    order, confirmed results only.
//!
//! Whole batches are serialized against each other.

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use topo_core::{
    Action, ActionBody, ActionError, Allocator, BackendResult, Confirmation, DeleteTarget,
    ErrorKind, Footprint, LinkKey, LinkSelector, Outcome, Position, Request, RequestBody,
    TopologyState,
};
use topo_execution_tracker::{ActionRecord, ActionTracker};
use topo_network::{BackendGateway, GatewayError};
use topo_state::{validate, Applied, TopologyCache};

use crate::config::OrchestratorConfig;
use crate::report::{DispatchReport, RequestReport};

/// A validated action waiting for its wave to run
struct Pending {
    index: usize,
    action: Action,
    /// What the gateway is sent; differs from `action` only in resolved link ids
    wire: ActionBody,
    footprint: Footprint,
    record_id: Option<String>,
}

pub struct Orchestrator {
    gateway: Arc<dyn BackendGateway>,
    cache: Arc<RwLock<TopologyCache>>,
    allocator: Mutex<Allocator>,
    tracker: Option<Arc<ActionTracker>>,
    config: OrchestratorConfig,
    batch_lock: Mutex<()>,
}

impl Orchestrator {
    /// Fails on a config that could not dispatch, e.g. a non-positive layout step
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        config: OrchestratorConfig,
    ) -> topo_core::Result<Self> {
        let config = config.validated()?;
        Ok(Self {
            gateway,
            cache: Arc::new(RwLock::new(TopologyCache::new())),
            allocator: Mutex::new(Allocator::new(config.layout.clone())),
            tracker: None,
            config,
            batch_lock: Mutex::new(()),
        })
    }

    pub fn with_tracker(mut self, tracker: Arc<ActionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Seed the cache with a known topology, e.g. a snapshot fetched earlier
    pub fn with_state(mut self, state: TopologyState) -> Self {
        self.allocator.get_mut().observe_nodes(state.nodes.values());
        self.cache = Arc::new(RwLock::new(TopologyCache::from_snapshot(state)));
        self
    }

    pub fn gateway(&self) -> &Arc<dyn BackendGateway> {
        &self.gateway
    }

    pub fn cache(&self) -> Arc<RwLock<TopologyCache>> {
        Arc::clone(&self.cache)
    }

    pub fn tracker(&self) -> Option<&Arc<ActionTracker>> {
        self.tracker.as_ref()
    }

    pub async fn snapshot(&self) -> TopologyState {
        self.cache.read().await.snapshot()
    }

    /// Replace the cache with the backend's authoritative topology
    pub async fn resync(&self) -> Result<TopologyState, GatewayError> {
        let _batch = self.batch_lock.lock().await;
        let snapshot = self.gateway.fetch_snapshot().await?;

        self.allocator
            .lock()
            .await
            .observe_nodes(snapshot.nodes.values());
        self.cache.write().await.replace(snapshot.clone());

        info!(
            gateway = self.gateway.name(),
            nodes = snapshot.nodes.len(),
            links = snapshot.links.len(),
            "Topology cache resynced from backend"
        );
        Ok(snapshot)
    }

    /// Expand, validate, execute and reconcile a batch. Never aborts early:
    /// every expanded action yields exactly one outcome.
    pub async fn dispatch(&self, requests: Vec<Request>) -> DispatchReport {
        let _batch = self.batch_lock.lock().await;
        let batch_id = uuid::Uuid::new_v4().to_string();

        let (actions, ranges) = self.expand(requests).await;
        info!(
            batch_id = %batch_id,
            requests = ranges.len(),
            actions = actions.len(),
            "Dispatching batch"
        );

        let mut outcomes: Vec<Option<Outcome>> = vec![None; actions.len()];
        let mut wave: Vec<Pending> = Vec::new();
        let max_in_flight = self.config.max_in_flight.max(1);

        for (index, action) in actions.into_iter().enumerate() {
            let record_id = self.track(&batch_id, &action).await;
            let footprint = action.body.footprint();

            if wave.len() >= max_in_flight || wave.iter().any(|p| p.footprint.overlaps(&footprint))
            {
                self.flush(&mut wave, &mut outcomes).await;
            }

            let cache = self.cache.read().await;
            if let Err(rejection) = validate(&action.body, cache.state()) {
                drop(cache);
                debug!(
                    correlation_id = %action.correlation_id,
                    action = action.body.name(),
                    reason = %rejection,
                    "Action rejected by validation"
                );
                let outcome = Outcome::failed(
                    action.correlation_id.as_str(),
                    ActionError::new(ErrorKind::ValidationRejected, rejection.to_string()),
                );
                self.finish(record_id.as_deref(), &outcome).await;
                outcomes[index] = Some(outcome);
                continue;
            }

            if let ActionBody::QueryTopology = action.body {
                let topology = serde_json::to_value(cache.state()).unwrap_or_default();
                drop(cache);
                let outcome = Outcome::ok(action.correlation_id.as_str(), topology);
                self.finish(record_id.as_deref(), &outcome).await;
                outcomes[index] = Some(outcome);
                continue;
            }

            let wire = resolve_wire(&action.body, cache.state());
            drop(cache);
            wave.push(Pending {
                index,
                action,
                wire,
                footprint,
                record_id,
            });
        }
        self.flush(&mut wave, &mut outcomes).await;

        let outcomes: Vec<Outcome> = outcomes.into_iter().flatten().collect();
        let requests = ranges
            .into_iter()
            .map(|(correlation_id, range)| RequestReport {
                success: outcomes[range.clone()].iter().all(|o| o.success),
                correlation_id,
                outcomes: range,
            })
            .collect();

        let report = DispatchReport {
            batch_id,
            outcomes,
            requests,
        };
        info!(
            batch_id = %report.batch_id,
            failed = report.failures().count(),
            "Batch dispatched"
        );
        report
    }

    /// Turn requests into atomic actions, recording which slice each produced
    async fn expand(
        &self,
        requests: Vec<Request>,
    ) -> (Vec<Action>, Vec<(String, std::ops::Range<usize>)>) {
        let mut actions = Vec::new();
        let mut ranges = Vec::with_capacity(requests.len());
        let mut taken: Vec<Position> = self.cache.read().await.state().positions().collect();
        let mut allocator = self.allocator.lock().await;

        for request in requests {
            let start = actions.len();
            match request.body {
                RequestBody::Action(body) => {
                    actions.push(Action::new(request.correlation_id.as_str(), body));
                }
                RequestBody::CreateNodes(batch) => {
                    let nodes = allocator.allocate_batch(&batch, taken.iter().copied());
                    let single = nodes.len() == 1;
                    for (i, node) in nodes.into_iter().enumerate() {
                        taken.push(node.position);
                        let correlation_id = if single {
                            request.correlation_id.clone()
                        } else {
                            format!("{}#{}", request.correlation_id, i)
                        };
                        actions.push(Action::new(correlation_id, ActionBody::CreateNode { node }));
                    }
                }
            }
            ranges.push((request.correlation_id, start..actions.len()));
        }

        (actions, ranges)
    }

    /// Run the wave's gateway calls together, then reconcile in submission order
    async fn flush(&self, wave: &mut Vec<Pending>, outcomes: &mut [Option<Outcome>]) {
        if wave.is_empty() {
            return;
        }
        debug!(size = wave.len(), "Running wave");

        let calls = wave.iter().map(|pending| async move {
            if let (Some(tracker), Some(id)) = (&self.tracker, &pending.record_id) {
                if let Err(e) = tracker.mark_dispatched(id).await {
                    warn!(error = %e, "Failed to mark action record dispatched");
                }
            }
            self.gateway.execute(&pending.wire).await
        });
        let results = join_all(calls).await;

        let mut finished = Vec::with_capacity(wave.len());
        {
            let mut cache = self.cache.write().await;
            for (pending, result) in wave.drain(..).zip(results) {
                let outcome = reconcile(&mut cache, &pending.action, result);
                finished.push((pending.index, pending.record_id, outcome));
            }
        }

        for (index, record_id, outcome) in finished {
            self.finish(record_id.as_deref(), &outcome).await;
            outcomes[index] = Some(outcome);
        }
    }

    async fn track(&self, batch_id: &str, action: &Action) -> Option<String> {
        let tracker = self.tracker.as_ref()?;
        let record = ActionRecord::new(batch_id, &action.correlation_id, action.body.name());
        Some(tracker.track(record).await)
    }

    async fn finish(&self, record_id: Option<&str>, outcome: &Outcome) {
        if let (Some(tracker), Some(id)) = (&self.tracker, record_id) {
            if let Err(e) = tracker.finish(id, outcome).await {
                warn!(error = %e, "Failed to close action record");
            }
        }
    }
}

/// Fold one gateway answer into the cache and produce the action's outcome
fn reconcile(
    cache: &mut TopologyCache,
    action: &Action,
    result: Result<BackendResult, GatewayError>,
) -> Outcome {
    let correlation_id = action.correlation_id.as_str();
    let result = match result {
        Ok(result) => result,
        Err(err) => {
            warn!(
                correlation_id = %correlation_id,
                action = action.body.name(),
                error = %err,
                suggestion = err.suggestion(),
                "Gateway call failed"
            );
            return Outcome::failed(
                correlation_id,
                ActionError::new(ErrorKind::BackendFailure, err.to_string()),
            );
        }
    };

    match result.confirmation() {
        Confirmation::Rejected(detail) => {
            warn!(
                correlation_id = %correlation_id,
                action = action.body.name(),
                status = ?result.status,
                detail = %detail,
                "Backend rejected action"
            );
            Outcome::failed(
                correlation_id,
                ActionError::new(ErrorKind::BackendFailure, detail),
            )
        }
        Confirmation::Ambiguous(reason) => {
            warn!(
                correlation_id = %correlation_id,
                action = action.body.name(),
                reason = %reason,
                "Backend result unconfirmed, state not advanced"
            );
            Outcome::failed(
                correlation_id,
                ActionError::new(ErrorKind::UnconfirmedState, reason),
            )
        }
        Confirmation::Confirmed => {
            let applied = cache.apply(&action.body, &result);
            let output = match applied {
                Applied::Unchanged if !action.body.changes_topology() => result.data,
                Applied::Unchanged => Value::Null,
                applied => applied.to_json(),
            };
            debug!(
                correlation_id = %correlation_id,
                action = action.body.name(),
                revision = cache.revision(),
                "Action confirmed"
            );
            Outcome::ok(correlation_id, output)
        }
    }
}

/// Use the backend's link id on the wire when the cache knows one
fn resolve_wire(body: &ActionBody, state: &TopologyState) -> ActionBody {
    if let ActionBody::DeletePath {
        target:
            DeleteTarget::Link {
                link: LinkSelector::Endpoints { src, dst },
            },
    } = body
    {
        let key = LinkKey::new(src.clone(), dst.clone());
        if let Some(id) = state.links.get(&key).and_then(|l| l.id.clone()) {
            return ActionBody::DeletePath {
                target: DeleteTarget::Link {
                    link: LinkSelector::Id(id),
                },
            };
        }
    }
    body.clone()
}
