//! Orchestrator behaviour against the in-memory backend

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use topo_core::{
    ActionBody, CommandSpec, DeleteTarget, ErrorKind, LinkKey, LinkSelector, Node, NodeBatch,
    NodeKind, Position, Request, TopologyState,
};
use topo_dispatch::{Orchestrator, OrchestratorConfig};
use topo_execution_tracker::{ActionMetrics, ActionTracker};
use topo_network::{InMemoryBackend, InjectedFailure};

fn orchestrator(backend: &Arc<InMemoryBackend>) -> Orchestrator {
    Orchestrator::new(backend.clone(), OrchestratorConfig::default()).unwrap()
}

fn seeded(nodes: &[(&str, NodeKind)]) -> TopologyState {
    let mut state = TopologyState::new();
    for (i, (id, kind)) in nodes.iter().enumerate() {
        let position = Position::new(1000.0 + i as f64 * 100.0, 1000.0);
        state
            .nodes
            .insert(id.to_string(), Node::new(*id, *kind, position));
    }
    state
}

fn hosts(cid: &str, n: usize) -> Request {
    Request::create_nodes(cid, NodeBatch::unplaced(NodeKind::Host, n))
}

#[tokio::test]
async fn test_batch_nodes_get_distinct_ids_and_positions() {
    let backend = Arc::new(InMemoryBackend::new());
    let orch = orchestrator(&backend);

    let report = orch.dispatch(vec![hosts("call_1", 10), hosts("call_2", 3)]).await;
    assert!(report.success());
    assert_eq!(report.outcomes.len(), 13);
    assert_eq!(report.outcomes[0].correlation_id, "call_1#0");
    assert_eq!(report.outcomes[12].correlation_id, "call_2#2");

    let state = orch.snapshot().await;
    assert_eq!(state.nodes.len(), 13);
    let positions: HashSet<_> = state.positions().map(|p| p.key()).collect();
    assert_eq!(positions.len(), 13);
    assert!(state.contains_node("h13"));
}

#[tokio::test]
async fn test_self_loop_never_reaches_backend() {
    let topology = seeded(&[("h1", NodeKind::Host)]);
    let backend = Arc::new(InMemoryBackend::with_topology(topology.clone()));
    let orch = orchestrator(&backend).with_state(topology);

    let report = orch
        .dispatch(vec![Request::create_link("call_1", "h1", "h1")])
        .await;
    assert_eq!(
        report.outcomes[0].error_kind(),
        Some(ErrorKind::ValidationRejected)
    );
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_link_to_node_created_earlier_in_batch() {
    let topology = seeded(&[("s1", NodeKind::Switch)]);
    let backend = Arc::new(InMemoryBackend::with_topology(topology.clone()));
    let orch = orchestrator(&backend).with_state(topology);

    let report = orch
        .dispatch(vec![
            hosts("call_1", 1),
            Request::create_link("call_2", "h1", "s1"),
        ])
        .await;

    assert!(report.success(), "{:?}", report.outcomes);
    assert_eq!(report.outcomes[0].correlation_id, "call_1");
    let state = orch.snapshot().await;
    assert!(state.links.contains_key(&LinkKey::new("h1", "s1")));
    assert_eq!(
        backend.call_log().await,
        vec!["create_node".to_string(), "create_link".to_string()]
    );
}

#[tokio::test]
async fn test_gateway_failure_is_isolated() {
    let backend = Arc::new(InMemoryBackend::new());
    backend
        .fail_call(3, InjectedFailure::Refuse("host h3 rejected".into()))
        .await;
    let orch = orchestrator(&backend);

    let report = orch.dispatch(vec![hosts("call_1", 5)]).await;
    let flags: Vec<bool> = report.outcomes.iter().map(|o| o.success).collect();
    assert_eq!(flags, vec![true, true, false, true, true]);

    let failed = &report.outcomes[2];
    assert_eq!(failed.error_kind(), Some(ErrorKind::BackendFailure));
    assert_eq!(failed.error.as_ref().unwrap().message, "host h3 rejected");
    assert!(!report.requests[0].success);

    let state = orch.snapshot().await;
    for id in ["h1", "h2", "h4", "h5"] {
        assert!(state.contains_node(id), "{id} missing");
    }
    assert!(!state.contains_node("h3"));
}

#[tokio::test]
async fn test_query_is_stable_and_read_only() {
    let backend = Arc::new(InMemoryBackend::new());
    let orch = orchestrator(&backend);
    orch.dispatch(vec![hosts("call_1", 2)]).await;
    let calls = backend.call_count();
    let revision = orch.cache().read().await.revision();

    let query = || Request::action("q", ActionBody::QueryTopology);
    let first = orch.dispatch(vec![query()]).await;
    let second = orch.dispatch(vec![query()]).await;

    assert_eq!(first.outcomes[0].result, second.outcomes[0].result);
    assert_eq!(
        first.outcomes[0].result.as_ref().unwrap()["nodes"]["h1"]["kind"],
        json!("host")
    );
    assert_eq!(backend.call_count(), calls);
    assert_eq!(orch.cache().read().await.revision(), revision);
}

#[tokio::test]
async fn test_delete_cascades_links_and_associations() {
    let backend = Arc::new(InMemoryBackend::new());
    let orch = orchestrator(&backend);

    let switch = Request::create_nodes("call_2", NodeBatch::unplaced(NodeKind::Switch, 1));
    let controller = Request::create_nodes("call_3", NodeBatch::unplaced(NodeKind::Controller, 1));
    let associate = Request::action(
        "call_5",
        ActionBody::AssociateSwitch {
            switch_id: "s1".into(),
            controller_id: "c1".into(),
        },
    );
    let report = orch
        .dispatch(vec![
            hosts("call_1", 1),
            switch,
            controller,
            Request::create_link("call_4", "h1", "s1"),
            associate,
        ])
        .await;
    assert!(report.success(), "{:?}", report.outcomes);
    assert_eq!(orch.snapshot().await.associations.len(), 1);

    let report = orch
        .dispatch(vec![
            Request::delete_node("call_6", "h1"),
            Request::delete_node("call_7", "c1"),
        ])
        .await;
    assert!(report.success());

    let state = orch.snapshot().await;
    assert!(state.links.is_empty());
    assert!(state.associations.is_empty());
    assert_eq!(state.nodes.len(), 1);
    assert_eq!(
        report.outcomes[0].result.as_ref().unwrap()["links_removed"],
        1
    );
}

#[tokio::test]
async fn test_association_kind_pairing_is_validated() {
    let topology = seeded(&[("s1", NodeKind::Switch), ("h1", NodeKind::Host)]);
    let backend = Arc::new(InMemoryBackend::with_topology(topology.clone()));
    let orch = orchestrator(&backend).with_state(topology);

    let report = orch
        .dispatch(vec![Request::action(
            "call_1",
            ActionBody::AssociateSwitch {
                switch_id: "s1".into(),
                controller_id: "h1".into(),
            },
        )])
        .await;
    assert_eq!(
        report.outcomes[0].error_kind(),
        Some(ErrorKind::ValidationRejected)
    );
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_independent_actions_run_concurrently() {
    let backend = Arc::new(InMemoryBackend::new());
    let orch = orchestrator(&backend);
    orch.dispatch(vec![hosts("call_1", 4)]).await;
    assert!(backend.max_in_flight() > 1);

    let backend = Arc::new(InMemoryBackend::new());
    let orch = Orchestrator::new(backend.clone(), OrchestratorConfig::sequential()).unwrap();
    orch.dispatch(vec![hosts("call_1", 4)]).await;
    assert_eq!(backend.max_in_flight(), 1);
}

#[tokio::test]
async fn test_overlapping_actions_keep_submission_order() {
    let topology = seeded(&[("h1", NodeKind::Host), ("s1", NodeKind::Switch)]);
    let backend = Arc::new(InMemoryBackend::with_topology(topology.clone()));
    let orch = orchestrator(&backend).with_state(topology);

    let report = orch
        .dispatch(vec![
            Request::create_link("call_1", "h1", "s1"),
            Request::delete_node("call_2", "s1"),
            Request::create_link("call_3", "h1", "s1"),
        ])
        .await;

    assert!(report.outcomes[0].success);
    assert!(report.outcomes[1].success);
    assert_eq!(
        report.outcomes[2].error_kind(),
        Some(ErrorKind::ValidationRejected)
    );
    assert_eq!(backend.max_in_flight(), 1);
}

#[tokio::test]
async fn test_unconfirmed_result_does_not_advance_state() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.fail_call(1, InjectedFailure::Ambiguous).await;
    let orch = orchestrator(&backend);

    let report = orch.dispatch(vec![hosts("call_1", 1)]).await;
    assert_eq!(
        report.outcomes[0].error_kind(),
        Some(ErrorKind::UnconfirmedState)
    );
    assert!(orch.snapshot().await.nodes.is_empty());

    // the backend did apply it; a resync brings the cache back in line
    let snapshot = orch.resync().await.unwrap();
    assert!(snapshot.contains_node("h1"));
    assert!(orch.snapshot().await.contains_node("h1"));

    let report = orch.dispatch(vec![hosts("call_2", 1)]).await;
    assert!(report.success());
    assert!(orch.snapshot().await.contains_node("h2"));
}

#[tokio::test]
async fn test_unreachable_backend_is_backend_failure() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.fail_node("h1", InjectedFailure::Unreachable).await;
    let orch = orchestrator(&backend);

    let report = orch.dispatch(vec![hosts("call_1", 2)]).await;
    assert_eq!(
        report.outcomes[0].error_kind(),
        Some(ErrorKind::BackendFailure)
    );
    assert!(report.outcomes[1].success);
}

#[tokio::test]
async fn test_link_deleted_by_backend_id() {
    let topology = seeded(&[("h1", NodeKind::Host), ("s1", NodeKind::Switch)]);
    let backend = Arc::new(InMemoryBackend::with_topology(topology.clone()));
    let orch = orchestrator(&backend).with_state(topology);

    orch.dispatch(vec![Request::create_link("call_1", "h1", "s1")])
        .await;
    let link_id = orch
        .snapshot()
        .await
        .links
        .values()
        .next()
        .and_then(|l| l.id.clone())
        .unwrap();

    let report = orch
        .dispatch(vec![Request::action(
            "call_2",
            ActionBody::DeletePath {
                target: DeleteTarget::Link {
                    link: LinkSelector::Id(link_id),
                },
            },
        )])
        .await;
    assert!(report.success(), "{:?}", report.outcomes);
    assert!(orch.snapshot().await.links.is_empty());
    assert!(backend.topology().await.links.is_empty());
}

#[tokio::test]
async fn test_link_deleted_by_endpoints_goes_out_by_backend_id() {
    let topology = seeded(&[("h1", NodeKind::Host), ("s1", NodeKind::Switch)]);
    let backend = Arc::new(InMemoryBackend::with_topology(topology.clone()));
    let orch = orchestrator(&backend).with_state(topology);

    orch.dispatch(vec![Request::create_link("call_1", "h1", "s1")])
        .await;
    let link_id = orch.snapshot().await.links[&LinkKey::new("h1", "s1")]
        .id
        .clone()
        .unwrap();

    let report = orch
        .dispatch(vec![Request::action(
            "call_2",
            ActionBody::DeletePath {
                target: DeleteTarget::Link {
                    link: LinkSelector::Endpoints {
                        src: "h1".into(),
                        dst: "s1".into(),
                    },
                },
            },
        )])
        .await;
    assert!(report.success(), "{:?}", report.outcomes);
    assert_eq!(
        report.outcomes[0].result.as_ref().unwrap()["unlinked"]["src"],
        "h1"
    );

    let sent = backend.received().await;
    assert_eq!(
        sent.last(),
        Some(&ActionBody::DeletePath {
            target: DeleteTarget::Link {
                link: LinkSelector::Id(link_id),
            },
        })
    );
    assert!(orch.snapshot().await.links.is_empty());
    assert!(backend.topology().await.links.is_empty());
}

#[tokio::test]
async fn test_network_wide_actions_see_only_earlier_mutations() {
    let backend = Arc::new(InMemoryBackend::new());
    let orch = orchestrator(&backend);

    let report = orch
        .dispatch(vec![
            hosts("call_1", 1),
            hosts("call_2", 1),
            Request::action("call_3", ActionBody::Pingall),
            hosts("call_4", 1),
            Request::action("call_5", ActionBody::QueryTopology),
            hosts("call_6", 1),
        ])
        .await;
    assert!(report.success(), "{:?}", report.outcomes);

    // pingall ran after h1 and h2 were applied but before h3 was sent
    assert_eq!(report.outcomes[2].result.as_ref().unwrap()["hosts"], 2);
    let log = backend.call_log().await;
    assert_eq!(log[2], "pingall");
    assert_eq!(log.len(), 5);

    let seen = report.outcomes[4].result.as_ref().unwrap()["nodes"]
        .as_object()
        .unwrap()
        .clone();
    let mut ids: Vec<_> = seen.keys().cloned().collect();
    ids.sort();
    assert_eq!(ids, ["h1", "h2", "h3"]);
    assert_eq!(orch.snapshot().await.nodes.len(), 4);
}

#[tokio::test]
async fn test_last_association_wins() {
    let topology = seeded(&[
        ("s1", NodeKind::Switch),
        ("c1", NodeKind::Controller),
        ("c2", NodeKind::Controller),
    ]);
    let backend = Arc::new(InMemoryBackend::with_topology(topology.clone()));
    let orch = orchestrator(&backend).with_state(topology);

    let associate = |cid: &str, controller: &str| {
        Request::action(
            cid,
            ActionBody::AssociateSwitch {
                switch_id: "s1".into(),
                controller_id: controller.into(),
            },
        )
    };
    let report = orch
        .dispatch(vec![
            associate("call_1", "c1"),
            associate("call_2", "c2"),
            associate("call_3", "c1"),
            associate("call_4", "c2"),
        ])
        .await;
    assert!(report.success(), "{:?}", report.outcomes);
    assert_eq!(backend.max_in_flight(), 1);

    let state = orch.snapshot().await;
    assert_eq!(state.associations.len(), 1);
    assert_eq!(state.associations["s1"], "c2");
    assert_eq!(state.node("s1").unwrap().attribute("controller"), Some(&json!("c2")));
    assert_eq!(backend.topology().await.associations["s1"], "c2");
}

#[tokio::test]
async fn test_move_waits_for_backend_confirmation() {
    let topology = seeded(&[("h1", NodeKind::Host)]);
    let backend = Arc::new(InMemoryBackend::with_topology(topology.clone()));
    backend.fail_call(1, InjectedFailure::Refuse("canvas locked".into())).await;
    let orch = orchestrator(&backend).with_state(topology);

    let moved = |cid: &str| {
        Request::action(
            cid,
            ActionBody::MoveNode {
                node_id: "h1".into(),
                position: Position::new(5.0, 5.0),
            },
        )
    };
    let report = orch.dispatch(vec![moved("call_1")]).await;
    assert_eq!(
        report.outcomes[0].error_kind(),
        Some(ErrorKind::BackendFailure)
    );
    assert_eq!(
        orch.snapshot().await.node("h1").unwrap().position,
        Position::new(1000.0, 1000.0)
    );

    let report = orch.dispatch(vec![moved("call_2")]).await;
    assert!(report.success());
    assert_eq!(
        orch.snapshot().await.node("h1").unwrap().position,
        Position::new(5.0, 5.0)
    );

    let report = orch
        .dispatch(vec![Request::action(
            "call_3",
            ActionBody::MoveNode {
                node_id: "h7".into(),
                position: Position::default(),
            },
        )])
        .await;
    assert_eq!(
        report.outcomes[0].error_kind(),
        Some(ErrorKind::ValidationRejected)
    );
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn test_run_command_and_pingall_return_backend_output() {
    let topology = seeded(&[("h1", NodeKind::Host)]);
    let backend = Arc::new(InMemoryBackend::with_topology(topology.clone()));
    let orch = orchestrator(&backend).with_state(topology);

    let report = orch
        .dispatch(vec![
            Request::action(
                "call_1",
                ActionBody::RunCommand {
                    command: CommandSpec {
                        node_id: "h1".into(),
                        command: "hostname".into(),
                    },
                },
            ),
            Request::action("call_2", ActionBody::Pingall),
        ])
        .await;

    assert_eq!(
        report.outcomes[0].result.as_ref().unwrap()["output"],
        "h1> hostname"
    );
    assert_eq!(report.outcomes[1].result.as_ref().unwrap()["hosts"], 1);
}

#[tokio::test]
async fn test_tracker_records_every_action() {
    let backend = Arc::new(InMemoryBackend::new());
    backend
        .fail_call(2, InjectedFailure::Refuse("no".into()))
        .await;
    let metrics = Arc::new(ActionMetrics::new().unwrap());
    let tracker = Arc::new(ActionTracker::new(metrics.clone()));
    let orch = orchestrator(&backend).with_tracker(tracker.clone());

    orch.dispatch(vec![
        hosts("call_1", 3),
        Request::create_link("call_2", "h9", "h1"),
    ])
    .await;

    assert_eq!(metrics.started_count("create_node"), 3);
    assert_eq!(metrics.succeeded_count("create_node"), 2);
    assert_eq!(metrics.failed_count("create_node"), 1);
    assert_eq!(metrics.rejected_count("create_link"), 1);
    assert_eq!(metrics.active(), 0);
    assert!(tracker.list_active().await.is_empty());
    assert_eq!(tracker.list_recent(10).await.len(), 4);
}
