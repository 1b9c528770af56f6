//! Tests for CommandSync: remote-confirmed tree mutations

use std::cell::RefCell;
use std::rc::Rc;

use rstest::rstest;
use serde_json::{json, Value};

use treemodel::application::{CommandConfig, CommandSync, RequestOptions, SyncError, Tree};
use treemodel::domain::{
    CommandKind, EventName, NodeData, NodeDatum, NodeId, NodeState, NodeStore, TreeEvent,
};
use treemodel::infrastructure::{Method, RemoteResponse, TransportError};
use treemodel::util::testing::{init_test_setup, ScriptedTransport};

fn object(value: Value) -> NodeData {
    match value {
        Value::Object(map) => map,
        _ => NodeData::new(),
    }
}

struct Fixture {
    tree: Tree,
    transport: Rc<ScriptedTransport>,
    sync: CommandSync,
    events: Rc<RefCell<Vec<TreeEvent>>>,
}

impl Fixture {
    /// Tree `[A, B]` with every command of `kinds` gated.
    fn new(kinds: &[CommandKind]) -> Self {
        init_test_setup();
        let tree = Tree::new(NodeStore::with_data(
            [NodeDatum::text("text", "A"), NodeDatum::text("text", "B")],
            NodeState::Collapsed,
        ));
        let transport = Rc::new(ScriptedTransport::new());
        let sync = CommandSync::new(tree.clone(), transport.clone()).with_commands(
            kinds
                .iter()
                .map(|kind| (*kind, CommandConfig::new(format!("api/{}", kind)))),
        );

        let events = Rc::new(RefCell::new(Vec::new()));
        for name in [
            EventName::Update,
            EventName::Move,
            EventName::SuccessResponse,
            EventName::ErrorResponse,
        ] {
            let sink = Rc::clone(&events);
            tree.events()
                .on(name, move |e: &TreeEvent| sink.borrow_mut().push(e.clone()));
        }

        Self {
            tree,
            transport,
            sync,
            events,
        }
    }

    fn child(&self, index: usize) -> NodeId {
        self.tree.get_child_ids(self.tree.root_id())[index]
    }

    fn texts(&self, parent: NodeId) -> Vec<String> {
        self.tree
            .get_children(parent)
            .iter()
            .map(|node| node.label("text"))
            .collect()
    }

    fn names(&self) -> Vec<EventName> {
        self.events.borrow().iter().map(TreeEvent::name).collect()
    }

    fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }
}

// ============================================================
// remove
// ============================================================

#[tokio::test]
async fn given_gated_remove_when_call_fails_then_tree_is_untouched() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Remove]);
    let a = f.child(0);
    f.transport.fail(TransportError::Connection("refused".into()));

    // Act
    let result = f.sync.remove(a).await;

    // Assert
    assert!(matches!(result, Err(SyncError::Transport { .. })));
    assert_eq!(f.texts(f.tree.root_id()), vec!["A", "B"]);
    assert_eq!(f.names(), vec![EventName::ErrorResponse]);
}

#[tokio::test]
async fn given_gated_remove_when_call_succeeds_then_node_is_removed() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Remove]);
    let a = f.child(0);
    f.transport.respond_json(json!(true));

    // Act
    f.sync.remove(a).await.unwrap();

    // Assert
    assert_eq!(f.texts(f.tree.root_id()), vec!["B"]);
    assert_eq!(f.names(), vec![EventName::Update, EventName::SuccessResponse]);
    let requests = f.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, format!("api/remove?nodeId={}", a));
}

#[tokio::test]
async fn given_gated_remove_of_root_when_called_then_no_request_is_issued() {
    let f = Fixture::new(&[CommandKind::Remove]);

    f.sync.remove(f.tree.root_id()).await.unwrap();

    assert_eq!(f.transport.request_count(), 0);
    assert!(f.names().is_empty());
}

#[tokio::test]
async fn given_ungated_remove_when_called_then_applies_immediately_without_notification() {
    let f = Fixture::new(&[]);
    let a = f.child(0);

    f.sync.remove(a).await.unwrap();

    assert_eq!(f.texts(f.tree.root_id()), vec!["B"]);
    assert_eq!(f.names(), vec![EventName::Update]);
    assert_eq!(f.transport.request_count(), 0);
}

// ============================================================
// create
// ============================================================

#[tokio::test]
async fn given_gated_create_when_success_body_then_child_is_added() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Create]);
    let a = f.child(0);
    f.transport.respond_json(json!({"id": 7}));

    // Act
    let ids = f
        .sync
        .add(vec![NodeDatum::text("text", "AA")], Some(a))
        .await
        .unwrap();

    // Assert
    assert_eq!(ids.len(), 1);
    assert_eq!(f.texts(a), vec!["AA"]);
    let events = f.events.borrow();
    let Some(TreeEvent::SuccessResponse { command, ids: reported, body }) = events.last() else {
        panic!("expected success notification, got {:?}", events);
    };
    assert_eq!(*command, CommandKind::Create);
    assert_eq!(reported, &ids);
    assert_eq!(body, &json!({"id": 7}));
}

#[tokio::test]
async fn given_gated_create_when_body_is_false_then_nothing_is_added() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Create]);
    let count = f.tree.get_count();
    f.transport.respond_json(json!(false));

    // Act
    let result = f.sync.add(vec![NodeDatum::text("text", "C")], None).await;

    // Assert
    assert_eq!(result, Err(SyncError::Rejected(CommandKind::Create)));
    assert_eq!(f.tree.get_count(), count);
    assert_eq!(f.names(), vec![EventName::ErrorResponse]);
}

#[tokio::test]
async fn given_gated_create_when_posting_then_body_carries_parent_and_data() {
    // Arrange
    let f = Fixture::new(&[]);
    f.sync.register(
        CommandKind::Create,
        CommandConfig::new("api/create").method(Method::Post),
    );
    let a = f.child(0);
    f.transport.respond_json(json!(true));

    // Act
    f.sync
        .add(vec![NodeDatum::text("text", "AA")], Some(a))
        .await
        .unwrap();

    // Assert
    let requests = f.transport.requests();
    let request = &requests[0];
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.url, "api/create");
    let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"parentId": a.to_string(), "data": [{"text": "AA"}]}));
}

#[rstest]
#[case::server_error(RemoteResponse::new(500, json!({"error": "boom"})))]
#[case::false_body(RemoteResponse::ok(json!(false)))]
#[tokio::test]
async fn given_failed_response_when_creating_then_count_unchanged(#[case] response: RemoteResponse) {
    let f = Fixture::new(&[CommandKind::Create]);
    let count = f.tree.get_count();
    f.transport.respond(response);

    let result = f.sync.add(vec![NodeDatum::text("text", "C")], None).await;

    assert!(result.is_err());
    assert_eq!(f.tree.get_count(), count);
}

// ============================================================
// update
// ============================================================

#[tokio::test]
async fn given_gated_set_when_call_fails_then_data_is_untouched() {
    // Arrange
    let f = Fixture::new(&[]);
    let a = f.child(0);
    f.tree.set(a, object(json!({"propA": "aa"})));
    f.sync
        .register(CommandKind::Update, CommandConfig::new("api/update"));
    f.transport
        .respond(RemoteResponse::new(404, Value::Null));

    // Act
    let result = f.sync.set(a, object(json!({"propA": "changed"}))).await;

    // Assert
    assert_eq!(
        result,
        Err(SyncError::Status {
            command: CommandKind::Update,
            status: 404
        })
    );
    assert_eq!(
        f.tree.get_node_data(a),
        Some(object(json!({"text": "A", "propA": "aa"})))
    );
}

#[tokio::test]
async fn given_gated_set_when_call_succeeds_then_data_is_merged() {
    let f = Fixture::new(&[CommandKind::Update]);
    let a = f.child(0);
    f.transport.respond_json(json!(true));

    f.sync.set(a, object(json!({"propA": "aa"}))).await.unwrap();

    assert_eq!(
        f.tree.get_node_data(a),
        Some(object(json!({"text": "A", "propA": "aa"})))
    );
}

#[tokio::test]
async fn given_gated_remove_data_when_call_succeeds_then_keys_are_dropped() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Update]);
    let a = f.child(0);
    f.tree.set(a, object(json!({"propA": "aa"})));
    f.transport.respond_json(json!(true));

    // Act
    f.sync.remove_data(a, vec!["propA".into()]).await.unwrap();

    // Assert
    assert_eq!(f.tree.get_node_data(a), Some(object(json!({"text": "A"}))));
    assert!(f.transport.requests()[0].url.contains("keys=%5B%22propA%22%5D"));
}

#[tokio::test]
async fn given_empty_payload_when_setting_gated_then_no_request() {
    let f = Fixture::new(&[CommandKind::Update]);

    f.sync.set(f.child(0), NodeData::new()).await.unwrap();

    assert_eq!(f.transport.request_count(), 0);
}

// ============================================================
// remove_all_children / move
// ============================================================

#[tokio::test]
async fn given_gated_remove_all_children_when_succeeds_then_reports_removed_ids() {
    // Arrange
    let f = Fixture::new(&[CommandKind::RemoveAllChildren]);
    let root = f.tree.root_id();
    let children = f.tree.get_child_ids(root);
    f.transport.respond_json(json!(true));

    // Act
    f.sync.remove_all_children(root).await.unwrap();

    // Assert
    assert_eq!(f.tree.get_count(), 1);
    let events = f.events.borrow();
    assert!(matches!(
        events.last(),
        Some(TreeEvent::SuccessResponse { ids, .. }) if *ids == children
    ));
}

#[tokio::test]
async fn given_gated_move_when_succeeds_then_node_is_reparented() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Move]);
    let (a, b) = (f.child(0), f.child(1));
    f.transport.respond_json(json!(true));

    // Act
    f.sync.move_node(a, Some(b)).await.unwrap();

    // Assert
    assert_eq!(f.tree.get_parent_id(a), Some(b));
    assert_eq!(f.names(), vec![EventName::Move, EventName::SuccessResponse]);
    let requests = f.transport.requests();
    let url = &requests[0].url;
    assert!(url.contains(&format!("newParentId={}", b)));
}

#[tokio::test]
async fn given_gated_move_when_fails_then_parent_is_unchanged() {
    let f = Fixture::new(&[CommandKind::Move]);
    let (a, b) = (f.child(0), f.child(1));
    f.transport.respond_json(json!(false));

    let result = f.sync.move_node(a, Some(b)).await;

    assert!(result.is_err());
    assert_eq!(f.tree.get_parent_id(a), Some(f.tree.root_id()));
}

#[tokio::test]
async fn given_gated_move_to_current_parent_when_called_then_no_request() {
    let f = Fixture::new(&[CommandKind::Move]);

    f.sync.move_node(f.child(0), None).await.unwrap();

    assert_eq!(f.transport.request_count(), 0);
    assert!(f.names().is_empty());
}

#[tokio::test]
async fn given_pending_move_when_target_becomes_descendant_then_resolution_conflicts() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Move]);
    let (a, b) = (f.child(0), f.child(1));
    let reply = f.transport.defer();
    let tree = &f.tree;

    // Act
    let (result, ()) = tokio::join!(f.sync.move_node(a, Some(b)), async move {
        // B moves under A while the call is in flight
        tree.move_node(b, Some(a));
        let _ = reply.send(RemoteResponse::ok(json!(true)));
    });

    // Assert
    assert!(matches!(result, Err(SyncError::Conflict { .. })));
    assert_eq!(f.tree.get_parent_id(b), Some(a));
    assert!(f.tree.read(|store| store.verify()).is_ok());
}

#[tokio::test]
async fn given_pending_move_when_node_already_moved_there_then_no_success_is_reported() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Move]);
    let (a, b) = (f.child(0), f.child(1));
    let reply = f.transport.defer();
    let tree = &f.tree;

    // Act
    let (result, ()) = tokio::join!(f.sync.move_node(a, Some(b)), async move {
        tree.move_node(a, Some(b));
        let _ = reply.send(RemoteResponse::ok(json!(true)));
    });

    // Assert
    assert_eq!(result, Ok(()));
    assert_eq!(f.tree.get_parent_id(a), Some(b));
    assert_eq!(f.names(), vec![EventName::Move]);
}

// ============================================================
// read
// ============================================================

#[tokio::test]
async fn given_gated_read_when_array_body_then_children_are_added() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Read]);
    let a = f.child(0);
    f.transport
        .respond_json(json!([{"text": "AA"}, {"text": "AB", "hasChild": true}]));

    // Act
    let ids = f.sync.load_children(Some(a)).await.unwrap();

    // Assert
    assert_eq!(ids.len(), 2);
    assert_eq!(f.texts(a), vec!["AA", "AB"]);
    assert!(!f.tree.is_leaf(ids[1]));
}

#[tokio::test]
async fn given_gated_read_when_object_body_then_one_child_is_added() {
    let f = Fixture::new(&[CommandKind::Read]);
    f.transport.respond_json(json!({"text": "C"}));

    let ids = f.sync.load_children(None).await.unwrap();

    assert_eq!(ids.len(), 1);
    assert_eq!(f.texts(f.tree.root_id()), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn given_gated_read_when_body_is_not_tree_data_then_invalid_payload() {
    let f = Fixture::new(&[CommandKind::Read]);
    let count = f.tree.get_count();
    f.transport.respond_json(json!([1, 2]));

    let result = f.sync.load_children(None).await;

    assert!(matches!(result, Err(SyncError::InvalidPayload { .. })));
    assert_eq!(f.tree.get_count(), count);
}

#[tokio::test]
async fn given_ungated_read_when_loading_then_nothing_happens() {
    let f = Fixture::new(&[]);

    let ids = f.sync.load_children(None).await.unwrap();

    assert!(ids.is_empty());
    assert_eq!(f.transport.request_count(), 0);
}

#[tokio::test]
async fn given_pending_read_when_parent_removed_then_nothing_is_reintroduced() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Read]);
    let a = f.child(0);
    let reply = f.transport.defer();
    let tree = &f.tree;

    // Act
    let (result, ()) = tokio::join!(f.sync.load_children(Some(a)), async move {
        tree.remove(a);
        let _ = reply.send(RemoteResponse::ok(json!([{"text": "AA"}])));
    });

    // Assert
    assert_eq!(
        result,
        Err(SyncError::TargetVanished {
            command: CommandKind::Read,
            id: a
        })
    );
    assert_eq!(f.tree.get_count(), 2);
    assert!(f.tree.read(|store| store.verify()).is_ok());
}

#[tokio::test]
async fn given_concurrent_reads_when_resolved_out_of_order_then_each_applies_to_its_parent() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Read]);
    let (a, b) = (f.child(0), f.child(1));
    let reply_a = f.transport.defer();
    let reply_b = f.transport.defer();
    let sync = &f.sync;

    // Act
    let (ra, rb, ()) = tokio::join!(
        sync.load_children(Some(a)),
        sync.load_children(Some(b)),
        async move {
            assert!(sync.is_loading());
            assert_eq!(sync.pending().len(), 2);
            let _ = reply_b.send(RemoteResponse::ok(json!([{"text": "BA"}])));
            let _ = reply_a.send(RemoteResponse::ok(json!([{"text": "AA"}])));
        }
    );

    // Assert
    assert!(ra.is_ok() && rb.is_ok());
    assert_eq!(f.texts(a), vec!["AA"]);
    assert_eq!(f.texts(b), vec!["BA"]);
    assert!(!f.sync.is_loading());
}

#[tokio::test]
async fn given_dropped_reply_when_read_resolves_then_transport_closed() {
    let f = Fixture::new(&[CommandKind::Read]);
    let reply = f.transport.defer();
    drop(reply);

    let result = f.sync.load_children(None).await;

    assert_eq!(
        result,
        Err(SyncError::Transport {
            command: CommandKind::Read,
            source: TransportError::Closed
        })
    );
    assert!(f.sync.pending().is_empty());
}

#[tokio::test]
async fn given_lazy_node_when_expanding_then_children_are_loaded_first() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Read]);
    let lazy = f
        .tree
        .add([NodeDatum::text("text", "L").with_has_child(true)], None)[0];
    f.transport.respond_json(json!([{"text": "LA"}]));

    // Act
    let loaded = f.sync.expand(lazy).await.unwrap();

    // Assert
    assert_eq!(loaded.len(), 1);
    assert_eq!(f.tree.get_state(lazy), Some(NodeState::Expanded));
    assert_eq!(f.texts(lazy), vec!["LA"]);
}

// ============================================================
// request resolution
// ============================================================

#[tokio::test]
async fn given_dynamic_url_when_removing_then_url_uses_acting_node_data() {
    // Arrange
    let f = Fixture::new(&[]);
    f.sync.register(
        CommandKind::Remove,
        CommandConfig::default()
            .url_fn(|data| {
                let text = data
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or("none");
                format!("api/nodes/{}", text)
            })
            .method(Method::Delete),
    );
    f.transport.respond_json(json!(true));

    // Act
    f.sync.remove(f.child(1)).await.unwrap();

    // Assert
    let requests = f.transport.requests();
    let request = &requests[0];
    assert_eq!(request.url, "api/nodes/B");
    assert_eq!(request.method, Method::Delete);
    assert_eq!(request.content_type, "application/json");
}

#[tokio::test]
async fn given_empty_url_when_command_runs_then_missing_url_without_request() {
    // Arrange
    let f = Fixture::new(&[]);
    f.sync.register(CommandKind::Remove, CommandConfig::default());
    let a = f.child(0);

    // Act
    let result = f.sync.remove(a).await;

    // Assert
    assert_eq!(result, Err(SyncError::MissingUrl(CommandKind::Remove)));
    assert_eq!(f.transport.request_count(), 0);
    assert!(f.tree.contains(a));
    assert_eq!(f.names(), vec![EventName::ErrorResponse]);
}

#[tokio::test]
async fn given_raw_load_when_options_override_then_returns_body_untouched() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Read]);
    f.transport.respond_json(json!({"total": 3}));
    let count = f.tree.get_count();

    // Act
    let body = f
        .sync
        .load_data(
            CommandKind::Read,
            None,
            RequestOptions {
                url: Some("api/stats".into()),
                params: Some(object(json!({"deep": true}))),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(body, json!({"total": 3}));
    assert_eq!(f.tree.get_count(), count);
    assert_eq!(f.transport.requests()[0].url, "api/stats?deep=true");
}

#[tokio::test]
async fn given_unregistered_command_when_unregistering_then_operation_runs_locally() {
    let f = Fixture::new(&[CommandKind::Remove]);
    let a = f.child(0);

    assert!(f.sync.unregister(CommandKind::Remove).is_some());
    f.clear_events();
    f.sync.remove(a).await.unwrap();

    assert!(!f.sync.is_gated(CommandKind::Remove));
    assert!(!f.tree.contains(a));
    assert_eq!(f.names(), vec![EventName::Update]);
}

#[tokio::test]
async fn given_in_flight_read_when_caller_drops_future_then_pending_is_cleared() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Read]);
    let _reply = f.transport.defer();

    // Act
    tokio::select! {
        biased;
        _ = f.sync.load_children(None) => panic!("deferred read resolved"),
        _ = std::future::ready(()) => {}
    }

    // Assert
    assert_eq!(f.transport.request_count(), 1);
    assert!(!f.sync.is_loading());
    assert!(f.sync.pending().is_empty());
}

// ============================================================
// root loading
// ============================================================

#[tokio::test]
async fn given_gated_read_when_initializing_then_root_children_are_loaded() {
    // Arrange
    let f = Fixture::new(&[CommandKind::Read]);
    f.transport.respond_json(json!([{"text": "C"}]));

    // Act
    let ids = f.sync.initialize().await.unwrap();

    // Assert
    assert_eq!(ids.len(), 1);
    assert_eq!(f.transport.request_count(), 1);
    assert_eq!(f.texts(f.tree.root_id()), vec!["A", "B", "C"]);
    let requests = f.transport.requests();
    assert!(requests[0].url.contains(&format!("nodeId={}", f.tree.root_id())));
}

#[tokio::test]
async fn given_root_loading_off_when_initializing_then_no_request_is_issued() {
    // Arrange
    let f = Fixture::new(&[]);
    let sync = CommandSync::new(f.tree.clone(), f.transport.clone())
        .with_commands([(CommandKind::Read, CommandConfig::new("api/read"))])
        .with_load_root(false);

    // Act
    let ids = sync.initialize().await.unwrap();

    // Assert
    assert!(ids.is_empty());
    assert_eq!(f.transport.request_count(), 0);
    assert_eq!(f.tree.get_count(), 3);
}
