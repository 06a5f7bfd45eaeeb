//! End-to-end exercises of the seed scenario suite, driven through two
//! in-process nodes connected by channels standing in for a transport,
//! the same way a real pair of peers would be wired together.

use std::sync::Arc;
use std::time::Duration;

use arpc_core::cleanup::CleanupHooks;
use arpc_core::controller::{Controller, DefaultController, SocketOpener};
use arpc_core::dispatch::{NoopNotificationSink, NotificationSink};
use arpc_core::model::{
    ArgList, Argument, ArgValue, Buffer, BufferMode, CallRecord, DuplexSocket, ListeningSocket,
    RemoteSocket, SocketError,
};
use arpc_core::node::{NodeFacade, NodeFacadeOptions};
use arpc_core::registry::Registry;
use codec::Message;
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct NoopOpener;

impl SocketOpener for NoopOpener {
    fn open(&self, _listening: &ListeningSocket) -> Result<Arc<dyn RemoteSocket>, SocketError> {
        Ok(DuplexSocket::pair().0)
    }
}

fn spawn_node(
    notifications: Arc<dyn NotificationSink>,
    sink: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
) -> (Arc<NodeFacade>, Arc<Registry>) {
    let registry = Registry::new();
    let controller = DefaultController::new(registry.clone(), Arc::new(NoopOpener));

    let node = NodeFacade::new(NodeFacadeOptions {
        controller,
        registry: registry.clone(),
        notifications,
        on_simple_request: Arc::new(|_| {}),
        push_message_to_outside: sink,
        cleanup_hooks: CleanupHooks::default(),
        request_timeout: Duration::from_secs(5),
    });

    (node, registry)
}

/// Wires two nodes' outgoing bytes straight into each other's
/// `push_message_from_outside`, as two ends of one transport would be.
fn wire_together(
    notifications_a: Arc<dyn NotificationSink>,
    notifications_b: Arc<dyn NotificationSink>,
) -> (Arc<NodeFacade>, Arc<NodeFacade>) {
    let (to_b_tx, mut to_b_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    let (to_a_tx, mut to_a_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();

    let (node_a, _) = spawn_node(
        notifications_a,
        Arc::new(move |bytes| {
            let _ = to_b_tx.send(bytes);
        }),
    );
    let (node_b, _) = spawn_node(
        notifications_b,
        Arc::new(move |bytes| {
            let _ = to_a_tx.send(bytes);
        }),
    );

    let pump_b = node_b.clone();
    tokio::spawn(async move {
        while let Some(bytes) = to_b_rx.recv().await {
            let _ = pump_b.push_message_from_outside(&bytes);
        }
    });

    let pump_a = node_a.clone();
    tokio::spawn(async move {
        while let Some(bytes) = to_a_rx.recv().await {
            let _ = pump_a.push_message_from_outside(&bytes);
        }
    });

    (node_a, node_b)
}

/// Scenario 1: A calls `Ping(42)`; B observes the announcement, reads the
/// call's name and arguments back over the wire, and replies; A's
/// in-flight wait resolves with B's reply.
#[tokio::test]
async fn happy_call_round_trips_between_two_nodes() {
    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel::<Uuid>();

    struct ForwardingSink(tokio::sync::mpsc::UnboundedSender<Uuid>);
    impl NotificationSink for ForwardingSink {
        fn on_call(&self, call_id: Uuid) {
            let _ = self.0.send(call_id);
        }
        fn on_buffer_updated(&self, _buffer_id: Uuid) {}
        fn on_new_transmission(&self, _transmission_id: Uuid) {}
    }

    let (node_a, node_b) = wire_together(
        Arc::new(NoopNotificationSink),
        Arc::new(ForwardingSink(seen_tx)),
    );

    let args = ArgList::new(vec![Argument::positional(ArgValue::Basic(
        serde_json::json!(42),
    ))]);

    let wait = tokio::spawn(async move {
        node_a
            .call_and_await("Ping", args, Duration::from_secs(5))
            .await
    });

    let call_id = seen_rx.recv().await.expect("B observes the NewCall");

    let arg_count = node_b.call_get_arg_count(call_id).await;
    assert_eq!(arg_count.result, Some(serde_json::json!(1)));

    let arg_values = node_b.call_get_arg_value(call_id, 0, 0).await;
    let values = arg_values.result.expect("arg values present").as_array().cloned().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["kind"], serde_json::json!("BasicNumber"));
    assert_eq!(values[0]["value"], serde_json::json!(42));

    let reply_args = ArgList::new(vec![Argument::positional(ArgValue::Basic(
        serde_json::json!("pong"),
    ))]);
    node_b.reply(call_id, reply_args).unwrap();

    let outcome = wait.await.unwrap().unwrap();
    match outcome {
        arpc_core::correlator::CallOutcome::Response(reply) => {
            assert_eq!(reply.reply_to_id, Some(call_id));
            assert!(reply.is_response_and_not_error());
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

/// Scenario 2: an unknown `arpc:` method on a request yields the standard
/// JSON-RPC `MethodNotFound` error, addressed back to the request's id.
#[tokio::test]
async fn unknown_method_yields_method_not_found() {
    let sent = Arc::new(Mutex::new(None));
    let sent_for_sink = sent.clone();
    let (node, _registry) = spawn_node(
        Arc::new(NoopNotificationSink),
        Arc::new(move |bytes| {
            *sent_for_sink.lock() = Some(bytes);
        }),
    );

    node.push_message_from_outside(br#"{"jsonrpc":"2.0","method":"arpc:Bogus","id":7}
"#)
        .unwrap();

    let bytes = sent.lock().take().expect("dispatcher answers the request");
    let msg: Message = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(msg.id, Some(7.into()));
    let error = msg.error.expect("method not found is an error response");
    assert_eq!(error.code, -32601);
    assert_eq!(error.message, "invalid method name");
}

/// Scenario 3: a malformed Buffer Item Specifier produces `InvalidParams`
/// naming the offending parameter.
#[tokio::test]
async fn invalid_specifier_yields_invalid_params() {
    let sent = Arc::new(Mutex::new(None));
    let sent_for_sink = sent.clone();
    let (node, registry) = spawn_node(
        Arc::new(NoopNotificationSink),
        Arc::new(move |bytes| {
            *sent_for_sink.lock() = Some(bytes);
        }),
    );

    let buffer_id = registry.buffer_ids.gen().unwrap();
    registry.buffers.insert(
        buffer_id,
        Buffer::new(buffer_id, "t", "d", "td", BufferMode::Object),
        Duration::from_secs(600),
    );

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "arpc:BufferGetItemsIds",
        "id": 1,
        "params": {
            "buffer_id": codec::wire::format_id(buffer_id),
            "first_spec": "Q:1",
            "last_spec": "#:5",
        },
    });
    let mut bytes = serde_json::to_vec(&request).unwrap();
    bytes.push(b'\n');
    node.push_message_from_outside(&bytes).unwrap();

    let bytes = sent.lock().take().expect("dispatcher answers the request");
    let msg: Message = serde_json::from_slice(&bytes).unwrap();
    let error = msg.error.expect("a malformed specifier is InvalidParams");
    assert_eq!(error.code, -32602);
    assert_eq!(error.message, "invalid value for first_spec");
}

/// Scenario 4: reading a sub-range out of a binary buffer returns exactly
/// the requested byte window.
#[tokio::test]
async fn binary_slice_returns_the_requested_window() {
    let (node, registry) = spawn_node(Arc::new(NoopNotificationSink), Arc::new(|_| {}));
    let controller = DefaultController::new(registry.clone(), Arc::new(NoopOpener));

    let buffer_id = registry.buffer_ids.gen().unwrap();
    registry.buffers.insert(
        buffer_id,
        Buffer::new(buffer_id, "t", "d", "td", BufferMode::Binary),
        Duration::from_secs(600),
    );
    controller
        .buffer_push_binary(buffer_id, (0u8..=9).collect())
        .value
        .expect("push succeeds");

    let size = node.buffer_binary_get_size(buffer_id).await;
    assert_eq!(size.result, Some(serde_json::json!(10)));

    let slice = node.buffer_binary_get_slice(buffer_id, 3, 7).await;
    let encoded = slice.result.unwrap();
    let bytes = codec::wire::decode_bytes(encoded.as_str().unwrap()).unwrap();
    assert_eq!(bytes, vec![3, 4, 5, 6]);
}

/// Scenario 5: a call record whose TTL has expired by the time the
/// cleanup worker next ticks is gone, and a query against it reports the
/// same "unknown call id" a never-registered id would.
#[tokio::test(start_paused = true)]
async fn expired_call_is_evicted_and_then_unknown() {
    let registry = Registry::new();
    let controller = DefaultController::new(registry.clone(), Arc::new(NoopOpener));

    let call_id = registry.call_ids.gen().unwrap();
    registry.calls.insert(
        call_id,
        CallRecord::call(call_id, "Ping", ArgList::default()),
        Duration::from_secs(2),
    );

    let worker = arpc_core::cleanup::CleanupWorker::spawn(registry.clone(), CleanupHooks::default());

    tokio::time::advance(Duration::from_secs(3)).await;
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_millis(1)).await;
    tokio::task::yield_now().await;

    assert!(!registry.calls.contains(&call_id));

    let outcome = controller.call_get_arg_count(call_id);
    assert_eq!(outcome.user_error.as_deref(), Some("unknown call id"));

    worker.shutdown().await;
}

/// Scenario 6: if the peer never answers and the node closes while a
/// caller is waiting, the wait resolves as closed, not as an error.
#[tokio::test]
async fn close_during_wait_resolves_as_closed_not_an_error() {
    let (node, _registry) = spawn_node(Arc::new(NoopNotificationSink), Arc::new(|_| {}));

    let node_for_wait = node.clone();
    let waiter = tokio::spawn(async move {
        node_for_wait
            .call_and_await("Ping", ArgList::default(), Duration::from_secs(30))
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    node.close().await;

    let outcome = waiter.await.unwrap().unwrap();
    assert!(matches!(outcome, arpc_core::correlator::CallOutcome::Closed));
}
