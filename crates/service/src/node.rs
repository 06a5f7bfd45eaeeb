//! Node Façade: the one object an application embeds per connection. It
//! owns the framer, the dispatcher, the cleanup worker, and the pending-
//! request table for this node's own outgoing queries, and exposes the
//! public surface named in the component design: transport wiring,
//! untyped `simple:` passthrough, typed `arpc:` notifications this node
//! emits, and typed `arpc:` requests this node can issue to its peer.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use ahash::HashMap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use codec::message::error_codes;
use codec::{BufferItemSpecifier, Framer, Id, Message, RpcError};

use crate::cleanup::{CleanupHooks, CleanupWorker};
use crate::controller::Controller;
use crate::correlator::{CallOutcome, Correlator};
use crate::dispatch::{Dispatcher, NotificationSink};
use crate::ids::ResourceExhausted;
use crate::model::{ArgList, CallRecord, ReplyError};
use crate::registry::Registry;

/// A request that went unanswered because the node closed, the transport
/// failed, or nothing showed up before the timeout, on top of the
/// dispatcher's own three-valued error channel.
#[derive(Debug)]
pub enum NodeError {
    Closed,
    Codec(codec::Error),
    Exhausted(ResourceExhausted),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Closed => write!(f, "node is closed"),
            NodeError::Codec(e) => write!(f, "{e}"),
            NodeError::Exhausted(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<codec::Error> for NodeError {
    fn from(value: codec::Error) -> Self {
        NodeError::Codec(value)
    }
}

impl From<ResourceExhausted> for NodeError {
    fn from(value: ResourceExhausted) -> Self {
        NodeError::Exhausted(value)
    }
}

/// Outcome of a typed request to the peer. Exactly one of `result`,
/// `timed_out`, `closed`, `user_error`, `internal_error` carries the
/// meaningful signal; the others are left at their empty/false default.
#[derive(Debug, Default)]
pub struct TypedOutcome {
    pub result: Option<Value>,
    pub timed_out: bool,
    pub closed: bool,
    pub user_error: Option<String>,
    pub internal_error: Option<String>,
}

impl TypedOutcome {
    fn closed() -> Self {
        Self {
            closed: true,
            ..Default::default()
        }
    }

    fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            internal_error: Some(message.into()),
            ..Default::default()
        }
    }

    fn from_response(msg: Message) -> Self {
        if let Some(err) = msg.error {
            if err.code == error_codes::INTERNAL_ERROR {
                return Self {
                    internal_error: Some(err.message),
                    ..Default::default()
                };
            }
            return Self {
                user_error: Some(err.message),
                ..Default::default()
            };
        }

        Self {
            result: msg.result,
            ..Default::default()
        }
    }
}

/// The generic request/response matching table for this node's own
/// outgoing queries, keyed by the JSON-RPC message id rather than by any
/// domain id. Distinct from the [`Correlator`], which matches reply-bearing
/// calls by `call_id`/`reply_to_id`.
#[derive(Default)]
struct PendingRequests {
    handlers: Mutex<HashMap<Id, oneshot::Sender<Message>>>,
    next_id: AtomicI64,
}

impl PendingRequests {
    fn next_id(&self) -> Id {
        Id::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn register(&self, id: Id) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.handlers.lock().insert(id, tx);
        rx
    }

    fn forget(&self, id: &Id) {
        self.handlers.lock().remove(id);
    }

    fn deliver(&self, id: &Id, msg: Message) {
        if let Some(tx) = self.handlers.lock().remove(id) {
            let _ = tx.send(msg);
        } else {
            log::debug!(target: "arpc_core::node", "discarding response to unknown request id {id}");
        }
    }

    fn close_all(&self) {
        self.handlers.lock().clear();
    }
}

/// Construction options, bundled the way the source's own service
/// constructor takes one options struct rather than a long parameter list.
pub struct NodeFacadeOptions {
    pub controller: Arc<dyn Controller>,
    pub registry: Arc<Registry>,
    pub notifications: Arc<dyn NotificationSink>,
    pub on_simple_request: Arc<dyn Fn(Message) + Send + Sync>,
    pub push_message_to_outside: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
    pub cleanup_hooks: CleanupHooks,
    pub request_timeout: Duration,
}

pub struct NodeFacade {
    framer: Mutex<Framer>,
    dispatcher: Dispatcher,
    correlator: Arc<Correlator>,
    registry: Arc<Registry>,
    pending: PendingRequests,
    cleanup: Mutex<Option<CleanupWorker>>,
    sink: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
    closed: Arc<AtomicBool>,
    close_tx: watch::Sender<bool>,
    close_rx: watch::Receiver<bool>,
    request_timeout: Duration,
}

impl NodeFacade {
    pub fn new(options: NodeFacadeOptions) -> Arc<Self> {
        let correlator = Correlator::new();
        let dispatcher = Dispatcher::new(
            options.controller,
            correlator.clone(),
            options.notifications,
            options.on_simple_request,
        );
        let registry = options.registry.clone();
        let cleanup = CleanupWorker::spawn(options.registry, options.cleanup_hooks);
        let (close_tx, close_rx) = watch::channel(false);

        Arc::new(Self {
            framer: Mutex::new(Framer::new()),
            dispatcher,
            correlator,
            registry,
            pending: PendingRequests::default(),
            cleanup: Mutex::new(Some(cleanup)),
            sink: options.push_message_to_outside,
            closed: Arc::new(AtomicBool::new(false)),
            close_tx,
            close_rx,
            request_timeout: options.request_timeout,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The identity this node presents as the subscriber for buffer
    /// subscriptions originating from its peer.
    pub fn peer_id(&self) -> Uuid {
        self.dispatcher.peer_id()
    }

    fn write_out(&self, msg: &Message) -> Result<(), NodeError> {
        let bytes = Framer::encode(msg)?;
        (self.sink)(bytes);
        Ok(())
    }

    // ---- transport wiring -------------------------------------------

    /// Feed newly-arrived transport bytes in. Complete frames are either
    /// matched against a pending outgoing request (responses) or handed to
    /// the dispatcher (requests and notifications); any reply the
    /// dispatcher produces is written straight back out.
    pub fn push_message_from_outside(&self, bytes: &[u8]) -> Result<(), NodeError> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }

        let messages = self.framer.lock().push(bytes)?;
        for msg in messages {
            if msg.is_response() {
                if let Some(id) = msg.id.clone() {
                    self.pending.deliver(&id, msg);
                }
                continue;
            }

            if let Some(reply) = self.dispatcher.dispatch(msg) {
                self.write_out(&reply)?;
            }
        }

        Ok(())
    }

    // ---- simple passthrough ------------------------------------------

    fn send_message(&self, method: &str, params: Option<Value>, id: Option<Id>) -> Result<(), NodeError> {
        let msg = Message {
            jsonrpc: "2.0".to_string(),
            method: Some(format!("simple:{method}")),
            params,
            id,
            result: None,
            error: None,
        };
        self.write_out(&msg)
    }

    /// Send a `simple:`-prefixed request, minting and returning its id so
    /// the caller can match the eventual response itself (the façade does
    /// not track `simple:` requests; that is the application's job).
    pub fn send_request(&self, method: &str, params: Option<Value>) -> Result<Id, NodeError> {
        let id = self.pending.next_id();
        self.send_message(method, params, Some(id.clone()))?;
        Ok(id)
    }

    pub fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), NodeError> {
        self.send_message(method, params, None)
    }

    /// A response or error is never `simple:`-prefixed: its `method` field
    /// is absent, so there is no prefix to attach.
    pub fn send_response(&self, id: Id, result: Value) -> Result<(), NodeError> {
        self.write_out(&Message::response(id, result))
    }

    pub fn send_error(&self, id: Option<Id>, error: RpcError) -> Result<(), NodeError> {
        self.write_out(&Message::error_response(id, error))
    }

    // ---- typed notifications ------------------------------------------

    pub fn notify_new_call(&self, call_id: Uuid, response_on: Option<Uuid>) -> Result<(), NodeError> {
        let params = json!({
            "call_id": codec::wire::format_id(call_id),
            "response_on": response_on.map(codec::wire::format_id),
        });
        self.write_out(&Message::notification("arpc:NewCall", Some(params)))
    }

    pub fn notify_buffer_updated(&self, buffer_id: Uuid) -> Result<(), NodeError> {
        let params = json!({ "buffer_id": codec::wire::format_id(buffer_id) });
        self.write_out(&Message::notification("arpc:BufferUpdated", Some(params)))
    }

    /// Carries the legacy misspelled key verbatim: peers depend on it.
    pub fn notify_new_transmission(&self, transmission_id: Uuid) -> Result<(), NodeError> {
        let params = json!({ "tarnsmission_id": codec::wire::format_id(transmission_id) });
        self.write_out(&Message::notification("arpc:NewTransmission", Some(params)))
    }

    // ---- call origination ------------------------------------------------
    //
    // §4.5: mint a call id, register it (and any resource-bearing
    // arguments it carries) in the registry, then emit the `NewCall`
    // notification. The resource table insert happens before the
    // notification is written, so a peer that races to query the call id
    // right after observing the notification always finds it.

    /// `Call(name, args, ...)`: originate a fresh, non-reply call with no
    /// handler waiting on its response. Returns the minted call id.
    pub fn call(&self, name: impl Into<String>, args: ArgList) -> Result<Uuid, NodeError> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }

        let call_id = self.registry.call_ids.gen()?;
        self.registry
            .register_call(CallRecord::call(call_id, name, args))?;
        self.notify_new_call(call_id, None)?;
        Ok(call_id)
    }

    /// `Call(name, args, ...)` with a response handler: originate the call
    /// and await the peer's reply, racing it against `timeout` and node
    /// close exactly as a typed request does. The handler is registered
    /// with the correlator *before* the notification goes out, so a reply
    /// that arrives the instant the peer sees `NewCall` is never missed.
    pub async fn call_and_await(
        &self,
        name: impl Into<String>,
        args: ArgList,
        timeout: Duration,
    ) -> Result<CallOutcome, NodeError> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }

        let call_id = self.registry.call_ids.gen()?;
        self.registry
            .register_call(CallRecord::call(call_id, name, args))?;

        let wait = self.correlator.await_reply(call_id, timeout);
        self.notify_new_call(call_id, None)?;
        Ok(wait.await)
    }

    /// `Reply(reply_to_id, args...)`: originate a reply call and emit
    /// `NewCall{response_on: reply_to_id}`. No response handler is ever
    /// registered for a reply.
    pub fn reply(&self, reply_to_id: Uuid, args: ArgList) -> Result<Uuid, NodeError> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }

        let call_id = self.registry.call_ids.gen()?;
        self.registry
            .register_call(CallRecord::reply(call_id, reply_to_id, args))?;
        self.notify_new_call(call_id, Some(reply_to_id))?;
        Ok(call_id)
    }

    /// `Reply(reply_to_id, args...)` carrying the application-chosen
    /// `reply_err_code`/message pair.
    pub fn reply_with_error(
        &self,
        reply_to_id: Uuid,
        args: ArgList,
        error: ReplyError,
    ) -> Result<Uuid, NodeError> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }

        let call_id = self.registry.call_ids.gen()?;
        self.registry
            .register_call(CallRecord::reply_with_error(call_id, reply_to_id, args, error))?;
        self.notify_new_call(call_id, Some(reply_to_id))?;
        Ok(call_id)
    }

    // ---- typed requests -------------------------------------------------

    async fn request(&self, method: &str, params: Value) -> TypedOutcome {
        if self.is_closed() {
            return TypedOutcome::closed();
        }

        let id = self.pending.next_id();
        let rx = self.pending.register(id.clone());
        let msg = Message::request(id.clone(), format!("arpc:{method}"), Some(params));

        if let Err(e) = self.write_out(&msg) {
            self.pending.forget(&id);
            return TypedOutcome::internal(e.to_string());
        }

        let mut close_rx = self.close_rx.clone();
        tokio::select! {
            result = rx => match result {
                Ok(response) => TypedOutcome::from_response(response),
                Err(_) => TypedOutcome::closed(),
            },
            _ = tokio::time::sleep(self.request_timeout) => {
                self.pending.forget(&id);
                TypedOutcome::timed_out()
            }
            _ = close_rx.changed() => {
                self.pending.forget(&id);
                TypedOutcome::closed()
            }
        }
    }

    pub async fn call_get_list(&self) -> TypedOutcome {
        self.request("CallGetList", Value::Null).await
    }

    pub async fn call_get_info(&self, call_id: Uuid) -> TypedOutcome {
        self.request("CallGetInfo", json!({ "call_id": codec::wire::format_id(call_id) })).await
    }

    pub async fn call_get_name(&self, call_id: Uuid) -> TypedOutcome {
        self.request("CallGetName", json!({ "call_id": codec::wire::format_id(call_id) })).await
    }

    pub async fn call_get_arg_count(&self, call_id: Uuid) -> TypedOutcome {
        self.request("CallGetArgCount", json!({ "call_id": codec::wire::format_id(call_id) })).await
    }

    pub async fn call_get_arg_value(&self, call_id: Uuid, first: i64, last: i64) -> TypedOutcome {
        self.request(
            "CallGetArgValue",
            json!({ "call_id": codec::wire::format_id(call_id), "first": first, "last": last }),
        )
        .await
    }

    pub async fn call_close(&self, call_id: Uuid) -> TypedOutcome {
        self.request("CallClose", json!({ "call_id": codec::wire::format_id(call_id) })).await
    }

    pub async fn buffer_get_info(&self, buffer_id: Uuid) -> TypedOutcome {
        self.request("BufferGetInfo", json!({ "buffer_id": codec::wire::format_id(buffer_id) })).await
    }

    pub async fn buffer_get_items_count(&self, buffer_id: Uuid) -> TypedOutcome {
        self.request(
            "BufferGetItemsCount",
            json!({ "buffer_id": codec::wire::format_id(buffer_id) }),
        )
        .await
    }

    pub async fn buffer_get_items_ids(
        &self,
        buffer_id: Uuid,
        first_spec: &BufferItemSpecifier,
        last_spec: &BufferItemSpecifier,
    ) -> TypedOutcome {
        self.request(
            "BufferGetItemsIds",
            json!({
                "buffer_id": codec::wire::format_id(buffer_id),
                "first_spec": first_spec.emit().unwrap_or_default(),
                "last_spec": last_spec.emit().unwrap_or_default(),
            }),
        )
        .await
    }

    pub async fn buffer_get_items_times_by_ids(&self, buffer_id: Uuid, ids: &[String]) -> TypedOutcome {
        self.request(
            "BufferGetItemsTimesByIds",
            json!({ "buffer_id": codec::wire::format_id(buffer_id), "ids": ids }),
        )
        .await
    }

    pub async fn buffer_get_items_by_ids(&self, buffer_id: Uuid, ids: &[String]) -> TypedOutcome {
        self.request(
            "BufferGetItemsByIds",
            json!({ "buffer_id": codec::wire::format_id(buffer_id), "ids": ids }),
        )
        .await
    }

    pub async fn buffer_get_items_first_time(&self, buffer_id: Uuid) -> TypedOutcome {
        self.request(
            "BufferGetItemsFirstTime",
            json!({ "buffer_id": codec::wire::format_id(buffer_id) }),
        )
        .await
    }

    pub async fn buffer_get_items_last_time(&self, buffer_id: Uuid) -> TypedOutcome {
        self.request(
            "BufferGetItemsLastTime",
            json!({ "buffer_id": codec::wire::format_id(buffer_id) }),
        )
        .await
    }

    pub async fn buffer_subscribe(&self, buffer_id: Uuid) -> TypedOutcome {
        self.request(
            "BufferSubscribeOnUpdatesNotification",
            json!({ "buffer_id": codec::wire::format_id(buffer_id) }),
        )
        .await
    }

    pub async fn buffer_unsubscribe(&self, buffer_id: Uuid) -> TypedOutcome {
        self.request(
            "BufferUnsubscribeFromUpdatesNotification",
            json!({ "buffer_id": codec::wire::format_id(buffer_id) }),
        )
        .await
    }

    pub async fn buffer_get_is_subscribed(&self, buffer_id: Uuid) -> TypedOutcome {
        self.request(
            "BufferGetIsSubscribedOnUpdatesNotification",
            json!({ "buffer_id": codec::wire::format_id(buffer_id) }),
        )
        .await
    }

    pub async fn buffer_get_list_subscribed(&self) -> TypedOutcome {
        self.request("BufferGetListSubscribedUpdatesNotifications", Value::Null).await
    }

    pub async fn buffer_binary_get_size(&self, buffer_id: Uuid) -> TypedOutcome {
        self.request(
            "BufferBinaryGetSize",
            json!({ "buffer_id": codec::wire::format_id(buffer_id) }),
        )
        .await
    }

    pub async fn buffer_binary_get_slice(&self, buffer_id: Uuid, start: u64, end: u64) -> TypedOutcome {
        self.request(
            "BufferBinaryGetSlice",
            json!({ "buffer_id": codec::wire::format_id(buffer_id), "start_index": start, "end_index": end }),
        )
        .await
    }

    pub async fn transmission_get_list(&self) -> TypedOutcome {
        self.request("TransmissionGetList", Value::Null).await
    }

    pub async fn transmission_get_info(&self, transmission_id: Uuid) -> TypedOutcome {
        self.request(
            "TransmissionGetInfo",
            json!({ "transmission_id": codec::wire::format_id(transmission_id) }),
        )
        .await
    }

    pub async fn socket_get_list(&self) -> TypedOutcome {
        self.request("SocketGetList", Value::Null).await
    }

    pub async fn socket_open(&self, listening_socket_id: Uuid) -> TypedOutcome {
        self.request(
            "SocketOpen",
            json!({ "listening_socket_id": codec::wire::format_id(listening_socket_id) }),
        )
        .await
    }

    pub async fn socket_read(&self, connected_socket_id: Uuid, try_read_size: usize) -> TypedOutcome {
        self.request(
            "SocketRead",
            json!({
                "connected_socket_id": codec::wire::format_id(connected_socket_id),
                "try_read_size": try_read_size,
            }),
        )
        .await
    }

    pub async fn socket_write(&self, connected_socket_id: Uuid, bytes: &[u8]) -> TypedOutcome {
        self.request(
            "SocketWrite",
            json!({
                "connected_socket_id": codec::wire::format_id(connected_socket_id),
                "b": codec::wire::encode_bytes(bytes),
            }),
        )
        .await
    }

    pub async fn socket_close(&self, connected_socket_id: Uuid) -> TypedOutcome {
        self.request(
            "SocketClose",
            json!({ "connected_socket_id": codec::wire::format_id(connected_socket_id) }),
        )
        .await
    }

    async fn socket_set_some_deadline(&self, method: &str, connected_socket_id: Uuid, deadline: Option<DateTime<Utc>>) -> TypedOutcome {
        self.request(
            method,
            json!({
                "connected_socket_id": codec::wire::format_id(connected_socket_id),
                "t": deadline.map(codec::wire::format_timestamp),
            }),
        )
        .await
    }

    pub async fn socket_set_deadline(&self, connected_socket_id: Uuid, deadline: Option<DateTime<Utc>>) -> TypedOutcome {
        self.socket_set_some_deadline("SocketSetDeadline", connected_socket_id, deadline).await
    }

    pub async fn socket_set_read_deadline(&self, connected_socket_id: Uuid, deadline: Option<DateTime<Utc>>) -> TypedOutcome {
        self.socket_set_some_deadline("SocketSetReadDeadline", connected_socket_id, deadline).await
    }

    pub async fn socket_set_write_deadline(&self, connected_socket_id: Uuid, deadline: Option<DateTime<Utc>>) -> TypedOutcome {
        self.socket_set_some_deadline("SocketSetWriteDeadline", connected_socket_id, deadline).await
    }

    // ---- lifecycle -----------------------------------------------------

    /// Idempotent and safe to call re-entrantly from within a handler: a
    /// second call observes the guard already set and returns immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.correlator.close_all();
        self.pending.close_all();
        let _ = self.close_tx.send(true);

        if let Some(worker) = self.cleanup.lock().take() {
            worker.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DefaultController;
    use crate::controller::SocketOpener;
    use crate::dispatch::NoopNotificationSink;
    use crate::model::{DuplexSocket, ListeningSocket, RemoteSocket, SocketError};

    #[derive(Default)]
    struct NoopOpener;

    impl SocketOpener for NoopOpener {
        fn open(&self, _listening: &ListeningSocket) -> Result<Arc<dyn RemoteSocket>, SocketError> {
            Ok(DuplexSocket::pair().0)
        }
    }

    fn facade(sink: Arc<dyn Fn(Vec<u8>) + Send + Sync>) -> Arc<NodeFacade> {
        let registry = Registry::new();
        let controller = DefaultController::new(registry.clone(), Arc::new(NoopOpener));

        NodeFacade::new(NodeFacadeOptions {
            controller,
            registry,
            notifications: Arc::new(NoopNotificationSink),
            on_simple_request: Arc::new(|_| {}),
            push_message_to_outside: sink,
            cleanup_hooks: CleanupHooks::default(),
            request_timeout: Duration::from_millis(200),
        })
    }

    #[tokio::test]
    async fn typed_request_round_trips_through_a_loopback_peer() {
        // Loop the node's own outbound bytes back into itself: its own
        // dispatcher answers its own CallGetList query, the same way a
        // real peer on the other end of the transport would.
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        let node = facade(Arc::new(move |bytes| {
            let _ = tx.send(bytes);
        }));

        let node_loop = node.clone();
        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                let _ = node_loop.push_message_from_outside(&bytes);
            }
        });

        let outcome = node.call_get_list().await;
        assert_eq!(outcome.result, Some(json!([])));
        assert!(!outcome.timed_out);
        assert!(!outcome.closed);
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let node = facade(Arc::new(|_| {}));
        let outcome = node.call_get_list().await;
        assert!(outcome.timed_out);
    }

    #[tokio::test]
    async fn close_during_wait_reports_closed_not_an_error() {
        let node = facade(Arc::new(|_| {}));
        let node_for_close = node.clone();

        let waiter = tokio::spawn(async move { node.socket_get_list().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        node_for_close.close().await;

        let outcome = waiter.await.unwrap();
        assert!(outcome.closed);
        assert!(outcome.user_error.is_none());
        assert!(outcome.internal_error.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let node = facade(Arc::new(|_| {}));
        node.close().await;
        node.close().await;
        assert!(node.is_closed());
    }

    #[tokio::test]
    async fn operations_after_close_report_closed() {
        let node = facade(Arc::new(|_| {}));
        node.close().await;

        assert!(matches!(
            node.push_message_from_outside(b"{}\n"),
            Err(NodeError::Closed)
        ));

        let outcome = node.call_get_list().await;
        assert!(outcome.closed);
    }

    #[test]
    fn call_registers_the_record_and_announces_it_with_no_response_on() {
        let sent = Arc::new(Mutex::new(None));
        let sent_for_sink = sent.clone();
        let node = facade(Arc::new(move |bytes| {
            *sent_for_sink.lock() = Some(bytes);
        }));

        let args = ArgList::new(vec![crate::model::Argument::positional(
            crate::model::ArgValue::Basic(json!(1)),
        )]);
        let call_id = node.call("Ping", args).unwrap();

        let record = node.registry.calls.find(&call_id).unwrap();
        assert_eq!(record.name, "Ping");
        assert!(!record.is_reply());

        let bytes = sent.lock().take().unwrap();
        let msg: Message = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg.method.as_deref(), Some("arpc:NewCall"));
        let params = msg.params.unwrap();
        assert_eq!(params["call_id"], json!(codec::wire::format_id(call_id)));
        assert!(params["response_on"].is_null());
    }

    #[test]
    fn reply_registers_a_reply_record_and_announces_response_on() {
        let sent = Arc::new(Mutex::new(None));
        let sent_for_sink = sent.clone();
        let node = facade(Arc::new(move |bytes| {
            *sent_for_sink.lock() = Some(bytes);
        }));

        let reply_to = Uuid::new_v4();
        let call_id = node.reply(reply_to, ArgList::default()).unwrap();

        let record = node.registry.calls.find(&call_id).unwrap();
        assert!(record.is_response_and_not_error());
        assert_eq!(record.reply_to_id, Some(reply_to));

        let bytes = sent.lock().take().unwrap();
        let msg: Message = serde_json::from_slice(&bytes).unwrap();
        let params = msg.params.unwrap();
        assert_eq!(params["response_on"], json!(codec::wire::format_id(reply_to)));
    }

    #[test]
    fn reply_with_error_is_stored_and_classified_as_an_error() {
        let node = facade(Arc::new(|_| {}));
        let reply_to = Uuid::new_v4();

        let call_id = node
            .reply_with_error(
                reply_to,
                ArgList::default(),
                ReplyError { code: 7, message: "nope".into() },
            )
            .unwrap();

        let record = node.registry.calls.find(&call_id).unwrap();
        assert!(record.is_error());
    }

    #[test]
    fn call_and_reply_are_rejected_once_the_node_is_closed() {
        let node = facade(Arc::new(|_| {}));
        pollster::block_on(node.close());

        assert!(matches!(node.call("Ping", ArgList::default()), Err(NodeError::Closed)));
        assert!(matches!(
            node.reply(Uuid::new_v4(), ArgList::default()),
            Err(NodeError::Closed)
        ));
    }

    #[tokio::test]
    async fn call_and_await_resolves_once_the_peer_posts_a_reply() {
        // Two nodes wired to each other exactly as two ends of a real
        // transport would be, exercising the same path as the "happy
        // call" scenario: node_a originates a call, node_b observes it
        // through its notification sink and replies, and node_a's wait
        // resolves with that reply.
        let (to_b_tx, mut to_b_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        let (to_a_tx, mut to_a_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel::<Uuid>();

        struct ForwardingSink(tokio::sync::mpsc::UnboundedSender<Uuid>);
        impl NotificationSink for ForwardingSink {
            fn on_call(&self, call_id: Uuid) {
                let _ = self.0.send(call_id);
            }
            fn on_buffer_updated(&self, _buffer_id: Uuid) {}
            fn on_new_transmission(&self, _transmission_id: Uuid) {}
        }

        let registry_a = Registry::new();
        let controller_a = DefaultController::new(registry_a.clone(), Arc::new(NoopOpener));
        let node_a = NodeFacade::new(NodeFacadeOptions {
            controller: controller_a,
            registry: registry_a,
            notifications: Arc::new(NoopNotificationSink),
            on_simple_request: Arc::new(|_| {}),
            push_message_to_outside: Arc::new(move |bytes| {
                let _ = to_b_tx.send(bytes);
            }),
            cleanup_hooks: CleanupHooks::default(),
            request_timeout: Duration::from_millis(500),
        });

        let registry_b = Registry::new();
        let controller_b = DefaultController::new(registry_b.clone(), Arc::new(NoopOpener));
        let node_b = NodeFacade::new(NodeFacadeOptions {
            controller: controller_b,
            registry: registry_b,
            notifications: Arc::new(ForwardingSink(seen_tx)),
            on_simple_request: Arc::new(|_| {}),
            push_message_to_outside: Arc::new(move |bytes| {
                let _ = to_a_tx.send(bytes);
            }),
            cleanup_hooks: CleanupHooks::default(),
            request_timeout: Duration::from_millis(500),
        });

        let node_b_for_pump = node_b.clone();
        tokio::spawn(async move {
            while let Some(bytes) = to_b_rx.recv().await {
                let _ = node_b_for_pump.push_message_from_outside(&bytes);
            }
        });

        let node_a_for_pump = node_a.clone();
        tokio::spawn(async move {
            while let Some(bytes) = to_a_rx.recv().await {
                let _ = node_a_for_pump.push_message_from_outside(&bytes);
            }
        });

        let node_b_for_reply = node_b.clone();
        tokio::spawn(async move {
            if let Some(call_id) = seen_rx.recv().await {
                node_b_for_reply
                    .reply(call_id, ArgList::default())
                    .unwrap();
            }
        });

        let outcome = node_a
            .call_and_await("Ping", ArgList::default(), Duration::from_secs(5))
            .await
            .unwrap();

        match outcome {
            CallOutcome::Response(_) => {}
            other => panic!("expected a response, got {other:?}"),
        }
    }
}
