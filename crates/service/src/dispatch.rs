//! Protocol Dispatcher: demultiplexes an incoming message into the
//! transparent `simple:` pass-through channel and the typed `arpc:`
//! method/notification channel, validates parameters for the latter, and
//! turns a controller operation's three-valued result into a
//! protocol-conformant reply.
//!
//! Nothing here ever suspends: every controller call in [`DefaultController`]
//! is synchronous, and the notification hooks are expected to be too. That
//! is what makes it safe to call [`Dispatcher::dispatch`] directly from the
//! framing layer's read loop.
//!
//! [`DefaultController`]: crate::controller::DefaultController

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use codec::message::error_codes;
use codec::{BufferItemSpecifier, Message, RpcError};

use crate::controller::{BufferInfo, CallInfo, Controller, OpResult, TransmissionInfo};
use crate::correlator::Correlator;
use crate::model::{ArgInfo, ArgKind, CallRecord};

/// Delivered on the three notification methods. The dispatcher never
/// blocks on these: a sink that wants to do real work should hand off to
/// its own thread or task.
pub trait NotificationSink: Send + Sync {
    /// A fresh, non-reply call announced by the peer (`response_on` absent).
    /// Reply-bearing `NewCall`s never reach this hook; they go straight to
    /// the [`Correlator`] instead.
    fn on_call(&self, call_id: Uuid);
    fn on_buffer_updated(&self, buffer_id: Uuid);
    fn on_new_transmission(&self, transmission_id: Uuid);
}

/// A sink that does nothing, for nodes that only ever originate calls and
/// never need to react to announcements from the peer.
#[derive(Default)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn on_call(&self, _call_id: Uuid) {}
    fn on_buffer_updated(&self, _buffer_id: Uuid) {}
    fn on_new_transmission(&self, _transmission_id: Uuid) {}
}

/// Which of the two method-name prefixes a message was sent under, or
/// neither.
enum Routed<'a> {
    Simple(&'a str),
    Arpc(&'a str),
    Unprefixed,
}

fn route(method: &str) -> Routed<'_> {
    if let Some(rest) = method.strip_prefix("simple:") {
        Routed::Simple(rest)
    } else if let Some(rest) = method.strip_prefix("arpc:") {
        Routed::Arpc(rest)
    } else {
        Routed::Unprefixed
    }
}

/// The three-valued error channel collapsed to what the dispatcher itself
/// can produce, distinct from [`OpResult`]'s `user_error`/`internal_error`:
/// this adds the dispatcher's own `input_error` (malformed/missing
/// parameters, unknown method) on top.
enum DispatchError {
    /// Parameter validation failed, or the method name is unrecognized.
    Input(RpcError),
    User(String),
    Internal(String),
}

impl<T> From<OpResult<T>> for Result<T, DispatchError> {
    fn from(result: OpResult<T>) -> Self {
        if let Some(message) = result.internal_error {
            return Err(DispatchError::Internal(message));
        }
        if let Some(message) = result.user_error {
            return Err(DispatchError::User(message));
        }
        result.value.ok_or_else(|| {
            DispatchError::Internal("controller returned neither a value nor an error".into())
        })
    }
}

fn op<T>(result: OpResult<T>) -> Result<T, DispatchError> {
    result.into()
}

fn required<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a Value, DispatchError> {
    params
        .get(key)
        .ok_or_else(|| DispatchError::Input(RpcError::invalid_params(format!("missing parameter {key}"))))
}

fn required_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, DispatchError> {
    required(params, key)?
        .as_str()
        .ok_or_else(|| DispatchError::Input(RpcError::invalid_params(format!("{key} must be a string"))))
}

fn required_id(params: &Map<String, Value>, key: &str) -> Result<Uuid, DispatchError> {
    let raw = required_str(params, key)?;
    codec::wire::parse_id(raw)
        .map_err(|_| DispatchError::Input(RpcError::invalid_params(format!("invalid value for {key}"))))
}

fn optional_id(params: &Map<String, Value>, key: &str) -> Result<Option<Uuid>, DispatchError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let raw = v
                .as_str()
                .ok_or_else(|| DispatchError::Input(RpcError::invalid_params(format!("{key} must be a string"))))?;
            codec::wire::parse_id(raw)
                .map(Some)
                .map_err(|_| DispatchError::Input(RpcError::invalid_params(format!("invalid value for {key}"))))
        }
    }
}

fn required_i64(params: &Map<String, Value>, key: &str) -> Result<i64, DispatchError> {
    required(params, key)?
        .as_i64()
        .ok_or_else(|| DispatchError::Input(RpcError::invalid_params(format!("{key} must be an integer"))))
}

fn required_u64(params: &Map<String, Value>, key: &str) -> Result<u64, DispatchError> {
    required(params, key)?
        .as_u64()
        .ok_or_else(|| DispatchError::Input(RpcError::invalid_params(format!("{key} must be a non-negative integer"))))
}

fn required_usize(params: &Map<String, Value>, key: &str) -> Result<usize, DispatchError> {
    Ok(required_u64(params, key)? as usize)
}

fn required_spec(params: &Map<String, Value>, key: &str) -> Result<BufferItemSpecifier, DispatchError> {
    let raw = required_str(params, key)?;
    let spec = BufferItemSpecifier::parse(raw);
    if !spec.is_valid() {
        return Err(DispatchError::Input(RpcError::invalid_params(format!("invalid value for {key}"))));
    }
    Ok(spec)
}

fn required_str_array(params: &Map<String, Value>, key: &str) -> Result<Vec<String>, DispatchError> {
    let values = required(params, key)?
        .as_array()
        .ok_or_else(|| DispatchError::Input(RpcError::invalid_params(format!("{key} must be an array"))))?;

    values
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| DispatchError::Input(RpcError::invalid_params(format!("{key} must be an array of strings"))))
        })
        .collect()
}

fn required_bytes(params: &Map<String, Value>, key: &str) -> Result<Vec<u8>, DispatchError> {
    let raw = required_str(params, key)?;
    codec::wire::decode_bytes(raw)
        .map_err(|_| DispatchError::Input(RpcError::invalid_params(format!("{key} must be valid base64"))))
}

fn optional_timestamp(params: &Map<String, Value>, key: &str) -> Result<Option<DateTime<Utc>>, DispatchError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let raw = v
                .as_str()
                .ok_or_else(|| DispatchError::Input(RpcError::invalid_params(format!("{key} must be a string"))))?;
            codec::wire::parse_timestamp(raw)
                .map(Some)
                .map_err(|_| DispatchError::Input(RpcError::invalid_params(format!("invalid value for {key}"))))
        }
    }
}

fn call_info_json(info: CallInfo) -> Value {
    json!({
        "call_id": codec::wire::format_id(info.call_id),
        "response_on": info.reply_to_id.map(codec::wire::format_id),
        "name": info.name,
        "arg_count": info.arg_count,
    })
}

fn arg_info_json(info: ArgInfo) -> Value {
    let kind = match info.kind {
        ArgKind::BasicBool => "BasicBool",
        ArgKind::BasicNumber => "BasicNumber",
        ArgKind::BasicString => "BasicString",
        ArgKind::BasicArray => "BasicArray",
        ArgKind::BasicObject => "BasicObject",
        ArgKind::Buffer => "Buffer",
        ArgKind::Transmission => "Transmission",
        ArgKind::ListeningSocket => "ListeningSocket",
        ArgKind::ConnectedSocket => "ConnectedSocket",
    };

    json!({
        "name": info.name,
        "kind": kind,
        "id": info.id.map(codec::wire::format_id),
        "value": info.value,
    })
}

fn buffer_info_json(info: BufferInfo) -> Value {
    let mode = match info.mode {
        crate::model::BufferMode::Binary => "Binary",
        crate::model::BufferMode::Object => "Object",
    };

    json!({
        "buffer_id": codec::wire::format_id(info.id),
        "title": info.title,
        "description": info.description,
        "tech_description": info.tech_description,
        "mode": mode,
        "finished": info.finished,
        "items_count": info.items_count,
    })
}

fn transmission_info_json(info: TransmissionInfo) -> Value {
    json!({
        "transmission_id": codec::wire::format_id(info.id),
        "title": info.title,
        "description": info.description,
        "buffer_ids": info.buffer_ids.into_iter().map(codec::wire::format_id).collect::<Vec<_>>(),
    })
}

fn ids_json(ids: Vec<Uuid>) -> Value {
    Value::Array(ids.into_iter().map(codec::wire::format_id).map(Value::String).collect())
}

/// Demultiplexes inbound messages for one node. One instance per
/// connection: the `peer_id` it mints at construction time stands in for
/// "whoever is on the other end of this transport", since the wire
/// protocol carries no explicit subscriber identity for buffer
/// subscriptions.
pub struct Dispatcher {
    controller: Arc<dyn Controller>,
    correlator: Arc<Correlator>,
    notifications: Arc<dyn NotificationSink>,
    on_simple_request: Arc<dyn Fn(Message) + Send + Sync>,
    peer_id: Uuid,
}

impl Dispatcher {
    pub fn new(
        controller: Arc<dyn Controller>,
        correlator: Arc<Correlator>,
        notifications: Arc<dyn NotificationSink>,
        on_simple_request: Arc<dyn Fn(Message) + Send + Sync>,
    ) -> Self {
        Self {
            controller,
            correlator,
            notifications,
            on_simple_request,
            peer_id: Uuid::new_v4(),
        }
    }

    /// The identity this dispatcher uses as the `subscriber` for buffer
    /// subscription bookkeeping, since the wire protocol has no field for
    /// one.
    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    /// Handle a single inbound message, returning the response to send
    /// back over the transport, if any. `None` covers both notifications
    /// (which never produce a reply) and `simple:` requests, whose replies
    /// are the application callback's own responsibility.
    pub fn dispatch(&self, msg: Message) -> Option<Message> {
        let Some(method) = msg.method.clone() else {
            log::warn!(target: "arpc_core::dispatch", "dropping message with no method");
            return None;
        };

        match route(&method) {
            Routed::Simple(rest) => {
                let mut msg = msg;
                msg.method = Some(rest.to_string());
                (self.on_simple_request)(msg);
                None
            }
            Routed::Arpc(rest) => self.dispatch_arpc(rest, msg),
            Routed::Unprefixed => {
                if msg.is_request() {
                    Some(Message::error_response(msg.id, RpcError::method_not_found()))
                } else {
                    log::debug!(target: "arpc_core::dispatch", "ignoring unprefixed notification {method}");
                    None
                }
            }
        }
    }

    fn dispatch_arpc(&self, method: &str, msg: Message) -> Option<Message> {
        if matches!(method, "NewCall" | "BufferUpdated" | "NewTransmission") {
            self.dispatch_notification(method, &msg);
            return None;
        }

        let empty = Map::new();
        let params = msg.params_map().unwrap_or(&empty);
        let outcome = self.dispatch_request(method, params);

        if !msg.is_request() {
            if let Err(err) = outcome {
                log_discarded(method, err);
            }
            return None;
        }

        let id = msg.id.expect("is_request implies an id");
        Some(match outcome {
            Ok(value) => Message::response(id, value),
            Err(DispatchError::Internal(message)) => {
                log::error!(target: "arpc_core::dispatch", "internal error in {method}: {message}");
                Message::error_response(Some(id), RpcError::internal_error())
            }
            Err(DispatchError::User(message)) => {
                Message::error_response(Some(id), RpcError::invalid_params(message))
            }
            Err(DispatchError::Input(err)) => Message::error_response(Some(id), err),
        })
    }

    fn dispatch_notification(&self, method: &str, msg: &Message) {
        let empty = Map::new();
        let params = msg.params_map().unwrap_or(&empty);

        match method {
            "NewCall" => {
                let Ok(call_id) = required_id(params, "call_id") else {
                    log::warn!(target: "arpc_core::dispatch", "NewCall notification missing call_id");
                    return;
                };
                match optional_id(params, "response_on") {
                    Ok(Some(reply_to)) => self
                        .correlator
                        .deliver(CallRecord::reply(call_id, reply_to, Default::default())),
                    Ok(None) => self.notifications.on_call(call_id),
                    Err(_) => log::warn!(target: "arpc_core::dispatch", "NewCall notification had a malformed response_on"),
                }
            }
            "BufferUpdated" => match required_id(params, "buffer_id") {
                Ok(buffer_id) => self.notifications.on_buffer_updated(buffer_id),
                Err(_) => log::warn!(target: "arpc_core::dispatch", "BufferUpdated notification missing buffer_id"),
            },
            "NewTransmission" => match required_id(params, "tarnsmission_id") {
                Ok(transmission_id) => self.notifications.on_new_transmission(transmission_id),
                Err(_) => log::warn!(target: "arpc_core::dispatch", "NewTransmission notification missing tarnsmission_id"),
            },
            _ => unreachable!("caller already matched the three notification names"),
        }
    }

    fn dispatch_request(&self, method: &str, params: &Map<String, Value>) -> Result<Value, DispatchError> {
        let controller = self.controller.as_ref();

        match method {
            "CallGetList" => Ok(ids_json(op(controller.call_get_list())?)),
            "CallGetInfo" => {
                let call_id = required_id(params, "call_id")?;
                Ok(call_info_json(op(controller.call_get_info(call_id))?))
            }
            "CallGetName" => {
                let call_id = required_id(params, "call_id")?;
                Ok(Value::String(op(controller.call_get_name(call_id))?))
            }
            "CallGetArgCount" => {
                let call_id = required_id(params, "call_id")?;
                Ok(json!(op(controller.call_get_arg_count(call_id))?))
            }
            "CallGetArgValue" => {
                let call_id = required_id(params, "call_id")?;
                let first = required_i64(params, "first")?;
                let last = required_i64(params, "last")?;
                let args = op(controller.call_get_arg_values(call_id, first, last))?;
                Ok(Value::Array(args.into_iter().map(arg_info_json).collect()))
            }
            "CallClose" => {
                let call_id = required_id(params, "call_id")?;
                op(controller.call_close(call_id))?;
                Ok(Value::Null)
            }

            "BufferGetInfo" => {
                let buffer_id = required_id(params, "buffer_id")?;
                Ok(buffer_info_json(op(controller.buffer_get_info(buffer_id))?))
            }
            "BufferGetItemsCount" => {
                let buffer_id = required_id(params, "buffer_id")?;
                Ok(json!(op(controller.buffer_get_items_count(buffer_id))?))
            }
            "BufferGetItemsIds" => {
                let buffer_id = required_id(params, "buffer_id")?;
                let first = required_spec(params, "first_spec")?;
                let last = required_spec(params, "last_spec")?;
                let ids = op(controller.buffer_get_items_ids(buffer_id, &first, &last))?;
                Ok(Value::Array(ids.into_iter().map(Value::String).collect()))
            }
            "BufferGetItemsTimesByIds" => {
                let buffer_id = required_id(params, "buffer_id")?;
                let ids = required_str_array(params, "ids")?;
                let times = op(controller.buffer_get_items_times_by_ids(buffer_id, &ids))?;
                Ok(Value::Array(
                    times.into_iter().map(codec::wire::format_timestamp).map(Value::String).collect(),
                ))
            }
            "BufferGetItemsByIds" => {
                let buffer_id = required_id(params, "buffer_id")?;
                let ids = required_str_array(params, "ids")?;
                let values = op(controller.buffer_get_items_by_ids(buffer_id, &ids))?;
                Ok(Value::Array(values))
            }
            "BufferGetItemsFirstTime" => {
                let buffer_id = required_id(params, "buffer_id")?;
                let time = op(controller.buffer_get_items_first_time(buffer_id))?;
                Ok(time.map(codec::wire::format_timestamp).map(Value::String).unwrap_or(Value::Null))
            }
            "BufferGetItemsLastTime" => {
                let buffer_id = required_id(params, "buffer_id")?;
                let time = op(controller.buffer_get_items_last_time(buffer_id))?;
                Ok(time.map(codec::wire::format_timestamp).map(Value::String).unwrap_or(Value::Null))
            }

            "BufferSubscribeOnUpdatesNotification" => {
                let buffer_id = required_id(params, "buffer_id")?;
                op(controller.buffer_subscribe(buffer_id, self.peer_id))?;
                Ok(Value::Null)
            }
            "BufferUnsubscribeFromUpdatesNotification" => {
                let buffer_id = required_id(params, "buffer_id")?;
                op(controller.buffer_unsubscribe(buffer_id, self.peer_id))?;
                Ok(Value::Null)
            }
            "BufferGetIsSubscribedOnUpdatesNotification" => {
                let buffer_id = required_id(params, "buffer_id")?;
                Ok(json!(op(controller.buffer_get_is_subscribed(buffer_id, self.peer_id))?))
            }
            "BufferGetListSubscribedUpdatesNotifications" => {
                // The source took a buffer_id here; it is semantically a
                // list query, so an incoming one is accepted and ignored.
                Ok(ids_json(op(controller.buffer_get_list_subscribed(self.peer_id))?))
            }

            "BufferBinaryGetSize" => {
                let buffer_id = required_id(params, "buffer_id")?;
                Ok(json!(op(controller.buffer_binary_get_size(buffer_id))?))
            }
            "BufferBinaryGetSlice" => {
                let buffer_id = required_id(params, "buffer_id")?;
                let start = required_u64(params, "start_index")?;
                let end = required_u64(params, "end_index")?;
                let bytes = op(controller.buffer_binary_get_slice(buffer_id, start, end))?;
                Ok(Value::String(codec::wire::encode_bytes(&bytes)))
            }

            "TransmissionGetList" => Ok(ids_json(op(controller.transmission_get_list())?)),
            "TransmissionGetInfo" => {
                let transmission_id = required_id(params, "transmission_id")?;
                Ok(transmission_info_json(op(controller.transmission_get_info(transmission_id))?))
            }

            "SocketGetList" => Ok(ids_json(op(controller.socket_get_list())?)),
            "SocketOpen" => {
                let listening_socket_id = required_id(params, "listening_socket_id")?;
                let connected_id = op(controller.socket_open(listening_socket_id))?;
                Ok(Value::String(codec::wire::format_id(connected_id)))
            }
            "SocketRead" => {
                let connected_socket_id = required_id(params, "connected_socket_id")?;
                let try_read_size = required_usize(params, "try_read_size")?;
                let bytes = op(controller.socket_read(connected_socket_id, try_read_size))?;
                Ok(Value::String(codec::wire::encode_bytes(&bytes)))
            }
            "SocketWrite" => {
                let connected_socket_id = required_id(params, "connected_socket_id")?;
                let bytes = required_bytes(params, "b")?;
                let written = op(controller.socket_write(connected_socket_id, &bytes))?;
                Ok(json!(written))
            }
            "SocketClose" => {
                let connected_socket_id = required_id(params, "connected_socket_id")?;
                op(controller.socket_close(connected_socket_id))?;
                Ok(Value::Null)
            }
            "SocketSetDeadline" => {
                let connected_socket_id = required_id(params, "connected_socket_id")?;
                let deadline = optional_timestamp(params, "t")?;
                op(controller.socket_set_deadline(connected_socket_id, deadline))?;
                Ok(Value::Null)
            }
            "SocketSetReadDeadline" => {
                let connected_socket_id = required_id(params, "connected_socket_id")?;
                let deadline = optional_timestamp(params, "t")?;
                op(controller.socket_set_read_deadline(connected_socket_id, deadline))?;
                Ok(Value::Null)
            }
            "SocketSetWriteDeadline" => {
                let connected_socket_id = required_id(params, "connected_socket_id")?;
                let deadline = optional_timestamp(params, "t")?;
                op(controller.socket_set_write_deadline(connected_socket_id, deadline))?;
                Ok(Value::Null)
            }

            _ => Err(DispatchError::Input(RpcError::method_not_found())),
        }
    }
}

fn log_discarded(method: &str, err: DispatchError) {
    match err {
        DispatchError::Internal(message) => {
            log::error!(target: "arpc_core::dispatch", "internal error handling notification {method}: {message}")
        }
        DispatchError::User(message) => {
            log::debug!(target: "arpc_core::dispatch", "{method} notification declined: {message}")
        }
        DispatchError::Input(err) => {
            log::debug!(target: "arpc_core::dispatch", "{method} notification had bad params: {}", err.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DefaultController;
    use crate::controller::SocketOpener;
    use crate::model::{ArgList, Argument, ArgValue, DuplexSocket, RemoteSocket, SocketError};
    use crate::registry::Registry;
    use codec::Id;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct NoopOpener {
        peers: Mutex<Vec<Arc<DuplexSocket>>>,
    }

    impl SocketOpener for NoopOpener {
        fn open(&self, _listening: &crate::model::ListeningSocket) -> Result<Arc<dyn RemoteSocket>, SocketError> {
            let (a, b) = DuplexSocket::pair();
            self.peers.lock().push(b);
            Ok(a)
        }
    }

    fn dispatcher() -> (Arc<Registry>, Dispatcher) {
        let registry = Registry::new();
        let controller = DefaultController::new(registry.clone(), Arc::new(NoopOpener::default()));
        let dispatcher = Dispatcher::new(
            controller,
            Correlator::new(),
            Arc::new(NoopNotificationSink),
            Arc::new(|_| {}),
        );
        (registry, dispatcher)
    }

    #[test]
    fn unknown_arpc_method_yields_method_not_found() {
        let (_, dispatcher) = dispatcher();
        let msg = Message::request(Id::Number(7), "arpc:Bogus", None);

        let reply = dispatcher.dispatch(msg).unwrap();
        let err = reply.error.unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(reply.id, Some(Id::Number(7)));
    }

    #[test]
    fn simple_prefixed_request_bypasses_validation() {
        let registry = Registry::new();
        let controller = DefaultController::new(registry, Arc::new(NoopOpener::default()));
        let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();

        let dispatcher = Dispatcher::new(
            controller,
            Correlator::new(),
            Arc::new(NoopNotificationSink),
            Arc::new(move |msg| {
                *seen_clone.lock() = msg.method;
            }),
        );

        let msg = Message::request(Id::Number(1), "simple:ping", None);
        assert!(dispatcher.dispatch(msg).is_none());
        assert_eq!(seen.lock().as_deref(), Some("ping"));
    }

    #[test]
    fn call_get_arg_count_round_trips() {
        let (registry, dispatcher) = dispatcher();
        let call_id = registry.call_ids.gen().unwrap();
        let args = ArgList::new(vec![Argument::positional(ArgValue::Basic(Value::from(42)))]);
        registry.register_call(CallRecord::call(call_id, "Ping", args)).unwrap();

        let msg = Message::request(
            Id::Number(1),
            "arpc:CallGetArgCount",
            Some(json!({ "call_id": codec::wire::format_id(call_id) })),
        );

        let reply = dispatcher.dispatch(msg).unwrap();
        assert_eq!(reply.result, Some(json!(1)));
    }

    #[test]
    fn missing_required_param_is_invalid_params() {
        let (_, dispatcher) = dispatcher();
        let msg = Message::request(Id::Number(2), "arpc:CallGetInfo", Some(json!({})));

        let reply = dispatcher.dispatch(msg).unwrap();
        let err = reply.error.unwrap();
        assert_eq!(err.code, error_codes::INVALID_PARAMS);
        assert!(err.message.contains("call_id"));
    }

    #[test]
    fn invalid_buffer_item_specifier_is_rejected() {
        let (registry, dispatcher) = dispatcher();
        let buffer_id = registry.buffer_ids.gen().unwrap();
        registry.buffers.insert(
            buffer_id,
            crate::model::Buffer::new(buffer_id, "t", "d", "td", crate::model::BufferMode::Object),
            crate::resource::DEFAULT_TTL,
        );

        let msg = Message::request(
            Id::Number(3),
            "arpc:BufferGetItemsIds",
            Some(json!({
                "buffer_id": codec::wire::format_id(buffer_id),
                "first_spec": "Q:1",
                "last_spec": "#:5",
            })),
        );

        let reply = dispatcher.dispatch(msg).unwrap();
        let err = reply.error.unwrap();
        assert_eq!(err.code, error_codes::INVALID_PARAMS);
        assert!(err.message.contains("first_spec"));
    }

    #[test]
    fn new_call_notification_with_response_on_delivers_to_correlator() {
        let registry = Registry::new();
        let controller = DefaultController::new(registry, Arc::new(NoopOpener::default()));
        let correlator = Correlator::new();
        let dispatcher = Dispatcher::new(
            controller,
            correlator.clone(),
            Arc::new(NoopNotificationSink),
            Arc::new(|_| {}),
        );

        let original = Uuid::new_v4();
        let wait = correlator.await_reply(original, std::time::Duration::from_secs(1));

        let msg = Message::notification(
            "arpc:NewCall",
            Some(json!({
                "call_id": codec::wire::format_id(Uuid::new_v4()),
                "response_on": codec::wire::format_id(original),
            })),
        );

        assert!(dispatcher.dispatch(msg).is_none());

        pollster::block_on(async {
            let outcome = wait.await;
            assert!(matches!(outcome, crate::correlator::CallOutcome::Response(_)));
        });
    }

    #[test]
    fn new_call_notification_without_response_on_reaches_sink() {
        struct RecordingSink {
            seen: Mutex<Option<Uuid>>,
        }
        impl NotificationSink for RecordingSink {
            fn on_call(&self, call_id: Uuid) {
                *self.seen.lock() = Some(call_id);
            }
            fn on_buffer_updated(&self, _buffer_id: Uuid) {}
            fn on_new_transmission(&self, _transmission_id: Uuid) {}
        }

        let registry = Registry::new();
        let controller = DefaultController::new(registry, Arc::new(NoopOpener::default()));
        let sink = Arc::new(RecordingSink { seen: Mutex::new(None) });
        let dispatcher = Dispatcher::new(controller, Correlator::new(), sink.clone(), Arc::new(|_| {}));

        let call_id = Uuid::new_v4();
        let msg = Message::notification(
            "arpc:NewCall",
            Some(json!({ "call_id": codec::wire::format_id(call_id) })),
        );

        dispatcher.dispatch(msg);
        assert_eq!(*sink.seen.lock(), Some(call_id));
    }
}
