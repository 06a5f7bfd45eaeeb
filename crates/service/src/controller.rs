//! Controller Contract: the boundary between the protocol dispatcher and
//! application logic. The dispatcher only ever calls through
//! [`Controller`]; [`DefaultController`] is a complete, registry-backed
//! implementation of every query named in the wire method registry, so an
//! application only has to supply how a listening socket is actually
//! opened (see [`SocketOpener`]) rather than reimplement bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use ahash::{HashMap, HashSet};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::model::{
    ArgInfo, ArgList, Buffer, BufferItem, BufferMode, CallRecord, ConnectedSocket, ListeningSocket,
    RemoteSocket, SocketError, Transmission,
};
use crate::resource::DEFAULT_TTL;
use codec::BufferItemSpecifier;

/// The result of a single controller operation: the two error channels
/// that are the controller's responsibility (`input_error`, the third
/// channel in the error design, belongs to the dispatcher's own parameter
/// validation and never reaches here).
pub struct OpResult<T> {
    pub value: Option<T>,
    pub user_error: Option<String>,
    pub internal_error: Option<String>,
}

impl<T> OpResult<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value: Some(value),
            user_error: None,
            internal_error: None,
        }
    }

    pub fn user_error(message: impl Into<String>) -> Self {
        Self {
            value: None,
            user_error: Some(message.into()),
            internal_error: None,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            value: None,
            user_error: None,
            internal_error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallInfo {
    pub call_id: Uuid,
    pub reply_to_id: Option<Uuid>,
    pub name: String,
    pub arg_count: usize,
}

#[derive(Debug, Clone)]
pub struct BufferInfo {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub tech_description: String,
    pub mode: BufferMode,
    pub finished: bool,
    pub items_count: u64,
}

#[derive(Debug, Clone)]
pub struct TransmissionInfo {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub buffer_ids: Vec<Uuid>,
}

/// Supplies the one genuinely application-specific piece of socket
/// handling: turning a listening socket record into a live connection.
/// Everything else about socket bookkeeping (ids, TTL, the read/write/
/// close/deadline surface) is generic and lives in [`DefaultController`].
pub trait SocketOpener: Send + Sync {
    fn open(&self, listening: &ListeningSocket) -> Result<Arc<dyn RemoteSocket>, SocketError>;
}

/// The full query surface the dispatcher drives. One method per request
/// named in the method name registry; notifications (`NewCall`,
/// `BufferUpdated`, `NewTransmission`) are not controller operations —
/// they are emitted by the node façade directly.
pub trait Controller: Send + Sync {
    fn call_get_list(&self) -> OpResult<Vec<Uuid>>;
    fn call_get_info(&self, call_id: Uuid) -> OpResult<CallInfo>;
    fn call_get_name(&self, call_id: Uuid) -> OpResult<String>;
    fn call_get_arg_count(&self, call_id: Uuid) -> OpResult<usize>;
    fn call_get_arg_values(&self, call_id: Uuid, first: i64, last: i64) -> OpResult<Vec<ArgInfo>>;
    fn call_close(&self, call_id: Uuid) -> OpResult<()>;

    fn buffer_get_info(&self, buffer_id: Uuid) -> OpResult<BufferInfo>;
    fn buffer_get_items_count(&self, buffer_id: Uuid) -> OpResult<u64>;
    fn buffer_get_items_ids(
        &self,
        buffer_id: Uuid,
        first: &BufferItemSpecifier,
        last: &BufferItemSpecifier,
    ) -> OpResult<Vec<String>>;
    fn buffer_get_items_times_by_ids(
        &self,
        buffer_id: Uuid,
        ids: &[String],
    ) -> OpResult<Vec<DateTime<Utc>>>;
    fn buffer_get_items_by_ids(&self, buffer_id: Uuid, ids: &[String]) -> OpResult<Vec<Value>>;
    fn buffer_get_items_first_time(&self, buffer_id: Uuid) -> OpResult<Option<DateTime<Utc>>>;
    fn buffer_get_items_last_time(&self, buffer_id: Uuid) -> OpResult<Option<DateTime<Utc>>>;

    fn buffer_subscribe(&self, buffer_id: Uuid, subscriber: Uuid) -> OpResult<()>;
    fn buffer_unsubscribe(&self, buffer_id: Uuid, subscriber: Uuid) -> OpResult<()>;
    fn buffer_get_is_subscribed(&self, buffer_id: Uuid, subscriber: Uuid) -> OpResult<bool>;
    fn buffer_get_list_subscribed(&self, subscriber: Uuid) -> OpResult<Vec<Uuid>>;

    fn buffer_binary_get_size(&self, buffer_id: Uuid) -> OpResult<u64>;
    fn buffer_binary_get_slice(&self, buffer_id: Uuid, start: u64, end: u64) -> OpResult<Vec<u8>>;

    fn transmission_get_list(&self) -> OpResult<Vec<Uuid>>;
    fn transmission_get_info(&self, transmission_id: Uuid) -> OpResult<TransmissionInfo>;

    fn socket_get_list(&self) -> OpResult<Vec<Uuid>>;
    fn socket_open(&self, listening_socket_id: Uuid) -> OpResult<Uuid>;
    fn socket_read(&self, connected_socket_id: Uuid, try_read_size: usize) -> OpResult<Vec<u8>>;
    fn socket_write(&self, connected_socket_id: Uuid, bytes: &[u8]) -> OpResult<usize>;
    fn socket_close(&self, connected_socket_id: Uuid) -> OpResult<()>;
    fn socket_set_deadline(
        &self,
        connected_socket_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    ) -> OpResult<()>;
    fn socket_set_read_deadline(
        &self,
        connected_socket_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    ) -> OpResult<()>;
    fn socket_set_write_deadline(
        &self,
        connected_socket_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    ) -> OpResult<()>;
}

fn item_ids_in_window(buffer: &Buffer, first: usize, last: usize) -> Vec<&BufferItem> {
    buffer
        .items()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i >= first && *i <= last)
        .map(|(_, item)| item)
        .collect()
}

/// A complete, registry-backed [`Controller`]. Every query is answered
/// directly out of a shared [`Registry`](crate::registry::Registry); the
/// only seam an application must fill in is [`SocketOpener`].
pub struct DefaultController {
    registry: Arc<crate::registry::Registry>,
    socket_opener: Arc<dyn SocketOpener>,
    subscriptions: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
}

impl DefaultController {
    pub fn new(registry: Arc<crate::registry::Registry>, socket_opener: Arc<dyn SocketOpener>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            socket_opener,
            subscriptions: Mutex::new(HashMap::default()),
        })
    }

    /// Append a binary item to an existing buffer and return the ids of
    /// subscribers to notify. Not a wire method: buffer mutation is
    /// driven by application logic, not by the dispatcher.
    pub fn buffer_push_binary(&self, buffer_id: Uuid, bytes: Vec<u8>) -> OpResult<Vec<Uuid>> {
        let Some(mut buffer) = self.registry.buffers.find(&buffer_id) else {
            return OpResult::user_error("unknown buffer id");
        };

        if let Err(e) = buffer.push_binary(bytes, Utc::now()) {
            return OpResult::user_error(e.to_string());
        }

        self.registry.buffers.insert(buffer_id, buffer, DEFAULT_TTL);
        OpResult::ok(self.subscribers_of(buffer_id))
    }

    pub fn buffer_push_object(&self, buffer_id: Uuid, value: Value) -> OpResult<Vec<Uuid>> {
        let Some(mut buffer) = self.registry.buffers.find(&buffer_id) else {
            return OpResult::user_error("unknown buffer id");
        };

        if let Err(e) = buffer.push_object(value, Utc::now()) {
            return OpResult::user_error(e.to_string());
        }

        self.registry.buffers.insert(buffer_id, buffer, DEFAULT_TTL);
        OpResult::ok(self.subscribers_of(buffer_id))
    }

    fn subscribers_of(&self, buffer_id: Uuid) -> Vec<Uuid> {
        self.subscriptions
            .lock()
            .get(&buffer_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Controller for DefaultController {
    fn call_get_list(&self) -> OpResult<Vec<Uuid>> {
        OpResult::ok(self.registry.calls.iter().into_iter().map(|(id, _)| id).collect())
    }

    fn call_get_info(&self, call_id: Uuid) -> OpResult<CallInfo> {
        match self.registry.calls.find(&call_id) {
            Some(call) => OpResult::ok(CallInfo {
                call_id: call.call_id,
                reply_to_id: call.reply_to_id,
                name: call.name.clone(),
                arg_count: call.args.len(),
            }),
            None => OpResult::user_error("unknown call id"),
        }
    }

    fn call_get_name(&self, call_id: Uuid) -> OpResult<String> {
        match self.registry.calls.find(&call_id) {
            Some(call) => OpResult::ok(call.name),
            None => OpResult::user_error("unknown call id"),
        }
    }

    fn call_get_arg_count(&self, call_id: Uuid) -> OpResult<usize> {
        match self.registry.calls.find(&call_id) {
            Some(call) => OpResult::ok(call.args.len()),
            None => OpResult::user_error("unknown call id"),
        }
    }

    fn call_get_arg_values(&self, call_id: Uuid, first: i64, last: i64) -> OpResult<Vec<ArgInfo>> {
        let Some(call) = self.registry.calls.find(&call_id) else {
            return OpResult::user_error("unknown call id");
        };

        if first < 0 || last < first {
            return OpResult::user_error("first must be >= 0 and last must be >= first");
        }

        let args: Vec<ArgInfo> = (first..=last)
            .filter_map(|i| call.args.get(i as usize))
            .map(ArgInfo::from)
            .collect();

        OpResult::ok(args)
    }

    fn call_close(&self, call_id: Uuid) -> OpResult<()> {
        match self.registry.calls.remove(&call_id) {
            Some(_) => {
                self.registry.call_ids.forget(call_id);
                OpResult::ok(())
            }
            None => OpResult::user_error("unknown call id"),
        }
    }

    fn buffer_get_info(&self, buffer_id: Uuid) -> OpResult<BufferInfo> {
        match self.registry.buffers.find(&buffer_id) {
            Some(buffer) => OpResult::ok(BufferInfo {
                id: buffer.id,
                title: buffer.title.clone(),
                description: buffer.description.clone(),
                tech_description: buffer.tech_description.clone(),
                mode: buffer.mode,
                finished: buffer.finished,
                items_count: buffer.items_count() as u64,
            }),
            None => OpResult::user_error("unknown buffer id"),
        }
    }

    fn buffer_get_items_count(&self, buffer_id: Uuid) -> OpResult<u64> {
        match self.registry.buffers.find(&buffer_id) {
            Some(buffer) => OpResult::ok(buffer.items_count() as u64),
            None => OpResult::user_error("unknown buffer id"),
        }
    }

    fn buffer_get_items_ids(
        &self,
        buffer_id: Uuid,
        first: &BufferItemSpecifier,
        last: &BufferItemSpecifier,
    ) -> OpResult<Vec<String>> {
        let Some(buffer) = self.registry.buffers.find(&buffer_id) else {
            return OpResult::user_error("unknown buffer id");
        };

        let (Some(first_idx), Some(last_idx)) = (buffer.resolve(first), buffer.resolve(last))
        else {
            return OpResult::user_error("specifier did not resolve to an item in this buffer");
        };

        if last_idx < first_idx {
            return OpResult::user_error("last resolves before first");
        }

        OpResult::ok(
            item_ids_in_window(&buffer, first_idx, last_idx)
                .into_iter()
                .map(|item| item.item_id.wire())
                .collect(),
        )
    }

    fn buffer_get_items_times_by_ids(
        &self,
        buffer_id: Uuid,
        ids: &[String],
    ) -> OpResult<Vec<DateTime<Utc>>> {
        let Some(buffer) = self.registry.buffers.find(&buffer_id) else {
            return OpResult::user_error("unknown buffer id");
        };

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match buffer.items().iter().find(|item| &item.item_id.wire() == id) {
                Some(item) => out.push(item.item_time),
                None => return OpResult::user_error(format!("unknown item id {id}")),
            }
        }

        OpResult::ok(out)
    }

    fn buffer_get_items_by_ids(&self, buffer_id: Uuid, ids: &[String]) -> OpResult<Vec<Value>> {
        let Some(buffer) = self.registry.buffers.find(&buffer_id) else {
            return OpResult::user_error("unknown buffer id");
        };

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match buffer.items().iter().find(|item| &item.item_id.wire() == id) {
                Some(item) => out.push(match &item.value {
                    crate::model::ItemValue::Bytes(bytes) => {
                        Value::String(codec::wire::encode_bytes(bytes))
                    }
                    crate::model::ItemValue::Json(value) => value.clone(),
                }),
                None => return OpResult::user_error(format!("unknown item id {id}")),
            }
        }

        OpResult::ok(out)
    }

    fn buffer_get_items_first_time(&self, buffer_id: Uuid) -> OpResult<Option<DateTime<Utc>>> {
        match self.registry.buffers.find(&buffer_id) {
            Some(buffer) => OpResult::ok(buffer.first_time()),
            None => OpResult::user_error("unknown buffer id"),
        }
    }

    fn buffer_get_items_last_time(&self, buffer_id: Uuid) -> OpResult<Option<DateTime<Utc>>> {
        match self.registry.buffers.find(&buffer_id) {
            Some(buffer) => OpResult::ok(buffer.last_time_public()),
            None => OpResult::user_error("unknown buffer id"),
        }
    }

    fn buffer_subscribe(&self, buffer_id: Uuid, subscriber: Uuid) -> OpResult<()> {
        if !self.registry.buffers.contains(&buffer_id) {
            return OpResult::user_error("unknown buffer id");
        }

        self.subscriptions
            .lock()
            .entry(buffer_id)
            .or_default()
            .insert(subscriber);

        OpResult::ok(())
    }

    fn buffer_unsubscribe(&self, buffer_id: Uuid, subscriber: Uuid) -> OpResult<()> {
        if let Some(set) = self.subscriptions.lock().get_mut(&buffer_id) {
            set.remove(&subscriber);
        }
        OpResult::ok(())
    }

    fn buffer_get_is_subscribed(&self, buffer_id: Uuid, subscriber: Uuid) -> OpResult<bool> {
        OpResult::ok(
            self.subscriptions
                .lock()
                .get(&buffer_id)
                .is_some_and(|set| set.contains(&subscriber)),
        )
    }

    fn buffer_get_list_subscribed(&self, subscriber: Uuid) -> OpResult<Vec<Uuid>> {
        OpResult::ok(
            self.subscriptions
                .lock()
                .iter()
                .filter(|(_, subs)| subs.contains(&subscriber))
                .map(|(buffer_id, _)| *buffer_id)
                .collect(),
        )
    }

    fn buffer_binary_get_size(&self, buffer_id: Uuid) -> OpResult<u64> {
        match self.registry.buffers.find(&buffer_id) {
            Some(buffer) if buffer.mode == BufferMode::Binary => OpResult::ok(buffer.binary_len()),
            Some(_) => OpResult::user_error("buffer is not in binary mode"),
            None => OpResult::user_error("unknown buffer id"),
        }
    }

    fn buffer_binary_get_slice(&self, buffer_id: Uuid, start: u64, end: u64) -> OpResult<Vec<u8>> {
        let Some(buffer) = self.registry.buffers.find(&buffer_id) else {
            return OpResult::user_error("unknown buffer id");
        };

        if start > end {
            return OpResult::user_error("start must be <= end");
        }

        match buffer.binary_slice(start, end) {
            Ok(bytes) => OpResult::ok(bytes),
            Err(e) => OpResult::user_error(e.to_string()),
        }
    }

    fn transmission_get_list(&self) -> OpResult<Vec<Uuid>> {
        OpResult::ok(
            self.registry
                .transmissions
                .iter()
                .into_iter()
                .map(|(id, _)| id)
                .collect(),
        )
    }

    fn transmission_get_info(&self, transmission_id: Uuid) -> OpResult<TransmissionInfo> {
        match self.registry.transmissions.find(&transmission_id) {
            Some(t) => OpResult::ok(TransmissionInfo {
                id: t.id,
                title: t.title,
                description: t.description,
                buffer_ids: t.buffer_ids,
            }),
            None => OpResult::user_error("unknown transmission id"),
        }
    }

    fn socket_get_list(&self) -> OpResult<Vec<Uuid>> {
        // Only sockets available to be opened are listed; already
        // connected sockets are not returned.
        OpResult::ok(
            self.registry
                .listening_sockets
                .iter()
                .into_iter()
                .map(|(id, _)| id)
                .collect(),
        )
    }

    fn socket_open(&self, listening_socket_id: Uuid) -> OpResult<Uuid> {
        let Some(listening) = self.registry.listening_sockets.find(&listening_socket_id) else {
            return OpResult::user_error("unknown listening socket id");
        };

        let remote = match self.socket_opener.open(&listening) {
            Ok(remote) => remote,
            Err(e) => return OpResult::internal_error(e.to_string()),
        };

        let connected_id = match self.registry.connected_socket_ids.gen() {
            Ok(id) => id,
            Err(e) => return OpResult::internal_error(e.to_string()),
        };

        self.registry.connected_sockets.insert(
            connected_id,
            ConnectedSocket::new(connected_id, remote),
            DEFAULT_TTL,
        );

        OpResult::ok(connected_id)
    }

    fn socket_read(&self, connected_socket_id: Uuid, try_read_size: usize) -> OpResult<Vec<u8>> {
        let Some(socket) = self.registry.connected_sockets.find(&connected_socket_id) else {
            return OpResult::user_error("unknown connected socket id");
        };

        match socket.remote.read(try_read_size) {
            Ok(bytes) => OpResult::ok(bytes),
            Err(SocketError::Timeout) => OpResult::user_error("read deadline exceeded"),
            Err(SocketError::Closed) => OpResult::user_error("socket closed"),
            Err(e) => OpResult::internal_error(e.to_string()),
        }
    }

    fn socket_write(&self, connected_socket_id: Uuid, bytes: &[u8]) -> OpResult<usize> {
        let Some(socket) = self.registry.connected_sockets.find(&connected_socket_id) else {
            return OpResult::user_error("unknown connected socket id");
        };

        match socket.remote.write(bytes) {
            Ok(n) => OpResult::ok(n),
            Err(SocketError::Timeout) => OpResult::user_error("write deadline exceeded"),
            Err(SocketError::Closed) => OpResult::user_error("socket closed"),
            Err(e) => OpResult::internal_error(e.to_string()),
        }
    }

    fn socket_close(&self, connected_socket_id: Uuid) -> OpResult<()> {
        match self.registry.connected_sockets.remove(&connected_socket_id) {
            Some(socket) => {
                self.registry.connected_socket_ids.forget(connected_socket_id);
                match socket.remote.close() {
                    Ok(()) | Err(SocketError::Closed) => OpResult::ok(()),
                    Err(e) => OpResult::internal_error(e.to_string()),
                }
            }
            None => OpResult::user_error("unknown connected socket id"),
        }
    }

    fn socket_set_deadline(
        &self,
        connected_socket_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    ) -> OpResult<()> {
        let Some(socket) = self.registry.connected_sockets.find(&connected_socket_id) else {
            return OpResult::user_error("unknown connected socket id");
        };

        match socket.remote.set_deadline(deadline) {
            Ok(()) => OpResult::ok(()),
            Err(SocketError::Closed) => OpResult::user_error("socket closed"),
            Err(e) => OpResult::internal_error(e.to_string()),
        }
    }

    fn socket_set_read_deadline(
        &self,
        connected_socket_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    ) -> OpResult<()> {
        let Some(socket) = self.registry.connected_sockets.find(&connected_socket_id) else {
            return OpResult::user_error("unknown connected socket id");
        };

        match socket.remote.set_read_deadline(deadline) {
            Ok(()) => OpResult::ok(()),
            Err(SocketError::Closed) => OpResult::user_error("socket closed"),
            Err(e) => OpResult::internal_error(e.to_string()),
        }
    }

    fn socket_set_write_deadline(
        &self,
        connected_socket_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    ) -> OpResult<()> {
        let Some(socket) = self.registry.connected_sockets.find(&connected_socket_id) else {
            return OpResult::user_error("unknown connected socket id");
        };

        match socket.remote.set_write_deadline(deadline) {
            Ok(()) => OpResult::ok(()),
            Err(SocketError::Closed) => OpResult::user_error("socket closed"),
            Err(e) => OpResult::internal_error(e.to_string()),
        }
    }
}
