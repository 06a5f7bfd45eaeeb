//! Registry: the five id spaces and five resource tables bundled together,
//! plus the composite operation that registers a call and its
//! resource-bearing arguments as one unit.

use std::sync::Arc;

use uuid::Uuid;

use crate::ids::{IdKind, IdRegistry, ResourceExhausted};
use crate::model::{
    ArgValue, Buffer, BufferMode, CallRecord, ConnectedSocket, ListeningSocket, Transmission,
    UnattachedSocket,
};
use crate::resource::{DEFAULT_TTL, ResourceTable};

/// One id registry and one resource table per kind, named the way the
/// source names its five `*_id_r` fields.
pub struct Registry {
    pub call_ids: Arc<IdRegistry>,
    pub buffer_ids: Arc<IdRegistry>,
    pub transmission_ids: Arc<IdRegistry>,
    pub listening_socket_ids: Arc<IdRegistry>,
    pub connected_socket_ids: Arc<IdRegistry>,

    pub calls: ResourceTable<CallRecord>,
    pub buffers: ResourceTable<Buffer>,
    pub transmissions: ResourceTable<Transmission>,
    pub listening_sockets: ResourceTable<ListeningSocket>,
    pub connected_sockets: ResourceTable<ConnectedSocket>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            call_ids: IdRegistry::new(),
            buffer_ids: IdRegistry::new(),
            transmission_ids: IdRegistry::new(),
            listening_socket_ids: IdRegistry::new(),
            connected_socket_ids: IdRegistry::new(),
            calls: ResourceTable::new(),
            buffers: ResourceTable::new(),
            transmissions: ResourceTable::new(),
            listening_sockets: ResourceTable::new(),
            connected_sockets: ResourceTable::new(),
        }
    }
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn id_registry(&self, kind: IdKind) -> &Arc<IdRegistry> {
        match kind {
            IdKind::Call => &self.call_ids,
            IdKind::Buffer => &self.buffer_ids,
            IdKind::Transmission => &self.transmission_ids,
            IdKind::ListeningSocket => &self.listening_socket_ids,
            IdKind::ConnectedSocket => &self.connected_socket_ids,
        }
    }

    /// Mint or reserve the id for a single resource-bearing argument,
    /// mutating it in place so the caller gets back the id that ends up
    /// registered. `Basic` arguments are left untouched.
    fn ensure_arg_id(&self, value: &mut ArgValue) -> Result<(), ResourceExhausted> {
        let (kind, id) = match value {
            ArgValue::Basic(_) => return Ok(()),
            ArgValue::Buffer { id, .. } => (IdKind::Buffer, id),
            ArgValue::Transmission { id, .. } => (IdKind::Transmission, id),
            ArgValue::ListeningSocket { id, .. } => (IdKind::ListeningSocket, id),
            ArgValue::ConnectedSocket { id, .. } => (IdKind::ConnectedSocket, id),
        };

        let registry = self.id_registry(kind);
        match *id {
            Some(existing) => {
                registry.reserve(existing);
            }
            None => {
                *id = Some(registry.gen()?);
            }
        }

        Ok(())
    }

    /// Register a call record and a fresh ancillary record for each of
    /// its resource-bearing arguments, in the canonical table lock order
    /// (calls, then buffers, then transmissions, then listening sockets,
    /// then connected sockets). Each table locks and unlocks independently
    /// rather than all five being held at once: nothing observes a
    /// half-registered call, because nothing can look a call up by an id
    /// it hasn't learned yet, and the canonical order still prevents the
    /// only deadlock risk, which is two composite inserts racing against
    /// each other.
    pub fn register_call(&self, mut call: CallRecord) -> Result<Uuid, ResourceExhausted> {
        for arg in &mut call.args.0 {
            self.ensure_arg_id(&mut arg.value)?;
        }

        for arg in &call.args.0 {
            match &arg.value {
                ArgValue::Basic(_) => {}
                ArgValue::Buffer { id, .. } => {
                    let id = id.expect("ensure_arg_id always fills buffer ids");
                    self.buffers.insert(
                        id,
                        Buffer::new(id, "", "", "", BufferMode::Object),
                        DEFAULT_TTL,
                    );
                }
                ArgValue::Transmission { id, .. } => {
                    let id = id.expect("ensure_arg_id always fills transmission ids");
                    self.transmissions
                        .insert(id, Transmission::new(id, "", "", Vec::new()), DEFAULT_TTL);
                }
                ArgValue::ListeningSocket { id, .. } => {
                    let id = id.expect("ensure_arg_id always fills listening socket ids");
                    self.listening_sockets
                        .insert(id, ListeningSocket::new(id, "", ""), DEFAULT_TTL);
                }
                ArgValue::ConnectedSocket { id, .. } => {
                    let id = id.expect("ensure_arg_id always fills connected socket ids");
                    self.connected_sockets.insert(
                        id,
                        ConnectedSocket::new(id, Arc::new(UnattachedSocket)),
                        DEFAULT_TTL,
                    );
                }
            }
        }

        let call_id = call.call_id;
        self.calls.insert(call_id, call, DEFAULT_TTL);
        Ok(call_id)
    }
}
