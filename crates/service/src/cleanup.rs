//! Cleanup Worker: the single background task per node that decrements
//! every resource's TTL once a second and evicts whatever hits zero.
//!
//! Each table's `tick()` already returns expired records after releasing
//! its own lock, so the hooks below always run lock-free, satisfying the
//! re-entrancy rule in the concurrency model.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::registry::Registry;
use crate::resource::TICK_INTERVAL;

/// Hooks invoked, outside any table lock, when a record of the matching
/// kind is evicted (by TTL expiry or by the shutdown drain). All are
/// optional; a node with nothing to do on eviction can leave them unset.
#[derive(Clone, Default)]
pub struct CleanupHooks {
    pub on_call_deleted: Option<Arc<dyn Fn(uuid::Uuid) + Send + Sync>>,
    pub on_buffer_deleted: Option<Arc<dyn Fn(uuid::Uuid) + Send + Sync>>,
    pub on_transmission_deleted: Option<Arc<dyn Fn(uuid::Uuid) + Send + Sync>>,
    pub on_listening_socket_deleted: Option<Arc<dyn Fn(uuid::Uuid) + Send + Sync>>,
    pub on_connected_socket_deleted: Option<Arc<dyn Fn(uuid::Uuid) + Send + Sync>>,
}

fn run_hook(hook: &Option<Arc<dyn Fn(uuid::Uuid) + Send + Sync>>, id: uuid::Uuid) {
    if let Some(hook) = hook {
        hook(id);
    }
}

fn sweep(registry: &Registry, hooks: &CleanupHooks) {
    for (id, _) in registry.calls.tick() {
        registry.call_ids.forget(id);
        log::debug!(target: "arpc_core::cleanup", "call {id} expired");
        run_hook(&hooks.on_call_deleted, id);
    }

    for (id, _) in registry.buffers.tick() {
        registry.buffer_ids.forget(id);
        log::debug!(target: "arpc_core::cleanup", "buffer {id} expired");
        run_hook(&hooks.on_buffer_deleted, id);
    }

    for (id, _) in registry.transmissions.tick() {
        registry.transmission_ids.forget(id);
        log::debug!(target: "arpc_core::cleanup", "transmission {id} expired");
        run_hook(&hooks.on_transmission_deleted, id);
    }

    for (id, _) in registry.listening_sockets.tick() {
        registry.listening_socket_ids.forget(id);
        log::debug!(target: "arpc_core::cleanup", "listening socket {id} expired");
        run_hook(&hooks.on_listening_socket_deleted, id);
    }

    for (id, _) in registry.connected_sockets.tick() {
        registry.connected_socket_ids.forget(id);
        log::debug!(target: "arpc_core::cleanup", "connected socket {id} expired");
        run_hook(&hooks.on_connected_socket_deleted, id);
    }
}

fn drain(registry: &Registry, hooks: &CleanupHooks) {
    for (id, _) in registry.calls.drain() {
        registry.call_ids.forget(id);
        run_hook(&hooks.on_call_deleted, id);
    }
    for (id, _) in registry.buffers.drain() {
        registry.buffer_ids.forget(id);
        run_hook(&hooks.on_buffer_deleted, id);
    }
    for (id, _) in registry.transmissions.drain() {
        registry.transmission_ids.forget(id);
        run_hook(&hooks.on_transmission_deleted, id);
    }
    for (id, _) in registry.listening_sockets.drain() {
        registry.listening_socket_ids.forget(id);
        run_hook(&hooks.on_listening_socket_deleted, id);
    }
    for (id, _) in registry.connected_sockets.drain() {
        registry.connected_socket_ids.forget(id);
        run_hook(&hooks.on_connected_socket_deleted, id);
    }
}

/// A running cleanup worker. Dropping this without calling
/// [`CleanupWorker::shutdown`] aborts the task without draining; nodes
/// should always call `shutdown` from `Close`.
pub struct CleanupWorker {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CleanupWorker {
    pub fn spawn(registry: Arc<Registry>, hooks: CleanupHooks) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            // The first tick fires immediately; skip it so a record
            // inserted with the default TTL isn't immediately ticked.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => sweep(&registry, &hooks),
                    _ = &mut shutdown_rx => {
                        drain(&registry, &hooks);
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Signal the worker to drain every table and stop, and wait for it
    /// to finish doing so.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for CleanupWorker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
