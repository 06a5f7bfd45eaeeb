//! TCP transport: accepts peer connections and wires each one to its own
//! [`NodeFacade`], the way the teacher's `server.rs` spins up one handler
//! per accepted socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use service::{Controller, NodeFacade, NodeFacadeOptions, Registry};
use service::{NoopNotificationSink, NotificationSink};
use service::cleanup::CleanupHooks;

/// Bind `addr` and serve peers forever, one [`NodeFacade`] per connection.
/// Each connection gets its own [`Registry`] and cleanup worker: resources
/// (calls, buffers, transmissions, sockets) are per-connection in this
/// demo, not shared across peers.
pub async fn serve(
    addr: SocketAddr,
    controller_factory: impl Fn(Arc<Registry>) -> Arc<dyn Controller> + Send + Sync + 'static,
    notifications: Arc<dyn NotificationSink>,
    request_timeout: Duration,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("listening for arpc peers on {addr}");
    let controller_factory = Arc::new(controller_factory);

    loop {
        let (socket, peer_addr) = listener.accept().await?;
        log::debug!(target: "arpc_node::transport", "accepted connection from {peer_addr}");

        let controller_factory = controller_factory.clone();
        let notifications = notifications.clone();

        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(socket, controller_factory, notifications, request_timeout).await
            {
                log::warn!(target: "arpc_node::transport", "connection {peer_addr} ended: {e}");
            }
        });
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    controller_factory: Arc<impl Fn(Arc<Registry>) -> Arc<dyn Controller> + Send + Sync + 'static>,
    notifications: Arc<dyn NotificationSink>,
    request_timeout: Duration,
) -> anyhow::Result<()> {
    let (mut read_half, mut write_half) = socket.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let registry = Registry::new();
    let controller = controller_factory(registry.clone());

    let node = NodeFacade::new(NodeFacadeOptions {
        controller,
        registry,
        notifications,
        on_simple_request: Arc::new(|msg| {
            log::debug!(target: "arpc_node::transport", "discarding unhandled simple: request {:?}", msg.method);
        }),
        push_message_to_outside: Arc::new(move |bytes| {
            let _ = out_tx.send(bytes);
        }),
        cleanup_hooks: CleanupHooks::default(),
        request_timeout,
    });

    let writer = tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut buf = [0u8; 8192];
    loop {
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        if let Err(e) = node.push_message_from_outside(&buf[..n]) {
            log::warn!(target: "arpc_node::transport", "dropping connection after framing error: {e}");
            break;
        }
    }

    node.close().await;
    writer.abort();
    Ok(())
}

pub fn noop_notifications() -> Arc<dyn NotificationSink> {
    Arc::new(NoopNotificationSink)
}
