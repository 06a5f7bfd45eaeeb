pub mod config;
pub mod socket;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use service::{Controller, DefaultController, Registry};
use socket::TcpSocketOpener;

/// In order to let an integration test drive the node directly without
/// going through a binary, a function is exposed in place of `main` that
/// starts the server.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<()> {
    let opener = TcpSocketOpener::new();
    let request_timeout = Duration::from_secs(config.node.request_timeout_seconds);

    log::debug!(
        target: "arpc_node",
        "cleanup tick configured at {}s (compiled-in scheduler tick is service::resource::TICK_INTERVAL)",
        config.node.cleanup_tick_seconds,
    );

    let controller_factory = {
        let opener = opener.clone();
        move |registry: Arc<Registry>| -> Arc<dyn Controller> {
            DefaultController::new(registry, opener.clone())
        }
    };

    transport::serve(
        config.node.listen,
        controller_factory,
        transport::noop_notifications(),
        request_timeout,
    )
    .await
}
