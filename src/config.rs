use std::fs::read_to_string;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

/// Node-level settings: where it listens for peers and how its resource
/// tables age out. The cleanup tick and default TTL are fixed constants
/// inside `service::resource` (one tick period for the whole process); the
/// fields here size the demo's own registrations, not the scheduler.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Node {
    ///
    /// arpc listen address
    ///
    /// Peers connect here over TCP and exchange newline-delimited
    /// JSON-RPC frames.
    ///
    #[serde(default = "Node::listen")]
    pub listen: SocketAddr,
    ///
    /// Informational mirror of `service::resource::TICK_INTERVAL`; logged
    /// at startup so a mismatch with the compiled-in constant is visible.
    ///
    #[serde(default = "Node::cleanup_tick_seconds")]
    pub cleanup_tick_seconds: u64,
    ///
    /// TTL applied to resources the demo registers itself (listening
    /// sockets, seed buffers). Calls registered by peers still use
    /// `service::resource::DEFAULT_TTL`.
    ///
    #[serde(default = "Node::default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    ///
    /// How long a typed request this node issues waits for its peer's
    /// reply before `NodeFacade` reports it as timed out.
    ///
    #[serde(default = "Node::request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Node {
    fn listen() -> SocketAddr {
        "127.0.0.1:4600".parse().unwrap()
    }

    fn cleanup_tick_seconds() -> u64 {
        1
    }

    fn default_ttl_seconds() -> u64 {
        600
    }

    fn request_timeout_seconds() -> u64 {
        30
    }
}

impl Default for Node {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
            cleanup_tick_seconds: Self::cleanup_tick_seconds(),
            default_ttl_seconds: Self::default_ttl_seconds(),
            request_timeout_seconds: Self::request_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub node: Node,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// Example: arpc-node --config /etc/arpc-node/config.toml
    ///
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    ///
    /// Load configuration from the file named on the command line, or
    /// fall back to the compiled-in defaults when `--config` is absent.
    ///
    pub fn load() -> Result<Self> {
        match Cli::parse().config {
            Some(path) => Ok(toml::from_str(&read_to_string(path)?)?),
            None => Ok(Self::default()),
        }
    }
}
