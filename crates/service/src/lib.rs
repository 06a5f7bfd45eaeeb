//! Core runtime for the asymmetric bidirectional RPC layer: identifier
//! registry, resource tables, cleanup worker, reply correlator, protocol
//! dispatcher, controller contract, and the node façade that bundles them
//! into the one object an application embeds per connection.
//!
//! Everything here is synchronous except the handful of places named in
//! the concurrency model (framing-layer send/receive, the response-channel
//! select, the cleanup worker's tick sleep); no core data structure is
//! held across any of those suspension points.

pub mod cleanup;
pub mod controller;
pub mod correlator;
pub mod dispatch;
pub mod ids;
pub mod model;
pub mod node;
pub mod registry;
pub mod resource;

pub use controller::{Controller, DefaultController, OpResult, SocketOpener};
pub use dispatch::{Dispatcher, NoopNotificationSink, NotificationSink};
pub use ids::{IdKind, IdRegistry, ResourceExhausted};
pub use node::{NodeError, NodeFacade, NodeFacadeOptions, TypedOutcome};
pub use registry::Registry;
