//! Wire-level building blocks for the asymmetric RPC runtime: the
//! JSON-RPC 2.0 message envelope, newline-delimited framing over a byte
//! stream, and the Buffer Item Specifier grammar.
//!
//! Everything above this crate (`arpc-core`) works in terms of `Message`
//! and never touches raw bytes directly except through `Framer`.

pub mod buffer_spec;
pub mod framing;
pub mod message;
pub mod wire;

use std::fmt;

#[derive(Debug)]
pub enum Error {
    Json(serde_json::Error),
    InvalidId(String),
    InvalidBytes(String),
    InvalidTimestamp(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Json(e) => write!(f, "malformed json-rpc message: {e}"),
            Error::InvalidId(v) => write!(f, "invalid id: {v}"),
            Error::InvalidBytes(v) => write!(f, "invalid byte array: {v}"),
            Error::InvalidTimestamp(v) => write!(f, "invalid timestamp: {v}"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(value)
    }
}

pub use buffer_spec::{BufferItemSpecifier, SpecifierKind};
pub use framing::Framer;
pub use message::{Id, Message, RpcError, error_codes};
