//! Data model: the addressable records the resource tables hold, and the
//! argument payload attached to calls.

pub mod argument;
pub mod buffer;
pub mod call;
pub mod socket;
pub mod transmission;

pub use argument::{ArgInfo, ArgKind, ArgList, Argument, ArgValue};
pub use buffer::{Buffer, BufferError, BufferItem, BufferMode, ItemId, ItemValue};
pub use call::{CallRecord, ReplyError};
pub use socket::{
    ConnectedSocket, DuplexSocket, ListeningSocket, RemoteSocket, SocketError, UnattachedSocket,
};
pub use transmission::Transmission;
