//! The one seam `service::Controller` leaves to the application: opening a
//! connected socket for a registered listening socket. This demo backs it
//! with real TCP, matching the blocking `RemoteSocket` contract the way
//! `model::socket::DuplexSocket` does for tests.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use service::model::{ListeningSocket, RemoteSocket, SocketError};
use service::SocketOpener;

fn io_err(e: std::io::Error) -> SocketError {
    SocketError::Io(e.to_string())
}

fn deadline_to_timeout(deadline: Option<DateTime<Utc>>) -> Option<Duration> {
    deadline.map(|d| (d - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

struct TcpRemoteSocket {
    stream: Mutex<TcpStream>,
}

impl RemoteSocket for TcpRemoteSocket {
    fn read(&self, max_size: usize) -> Result<Vec<u8>, SocketError> {
        use std::io::Read;

        let mut buf = vec![0u8; max_size.max(1)];
        let n = self.stream.lock().read(&mut buf).map_err(io_err)?;
        if n == 0 {
            return Err(SocketError::Closed);
        }
        buf.truncate(n);
        Ok(buf)
    }

    fn write(&self, bytes: &[u8]) -> Result<usize, SocketError> {
        use std::io::Write;

        let mut stream = self.stream.lock();
        stream.write_all(bytes).map_err(io_err)?;
        Ok(bytes.len())
    }

    fn close(&self) -> Result<(), SocketError> {
        self.stream
            .lock()
            .shutdown(std::net::Shutdown::Both)
            .map_err(io_err)
    }

    fn set_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), SocketError> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }

    fn set_read_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), SocketError> {
        self.stream
            .lock()
            .set_read_timeout(deadline_to_timeout(deadline))
            .map_err(io_err)
    }

    fn set_write_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), SocketError> {
        self.stream
            .lock()
            .set_write_timeout(deadline_to_timeout(deadline))
            .map_err(io_err)
    }
}

/// Resolves a registered [`ListeningSocket`] id to a dial address and
/// opens a fresh TCP connection to it. The demo registers one entry per
/// listener it binds; an id with no matching address is a caller error,
/// not an I/O failure, so it is reported the same way.
#[derive(Default)]
pub struct TcpSocketOpener {
    addresses: Mutex<HashMap<Uuid, SocketAddr>>,
}

impl TcpSocketOpener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, listening_socket_id: Uuid, addr: SocketAddr) {
        self.addresses.lock().insert(listening_socket_id, addr);
    }

    pub fn forget(&self, listening_socket_id: &Uuid) {
        self.addresses.lock().remove(listening_socket_id);
    }
}

impl SocketOpener for TcpSocketOpener {
    fn open(&self, listening: &ListeningSocket) -> Result<Arc<dyn RemoteSocket>, SocketError> {
        let addr = *self
            .addresses
            .lock()
            .get(&listening.id)
            .ok_or_else(|| SocketError::Io(format!("no dial address for {}", listening.id)))?;

        let stream = TcpStream::connect(addr).map_err(io_err)?;
        Ok(Arc::new(TcpRemoteSocket {
            stream: Mutex::new(stream),
        }))
    }
}
