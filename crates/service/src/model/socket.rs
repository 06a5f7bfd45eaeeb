//! Listening and connected sockets: remote-addressable stream endpoints.
//!
//! Concrete transports are explicitly out of scope beyond the in-process
//! pair used for testing (see [`DuplexSocket`]); anything else is wired
//! in by the application through [`RemoteSocket`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    Closed,
    Timeout,
    Io(String),
}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketError::Closed => write!(f, "socket closed"),
            SocketError::Timeout => write!(f, "socket deadline exceeded"),
            SocketError::Io(msg) => write!(f, "socket io error: {msg}"),
        }
    }
}

impl std::error::Error for SocketError {}

/// The stream-endpoint contract every connected socket argument is backed
/// by. The dispatcher and node façade only ever go through this trait, so
/// a concrete transport (TCP, a test duplex pipe, anything else) can be
/// substituted without touching dispatch logic.
pub trait RemoteSocket: Send + Sync {
    fn read(&self, max_size: usize) -> Result<Vec<u8>, SocketError>;
    fn write(&self, bytes: &[u8]) -> Result<usize, SocketError>;
    fn close(&self) -> Result<(), SocketError>;
    fn set_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), SocketError>;
    fn set_read_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), SocketError>;
    fn set_write_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), SocketError>;
}

/// Metadata record for a listening socket argument. The listening socket
/// itself never reads or writes; `SocketOpen` against its id produces a
/// fresh [`ConnectedSocket`].
#[derive(Debug, Clone)]
pub struct ListeningSocket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
}

impl ListeningSocket {
    pub fn new(id: Uuid, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// An open stream endpoint addressable by id. Cheap to clone: the
/// resource table stores records by value, so the actual endpoint lives
/// behind the shared `Arc`.
#[derive(Clone)]
pub struct ConnectedSocket {
    pub id: Uuid,
    pub remote: Arc<dyn RemoteSocket>,
}

impl ConnectedSocket {
    pub fn new(id: Uuid, remote: Arc<dyn RemoteSocket>) -> Self {
        Self { id, remote }
    }
}

/// Placeholder remote for a `ConnectedSocket` argument that arrives over
/// the wire with no live transport backing it yet: every operation fails
/// as closed rather than panicking. `SocketOpen` is the only path that
/// attaches a real [`RemoteSocket`]; nothing replaces this stub in place.
pub struct UnattachedSocket;

impl RemoteSocket for UnattachedSocket {
    fn read(&self, _max_size: usize) -> Result<Vec<u8>, SocketError> {
        Err(SocketError::Closed)
    }

    fn write(&self, _bytes: &[u8]) -> Result<usize, SocketError> {
        Err(SocketError::Closed)
    }

    fn close(&self) -> Result<(), SocketError> {
        Ok(())
    }

    fn set_deadline(&self, _deadline: Option<DateTime<Utc>>) -> Result<(), SocketError> {
        Err(SocketError::Closed)
    }

    fn set_read_deadline(&self, _deadline: Option<DateTime<Utc>>) -> Result<(), SocketError> {
        Err(SocketError::Closed)
    }

    fn set_write_deadline(&self, _deadline: Option<DateTime<Utc>>) -> Result<(), SocketError> {
        Err(SocketError::Closed)
    }
}

fn deadline_to_timeout(deadline: Option<DateTime<Utc>>) -> Option<Duration> {
    deadline.map(|d| {
        (d - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    })
}

/// The in-process test double named in the module overview: two
/// [`DuplexSocket`] halves wired to each other's channels, so tests can
/// exercise `SocketRead`/`SocketWrite` without a real transport.
pub struct DuplexSocket {
    outbound: Sender<Vec<u8>>,
    inbound: Mutex<mpsc::Receiver<Vec<u8>>>,
    pending: Mutex<VecDeque<u8>>,
    closed: AtomicBool,
    read_deadline: Mutex<Option<DateTime<Utc>>>,
    write_deadline: Mutex<Option<DateTime<Utc>>>,
}

impl DuplexSocket {
    /// Build a connected pair: bytes written to one side are read from
    /// the other.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_core::model::socket::{DuplexSocket, RemoteSocket};
    ///
    /// let (a, b) = DuplexSocket::pair();
    /// a.write(b"hello").unwrap();
    /// assert_eq!(b.read(5).unwrap(), b"hello");
    /// ```
    pub fn pair() -> (Arc<DuplexSocket>, Arc<DuplexSocket>) {
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();

        let a = Arc::new(DuplexSocket {
            outbound: tx_a,
            inbound: Mutex::new(rx_b),
            pending: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            read_deadline: Mutex::new(None),
            write_deadline: Mutex::new(None),
        });

        let b = Arc::new(DuplexSocket {
            outbound: tx_b,
            inbound: Mutex::new(rx_a),
            pending: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            read_deadline: Mutex::new(None),
            write_deadline: Mutex::new(None),
        });

        (a, b)
    }

    fn ensure_open(&self) -> Result<(), SocketError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SocketError::Closed)
        } else {
            Ok(())
        }
    }
}

impl RemoteSocket for DuplexSocket {
    fn read(&self, max_size: usize) -> Result<Vec<u8>, SocketError> {
        self.ensure_open()?;

        let mut pending = self.pending.lock();
        if pending.is_empty() {
            let timeout = deadline_to_timeout(*self.read_deadline.lock());
            let chunk = match timeout {
                Some(timeout) => self.inbound.lock().recv_timeout(timeout).map_err(|e| match e {
                    RecvTimeoutError::Timeout => SocketError::Timeout,
                    RecvTimeoutError::Disconnected => SocketError::Closed,
                }),
                None => self
                    .inbound
                    .lock()
                    .recv()
                    .map_err(|_| SocketError::Closed),
            }?;
            pending.extend(chunk);
        }

        let n = max_size.min(pending.len());
        Ok(pending.drain(..n).collect())
    }

    fn write(&self, bytes: &[u8]) -> Result<usize, SocketError> {
        self.ensure_open()?;
        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| SocketError::Closed)?;
        Ok(bytes.len())
    }

    fn close(&self) -> Result<(), SocketError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn set_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), SocketError> {
        self.ensure_open()?;
        *self.read_deadline.lock() = deadline;
        *self.write_deadline.lock() = deadline;
        Ok(())
    }

    fn set_read_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), SocketError> {
        self.ensure_open()?;
        *self.read_deadline.lock() = deadline;
        Ok(())
    }

    fn set_write_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), SocketError> {
        self.ensure_open()?;
        *self.write_deadline.lock() = deadline;
        Ok(())
    }
}
