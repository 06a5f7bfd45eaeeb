//! Identifier Registry: mints fresh, collision-free ids within a single
//! kind. There are five disjoint id spaces (calls, buffers, transmissions,
//! listening sockets, connected sockets); the same bit pattern may
//! legally exist in more than one kind at once, so each kind gets its own
//! `IdRegistry` rather than a single shared space.

use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use ahash::HashSet;

/// The five id kinds named in the data model. Kept as an enum (rather than
/// five copy-pasted registry types) so the resource table module can index
/// on it too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Call,
    Buffer,
    Transmission,
    ListeningSocket,
    ConnectedSocket,
}

impl IdKind {
    pub fn all() -> [IdKind; 5] {
        [
            IdKind::Call,
            IdKind::Buffer,
            IdKind::Transmission,
            IdKind::ListeningSocket,
            IdKind::ConnectedSocket,
        ]
    }
}

/// Raised when the registry cannot produce a fresh id. In practice this
/// only happens if the entropy source itself is broken; a full id space is
/// not a realistic failure mode for a 128-bit identifier.
#[derive(Debug)]
pub struct ResourceExhausted;

impl std::fmt::Display for ResourceExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "id registry exhausted")
    }
}

impl std::error::Error for ResourceExhausted {}

/// A single id space. Safe to call `gen` concurrently from multiple
/// workers: collisions are avoided by rejection-resampling against the set
/// of currently-live ids, under a single lock.
#[derive(Default)]
pub struct IdRegistry {
    live: RwLock<HashSet<Uuid>>,
}

/// Rejection sampling never realistically loops more than once against a
/// 128-bit space; this bound only exists so a corrupted entropy source
/// fails fast instead of spinning forever.
const MAX_ATTEMPTS: usize = 1024;

impl IdRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mint a fresh id, guaranteed not to collide with any id currently
    /// registered in this kind.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_core::ids::IdRegistry;
    ///
    /// let registry = IdRegistry::new();
    /// let a = registry.gen().unwrap();
    /// let b = registry.gen().unwrap();
    /// assert_ne!(a, b);
    /// ```
    pub fn gen(&self) -> Result<Uuid, ResourceExhausted> {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = Uuid::new_v4();
            let mut live = self.live.write();
            if live.insert(candidate) {
                return Ok(candidate);
            }
        }

        Err(ResourceExhausted)
    }

    /// Register an id that was supplied by the caller rather than minted
    /// here (e.g. an argument that already carries an id). Returns `false`
    /// if the id is already live.
    pub fn reserve(&self, id: Uuid) -> bool {
        self.live.write().insert(id)
    }

    /// Release an id back to the space. Safe to call on an id that was
    /// never registered or was already forgotten.
    pub fn forget(&self, id: Uuid) {
        self.live.write().remove(&id);
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.live.read().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
