//! Resource Table: a TTL-bearing, insertion-order-preserving map keyed by
//! id. One instance exists per id kind (call / buffer / transmission /
//! listening socket / connected socket); the five independent tables are
//! bundled in [`crate::registry::Registry`].
//!
//! Every table is guarded by its own `parking_lot::Mutex` and is never held
//! across anything that can suspend. Composite operations that must touch
//! more than one table lock them in the fixed order calls → buffers →
//! transmissions → listening_sockets → connected_sockets to avoid deadlock.

use std::time::Duration;

use ahash::HashMap;
use parking_lot::Mutex;
use uuid::Uuid;

/// Every record registered through this crate starts with this TTL unless
/// a caller overrides it.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// The cleanup worker's tick period; also the unit TTL is decremented by.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

struct Entry<V> {
    value: V,
    ttl: Duration,
}

struct Inner<V> {
    map: HashMap<Uuid, Entry<V>>,
    // Insertion order, used only so cleanup iteration and `list` calls are
    // stable; may contain ids no longer present in `map` until the next
    // compaction.
    order: Vec<Uuid>,
}

impl<V> Default for Inner<V> {
    fn default() -> Self {
        Self {
            map: HashMap::default(),
            order: Vec::new(),
        }
    }
}

impl<V> Inner<V> {
    fn compact_order_if_needed(&mut self) {
        if self.order.len() > self.map.len() * 2 + 16 {
            self.order.retain(|id| self.map.contains_key(id));
        }
    }
}

/// A TTL-bearing resource table, generic over the record type it holds.
pub struct ResourceTable<V> {
    inner: Mutex<Inner<V>>,
}

impl<V> Default for ResourceTable<V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl<V> ResourceTable<V>
where
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Uuid, value: V, ttl: Duration) {
        let mut inner = self.inner.lock();
        inner.order.push(id);
        inner.map.insert(id, Entry { value, ttl });
    }

    pub fn remove(&self, id: &Uuid) -> Option<V> {
        let mut inner = self.inner.lock();
        let removed = inner.map.remove(id).map(|e| e.value);
        inner.compact_order_if_needed();
        removed
    }

    pub fn find(&self, id: &Uuid) -> Option<V> {
        self.inner.lock().map.get(id).map(|e| e.value.clone())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner.lock().map.contains_key(id)
    }

    /// Snapshot of every live record in insertion order. Returned as an
    /// owned `Vec` so the caller never holds the table lock while using
    /// the results.
    pub fn iter(&self) -> Vec<(Uuid, V)> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.map.get(id).map(|e| (*id, e.value.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decrement every record's TTL by `TICK_INTERVAL` and remove whatever
    /// hits zero. Returns the removed records so the caller can invoke
    /// `on_deleted` hooks outside this table's lock.
    pub fn tick(&self) -> Vec<(Uuid, V)> {
        let mut inner = self.inner.lock();
        let mut expired = Vec::new();

        for id in inner.order.clone() {
            if let Some(entry) = inner.map.get_mut(&id) {
                entry.ttl = entry.ttl.saturating_sub(TICK_INTERVAL);
                if entry.ttl.is_zero() {
                    if let Some(entry) = inner.map.remove(&id) {
                        expired.push((id, entry.value));
                    }
                }
            }
        }

        inner.compact_order_if_needed();
        expired
    }

    /// Remove and return every record, in insertion order. Used for node
    /// shutdown, which must drain every table and invoke hooks before the
    /// cleanup worker is released.
    pub fn drain(&self) -> Vec<(Uuid, V)> {
        let mut inner = self.inner.lock();
        let drained: Vec<(Uuid, V)> = inner
            .order
            .drain(..)
            .filter_map(|id| inner.map.remove(&id).map(|e| (id, e.value)))
            .collect();

        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_find_remove() {
        let table: ResourceTable<&'static str> = ResourceTable::new();
        let id = Uuid::new_v4();

        table.insert(id, "hello", DEFAULT_TTL);
        assert_eq!(table.find(&id), Some("hello"));
        assert_eq!(table.remove(&id), Some("hello"));
        assert_eq!(table.find(&id), None);
    }

    #[test]
    fn tick_expires_at_zero_ttl() {
        let table: ResourceTable<u32> = ResourceTable::new();
        let id = Uuid::new_v4();

        table.insert(id, 1, Duration::from_secs(2));
        assert!(table.tick().is_empty());
        assert!(table.contains(&id));

        let expired = table.tick();
        assert_eq!(expired, vec![(id, 1)]);
        assert!(!table.contains(&id));
    }

    #[test]
    fn iter_preserves_insertion_order() {
        let table: ResourceTable<u32> = ResourceTable::new();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

        for (i, id) in ids.iter().enumerate() {
            table.insert(*id, i as u32, DEFAULT_TTL);
        }

        let snapshot = table.iter();
        assert_eq!(
            snapshot.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn drain_empties_the_table() {
        let table: ResourceTable<u32> = ResourceTable::new();
        for i in 0..3 {
            table.insert(Uuid::new_v4(), i, DEFAULT_TTL);
        }

        let drained = table.drain();
        assert_eq!(drained.len(), 3);
        assert!(table.is_empty());
    }
}
