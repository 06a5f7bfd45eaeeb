//! Buffer: an addressable ordered collection, either a contiguous binary
//! byte stream split into non-overlapping ranges, or a sequence of
//! JSON-encodable objects addressed by index.
//!
//! This module is the in-memory reference storage backend referred to in
//! the module overview; a file-backed backend is a pluggable extension
//! point this type's shape was kept narrow enough to support, but it is
//! not required here.

use chrono::{DateTime, Utc};
use codec::buffer_spec::BufferItemSpecifier;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    Binary,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemId {
    /// Binary mode: a half-open byte range `[start, end)`.
    ByteRange { start: u64, end: u64 },
    /// Object mode: a zero-based sequential index.
    Index(u64),
}

impl ItemId {
    /// The wire form an item id is addressed by under the `S:` specifier
    /// form: `"{start}:{end}"` for a byte range, the bare index otherwise.
    pub fn wire(&self) -> String {
        match self {
            ItemId::ByteRange { start, end } => format!("{start}:{end}"),
            ItemId::Index(i) => i.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ItemValue {
    Bytes(Vec<u8>),
    Json(Value),
}

#[derive(Debug, Clone)]
pub struct BufferItem {
    pub buffer_id: Uuid,
    pub item_id: ItemId,
    pub item_time: DateTime<Utc>,
    pub value: ItemValue,
}

#[derive(Debug)]
pub enum BufferError {
    WrongMode,
    NonMonotonicTime,
    OutOfRange,
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::WrongMode => write!(f, "operation does not match buffer mode"),
            BufferError::NonMonotonicTime => write!(f, "item time must be non-decreasing"),
            BufferError::OutOfRange => write!(f, "requested range is out of bounds"),
        }
    }
}

impl std::error::Error for BufferError {}

/// A single addressable buffer. Item append enforces the invariants named
/// in the data model: binary ranges are non-overlapping and monotonically
/// increasing, object indices are zero-based and sequential, and item
/// times never go backwards.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub tech_description: String,
    pub mode: BufferMode,
    pub finished: bool,
    items: Vec<BufferItem>,
}

impl Buffer {
    pub fn new(
        id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
        tech_description: impl Into<String>,
        mode: BufferMode,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            tech_description: tech_description.into(),
            mode,
            finished: false,
            items: Vec::new(),
        }
    }

    fn last_time(&self) -> Option<DateTime<Utc>> {
        self.items.last().map(|it| it.item_time)
    }

    pub fn push_binary(&mut self, bytes: Vec<u8>, time: DateTime<Utc>) -> Result<(), BufferError> {
        if self.mode != BufferMode::Binary {
            return Err(BufferError::WrongMode);
        }

        if self.last_time().is_some_and(|last| time < last) {
            return Err(BufferError::NonMonotonicTime);
        }

        let start = self
            .items
            .last()
            .map(|it| match it.item_id {
                ItemId::ByteRange { end, .. } => end,
                ItemId::Index(_) => unreachable!("binary buffer only holds byte ranges"),
            })
            .unwrap_or(0);
        let end = start + bytes.len() as u64;

        self.items.push(BufferItem {
            buffer_id: self.id,
            item_id: ItemId::ByteRange { start, end },
            item_time: time,
            value: ItemValue::Bytes(bytes),
        });

        Ok(())
    }

    pub fn push_object(&mut self, value: Value, time: DateTime<Utc>) -> Result<(), BufferError> {
        if self.mode != BufferMode::Object {
            return Err(BufferError::WrongMode);
        }

        if self.last_time().is_some_and(|last| time < last) {
            return Err(BufferError::NonMonotonicTime);
        }

        let index = self.items.len() as u64;
        self.items.push(BufferItem {
            buffer_id: self.id,
            item_id: ItemId::Index(index),
            item_time: time,
            value: ItemValue::Json(value),
        });

        Ok(())
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn items_count(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[BufferItem] {
        &self.items
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.items.first().map(|it| it.item_time)
    }

    pub fn last_time_public(&self) -> Option<DateTime<Utc>> {
        self.last_time()
    }

    /// Resolve a specifier to a position in `items`. `Index` addresses the
    /// nth item directly; `StringId` matches the item's wire id; `Time`
    /// resolves to the first item whose time is not before the requested
    /// instant (a lower bound), so a pair of specifiers brackets a window.
    pub fn resolve(&self, spec: &BufferItemSpecifier) -> Option<usize> {
        match spec {
            BufferItemSpecifier::Index(n) => {
                let n = *n as usize;
                (n < self.items.len()).then_some(n)
            }
            BufferItemSpecifier::StringId(s) => {
                self.items.iter().position(|it| &it.item_id.wire() == s)
            }
            BufferItemSpecifier::Time(t) => self.items.iter().position(|it| it.item_time >= *t),
            BufferItemSpecifier::Invalid => None,
        }
    }

    /// Total byte length of the contiguous stream a binary buffer
    /// concatenates to. `0` for an object-mode buffer or an empty one.
    pub fn binary_len(&self) -> u64 {
        self.items
            .last()
            .map(|it| match it.item_id {
                ItemId::ByteRange { end, .. } => end,
                ItemId::Index(_) => 0,
            })
            .unwrap_or(0)
    }

    /// Reconstruct `[start, end)` of the contiguous byte stream.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_core::model::buffer::{Buffer, BufferMode};
    /// use chrono::Utc;
    /// use uuid::Uuid;
    ///
    /// let mut buf = Buffer::new(Uuid::new_v4(), "t", "d", "td", BufferMode::Binary);
    /// buf.push_binary((0..10u8).collect(), Utc::now()).unwrap();
    ///
    /// assert_eq!(buf.binary_slice(3, 7).unwrap(), vec![3, 4, 5, 6]);
    /// assert_eq!(buf.binary_slice(3, 3).unwrap(), Vec::<u8>::new());
    /// ```
    pub fn binary_slice(&self, start: u64, end: u64) -> Result<Vec<u8>, BufferError> {
        if self.mode != BufferMode::Binary {
            return Err(BufferError::WrongMode);
        }

        if start > end || end > self.binary_len() {
            return Err(BufferError::OutOfRange);
        }

        if start == end {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity((end - start) as usize);
        for item in &self.items {
            let ItemId::ByteRange {
                start: item_start,
                end: item_end,
            } = item.item_id
            else {
                unreachable!("binary buffer only holds byte ranges")
            };

            if item_end <= start || item_start >= end {
                continue;
            }

            let ItemValue::Bytes(bytes) = &item.value else {
                unreachable!("binary buffer only holds byte values")
            };

            let lo = start.max(item_start) - item_start;
            let hi = end.min(item_end) - item_start;
            out.extend_from_slice(&bytes[lo as usize..hi as usize]);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(mode: BufferMode) -> Buffer {
        Buffer::new(Uuid::new_v4(), "title", "desc", "tech", mode)
    }

    #[test]
    fn binary_items_form_contiguous_ranges() {
        let mut buf = buffer(BufferMode::Binary);
        buf.push_binary(vec![1, 2, 3], Utc::now()).unwrap();
        buf.push_binary(vec![4, 5], Utc::now()).unwrap();

        assert_eq!(buf.binary_len(), 5);
        assert_eq!(buf.binary_slice(0, 5).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(buf.binary_slice(2, 4).unwrap(), vec![3, 4]);
    }

    #[test]
    fn object_items_get_sequential_indices() {
        let mut buf = buffer(BufferMode::Object);
        buf.push_object(Value::from(1), Utc::now()).unwrap();
        buf.push_object(Value::from(2), Utc::now()).unwrap();

        assert_eq!(buf.items()[0].item_id, ItemId::Index(0));
        assert_eq!(buf.items()[1].item_id, ItemId::Index(1));
    }

    #[test]
    fn rejects_non_monotonic_time() {
        let mut buf = buffer(BufferMode::Object);
        let now = Utc::now();
        buf.push_object(Value::Null, now).unwrap();

        let earlier = now - chrono::Duration::seconds(1);
        assert!(matches!(
            buf.push_object(Value::Null, earlier),
            Err(BufferError::NonMonotonicTime)
        ));
    }

    #[test]
    fn out_of_range_slice_is_rejected() {
        let mut buf = buffer(BufferMode::Binary);
        buf.push_binary(vec![1, 2, 3], Utc::now()).unwrap();

        assert!(matches!(
            buf.binary_slice(0, 10),
            Err(BufferError::OutOfRange)
        ));
    }

    #[test]
    fn resolves_specifiers() {
        let mut buf = buffer(BufferMode::Object);
        buf.push_object(Value::from(1), Utc::now()).unwrap();
        buf.push_object(Value::from(2), Utc::now()).unwrap();

        assert_eq!(buf.resolve(&BufferItemSpecifier::Index(1)), Some(1));
        assert_eq!(
            buf.resolve(&BufferItemSpecifier::StringId("1".to_string())),
            Some(1)
        );
        assert_eq!(buf.resolve(&BufferItemSpecifier::Index(5)), None);
    }
}
