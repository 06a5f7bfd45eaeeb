//! Buffer Item Specifier grammar: `prefix ":" payload`, a compact
//! single-string range selector used to address buffer items without a
//! side channel for "what kind of address is this".

use chrono::{DateTime, SecondsFormat, Utc};

/// The three valid selector kinds, plus the `Invalid` sentinel that every
/// unparsable or unrecognized-prefix string collapses to. `Invalid` is the
/// default so a default-constructed specifier always fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferItemSpecifier {
    /// `#:<int>` — zero-based index.
    Index(u64),
    /// `T:<RFC3339-nano>` — time coordinate.
    Time(DateTime<Utc>),
    /// `S:<string>` — opaque string id.
    StringId(String),
    Invalid,
}

impl Default for BufferItemSpecifier {
    fn default() -> Self {
        BufferItemSpecifier::Invalid
    }
}

/// The discriminator returned alongside the parsed value, so callers can
/// test for `Invalid` without matching on the specifier itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    Index,
    Time,
    StringId,
    Invalid,
}

impl BufferItemSpecifier {
    pub fn kind(&self) -> SpecifierKind {
        match self {
            BufferItemSpecifier::Index(_) => SpecifierKind::Index,
            BufferItemSpecifier::Time(_) => SpecifierKind::Time,
            BufferItemSpecifier::StringId(_) => SpecifierKind::StringId,
            BufferItemSpecifier::Invalid => SpecifierKind::Invalid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind() != SpecifierKind::Invalid
    }

    /// Parse a specifier string. Whitespace around the whole string is
    /// trimmed first; interior whitespace only matters for `S`, where it is
    /// part of the opaque payload.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_codec::buffer_spec::{BufferItemSpecifier, SpecifierKind};
    ///
    /// assert_eq!(BufferItemSpecifier::parse("#:5").kind(), SpecifierKind::Index);
    /// assert_eq!(BufferItemSpecifier::parse("Q:5").kind(), SpecifierKind::Invalid);
    /// assert_eq!(BufferItemSpecifier::parse("no-colon").kind(), SpecifierKind::Invalid);
    /// ```
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        let Some((prefix, payload)) = trimmed.split_once(':') else {
            return BufferItemSpecifier::Invalid;
        };

        match prefix {
            "#" => payload
                .parse::<u64>()
                .map(BufferItemSpecifier::Index)
                .unwrap_or(BufferItemSpecifier::Invalid),
            "T" => DateTime::parse_from_rfc3339(payload)
                .map(|dt| BufferItemSpecifier::Time(dt.with_timezone(&Utc)))
                .unwrap_or(BufferItemSpecifier::Invalid),
            "S" => BufferItemSpecifier::StringId(payload.to_string()),
            _ => BufferItemSpecifier::Invalid,
        }
    }

    /// Re-emit the canonical wire form. Lossless for every valid variant;
    /// `None` for `Invalid` since there is nothing sensible to emit.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_codec::buffer_spec::BufferItemSpecifier;
    ///
    /// let spec = BufferItemSpecifier::parse("#:42");
    /// assert_eq!(spec.emit().as_deref(), Some("#:42"));
    ///
    /// let spec = BufferItemSpecifier::parse("S:hello world");
    /// assert_eq!(spec.emit().as_deref(), Some("S:hello world"));
    /// ```
    pub fn emit(&self) -> Option<String> {
        match self {
            BufferItemSpecifier::Index(n) => Some(format!("#:{n}")),
            BufferItemSpecifier::Time(t) => {
                Some(format!("T:{}", t.to_rfc3339_opts(SecondsFormat::Nanos, true)))
            }
            BufferItemSpecifier::StringId(s) => Some(format!("S:{s}")),
            BufferItemSpecifier::Invalid => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_index() {
        for n in [0u64, 1, 5, 1_000_000] {
            let spec = BufferItemSpecifier::parse(&format!("#:{n}"));
            assert_eq!(spec, BufferItemSpecifier::Index(n));
            assert_eq!(spec.emit(), Some(format!("#:{n}")));
        }
    }

    #[test]
    fn round_trips_time() {
        let original = "T:2024-01-02T03:04:05.123456789Z";
        let spec = BufferItemSpecifier::parse(original);
        assert!(matches!(spec, BufferItemSpecifier::Time(_)));
        assert_eq!(spec.emit().as_deref(), Some(original));
    }

    #[test]
    fn round_trips_string_id_with_interior_whitespace() {
        let original = "S: has  spaces ";
        let spec = BufferItemSpecifier::parse(original);
        assert_eq!(spec, BufferItemSpecifier::StringId(" has  spaces ".to_string()));
        assert_eq!(spec.emit().as_deref(), Some(original));
    }

    #[test]
    fn trims_outer_whitespace_only() {
        let spec = BufferItemSpecifier::parse("  #:7  ");
        assert_eq!(spec, BufferItemSpecifier::Index(7));
    }

    #[test]
    fn rejects_unknown_prefix_missing_colon_and_bad_payload() {
        assert_eq!(BufferItemSpecifier::parse("Q:1").kind(), SpecifierKind::Invalid);
        assert_eq!(BufferItemSpecifier::parse("#5").kind(), SpecifierKind::Invalid);
        assert_eq!(BufferItemSpecifier::parse("#:abc").kind(), SpecifierKind::Invalid);
        assert_eq!(BufferItemSpecifier::parse("T:not-a-time").kind(), SpecifierKind::Invalid);
        assert_eq!(BufferItemSpecifier::parse("").kind(), SpecifierKind::Invalid);
    }
}
