//! Wire-level scalar encodings shared by every typed method: ids as
//! canonical lowercase hex-with-dashes UUID strings, byte arrays as
//! base64, and deadlines as RFC 3339 timestamps with nanosecond precision.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::Error;

/// Parse a wire id string. Ids are always the framing layer's native
/// string representation of a UUID; this is the one place that knows the
/// exact format.
///
/// # Test
///
/// ```
/// use arpc_codec::wire::parse_id;
///
/// assert!(parse_id("not-a-uuid").is_err());
/// ```
pub fn parse_id(value: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(value).map_err(|_| Error::InvalidId(value.to_string()))
}

/// Format an id the way the wire expects it: lowercase, hyphenated.
pub fn format_id(id: Uuid) -> String {
    id.hyphenated().to_string()
}

/// Encode a byte array the way the framing layer's native byte-array
/// representation does it for this implementation: base64, standard
/// alphabet, padded.
pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_bytes(value: &str) -> Result<Vec<u8>, Error> {
    STANDARD
        .decode(value)
        .map_err(|_| Error::InvalidBytes(value.to_string()))
}

/// Parse an RFC 3339 nanosecond-precision timestamp, as used by deadline
/// parameters and `T:` buffer item specifiers.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::InvalidTimestamp(value.to_string()))
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
