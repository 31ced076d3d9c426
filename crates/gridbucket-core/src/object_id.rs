//! File identifiers
//!
//! `ObjectId` is the native 12-byte identifier every engine keys files by:
//! a 4-byte big-endian seconds timestamp, a 5-byte per-process random value and a
//! 3-byte big-endian counter. Callers may also hand in strings or numbers through
//! [`FileId`]; [`conv_to_object_id`] normalizes them.

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

const COUNTER_MASK: u32 = 0x00ff_ffff;

static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(|| rand::random());
static COUNTER: LazyLock<AtomicU32> =
    LazyLock::new(|| AtomicU32::new(rand::random::<u32>() & COUNTER_MASK));

/// Identifier parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectIdError {
    #[error("Invalid object id string {0:?}: expected 24 hex characters or 12 bytes")]
    InvalidString(String),

    #[error("Invalid object id timestamp {0}: must fit in 32 unsigned bits")]
    InvalidTimestamp(i64),
}

/// Native file identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

/// The id timestamp field holds unsigned 32-bit seconds; times outside it saturate.
fn clamp_timestamp(secs: i64) -> u32 {
    u32::try_from(secs.max(0)).unwrap_or(u32::MAX)
}

impl ObjectId {
    /// Generate a fresh identifier stamped with the current time.
    pub fn new() -> Self {
        Self::from_timestamp(clamp_timestamp(Utc::now().timestamp()))
    }

    /// Generate a fresh identifier whose leading 4 bytes encode `secs`.
    pub fn from_timestamp(secs: u32) -> Self {
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        ObjectId(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId(bytes)
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Parse a 24-character hex string, or take a 12-byte string verbatim.
    pub fn parse_str(s: &str) -> Result<Self, ObjectIdError> {
        let mut bytes = [0u8; 12];
        if s.len() == 24 {
            hex::decode_to_slice(s, &mut bytes)
                .map_err(|_| ObjectIdError::InvalidString(s.to_string()))?;
            return Ok(ObjectId(bytes));
        }
        if s.len() == 12 {
            bytes.copy_from_slice(s.as_bytes());
            return Ok(ObjectId(bytes));
        }
        Err(ObjectIdError::InvalidString(s.to_string()))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Creation time encoded in the identifier (second precision).
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(i64::from(secs), 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ObjectId::parse_str(&s).map_err(de::Error::custom)
    }
}

/// An identifier as supplied by a caller: already native, a string, or a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileId {
    ObjectId(ObjectId),
    String(String),
    Number(i64),
}

impl From<ObjectId> for FileId {
    fn from(id: ObjectId) -> Self {
        FileId::ObjectId(id)
    }
}

impl From<&ObjectId> for FileId {
    fn from(id: &ObjectId) -> Self {
        FileId::ObjectId(*id)
    }
}

impl From<String> for FileId {
    fn from(s: String) -> Self {
        FileId::String(s)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        FileId::String(s.to_string())
    }
}

impl From<i64> for FileId {
    fn from(n: i64) -> Self {
        FileId::Number(n)
    }
}

impl From<u32> for FileId {
    fn from(n: u32) -> Self {
        FileId::Number(i64::from(n))
    }
}

/// Normalize a caller-supplied identifier to the native `ObjectId`.
///
/// Native identifiers pass through unchanged. Strings are parsed as hex (or taken as
/// 12 raw bytes); numbers are treated as a seconds timestamp for a fresh identifier.
pub fn conv_to_object_id(id: impl Into<FileId>) -> Result<ObjectId, ObjectIdError> {
    match id.into() {
        FileId::ObjectId(id) => Ok(id),
        FileId::String(s) => ObjectId::parse_str(&s),
        FileId::Number(n) => u32::try_from(n)
            .map(ObjectId::from_timestamp)
            .map_err(|_| ObjectIdError::InvalidTimestamp(n)),
    }
}
