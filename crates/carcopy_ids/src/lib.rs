//! Content identifiers for CAR archives.
//!
//! A CAR file is named after the CID of the piece it carries. Two files with
//! the same [`ContentId`] describe the same logical copy job, whatever path
//! they currently live at.

use cid::multihash::Multihash;
use cid::Cid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Multicodec for raw binary content.
const RAW_CODEC: u64 = 0x55;

/// Multihash code for BLAKE3-256.
const BLAKE3_CODE: u64 = 0x1e;

/// Error returned when a string is not a valid content identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

/// Parsed content identifier (CIDv0 or CIDv1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(Cid);

impl ContentId {
    pub fn parse(value: &str) -> Result<Self, IdParseError> {
        Cid::try_from(value)
            .map(Self)
            .map_err(|e| IdParseError::new(format!("Invalid content ID '{}': {}", value, e)))
    }

    /// CIDv1 (raw codec, BLAKE3 multihash) of the given bytes.
    pub fn for_bytes(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        let mh = Multihash::<64>::wrap(BLAKE3_CODE, digest.as_bytes())
            .expect("32-byte digest fits a 64-byte multihash");
        Self(Cid::new_v1(RAW_CODEC, mh))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
