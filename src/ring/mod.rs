//! Ring Module
//!
//! Consistent hashing of keys onto storage nodes.
//!
//! ## Hashing
//! Positions are the MD5 digest of the UTF-8 bytes of a node identity
//! (`host:port`) or key, read as a big-endian `u128`. Every process computes
//! the same ring from the same membership.
//!
//! ## Ownership
//! ```text
//!            prev node            node
//!   ─────────────●──────(range]─────●──────────▶ clockwise
//!                 low (exclusive)    high (inclusive)
//! ```
//! A key belongs to the first node whose position is ≥ hash(key), wrapping
//! to the smallest position.

mod hash_ring;

pub use hash_ring::{HashRing, RingNode};

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A point on the 128-bit ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RingPosition(pub u128);

impl RingPosition {
    /// Parse the 32-digit hex form produced by `Display`
    pub fn from_hex(s: &str) -> Option<Self> {
        u128::from_str_radix(s, 16).ok().map(RingPosition)
    }
}

impl fmt::Display for RingPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

// Positions travel as hex strings so every serializer handles them alike.
impl Serialize for RingPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RingPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RingPosition::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid ring position: {}", s)))
    }
}

/// Hash arbitrary text onto the ring
pub fn ring_hash(text: &str) -> RingPosition {
    let digest = Md5::digest(text.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    RingPosition(u128::from_be_bytes(bytes))
}

/// The interval `(low, high]` owned by one node, wrapping past the top
///
/// `low == high` means the whole ring (single-node membership).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub low_exclusive: RingPosition,
    pub high_inclusive: RingPosition,
}

impl KeyRange {
    pub fn new(low_exclusive: RingPosition, high_inclusive: RingPosition) -> Self {
        Self {
            low_exclusive,
            high_inclusive,
        }
    }

    /// Does this range wrap through the top of the ring?
    pub fn wraps(&self) -> bool {
        self.low_exclusive >= self.high_inclusive
    }

    pub fn contains(&self, position: RingPosition) -> bool {
        if self.wraps() {
            position > self.low_exclusive || position <= self.high_inclusive
        } else {
            position > self.low_exclusive && position <= self.high_inclusive
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.contains(ring_hash(key))
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.low_exclusive, self.high_inclusive)
    }
}
