//! Node/key identifiers and the XOR distance metric.
//!
//! Feynman: every participant in the network gets a 160-bit "address".
//! Distance between two addresses is their bitwise XOR, read as an
//! unsigned integer. Nobody's distance to themselves is ever anything
//! but zero, and the metric is symmetric, so it naturally organizes the
//! whole network into nested neighborhoods without any central map.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

pub const ID_BYTES: usize = 20;
pub const ID_BITS: usize = ID_BYTES * 8;

/// Opaque 160-bit identifier shared by nodes and keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; ID_BYTES]);

impl NodeId {
    pub const ZERO: NodeId = NodeId([0u8; ID_BYTES]);

    pub fn from_bytes(bytes: [u8; ID_BYTES]) -> Self {
        NodeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    /// Derive a NodeId from an arbitrary byte key via SHA-1.
    pub fn digest(key: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(key);
        let out = hasher.finalize();
        let mut bytes = [0u8; ID_BYTES];
        bytes.copy_from_slice(&out);
        NodeId(bytes)
    }

    /// A uniformly random id, used for message ids and test fixtures.
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        NodeId(bytes)
    }

    /// A random id that falls within bucket `index`'s distance range from
    /// `self` - i.e. it shares the top `index` bits with `self` and
    /// differs at bit `index`. Used to derive routing-table refresh targets.
    pub fn random_in_bucket(&self, index: usize) -> Self {
        let mut bytes = self.0;
        // Bucket index counts from the LSB side (floor(log2(distance)));
        // translate to the bit position counting from the MSB, which is
        // what the byte/shift arithmetic below operates on.
        let msb_pos = ID_BITS - 1 - index;
        let byte_i = msb_pos / 8;
        let bit_i = 7 - (msb_pos % 8);

        // Flip the bit that defines this bucket's boundary.
        bytes[byte_i] ^= 1 << bit_i;

        // Randomize every bit below the boundary; bits above stay equal
        // to `self` so the result still lands in the same bucket.
        let mut rng_tail = [0u8; ID_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut rng_tail);
        for b in (byte_i + 1)..ID_BYTES {
            bytes[b] = rng_tail[b];
        }
        if bit_i > 0 {
            let mask = (1u8 << bit_i) - 1;
            bytes[byte_i] = (bytes[byte_i] & !mask) | (rng_tail[byte_i] & mask);
        }

        NodeId(bytes)
    }

    /// XOR distance to another id.
    pub fn distance(&self, other: &NodeId) -> Distance {
        let mut out = [0u8; ID_BYTES];
        for i in 0..ID_BYTES {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    /// Bucket index of `self` relative to `other`: `floor(log2(distance))`,
    /// or 0 when the distance is zero (same id).
    pub fn bucket_index(&self, other: &NodeId) -> usize {
        self.distance(other).bucket_index()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Unsigned 160-bit XOR distance, ordered big-endian byte by byte.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance([u8; ID_BYTES]);

impl Distance {
    pub const ZERO: Distance = Distance([0u8; ID_BYTES]);

    /// `floor(log2(d))`, or 0 when `d == 0` (the "lowest bucket" case -
    /// there is no node more distant than itself to index by).
    pub fn bucket_index(&self) -> usize {
        for (byte_pos, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                let leading = byte.leading_zeros() as usize;
                let bit_pos_from_msb = byte_pos * 8 + leading;
                return ID_BITS - 1 - bit_pos_from_msb;
            }
        }
        0
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let id = NodeId::random();
        assert_eq!(id.distance(&id), Distance::ZERO);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn bucket_index_of_zero_distance_is_zero() {
        assert_eq!(Distance::ZERO.bucket_index(), 0);
    }

    #[test]
    fn bucket_index_of_max_distance_is_highest() {
        let d = Distance([0xffu8; ID_BYTES]);
        assert_eq!(d.bucket_index(), ID_BITS - 1);
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(NodeId::digest(b"hello"), NodeId::digest(b"hello"));
        assert_ne!(NodeId::digest(b"hello"), NodeId::digest(b"world"));
    }

    #[test]
    fn random_in_bucket_lands_in_requested_bucket() {
        let base = NodeId::random();
        for index in [0usize, 1, 63, 159] {
            let sample = base.random_in_bucket(index);
            assert_eq!(base.bucket_index(&sample), index, "index={}", index);
        }
    }

    proptest::proptest! {
        #[test]
        fn distance_is_symmetric_for_any_ids(a: [u8; ID_BYTES], b: [u8; ID_BYTES]) {
            let a = NodeId::from_bytes(a);
            let b = NodeId::from_bytes(b);
            proptest::prop_assert_eq!(a.distance(&b), b.distance(&a));
        }

        #[test]
        fn bucket_index_never_exceeds_the_id_width(a: [u8; ID_BYTES], b: [u8; ID_BYTES]) {
            let a = NodeId::from_bytes(a);
            let b = NodeId::from_bytes(b);
            proptest::prop_assert!(a.bucket_index(&b) < ID_BITS);
        }
    }
}
