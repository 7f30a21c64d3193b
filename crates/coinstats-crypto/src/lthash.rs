//! LtHash: an additive multiset hash over 256 gap-packed 64-bit lanes.

use crate::{MultisetHash, keystream, truncated_sha512};

const LANES: usize = 256;

/// Sublane selectors. Each 64-bit carrier packs two independent 32-bit
/// halves with gaps; carries crossing a mask boundary are discarded, which
/// is what keeps the halves independent.
const MASK_HI: u64 = 0xFFFF0000_FFFF0000;
const MASK_LO: u64 = !MASK_HI;

/// Rolling multiset hash formed from 256 lanes of pairwise-independent
/// 32-bit additions carried inside 64-bit words.
///
/// Every group operation is lane-wise wrapping arithmetic, so both
/// insertion and removal are cheap; there is no expensive inverse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LtHash {
    lanes: [u64; LANES],
}

/// Expand an element into lane values: 2048 keystream bytes keyed by the
/// element digest, read as little-endian `u64`s.
fn expand(element: &[u8]) -> LtHash {
    let key = truncated_sha512(element);
    let mut bytes = [0u8; LANES * 8];
    keystream(&key, &mut bytes);

    let mut lanes = [0u64; LANES];
    for (i, lane) in lanes.iter_mut().enumerate() {
        *lane = u64::from_le_bytes(
            bytes[i * 8..(i + 1) * 8]
                .try_into()
                .expect("8-byte chunk; qed"),
        );
    }
    LtHash { lanes }
}

fn add_lane(a: u64, b: u64) -> u64 {
    ((a & MASK_HI).wrapping_add(b & MASK_HI) & MASK_HI)
        | ((a & MASK_LO).wrapping_add(b & MASK_LO) & MASK_LO)
}

fn sub_lane(a: u64, b: u64) -> u64 {
    // Two's complement within each sublane: the masks are each other's
    // complement, so `MASK_LO - hi(b)` negates the high half and vice versa.
    ((a & MASK_HI).wrapping_add(MASK_LO.wrapping_sub(b & MASK_HI)) & MASK_HI)
        | ((a & MASK_LO).wrapping_add(MASK_HI.wrapping_sub(b & MASK_LO)) & MASK_LO)
}

impl LtHash {
    /// The empty set: all lanes zero.
    pub fn new() -> Self {
        <Self as MultisetHash>::empty()
    }
}

impl Default for LtHash {
    fn default() -> Self {
        Self::new()
    }
}

impl MultisetHash for LtHash {
    const SERIALIZED_SIZE: usize = LANES * 8;
    const NAME: &'static str = "lthash2048";

    fn empty() -> Self {
        Self {
            lanes: [0u64; LANES],
        }
    }

    fn insert(&mut self, element: &[u8]) {
        self.combine(&expand(element));
    }

    fn remove(&mut self, element: &[u8]) {
        self.split(&expand(element));
    }

    fn combine(&mut self, other: &Self) {
        for (lane, add) in self.lanes.iter_mut().zip(other.lanes.iter()) {
            *lane = add_lane(*lane, *add);
        }
    }

    fn split(&mut self, other: &Self) {
        for (lane, sub) in self.lanes.iter_mut().zip(other.lanes.iter()) {
            *lane = sub_lane(*lane, *sub);
        }
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SERIALIZED_SIZE);
        for lane in &self.lanes {
            bytes.extend_from_slice(&lane.to_le_bytes());
        }
        bytes
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SERIALIZED_SIZE {
            return None;
        }
        let mut lanes = [0u64; LANES];
        for (i, lane) in lanes.iter_mut().enumerate() {
            *lane = u64::from_le_bytes(bytes[i * 8..(i + 1) * 8].try_into().ok()?);
        }
        Some(Self { lanes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_serializes_to_zero_bytes() {
        let bytes = LtHash::new().serialize();
        assert_eq!(bytes.len(), LtHash::SERIALIZED_SIZE);
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn insert_then_remove_yields_all_zero_finalization() {
        let mut lthash = LtHash::new();
        lthash.insert(b"hello");
        lthash.remove(b"hello");

        assert_eq!(lthash, LtHash::new());
        assert!(lthash.serialize().iter().all(|b| *b == 0));
    }

    #[test]
    fn insert_then_remove_restores_nonempty_state() {
        let mut lthash = LtHash::new();
        lthash.insert(&[0x07; 40]);
        lthash.insert(&[0x09; 40]);
        let before = lthash.clone();

        lthash.insert(b"transient");
        lthash.remove(b"transient");

        assert_eq!(lthash, before);
    }

    #[test]
    fn remove_then_insert_restores_state() {
        let mut lthash = LtHash::new();
        lthash.remove(b"phantom");
        lthash.insert(b"phantom");

        assert_eq!(lthash, LtHash::new());
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let elems: Vec<Vec<u8>> = (0u8..8).map(|i| vec![i; 17]).collect();

        let mut forward = LtHash::new();
        for e in &elems {
            forward.insert(e);
        }

        let mut backward = LtHash::new();
        for e in elems.iter().rev() {
            backward.insert(e);
        }

        assert_eq!(forward, backward);
    }

    #[test]
    fn duplicate_elements_accumulate() {
        let mut once = LtHash::new();
        once.insert(b"coin");

        let mut twice = LtHash::new();
        twice.insert(b"coin");
        twice.insert(b"coin");

        assert_ne!(once, twice);

        twice.remove(b"coin");
        assert_eq!(once, twice);
    }

    #[test]
    fn split_inverts_combine() {
        let mut a = LtHash::new();
        a.insert(&[1; 32]);
        a.insert(&[2; 32]);

        let mut b = LtHash::new();
        b.insert(&[3; 32]);

        let mut merged = a.clone();
        merged.combine(&b);
        merged.split(&b);

        assert_eq!(merged, a);
    }

    #[test]
    fn serialize_roundtrip() {
        let mut lthash = LtHash::new();
        lthash.insert(&[0xab; 64]);
        lthash.remove(&[0xcd; 64]);

        let bytes = lthash.serialize();
        let restored = LtHash::deserialize(&bytes).unwrap();
        assert_eq!(restored, lthash);
    }

    #[test]
    fn deserialize_rejects_wrong_length() {
        assert!(LtHash::deserialize(&[0u8; 2047]).is_none());
        assert!(LtHash::deserialize(&[0u8; 384]).is_none());
    }

    #[test]
    fn sublane_carries_do_not_leak() {
        // Saturate the low sublanes so that one more addition would carry
        // into the high mask region if carries were propagated.
        let mut lanes = [0u64; LANES];
        lanes[0] = MASK_LO;
        let full = LtHash { lanes };

        let mut one = [0u64; LANES];
        one[0] = 1;
        let unit = LtHash { lanes: one };

        let mut sum = full.clone();
        sum.combine(&unit);

        // The lowest 16-bit field wrapped to zero without carrying into
        // the masked-out gap or the high sublanes.
        assert_eq!(sum.lanes[0], 0x0000_FFFF_0000_0000);

        sum.split(&unit);
        assert_eq!(sum, full);
    }
}
