//! MuHash3072: a multiplicative multiset hash modulo a 3072-bit prime.

use crate::{MultisetHash, keystream, truncated_sha512};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::sync::LazyLock;

/// The MuHash prime, `2^3072 - 1103717`.
static MODULUS: LazyLock<BigUint> =
    LazyLock::new(|| (BigUint::one() << 3072) - BigUint::from(1_103_717u32));

/// Rolling multiset hash over the multiplicative group modulo the MuHash
/// prime.
///
/// The state is a single residue. Insertion multiplies by the element
/// expansion; removal multiplies by its modular inverse, which costs a full
/// modular exponentiation. Batched removals should therefore be accumulated
/// into a scratch set and taken out with one [`MultisetHash::split`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuHash3072 {
    muset: BigUint,
}

/// Expand an element into a residue: 384 keystream bytes keyed by the
/// element digest, read little-endian.
fn expand(element: &[u8]) -> BigUint {
    let key = truncated_sha512(element);
    let mut bytes = [0u8; 384];
    keystream(&key, &mut bytes);
    BigUint::from_bytes_le(&bytes) % &*MODULUS
}

/// Modular inverse via Fermat: `v^(p-2) mod p`.
fn inverse(v: &BigUint) -> BigUint {
    assert!(!v.is_zero(), "zero has no inverse in the muhash group");
    let exponent = &*MODULUS - BigUint::from(2u32);
    v.modpow(&exponent, &MODULUS)
}

impl MuHash3072 {
    /// The empty set.
    pub fn new() -> Self {
        <Self as MultisetHash>::empty()
    }
}

impl Default for MuHash3072 {
    fn default() -> Self {
        Self::new()
    }
}

impl MultisetHash for MuHash3072 {
    const SERIALIZED_SIZE: usize = 384;
    const NAME: &'static str = "muhash3072";

    fn empty() -> Self {
        Self {
            muset: BigUint::one(),
        }
    }

    fn insert(&mut self, element: &[u8]) {
        self.muset = &self.muset * expand(element) % &*MODULUS;
    }

    fn remove(&mut self, element: &[u8]) {
        self.muset = &self.muset * inverse(&expand(element)) % &*MODULUS;
    }

    fn combine(&mut self, other: &Self) {
        self.muset = &self.muset * &other.muset % &*MODULUS;
    }

    fn split(&mut self, other: &Self) {
        self.muset = &self.muset * inverse(&other.muset) % &*MODULUS;
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = self.muset.to_bytes_le();
        bytes.resize(Self::SERIALIZED_SIZE, 0);
        bytes
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        (bytes.len() == Self::SERIALIZED_SIZE).then(|| Self {
            muset: BigUint::from_bytes_le(bytes) % &*MODULUS,
        })
    }
}
