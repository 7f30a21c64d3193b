//! Multiset hash primitives for the coinstats index.
//!
//! Two homomorphic constructions over multisets of byte-strings are
//! provided: [`MuHash3072`] (multiplicative, modulo a 3072-bit prime) and
//! [`LtHash`] (additive, 256 gap-packed 64-bit lanes). Both absorb an
//! element by hashing it to a 32-byte key with truncated SHA-512 and
//! expanding that key through a ChaCha20 keystream.

pub mod lthash;
pub mod muhash;

pub use lthash::LtHash;
pub use muhash::MuHash3072;

use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use sha2::{Digest, Sha512};
use std::fmt::Write;

/// An associative, commutative, invertible digest over a multiset of
/// byte-strings.
///
/// The contract: folding any permutation of the same multiset yields the
/// same state, and `insert` followed by `remove` of the same element
/// restores the prior state bit-exactly. [`combine`](Self::combine) and
/// [`split`](Self::split) are the set-level counterparts.
pub trait MultisetHash: Clone + PartialEq + Sized {
    /// Width of the serialized group element in bytes.
    const SERIALIZED_SIZE: usize;

    /// Short name used in logs and error messages.
    const NAME: &'static str;

    /// The group identity (the empty multiset).
    fn empty() -> Self;

    /// Absorb one element.
    fn insert(&mut self, element: &[u8]);

    /// Remove one element.
    fn remove(&mut self, element: &[u8]);

    /// Fold another set into this one (multiset union).
    fn combine(&mut self, other: &Self);

    /// Take another set out of this one (multiset difference).
    ///
    /// One group operation regardless of how many elements `other` holds,
    /// which is what makes batched removal cheap for MuHash.
    fn split(&mut self, other: &Self);

    /// Serialize the group element as `SERIALIZED_SIZE` little-endian bytes.
    fn serialize(&self) -> Vec<u8>;

    /// Deserialize a group element. Returns `None` on a length mismatch.
    fn deserialize(bytes: &[u8]) -> Option<Self>;

    /// 32-byte digest tag: truncated SHA-512 of the serialized element.
    fn digest(&self) -> [u8; 32] {
        truncated_sha512(&self.serialize())
    }

    /// Digest in display form: reversed byte order, hex encoded.
    fn digest_hex(&self) -> String {
        self.digest().iter().rev().fold(String::new(), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }
}

/// SHA-512 truncated to its first 32 bytes.
pub fn truncated_sha512(data: &[u8]) -> [u8; 32] {
    let hash = Sha512::digest(data);
    hash[..32]
        .try_into()
        .expect("SHA-512 output is 64 bytes; qed")
}

/// Fill `out` with the ChaCha20 keystream for `key`: zero nonce, counter
/// starting at 0.
pub fn keystream(key: &[u8; 32], out: &mut [u8]) {
    let nonce = [0u8; 12];
    let mut cipher = ChaCha20::new(key.into(), (&nonce).into());
    out.fill(0);
    cipher.apply_keystream(out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // RFC 7539/8439 keystream blocks for the all-zero key and nonce,
    // counters 0 and 1.
    #[test]
    fn keystream_matches_rfc_vectors_zero_key() {
        let key = [0u8; 32];
        let mut out = [0u8; 128];
        keystream(&key, &mut out);

        let expected = hex!(
            "76b8e0ada0f13d90405d6ae55386bd28bdd219b8a08ded1aa836efcc8b770dc7\
             da41597c5157488d7724e03fb8d84a376a43b8f41518a11cc387b669b2ee6586\
             9f07e7be5551387a98ba977c732d080dcb0f29a048e3656912c6533e32ee7aed\
             29b721769ce64e43d57133b074d839d531ed1f28510afb45ace10a1f4b794d6f"
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn keystream_matches_rfc_vectors_one_key() {
        let mut key = [0u8; 32];
        key[31] = 0x01;
        let mut out = [0u8; 128];
        keystream(&key, &mut out);

        let expected = hex!(
            "4540f05a9f1fb296d7736e7b208e3c96eb4fe1834688d2604f450952ed432d41\
             bbe2a0b6ea7566d2a5d1e7e20d42af2c53d792b1c43fea817e9ad275ae546963\
             3aeb5224ecf849929b9d828db1ced4dd832025e8018b8160b82284f3c949aa5a\
             8eca00bbb4a73bdad192b5c42f73f2fd4e273644c8b36125a64addeb006c13a0"
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn truncated_sha512_is_32_bytes_and_stable() {
        let a = truncated_sha512(b"coinstats");
        let b = truncated_sha512(b"coinstats");
        assert_eq!(a, b);
        assert_ne!(a, truncated_sha512(b"coinstat"));
    }
}
