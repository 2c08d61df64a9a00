//! Canonical serialization, event identifiers, and Schnorr signature
//! verification (spec.md §4.1).
//!
//! Canonicalization here is intentionally simpler than the teacher's JCS
//! object canonicalizer: the signed form is a JSON *array*, not an object,
//! so there is no key-sorting step — just minimal-whitespace `serde_json`
//! serialization with tag order preserved as given.

use secp256k1::schnorr::Signature as SchnorrSignature;
use secp256k1::{Message, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::event::Tags;

/// Build the canonical `[0, pubkey, created_at, kind, tags, content]` form
/// and return its UTF-8 bytes.
pub fn canonical_bytes(pubkey: &str, created_at: i64, kind: u64, tags: &Tags, content: &str) -> Vec<u8> {
    let arr = serde_json::json!([0, pubkey, created_at, kind, tags.as_raw(), content]);
    // serde_json's default Value serialization is already minimal-whitespace
    // and preserves array/object insertion order.
    serde_json::to_vec(&arr).expect("canonical array is always serializable")
}

/// SHA-256 of the canonical serialization, hex-encoded lowercase.
pub fn compute_id(pubkey: &str, created_at: i64, kind: u64, tags: &Tags, content: &str) -> String {
    let bytes = canonical_bytes(pubkey, created_at, kind, tags, content);
    sha256_hex(&bytes)
}

/// Raw SHA-256 hash (hex-encoded).
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify a BIP-340 Schnorr signature over secp256k1.
///
/// `id_hex` is the 32-byte event identifier (hex); `sig_hex` the 64-byte
/// signature (hex); `pubkey_hex` the 32-byte x-only public key (hex). Any
/// decoding error returns `false` rather than propagating — per spec.md
/// §4.1, malformed inputs are simply not valid signatures.
pub fn verify_schnorr(id_hex: &str, sig_hex: &str, pubkey_hex: &str) -> bool {
    let Ok(id_bytes) = hex::decode(id_hex) else { return false };
    let Ok(sig_bytes) = hex::decode(sig_hex) else { return false };
    let Ok(pk_bytes) = hex::decode(pubkey_hex) else { return false };

    let Ok(msg) = Message::from_digest_slice(&id_bytes) else { return false };
    let Ok(sig) = SchnorrSignature::from_slice(&sig_bytes) else { return false };
    let Ok(xonly) = XOnlyPublicKey::from_slice(&pk_bytes) else { return false };

    sig.verify(&msg, &xonly).is_ok()
}
