//! The generic event model (spec.md §3) and its structural/cryptographic
//! admission check (spec.md §4.2).

use serde::{Deserialize, Serialize};

use crate::crypto;

/// Tag list: an ordered sequence of ordered sequences of strings. The tag
/// name is the first element of each inner sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<Vec<String>>);

impl Tags {
    pub fn from_raw(raw: Vec<Vec<String>>) -> Self {
        Tags(raw)
    }

    pub fn as_raw(&self) -> &Vec<Vec<String>> {
        &self.0
    }

    /// The value (second element) of the first tag named `name`, if any.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// All tags named `name`, in order.
    pub fn all(&self, name: &str) -> impl Iterator<Item = &Vec<String>> {
        self.0
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.all(name).next().is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An immutable, signed event (spec.md §3 "Event (generic)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u64,
    pub tags: Tags,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Recompute the canonical identifier for this event's fields.
    pub fn computed_id(&self) -> String {
        crypto::compute_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }
}

/// Reason an event failed admission at the structural/cryptographic layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structural and cryptographic admission check (spec.md §4.2).
///
/// Checks run in the order listed in the spec so the first violated
/// invariant determines the rejection reason.
pub fn validate(event: &Event) -> Result<(), ValidationError> {
    if !is_hex_of_len(&event.id, 64) {
        return Err(ValidationError("id not a 64-character hex string".into()));
    }
    if !is_hex_of_len(&event.pubkey, 64) {
        return Err(ValidationError("pubkey not a 64-character hex string".into()));
    }
    if !is_hex_of_len(&event.sig, 128) {
        return Err(ValidationError("signature not a 128-character hex string".into()));
    }
    if event.created_at < 0 {
        return Err(ValidationError("created_at not a non-negative integer".into()));
    }
    // kind is u64 at the type level, so "not a non-negative integer" can only
    // arise during JSON deserialization, which rejects it before this point.

    let computed = event.computed_id();
    if computed != event.id {
        return Err(ValidationError("computed identifier differs from id".into()));
    }

    if !crypto::verify_schnorr(&event.id, &event.sig, &event.pubkey) {
        return Err(ValidationError("signature does not verify".into()));
    }

    Ok(())
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}
