//! Composite address: `"<kind>:<author-pubkey>:<d-tag>"` (spec.md §3).
//!
//! The tail after the second colon may itself contain colons and is taken
//! verbatim, so parsing splits on the first two colons only.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub kind: u64,
    pub pubkey: String,
    pub d_tag: String,
}

impl Address {
    pub fn new(kind: u64, pubkey: impl Into<String>, d_tag: impl Into<String>) -> Self {
        Address {
            kind,
            pubkey: pubkey.into(),
            d_tag: d_tag.into(),
        }
    }

    /// Parse `"<kind>:<pubkey>:<d-tag>"`. The d-tag half is taken verbatim
    /// (it may contain further colons).
    pub fn parse(s: &str) -> Option<Address> {
        let mut parts = s.splitn(3, ':');
        let kind_str = parts.next()?;
        let pubkey = parts.next()?;
        let d_tag = parts.next()?;
        let kind: u64 = kind_str.parse().ok()?;
        if pubkey.is_empty() {
            return None;
        }
        Some(Address {
            kind,
            pubkey: pubkey.to_string(),
            d_tag: d_tag.to_string(),
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey, self.d_tag)
    }
}
