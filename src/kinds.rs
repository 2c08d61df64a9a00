//! Numeric kind configuration (spec.md §6).
//!
//! The four credential-subsystem kinds are configuration, not protocol: an
//! implementation must fix one consistent mapping. [`KindConfig::default`]
//! picks the first representative mapping spec.md §6 lists (`30100..30103`);
//! `KindConfig::from_env` / the CLI can override it.

use serde::{Deserialize, Serialize};

pub const PARAMETERIZED_REPLACEABLE_RANGE: std::ops::Range<u64> = 30_000..40_000;

/// Kinds `0`, `3`, and `10000..=19999` replace on `(kind, author)` alone.
pub fn is_replaceable(kind: u64) -> bool {
    kind == 0 || kind == 3 || (10_000..20_000).contains(&kind)
}

/// Kinds `30000..=39999` replace on `(kind, author, d)`.
pub fn is_parameterized_replaceable(kind: u64) -> bool {
    PARAMETERIZED_REPLACEABLE_RANGE.contains(&kind)
}

/// The numeric kinds this relay instance uses for the four credential event
/// roles (spec.md §6's table). Must all lie in `30000..=39999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindConfig {
    pub schema_definition: u64,
    pub credential_grant: u64,
    pub revocation: u64,
    pub renewal: u64,
}

impl Default for KindConfig {
    fn default() -> Self {
        KindConfig {
            schema_definition: 30_100,
            credential_grant: 30_101,
            revocation: 30_102,
            renewal: 30_103,
        }
    }
}

impl KindConfig {
    pub fn role_of(&self, kind: u64) -> Option<EventRole> {
        if kind == self.schema_definition {
            Some(EventRole::SchemaDefinition)
        } else if kind == self.credential_grant {
            Some(EventRole::CredentialGrant)
        } else if kind == self.revocation {
            Some(EventRole::Revocation)
        } else if kind == self.renewal {
            Some(EventRole::Renewal)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRole {
    SchemaDefinition,
    CredentialGrant,
    Revocation,
    Renewal,
}
