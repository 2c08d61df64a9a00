//! The recursive chain verifier, implemented iteratively (spec.md §4.6,
//! §9 "prefer iteration in an implementation").

use std::collections::HashSet;

use crate::address::Address;
use crate::error::StoreError;
use crate::schema::{SchemaDocument, ROOT};

/// Bound on chain traversal depth (spec.md §4.6 rule (a), the DoS bound).
pub const MAX_CHAIN_DEPTH: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct VerifyConfig {
    pub max_depth: u32,
    pub credential_grant_kind: u64,
}

impl VerifyConfig {
    pub fn new(credential_grant_kind: u64) -> Self {
        VerifyConfig {
            max_depth: MAX_CHAIN_DEPTH,
            credential_grant_kind,
        }
    }
}

/// A Credential Grant as projected into the credential index (spec.md §4.3
/// item 4): the fields the verifier needs, with revocation/renewal already
/// folded in so the verifier never re-parses raw event JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedGrant {
    pub pubkey: String,
    pub d: String,
    pub recipient: String,
    pub schema_address: Address,
    pub class: String,
    pub issued: i64,
    /// The indexed expiry, already reflecting any renewal (spec.md §4.6
    /// step 4: "the indexed value already reflects renewals"). `None`
    /// means perpetual.
    pub effective_expires: Option<i64>,
    pub revoked: bool,
    pub revoked_at: Option<i64>,
    pub revoked_reason: Option<String>,
    pub chain: Option<Address>,
}

/// Storage lookups the verifier needs. Implemented by the event store;
/// mocked with an in-memory map in tests.
pub trait ChainIndex {
    fn lookup_grant(&self, pubkey: &str, d: &str) -> Result<Option<IndexedGrant>, StoreError>;
    fn resolve_schema(&self, address: &Address) -> Result<Option<SchemaDocument>, StoreError>;
}

/// Outcome of chain verification (spec.md §4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Valid { chain_depth: u32 },
    Invalid { reason: String },
    Expired { expired_at: i64 },
    Revoked { revoked_at: i64, reason: String },
}

/// Verify a Credential Grant's chain back to root (spec.md §4.6).
///
/// `grant` must already be admitted into the credential index (its tags
/// extracted and typed). `now` is the wall-clock time to evaluate expiry
/// against. Storage failures propagate as `Err`; every adversarial or
/// malformed-chain condition is represented as `Ok(Outcome::Invalid { .. })`
/// rather than an error.
pub fn verify(
    grant: &IndexedGrant,
    index: &dyn ChainIndex,
    config: &VerifyConfig,
    now: i64,
) -> Result<Outcome, StoreError> {
    // Step 3: revocation (checked first, per spec.md §4.6 rule ordering).
    if grant.revoked {
        return Ok(Outcome::Revoked {
            revoked_at: grant.revoked_at.unwrap_or(0),
            reason: grant.revoked_reason.clone().unwrap_or_default(),
        });
    }

    // Step 4: expiry.
    if let Some(expires) = grant.effective_expires {
        if expires < now {
            return Ok(Outcome::Expired { expired_at: expires });
        }
    }

    // Step 5: resolve schema and class.
    let schema = match index.resolve_schema(&grant.schema_address)? {
        Some(s) => s,
        None => return Ok(Outcome::Invalid { reason: "schema not found".into() }),
    };
    let class_def = match schema.class(&grant.class) {
        Some(c) => c.clone(),
        None => {
            return Ok(Outcome::Invalid {
                reason: format!("class {} not found in schema", grant.class),
            })
        }
    };
    let root_pubkey = grant.schema_address.pubkey.clone();

    // Step 6: root-issued terminal case.
    if class_def.issued_by.contains(ROOT) && grant.pubkey == root_pubkey {
        return Ok(Outcome::Valid { chain_depth: 0 });
    }

    // Step 7: non-root issuer must carry a chain reference.
    let Some(first_chain_ref) = grant.chain.clone() else {
        return Ok(Outcome::Invalid {
            reason: "non-root issuer without chain reference".into(),
        });
    };

    // Step 8 onward: iterative walk up the chain.
    let mut depth: u32 = 1;
    let mut chain_ref = first_chain_ref;
    let mut current_issuer = grant.pubkey.clone();
    let mut child_issued = grant.issued;
    let mut child_class = grant.class.clone();
    let mut child_schema_addr = grant.schema_address.clone();
    let mut allowed_issuers = class_def.issued_by.clone();

    let mut visited: HashSet<(String, String)> = HashSet::new();
    visited.insert((grant.pubkey.clone(), grant.d.clone()));

    loop {
        // (a) depth bound.
        if depth > config.max_depth {
            return Ok(Outcome::Invalid { reason: "chain too deep".into() });
        }

        // (b) chain_ref must reference a credential-grant-kind address.
        if chain_ref.kind != config.credential_grant_kind {
            return Ok(Outcome::Invalid { reason: "invalid chain reference".into() });
        }

        // Cycle guard (SPEC_FULL.md ambient addition): a repeated
        // (issuer, d) pair within the walk is a cycle.
        let visit_key = (chain_ref.pubkey.clone(), chain_ref.d_tag.clone());
        if !visited.insert(visit_key) {
            return Ok(Outcome::Invalid { reason: "chain cycle detected".into() });
        }

        // (c) look up the upstream grant.
        let upstream = match index.lookup_grant(&chain_ref.pubkey, &chain_ref.d_tag)? {
            Some(u) => u,
            None => return Ok(Outcome::Invalid { reason: "issuer credential not found".into() }),
        };

        // (d) upstream recipient must be the issuer of the child.
        if upstream.recipient != current_issuer {
            return Ok(Outcome::Invalid { reason: "chain pubkey mismatch".into() });
        }

        // Cross-schema forgery guard (Open Question, decided: enforce).
        if upstream.schema_address != child_schema_addr {
            return Ok(Outcome::Invalid {
                reason: "chain references a grant under a different schema".into(),
            });
        }

        // (e)/(f) upstream's class must be authorized to issue the child's class.
        let upstream_class_def = match schema.class(&upstream.class) {
            Some(c) => c.clone(),
            None => {
                return Ok(Outcome::Invalid {
                    reason: format!("class {} not found in schema", upstream.class),
                })
            }
        };
        if !allowed_issuers.contains(&upstream.class) {
            return Ok(Outcome::Invalid {
                reason: format!(
                    "class {} not authorized to issue {}",
                    upstream.class, child_class
                ),
            });
        }

        // (g) scope cross-check on the schema.
        if !upstream_class_def.scope.contains(&child_class) {
            return Ok(Outcome::Invalid {
                reason: format!("class {} lacks scope to issue {}", upstream.class, child_class),
            });
        }

        // (h) issuance-time authority.
        if upstream.issued > child_issued {
            return Ok(Outcome::Invalid {
                reason: "issuer credential issued after downstream".into(),
            });
        }
        if let Some(upstream_expires) = upstream.effective_expires {
            if upstream_expires < child_issued {
                return Ok(Outcome::Invalid {
                    reason: "issuer credential expired at issuance".into(),
                });
            }
        }

        // (i) cascade revocation, only if it predates the downstream issuance.
        if upstream.revoked && upstream_class_def.cascade_revoke {
            if let Some(revoked_at) = upstream.revoked_at {
                if revoked_at <= child_issued {
                    return Ok(Outcome::Invalid {
                        reason: "issuer credential revoked (cascade)".into(),
                    });
                }
            }
        }

        // (j) terminal: upstream itself is root-issued.
        if upstream_class_def.issued_by.contains(ROOT) && upstream.pubkey == root_pubkey {
            return Ok(Outcome::Valid { chain_depth: depth });
        }

        // (k) otherwise recurse one level further up.
        match upstream.chain.clone() {
            Some(next_chain) => {
                current_issuer = upstream.pubkey.clone();
                child_issued = upstream.issued;
                child_class = upstream.class.clone();
                child_schema_addr = upstream.schema_address.clone();
                allowed_issuers = upstream_class_def.issued_by.clone();
                chain_ref = next_chain;
                depth += 1;
            }
            None => {
                return Ok(Outcome::Invalid {
                    reason: "non-root issuer without chain reference".into(),
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory `ChainIndex` for unit tests, keyed by `(pubkey, d)`.
    #[derive(Default)]
    pub struct MemIndex {
        grants: Mutex<HashMap<(String, String), IndexedGrant>>,
        schemas: Mutex<HashMap<Address, SchemaDocument>>,
    }

    impl MemIndex {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_grant(&self, grant: IndexedGrant) {
            self.grants
                .lock()
                .unwrap()
                .insert((grant.pubkey.clone(), grant.d.clone()), grant);
        }

        pub fn revoke(&self, pubkey: &str, d: &str, revoked_at: i64, reason: &str) {
            let mut map = self.grants.lock().unwrap();
            if let Some(g) = map.get_mut(&(pubkey.to_string(), d.to_string())) {
                g.revoked = true;
                g.revoked_at = Some(revoked_at);
                g.revoked_reason = Some(reason.to_string());
            }
        }

        pub fn renew(&self, pubkey: &str, d: &str, new_expires: i64) {
            let mut map = self.grants.lock().unwrap();
            if let Some(g) = map.get_mut(&(pubkey.to_string(), d.to_string())) {
                if !g.revoked {
                    g.effective_expires = Some(new_expires);
                }
            }
        }

        pub fn put_schema(&self, address: Address, doc: SchemaDocument) {
            self.schemas.lock().unwrap().insert(address, doc);
        }
    }

    impl ChainIndex for MemIndex {
        fn lookup_grant(&self, pubkey: &str, d: &str) -> Result<Option<IndexedGrant>, StoreError> {
            Ok(self
                .grants
                .lock()
                .unwrap()
                .get(&(pubkey.to_string(), d.to_string()))
                .cloned())
        }

        fn resolve_schema(&self, address: &Address) -> Result<Option<SchemaDocument>, StoreError> {
            Ok(self.schemas.lock().unwrap().get(address).cloned())
        }
    }
}
