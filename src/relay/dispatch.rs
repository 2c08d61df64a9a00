//! Kind-based admission routing (spec.md §4.2, §4.4, §4.5, §4.6).
//!
//! One inbound event, one admission decision: structural/cryptographic
//! checks always run first, then role-specific validation, then the event
//! is durably stored. Mirrors the teacher's kind-based dispatch in
//! `connection/routing.rs`.

use std::sync::Arc;

use crate::chain::{self, ChainIndex, IndexedGrant};
use crate::error::RelayError;
use crate::event::{self, Event};
use crate::grant;
use crate::kinds::EventRole;
use crate::schema;
use crate::store::EventStore;

/// Admit a single inbound event, running every check spec.md §4 requires
/// before it may be persisted and echoed out to subscribers.
pub fn admit(
    store: &Arc<EventStore>,
    event: &Event,
    now: i64,
    verify_config: &chain::VerifyConfig,
) -> Result<(), RelayError> {
    event::validate(event).map_err(|e| RelayError::Structural(e.0))?;

    match store.kinds().role_of(event.kind) {
        Some(EventRole::SchemaDefinition) => {
            schema::validate_schema_event(event).map_err(|e| RelayError::Schema(e.0))?;
        }
        Some(EventRole::CredentialGrant) => {
            admit_grant(store, event, now, verify_config)?;
        }
        Some(EventRole::Revocation) | Some(EventRole::Renewal) => {
            // References an existing grant by address; admission itself
            // needs no further checks beyond the structural pass above.
            // The referenced grant is re-verified on its own next lookup.
        }
        None => {}
    }

    store.insert_event(event)?;
    Ok(())
}

fn admit_grant(
    store: &Arc<EventStore>,
    event: &Event,
    now: i64,
    verify_config: &chain::VerifyConfig,
) -> Result<(), RelayError> {
    let store_for_resolve = Arc::clone(store);
    let admitted = grant::validate_admission(event, move |addr| {
        store_for_resolve.resolve_schema(addr).ok().flatten()
    })
    .map_err(|e| RelayError::Schema(e.0))?;

    let fields = admitted.fields;
    let candidate = IndexedGrant {
        pubkey: event.pubkey.clone(),
        d: fields.d.clone(),
        recipient: fields.recipient.clone(),
        schema_address: fields.schema_address.clone(),
        class: fields.class.clone(),
        issued: fields.issued,
        effective_expires: match fields.expires {
            grant::Expires::At(v) => Some(v),
            grant::Expires::Perpetual => None,
        },
        revoked: false,
        revoked_at: None,
        revoked_reason: None,
        chain: fields.chain.clone(),
    };

    let outcome = chain::verify(&candidate, store.as_ref(), verify_config, now)?;

    match outcome {
        chain::Outcome::Valid { .. } => Ok(()),
        chain::Outcome::Invalid { reason } => Err(RelayError::Authority(reason)),
        chain::Outcome::Expired { expired_at } => Err(RelayError::Temporal(expired_at)),
        chain::Outcome::Revoked { revoked_at, reason } => {
            Err(RelayError::Revocation { revoked_at, reason })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_support::TestSigner;
    use crate::event::Tags;
    use crate::kinds::KindConfig;

    fn signed_event(signer: &TestSigner, created_at: i64, kind: u64, tags: Vec<Vec<&str>>, content: &str) -> Event {
        let pubkey = signer.pubkey_hex();
        let tags = Tags::from_raw(tags.into_iter().map(|t| t.into_iter().map(String::from).collect()).collect());
        let id_hex = crate::crypto::compute_id(&pubkey, created_at, kind, &tags, content);
        let digest: [u8; 32] = hex::decode(&id_hex).unwrap().try_into().unwrap();
        let sig = signer.sign_hex(&digest);
        Event { id: id_hex, pubkey, created_at, kind, tags, content: content.to_string(), sig }
    }

    fn verify_config() -> chain::VerifyConfig {
        chain::VerifyConfig::new(KindConfig::default().credential_grant)
    }

    #[test]
    fn admits_well_formed_schema_then_root_grant() {
        let store = Arc::new(EventStore::open_memory(KindConfig::default()).unwrap());
        let root = TestSigner::new();
        let recipient = TestSigner::new();

        let doc = serde_json::json!({
            "classes": {
                "director": {
                    "name": "Director",
                    "scope": [],
                    "issued_by": ["root"],
                    "expiry": {"max_days": null, "renewable": false},
                    "cascade_revoke": false,
                    "constraints": {}
                }
            }
        });
        let schema_ev = signed_event(&root, 1000, 30100, vec![vec!["d", "schema-v1"], vec!["name", "s"]], &doc.to_string());
        admit(&store, &schema_ev, 1000, &verify_config()).unwrap();

        let root_pk = root.pubkey_hex();
        let grant_ev = signed_event(
            &root,
            1100,
            30101,
            vec![
                vec!["d", "g1"],
                vec!["p", &recipient.pubkey_hex()],
                vec!["a", &format!("30100:{root_pk}:schema-v1")],
                vec!["class", "director"],
                vec!["issued", "1100"],
                vec!["expires", "perpetual"],
            ],
            "",
        );
        admit(&store, &grant_ev, 1100, &verify_config()).unwrap();

        let stored = store.lookup_grant(&root_pk, "g1").unwrap().unwrap();
        assert_eq!(stored.class, "director");
    }

    #[test]
    fn rejects_structurally_invalid_event() {
        let store = Arc::new(EventStore::open_memory(KindConfig::default()).unwrap());
        let signer = TestSigner::new();
        let mut ev = signed_event(&signer, 1000, 30101, vec![], "");
        ev.sig = "0".repeat(128);
        let err = admit(&store, &ev, 1000, &verify_config()).unwrap_err();
        assert!(matches!(err, RelayError::Structural(_)));
    }

    #[test]
    fn rejects_grant_without_known_schema() {
        let store = Arc::new(EventStore::open_memory(KindConfig::default()).unwrap());
        let issuer = TestSigner::new();
        let recipient = TestSigner::new();
        let grant_ev = signed_event(
            &issuer,
            1000,
            30101,
            vec![
                vec!["d", "g1"],
                vec!["p", &recipient.pubkey_hex()],
                vec!["a", "30100:deadbeef:schema-v1"],
                vec!["class", "director"],
                vec!["issued", "1000"],
                vec!["expires", "perpetual"],
            ],
            "",
        );
        let err = admit(&store, &grant_ev, 1000, &verify_config()).unwrap_err();
        assert!(matches!(err, RelayError::Schema(_)));
    }
}
