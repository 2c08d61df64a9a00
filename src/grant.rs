//! Credential Grant tag extraction and admission validator (spec.md §3
//! "Credential Grant" and §4.5).

use crate::address::Address;
use crate::event::{Event, ValidationError};
use crate::schema::{ClassDefinition, SchemaDocument};

const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expires {
    At(i64),
    Perpetual,
}

/// The required tags of a Credential Grant, parsed and typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantFields {
    pub d: String,
    pub recipient: String,
    pub schema_address: Address,
    pub class: String,
    pub issued: i64,
    pub expires: Expires,
    pub chain: Option<Address>,
}

/// Extract and type-check the required/optional tags of a grant event.
/// This does not resolve the schema or check authority — see
/// [`validate_admission`] and `crate::chain`.
pub fn extract_fields(event: &Event) -> Result<GrantFields, ValidationError> {
    let d = event
        .tags
        .first_value("d")
        .ok_or_else(|| ValidationError("grant missing d tag".into()))?
        .to_string();
    let recipient = event
        .tags
        .first_value("p")
        .ok_or_else(|| ValidationError("grant missing p tag".into()))?
        .to_string();
    let a_raw = event
        .tags
        .first_value("a")
        .ok_or_else(|| ValidationError("grant missing a tag".into()))?;
    let schema_address =
        Address::parse(a_raw).ok_or_else(|| ValidationError("grant a tag is not a valid address".into()))?;
    let class = event
        .tags
        .first_value("class")
        .ok_or_else(|| ValidationError("grant missing class tag".into()))?
        .to_string();
    let issued_raw = event
        .tags
        .first_value("issued")
        .ok_or_else(|| ValidationError("grant missing issued tag".into()))?;
    let issued: i64 = issued_raw
        .parse()
        .map_err(|_| ValidationError("grant issued tag is not an integer".into()))?;
    let expires_raw = event
        .tags
        .first_value("expires")
        .ok_or_else(|| ValidationError("grant missing expires tag".into()))?;
    let expires = if expires_raw == "perpetual" {
        Expires::Perpetual
    } else {
        let v: i64 = expires_raw
            .parse()
            .map_err(|_| ValidationError("grant expires tag is not an integer or \"perpetual\"".into()))?;
        Expires::At(v)
    };
    let chain = match event.tags.first_value("chain") {
        Some(raw) => Some(
            Address::parse(raw)
                .ok_or_else(|| ValidationError("grant chain tag is not a valid address".into()))?,
        ),
        None => None,
    };

    Ok(GrantFields {
        d,
        recipient,
        schema_address,
        class,
        issued,
        expires,
        chain,
    })
}

/// Result of a successful admission check: the parsed fields plus the
/// resolved class definition, so callers don't re-parse the schema.
pub struct AdmittedGrant {
    pub fields: GrantFields,
    pub class_def: ClassDefinition,
}

/// Admission-time validation of a Credential Grant (spec.md §4.5). Does
/// NOT verify chain authority — that's `crate::chain::verify`.
pub fn validate_admission(
    event: &Event,
    resolve_schema: impl Fn(&Address) -> Option<SchemaDocument>,
) -> Result<AdmittedGrant, ValidationError> {
    let fields = extract_fields(event)?;

    let schema = resolve_schema(&fields.schema_address)
        .ok_or_else(|| ValidationError("schema not found".into()))?;
    let class_def = schema
        .class(&fields.class)
        .cloned()
        .ok_or_else(|| ValidationError(format!("class {} not found in schema", fields.class)))?;

    match fields.expires {
        Expires::Perpetual => {
            if class_def.expiry.max_days.is_some() {
                return Err(ValidationError(
                    "perpetual expiry not allowed: class has a max_days bound".into(),
                ));
            }
        }
        Expires::At(expires_at) => {
            if let Some(max_days) = class_def.expiry.max_days {
                let bound = fields.issued + max_days as i64 * SECS_PER_DAY;
                if expires_at > bound {
                    return Err(ValidationError(format!(
                        "expires {expires_at} exceeds class max_days bound of {bound}"
                    )));
                }
            }
        }
    }

    Ok(AdmittedGrant { fields, class_def })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Tags;
    use std::collections::{BTreeMap, BTreeSet};

    fn tag_event(tags: Vec<Vec<&str>>) -> Event {
        Event {
            id: "0".repeat(64),
            pubkey: "1".repeat(64),
            created_at: 0,
            kind: 30101,
            tags: Tags::from_raw(
                tags.into_iter()
                    .map(|t| t.into_iter().map(String::from).collect())
                    .collect(),
            ),
            content: String::new(),
            sig: "0".repeat(128),
        }
    }

    fn schema_with_director(max_days: Option<u64>) -> SchemaDocument {
        let mut classes = BTreeMap::new();
        classes.insert(
            "director".to_string(),
            ClassDefinition {
                name: "Director".into(),
                description: None,
                scope: BTreeSet::new(),
                issued_by: BTreeSet::from(["root".to_string()]),
                expiry: crate::schema::ExpiryPolicy {
                    max_days,
                    renewable: true,
                },
                cascade_revoke: false,
                constraints: serde_json::json!({}),
            },
        );
        SchemaDocument { classes }
    }

    #[test]
    fn extracts_numeric_expiry() {
        let ev = tag_event(vec![
            vec!["d", "g1"],
            vec!["p", "recipient"],
            vec!["a", "30100:root:schema-v1"],
            vec!["class", "director"],
            vec!["issued", "1000"],
            vec!["expires", "2000"],
        ]);
        let fields = extract_fields(&ev).unwrap();
        assert_eq!(fields.expires, Expires::At(2000));
        assert_eq!(fields.chain, None);
    }

    #[test]
    fn extracts_perpetual_expiry_and_chain() {
        let ev = tag_event(vec![
            vec!["d", "g1"],
            vec!["p", "recipient"],
            vec!["a", "30100:root:schema-v1"],
            vec!["class", "trainee"],
            vec!["issued", "1000"],
            vec!["expires", "perpetual"],
            vec!["chain", "30101:issuer:g0"],
        ]);
        let fields = extract_fields(&ev).unwrap();
        assert_eq!(fields.expires, Expires::Perpetual);
        assert_eq!(fields.chain, Some(Address::new(30101, "issuer", "g0")));
    }

    #[test]
    fn missing_required_tag_rejected() {
        let ev = tag_event(vec![vec!["d", "g1"]]);
        assert!(extract_fields(&ev).is_err());
    }

    #[test]
    fn admission_rejects_unknown_schema() {
        let ev = tag_event(vec![
            vec!["d", "g1"],
            vec!["p", "recipient"],
            vec!["a", "30100:root:schema-v1"],
            vec!["class", "director"],
            vec!["issued", "1000"],
            vec!["expires", "2000"],
        ]);
        let result = validate_admission(&ev, |_| None);
        assert!(result.is_err());
    }

    #[test]
    fn admission_rejects_expiry_beyond_max_days() {
        let ev = tag_event(vec![
            vec!["d", "g1"],
            vec!["p", "recipient"],
            vec!["a", "30100:root:schema-v1"],
            vec!["class", "director"],
            vec!["issued", "0"],
            vec!["expires", &(400 * SECS_PER_DAY).to_string()],
        ]);
        let schema = schema_with_director(Some(365));
        let result = validate_admission(&ev, |_| Some(schema.clone()));
        assert!(result.is_err());
    }

    #[test]
    fn admission_rejects_perpetual_when_class_is_bounded() {
        let ev = tag_event(vec![
            vec!["d", "g1"],
            vec!["p", "recipient"],
            vec!["a", "30100:root:schema-v1"],
            vec!["class", "director"],
            vec!["issued", "0"],
            vec!["expires", "perpetual"],
        ]);
        let schema = schema_with_director(Some(365));
        let result = validate_admission(&ev, |_| Some(schema.clone()));
        assert!(result.is_err());
    }

    #[test]
    fn admission_accepts_perpetual_when_class_is_unbounded() {
        let ev = tag_event(vec![
            vec!["d", "g1"],
            vec!["p", "recipient"],
            vec!["a", "30100:root:schema-v1"],
            vec!["class", "director"],
            vec!["issued", "0"],
            vec!["expires", "perpetual"],
        ]);
        let schema = schema_with_director(None);
        let result = validate_admission(&ev, |_| Some(schema.clone()));
        assert!(result.is_ok());
    }
}
