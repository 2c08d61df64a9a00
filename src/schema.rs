//! Schema Definition content document and its admission validator
//! (spec.md §3 "Schema document" and §4.4).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::event::{Event, ValidationError};

/// `classes: { class-id -> class-definition }` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub classes: BTreeMap<String, ClassDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: BTreeSet<String>,
    /// Either class-ids or the literal `"root"`.
    pub issued_by: BTreeSet<String>,
    pub expiry: ExpiryPolicy,
    #[serde(default)]
    pub cascade_revoke: bool,
    #[serde(default)]
    pub constraints: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryPolicy {
    /// `null` means perpetual credentials are allowed for this class.
    pub max_days: Option<u64>,
    pub renewable: bool,
}

pub const ROOT: &str = "root";

impl SchemaDocument {
    pub fn class(&self, class_id: &str) -> Option<&ClassDefinition> {
        self.classes.get(class_id)
    }

    /// Check the structural invariants of spec.md §3/§4.4:
    /// - non-empty `classes`
    /// - every `scope` member resolves within `classes`
    /// - every non-`"root"` `issued_by` member resolves within `classes`
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("schema has no classes".to_string());
        }
        for (class_id, def) in &self.classes {
            for scoped in &def.scope {
                if !self.classes.contains_key(scoped) {
                    return Err(format!(
                        "class {class_id} scope references unknown class {scoped}"
                    ));
                }
            }
            for issuer in &def.issued_by {
                if issuer != ROOT && !self.classes.contains_key(issuer) {
                    return Err(format!(
                        "class {class_id} issued_by references unknown class {issuer}"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Validate a Schema Definition event per spec.md §4.4. Returns the parsed,
/// structurally-valid document on success.
pub fn validate_schema_event(event: &Event) -> Result<SchemaDocument, ValidationError> {
    if !event.tags.has("d") {
        return Err(ValidationError("schema event missing d tag".into()));
    }
    if !event.tags.has("name") {
        return Err(ValidationError("schema event missing name tag".into()));
    }

    let doc: SchemaDocument = serde_json::from_str(&event.content)
        .map_err(|e| ValidationError(format!("schema content is not a valid document: {e}")))?;

    doc.validate_structure().map_err(ValidationError)?;

    Ok(doc)
}
