//! Subscription filter (spec.md §4.3 "Query" / §6 "Subscription filter
//! semantics"): union across listed values per field, intersection across
//! fields.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::event::Event;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u64>,
    /// Tag `#e` values — matched by substring over the serialized tag array.
    #[serde(rename = "#e", default, skip_serializing_if = "Vec::is_empty")]
    pub e: Vec<String>,
    /// Tag `#p` values — matched the same way as `#e`.
    #[serde(rename = "#p", default, skip_serializing_if = "Vec::is_empty")]
    pub p: Vec<String>,
    /// Tag `#a` values — exact match against the promoted `a_tag` column.
    #[serde(rename = "#a", default, skip_serializing_if = "Vec::is_empty")]
    pub a: Vec<String>,
    /// Tag `#d` values — exact match against the promoted `d_tag` column.
    #[serde(rename = "#d", default, skip_serializing_if = "Vec::is_empty")]
    pub d: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Build the SQL and bind parameters for the columns this filter can
    /// push down to SQLite (ids, authors, kinds, a_tag, d_tag, since,
    /// until). `#e`/`#p` substring matching and the expiration-tag check
    /// happen afterward in `EventStore::query`.
    pub(super) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::from(
            "SELECT id, pubkey, created_at, kind, tags_json, content, sig, expiration FROM events WHERE 1=1",
        );
        let mut args: Vec<Value> = Vec::new();

        push_in_clause(&mut sql, &mut args, "id", &self.ids, |s| Value::Text(s.clone()));
        push_in_clause(&mut sql, &mut args, "pubkey", &self.authors, |s| Value::Text(s.clone()));
        push_in_clause(&mut sql, &mut args, "kind", &self.kinds, |k| Value::Integer(*k as i64));
        push_in_clause(&mut sql, &mut args, "a_tag", &self.a, |s| Value::Text(s.clone()));
        push_in_clause(&mut sql, &mut args, "d_tag", &self.d, |s| Value::Text(s.clone()));

        if let Some(since) = self.since {
            sql.push_str(" AND created_at >= ?");
            args.push(Value::Integer(since));
        }
        if let Some(until) = self.until {
            sql.push_str(" AND created_at <= ?");
            args.push(Value::Integer(until));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");
        (sql, args)
    }

    /// In-memory evaluation of the same semantics `to_sql` pushes down,
    /// used for live subscription fan-out where there's no round trip
    /// through SQLite (spec.md §6 "Subscription filter semantics").
    pub fn matches(&self, event: &Event) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| id == &event.id) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.iter().any(|a| a == &event.pubkey) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.e.is_empty() && !tag_value_matches(event, "e", &self.e) {
            return false;
        }
        if !self.p.is_empty() && !tag_value_matches(event, "p", &self.p) {
            return false;
        }
        if !self.a.is_empty() {
            let matched = event.tags.first_value("a").is_some_and(|v| self.a.iter().any(|w| w == v));
            if !matched {
                return false;
            }
        }
        if !self.d.is_empty() {
            let matched = event.tags.first_value("d").is_some_and(|v| self.d.iter().any(|w| w == v));
            if !matched {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        true
    }
}

/// A tag's value (second element) equals one of `wanted` (spec.md §4.3's
/// `#e`/`#p` matching; exact-match on the tag's value position).
pub(crate) fn tag_value_matches(event: &Event, tag_name: &str, wanted: &[String]) -> bool {
    event
        .tags
        .all(tag_name)
        .any(|t| t.get(1).is_some_and(|v| wanted.iter().any(|w| v == w)))
}

fn push_in_clause<T>(
    sql: &mut String,
    args: &mut Vec<Value>,
    column: &str,
    values: &[T],
    to_value: impl Fn(&T) -> Value,
) {
    if values.is_empty() {
        return;
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    sql.push_str(&format!(" AND {column} IN ({placeholders})"));
    args.extend(values.iter().map(to_value));
}
