//! The durable, indexed event store (spec.md §4.3).
//!
//! `rusqlite` behind a `parking_lot::Mutex`, WAL journal mode, and an
//! idempotent `migrate()` run on open — the same shape as the teacher's
//! `policy/store.rs` / `db.rs`. Three tables: `events` (primary, with
//! `d_tag`/`a_tag`/`expiration` promoted to columns for exact-match
//! filtering), `credential_index` (one denormalized row per admitted
//! Credential Grant), `schema_cache` (one row per schema address).

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::address::Address;
use crate::chain::{ChainIndex, IndexedGrant};
use crate::error::StoreError;
use crate::event::Event;
use crate::grant::{self, Expires};
use crate::kinds::{EventRole, KindConfig};
use crate::schema::{self, SchemaDocument};

pub mod filter;
pub use filter::Filter;

pub struct EventStore {
    conn: Mutex<Connection>,
    kinds: KindConfig,
}

impl EventStore {
    pub fn open<P: AsRef<Path>>(path: P, kinds: KindConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, kinds)
    }

    pub fn open_memory(kinds: KindConfig) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, kinds)
    }

    fn from_connection(conn: Connection, kinds: KindConfig) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = EventStore { conn: Mutex::new(conn), kinds };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                pubkey TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                kind INTEGER NOT NULL,
                tags_json TEXT NOT NULL,
                content TEXT NOT NULL,
                sig TEXT NOT NULL,
                d_tag TEXT,
                a_tag TEXT,
                expiration INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_events_kind_author ON events(kind, pubkey);
            CREATE INDEX IF NOT EXISTS idx_events_kind_author_d ON events(kind, pubkey, d_tag);
            CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at DESC, id DESC);

            CREATE TABLE IF NOT EXISTS credential_index (
                grant_id TEXT NOT NULL,
                pubkey TEXT NOT NULL,
                d_tag TEXT NOT NULL,
                recipient TEXT NOT NULL,
                schema_address TEXT NOT NULL,
                class TEXT NOT NULL,
                issued INTEGER NOT NULL,
                expires_at INTEGER,
                chain_ref TEXT,
                revoked INTEGER NOT NULL DEFAULT 0,
                revoked_at INTEGER,
                revoked_reason TEXT,
                renewed INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (pubkey, d_tag)
            );

            CREATE INDEX IF NOT EXISTS idx_cred_recipient ON credential_index(recipient);
            CREATE INDEX IF NOT EXISTS idx_cred_schema ON credential_index(schema_address);
            CREATE INDEX IF NOT EXISTS idx_cred_class ON credential_index(class);

            CREATE TABLE IF NOT EXISTS schema_cache (
                address TEXT PRIMARY KEY,
                document_json TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Accept an event (spec.md §4.3). Returns `true` if accepted (including
    /// the idempotent re-insert-by-id case), `false` on a post-condition
    /// violation. The insert plus its revocation/renewal/index side-effects
    /// commit as a single transaction.
    pub fn insert_event(&self, event: &Event) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock();

        let already: bool = conn
            .query_row("SELECT 1 FROM events WHERE id = ?1", params![event.id], |_| Ok(()))
            .optional()?
            .is_some();
        if already {
            return Ok(true);
        }

        let d_tag = event.tags.first_value("d").map(str::to_string);
        let a_tag = event.tags.first_value("a").map(str::to_string);
        let expiration: Option<i64> = event.tags.first_value("expiration").and_then(|s| s.parse().ok());
        let tags_json = serde_json::to_string(event.tags.as_raw())?;

        let tx = conn.transaction()?;

        if crate::kinds::is_replaceable(event.kind) {
            tx.execute(
                "DELETE FROM events WHERE kind = ?1 AND pubkey = ?2
                 AND (created_at < ?3 OR (created_at = ?3 AND id < ?4))",
                params![event.kind, event.pubkey, event.created_at, event.id],
            )?;
        } else if crate::kinds::is_parameterized_replaceable(event.kind) {
            if let Some(d) = &d_tag {
                tx.execute(
                    "DELETE FROM events WHERE kind = ?1 AND pubkey = ?2 AND d_tag = ?3
                     AND (created_at < ?4 OR (created_at = ?4 AND id < ?5))",
                    params![event.kind, event.pubkey, d, event.created_at, event.id],
                )?;
            }
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO events (id, pubkey, created_at, kind, tags_json, content, sig, d_tag, a_tag, expiration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.id,
                event.pubkey,
                event.created_at,
                event.kind,
                tags_json,
                event.content,
                event.sig,
                d_tag,
                a_tag,
                expiration,
            ],
        )?;
        if inserted == 0 {
            tx.rollback()?;
            return Ok(false);
        }

        match self.kinds.role_of(event.kind) {
            Some(EventRole::CredentialGrant) => upsert_credential_index(&tx, event)?,
            Some(EventRole::SchemaDefinition) => cache_schema(&tx, event)?,
            Some(EventRole::Revocation) => apply_revocation(&tx, &self.kinds, event)?,
            Some(EventRole::Renewal) => apply_renewal(&tx, &self.kinds, event)?,
            None => {}
        }

        tx.commit()?;
        Ok(true)
    }

    /// Query the store (spec.md §4.3/§6). `now` drives the expiration-tag
    /// filter; callers pass wall time explicitly so the function stays
    /// deterministic and testable.
    pub fn query(&self, filter: &Filter, now: i64) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn.lock();
        let (sql, args) = filter.to_sql();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            let tags_json: String = row.get(4)?;
            let expiration: Option<i64> = row.get(7)?;
            Ok((
                Event {
                    id: row.get(0)?,
                    pubkey: row.get(1)?,
                    created_at: row.get(2)?,
                    kind: row.get::<_, i64>(3)? as u64,
                    tags: crate::event::Tags::from_raw(
                        serde_json::from_str(&tags_json).unwrap_or_default(),
                    ),
                    content: row.get(5)?,
                    sig: row.get(6)?,
                },
                expiration,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (event, expiration) = row?;
            if let Some(exp) = expiration {
                if exp < now {
                    continue;
                }
            }
            if !filter.e.is_empty() && !filter::tag_value_matches(&event, "e", &filter.e) {
                continue;
            }
            if !filter.p.is_empty() && !filter::tag_value_matches(&event, "p", &filter.p) {
                continue;
            }
            out.push(event);
            if out.len() >= filter.limit.unwrap_or(500) {
                break;
            }
        }
        Ok(out)
    }

    /// Credential index lookup by the grant's own event id.
    pub fn credential_by_id(&self, grant_id: &str) -> Result<Option<IndexedGrant>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("{CREDENTIAL_SELECT} WHERE grant_id = ?1"),
                params![grant_id],
                map_credential_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn credentials_by_recipient(&self, recipient: &str) -> Result<Vec<IndexedGrant>, StoreError> {
        self.credentials_where("recipient = ?1", params![recipient])
    }

    pub fn credentials_by_issuer(&self, issuer_pubkey: &str) -> Result<Vec<IndexedGrant>, StoreError> {
        self.credentials_where("pubkey = ?1", params![issuer_pubkey])
    }

    pub fn credentials_by_schema(&self, schema_address: &Address) -> Result<Vec<IndexedGrant>, StoreError> {
        self.credentials_where("schema_address = ?1", params![schema_address.to_string()])
    }

    pub fn credentials_by_class(&self, class: &str) -> Result<Vec<IndexedGrant>, StoreError> {
        self.credentials_where("class = ?1", params![class])
    }

    fn credentials_where(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<IndexedGrant>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{CREDENTIAL_SELECT} WHERE {clause}"))?;
        let rows = stmt.query_map(params, map_credential_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The numeric kind mapping this store was opened with.
    pub fn kinds(&self) -> KindConfig {
        self.kinds
    }

    /// The grant's projected lifecycle state (spec.md §4.7), given wall time.
    pub fn grant_state(&self, pubkey: &str, d: &str, now: i64) -> Result<Option<crate::state::GrantState>, StoreError> {
        let conn = self.conn.lock();
        let row: Option<(bool, bool, Option<i64>)> = conn
            .query_row(
                "SELECT revoked != 0, renewed != 0, expires_at FROM credential_index WHERE pubkey = ?1 AND d_tag = ?2",
                params![pubkey, d],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(row.map(|(revoked, renewed, expires_at)| {
            crate::state::project(revoked, renewed, expires_at, now)
        }))
    }
}

impl ChainIndex for EventStore {
    fn lookup_grant(&self, pubkey: &str, d: &str) -> Result<Option<IndexedGrant>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{CREDENTIAL_SELECT} WHERE pubkey = ?1 AND d_tag = ?2"),
            params![pubkey, d],
            map_credential_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn resolve_schema(&self, address: &Address) -> Result<Option<SchemaDocument>, StoreError> {
        let conn = self.conn.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT document_json FROM schema_cache WHERE address = ?1",
                params![address.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }
}

const CREDENTIAL_SELECT: &str = "SELECT grant_id, pubkey, d_tag, recipient, schema_address, class, issued, expires_at, chain_ref, revoked, revoked_at, revoked_reason FROM credential_index";

fn map_credential_row(row: &rusqlite::Row) -> rusqlite::Result<IndexedGrant> {
    let schema_address_raw: String = row.get(4)?;
    let chain_raw: Option<String> = row.get(8)?;
    let schema_address = Address::parse(&schema_address_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, "bad schema address".into())
    })?;
    let chain = chain_raw.and_then(|s| Address::parse(&s));
    Ok(IndexedGrant {
        pubkey: row.get(1)?,
        d: row.get(2)?,
        recipient: row.get(3)?,
        schema_address,
        class: row.get(5)?,
        issued: row.get(6)?,
        effective_expires: row.get(7)?,
        revoked: row.get::<_, i64>(9)? != 0,
        revoked_at: row.get(10)?,
        revoked_reason: row.get(11)?,
        chain,
    })
}

fn upsert_credential_index(tx: &rusqlite::Transaction, event: &Event) -> Result<(), StoreError> {
    let fields = grant::extract_fields(event).map_err(|e| StoreError::Serialization(e.0))?;
    let expires_at = match fields.expires {
        Expires::At(v) => Some(v),
        Expires::Perpetual => None,
    };
    let chain_ref = fields.chain.as_ref().map(Address::to_string);
    tx.execute(
        "INSERT INTO credential_index (grant_id, pubkey, d_tag, recipient, schema_address, class, issued, expires_at, chain_ref, revoked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)
         ON CONFLICT(pubkey, d_tag) DO UPDATE SET
            grant_id = excluded.grant_id,
            recipient = excluded.recipient,
            schema_address = excluded.schema_address,
            class = excluded.class,
            issued = excluded.issued,
            expires_at = excluded.expires_at,
            chain_ref = excluded.chain_ref",
        params![
            event.id,
            event.pubkey,
            fields.d,
            fields.recipient,
            fields.schema_address.to_string(),
            fields.class,
            fields.issued,
            expires_at,
            chain_ref,
        ],
    )?;
    Ok(())
}

fn cache_schema(tx: &rusqlite::Transaction, event: &Event) -> Result<(), StoreError> {
    let doc: SchemaDocument = serde_json::from_str(&event.content)?;
    let d = event.tags.first_value("d").unwrap_or_default();
    let address = Address::new(event.kind, event.pubkey.clone(), d);
    let json = serde_json::to_string(&doc)?;
    tx.execute(
        "INSERT INTO schema_cache (address, document_json) VALUES (?1, ?2)
         ON CONFLICT(address) DO UPDATE SET document_json = excluded.document_json",
        params![address.to_string(), json],
    )?;
    Ok(())
}

fn apply_revocation(tx: &rusqlite::Transaction, kinds: &KindConfig, event: &Event) -> Result<(), StoreError> {
    let Some(a_raw) = event.tags.first_value("a") else { return Ok(()) };
    let Some(addr) = schema_addr_if_grant(kinds, a_raw) else { return Ok(()) };
    let reason = event.tags.first_value("reason").unwrap_or("").to_string();
    tx.execute(
        "UPDATE credential_index SET revoked = 1, revoked_at = ?1, revoked_reason = ?2
         WHERE pubkey = ?3 AND d_tag = ?4",
        params![event.created_at, reason, addr.pubkey, addr.d_tag],
    )?;
    Ok(())
}

fn apply_renewal(tx: &rusqlite::Transaction, kinds: &KindConfig, event: &Event) -> Result<(), StoreError> {
    let Some(a_raw) = event.tags.first_value("a") else { return Ok(()) };
    let Some(addr) = schema_addr_if_grant(kinds, a_raw) else { return Ok(()) };
    let Some(expires_raw) = event.tags.first_value("expires") else { return Ok(()) };
    if expires_raw == "perpetual" {
        return Ok(());
    }
    let Ok(expires_at) = expires_raw.parse::<i64>() else { return Ok(()) };
    tx.execute(
        "UPDATE credential_index SET expires_at = ?1, renewed = 1
         WHERE pubkey = ?2 AND d_tag = ?3 AND revoked = 0",
        params![expires_at, addr.pubkey, addr.d_tag],
    )?;
    Ok(())
}

fn schema_addr_if_grant(kinds: &KindConfig, raw: &str) -> Option<Address> {
    let addr = Address::parse(raw)?;
    if addr.kind == kinds.credential_grant {
        Some(addr)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Tags;

    fn kinds() -> KindConfig {
        KindConfig::default()
    }

    fn raw_event(kind: u64, pubkey: &str, created_at: i64, tags: Vec<Vec<&str>>, content: &str) -> Event {
        let tags = Tags::from_raw(tags.into_iter().map(|t| t.into_iter().map(String::from).collect()).collect());
        let id = crate::crypto::compute_id(pubkey, created_at, kind, &tags, content);
        Event {
            id,
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags,
            content: content.to_string(),
            sig: "0".repeat(128),
        }
    }

    #[test]
    fn idempotent_insert_by_id() {
        let store = EventStore::open_memory(kinds()).unwrap();
        let ev = raw_event(30101, &"a".repeat(64), 1000, vec![], "");
        assert!(store.insert_event(&ev).unwrap());
        assert!(store.insert_event(&ev).unwrap());
        let results = store.query(&Filter::default(), 2000).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn parameterized_replaceable_keeps_latest() {
        let store = EventStore::open_memory(kinds()).unwrap();
        let pk = "b".repeat(64);
        let old = raw_event(30100, &pk, 1000, vec![vec!["d", "schema-v1"], vec!["name", "s"]], "{\"classes\":{}}");
        let new = raw_event(30100, &pk, 2000, vec![vec!["d", "schema-v1"], vec!["name", "s"]], "{\"classes\":{}}");
        store.insert_event(&old).unwrap();
        store.insert_event(&new).unwrap();
        let results = store.query(&Filter::default(), 3000).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].created_at, 2000);
    }

    #[test]
    fn credential_index_roundtrip_and_chain_lookup() {
        let store = EventStore::open_memory(kinds()).unwrap();
        let issuer = "c".repeat(64);
        let grant = raw_event(
            30101,
            &issuer,
            1000,
            vec![
                vec!["d", "g1"],
                vec!["p", "recipient"],
                vec!["a", "30100:root:schema-v1"],
                vec!["class", "director"],
                vec!["issued", "1000"],
                vec!["expires", "2000"],
            ],
            "",
        );
        store.insert_event(&grant).unwrap();

        let looked_up = store.lookup_grant(&issuer, "g1").unwrap().unwrap();
        assert_eq!(looked_up.class, "director");
        assert_eq!(looked_up.effective_expires, Some(2000));

        let by_recipient = store.credentials_by_recipient("recipient").unwrap();
        assert_eq!(by_recipient.len(), 1);
    }

    #[test]
    fn revocation_sets_flag_and_reason() {
        let store = EventStore::open_memory(kinds()).unwrap();
        let issuer = "d".repeat(64);
        let grant = raw_event(
            30101,
            &issuer,
            1000,
            vec![
                vec!["d", "g1"],
                vec!["p", "recipient"],
                vec!["a", "30100:root:schema-v1"],
                vec!["class", "director"],
                vec!["issued", "1000"],
                vec!["expires", "perpetual"],
            ],
            "",
        );
        store.insert_event(&grant).unwrap();

        let revoker = "e".repeat(64);
        let revocation = raw_event(
            30102,
            &revoker,
            1500,
            vec![vec!["a", &format!("30101:{issuer}:g1")], vec!["reason", "misconduct"]],
            "",
        );
        store.insert_event(&revocation).unwrap();

        let looked_up = store.lookup_grant(&issuer, "g1").unwrap().unwrap();
        assert!(looked_up.revoked);
        assert_eq!(looked_up.revoked_at, Some(1500));
        assert_eq!(looked_up.revoked_reason.as_deref(), Some("misconduct"));
    }

    #[test]
    fn renewal_extends_expiry_unless_revoked() {
        let store = EventStore::open_memory(kinds()).unwrap();
        let issuer = "f".repeat(64);
        let grant = raw_event(
            30101,
            &issuer,
            1000,
            vec![
                vec!["d", "g1"],
                vec!["p", "recipient"],
                vec!["a", "30100:root:schema-v1"],
                vec!["class", "director"],
                vec!["issued", "1000"],
                vec!["expires", "1500"],
            ],
            "",
        );
        store.insert_event(&grant).unwrap();

        let renewer = "1".repeat(64);
        let renewal = raw_event(
            30103,
            &renewer,
            1600,
            vec![vec!["a", &format!("30101:{issuer}:g1")], vec!["expires", "9999999"]],
            "",
        );
        store.insert_event(&renewal).unwrap();

        let looked_up = store.lookup_grant(&issuer, "g1").unwrap().unwrap();
        assert_eq!(looked_up.effective_expires, Some(9999999));

        // Once revoked, a later renewal must not resurrect it.
        let revocation = raw_event(
            30102,
            &renewer,
            1700,
            vec![vec!["a", &format!("30101:{issuer}:g1")], vec!["reason", "x"]],
            "",
        );
        store.insert_event(&revocation).unwrap();
        let renewal2 = raw_event(
            30103,
            &renewer,
            1800,
            vec![vec!["a", &format!("30101:{issuer}:g1")], vec!["expires", "8888888"]],
            "",
        );
        store.insert_event(&renewal2).unwrap();
        let looked_up = store.lookup_grant(&issuer, "g1").unwrap().unwrap();
        assert_eq!(looked_up.effective_expires, Some(9999999));
        assert!(looked_up.revoked);
    }

    #[test]
    fn schema_cache_roundtrip() {
        let store = EventStore::open_memory(kinds()).unwrap();
        let root = "2".repeat(64);
        let doc = serde_json::json!({
            "classes": {
                "director": {
                    "name": "Director",
                    "scope": [],
                    "issued_by": ["root"],
                    "expiry": {"max_days": 365, "renewable": false},
                    "cascade_revoke": false,
                    "constraints": {}
                }
            }
        });
        let schema_event = raw_event(
            30100,
            &root,
            1000,
            vec![vec!["d", "schema-v1"], vec!["name", "test"]],
            &doc.to_string(),
        );
        store.insert_event(&schema_event).unwrap();

        let address = Address::new(30100, &root, "schema-v1");
        let resolved = store.resolve_schema(&address).unwrap().unwrap();
        assert!(resolved.class("director").is_some());
    }

    #[test]
    fn expiration_tag_excludes_from_query() {
        let store = EventStore::open_memory(kinds()).unwrap();
        let pk = "3".repeat(64);
        let ev = raw_event(30101, &pk, 1000, vec![vec!["expiration", "1500"]], "");
        store.insert_event(&ev).unwrap();

        let still_visible = store.query(&Filter::default(), 1200).unwrap();
        assert_eq!(still_visible.len(), 1);

        let now_expired = store.query(&Filter::default(), 1600).unwrap();
        assert_eq!(now_expired.len(), 0);
    }

    #[test]
    fn query_filters_by_kind_and_author() {
        let store = EventStore::open_memory(kinds()).unwrap();
        let a = "4".repeat(64);
        let b = "5".repeat(64);
        store.insert_event(&raw_event(30100, &a, 1000, vec![vec!["d", "x"], vec!["name", "n"]], "{\"classes\":{}}")).unwrap();
        store.insert_event(&raw_event(30101, &b, 1001, vec![], "")).unwrap();

        let filter = Filter { kinds: vec![30101], ..Default::default() };
        let results = store.query(&filter, 5000).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pubkey, b);
    }

    #[test]
    fn grant_state_projection_through_store() {
        let store = EventStore::open_memory(kinds()).unwrap();
        let issuer = "6".repeat(64);
        let grant = raw_event(
            30101,
            &issuer,
            1000,
            vec![
                vec!["d", "g1"],
                vec!["p", "recipient"],
                vec!["a", "30100:root:schema-v1"],
                vec!["class", "director"],
                vec!["issued", "1000"],
                vec!["expires", "1500"],
            ],
            "",
        );
        store.insert_event(&grant).unwrap();

        assert_eq!(
            store.grant_state(&issuer, "g1", 1200).unwrap(),
            Some(crate::state::GrantState::Active)
        );
        assert_eq!(
            store.grant_state(&issuer, "g1", 2000).unwrap(),
            Some(crate::state::GrantState::Expired)
        );
    }
}
