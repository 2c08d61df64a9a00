//! Relay configuration (ambient; not specified by the core, per spec.md §1's
//! "configuration loading" being an external collaborator).
//!
//! `clap` derive over CLI flags and environment variables, the shape of the
//! teacher's `ServerConfig::parse()` entry point in `main.rs`.

use std::net::SocketAddr;

use clap::Parser;

use crate::chain::{VerifyConfig, MAX_CHAIN_DEPTH};
use crate::kinds::KindConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "warrant-relay", about = "Hierarchical delegated credential relay")]
pub struct RelayConfig {
    /// Address to bind the WebSocket listener on.
    #[arg(long, env = "WARRANT_LISTEN_ADDR", default_value = "127.0.0.1:7447")]
    pub listen_addr: SocketAddr,

    /// Path to the SQLite database file.
    #[arg(long, env = "WARRANT_DB_PATH", default_value = "warrant-relay.sqlite3")]
    pub db_path: String,

    /// Numeric kind used for Schema Definition events.
    #[arg(long, env = "WARRANT_SCHEMA_KIND", default_value_t = 30_100)]
    pub schema_kind: u64,
    /// Numeric kind used for Credential Grant events.
    #[arg(long, env = "WARRANT_GRANT_KIND", default_value_t = 30_101)]
    pub grant_kind: u64,
    /// Numeric kind used for Revocation events.
    #[arg(long, env = "WARRANT_REVOCATION_KIND", default_value_t = 30_102)]
    pub revocation_kind: u64,
    /// Numeric kind used for Renewal events.
    #[arg(long, env = "WARRANT_RENEWAL_KIND", default_value_t = 30_103)]
    pub renewal_kind: u64,

    /// Default `limit` applied to a REQ filter that doesn't specify one.
    #[arg(long, env = "WARRANT_DEFAULT_LIMIT", default_value_t = 500)]
    pub default_query_limit: usize,
    /// Hard ceiling on the `limit` a client may request.
    #[arg(long, env = "WARRANT_MAX_LIMIT", default_value_t = 5_000)]
    pub max_query_limit: usize,

    /// Maximum chain-verification depth (spec.md §4.6 rule (a)).
    #[arg(long, env = "WARRANT_MAX_CHAIN_DEPTH", default_value_t = MAX_CHAIN_DEPTH)]
    pub max_chain_depth: u32,
}

impl RelayConfig {
    pub fn kinds(&self) -> KindConfig {
        KindConfig {
            schema_definition: self.schema_kind,
            credential_grant: self.grant_kind,
            revocation: self.revocation_kind,
            renewal: self.renewal_kind,
        }
    }

    pub fn verify_config(&self) -> VerifyConfig {
        VerifyConfig {
            max_depth: self.max_chain_depth,
            credential_grant_kind: self.grant_kind,
        }
    }
}
