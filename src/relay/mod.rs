//! WebSocket relay front-end: wire protocol, admission dispatch, and the
//! axum server (spec.md §6/§7).

pub mod dispatch;
pub mod protocol;
pub mod server;

pub use server::{router, SharedState};
