//! Credential Grant lifecycle projection (spec.md §4.7).
//!
//! A pure function from stored facts to the observable state — `Proposed`
//! is never produced here since the store only holds admitted grants; it
//! describes an event that hasn't cleared the validator/verifier yet.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantState {
    Proposed,
    Active,
    Renewed,
    Revoked,
    Expired,
}

/// Project a grant's lifecycle state from its indexed facts (spec.md §4.7).
///
/// A later Renewal of an `Expired` grant moves it back to `Renewed` simply
/// because `effective_expires` now lies in the future again — no separate
/// "resurrection" branch is needed.
pub fn project(revoked: bool, renewed: bool, effective_expires: Option<i64>, now: i64) -> GrantState {
    if revoked {
        return GrantState::Revoked;
    }
    if let Some(expires) = effective_expires {
        if expires < now {
            return GrantState::Expired;
        }
    }
    if renewed {
        GrantState::Renewed
    } else {
        GrantState::Active
    }
}
