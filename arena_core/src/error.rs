//! Error classification shared by every engine component.
//!
//! Each module keeps its own `thiserror` enum; [`ErrorKind`] is the coarse
//! category a presentation layer switches on, and [`Entity`] names the row an
//! error refers to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input (negative amount, tied scoreline, bad config)
    Validation,
    /// Referenced entity does not exist
    NotFound,
    /// Capacity exceeded, duplicate registration, concurrent modification
    Conflict,
    /// Operation is illegal for the current lifecycle state
    InvalidState,
    /// Wallet balance too low
    InsufficientFunds,
    /// Actor is not a participant of the match or tournament
    Unauthorized,
    /// Database or timeout failure; retry with the same idempotency key
    Infrastructure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Infrastructure => "infrastructure",
        };
        f.write_str(name)
    }
}

/// Persisted entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Wallet,
    Transaction,
    Tournament,
    Participant,
    Match,
    DisputeTicket,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Wallet => "wallet",
            Entity::Transaction => "transaction",
            Entity::Tournament => "tournament",
            Entity::Participant => "participant",
            Entity::Match => "match",
            Entity::DisputeTicket => "dispute ticket",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_is_snake_case() {
        assert_eq!(ErrorKind::InsufficientFunds.to_string(), "insufficient_funds");
        assert_eq!(ErrorKind::InvalidState.to_string(), "invalid_state");
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(Entity::DisputeTicket.to_string(), "dispute ticket");
        assert_eq!(Entity::Match.to_string(), "match");
    }
}
