//! Core types used throughout the system
//!
//! Fundamental aliases and small shared value types. They provide semantic
//! meaning and enable future type evolution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User ID - campus identity (NetID-style), supplied by the authentication
/// collaborator. The engine trusts this identity and never re-verifies
/// credentials itself.
pub type UserId = String;

/// Number of meal swipes. Always a small non-negative integer.
pub type SwipeCount = u32;

/// Dining-hall constraint attached to a transfer.
///
/// `Any` means the credential is redeemable at every location; `Only`
/// restricts redemption to a single named hall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationRule {
    Any,
    Only(String),
}

impl LocationRule {
    pub fn allows(&self, location: &str) -> bool {
        match self {
            LocationRule::Any => true,
            LocationRule::Only(hall) => hall == location,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LocationRule::Any => "ANY",
            LocationRule::Only(hall) => hall,
        }
    }

    /// Parse the wire form: the literal `ANY` (any casing) is unrestricted,
    /// everything else names a hall.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("ANY") {
            LocationRule::Any
        } else {
            LocationRule::Only(value.to_string())
        }
    }
}

impl fmt::Display for LocationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_rule_allows() {
        assert!(LocationRule::Any.allows("Okenshields"));
        let only = LocationRule::Only("North Star Dining Room".to_string());
        assert!(only.allows("North Star Dining Room"));
        assert!(!only.allows("Okenshields"));
    }

    #[test]
    fn test_location_rule_parse() {
        assert_eq!(LocationRule::parse("ANY"), LocationRule::Any);
        assert_eq!(LocationRule::parse("any"), LocationRule::Any);
        assert_eq!(
            LocationRule::parse("Okenshields"),
            LocationRule::Only("Okenshields".to_string())
        );
    }

    #[test]
    fn test_location_rule_display() {
        assert_eq!(LocationRule::Any.to_string(), "ANY");
        assert_eq!(
            LocationRule::Only("Okenshields".to_string()).to_string(),
            "Okenshields"
        );
    }
}
