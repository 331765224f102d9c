/// Error classification for retry decisions
///
/// Each failure from an external call is classified into a category that
/// decides whether the retry policy may try again.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Transient errors - retry with backoff (service down, connection reset)
    Transient,

    /// Fatal errors - propagate immediately
    /// Examples: malformed digest, untrusted endpoint, missing ledger reference
    Fatal,
}

impl ErrorClass {
    pub fn description(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "collaborator temporarily unavailable, worth another attempt",
            ErrorClass::Fatal => "input or trust problem, retrying cannot help",
        }
    }

    pub fn allows_retry(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// Errors that know their own retry class.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_allows_retry() {
        assert!(ErrorClass::Transient.allows_retry());
        assert!(!ErrorClass::Fatal.allows_retry());
    }

    #[test]
    fn test_display_matches_variant() {
        assert_eq!(ErrorClass::Fatal.to_string(), "fatal");
        assert_eq!(ErrorClass::Transient.to_string(), "transient");
        assert_ne!(
            ErrorClass::Transient.description(),
            ErrorClass::Fatal.description()
        );
    }
}
