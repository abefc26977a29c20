//! Reply status classification
//!
//! The single place where the retry-versus-surface decision is made.

use std::fmt;

/// Outcome of a reply status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Status 0: the command was executed
    Success,
    /// Negative status: the line was not ready, send the command again
    Transient,
    /// Positive status: the device rejected the command
    Fatal(i32),
}

impl Classification {
    /// Whether the same command should be sent again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal(code) => write!(f, "fatal({})", code),
        }
    }
}

/// Classify a reply status code
pub fn classify(status: i32) -> Classification {
    match status {
        0 => Classification::Success,
        s if s < 0 => Classification::Transient,
        s => Classification::Fatal(s),
    }
}
