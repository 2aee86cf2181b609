// Session lifecycle error types

use std::fmt;

use crate::engine::SessionId;

/// Errors from tracking-session lifecycle operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The page-load session was already started for this process.
    PageLoadAlreadyStarted,

    /// The referenced session is not active (already ended or superseded).
    NotActive { session: SessionId },

    /// The navigation detector was already installed.
    DetectorAlreadyInstalled,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PageLoadAlreadyStarted => {
                write!(f, "page-load session already started for this process")
            }
            SessionError::NotActive { session } => {
                write!(f, "session {} is not active", session)
            }
            SessionError::DetectorAlreadyInstalled => {
                write!(f, "navigation detector already installed")
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert!(SessionError::PageLoadAlreadyStarted
            .to_string()
            .contains("already started"));
        assert!(SessionError::NotActive {
            session: SessionId(3)
        }
        .to_string()
        .contains("not active"));
    }
}
