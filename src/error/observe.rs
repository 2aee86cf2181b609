// Observation feed error types

use std::fmt;

use log::warn;

use crate::feed::ObservationCategory;

/// Errors surfaced by the observation feed.
///
/// A registration failure means the host does not support that observation
/// category; the affected metric simply stays unset for the session. An
/// inspection failure means a node could not be examined; classification
/// collapses it to the conservative verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserveError {
    /// The host does not support this observation category.
    FeatureUnavailable { category: ObservationCategory },

    /// Geometry/style/ancestor inspection failed mid-check.
    Inspection { reason: String },

    /// The feed rejected the subscription for a host-specific reason.
    SubscriptionRejected { reason: String },
}

impl ObserveError {
    pub fn unavailable(category: ObservationCategory) -> Self {
        ObserveError::FeatureUnavailable { category }
    }
}

impl fmt::Display for ObserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObserveError::FeatureUnavailable { category } => {
                write!(f, "observation category {} not available", category.as_str())
            }
            ObserveError::Inspection { reason } => {
                write!(f, "node inspection failed: {}", reason)
            }
            ObserveError::SubscriptionRejected { reason } => {
                write!(f, "subscription rejected: {}", reason)
            }
        }
    }
}

impl std::error::Error for ObserveError {}

impl From<crate::dom::InspectError> for ObserveError {
    fn from(err: crate::dom::InspectError) -> Self {
        ObserveError::Inspection { reason: err.reason }
    }
}

/// Log an observation error with its originating context.
///
/// Registration failures are expected on hosts with partial support, so this
/// logs at warn once per call site rather than erroring.
pub fn log_observe_error(err: &ObserveError, context: &str) {
    warn!("[ObservationFeed] {} in {}", err, context);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ObserveError::unavailable(ObservationCategory::LongTask);
        assert!(err.to_string().contains("longtask"));

        let err = ObserveError::Inspection {
            reason: "node detached".to_string(),
        };
        assert!(err.to_string().contains("node detached"));
    }

    #[test]
    fn test_from_inspect_error() {
        let inspect = crate::dom::InspectError::new("style query refused");
        let err: ObserveError = inspect.into();
        match err {
            ObserveError::Inspection { reason } => {
                assert!(reason.contains("style query refused"));
            }
            other => panic!("Expected Inspection, got {:?}", other),
        }
    }
}
