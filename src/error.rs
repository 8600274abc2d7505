//! Error types for regionwatch.
//!
//! Errors are layered the same way the monitoring flow is: adapters report
//! [`AdapterError`]s, the registration join wraps the first one it sees in a
//! [`RegistrationError`], and everything surfaces to the consumer as a
//! [`WatchError`].

use thiserror::Error;

use crate::adapters::AuthorizationStatus;

/// Errors reported by a region or predicate store adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("{capability} is not authorized")]
    Unauthorized {
        capability: String,
    },

    #[error("{capability} is unavailable: {reason}")]
    Unavailable {
        capability: String,
        reason: String,
    },

    #[error("Monitored region limit of {limit} exceeded")]
    RegionLimitExceeded {
        limit: usize,
    },

    #[error("Platform error (code {code}): {message}")]
    Platform {
        code: i64,
        message: String,
    },

    #[error("Adapter channel disconnected: {path}")]
    Disconnected {
        path: String,
    },
}

impl AdapterError {
    /// Creates a platform error.
    #[must_use]
    pub fn platform(code: i64, message: impl Into<String>) -> Self {
        Self::Platform {
            code,
            message: message.into(),
        }
    }
}

/// A region or notification request failed to register.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Region '{identifier}' failed to start monitoring: {source}")]
    Region {
        identifier: String,
        #[source]
        source: AdapterError,
    },

    #[error("Notification request '{identifier}' failed to schedule: {source}")]
    Request {
        identifier: String,
        #[source]
        source: AdapterError,
    },
}

impl RegistrationError {
    /// Identifier of the region or request that failed.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Region { identifier, .. } | Self::Request { identifier, .. } => identifier,
        }
    }

    /// The adapter's underlying error.
    #[must_use]
    pub const fn adapter_error(&self) -> &AdapterError {
        match self {
            Self::Region { source, .. } | Self::Request { source, .. } => source,
        }
    }
}

/// Validation errors raised while building model values or configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate {
        latitude: f64,
        longitude: f64,
    },

    #[error("Circle radius must be positive, got {radius}")]
    NonPositiveRadius {
        radius: f64,
    },

    #[error("Presentation title cannot be empty")]
    EmptyPresentationTitle,

    #[error("Invalid predicate identifier: {value}")]
    InvalidPredicateId {
        value: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors raised by a running (or stopping) monitoring session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Monitoring failed for region {region:?}: {source}")]
    MonitoringFailed {
        region: Option<String>,
        #[source]
        source: AdapterError,
    },

    #[error("A monitoring session is already active")]
    AlreadyActive,
}

/// Top-level error type for regionwatch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WatchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("{capability} unavailable (authorization: {status:?})")]
    AdapterUnavailable {
        capability: String,
        status: AuthorizationStatus,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl WatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a registration failed during setup.
    #[must_use]
    pub const fn is_registration(&self) -> bool {
        matches!(self, Self::Registration(_))
    }

    /// Returns true if this is a session error.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Returns true if an adapter capability is not available.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::AdapterUnavailable { .. })
    }

    /// Returns true if re-issuing the same call may succeed without consumer changes.
    ///
    /// Nothing is retried by the engine itself.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::AdapterUnavailable { .. } | Self::Internal { .. } => false,
            Self::Registration(e) => match e {
                RegistrationError::Region { source, .. }
                | RegistrationError::Request { source, .. } => {
                    matches!(source, AdapterError::Platform { .. } | AdapterError::Disconnected { .. })
                }
            },
            Self::Adapter(e) => matches!(
                e,
                AdapterError::Platform { .. } | AdapterError::Disconnected { .. }
            ),
            Self::Session(e) => matches!(
                e,
                SessionError::Timeout { .. } | SessionError::MonitoringFailed { .. }
            ),
        }
    }
}

/// Result type alias for regionwatch operations.
pub type WatchResult<T> = Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_error_carries_identity() {
        let err = RegistrationError::Region {
            identifier: "circle:1.000000,2.000000:50".to_string(),
            source: AdapterError::RegionLimitExceeded { limit: 20 },
        };
        assert_eq!(err.identifier(), "circle:1.000000,2.000000:50");
        assert_eq!(
            err.adapter_error(),
            &AdapterError::RegionLimitExceeded { limit: 20 }
        );
        let msg = err.to_string();
        assert!(msg.contains("circle:1.000000,2.000000:50"));
        assert!(msg.contains("limit of 20"));
    }

    #[test]
    fn test_validation_error_radius() {
        let err = ValidationError::NonPositiveRadius { radius: -3.0 };
        assert!(err.to_string().contains("-3"));
    }

    #[test]
    fn test_watch_error_from_registration() {
        let err: WatchError = RegistrationError::Request {
            identifier: "r".to_string(),
            source: AdapterError::platform(1, "busy"),
        }
        .into();
        assert!(err.is_registration());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_limit_exceeded_is_not_retryable() {
        let err: WatchError = RegistrationError::Region {
            identifier: "r".to_string(),
            source: AdapterError::RegionLimitExceeded { limit: 20 },
        }
        .into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_watch_error_unavailable() {
        let err = WatchError::AdapterUnavailable {
            capability: "region monitoring".to_string(),
            status: AuthorizationStatus::Denied,
        };
        assert!(err.is_unavailable());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Denied"));
    }

    #[test]
    fn test_watch_error_internal() {
        let err = WatchError::internal("poisoned lock");
        assert!(!err.is_validation());
        assert!(err.to_string().contains("poisoned lock"));
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::Timeout { duration_ms: 2000 };
        assert!(err.to_string().contains("2000ms"));
        let err: WatchError = SessionError::AlreadyActive.into();
        assert!(err.is_session());
    }
}
