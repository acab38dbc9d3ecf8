//! Error types for the `delivery` layer.
//!
//! Errors from the `status` and `broker` crates are translated here into the
//! kinds producers and the web layer act on. Transport failures on individual
//! client handles never become errors; they are contained in the registries.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// A lifecycle rule was violated; nothing was applied.
    InvalidTransition,
    /// The resource is unknown to both the cache and the store.
    NotFound,
    /// The caller may not open, join or produce on this target.
    Unauthorized,
    /// The fan-out broker could not be reached.
    BrokerUnavailable,
    /// The external store failed.
    Store,
    Internal,
}

impl Error {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            source: Some(message.into()),
            error_kind: ErrorKind::Unauthorized,
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            source: Some(message.into()),
            error_kind: ErrorKind::InvalidTransition,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Delivery error {:?}: {}", self.error_kind, source),
            None => write!(f, "Delivery error {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<status::Error> for Error {
    fn from(err: status::Error) -> Self {
        let error_kind = match err.error_kind {
            status::ErrorKind::InvalidTransition => ErrorKind::InvalidTransition,
            status::ErrorKind::NotFound => ErrorKind::NotFound,
            status::ErrorKind::Store => ErrorKind::Store,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<broker::Error> for Error {
    fn from(err: broker::Error) -> Self {
        let error_kind = match err.error_kind {
            broker::ErrorKind::Unavailable => ErrorKind::BrokerUnavailable,
            broker::ErrorKind::Serialization => ErrorKind::Internal,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_keep_their_kind() {
        let err: Error = status::Error::invalid_transition("confirmed to delivered").into();
        assert_eq!(err.error_kind, ErrorKind::InvalidTransition);
        assert!(err.to_string().contains("confirmed to delivered"));

        let err: Error = status::Error::not_found("O9").into();
        assert_eq!(err.error_kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_broker_outage_maps_to_broker_unavailable() {
        let err: Error = broker::Error::unavailable("connection refused").into();
        assert_eq!(err.error_kind, ErrorKind::BrokerUnavailable);
    }
}
