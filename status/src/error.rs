//! Error types for the `status` crate.
//!
//! Follows the same pattern as the other layers: a root Error struct holding an
//! error kind and an optional source for chaining.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// A lifecycle state machine rule was violated.
    InvalidTransition,
    /// Neither the cache nor the external store knows the resource.
    NotFound,
    /// The external store failed to answer.
    Store,
}

impl Error {
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            source: Some(message.into()),
            error_kind: ErrorKind::InvalidTransition,
        }
    }

    pub fn not_found(resource_id: &str) -> Self {
        Self {
            source: Some(format!("resource {resource_id} not found").into()),
            error_kind: ErrorKind::NotFound,
        }
    }

    pub fn store(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: Some(source.into()),
            error_kind: ErrorKind::Store,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Status error {:?}: {}", self.error_kind, source),
            None => write!(f, "Status error {:?}", self.error_kind),
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
