use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use delivery::{Error as DeliveryError, ErrorKind};

extern crate log;
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(DeliveryError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self.0.error_kind {
            ErrorKind::InvalidTransition => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::BrokerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Store | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
            // Internal details stay in the log.
            return (status, status.canonical_reason().unwrap_or_default().to_string())
                .into_response();
        }
        debug!("Request rejected: {}", self.0);
        (status, self.0.to_string()).into_response()
    }
}

impl<E> From<E> for Error
where
    E: Into<DeliveryError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
