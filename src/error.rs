//! Defines the app level error type and its conversion to HTTP responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The request did not carry a user identity.
    #[error("missing or invalid user identity")]
    Unauthorized,

    /// A transaction with the same external ID already exists for the user.
    ///
    /// The external transaction ID is the aggregator's identifier for a
    /// booked transaction. Rejecting duplicates keeps repeated syncs of the
    /// same account from storing the same movement twice.
    #[error("a transaction with this external ID already exists")]
    DuplicateTransaction,

    /// The user already has a bank connection for this requisition.
    #[error("the bank connection \"{0}\" already exists")]
    DuplicateConnection(String),

    /// The client sent a plan name outside the supported vocabulary.
    #[error("invalid plan \"{0}\"")]
    InvalidPlan(String),

    /// The client sent a budget period outside the supported vocabulary.
    #[error("invalid period \"{0}\"")]
    InvalidPeriod(String),

    /// A budget was submitted without a category or with a non-positive limit.
    #[error("invalid budget: {0}")]
    InvalidBudget(String),

    /// The user's plan does not allow connecting another bank.
    #[error("the current plan allows at most {limit} connected bank(s)")]
    ConnectionLimitReached {
        /// The maximum number of connections the plan allows.
        limit: usize,
        /// The number of connections currently held.
        current: usize,
    },

    /// The user has not completed the bank consent flow for a requisition
    /// they are trying to finalize.
    #[error("the bank consent flow has not been completed yet")]
    ConsentPending,

    /// The webhook payload's signature did not match the shared secret.
    ///
    /// No state is changed; the billing provider retries delivery on its own
    /// schedule.
    #[error("webhook signature verification failed")]
    InvalidSignature,

    /// A webhook payload of a known type was missing required fields.
    #[error("malformed billing event: {0}")]
    MalformedEvent(String),

    /// The upstream data provider rejected the request with a rate limit.
    ///
    /// Carries the provider's retry hint so the caller can surface it instead
    /// of a generic failure.
    #[error("rate limited by the data provider, retry after {retry_after_seconds} seconds")]
    RateLimited {
        /// Seconds to wait before the provider will accept another request.
        retry_after_seconds: u64,
    },

    /// Any other failure reported by the bank-data provider.
    #[error("bank data provider request failed: {0}")]
    Provider(String),

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("external_id") =>
            {
                Error::DuplicateTransaction
            }
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("requisition_id") =>
            {
                Error::DuplicateConnection(desc.to_owned())
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code = match self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::DuplicateTransaction | Error::DuplicateConnection(_) => StatusCode::CONFLICT,
            Error::InvalidPlan(_)
            | Error::InvalidPeriod(_)
            | Error::InvalidBudget(_)
            | Error::InvalidSignature
            | Error::MalformedEvent(_) => StatusCode::BAD_REQUEST,
            Error::ConnectionLimitReached { .. } => StatusCode::FORBIDDEN,
            Error::ConsentPending => StatusCode::CONFLICT,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            // Any errors that are not handled above are not intended to be
            // shown to the client.
            ref error => {
                tracing::error!("An unexpected error occurred: {}", error);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "An unexpected error occurred" })),
                )
                    .into_response();
            }
        };

        let mut response =
            (status_code, Json(json!({ "error": self.to_string() }))).into_response();

        if let Error::RateLimited {
            retry_after_seconds,
        } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}

#[cfg(test)]
mod error_response_tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::Error;

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let response = Error::RateLimited {
            retry_after_seconds: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("retry-after").unwrap(),
            &"42".parse::<axum::http::HeaderValue>().unwrap()
        );
    }

    #[test]
    fn sql_errors_are_not_shown_to_the_client() {
        let response = Error::SqlError(rusqlite::Error::InvalidQuery).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let error: Error = rusqlite::Error::QueryReturnedNoRows.into();

        assert_eq!(error, Error::NotFound);
    }
}
