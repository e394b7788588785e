//! Fintrack is a web app for tracking personal income and expenses.
//!
//! Users sign up with a username and email address, confirm their email via a
//! signed link, and then record income and expense transactions. Transactions
//! are summarised on a dashboard and can be filtered by type, category and
//! date range, either as an HTML page or through a small JSON API.
//!
//! This library provides a REST API that directly serves HTML pages.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use time::Date;
use tokio::signal;

mod alert;
mod app_state;
mod auth;
mod dashboard;
mod db;
mod email;
mod endpoints;
mod html;
mod internal_server_error;
mod logging;
mod navigation;
mod not_found;
mod routing;
mod timezone;
mod transaction;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use auth::{
    InvalidToken, PasswordHash, TokenPurpose, TokenSigner, User, UserID, ValidatedPassword,
};
pub use db::initialize as initialize_db;
pub use email::{Email, FileMailer, MailError, Mailer, SmtpMailer};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::build_router;
pub use timezone::get_local_offset;

use crate::{
    alert::Alert,
    html::error_view,
    internal_server_error::{InternalServerError, get_internal_server_error_response},
    not_found::get_404_not_found_response,
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The session cookie is missing from the cookie jar in the request.
    #[error("no cookies in the cookie jar :(")]
    CookieMissing,

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    /// When communicating with the application client this error should be
    /// replaced with a general error type indicating an internal server error.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// The username is empty or too long.
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// The string is not a valid email address.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// Another account already uses the username.
    #[error("the username is already taken")]
    DuplicateUsername,

    /// Another account already uses the email address.
    #[error("the email address is already registered")]
    DuplicateEmail,

    /// The amount of a transaction is not a finite, non-negative number.
    #[error("\"{0}\" is not a valid amount, enter a number that is zero or greater")]
    InvalidAmount(String),

    /// A transaction was submitted without a category.
    #[error("category cannot be empty")]
    EmptyCategory,

    /// A date in the future was used to create a transaction.
    ///
    /// Transactions record events that have already happened, therefore future
    /// dates are not allowed.
    #[error("{0} is a date in the future, which is not allowed")]
    FutureDate(Date),

    /// A date in a form could not be parsed.
    #[error("\"{0}\" is not a valid date, expected YYYY-MM-DD")]
    InvalidDate(String),

    /// A query parameter for filtering transactions could not be parsed.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The outbound email could not be sent.
    #[error("could not send email: {0}")]
    EmailDispatchError(String),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// An error occurred while serializing a struct as JSON
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// A task on the blocking thread pool panicked or was cancelled.
    #[error("background task failed: {0}")]
    BackgroundTaskError(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    && desc.ends_with("user.username") =>
            {
                Error::DuplicateUsername
            }
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    /// Whether the error was caused by bad input rather than a server fault.
    fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::TooWeak(_)
                | Error::InvalidUsername(_)
                | Error::InvalidEmail(_)
                | Error::DuplicateUsername
                | Error::DuplicateEmail
                | Error::InvalidAmount(_)
                | Error::EmptyCategory
                | Error::FutureDate(_)
                | Error::InvalidDate(_)
                | Error::InvalidFilter(_)
        )
    }

    /// Render the error as an alert fragment for HTMX form submissions.
    fn into_alert_response(self) -> Response {
        match self {
            error if error.is_client_error() => {
                Alert::error("Invalid input", &capitalise(&error.to_string()))
                    .into_response_with_status(StatusCode::BAD_REQUEST)
            }
            Error::InvalidTimezoneError(timezone) => Alert::error(
                "Invalid Timezone Settings",
                &format!(
                    "Could not get local timezone \"{timezone}\". Check your server settings and \
                    ensure the timezone has been set to valid, canonical timezone string"
                ),
            )
            .into_response_with_status(StatusCode::INTERNAL_SERVER_ERROR),
            Error::EmailDispatchError(_) => Alert::error(
                "Could not send email",
                "There was an issue sending the email. Please try again.",
            )
            .into_response_with_status(StatusCode::INTERNAL_SERVER_ERROR),
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                Alert::error(
                    "Something went wrong",
                    "An unexpected error occurred, check the server logs for more details.",
                )
                .into_response_with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Render the error as a JSON object for the API routes.
    fn into_json_response(self) -> Response {
        let status = match &self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::CookieMissing => StatusCode::UNAUTHORIZED,
            error if error.is_client_error() => StatusCode::BAD_REQUEST,
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => get_404_not_found_response(),
            error if error.is_client_error() => (
                StatusCode::BAD_REQUEST,
                error_view(
                    "Bad Request",
                    "400",
                    "Sorry, we could not understand that request.",
                    &capitalise(&error.to_string()),
                ),
            )
                .into_response(),
            Error::InvalidTimezoneError(timezone) => {
                get_internal_server_error_response(InternalServerError {
                    description: "Invalid Timezone Settings",
                    fix: &format!(
                        "Could not get local timezone \"{timezone}\". Check your server settings and \
                    ensure the timezone has been set to valid, canonical timezone string"
                    ),
                })
            }
            Error::DatabaseLockError => get_internal_server_error_response(Default::default()),
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                get_internal_server_error_response(Default::default())
            }
        }
    }
}

/// Upper-case the first character of `text`.
fn capitalise(text: &str) -> String {
    let mut chars = text.chars();

    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
