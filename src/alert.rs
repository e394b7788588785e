//! Alert messages for reporting the outcome of HTMX form submissions.
//!
//! Forms target `#alert-container` for error responses (see `hx-target-error`),
//! so an alert replaces the contents of that container in the base layout.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use maud::{Markup, html};

/// Alert message types for styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    Success,
    Error,
}

/// A dismissible message with a short heading and optional details.
#[derive(Debug, Clone)]
pub struct Alert<'a> {
    pub alert_type: AlertType,
    pub message: &'a str,
    pub details: &'a str,
}

impl<'a> Alert<'a> {
    /// Create a new success alert
    pub fn success(message: &'a str, details: &'a str) -> Self {
        Self {
            alert_type: AlertType::Success,
            message,
            details,
        }
    }

    /// Create a new error alert
    pub fn error(message: &'a str, details: &'a str) -> Self {
        Self {
            alert_type: AlertType::Error,
            message,
            details,
        }
    }

    pub fn into_html(self) -> Markup {
        let style = match self.alert_type {
            AlertType::Success => {
                "p-4 mb-4 text-sm rounded-lg text-green-800 bg-green-50 \
                dark:bg-gray-800 dark:text-green-400"
            }
            AlertType::Error => {
                "p-4 mb-4 text-sm rounded-lg text-red-800 bg-red-50 \
                dark:bg-gray-800 dark:text-red-400"
            }
        };

        html! {
            div
                role="alert"
                class=(style)
                data-alert-type=(match self.alert_type {
                    AlertType::Success => "success",
                    AlertType::Error => "error",
                })
            {
                span class="font-semibold" { (self.message) }

                @if !self.details.is_empty() {
                    p { (self.details) }
                }
            }
        }
    }

    /// Render the alert with `status`, making the alert container visible.
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let markup = html! {
            (self.into_html())
            script { "document.getElementById('alert-container').classList.remove('hidden');" }
        };

        (status, markup).into_response()
    }
}
