//! Pages for requesting a password reset email and for setting a new password
//! with the link from that email.

use std::sync::{Arc, Mutex};

use axum::{
    Form,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use axum_htmx::HxRedirect;
use maud::{Markup, html};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error,
    auth::{
        Notice, NoticeQuery, PasswordHash, TokenPurpose, TokenSigner, User, ValidatedPassword,
        get_token_from_cookies, get_user_by_email, parse_email, update_password,
    },
    email::{Mailer, password_reset_email},
    endpoints::{self, format_endpoint},
    html::{base, link, log_in_register, password_input, submit_button, text_input},
};

const PASSWORD_INPUT_MIN_LENGTH: u8 = 14;

pub const EMAIL_DISPATCH_ERROR_MSG: &str =
    "There was an issue sending the password reset email. Please try again later.";
pub const PASSWORD_MISMATCH_ERROR_MSG: &str = "Passwords do not match.";
const INTERNAL_ERROR_MSG: &str = "An internal error occurred. Please try again later.";

/// The state needed for resetting a password.
#[derive(Debug, Clone)]
pub struct ResetPasswordState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    pub db_connection: Arc<Mutex<Connection>>,
    pub token_signer: TokenSigner,
    /// How long after the request the reset link is accepted.
    pub token_max_age: Duration,
    pub mailer: Arc<dyn Mailer>,
    /// The public URL of the server, used for the link in the reset email.
    pub base_url: String,
}

impl FromRef<AppState> for ResetPasswordState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            db_connection: state.db_connection.clone(),
            token_signer: state.token_signer.clone(),
            token_max_age: state.token_max_age,
            mailer: state.mailer.clone(),
            base_url: state.base_url.clone(),
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<ResetPasswordState> for Key {
    fn from_ref(state: &ResetPasswordState) -> Self {
        state.cookie_key.clone()
    }
}

fn redirect_with_notice(endpoint: &str, notice: Notice) -> String {
    format!("{endpoint}?{}", notice.query())
}

fn hx_redirect_with_notice(endpoint: &str, notice: Notice) -> Response {
    (
        HxRedirect(redirect_with_notice(endpoint, notice)),
        StatusCode::SEE_OTHER,
    )
        .into_response()
}

// ============================================================================
// REQUEST A RESET LINK
// ============================================================================

fn reset_request_form(email: &str, error_message: Option<&str>) -> Markup {
    html! {
        form
            hx-post=(endpoints::RESET_PASSWORD_REQUEST)
            hx-swap="outerHTML"
            hx-indicator="#indicator"
            hx-disabled-elt="#email, #submit-button"
            class="space-y-4 md:space-y-6"
        {
            (text_input("email", "Email", "email", email, error_message))

            (submit_button("Send reset link"))

            p class="text-sm font-light text-gray-500 dark:text-gray-400"
            {
                "Remembered your password? "
                (link(endpoints::LOG_IN, "Log in here"))
            }
        }
    }
}

/// Display the page for requesting a password reset email.
///
/// Users that are already logged in are sent to the dashboard.
pub async fn get_reset_password_request_page(
    jar: PrivateCookieJar,
    Query(notice_query): Query<NoticeQuery>,
) -> Response {
    if get_token_from_cookies(&jar).is_ok() {
        return Redirect::to(endpoints::DASHBOARD_VIEW).into_response();
    }

    let form = html! {
        @if let Some(notice) = notice_query.notice {
            (notice.into_html())
        }

        (reset_request_form("", None))
    };
    let content = log_in_register("Reset your password", &form);

    base("Reset Password", &[], &content).into_response()
}

#[derive(Serialize, Deserialize)]
pub struct ResetRequestForm {
    pub email: String,
}

/// Email a password reset link to the account registered with the submitted email address.
///
/// Redirects to the log-in page with a notice saying whether an email was sent.
/// If the email could not be sent, the form is returned with an error message.
pub async fn post_reset_password_request(
    State(state): State<ResetPasswordState>,
    Form(form): Form<ResetRequestForm>,
) -> Response {
    let email = match parse_email(&form.email) {
        Ok(email) => email,
        Err(error) => {
            return reset_request_form(&form.email, Some(&error.to_string())).into_response();
        }
    };

    let user_result = match state.db_connection.lock() {
        Ok(connection) => get_user_by_email(email.as_str(), &connection),
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            Err(Error::DatabaseLockError)
        }
    };

    let user = match user_result {
        Ok(user) => user,
        Err(Error::NotFound) => {
            return hx_redirect_with_notice(endpoints::LOG_IN, Notice::NoAccount);
        }
        Err(error) => {
            tracing::error!("Could not look up user for password reset: {error}");
            return reset_request_form(&form.email, Some(INTERNAL_ERROR_MSG)).into_response();
        }
    };

    let send_result = tokio::task::spawn_blocking(move || send_reset_email(&user, &state))
        .await
        .unwrap_or_else(|error| Err(Error::BackgroundTaskError(error.to_string())));

    match send_result {
        Ok(()) => hx_redirect_with_notice(endpoints::LOG_IN, Notice::ResetSent),
        Err(error) => {
            tracing::error!("Could not send password reset email: {error}");
            reset_request_form(&form.email, Some(EMAIL_DISPATCH_ERROR_MSG)).into_response()
        }
    }
}

fn send_reset_email(user: &User, state: &ResetPasswordState) -> Result<(), Error> {
    let token = state
        .token_signer
        .issue(&user.email, TokenPurpose::ResetPassword);
    let reset_url = format!(
        "{}{}",
        state.base_url,
        format_endpoint(endpoints::RESET_PASSWORD, &token)
    );

    state
        .mailer
        .send(&password_reset_email(&user.email, &user.username, &reset_url))
        .map_err(|error| Error::EmailDispatchError(error.to_string()))
}

// ============================================================================
// SET A NEW PASSWORD
// ============================================================================

/// The messages shown next to each field when a new password is rejected.
#[derive(Debug, Default)]
struct ResetErrors {
    password: Option<String>,
    confirm_password: Option<String>,
    form: Option<String>,
}

fn reset_password_form(token: &str, errors: &ResetErrors) -> Markup {
    html! {
        form
            hx-post=(format_endpoint(endpoints::RESET_PASSWORD, token))
            hx-swap="outerHTML"
            hx-indicator="#indicator"
            hx-disabled-elt="#submit-button"
            class="space-y-4 md:space-y-6"
        {
            (password_input(
                "password",
                "New Password",
                PASSWORD_INPUT_MIN_LENGTH,
                errors.password.as_deref(),
            ))
            (password_input(
                "confirm_password",
                "Confirm New Password",
                PASSWORD_INPUT_MIN_LENGTH,
                errors.confirm_password.as_deref(),
            ))

            @if let Some(error_message) = &errors.form {
                p class="text-red-500 text-base" role="alert" { (error_message) }
            }

            (submit_button("Update password"))
        }
    }
}

/// Look up the account that the reset token was issued for.
///
/// Returns `Ok(None)` if the token is invalid or has expired.
fn find_user_for_token(token: &str, state: &ResetPasswordState) -> Result<Option<User>, Error> {
    let email = match state
        .token_signer
        .verify(token, TokenPurpose::ResetPassword, state.token_max_age)
    {
        Ok(email) => email,
        Err(error) => {
            tracing::debug!("Rejected password reset token: {error}");
            return Ok(None);
        }
    };

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_user_by_email(&email, &connection).map(Some)
}

/// Display the form for choosing a new password.
///
/// Invalid or expired links are redirected to the reset request page.
///
/// # Errors
///
/// Returns [Error::NotFound] if no account uses the email address in the token.
pub async fn get_reset_password_page(
    State(state): State<ResetPasswordState>,
    jar: PrivateCookieJar,
    Path(token): Path<String>,
) -> Result<Response, Error> {
    if get_token_from_cookies(&jar).is_ok() {
        return Ok(Redirect::to(endpoints::DASHBOARD_VIEW).into_response());
    }

    if find_user_for_token(&token, &state)?.is_none() {
        return Ok(Redirect::to(&redirect_with_notice(
            endpoints::RESET_PASSWORD_REQUEST,
            Notice::InvalidResetLink,
        ))
        .into_response());
    }

    let form = reset_password_form(&token, &ResetErrors::default());
    let content = log_in_register("Choose a new password", &form);

    Ok(base("Reset Password", &[], &content).into_response())
}

#[derive(Serialize, Deserialize)]
pub struct ResetPasswordForm {
    pub password: String,
    pub confirm_password: String,
}

/// Set a new password for the account the reset token was issued for.
///
/// The old password is not required, holding a valid link is enough.
/// On success the client is redirected to the log-in page.
pub async fn post_reset_password(
    State(state): State<ResetPasswordState>,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> Response {
    let render_error = |errors: ResetErrors| reset_password_form(&token, &errors).into_response();

    let user = match find_user_for_token(&token, &state) {
        Ok(Some(user)) => user,
        Ok(None) => {
            return hx_redirect_with_notice(
                endpoints::RESET_PASSWORD_REQUEST,
                Notice::InvalidResetLink,
            );
        }
        Err(error) => return error.into_alert_response(),
    };

    if form.password != form.confirm_password {
        return render_error(ResetErrors {
            confirm_password: Some(PASSWORD_MISMATCH_ERROR_MSG.to_owned()),
            ..Default::default()
        });
    }

    let password = match ValidatedPassword::new(&form.password, &[&user.username, &user.email])
    {
        Ok(password) => password,
        Err(error) => {
            return render_error(ResetErrors {
                password: Some(error.to_string()),
                ..Default::default()
            });
        }
    };

    let db_connection = state.db_connection.clone();
    let user_id = user.id;
    let result = tokio::task::spawn_blocking(move || {
        let password_hash = PasswordHash::new(password, PasswordHash::DEFAULT_COST)?;
        let connection = db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        update_password(user_id, &password_hash, &connection)
    })
    .await
    .unwrap_or_else(|error| Err(Error::BackgroundTaskError(error.to_string())));

    match result {
        Ok(()) => {
            tracing::info!("Updated password for user {user_id}");
            hx_redirect_with_notice(endpoints::LOG_IN, Notice::PasswordUpdated)
        }
        Err(error) => {
            tracing::error!("Could not update password: {error}");
            render_error(ResetErrors {
                form: Some(INTERNAL_ERROR_MSG.to_owned()),
                ..Default::default()
            })
        }
    }
}
