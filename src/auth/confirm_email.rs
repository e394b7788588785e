//! The route that consumes the link from the email sent after sign-up.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, Path, State},
    response::{IntoResponse, Redirect, Response},
};
use rusqlite::Connection;
use time::Duration;

use crate::{
    AppState, Error,
    auth::{Notice, TokenPurpose, TokenSigner, get_user_by_email, mark_email_verified},
    endpoints,
};

/// The state needed to confirm an email address.
#[derive(Debug, Clone)]
pub struct ConfirmEmailState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub token_signer: TokenSigner,
    /// How long after sign-up the confirmation link is accepted.
    pub token_max_age: Duration,
}

impl FromRef<AppState> for ConfirmEmailState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            token_signer: state.token_signer.clone(),
            token_max_age: state.token_max_age,
        }
    }
}

fn log_in_with_notice(notice: Notice) -> Response {
    Redirect::to(&format!("{}?{}", endpoints::LOG_IN, notice.query())).into_response()
}

/// Mark the account the token was issued for as verified and redirect to the log-in page.
///
/// Invalid or expired tokens are redirected to the log-in page with a notice.
/// Confirming an account a second time is allowed and has no effect.
///
/// # Errors
///
/// Returns [Error::NotFound] if no account uses the email address in the token.
pub async fn get_confirm_email(
    State(state): State<ConfirmEmailState>,
    Path(token): Path<String>,
) -> Result<Response, Error> {
    let email = match state.token_signer.verify(
        &token,
        TokenPurpose::ConfirmEmail,
        state.token_max_age,
    ) {
        Ok(email) => email,
        Err(error) => {
            tracing::debug!("Rejected email confirmation token: {error}");
            return Ok(log_in_with_notice(Notice::InvalidConfirmation));
        }
    };

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let user = get_user_by_email(&email, &connection)?;

    if user.email_verified {
        return Ok(log_in_with_notice(Notice::AlreadyConfirmed));
    }

    mark_email_verified(user.id, &connection)?;
    tracing::info!("Confirmed email address for user {}", user.id);

    Ok(log_in_with_notice(Notice::Confirmed))
}
