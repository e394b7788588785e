//! The sign-up page and the handler that creates an unverified account and
//! emails the link for confirming its address.

use std::sync::Arc;

use axum::{
    Form,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use axum_htmx::HxRedirect;
use email_address::EmailAddress;
use maud::{Markup, html};
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    auth::{
        Notice, PasswordHash, TokenPurpose, TokenSigner, User, Username, ValidatedPassword,
        create_user, get_token_from_cookies, parse_email,
    },
    db,
    email::{Mailer, confirmation_email},
    endpoints::{self, format_endpoint},
    html::{base, link, log_in_register, password_input, submit_button, text_input},
};

/// The minimum number of characters the password should have to be considered valid on the client side (server-side validation is done on top of this validation).
const PASSWORD_INPUT_MIN_LENGTH: u8 = 14;

pub const DUPLICATE_USERNAME_ERROR_MSG: &str = "That username is already taken.";
pub const DUPLICATE_EMAIL_ERROR_MSG: &str = "An account with that email address already exists.";
pub const PASSWORD_MISMATCH_ERROR_MSG: &str = "Passwords do not match.";
pub const EMAIL_DISPATCH_ERROR_MSG: &str =
    "There was an issue sending a confirmation email. Please try again later.";
const INTERNAL_ERROR_MSG: &str = "An internal error occurred. Please try again later.";

/// The messages shown next to each field when a sign-up is rejected.
#[derive(Debug, Default)]
struct SignUpErrors {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    confirm_password: Option<String>,
    form: Option<String>,
}

fn sign_up_form(username: &str, email: &str, errors: &SignUpErrors) -> Markup {
    html! {
        form
            hx-post=(endpoints::SIGN_UP)
            hx-swap="outerHTML"
            hx-indicator="#indicator"
            hx-disabled-elt="#submit-button"
            class="space-y-4 md:space-y-6"
        {
            (text_input("username", "Username", "text", username, errors.username.as_deref()))
            (text_input("email", "Email", "email", email, errors.email.as_deref()))
            (password_input(
                "password",
                "Password",
                PASSWORD_INPUT_MIN_LENGTH,
                errors.password.as_deref(),
            ))
            (password_input(
                "confirm_password",
                "Confirm Password",
                PASSWORD_INPUT_MIN_LENGTH,
                errors.confirm_password.as_deref(),
            ))

            @if let Some(error_message) = &errors.form {
                p class="text-red-500 text-base" role="alert" { (error_message) }
            }

            (submit_button("Sign up"))

            p class="text-sm font-light text-gray-500 dark:text-gray-400"
            {
                "Already have an account? "
                (link(endpoints::LOG_IN, "Log in here"))
            }
        }
    }
}

/// Display the sign-up page.
///
/// Users that are already logged in are sent to the dashboard.
pub async fn get_sign_up_page(jar: PrivateCookieJar) -> Response {
    if get_token_from_cookies(&jar).is_ok() {
        return Redirect::to(endpoints::DASHBOARD_VIEW).into_response();
    }

    let form = sign_up_form("", "", &SignUpErrors::default());
    let content = log_in_register("Create an account", &form);

    base("Sign Up", &[], &content).into_response()
}

/// The state needed for creating a new user.
#[derive(Debug, Clone)]
pub struct SignUpState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    /// Where the database lives. Each sign-up opens its own connection so the
    /// shared one is free while the confirmation email is sent.
    pub db_path: String,
    pub token_signer: TokenSigner,
    pub mailer: Arc<dyn Mailer>,
    /// The public URL of the server, used for the link in the confirmation email.
    pub base_url: String,
}

impl FromRef<AppState> for SignUpState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            db_path: state.db_path.clone(),
            token_signer: state.token_signer.clone(),
            mailer: state.mailer.clone(),
            base_url: state.base_url.clone(),
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<SignUpState> for Key {
    fn from_ref(state: &SignUpState) -> Self {
        state.cookie_key.clone()
    }
}

/// The raw data entered by the user in the sign-up form.
#[derive(Serialize, Deserialize)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Create an unverified user and send them an email confirmation link.
///
/// The user is inserted in a database transaction that is only committed once
/// the email has been handed to the mailer, so a failed send leaves no account
/// behind. The client is redirected to the log-in page on success. Otherwise,
/// the form is returned with error messages.
pub async fn post_sign_up(
    State(state): State<SignUpState>,
    Form(user_data): Form<SignUpForm>,
) -> Response {
    let render_error = |errors: SignUpErrors| {
        sign_up_form(&user_data.username, &user_data.email, &errors).into_response()
    };

    let username = match Username::new(&user_data.username) {
        Ok(username) => username,
        Err(error) => {
            return render_error(SignUpErrors {
                username: Some(error.to_string()),
                ..Default::default()
            });
        }
    };

    let email = match parse_email(&user_data.email) {
        Ok(email) => email,
        Err(error) => {
            return render_error(SignUpErrors {
                email: Some(error.to_string()),
                ..Default::default()
            });
        }
    };

    let password = match ValidatedPassword::new(
        &user_data.password,
        &[username.as_ref(), email.as_str()],
    ) {
        Ok(password) => password,
        Err(error) => {
            return render_error(SignUpErrors {
                password: Some(error.to_string()),
                ..Default::default()
            });
        }
    };

    if user_data.password != user_data.confirm_password {
        return render_error(SignUpErrors {
            confirm_password: Some(PASSWORD_MISMATCH_ERROR_MSG.to_owned()),
            ..Default::default()
        });
    }

    // Hashing and the SQLite transaction both block, and the transaction
    // cannot be held across an await point.
    let result = tokio::task::spawn_blocking(move || {
        let password_hash = PasswordHash::new(password, PasswordHash::DEFAULT_COST)?;
        create_user_and_send_confirmation(&username, &email, password_hash, &state)
    })
    .await
    .unwrap_or_else(|error| Err(Error::BackgroundTaskError(error.to_string())));

    match result {
        Ok(user) => {
            tracing::info!("Created user {} with ID {}", user.username, user.id);

            (
                HxRedirect(format!("{}?{}", endpoints::LOG_IN, Notice::CheckEmail.query())),
                StatusCode::SEE_OTHER,
            )
                .into_response()
        }
        Err(Error::DuplicateUsername) => render_error(SignUpErrors {
            username: Some(DUPLICATE_USERNAME_ERROR_MSG.to_owned()),
            ..Default::default()
        }),
        Err(Error::DuplicateEmail) => render_error(SignUpErrors {
            email: Some(DUPLICATE_EMAIL_ERROR_MSG.to_owned()),
            ..Default::default()
        }),
        Err(Error::EmailDispatchError(error)) => {
            tracing::error!("Could not send confirmation email: {error}");
            render_error(SignUpErrors {
                form: Some(EMAIL_DISPATCH_ERROR_MSG.to_owned()),
                ..Default::default()
            })
        }
        Err(error) => {
            tracing::error!("Could not create user: {error}");
            render_error(SignUpErrors {
                form: Some(INTERNAL_ERROR_MSG.to_owned()),
                ..Default::default()
            })
        }
    }
}

fn create_user_and_send_confirmation(
    username: &Username,
    email: &EmailAddress,
    password_hash: PasswordHash,
    state: &SignUpState,
) -> Result<User, Error> {
    let mut connection = db::open(&state.db_path)
        .inspect_err(|error| tracing::error!("could not open database connection: {error}"))?;
    let transaction = connection.transaction()?;

    let user = create_user(username, email, password_hash, &transaction)?;

    let token = state
        .token_signer
        .issue(&user.email, TokenPurpose::ConfirmEmail);
    let confirm_url = format!(
        "{}{}",
        state.base_url,
        format_endpoint(endpoints::CONFIRM_EMAIL, &token)
    );

    state
        .mailer
        .send(&confirmation_email(&user.email, &user.username, &confirm_url))
        .map_err(|error| Error::EmailDispatchError(error.to_string()))?;

    transaction.commit()?;

    Ok(user)
}
