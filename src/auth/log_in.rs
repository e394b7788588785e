//! This file defines the routes for displaying the log-in page and handling log-in requests.
//! The auth module handles the lower level authentication and cookie auth logic.

use std::sync::{Arc, LazyLock, Mutex};

use axum::{
    Form,
    extract::{FromRef, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use axum_htmx::HxRedirect;
use bcrypt::BcryptError;
use maud::{Markup, html};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error,
    auth::{
        Notice, NoticeQuery, PasswordHash, User, ValidatedPassword, get_token_from_cookies,
        get_user_by_username, invalidate_auth_cookie, parse_redirect_url, set_auth_cookie,
    },
    endpoints,
    html::{LINK_STYLE, base, link, log_in_register, password_input, submit_button, text_input},
    internal_server_error::get_internal_server_error_redirect,
};

fn log_in_form(username: &str, error_message: Option<&str>, redirect_url: Option<&str>) -> Markup {
    html! {
        form
            hx-post=(endpoints::LOG_IN)
            hx-swap="outerHTML"
            hx-indicator="#indicator"
            hx-disabled-elt="#username, #password, #submit-button"
            class="space-y-4 md:space-y-6"
        {
            @if let Some(redirect_url) = redirect_url {
                input type="hidden" name="next" value=(redirect_url);
            }

            (text_input("username", "Username", "text", username, None))
            (password_input("password", "Password", 0, error_message))

            div class="flex items-center gap-x-3"
            {
                input
                    type="checkbox"
                    name="remember_me"
                    id="remember_me"
                    tabindex="0"
                    class="rounded-xs";

                label
                    for="remember_me"
                    class="block text-sm font-medium text-gray-900 dark:text-white"
                {
                    "Keep me logged in for one week"
                }
            }

            (submit_button("Log in"))

            p class="text-sm font-light text-gray-500 dark:text-gray-400"
            {
                "Forgot your password? "
                a href=(endpoints::RESET_PASSWORD_REQUEST) tabindex="0" class=(LINK_STYLE)
                {
                    "Reset it here"
                }
            }

            p class="text-sm font-light text-gray-500 dark:text-gray-400"
            {
                "Don't have an account? "
                (link(endpoints::SIGN_UP, "Sign up here"))
            }
        }
    }
}

fn log_in_view(notice: Option<Notice>, redirect_url: Option<&str>) -> Markup {
    let form = html! {
        @if let Some(notice) = notice {
            (notice.into_html())
        }

        (log_in_form("", None, redirect_url))
    };
    let content = log_in_register("Log in to your account", &form);

    base("Log In", &[], &content)
}

/// The query string for the log-in page.
#[derive(Deserialize)]
pub struct RedirectQuery {
    /// The page to return to after logging in.
    pub next: Option<String>,
}

/// Display the log-in page.
///
/// Users that are already logged in are sent to the dashboard.
pub async fn get_log_in_page(
    jar: PrivateCookieJar,
    Query(query): Query<RedirectQuery>,
    Query(notice_query): Query<NoticeQuery>,
) -> Response {
    if get_token_from_cookies(&jar).is_ok() {
        return Redirect::to(endpoints::DASHBOARD_VIEW).into_response();
    }

    let redirect_url = parse_redirect_url(query.next.as_deref(), "log-in query");

    log_in_view(notice_query.notice, redirect_url.as_deref()).into_response()
}

/// How long the auth cookie should last if the user selects "remember me" at log-in.
const REMEMBER_ME_COOKIE_DURATION: Duration = Duration::days(7);

/// The state needed to perform a login.
#[derive(Debug, Clone)]
pub struct LoginState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    /// The duration for which cookies used for authentication are valid.
    pub cookie_duration: Duration,
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for LoginState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            cookie_duration: state.cookie_duration,
            db_connection: state.db_connection.clone(),
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<LoginState> for Key {
    fn from_ref(state: &LoginState) -> Self {
        state.cookie_key.clone()
    }
}

pub const INVALID_CREDENTIALS_ERROR_MSG: &str = "Invalid username or password.";
pub const EMAIL_NOT_VERIFIED_ERROR_MSG: &str = "Please verify your email before logging in.";
const INTERNAL_ERROR_MSG: &str = "An internal error occurred. Please try again later.";

/// Handler for log-in requests via the POST method.
///
/// On a successful log-in request, the auth cookie is set and the client is
/// redirected to the page in the form's `next` field, or the dashboard page.
/// Otherwise, the form is returned with an error message explaining the problem.
///
/// An unknown username and an incorrect password produce the same message.
/// Users must confirm their email address before they can log in.
pub async fn post_log_in(
    State(state): State<LoginState>,
    jar: PrivateCookieJar,
    Form(user_data): Form<LogInData>,
) -> Response {
    let redirect_url = parse_redirect_url(user_data.next.as_deref(), "log-in form");
    let redirect_url = redirect_url.as_deref();
    let username = user_data.username.trim();
    let render_error =
        |message: &str| log_in_form(username, Some(message), redirect_url).into_response();

    let user_result = match state.db_connection.lock() {
        Ok(connection) => get_user_by_username(username, &connection),
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            Err(Error::DatabaseLockError)
        }
    };

    let user = match user_result {
        Ok(user) => Some(user),
        Err(Error::NotFound) => {
            tracing::debug!("Log-in attempt for unknown username {username:?}");
            None
        }
        Err(error) => {
            tracing::error!("Unhandled error while verifying credentials: {error}");
            return render_error(INTERNAL_ERROR_MSG);
        }
    };

    let password_matches = check_password(user.as_ref(), &user_data.password);
    let user: User = match (user, password_matches) {
        (Some(user), Ok(true)) => user,
        (_, Ok(_)) => return render_error(INVALID_CREDENTIALS_ERROR_MSG),
        (_, Err(error)) => {
            tracing::error!("Unhandled error while verifying credentials: {error}");
            return render_error(INTERNAL_ERROR_MSG);
        }
    };

    if !user.email_verified {
        return render_error(EMAIL_NOT_VERIFIED_ERROR_MSG);
    }

    let cookie_duration = if user_data.remember_me.is_some() {
        REMEMBER_ME_COOKIE_DURATION
    } else {
        state.cookie_duration
    };

    let redirect_url = redirect_url.unwrap_or(endpoints::DASHBOARD_VIEW);

    set_auth_cookie(jar.clone(), user.id, cookie_duration)
        .map(|updated_jar| {
            (
                StatusCode::SEE_OTHER,
                HxRedirect(redirect_url.to_owned()),
                updated_jar,
            )
        })
        .map_err(|err| {
            tracing::error!("Error setting auth cookie: {err}");
            (
                invalidate_auth_cookie(jar),
                get_internal_server_error_redirect(),
            )
        })
        .into_response()
}

/// Verified against when the username is unknown, so that the response takes
/// as long as it does for a wrong password.
static UNKNOWN_USER_HASH: LazyLock<Option<PasswordHash>> = LazyLock::new(|| {
    PasswordHash::new(
        ValidatedPassword::new_unchecked("not the password of any user"),
        PasswordHash::DEFAULT_COST,
    )
    .inspect_err(|error| tracing::error!("could not hash the password for unknown users: {error}"))
    .ok()
});

/// Check `password` against the hash of `user`.
///
/// An unknown user never matches, but still costs one bcrypt verification.
fn check_password(user: Option<&User>, password: &str) -> Result<bool, BcryptError> {
    match user {
        Some(user) => user.password_hash.verify(password),
        None => {
            if let Some(hash) = UNKNOWN_USER_HASH.as_ref() {
                hash.verify(password)?;
            }

            Ok(false)
        }
    }
}

/// The raw data entered by the user in the log-in form.
///
/// The password is stored as a plain string. There is no need for validation here since
/// it will be compared against the password hash in the database.
#[derive(Clone, Serialize, Deserialize)]
pub struct LogInData {
    pub username: String,

    pub password: String,

    /// Whether to extend the initial auth cookie duration.
    ///
    /// This value comes from a checkbox, so it either has a string value or is not set
    /// (see the [MDN docs](https://developer.mozilla.org/en-US/docs/Web/HTML/Element/input/checkbox#value_2)).
    /// The `Some` variant should be interpreted as `true` irregardless of the
    /// string value, and the `None` variant should be interpreted as `false`.
    pub remember_me: Option<String>,

    /// Optional URL to redirect to after logging in.
    pub next: Option<String>,
}


#[cfg(test)]
mod log_in_tests {
    use axum::{Router, http::StatusCode, routing::post};
    use axum_htmx::HX_REDIRECT;
    use axum_test::{TestResponse, TestServer};
    use time::{Duration, OffsetDateTime};

    use crate::{
        auth::{COOKIE_TOKEN, PasswordHash, mark_email_verified},
        endpoints,
        test_utils::{insert_test_user, test_app_state},
    };

    use super::{
        EMAIL_NOT_VERIFIED_ERROR_MSG, INVALID_CREDENTIALS_ERROR_MSG, REMEMBER_ME_COOKIE_DURATION,
        UNKNOWN_USER_HASH, check_password, post_log_in,
    };

    const PASSWORD: &str = "averysafeandsecurepassword";

    fn get_server(verified: bool) -> TestServer {
        let (state, _) = test_app_state();
        {
            let connection = state.db_connection.lock().unwrap();
            let user = insert_test_user("alice", PASSWORD, &connection);
            if verified {
                mark_email_verified(user.id, &connection).unwrap();
            }
        }

        let app = Router::new()
            .route(endpoints::LOG_IN, post(post_log_in))
            .with_state(state);

        TestServer::try_new(app).expect("Could not create test server.")
    }

    async fn log_in(server: &TestServer, form: &[(&str, &str)]) -> TestResponse {
        server.post(endpoints::LOG_IN).form(form).await
    }

    #[track_caller]
    fn assert_error_message(response: &TestResponse, message: &str) {
        response.assert_status_ok();
        let fragment = scraper::Html::parse_fragment(&response.text());
        let selector = scraper::Selector::parse("p.text-red-500.text-base").unwrap();
        let error = fragment
            .select(&selector)
            .next()
            .expect("expected error message paragraph");
        assert_eq!(error.text().collect::<String>().trim(), message);
    }

    /// Test helper macro to assert that two date times are within one second
    /// of each other. Used instead of a function so that the file and line
    /// number of the caller is included in the error message instead of the
    /// helper.
    macro_rules! assert_date_time_close {
        ($left:expr, $right:expr$(,)?) => {
            assert!(
                ($left - $right).abs() < Duration::seconds(2),
                "got date time {:?}, want {:?}",
                $left,
                $right
            );
        };
    }

    #[tokio::test]
    async fn log_in_succeeds_with_valid_credentials() {
        let server = get_server(true);

        let response = log_in(&server, &[("username", "alice"), ("password", PASSWORD)]).await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(HX_REDIRECT), endpoints::DASHBOARD_VIEW);
        let cookie = response.cookie(COOKIE_TOKEN);
        assert!(cookie.expires_datetime() > Some(OffsetDateTime::now_utc()));
    }

    #[tokio::test]
    async fn log_in_redirects_to_next() {
        let server = get_server(true);
        let next = "/transactions?type=income";

        let response = log_in(
            &server,
            &[("username", "alice"), ("password", PASSWORD), ("next", next)],
        )
        .await;

        assert_eq!(response.header(HX_REDIRECT), next);
    }

    #[tokio::test]
    async fn log_in_ignores_unsafe_next() {
        let server = get_server(true);

        for next in ["https://example.com", "//example.com", "/login?next=%2F"] {
            let response = log_in(
                &server,
                &[("username", "alice"), ("password", PASSWORD), ("next", next)],
            )
            .await;

            assert_eq!(
                response.header(HX_REDIRECT),
                endpoints::DASHBOARD_VIEW,
                "unsafe next {next} should fall back to the dashboard"
            );
        }
    }

    #[tokio::test]
    async fn remember_me_extends_auth_cookie() {
        let server = get_server(true);

        let response = log_in(
            &server,
            &[
                ("username", "alice"),
                ("password", PASSWORD),
                ("remember_me", "on"),
            ],
        )
        .await;

        let token_cookie = response.cookie(COOKIE_TOKEN);
        assert_date_time_close!(
            token_cookie.expires_datetime().unwrap(),
            OffsetDateTime::now_utc() + REMEMBER_ME_COOKIE_DURATION
        );
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_give_same_error() {
        let server = get_server(true);

        let wrong_password =
            log_in(&server, &[("username", "alice"), ("password", "wrong")]).await;
        let unknown_user = log_in(&server, &[("username", "bob"), ("password", PASSWORD)]).await;

        assert_error_message(&wrong_password, INVALID_CREDENTIALS_ERROR_MSG);
        assert_error_message(&unknown_user, INVALID_CREDENTIALS_ERROR_MSG);
        assert!(wrong_password.maybe_cookie(COOKIE_TOKEN).is_none());
    }

    #[tokio::test]
    async fn unverified_user_cannot_log_in() {
        let server = get_server(false);

        let response = log_in(&server, &[("username", "alice"), ("password", PASSWORD)]).await;

        assert_error_message(&response, EMAIL_NOT_VERIFIED_ERROR_MSG);
        assert!(response.maybe_cookie(COOKIE_TOKEN).is_none());
    }

    #[tokio::test]
    async fn log_in_fails_with_missing_fields() {
        let server = get_server(true);

        server
            .post(endpoints::LOG_IN)
            .form(&[("username", "alice")])
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn unknown_user_is_checked_against_hash_with_default_cost() {
        let hash: &str = UNKNOWN_USER_HASH.as_ref().unwrap().as_ref();

        assert!(
            hash.starts_with(&format!("$2b${:02}$", PasswordHash::DEFAULT_COST)),
            "want a hash with the default cost, got {hash}"
        );
        assert!(!check_password(None, "not the password of any user").unwrap());
    }

    #[test]
    fn known_user_is_checked_against_their_hash() {
        let (state, _) = test_app_state();
        let user = insert_test_user("alice", PASSWORD, &state.db_connection.lock().unwrap());

        assert!(check_password(Some(&user), PASSWORD).unwrap());
        assert!(!check_password(Some(&user), "wrong").unwrap());
    }
}
