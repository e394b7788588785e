use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use axum::{http::header::SET_COOKIE, response::IntoResponse};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, Key},
};
use rusqlite::Connection;

use crate::{
    AppState,
    auth::{
        DEFAULT_COOKIE_DURATION, PasswordHash, User, UserID, Username, ValidatedPassword,
        create_user, parse_email, set_auth_cookie,
    },
    email::{Mailer, test_mailers::RecordingMailer},
};

pub(crate) const TEST_BASE_URL: &str = "http://localhost:3000";

/// The lowest cost bcrypt accepts, keeps tests fast.
const TEST_BCRYPT_COST: u32 = 4;

/// App state backed by an in-memory database that records sent emails.
pub(crate) fn test_app_state() -> (AppState, RecordingMailer) {
    let mailer = RecordingMailer::default();
    let state = test_app_state_with_mailer(Arc::new(mailer.clone()));

    (state, mailer)
}

pub(crate) fn test_app_state_with_mailer(mailer: Arc<dyn Mailer>) -> AppState {
    static DATABASE_COUNT: AtomicUsize = AtomicUsize::new(0);

    // A named, shared-cache database so handlers that open their own
    // connection see the same data. The shared connection keeps it alive.
    let db_path = format!(
        "file:fintrack-test-{}?mode=memory&cache=shared",
        DATABASE_COUNT.fetch_add(1, Ordering::Relaxed)
    );

    AppState::new(&db_path, "foobar", "Etc/UTC", TEST_BASE_URL, mailer)
        .expect("Could not create app state")
}

/// Insert an unverified user with the email "<username>@example.com".
#[track_caller]
pub(crate) fn insert_test_user(username: &str, password: &str, connection: &Connection) -> User {
    let password_hash =
        PasswordHash::new(ValidatedPassword::new_unchecked(password), TEST_BCRYPT_COST)
            .expect("Could not hash password");

    create_user(
        &Username::new(username).expect("Invalid test username"),
        &parse_email(&format!("{username}@example.com")).expect("Invalid test email"),
        password_hash,
        connection,
    )
    .expect("Could not create test user")
}

/// The encrypted session cookie a browser would hold after `user_id` logs in.
#[track_caller]
pub(crate) fn session_cookie(key: &Key, user_id: UserID) -> Cookie<'static> {
    let jar = set_auth_cookie(PrivateCookieJar::new(key.clone()), user_id, DEFAULT_COOKIE_DURATION)
        .expect("Could not set auth cookie");
    let response = jar.into_response();
    let header = response
        .headers()
        .get(SET_COOKIE)
        .expect("Set-Cookie header missing")
        .to_str()
        .expect("Could not convert to str")
        .to_owned();

    Cookie::parse(header).expect("Could not parse cookie")
}
