//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use rusqlite::Connection;
use sha2::{Digest, Sha512};
use time::Duration;

use crate::{
    Error,
    auth::{DEFAULT_COOKIE_DURATION, DEFAULT_TOKEN_MAX_AGE, TokenSigner},
    db::{initialize, open},
    email::Mailer,
};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,

    /// The duration for which cookies used for authentication are valid.
    pub cookie_duration: Duration,

    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// The path or URI of the database, for work that needs its own connection.
    pub db_path: String,

    /// Signs and verifies email confirmation and password reset tokens.
    pub token_signer: TokenSigner,

    /// How long email confirmation and password reset links stay valid.
    pub token_max_age: Duration,

    /// Sends confirmation and password reset emails.
    pub mailer: Arc<dyn Mailer>,

    /// The public URL of the server, e.g. "https://fintrack.example.com".
    ///
    /// Used to build the absolute links in emails.
    pub base_url: String,
}

impl AppState {
    /// Create a new [AppState] for the SQLite database at `db_path`.
    ///
    /// This function will open the database and initialize it by adding the tables for the domain models.
    /// `local_timezone` should be a valid, canonical timezone name, e.g. "Pacific/Auckland".
    /// `secret` is used for both the cookie key and the token signer.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(
        db_path: &str,
        secret: &str,
        local_timezone: &str,
        base_url: &str,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, Error> {
        let db_connection = open(db_path)?;
        initialize(&db_connection)?;

        let connection = Arc::new(Mutex::new(db_connection));

        Ok(Self {
            cookie_key: create_cookie_key(secret),
            cookie_duration: DEFAULT_COOKIE_DURATION,
            local_timezone: local_timezone.to_owned(),
            db_connection: connection,
            db_path: db_path.to_owned(),
            token_signer: TokenSigner::new(secret),
            token_max_age: DEFAULT_TOKEN_MAX_AGE,
            mailer,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Create a signing key for cookies from a `secret`s string.
pub fn create_cookie_key(secret: &str) -> Key {
    let hash = Sha512::digest(secret);

    Key::from(&hash)
}
