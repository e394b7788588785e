//! Signed, time-limited tokens for email confirmation and password reset links.
//!
//! A token has the form `payload.timestamp.signature`, each part encoded as
//! unpadded URL-safe base64:
//! - `payload` is the email address the token was issued for,
//! - `timestamp` is the issue time as a big-endian Unix timestamp,
//! - `signature` is HMAC-SHA256 over `salt.payload.timestamp`.
//!
//! The salt is picked by the [TokenPurpose], so a token issued for one purpose
//! never verifies for the other. Tokens are not stored on the server.

use std::fmt::Debug;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

type HmacSha256 = Hmac<Sha256>;

/// How long a token remains valid after it is issued.
pub const DEFAULT_TOKEN_MAX_AGE: Duration = Duration::seconds(3600);

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    /// Confirming the email address given at sign-up.
    ConfirmEmail,
    /// Setting a new password without the old one.
    ResetPassword,
}

impl TokenPurpose {
    fn salt(self) -> &'static str {
        match self {
            TokenPurpose::ConfirmEmail => "email-confirm-salt",
            TokenPurpose::ResetPassword => "password-reset-salt",
        }
    }
}

/// The token could not be verified.
///
/// The reason (expired, tampered, malformed or issued for another purpose) is
/// intentionally not exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid or expired token")]
pub struct InvalidToken;

/// Issues and verifies tokens with a server-side secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenSigner {
    /// Create a signer from the application secret.
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Issue a token for `email` using the current time.
    pub fn issue(&self, email: &str, purpose: TokenPurpose) -> String {
        self.issue_at(email, purpose, OffsetDateTime::now_utc())
    }

    /// Issue a token for `email` as if it was issued at `issued_at`.
    pub fn issue_at(&self, email: &str, purpose: TokenPurpose, issued_at: OffsetDateTime) -> String {
        let payload = URL_SAFE_NO_PAD.encode(email.as_bytes());
        let timestamp = URL_SAFE_NO_PAD.encode(issued_at.unix_timestamp().to_be_bytes());
        let signature = self
            .mac(purpose, &payload, &timestamp)
            .finalize()
            .into_bytes();

        format!(
            "{payload}.{timestamp}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verify `token` and return the email address it was issued for.
    ///
    /// # Errors
    ///
    /// Returns [InvalidToken] if the signature does not match `purpose`, the
    /// token is malformed, or it is older than `max_age`.
    pub fn verify(
        &self,
        token: &str,
        purpose: TokenPurpose,
        max_age: Duration,
    ) -> Result<String, InvalidToken> {
        self.verify_at(token, purpose, max_age, OffsetDateTime::now_utc())
    }

    /// Verify `token` as if the current time was `now`.
    ///
    /// A token issued after `now` is rejected.
    pub fn verify_at(
        &self,
        token: &str,
        purpose: TokenPurpose,
        max_age: Duration,
        now: OffsetDateTime,
    ) -> Result<String, InvalidToken> {
        let mut parts = token.split('.');
        let (Some(payload), Some(timestamp), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidToken);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| InvalidToken)?;
        self.mac(purpose, payload, timestamp)
            .verify_slice(&signature)
            .map_err(|_| InvalidToken)?;

        let timestamp_bytes: [u8; 8] = URL_SAFE_NO_PAD
            .decode(timestamp)
            .map_err(|_| InvalidToken)?
            .try_into()
            .map_err(|_| InvalidToken)?;
        let issued_at = i64::from_be_bytes(timestamp_bytes);

        let age = now.unix_timestamp() - issued_at;
        if age < 0 || age > max_age.whole_seconds() {
            return Err(InvalidToken);
        }

        let email = URL_SAFE_NO_PAD.decode(payload).map_err(|_| InvalidToken)?;

        String::from_utf8(email).map_err(|_| InvalidToken)
    }

    fn mac(&self, purpose: TokenPurpose, payload: &str, timestamp: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take a key of any size");
        mac.update(purpose.salt().as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());

        mac
    }
}
