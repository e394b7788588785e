//! One-off messages shown on the log-in and password reset pages after a redirect.
//!
//! Handlers redirect with `?notice=<name>` rather than free text so that the
//! message shown is always one of a fixed set.

use maud::{Markup, html};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{IntoDeserializer, value},
};

/// A message to display above a form after being redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// The account was created and a confirmation email was sent.
    CheckEmail,
    /// The email address was confirmed.
    Confirmed,
    /// The email address had already been confirmed.
    AlreadyConfirmed,
    /// The confirmation link was invalid or expired.
    InvalidConfirmation,
    /// A password reset email was sent.
    ResetSent,
    /// No account uses the email address entered for a password reset.
    NoAccount,
    /// The password was changed.
    PasswordUpdated,
    /// The password reset link was invalid or expired.
    InvalidResetLink,
}

/// The query string for pages that display a [Notice].
///
/// Unknown notices are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    #[serde(default, deserialize_with = "deserialize_notice")]
    pub notice: Option<Notice>,
}

fn deserialize_notice<'de, D>(deserializer: D) -> Result<Option<Notice>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;

    Ok(raw.and_then(|raw| {
        let deserializer: value::StrDeserializer<'_, value::Error> =
            raw.as_str().into_deserializer();
        Notice::deserialize(deserializer).ok()
    }))
}

impl Notice {
    /// The query string fragment, e.g. `notice=check_email`.
    pub fn query(self) -> String {
        serde_urlencoded::to_string([("notice", self)]).unwrap_or_default()
    }

    fn is_error(self) -> bool {
        matches!(
            self,
            Notice::InvalidConfirmation | Notice::NoAccount | Notice::InvalidResetLink
        )
    }

    fn message(self) -> &'static str {
        match self {
            Notice::CheckEmail => {
                "Your account has been created. Check your email for a link to confirm your \
                email address before logging in."
            }
            Notice::Confirmed => "Your email address has been confirmed. You can now log in.",
            Notice::AlreadyConfirmed => "Your email address has already been confirmed.",
            Notice::InvalidConfirmation => "The confirmation link is invalid or has expired.",
            Notice::ResetSent => "Check your email for a link to reset your password.",
            Notice::NoAccount => "There is no account registered with that email address.",
            Notice::PasswordUpdated => "Your password has been updated. You can now log in.",
            Notice::InvalidResetLink => {
                "The password reset link is invalid or has expired. Request a new one below."
            }
        }
    }

    pub fn into_html(self) -> Markup {
        let style = if self.is_error() {
            "p-4 text-sm rounded-lg text-red-800 bg-red-50 dark:bg-gray-800 dark:text-red-400"
        } else {
            "p-4 text-sm rounded-lg text-green-800 bg-green-50 dark:bg-gray-800 dark:text-green-400"
        };

        html! {
            p id="notice" role="status" class=(style) { (self.message()) }
        }
    }
}
