//! Outbound email for account confirmation and password reset links.
//!
//! Sending is synchronous: handlers call [Mailer::send] on the blocking thread
//! pool so that a database transaction can stay open until the email has been
//! handed to the transport.

use std::{fmt::Debug, path::Path, time::Duration};

use lettre::{
    FileTransport, Message, SmtpTransport, Transport,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use maud::{DOCTYPE, Markup, html};

/// An email ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    /// The recipient's email address.
    pub to: String,
    /// The subject line.
    pub subject: String,
    /// The HTML body.
    pub html_body: String,
}

/// The email could not be built or handed over to the transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MailError {
    /// A sender or recipient address could not be parsed.
    #[error("invalid address: {0}")]
    Address(String),
    /// The message could not be built.
    #[error("could not build message: {0}")]
    Message(String),
    /// The transport rejected the message.
    #[error("could not deliver message: {0}")]
    Transport(String),
}

/// Sends emails.
pub trait Mailer: Send + Sync + Debug {
    /// Send `email`, blocking until the transport has accepted it.
    ///
    /// # Errors
    ///
    /// Returns a [MailError] if the email could not be sent.
    fn send(&self, email: &Email) -> Result<(), MailError>;
}

fn build_message(from: &Mailbox, email: &Email) -> Result<Message, MailError> {
    let to = email
        .to
        .parse::<Mailbox>()
        .map_err(|e| MailError::Address(e.to_string()))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(&email.subject)
        .header(ContentType::TEXT_HTML)
        .body(email.html_body.clone())
        .map_err(|e| MailError::Message(e.to_string()))
}

fn parse_from(from: &str) -> Result<Mailbox, MailError> {
    from.parse::<Mailbox>()
        .map_err(|e| MailError::Address(e.to_string()))
}

/// How long to wait on the SMTP relay before giving up on a send.
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends email through an SMTP relay using STARTTLS.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Create a mailer for the SMTP relay at `host:port`.
    ///
    /// # Errors
    ///
    /// Returns a [MailError] if `from` is not a valid mailbox or the relay
    /// could not be configured.
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: String,
        from: &str,
    ) -> Result<Self, MailError> {
        let transport = SmtpTransport::starttls_relay(host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(port)
            .credentials(Credentials::new(username, password))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            transport,
            from: parse_from(from)?,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = build_message(&self.from, email)?;

        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| MailError::Transport(e.to_string()))
    }
}

/// Writes each email to an `.eml` file in a directory.
///
/// Useful for local development where no SMTP server is available.
pub struct FileMailer {
    transport: FileTransport,
    from: Mailbox,
}

impl Debug for FileMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMailer")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl FileMailer {
    /// Create a mailer that writes to `directory`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a [MailError] if `from` is not a valid mailbox or the directory
    /// could not be created.
    pub fn new(directory: &Path, from: &str) -> Result<Self, MailError> {
        std::fs::create_dir_all(directory).map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(Self {
            transport: FileTransport::new(directory),
            from: parse_from(from)?,
        })
    }
}

impl Mailer for FileMailer {
    fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = build_message(&self.from, email)?;

        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| MailError::Transport(e.to_string()))
    }
}

fn email_layout(title: &str, content: Markup) -> String {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) }
            }
            body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;" {
                div style="max-width: 600px; margin: 0 auto; padding: 20px;" {
                    h2 { (title) }
                    (content)
                    p style="margin-top: 30px; font-size: 12px; color: #666;" {
                        "This is an automated message, please do not reply to this email."
                    }
                }
            }
        }
    }
    .into_string()
}

/// The email sent after sign-up with the link that confirms the address.
pub fn confirmation_email(to: &str, username: &str, confirm_url: &str) -> Email {
    let content = html! {
        p { "Hello " (username) "," }
        p { "Thanks for signing up. Please confirm your email address by clicking the link below:" }
        p { a href=(confirm_url) { "Confirm your email address" } }
        p { "Or copy and paste this link into your browser:" }
        p { (confirm_url) }
        p { "This link will expire in one hour." }
    };

    Email {
        to: to.to_owned(),
        subject: "Please confirm your email".to_owned(),
        html_body: email_layout("Confirm your email", content),
    }
}

/// The email with the link for setting a new password.
pub fn password_reset_email(to: &str, username: &str, reset_url: &str) -> Email {
    let content = html! {
        p { "Hello " (username) "," }
        p {
            "We received a request to reset your password. If you didn't make this request, \
            you can safely ignore this email."
        }
        p { a href=(reset_url) { "Reset your password" } }
        p { "Or copy and paste this link into your browser:" }
        p { (reset_url) }
        p { "This link will expire in one hour." }
    };

    Email {
        to: to.to_owned(),
        subject: "Password reset requested".to_owned(),
        html_body: email_layout("Reset your password", content),
    }
}

#[cfg(test)]
pub(crate) mod test_mailers {
    //! Mailers for tests that do not need a real transport.

    use std::sync::{Arc, Mutex};

    use super::{Email, MailError, Mailer};

    /// Keeps every email it is asked to send.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingMailer {
        pub sent: Arc<Mutex<Vec<Email>>>,
    }

    impl RecordingMailer {
        pub(crate) fn sent(&self) -> Vec<Email> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Mailer for RecordingMailer {
        fn send(&self, email: &Email) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    /// Fails to send every email.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct FailingMailer;

    impl Mailer for FailingMailer {
        fn send(&self, _email: &Email) -> Result<(), MailError> {
            Err(MailError::Transport("connection refused".to_owned()))
        }
    }

    /// Extract the first absolute link that starts with `prefix` from an email body.
    #[track_caller]
    pub(crate) fn extract_link(email: &Email, prefix: &str) -> String {
        let start = email
            .html_body
            .find(prefix)
            .unwrap_or_else(|| panic!("no link starting with {prefix} in {}", email.html_body));
        let rest = &email.html_body[start..];
        let end = rest
            .find(|c: char| c == '"' || c == '<' || c.is_whitespace())
            .unwrap_or(rest.len());

        rest[..end].to_owned()
    }
}

#[cfg(test)]
mod tests {
    use scratch::TestDir;

    use super::{Email, FileMailer, Mailer, confirmation_email, password_reset_email};

    /// A scratch directory under the system temp dir that is removed on drop.
    mod scratch {
        use std::path::PathBuf;

        pub struct TestDir(pub PathBuf);

        impl TestDir {
            pub fn new(name: &str) -> Self {
                let path = std::env::temp_dir().join(format!(
                    "fintrack-{name}-{}",
                    std::process::id()
                ));
                let _ = std::fs::remove_dir_all(&path);
                Self(path)
            }
        }

        impl Drop for TestDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[test]
    fn confirmation_email_contains_link() {
        let email = confirmation_email(
            "alice@example.com",
            "alice",
            "http://localhost:3000/confirm/abc.def.ghi",
        );

        assert_eq!(email.to, "alice@example.com");
        assert!(
            email
                .html_body
                .contains(r#"href="http://localhost:3000/confirm/abc.def.ghi""#)
        );
    }

    #[test]
    fn password_reset_email_escapes_username() {
        let email = password_reset_email(
            "alice@example.com",
            "<b>alice</b>",
            "http://localhost:3000/reset_password/abc",
        );

        assert!(email.html_body.contains("&lt;b&gt;alice&lt;/b&gt;"));
    }

    #[test]
    fn file_mailer_writes_eml_file() {
        let dir = TestDir::new("file-mailer");
        let mailer = FileMailer::new(&dir.0, "Fintrack <noreply@example.com>").unwrap();

        mailer
            .send(&Email {
                to: "alice@example.com".to_owned(),
                subject: "Hello".to_owned(),
                html_body: "<p>Hi</p>".to_owned(),
            })
            .unwrap();

        let files = std::fs::read_dir(&dir.0).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn file_mailer_rejects_invalid_recipient() {
        let dir = TestDir::new("invalid-recipient");
        let mailer = FileMailer::new(&dir.0, "noreply@example.com").unwrap();

        let result = mailer.send(&Email {
            to: "not an address".to_owned(),
            subject: "Hello".to_owned(),
            html_body: String::new(),
        });

        assert!(result.is_err());
    }
}
