//! Code for creating the user table and fetching users from the database.

use std::fmt::Display;

use email_address::EmailAddress;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, auth::PasswordHash};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The longest username, in characters, that may be registered.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// A username that is non-empty and at most [MAX_USERNAME_LENGTH] characters.
#[derive(Debug, Clone, PartialEq)]
pub struct Username(String);

impl Username {
    /// Trim and validate a raw username.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidUsername] if the trimmed username is empty or too long.
    pub fn new(raw_username: &str) -> Result<Self, Error> {
        let username = raw_username.trim();

        if username.is_empty() {
            return Err(Error::InvalidUsername("username cannot be empty".to_owned()));
        }

        if username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(Error::InvalidUsername(format!(
                "username must be at most {MAX_USERNAME_LENGTH} characters"
            )));
        }

        Ok(Self(username.to_owned()))
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parse a raw email address, ignoring surrounding whitespace.
///
/// # Errors
///
/// Returns [Error::InvalidEmail] if `raw_email` is not a valid email address.
pub fn parse_email(raw_email: &str) -> Result<EmailAddress, Error> {
    raw_email
        .trim()
        .parse::<EmailAddress>()
        .map_err(|error| Error::InvalidEmail(error.to_string()))
}

/// A user of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The unique name the user logs in with.
    pub username: String,
    /// The unique email address for confirmation and password reset links.
    pub email: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// Whether the user has followed the link in their confirmation email.
    pub email_verified: bool,
}

/// Create the user table.
///
/// Email addresses are compared case-insensitively.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password TEXT NOT NULL,
                email_verified INTEGER NOT NULL DEFAULT 0
                )",
        (),
    )?;

    Ok(())
}

/// Insert a new, unverified user into the database.
///
/// # Errors
///
/// Returns:
/// - [Error::DuplicateUsername] if the username is taken.
/// - [Error::DuplicateEmail] if the email address is already registered.
/// - [Error::SqlError] if some other SQL error occurred.
pub fn create_user(
    username: &Username,
    email: &EmailAddress,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<User, Error> {
    connection.execute(
        "INSERT INTO user (username, email, password) VALUES (?1, ?2, ?3)",
        (username.as_ref(), email.as_str(), password_hash.as_ref()),
    )?;

    Ok(User {
        id: UserID::new(connection.last_insert_rowid()),
        username: username.as_ref().to_owned(),
        email: email.as_str().to_owned(),
        password_hash,
        email_verified: false,
    })
}

const SELECT_USER: &str = "SELECT id, username, email, password, email_verified FROM user";

fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(3)?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        email_verified: row.get(4)?,
    })
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if `user_id` does not belong to a registered user.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!("{SELECT_USER} WHERE id = :id"))?
        .query_row(&[(":id", &user_id.as_i64())], map_user_row)
        .map_err(|error| error.into())
}

/// Get the user with the exact `username`.
///
/// # Errors
///
/// Returns [Error::NotFound] if no user has the username.
pub fn get_user_by_username(username: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!("{SELECT_USER} WHERE username = :username"))?
        .query_row(&[(":username", &username.trim())], map_user_row)
        .map_err(|error| error.into())
}

/// Get the user registered with `email`, ignoring case.
///
/// # Errors
///
/// Returns [Error::NotFound] if no user has the email address.
pub fn get_user_by_email(email: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!("{SELECT_USER} WHERE email = :email"))?
        .query_row(&[(":email", &email.trim())], map_user_row)
        .map_err(|error| error.into())
}

/// Mark the email address of `user_id` as confirmed.
///
/// # Errors
///
/// Returns [Error::NotFound] if no user has the ID.
pub fn mark_email_verified(user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET email_verified = 1 WHERE id = ?1",
        (user_id.as_i64(),),
    )?;

    match rows_affected {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}

/// Replace the password hash of `user_id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if no user has the ID.
pub fn update_password(
    user_id: UserID,
    password_hash: &PasswordHash,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET password = ?1 WHERE id = ?2",
        (password_hash.as_ref(), user_id.as_i64()),
    )?;

    match rows_affected {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}

/// Get the number of users in the database.
#[cfg(test)]
pub fn count_users(connection: &Connection) -> Result<usize, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM user;", [], |row| row.get(0))
        .map_err(|error| error.into())
}
