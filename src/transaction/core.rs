//! Defines the core data models and database queries for transactions.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef},
};
use serde::Serialize;
use time::{
    PrimitiveDateTime, format_description::BorrowedFormatItem, macros::format_description,
};

use crate::{Error, auth::UserID};

// ============================================================================
// MODELS
// ============================================================================

/// Transaction dates are stored as fixed-width text, e.g. "2025-10-05T14:30:00",
/// so that comparing the text also compares the points in time.
pub const DATE_TIME_FORMAT: &[BorrowedFormatItem] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Whether money was earned or spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money earned, e.g. a salary.
    Income,
    /// Money spent, e.g. groceries.
    Expense,
}

impl TransactionType {
    /// The name stored in the database and used in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(Error::InvalidFilter(format!(
                "unknown transaction type \"{other}\", expected \"income\" or \"expense\""
            ))),
        }
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

mod datetime_format {
    //! Serializes transaction dates in the same format used for storage.
    use serde::Serializer;
    use time::PrimitiveDateTime;

    use super::DATE_TIME_FORMAT;

    pub fn serialize<S>(dt: &PrimitiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = dt
            .format(DATE_TIME_FORMAT)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: i64,
    /// The user the transaction belongs to.
    #[serde(skip)]
    pub user_id: UserID,
    /// Whether the amount was earned or spent.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// The amount of money spent or earned in this transaction, always zero or more.
    pub amount: f64,
    /// What the money was for, e.g. "Groceries".
    pub category: String,
    /// Optional free text about the transaction.
    pub description: Option<String>,
    /// When the transaction happened, in the server's local time.
    #[serde(serialize_with = "datetime_format::serialize")]
    pub date: PrimitiveDateTime,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        transaction_type: TransactionType,
        amount: f64,
        category: &str,
        date: PrimitiveDateTime,
    ) -> TransactionBuilder {
        TransactionBuilder {
            transaction_type,
            amount,
            category: category.to_owned(),
            description: None,
            date,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// The user the transaction belongs to is given when the transaction is
/// inserted with [create_transaction].
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    pub transaction_type: TransactionType,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub date: PrimitiveDateTime,
}

impl TransactionBuilder {
    /// Set the description for the transaction.
    pub fn description(mut self, description: Option<&str>) -> Self {
        self.description = description.map(str::to_owned);
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Format `date` the way transaction dates are stored.
pub(crate) fn format_date_time(date: PrimitiveDateTime) -> Result<String, Error> {
    date.format(DATE_TIME_FORMAT)
        .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)).into())
}

/// Create a new transaction for `user_id` in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the amount is negative or not finite,
/// - [Error::EmptyCategory] if the category is blank,
/// - or [Error::SqlError] if there is some other SQL error, e.g. `user_id` does not exist.
pub fn create_transaction(
    builder: TransactionBuilder,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    if !builder.amount.is_finite() || builder.amount < 0.0 {
        return Err(Error::InvalidAmount(builder.amount.to_string()));
    }

    let category = builder.category.trim();
    if category.is_empty() {
        return Err(Error::EmptyCategory);
    }

    let description = builder
        .description
        .as_deref()
        .map(str::trim)
        .filter(|description| !description.is_empty());

    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\" (user_id, type, amount, category, description, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id, user_id, type, amount, category, description, date",
        )?
        .query_row(
            (
                user_id.as_i64(),
                builder.transaction_type,
                builder.amount,
                category,
                description,
                format_date_time(builder.date)?,
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
#[cfg(test)]
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
                amount REAL NOT NULL CHECK (amount >= 0),
                category TEXT NOT NULL,
                description TEXT,
                date TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    // Index used by the filtered list and totals queries.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
///
/// The columns must be, in order: id, user_id, type, amount, category, description, date.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let raw_date: String = row.get(6)?;
    let date = PrimitiveDateTime::parse(&raw_date, DATE_TIME_FORMAT)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(error)))?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        transaction_type: row.get(2)?,
        amount: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        date,
    })
}

// ============================================================================
// TESTS
// ============================================================================
