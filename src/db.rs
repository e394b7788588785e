//! Database setup for the application's SQLite connection.

use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior, Transaction as SqlTransaction};

use crate::{Error, auth::create_user_table, transaction::create_transaction_table};

/// How long a connection waits on another connection's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection to the database at `path` with foreign keys enabled.
///
/// `path` may be a file path or an SQLite URI, e.g.
/// "file:fintrack?mode=memory&cache=shared".
///
/// # Errors
///
/// Returns [Error::SqlError] if the database could not be opened.
pub fn open(path: &str) -> Result<Connection, Error> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.pragma_update(None, "foreign_keys", "ON")?;

    Ok(connection)
}

/// Enable foreign keys and create the application tables if they do not exist.
///
/// The tables are created in a single exclusive transaction, so either all of
/// them are created or none are.
///
/// # Errors
///
/// Returns [Error::SqlError] if a table could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_transaction_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
