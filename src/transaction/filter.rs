//! Filtering and summing a user's transactions.
//!
//! The HTML transactions page and the JSON API both go through
//! [filter_transactions] so that they always agree on which transactions
//! match a filter and what they add up to.

use rusqlite::{Connection, params_from_iter, types::Value};
use serde::{Deserialize, Serialize};
use time::{Date, PrimitiveDateTime, Time, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    Error,
    auth::UserID,
    transaction::{
        Transaction, TransactionType,
        core::{format_date_time, map_transaction_row},
    },
};

/// The format of dates in filter query strings, e.g. "2025-10-05".
pub const DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

/// Which of a user's transactions to include.
///
/// Each field that is `None` imposes no constraint. The fields that are set
/// must all match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    /// Only include income or only include expenses.
    pub transaction_type: Option<TransactionType>,
    /// Only include transactions with exactly this category.
    pub category: Option<String>,
    /// Only include transactions on or after the start of this day.
    pub start_date: Option<Date>,
    /// Only include transactions on or before the end of this day.
    pub end_date: Option<Date>,
}

/// The raw query string for filtering transactions.
///
/// Empty values are treated the same as missing values, since that is what a
/// submitted form with blank fields produces.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilterQuery {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Any non-empty value asks for the filters to be cleared.
    #[serde(skip_serializing)]
    pub reset: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_date(field: &str, raw_date: &str) -> Result<Date, Error> {
    Date::parse(raw_date, DATE_FORMAT).map_err(|_| {
        Error::InvalidFilter(format!(
            "{field} \"{raw_date}\" is not a valid date, expected YYYY-MM-DD"
        ))
    })
}

impl FilterQuery {
    /// Whether the client asked to clear the filters.
    pub fn is_reset(&self) -> bool {
        non_empty(&self.reset).is_some()
    }

    /// Parse the raw values into a [TransactionFilter].
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidFilter] if the type is not "income" or "expense",
    /// or a date is not in the format YYYY-MM-DD.
    pub fn parse(&self) -> Result<TransactionFilter, Error> {
        Ok(TransactionFilter {
            transaction_type: non_empty(&self.transaction_type)
                .map(str::parse)
                .transpose()?,
            category: non_empty(&self.category).map(str::to_owned),
            start_date: non_empty(&self.start_date)
                .map(|date| parse_date("start_date", date))
                .transpose()?,
            end_date: non_empty(&self.end_date)
                .map(|date| parse_date("end_date", date))
                .transpose()?,
        })
    }
}

/// The sums of a set of transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    /// The sum of all income.
    pub total_income: f64,
    /// The sum of all expenses.
    pub total_expenses: f64,
    /// Income minus expenses.
    pub remaining: f64,
}

impl Totals {
    fn new(total_income: f64, total_expenses: f64) -> Self {
        Self {
            total_income,
            total_expenses,
            remaining: total_income - total_expenses,
        }
    }

    /// Sum `transactions` in memory.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let (income, expenses) =
            transactions
                .iter()
                .fold((0.0, 0.0), |(income, expenses), transaction| {
                    match transaction.transaction_type {
                        TransactionType::Income => (income + transaction.amount, expenses),
                        TransactionType::Expense => (income, expenses + transaction.amount),
                    }
                });

        Self::new(income, expenses)
    }
}

/// A filtered list of transactions with its totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredTransactions {
    pub transactions: Vec<Transaction>,
    pub totals: Totals,
}

/// Build the `WHERE` clause and its parameters for `filter`.
///
/// Every clause is scoped to `user_id`.
fn build_where_clause(
    user_id: UserID,
    filter: &TransactionFilter,
) -> Result<(String, Vec<Value>), Error> {
    let mut conditions = vec!["user_id = ?"];
    let mut params = vec![Value::Integer(user_id.as_i64())];

    if let Some(transaction_type) = filter.transaction_type {
        conditions.push("type = ?");
        params.push(Value::Text(transaction_type.as_str().to_owned()));
    }

    if let Some(category) = &filter.category {
        conditions.push("category = ?");
        params.push(Value::Text(category.clone()));
    }

    if let Some(start_date) = filter.start_date {
        conditions.push("date >= ?");
        params.push(Value::Text(format_date_time(PrimitiveDateTime::new(
            start_date,
            Time::MIDNIGHT,
        ))?));
    }

    // Dates include a time of day, so the end date is inclusive up to (but
    // excluding) midnight of the following day.
    if let Some(end_date) = filter.end_date {
        match end_date.next_day() {
            Some(next_day) => {
                conditions.push("date < ?");
                params.push(Value::Text(format_date_time(PrimitiveDateTime::new(
                    next_day,
                    Time::MIDNIGHT,
                ))?));
            }
            None => {
                conditions.push("date <= ?");
                params.push(Value::Text(format_date_time(PrimitiveDateTime::new(
                    end_date,
                    Time::MAX,
                ))?));
            }
        }
    }

    Ok((conditions.join(" AND "), params))
}

/// Get the transactions of `user_id` that match `filter`, ordered by date and then ID.
///
/// # Errors
///
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_transactions(
    user_id: UserID,
    filter: &TransactionFilter,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let (where_clause, params) = build_where_clause(user_id, filter)?;

    connection
        .prepare(&format!(
            "SELECT id, user_id, type, amount, category, description, date
             FROM \"transaction\"
             WHERE {where_clause}
             ORDER BY date ASC, id ASC"
        ))?
        .query_map(params_from_iter(params.iter()), map_transaction_row)?
        .map(|transaction_result| transaction_result.map_err(Error::from))
        .collect()
}

/// Sum the income and expenses of `user_id` that match `filter`.
///
/// The sums are taken over the list that [get_transactions] returns, in the
/// same order, so they are always the totals of [filter_transactions].
///
/// # Errors
///
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_totals(
    user_id: UserID,
    filter: &TransactionFilter,
    connection: &Connection,
) -> Result<Totals, Error> {
    filter_transactions(user_id, filter, connection).map(|filtered| filtered.totals)
}

/// Get the distinct categories `user_id` has used, sorted alphabetically.
///
/// # Errors
///
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_categories(user_id: UserID, connection: &Connection) -> Result<Vec<String>, Error> {
    connection
        .prepare(
            "SELECT DISTINCT category FROM \"transaction\" WHERE user_id = ?1 ORDER BY category ASC",
        )?
        .query_map((user_id.as_i64(),), |row| row.get(0))?
        .map(|category_result| category_result.map_err(Error::from))
        .collect()
}

/// Get the transactions of `user_id` that match `filter` together with their totals.
///
/// # Errors
///
/// Returns [Error::SqlError] if there is an SQL error.
pub fn filter_transactions(
    user_id: UserID,
    filter: &TransactionFilter,
    connection: &Connection,
) -> Result<FilteredTransactions, Error> {
    let transactions = get_transactions(user_id, filter, connection)?;
    let totals = Totals::from_transactions(&transactions);

    Ok(FilteredTransactions {
        transactions,
        totals,
    })
}


#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use time::{
        PrimitiveDateTime,
        macros::{date, datetime},
    };

    use crate::{
        auth::{PasswordHash, User, Username, create_user, parse_email},
        db::initialize,
        transaction::{Transaction, TransactionType, create_transaction},
    };

    use super::{
        Totals, TransactionFilter, filter_transactions, get_categories, get_totals,
        get_transactions,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn insert_user(name: &str, conn: &Connection) -> User {
        create_user(
            &Username::new(name).unwrap(),
            &parse_email(&format!("{name}@example.com")).unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            conn,
        )
        .unwrap()
    }

    fn insert(
        user: &User,
        transaction_type: TransactionType,
        amount: f64,
        category: &str,
        date: PrimitiveDateTime,
        conn: &Connection,
    ) -> Transaction {
        create_transaction(
            Transaction::build(transaction_type, amount, category, date),
            user.id,
            conn,
        )
        .unwrap()
    }

    #[test]
    fn no_filter_returns_all_of_users_transactions_in_date_order() {
        let conn = get_test_connection();
        let alice = insert_user("alice", &conn);
        let bob = insert_user("bob", &conn);
        let later = insert(
            &alice,
            TransactionType::Income,
            100.0,
            "salary",
            datetime!(2025-10-05 09:00:00),
            &conn,
        );
        let earlier = insert(
            &alice,
            TransactionType::Expense,
            40.0,
            "food",
            datetime!(2025-10-04 12:00:00),
            &conn,
        );
        insert(
            &bob,
            TransactionType::Expense,
            5.0,
            "food",
            datetime!(2025-10-04 12:00:00),
            &conn,
        );

        let transactions =
            get_transactions(alice.id, &TransactionFilter::default(), &conn).unwrap();

        assert_eq!(transactions, [earlier, later]);
    }

    #[test]
    fn same_date_is_ordered_by_id() {
        let conn = get_test_connection();
        let alice = insert_user("alice", &conn);
        let date = datetime!(2025-10-04 12:00:00);
        let first = insert(&alice, TransactionType::Expense, 1.0, "a", date, &conn);
        let second = insert(&alice, TransactionType::Expense, 2.0, "b", date, &conn);

        let transactions =
            get_transactions(alice.id, &TransactionFilter::default(), &conn).unwrap();

        assert_eq!(transactions, [first, second]);
    }

    #[test]
    fn filters_compose_with_and() {
        let conn = get_test_connection();
        let alice = insert_user("alice", &conn);
        let date = datetime!(2025-10-05 12:00:00);
        insert(&alice, TransactionType::Income, 100.0, "salary", date, &conn);
        let food = insert(&alice, TransactionType::Expense, 40.0, "food", date, &conn);
        insert(&alice, TransactionType::Expense, 15.0, "transport", date, &conn);
        insert(&alice, TransactionType::Income, 3.0, "food", date, &conn);

        let filter = TransactionFilter {
            transaction_type: Some(TransactionType::Expense),
            category: Some("food".to_owned()),
            ..Default::default()
        };
        let transactions = get_transactions(alice.id, &filter, &conn).unwrap();

        assert_eq!(transactions, [food]);
    }

    #[test]
    fn end_date_includes_whole_day() {
        let conn = get_test_connection();
        let alice = insert_user("alice", &conn);
        let last_second = insert(
            &alice,
            TransactionType::Expense,
            1.0,
            "food",
            datetime!(2025-10-05 23:59:59),
            &conn,
        );
        insert(
            &alice,
            TransactionType::Expense,
            2.0,
            "food",
            datetime!(2025-10-06 00:00:01),
            &conn,
        );

        let filter = TransactionFilter {
            end_date: Some(date!(2025 - 10 - 05)),
            ..Default::default()
        };
        let transactions = get_transactions(alice.id, &filter, &conn).unwrap();

        assert_eq!(transactions, [last_second]);
    }

    #[test]
    fn start_date_includes_midnight() {
        let conn = get_test_connection();
        let alice = insert_user("alice", &conn);
        insert(
            &alice,
            TransactionType::Expense,
            1.0,
            "food",
            datetime!(2025-10-04 23:59:59),
            &conn,
        );
        let midnight = insert(
            &alice,
            TransactionType::Expense,
            2.0,
            "food",
            datetime!(2025-10-05 00:00:00),
            &conn,
        );

        let filter = TransactionFilter {
            start_date: Some(date!(2025 - 10 - 05)),
            ..Default::default()
        };
        let transactions = get_transactions(alice.id, &filter, &conn).unwrap();

        assert_eq!(transactions, [midnight]);
    }

    #[test]
    fn totals_equal_sum_of_listed_transactions() {
        let conn = get_test_connection();
        let alice = insert_user("alice", &conn);
        let bob = insert_user("bob", &conn);
        let date = datetime!(2025-10-05 12:00:00);
        insert(&alice, TransactionType::Income, 1.0, "salary", date, &conn);
        insert(&alice, TransactionType::Expense, 0.1, "food", date, &conn);
        insert(&alice, TransactionType::Expense, 0.2, "food", date, &conn);
        insert(&alice, TransactionType::Expense, 0.3, "transport", date, &conn);
        insert(&bob, TransactionType::Income, 1000.0, "salary", date, &conn);

        let filters = [
            TransactionFilter::default(),
            TransactionFilter {
                transaction_type: Some(TransactionType::Expense),
                ..Default::default()
            },
            TransactionFilter {
                category: Some("food".to_owned()),
                ..Default::default()
            },
            TransactionFilter {
                start_date: Some(date!(2025 - 10 - 06)),
                ..Default::default()
            },
        ];

        for filter in filters {
            let transactions = get_transactions(alice.id, &filter, &conn).unwrap();
            let mut income = 0.0;
            let mut expenses = 0.0;
            for transaction in &transactions {
                match transaction.transaction_type {
                    TransactionType::Income => income += transaction.amount,
                    TransactionType::Expense => expenses += transaction.amount,
                }
            }

            let totals = get_totals(alice.id, &filter, &conn).unwrap();
            let filtered = filter_transactions(alice.id, &filter, &conn).unwrap();

            assert_eq!(totals.total_income, income, "income differs for {filter:?}");
            assert_eq!(totals.total_expenses, expenses, "expenses differ for {filter:?}");
            assert_eq!(totals.remaining, income - expenses, "remaining differs for {filter:?}");
            assert_eq!(totals, filtered.totals, "totals differ for {filter:?}");
        }
    }

    #[test]
    fn totals_of_income_and_expense() {
        let conn = get_test_connection();
        let alice = insert_user("alice", &conn);
        let date = datetime!(2025-10-05 12:00:00);
        insert(&alice, TransactionType::Income, 100.0, "salary", date, &conn);
        insert(&alice, TransactionType::Expense, 40.0, "food", date, &conn);

        let totals = get_totals(alice.id, &TransactionFilter::default(), &conn).unwrap();

        assert_eq!(
            totals,
            Totals {
                total_income: 100.0,
                total_expenses: 40.0,
                remaining: 60.0,
            }
        );
    }

    #[test]
    fn totals_are_zero_without_transactions() {
        let conn = get_test_connection();
        let alice = insert_user("alice", &conn);

        let totals = get_totals(alice.id, &TransactionFilter::default(), &conn).unwrap();

        assert_eq!(totals, Totals::default());
    }

    #[test]
    fn categories_are_distinct_and_sorted() {
        let conn = get_test_connection();
        let alice = insert_user("alice", &conn);
        let bob = insert_user("bob", &conn);
        let date = datetime!(2025-10-05 12:00:00);
        insert(&alice, TransactionType::Expense, 1.0, "transport", date, &conn);
        insert(&alice, TransactionType::Expense, 1.0, "food", date, &conn);
        insert(&alice, TransactionType::Income, 1.0, "food", date, &conn);
        insert(&bob, TransactionType::Income, 1.0, "gifts", date, &conn);

        let categories = get_categories(alice.id, &conn).unwrap();

        assert_eq!(categories, ["food", "transport"]);
    }
}
