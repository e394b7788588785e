//! Income and expense transactions.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - Filtering and summing a user's transactions
//! - The pages for recording and viewing transactions, and the JSON API

mod api;
mod core;
mod create_endpoint;
mod filter;
mod transactions_page;
mod view;

pub use api::{get_totals_api, get_transactions_api};
pub use core::{
    Transaction, TransactionBuilder, TransactionType, create_transaction,
    create_transaction_table, map_transaction_row,
};
pub use create_endpoint::{
    create_expense_endpoint, create_income_endpoint, get_expense_page, get_income_page,
};
pub use filter::{
    FilterQuery, FilteredTransactions, Totals, TransactionFilter, filter_transactions,
    get_categories, get_totals, get_transactions,
};
pub use transactions_page::get_transactions_page;
pub(crate) use view::totals_view;

#[cfg(test)]
pub use core::count_transactions;
