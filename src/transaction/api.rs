//! JSON endpoints for reading a user's transactions and totals.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::UserID,
    endpoints,
    transaction::{
        FilterQuery, Totals, Transaction,
        filter::{filter_transactions, get_totals},
    },
};

/// The state needed for the JSON API.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ApiState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

fn query_transactions(
    user_id: UserID,
    query: &FilterQuery,
    state: &ApiState,
) -> Result<Vec<Transaction>, Error> {
    let filter = query.parse()?;
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    filter_transactions(user_id, &filter, &connection).map(|filtered| filtered.transactions)
}

fn query_totals(user_id: UserID, query: &FilterQuery, state: &ApiState) -> Result<Totals, Error> {
    let filter = query.parse()?;
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_totals(user_id, &filter, &connection)
}

/// Get the logged-in user's transactions that match the query parameters as a JSON array.
pub async fn get_transactions_api(
    State(state): State<ApiState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<FilterQuery>,
) -> Response {
    if query.is_reset() {
        return Redirect::to(endpoints::TRANSACTIONS_API).into_response();
    }

    match query_transactions(user_id, &query, &state) {
        Ok(transactions) => Json(transactions).into_response(),
        Err(error) => error.into_json_response(),
    }
}

/// Get the income, expense and remaining totals of the logged-in user as JSON.
///
/// Accepts the same filters as [get_transactions_api] so that the totals
/// always agree with the listed transactions.
pub async fn get_totals_api(
    State(state): State<ApiState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<FilterQuery>,
) -> Response {
    if query.is_reset() {
        return Redirect::to(endpoints::TOTALS_API).into_response();
    }

    match query_totals(user_id, &query, &state) {
        Ok(totals) => Json(totals).into_response(),
        Err(error) => error.into_json_response(),
    }
}
