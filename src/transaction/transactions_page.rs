//! Defines the route handler for the page that displays a user's transactions as a filterable table.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use maud::{Markup, html};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::UserID,
    endpoints,
    html::{
        BUTTON_PRIMARY_STYLE, BUTTON_SECONDARY_STYLE, FORM_LABEL_STYLE, FORM_TEXT_INPUT_STYLE,
        LINK_STYLE, PAGE_CONTAINER_STYLE, base,
    },
    navigation::NavBar,
    transaction::{
        FilterQuery, FilteredTransactions, TransactionFilter, TransactionType,
        filter::{filter_transactions, get_categories},
        view::{totals_view, transactions_table},
    },
};

/// The state needed for the transactions page.
#[derive(Debug, Clone)]
pub struct TransactionsViewState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for TransactionsViewState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Render the transactions of the logged-in user that match the query parameters.
///
/// A non-empty `reset` parameter clears the filters by redirecting to the bare page.
///
/// # Errors
///
/// Returns [Error::InvalidFilter] if a query parameter cannot be parsed, which
/// is rendered as a 400 page.
pub async fn get_transactions_page(
    State(state): State<TransactionsViewState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<FilterQuery>,
) -> Result<Response, Error> {
    if query.is_reset() {
        return Ok(Redirect::to(endpoints::TRANSACTIONS_VIEW).into_response());
    }

    let filter = query.parse()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;
    let filtered = filter_transactions(user_id, &filter, &connection)
        .inspect_err(|error| tracing::error!("could not get transactions: {error}"))?;
    let categories = get_categories(user_id, &connection)
        .inspect_err(|error| tracing::error!("could not get categories: {error}"))?;

    Ok(transactions_view(&filter, &categories, &filtered).into_response())
}

fn type_option(value: &str, label: &str, selected: bool) -> Markup {
    html! {
        option value=(value) selected[selected] { (label) }
    }
}

fn filter_form(filter: &TransactionFilter, categories: &[String]) -> Markup {
    let selected_category = filter.category.as_deref().unwrap_or_default();
    let start_date = filter.start_date.map(|date| date.to_string()).unwrap_or_default();
    let end_date = filter.end_date.map(|date| date.to_string()).unwrap_or_default();

    html! {
        form
            method="get"
            action=(endpoints::TRANSACTIONS_VIEW)
            id="filter-form"
            class="grid w-full grid-cols-1 gap-4 sm:grid-cols-2 lg:grid-cols-4"
        {
            div
            {
                label for="type" class=(FORM_LABEL_STYLE) { "Type" }

                select name="type" id="type" class=(FORM_TEXT_INPUT_STYLE)
                {
                    (type_option("", "All", filter.transaction_type.is_none()))
                    @for transaction_type in [TransactionType::Income, TransactionType::Expense] {
                        (type_option(
                            transaction_type.as_str(),
                            match transaction_type {
                                TransactionType::Income => "Income",
                                TransactionType::Expense => "Expenses",
                            },
                            filter.transaction_type == Some(transaction_type),
                        ))
                    }
                }
            }

            div
            {
                label for="category" class=(FORM_LABEL_STYLE) { "Category" }

                select name="category" id="category" class=(FORM_TEXT_INPUT_STYLE)
                {
                    option value="" selected[selected_category.is_empty()] { "All" }
                    @for category in categories {
                        option value=(category) selected[category == selected_category] { (category) }
                    }
                }
            }

            div
            {
                label for="start_date" class=(FORM_LABEL_STYLE) { "From" }

                input
                    type="date"
                    name="start_date"
                    id="start_date"
                    value=(start_date)
                    class=(FORM_TEXT_INPUT_STYLE);
            }

            div
            {
                label for="end_date" class=(FORM_LABEL_STYLE) { "To" }

                input
                    type="date"
                    name="end_date"
                    id="end_date"
                    value=(end_date)
                    class=(FORM_TEXT_INPUT_STYLE);
            }

            div class="flex gap-4 sm:col-span-2 lg:col-span-4"
            {
                button type="submit" class=(BUTTON_PRIMARY_STYLE) { "Filter" }
                button type="submit" name="reset" value="true" class=(BUTTON_SECONDARY_STYLE)
                {
                    "Clear filters"
                }
            }
        }
    }
}

fn transactions_view(
    filter: &TransactionFilter,
    categories: &[String],
    filtered: &FilteredTransactions,
) -> Markup {
    let nav_bar = NavBar::new(endpoints::TRANSACTIONS_VIEW).into_html();

    let content = html! {
        (nav_bar)

        main class=(PAGE_CONTAINER_STYLE)
        {
            section class="w-full space-y-6 lg:max-w-5xl"
            {
                header class="flex justify-between flex-wrap items-end gap-4"
                {
                    h1 class="text-xl font-bold" { "Transactions" }

                    div class="flex gap-6"
                    {
                        a href=(endpoints::INCOME) class=(LINK_STYLE) { "Add Income" }
                        a href=(endpoints::EXPENSE) class=(LINK_STYLE) { "Add Expense" }
                    }
                }

                (filter_form(filter, categories))

                (totals_view(&filtered.totals))

                (transactions_table(&filtered.transactions))
            }
        }
    };

    base("Transactions", &[], &content)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Extension,
        extract::{Query, State},
        http::StatusCode,
        response::IntoResponse,
    };
    use rusqlite::Connection;
    use scraper::{Html, Selector};
    use time::macros::datetime;

    use crate::{
        Error,
        auth::User,
        db::initialize,
        endpoints,
        test_utils::{assert_valid_html, insert_test_user, parse_html_document},
        transaction::{FilterQuery, Transaction, TransactionType, create_transaction},
    };

    use super::{TransactionsViewState, get_transactions_page};

    fn get_test_state() -> (TransactionsViewState, User) {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let user = insert_test_user("alice", "hunter2", &connection);

        for (transaction_type, amount, category, date) in [
            (
                TransactionType::Income,
                100.0,
                "salary",
                datetime!(2025-10-01 09:00:00),
            ),
            (
                TransactionType::Expense,
                40.0,
                "food",
                datetime!(2025-10-02 12:00:00),
            ),
            (
                TransactionType::Expense,
                15.0,
                "transport",
                datetime!(2025-10-03 08:00:00),
            ),
        ] {
            create_transaction(
                Transaction::build(transaction_type, amount, category, date),
                user.id,
                &connection,
            )
            .unwrap();
        }

        let state = TransactionsViewState {
            db_connection: Arc::new(Mutex::new(connection)),
        };

        (state, user)
    }

    fn query(raw: &str) -> Query<FilterQuery> {
        Query(serde_urlencoded::from_str(raw).unwrap())
    }

    fn row_count(html: &Html) -> usize {
        html.select(&Selector::parse("tr[data-transaction-id]").unwrap())
            .count()
    }

    fn text_of(html: &Html, selector: &str) -> String {
        html.select(&Selector::parse(selector).unwrap())
            .next()
            .unwrap()
            .text()
            .collect::<String>()
            .trim()
            .to_owned()
    }

    #[tokio::test]
    async fn displays_all_transactions_without_filters() {
        let (state, user) = get_test_state();

        let response = get_transactions_page(State(state), Extension(user.id), query(""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = parse_html_document(response).await;
        assert_valid_html(&html);
        assert_eq!(row_count(&html), 3);
        assert_eq!(text_of(&html, "#total-income"), "$100.00");
        assert_eq!(text_of(&html, "#total-expenses"), "$55.00");
        assert_eq!(text_of(&html, "#remaining"), "$45.00");
    }

    #[tokio::test]
    async fn filters_rows_and_totals_together() {
        let (state, user) = get_test_state();

        let response = get_transactions_page(
            State(state),
            Extension(user.id),
            query("type=expense&category=food&start_date=&end_date="),
        )
        .await
        .unwrap();

        let html = parse_html_document(response).await;
        assert_eq!(row_count(&html), 1);
        assert_eq!(text_of(&html, "#total-income"), "$0.00");
        assert_eq!(text_of(&html, "#total-expenses"), "$40.00");
        assert_eq!(text_of(&html, "#remaining"), "-$40.00");
        assert_eq!(
            text_of(&html, "#category option[selected]"),
            "food",
            "the selected category should be kept in the form"
        );
    }

    #[tokio::test]
    async fn filters_by_date_range() {
        let (state, user) = get_test_state();

        let response = get_transactions_page(
            State(state),
            Extension(user.id),
            query("start_date=2025-10-02&end_date=2025-10-02"),
        )
        .await
        .unwrap();

        let html = parse_html_document(response).await;
        assert_eq!(row_count(&html), 1);
        assert_eq!(text_of(&html, "tr[data-transaction-id] td"), "2025-10-02");
    }

    #[tokio::test]
    async fn does_not_show_other_users_transactions() {
        let (state, _) = get_test_state();
        let other_user = insert_test_user("bob", "hunter2", &state.db_connection.lock().unwrap());

        let response = get_transactions_page(State(state), Extension(other_user.id), query(""))
            .await
            .unwrap();

        let html = parse_html_document(response).await;
        assert_eq!(row_count(&html), 0);
        assert_eq!(text_of(&html, "td[data-empty-state]"), "No transactions found.");
    }

    #[tokio::test]
    async fn reset_redirects_to_unfiltered_page() {
        let (state, user) = get_test_state();

        let response =
            get_transactions_page(State(state), Extension(user.id), query("type=income&reset=true"))
                .await
                .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get("location").unwrap(),
            endpoints::TRANSACTIONS_VIEW
        );
    }

    #[tokio::test]
    async fn invalid_filter_is_bad_request() {
        let (state, user) = get_test_state();

        let result =
            get_transactions_page(State(state), Extension(user.id), query("type=refund")).await;

        let error = result.unwrap_err();
        assert!(matches!(error, Error::InvalidFilter(_)));
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
