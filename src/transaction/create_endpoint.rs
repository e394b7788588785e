//! Defines the pages and endpoints for recording income and expenses.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
// Must use axum_extra's Form since that parses an empty string as None instead
// of crashing like axum::Form.
use axum_extra::extract::Form;
use axum_htmx::HxRedirect;
use maud::{Markup, html};
use rusqlite::Connection;
use serde::Deserialize;
use time::{Date, PrimitiveDateTime};

use crate::{
    AppState, Error,
    auth::UserID,
    endpoints,
    html::{
        FORM_CONTAINER_STYLE, FORM_LABEL_STYLE, FORM_TEXT_INPUT_STYLE, base, dollar_input_styles,
        submit_button,
    },
    navigation::NavBar,
    timezone::local_now,
    transaction::{
        Transaction, TransactionType, core::create_transaction,
        filter::{DATE_FORMAT, get_categories},
    },
};

/// The state needed to get or create a transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for CreateTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

fn endpoint_for(transaction_type: TransactionType) -> &'static str {
    match transaction_type {
        TransactionType::Income => endpoints::INCOME,
        TransactionType::Expense => endpoints::EXPENSE,
    }
}

fn create_transaction_view(
    transaction_type: TransactionType,
    max_date: Date,
    categories: &[String],
) -> Markup {
    let endpoint = endpoint_for(transaction_type);
    let nav_bar = NavBar::new(endpoint).into_html();
    let (title, button_text) = match transaction_type {
        TransactionType::Income => ("Add Income", "Save income"),
        TransactionType::Expense => ("Add Expense", "Save expense"),
    };

    let content = html! {
        (nav_bar)

        div class=(FORM_CONTAINER_STYLE)
        {
            form
                hx-post=(endpoint)
                hx-target-error="#alert-container"
                hx-disabled-elt="#submit-button"
                class="w-full max-w-md space-y-4 md:space-y-6"
            {
                h2 class="text-xl font-bold" { (title) }

                div
                {
                    label for="amount" class=(FORM_LABEL_STYLE) { "Amount" }

                    // w-full needed to ensure input takes the full width when prefilled with a value
                    div class="input-wrapper w-full"
                    {
                        input
                            name="amount"
                            id="amount"
                            type="number"
                            step="0.01"
                            min="0"
                            placeholder="0.00"
                            required
                            autofocus
                            class=(FORM_TEXT_INPUT_STYLE);
                    }
                }

                div
                {
                    label for="category" class=(FORM_LABEL_STYLE) { "Category" }

                    input
                        name="category"
                        id="category"
                        type="text"
                        list="category-options"
                        placeholder="e.g. Groceries"
                        required
                        class=(FORM_TEXT_INPUT_STYLE);

                    datalist id="category-options"
                    {
                        @for category in categories {
                            option value=(category) {}
                        }
                    }
                }

                div
                {
                    label for="description" class=(FORM_LABEL_STYLE) { "Description" }

                    input
                        name="description"
                        id="description"
                        type="text"
                        placeholder="Optional"
                        class=(FORM_TEXT_INPUT_STYLE);
                }

                div
                {
                    label for="date" class=(FORM_LABEL_STYLE) { "Date" }

                    input
                        name="date"
                        id="date"
                        type="date"
                        max=(max_date)
                        value=(max_date)
                        class=(FORM_TEXT_INPUT_STYLE);
                }

                (submit_button(button_text))
            }
        }
    };

    base(title, &[dollar_input_styles()], &content)
}

async fn get_create_transaction_page(
    transaction_type: TransactionType,
    state: CreateTransactionState,
    user_id: UserID,
) -> Result<Response, Error> {
    let today = local_now(&state.local_timezone)?.date();

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;
    let categories = get_categories(user_id, &connection)?;

    Ok(create_transaction_view(transaction_type, today, &categories).into_response())
}

/// Display the form for recording income.
pub async fn get_income_page(
    State(state): State<CreateTransactionState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Response, Error> {
    get_create_transaction_page(TransactionType::Income, state, user_id).await
}

/// Display the form for recording an expense.
pub async fn get_expense_page(
    State(state): State<CreateTransactionState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Response, Error> {
    get_create_transaction_page(TransactionType::Expense, state, user_id).await
}

/// The form data for creating a transaction.
#[derive(Debug, Deserialize)]
pub struct TransactionForm {
    /// The value of the transaction in dollars.
    pub amount: String,
    /// What the money was earned or spent on, e.g. "Groceries".
    pub category: String,
    /// Text detailing the transaction.
    pub description: Option<String>,
    /// The date when the transaction occurred as YYYY-MM-DD. Defaults to today.
    pub date: Option<String>,
}

fn parse_amount(raw_amount: &str) -> Result<f64, Error> {
    raw_amount
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite() && *amount >= 0.0)
        .ok_or_else(|| Error::InvalidAmount(raw_amount.to_owned()))
}

/// Work out when the transaction happened from the optional form date.
///
/// A date from the form takes the current local time of day so that
/// transactions entered on the same day keep the order they were entered in.
fn resolve_date(raw_date: Option<&str>, now: PrimitiveDateTime) -> Result<PrimitiveDateTime, Error> {
    let Some(raw_date) = raw_date.map(str::trim).filter(|date| !date.is_empty()) else {
        return Ok(now);
    };

    let date = Date::parse(raw_date, DATE_FORMAT)
        .map_err(|_| Error::InvalidDate(raw_date.to_owned()))?;

    if date > now.date() {
        return Err(Error::FutureDate(date));
    }

    Ok(PrimitiveDateTime::new(date, now.time()))
}

fn create_transaction_from_form(
    transaction_type: TransactionType,
    form: &TransactionForm,
    user_id: UserID,
    state: &CreateTransactionState,
) -> Result<Transaction, Error> {
    let amount = parse_amount(&form.amount)?;
    let now = local_now(&state.local_timezone)?;
    let date = resolve_date(form.date.as_deref(), now)?;

    let builder = Transaction::build(transaction_type, amount, &form.category, date)
        .description(form.description.as_deref());

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    create_transaction(builder, user_id, &connection)
}

fn create_transaction_response(
    transaction_type: TransactionType,
    form: TransactionForm,
    user_id: UserID,
    state: CreateTransactionState,
) -> Response {
    match create_transaction_from_form(transaction_type, &form, user_id, &state) {
        Ok(transaction) => {
            tracing::info!(
                "Created {} transaction {} for user {user_id}",
                transaction.transaction_type,
                transaction.id
            );

            (
                HxRedirect(endpoints::TRANSACTIONS_VIEW.to_owned()),
                StatusCode::SEE_OTHER,
            )
                .into_response()
        }
        Err(error) => {
            tracing::debug!("could not create transaction: {error}");
            error.into_alert_response()
        }
    }
}

/// A route handler for recording income, redirects to the transactions view on success.
pub async fn create_income_endpoint(
    State(state): State<CreateTransactionState>,
    Extension(user_id): Extension<UserID>,
    Form(form): Form<TransactionForm>,
) -> Response {
    create_transaction_response(TransactionType::Income, form, user_id, state)
}

/// A route handler for recording an expense, redirects to the transactions view on success.
pub async fn create_expense_endpoint(
    State(state): State<CreateTransactionState>,
    Extension(user_id): Extension<UserID>,
    Form(form): Form<TransactionForm>,
) -> Response {
    create_transaction_response(TransactionType::Expense, form, user_id, state)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Extension,
        body::Body,
        extract::State,
        http::{Response, StatusCode},
    };
    use axum_extra::extract::Form;
    use rusqlite::Connection;
    use scraper::Selector;
    use time::{Duration, OffsetDateTime, macros::datetime};

    use crate::{
        Error,
        auth::{User, UserID},
        db::initialize,
        endpoints,
        test_utils::{
            assert_hx_endpoint, assert_hx_redirect, assert_valid_html, insert_test_user,
            must_get_form, parse_html_document,
        },
        transaction::{
            Transaction, TransactionType, create_transaction,
            filter::{TransactionFilter, get_transactions},
        },
    };

    use super::{
        CreateTransactionState, TransactionForm, create_expense_endpoint, create_income_endpoint,
        get_expense_page, get_income_page, parse_amount, resolve_date,
    };

    fn get_test_state() -> (CreateTransactionState, User) {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let user = insert_test_user("alice", "hunter2", &connection);

        let state = CreateTransactionState {
            db_connection: Arc::new(Mutex::new(connection)),
            local_timezone: "Etc/UTC".to_owned(),
        };

        (state, user)
    }

    fn form(amount: &str, category: &str, date: Option<&str>) -> TransactionForm {
        TransactionForm {
            amount: amount.to_owned(),
            category: category.to_owned(),
            description: None,
            date: date.map(str::to_owned),
        }
    }

    fn all_transactions(state: &CreateTransactionState, user_id: UserID) -> Vec<Transaction> {
        get_transactions(
            user_id,
            &TransactionFilter::default(),
            &state.db_connection.lock().unwrap(),
        )
        .unwrap()
    }

    #[track_caller]
    fn assert_alert_status(response: &Response<Body>, status: StatusCode) {
        assert_eq!(response.status(), status);
        assert!(response.headers().get("hx-redirect").is_none());
    }

    #[tokio::test]
    async fn income_page_has_form() {
        let (state, user) = get_test_state();

        let response = get_income_page(State(state), Extension(user.id))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let document = parse_html_document(response).await;
        assert_valid_html(&document);
        let form = must_get_form(&document);
        assert_hx_endpoint(&form, endpoints::INCOME, "hx-post");
        for name in ["amount", "category", "description", "date"] {
            let selector = Selector::parse(&format!("input[name=\"{name}\"]")).unwrap();
            assert_eq!(form.select(&selector).count(), 1, "missing input {name}");
        }
    }

    #[tokio::test]
    async fn expense_page_suggests_existing_categories() {
        let (state, user) = get_test_state();
        create_transaction(
            Transaction::build(
                TransactionType::Expense,
                12.0,
                "Groceries",
                datetime!(2025-10-05 14:30:00),
            ),
            user.id,
            &state.db_connection.lock().unwrap(),
        )
        .unwrap();

        let response = get_expense_page(State(state), Extension(user.id))
            .await
            .unwrap();

        let document = parse_html_document(response).await;
        let form = must_get_form(&document);
        assert_hx_endpoint(&form, endpoints::EXPENSE, "hx-post");
        let options = Selector::parse("datalist#category-options option").unwrap();
        let categories: Vec<_> = document
            .select(&options)
            .filter_map(|option| option.value().attr("value"))
            .collect();
        assert_eq!(categories, ["Groceries"]);
    }

    #[tokio::test]
    async fn can_create_income() {
        let (state, user) = get_test_state();

        let response = create_income_endpoint(
            State(state.clone()),
            Extension(user.id),
            Form(form("100", "Salary", None)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_hx_redirect(&response, endpoints::TRANSACTIONS_VIEW);
        let transactions = all_transactions(&state, user.id);
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].transaction_type, TransactionType::Income);
        assert_eq!(transactions[0].amount, 100.0);
        assert_eq!(transactions[0].category, "Salary");
        assert_eq!(transactions[0].user_id, user.id);
    }

    #[tokio::test]
    async fn can_create_expense_with_past_date() {
        let (state, user) = get_test_state();

        let response = create_expense_endpoint(
            State(state.clone()),
            Extension(user.id),
            Form(TransactionForm {
                description: Some("weekly shop".to_owned()),
                ..form("40.5", "food", Some("2025-10-05"))
            }),
        )
        .await;

        assert_hx_redirect(&response, endpoints::TRANSACTIONS_VIEW);
        let transactions = all_transactions(&state, user.id);
        assert_eq!(transactions[0].transaction_type, TransactionType::Expense);
        assert_eq!(transactions[0].amount, 40.5);
        assert_eq!(transactions[0].description.as_deref(), Some("weekly shop"));
        assert_eq!(transactions[0].date.date(), time::macros::date!(2025 - 10 - 05));
    }

    #[tokio::test]
    async fn rejects_invalid_amounts() {
        let (state, user) = get_test_state();

        for amount in ["", "abc", "-5", "NaN", "inf"] {
            let response = create_income_endpoint(
                State(state.clone()),
                Extension(user.id),
                Form(form(amount, "Salary", None)),
            )
            .await;

            assert_alert_status(&response, StatusCode::BAD_REQUEST);
        }

        assert!(all_transactions(&state, user.id).is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_category() {
        let (state, user) = get_test_state();

        let response = create_expense_endpoint(
            State(state.clone()),
            Extension(user.id),
            Form(form("10", "   ", None)),
        )
        .await;

        assert_alert_status(&response, StatusCode::BAD_REQUEST);
        assert!(all_transactions(&state, user.id).is_empty());
    }

    #[tokio::test]
    async fn rejects_future_date() {
        let (state, user) = get_test_state();
        let tomorrow = OffsetDateTime::now_utc().date() + Duration::days(1);

        let response = create_expense_endpoint(
            State(state.clone()),
            Extension(user.id),
            Form(form("10", "food", Some(&tomorrow.to_string()))),
        )
        .await;

        assert_alert_status(&response, StatusCode::BAD_REQUEST);
        assert!(all_transactions(&state, user.id).is_empty());
    }

    #[test]
    fn parse_amount_accepts_zero_and_decimals() {
        assert_eq!(parse_amount("0"), Ok(0.0));
        assert_eq!(parse_amount(" 12.34 "), Ok(12.34));
    }

    #[test]
    fn resolve_date_keeps_time_of_day() {
        let now = datetime!(2025-10-05 14:30:00);

        assert_eq!(resolve_date(None, now), Ok(now));
        assert_eq!(resolve_date(Some(""), now), Ok(now));
        assert_eq!(
            resolve_date(Some("2025-10-01"), now),
            Ok(datetime!(2025-10-01 14:30:00))
        );
        assert_eq!(
            resolve_date(Some("01/10/2025"), now),
            Err(Error::InvalidDate("01/10/2025".to_owned()))
        );
    }
}
