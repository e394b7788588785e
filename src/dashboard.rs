//! The dashboard page with the totals for the whole account.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use maud::{Markup, html};
use rusqlite::Connection;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    AppState, Error,
    auth::{UserID, get_user_by_id},
    endpoints,
    html::{BUTTON_PRIMARY_STYLE, BUTTON_SECONDARY_STYLE, PAGE_CONTAINER_STYLE, base},
    navigation::NavBar,
    timezone::local_now,
    transaction::{Totals, TransactionFilter, get_totals, totals_view},
};

const HEADER_DATE_FORMAT: &[BorrowedFormatItem] =
    format_description!("[weekday], [day padding:none] [month repr:long] [year]");

/// The state needed for displaying the dashboard page.
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// The database connection for reading transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// Display the income, expenses and remaining balance of the logged-in user.
///
/// The totals are computed from scratch on every request.
pub async fn get_dashboard_page(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Response, Error> {
    let today = local_now(&state.local_timezone)?.date();

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;
    let user = get_user_by_id(user_id, &connection)
        .inspect_err(|error| tracing::error!("could not get user {user_id}: {error}"))?;
    let totals = get_totals(user_id, &TransactionFilter::default(), &connection)
        .inspect_err(|error| tracing::error!("could not get totals: {error}"))?;

    Ok(dashboard_view(&user.username, today, &totals).into_response())
}

fn dashboard_view(username: &str, today: Date, totals: &Totals) -> Markup {
    let nav_bar = NavBar::new(endpoints::DASHBOARD_VIEW).into_html();
    // Fall back to the ISO date if the long form cannot be rendered.
    let today = today
        .format(HEADER_DATE_FORMAT)
        .unwrap_or_else(|_| today.to_string());

    let content = html! {
        (nav_bar)

        main class=(PAGE_CONTAINER_STYLE)
        {
            section class="w-full space-y-6 lg:max-w-5xl"
            {
                header
                {
                    h1 class="text-xl font-bold" { "Hi, " (username) }
                    p id="today" class="text-sm text-gray-500 dark:text-gray-400" { (today) }
                }

                (totals_view(totals))

                div class="grid grid-cols-1 gap-4 sm:grid-cols-2"
                {
                    a href=(endpoints::INCOME) class=(BUTTON_PRIMARY_STYLE) { "Add Income" }
                    a href=(endpoints::EXPENSE) class=(BUTTON_SECONDARY_STYLE) { "Add Expense" }
                }
            }
        }
    };

    base("Dashboard", &[], &content)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Extension, extract::State, http::StatusCode};
    use rusqlite::Connection;
    use scraper::{Html, Selector};
    use time::macros::{date, datetime};

    use crate::{
        auth::User,
        db::initialize,
        test_utils::{assert_valid_html, insert_test_user, parse_html_document},
        transaction::{Transaction, TransactionType, create_transaction},
    };

    use super::{DashboardState, dashboard_view, get_dashboard_page};

    fn get_test_state() -> (DashboardState, User) {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let user = insert_test_user("alice", "hunter2", &connection);

        let state = DashboardState {
            db_connection: Arc::new(Mutex::new(connection)),
            local_timezone: "Etc/UTC".to_owned(),
        };

        (state, user)
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
    async fn shows_totals_for_whole_account() {
        let (state, user) = get_test_state();
        {
            let connection = state.db_connection.lock().unwrap();
            for (transaction_type, amount, category) in [
                (TransactionType::Income, 100.0, "salary"),
                (TransactionType::Expense, 40.0, "food"),
            ] {
                create_transaction(
                    Transaction::build(
                        transaction_type,
                        amount,
                        category,
                        datetime!(2025-10-05 14:30:00),
                    ),
                    user.id,
                    &connection,
                )
                .unwrap();
            }
        }

        let response = get_dashboard_page(State(state), Extension(user.id))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = parse_html_document(response).await;
        assert_valid_html(&html);
        assert_eq!(text_of(&html, "#total-income"), "$100.00");
        assert_eq!(text_of(&html, "#total-expenses"), "$40.00");
        assert_eq!(text_of(&html, "#remaining"), "$60.00");
    }

    #[tokio::test]
    async fn new_account_has_zero_totals() {
        let (state, user) = get_test_state();

        let response = get_dashboard_page(State(state), Extension(user.id))
            .await
            .unwrap();

        let html = parse_html_document(response).await;
        assert_eq!(text_of(&html, "#total-income"), "$0.00");
        assert_eq!(text_of(&html, "#remaining"), "$0.00");
    }

    #[test]
    fn header_shows_long_date() {
        let html = Html::parse_document(
            &dashboard_view("alice", date!(2025 - 10 - 05), &Default::default())
                .into_string(),
        );

        assert_eq!(text_of(&html, "h1"), "Hi, alice");
        assert_eq!(text_of(&html, "#today"), "Sunday, 5 October 2025");
    }
}
