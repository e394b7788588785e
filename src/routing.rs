//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Router, middleware,
    response::Redirect,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::{
    AppState,
    auth::{
        auth_guard, auth_guard_api, auth_guard_hx, get_confirm_email, get_log_in_page,
        get_log_out, get_reset_password_page, get_reset_password_request_page, get_sign_up_page,
        post_log_in, post_reset_password, post_reset_password_request, post_sign_up,
    },
    dashboard::get_dashboard_page,
    endpoints,
    internal_server_error::get_internal_server_error_page,
    not_found::get_404_not_found,
    transaction::{
        create_expense_endpoint, create_income_endpoint, get_expense_page, get_income_page,
        get_totals_api, get_transactions_api, get_transactions_page,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::ROOT, get(get_index_page))
        .route(endpoints::LOG_IN, get(get_log_in_page).post(post_log_in))
        .route(endpoints::SIGN_UP, get(get_sign_up_page).post(post_sign_up))
        .route(endpoints::CONFIRM_EMAIL, get(get_confirm_email))
        .route(
            endpoints::RESET_PASSWORD_REQUEST,
            get(get_reset_password_request_page).post(post_reset_password_request),
        )
        .route(
            endpoints::RESET_PASSWORD,
            get(get_reset_password_page).post(post_reset_password),
        )
        .route(
            endpoints::INTERNAL_ERROR_VIEW,
            get(get_internal_server_error_page),
        );

    let protected_routes = Router::new()
        .route(endpoints::DASHBOARD_VIEW, get(get_dashboard_page))
        .route(endpoints::TRANSACTIONS_VIEW, get(get_transactions_page))
        .route(endpoints::INCOME, get(get_income_page))
        .route(endpoints::EXPENSE, get(get_expense_page))
        .route(endpoints::LOG_OUT, get(get_log_out))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    // These POST routes need to use the HX-REDIRECT header for auth redirects to work properly for HTMX requests.
    let protected_routes = protected_routes.merge(
        Router::new()
            .route(endpoints::INCOME, post(create_income_endpoint))
            .route(endpoints::EXPENSE, post(create_expense_endpoint))
            .layer(middleware::from_fn_with_state(state.clone(), auth_guard_hx)),
    );

    let api_routes = Router::new()
        .route(endpoints::TRANSACTIONS_API, get(get_transactions_api))
        .route(endpoints::TOTALS_API, get(get_totals_api))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard_api));

    protected_routes
        .merge(api_routes)
        .merge(unprotected_routes)
        .nest_service(endpoints::STATIC, ServeDir::new("static/"))
        .fallback(get_404_not_found)
        .with_state(state)
}

/// The root path '/' redirects to the dashboard page.
async fn get_index_page() -> Redirect {
    Redirect::to(endpoints::DASHBOARD_VIEW)
}
