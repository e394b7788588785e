//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/confirm/{token}', use [format_endpoint].

/// The root route which redirects to the dashboard.
pub const ROOT: &str = "/";
/// The landing page for logged in users.
pub const DASHBOARD_VIEW: &str = "/dashboard";
/// The page for displaying and filtering a user's transactions.
pub const TRANSACTIONS_VIEW: &str = "/transactions";
/// The page and form endpoint for recording income.
pub const INCOME: &str = "/income";
/// The page and form endpoint for recording an expense.
pub const EXPENSE: &str = "/expense";
/// The page and form endpoint for creating an account.
pub const SIGN_UP: &str = "/signup";
/// The page and form endpoint for logging in.
pub const LOG_IN: &str = "/login";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/logout";
/// The route that consumes an email confirmation token.
pub const CONFIRM_EMAIL: &str = "/confirm/{token}";
/// The page and form endpoint for requesting a password reset email.
pub const RESET_PASSWORD_REQUEST: &str = "/reset_password_request";
/// The page and form endpoint that consumes a password reset token.
pub const RESET_PASSWORD: &str = "/reset_password/{token}";
/// The page to display when an internal server error occurs.
pub const INTERNAL_ERROR_VIEW: &str = "/error";
/// The route for static files.
pub const STATIC: &str = "/static";

/// The JSON aggregate totals for the current user.
pub const TOTALS_API: &str = "/api/totals";
/// The JSON list of the current user's transactions.
pub const TRANSACTIONS_API: &str = "/api/transactions";

/// Replace the parameter in `endpoint_path` with `value`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/confirm/{token}', '{token}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, value: impl std::fmt::Display) -> String {
    let mut param_start = None;
    let mut param_end = None;

    for (i, c) in endpoint_path.chars().enumerate() {
        if c == '{' {
            param_start = Some(i);
        } else if param_start.is_some() && c == '}' {
            param_end = Some(i + 1);
            break;
        }
    }

    let param_start = match param_start {
        Some(start) => start,
        None => return endpoint_path.to_string(),
    };

    let param_end = param_end.unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        value,
        &endpoint_path[param_end..]
    )
}
