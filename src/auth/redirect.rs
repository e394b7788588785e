//! Helpers for redirect URLs during authentication flows.
//!
//! After logging in, the user is sent back to the page they originally asked
//! for. That page travels through the `next` query parameter, so it must be
//! checked to be a relative path on this site before it is used.

use axum::{extract::Request, http::Uri};
use tracing::{error, warn};

use crate::endpoints;

/// The query parameter carrying the page to return to after logging in.
pub const NEXT_PARAM: &str = "next";

fn is_safe_redirect_url(redirect_url: &str) -> bool {
    if !redirect_url.starts_with('/')
        || redirect_url.starts_with("//")
        || redirect_url.contains('\\')
    {
        return false;
    }

    let path = redirect_url
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(redirect_url);

    path != endpoints::LOG_IN
}

/// Return `raw_url` if it is a same-origin relative path that is not the log-in page.
pub fn normalize_redirect_url(raw_url: &str) -> Option<String> {
    if raw_url.contains('\\') {
        return None;
    }

    let uri = raw_url.parse::<Uri>().ok()?;
    if uri.scheme().is_some() || uri.authority().is_some() {
        return None;
    }
    let path_and_query = uri.path_and_query()?.as_str();

    is_safe_redirect_url(path_and_query).then(|| path_and_query.to_owned())
}

/// Parse an optional redirect URL, logging rejected values.
pub fn parse_redirect_url(raw_url: Option<&str>, source: &str) -> Option<String> {
    match raw_url.and_then(normalize_redirect_url) {
        Some(redirect_url) => Some(redirect_url),
        None => {
            if let Some(redirect_url) = raw_url.filter(|url| !url.is_empty()) {
                warn!("Invalid redirect URL from {source}: {redirect_url}");
            }
            None
        }
    }
}

fn normalize_hx_current_url(raw_url: &str) -> Option<String> {
    let uri = raw_url.parse::<Uri>().ok()?;
    let path_and_query = uri.path_and_query()?.as_str();

    is_safe_redirect_url(path_and_query).then(|| path_and_query.to_owned())
}

/// Build the log-in URL that returns the user to the page `request` was for.
///
/// HTMX requests are redirected back to the page the request was made from
/// (the `HX-Current-URL` header) rather than to the form endpoint itself.
pub fn build_log_in_redirect_url(request: &Request) -> Option<String> {
    let redirect_target = if is_hx_request(request) {
        redirect_target_from_hx_request(request)?
    } else {
        redirect_target_from_request_uri(request)?
    };

    build_log_in_redirect_url_from_target(&redirect_target)
}

pub(super) fn build_log_in_redirect_url_from_target(redirect_target: &str) -> Option<String> {
    match serde_urlencoded::to_string([(NEXT_PARAM, redirect_target)]) {
        Ok(param) => Some(format!("{}?{}", endpoints::LOG_IN, param)),
        Err(error) => {
            error!("Could not encode redirect URL {redirect_target}: {error}");
            None
        }
    }
}

fn is_hx_request(request: &Request) -> bool {
    request
        .headers()
        .get("hx-request")
        .and_then(|header| header.to_str().ok())
        .map(|header| header.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn redirect_target_from_request_uri(request: &Request) -> Option<String> {
    let path_and_query = request.uri().path_and_query()?.as_str();
    normalize_redirect_url(path_and_query)
}

fn redirect_target_from_hx_request(request: &Request) -> Option<String> {
    let current_url = match request
        .headers()
        .get("hx-current-url")
        .and_then(|header| header.to_str().ok())
    {
        Some(value) => value,
        None => {
            warn!("Missing HX-Current-URL header for HTMX request.");
            return None;
        }
    };

    let redirect_url = normalize_hx_current_url(current_url);
    if redirect_url.is_none() {
        warn!("Invalid HX-Current-URL header value: {current_url}");
    }

    redirect_url
}
