mod confirm_email;
mod cookie;
mod log_in;
mod log_out;
mod middleware;
mod notice;
mod password;
mod redirect;
mod reset_password;
mod sign_up;
mod token;
mod user;

pub use confirm_email::get_confirm_email;
pub(crate) use cookie::{
    DEFAULT_COOKIE_DURATION, get_token_from_cookies, invalidate_auth_cookie, set_auth_cookie,
};
pub use log_in::{get_log_in_page, post_log_in};
pub use log_out::get_log_out;
pub use middleware::{auth_guard, auth_guard_api, auth_guard_hx};
pub use notice::{Notice, NoticeQuery};
pub use password::{PasswordHash, ValidatedPassword};
pub use redirect::parse_redirect_url;
pub use reset_password::{
    get_reset_password_page, get_reset_password_request_page, post_reset_password,
    post_reset_password_request,
};
pub use sign_up::{get_sign_up_page, post_sign_up};
pub use token::{DEFAULT_TOKEN_MAX_AGE, InvalidToken, TokenPurpose, TokenSigner};
pub use user::{
    User, UserID, Username, create_user, create_user_table, get_user_by_email, get_user_by_id,
    get_user_by_username, mark_email_verified, parse_email, update_password,
};

#[cfg(test)]
pub(crate) use cookie::COOKIE_TOKEN;

#[cfg(test)]
pub use middleware::AuthState;

#[cfg(test)]
pub use user::count_users;
