// HTTP request handlers for the OIDC login flow
pub mod callback;
pub mod health;
pub mod logout;
pub mod sign_in;

use actix_web::HttpRequest;

use crate::settings::OidcSettings;

pub use callback::oauth_callback;
pub use health::health;
pub use logout::oauth_logout;
pub use sign_in::oauth_sign_in;

/// Absolute callback URL for this request's scheme and host
#[must_use]
pub fn callback_url(req: &HttpRequest, settings: &OidcSettings) -> String {
    let conn = req.connection_info();
    format!(
        "{}://{}{}",
        conn.scheme(),
        conn.host(),
        settings.provider.callback_path
    )
}

/// Keep only same-site relative paths as post-login targets
#[must_use]
pub fn sanitize_redirect_path(path: Option<&str>) -> String {
    match path {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
