// Logout handler
use actix_web::http::header::LOCATION;
use actix_web::{error, web, HttpRequest, HttpResponse, Result};
use log::error;

use crate::oauth::{build_logout_url, resolve_post_logout_url, TokenCache};
use crate::session::{SessionError, SessionManager};
use crate::settings::OidcSettings;
use crate::utils::logging::LoggingHelper;

/// Clear the session and redirect to the provider's end-session endpoint
///
/// Without a configured end-session endpoint, or without a stored ID token to pass as
/// `id_token_hint`, the browser goes straight to the post-logout URL.
///
/// # Errors
///
/// Returns an error if the session cannot be cleared or the end-session endpoint is
/// not a valid URL.
pub async fn oauth_logout(
    req: HttpRequest,
    settings: web::Data<OidcSettings>,
    session_manager: web::Data<SessionManager>,
    token_cache: web::Data<TokenCache>,
) -> Result<HttpResponse> {
    let mut response = HttpResponse::Found();

    let id_token = match session_manager.load(&req) {
        Ok(session) => {
            let token = session.access_token();
            session.clear(&req, Some(&mut response))?;
            token
        }
        Err(SessionError::Expired | SessionError::Store(_)) => {
            session_manager.expire_request_cookies(&req, &mut response);
            String::new()
        }
        Err(e) => return Err(e.into()),
    };

    if !id_token.is_empty() {
        token_cache.delete(&id_token);
    }

    let post_logout_url = {
        let conn = req.connection_info();
        resolve_post_logout_url(
            &settings.provider.post_logout_redirect_uri,
            conn.scheme(),
            conn.host(),
        )
    };

    let end_session = &settings.provider.end_session_endpoint;
    let provider_logout = !end_session.is_empty() && !id_token.is_empty();
    let target = if provider_logout {
        build_logout_url(end_session, &id_token, &post_logout_url).map_err(|e| {
            error!("Invalid end session endpoint: {e}");
            error::ErrorInternalServerError("OAuth provider misconfigured")
        })?
    } else {
        post_logout_url
    };

    LoggingHelper::log_logout_redirect(&target, provider_logout);
    Ok(response.append_header((LOCATION, target)).finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::Claims;
    use crate::testing::constants::TEST_END_SESSION_ENDPOINT;
    use crate::testing::{RequestBuilder, TestFixtures};
    use actix_web::cookie::Cookie;
    use actix_web::dev::ServiceResponse;
    use actix_web::http::StatusCode;
    use actix_web::cookie::time::Duration as CookieDuration;
    use actix_web::App;
    use std::sync::Arc;
    use std::time::Duration;
    use url::Url;

    async fn call(
        settings: OidcSettings,
        cache: Arc<TokenCache>,
        cookies: Vec<Cookie<'static>>,
    ) -> ServiceResponse {
        let app = actix_web::test::init_service(
            App::new()
                .app_data(web::Data::new(settings))
                .app_data(web::Data::new(TestFixtures::session_manager()))
                .app_data(web::Data::from(cache))
                .route("/oauth2/logout", web::get().to(oauth_logout)),
        )
        .await;

        let mut req = actix_web::test::TestRequest::get()
            .uri("/oauth2/logout")
            .insert_header(("Host", "app.example.com"));
        for cookie in cookies {
            req = req.cookie(cookie);
        }
        actix_web::test::call_service(&app, req.to_request()).await
    }

    fn authenticated_cookies(id_token: &str) -> Vec<Cookie<'static>> {
        let manager = TestFixtures::session_manager();
        let mut session = manager.new_session();
        session.set_authenticated(true);
        session.set_access_token(id_token);
        session.set_refresh_token("refresh-token");
        let mut cookies = Vec::new();
        session
            .save(&RequestBuilder::new().build(), &mut cookies)
            .unwrap();
        cookies
    }

    fn location(resp: &ServiceResponse) -> String {
        resp.headers()
            .get(LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[actix_web::test]
    async fn test_logout_redirects_to_provider_with_hint() {
        let settings = TestFixtures::settings("http://127.0.0.1:1/token");
        let cache = Arc::new(TokenCache::new());
        cache.set("id-token", Claims::new(), Duration::from_secs(60));

        let resp = call(settings, cache.clone(), authenticated_cookies("id-token")).await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        let target = Url::parse(&location(&resp)).unwrap();
        assert!(target.as_str().starts_with(TEST_END_SESSION_ENDPOINT));
        let params: Vec<(String, String)> = target.query_pairs().into_owned().collect();
        assert!(params.contains(&("id_token_hint".to_string(), "id-token".to_string())));
        assert!(params.contains(&(
            "post_logout_redirect_uri".to_string(),
            "http://app.example.com/".to_string()
        )));

        // Every session cookie is expired
        let cookies: Vec<_> = resp.response().cookies().collect();
        assert!(cookies.len() >= 3);
        assert!(cookies
            .iter()
            .all(|c| c.max_age() == Some(CookieDuration::ZERO) && c.value().is_empty()));
        for name in ["_oidc_raczylo_m", "_oidc_raczylo_a", "_oidc_raczylo_r"] {
            assert!(cookies.iter().any(|c| c.name() == name));
        }
        assert!(cache.get("id-token").is_none());
    }

    #[actix_web::test]
    async fn test_logout_without_provider_endpoint() {
        let mut settings = TestFixtures::settings("http://127.0.0.1:1/token");
        settings.provider.end_session_endpoint = String::new();
        settings.provider.post_logout_redirect_uri = "/goodbye".to_string();

        let resp = call(
            settings,
            Arc::new(TokenCache::new()),
            authenticated_cookies("id-token"),
        )
        .await;
        assert_eq!(location(&resp), "http://app.example.com/goodbye");
    }

    #[actix_web::test]
    async fn test_logout_without_session_skips_provider() {
        let settings = TestFixtures::settings("http://127.0.0.1:1/token");
        let resp = call(settings, Arc::new(TokenCache::new()), Vec::new()).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "http://app.example.com/");
    }

    #[actix_web::test]
    async fn test_logout_with_undecodable_session_expires_cookies() {
        let settings = TestFixtures::settings("http://127.0.0.1:1/token");
        let resp = call(
            settings,
            Arc::new(TokenCache::new()),
            vec![Cookie::new("_oidc_raczylo_m", "garbage")],
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let expired = resp
            .response()
            .cookies()
            .find(|c| c.name() == "_oidc_raczylo_m")
            .unwrap();
        assert_eq!(expired.max_age(), Some(CookieDuration::ZERO));
    }
}
