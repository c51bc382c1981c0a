#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use oidc_session::{
    handlers::{health, oauth_callback, oauth_logout, oauth_sign_in},
    oauth::{spawn_cleanup_task, TokenCache, TokenExchangeClient},
    settings::OidcSettings,
    utils::logging::LoggingHelper,
    SessionManager,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = OidcSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let session_manager = SessionManager::new(
        settings.session.session_secret.as_bytes(),
        settings.session.force_https,
    )
    .map_err(|e| std::io::Error::other(format!("Failed to initialize sessions: {e}")))?;

    let token_client =
        TokenExchangeClient::from_settings(&settings.provider, settings.http_timeout());

    let token_cache = Arc::new(TokenCache::new());
    let cleanup = spawn_cleanup_task(Arc::clone(&token_cache), settings.cleanup_interval());

    let result = start_server(settings, session_manager, token_client, token_cache).await;
    cleanup.abort();
    result
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    settings: OidcSettings,
    session_manager: SessionManager,
    token_client: TokenExchangeClient,
    token_cache: Arc<TokenCache>,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    LoggingHelper::log_server_start(&bind_address);

    let settings = web::Data::new(settings);
    let session_manager = web::Data::new(session_manager);
    let token_client = web::Data::new(token_client);
    let token_cache = web::Data::from(token_cache);

    HttpServer::new(move || {
        App::new()
            .app_data(settings.clone())
            .app_data(session_manager.clone())
            .app_data(token_client.clone())
            .app_data(token_cache.clone())
            .wrap(Logger::default())
            .configure(|cfg| configure_services(cfg, &settings.provider.callback_path))
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn configure_services(cfg: &mut web::ServiceConfig, callback_path: &str) {
    cfg
        // OAuth2 endpoints
        .route("/oauth2/sign_in", web::get().to(oauth_sign_in))
        .route(callback_path, web::get().to(oauth_callback))
        .route("/oauth2/logout", web::get().to(oauth_logout))
        .route("/oauth2/logout", web::post().to(oauth_logout))
        // Health endpoint
        .route("/ping", web::get().to(health));
}
