use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OidcSettings {
    pub application: ApplicationSettings,
    pub session: SessionSettings,
    pub provider: ProviderSettings,
    pub http_client: HttpClientSettings,
    pub token_cache: TokenCacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub session_secret: String,
    /// Mark cookies `Secure` even for plain-HTTP requests (TLS terminated upstream)
    pub force_https: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    /// Empty when the provider has no RP-initiated logout
    pub end_session_endpoint: String,
    /// Absolute URL or path; empty means the site root
    pub post_logout_redirect_uri: String,
    pub callback_path: String,
    pub scopes: Vec<String>,
    pub enable_pkce: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientSettings {
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCacheSettings {
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_secret: String::new(), // Will be generated if empty
            force_https: false,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            end_session_endpoint: String::new(),
            post_logout_redirect_uri: String::new(),
            callback_path: "/oauth2/callback".to_string(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            enable_pkce: true,
        }
    }
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
        }
    }
}

impl Default for TokenCacheSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: 300,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl OidcSettings {
    /// Load settings: defaults, then `Settings.toml`, then `OIDC_SECRETS_DIR/Settings.toml`,
    /// then environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_env_file();

        let (mut settings, sources) = Self::load_base_settings()?;
        Self::initialize_logger(&settings.logging.level);
        for source in &sources {
            log::info!("Loaded settings from {}", source.display());
        }

        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Install `env_logger`; `RUST_LOG` wins over the configured level
    fn initialize_logger(level: &str) {
        let env = env_logger::Env::default().default_filter_or(level);
        // A logger may already be installed by an embedding application or a test
        let _ = env_logger::Builder::from_env(env).try_init();
    }

    /// Defaults overlaid with `Settings.toml`, then `OIDC_SECRETS_DIR/Settings.toml`
    ///
    /// Also returns the files that were read, in order.
    fn load_base_settings() -> Result<(Self, Vec<PathBuf>)> {
        let mut settings = Self::default();
        let mut sources = Vec::new();

        let default_config_path = PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            sources.push(default_config_path);
        }

        if let Ok(secrets_dir) = std::env::var("OIDC_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                sources.push(secrets_path);
            }
        }

        Ok((settings, sources))
    }

    /// Parse a TOML settings file; missing sections and keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid settings TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        basic_toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_provider_env_overrides(&mut settings.provider);
        Self::apply_numeric_env_override(
            "HTTP_TIMEOUT_SECONDS",
            &mut settings.http_client.timeout_seconds,
        );
        Self::apply_numeric_env_override(
            "TOKEN_CACHE_CLEANUP_SECONDS",
            &mut settings.token_cache.cleanup_interval_seconds,
        );
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            settings.logging.level = log_level;
        }
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
    }

    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        Self::apply_bool_env_override("FORCE_HTTPS", &mut session_settings.force_https);
        Self::handle_session_secret_override(session_settings);
    }

    fn apply_provider_env_overrides(provider: &mut ProviderSettings) {
        let string_overrides: [(&str, &mut String); 6] = [
            ("CLIENT_ID", &mut provider.client_id),
            ("CLIENT_SECRET", &mut provider.client_secret),
            ("AUTHORIZATION_ENDPOINT", &mut provider.authorization_endpoint),
            ("TOKEN_ENDPOINT", &mut provider.token_endpoint),
            ("END_SESSION_ENDPOINT", &mut provider.end_session_endpoint),
            ("POST_LOGOUT_REDIRECT_URI", &mut provider.post_logout_redirect_uri),
        ];
        for (env_var, target) in string_overrides {
            if let Ok(value) = std::env::var(env_var) {
                *target = value;
            }
        }
        Self::apply_bool_env_override("ENABLE_PKCE", &mut provider.enable_pkce);
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    fn apply_bool_env_override(env_var: &str, target: &mut bool) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<bool>() {
                *target = value;
            }
        }
    }

    fn handle_session_secret_override(session_settings: &mut SessionSettings) {
        let env_secret_set = std::env::var("SESSION_SECRET").is_ok_and(|secret| {
            if secret.is_empty() {
                false
            } else {
                session_settings.session_secret = secret;
                true
            }
        });

        if !env_secret_set && session_settings.session_secret.is_empty() {
            session_settings.session_secret = Self::generate_random_session_secret();
            Self::warn_about_generated_secret();
        }
    }

    /// 32 bytes of entropy, base64 encoded (44 characters)
    fn generate_random_session_secret() -> String {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        general_purpose::STANDARD.encode(secret)
    }

    fn warn_about_generated_secret() {
        log::warn!("Using auto-generated session secret");
        log::warn!(
            "Set SESSION_SECRET or session.session_secret in Settings.toml; \
             sessions will not survive a restart otherwise"
        );
    }

    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines().map(str::trim) {
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_client.timeout_seconds)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.token_cache.cleanup_interval_seconds.max(1))
    }
}
