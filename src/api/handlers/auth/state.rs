//! Auth configuration and shared state.

use secrecy::SecretString;
use std::sync::Arc;

use super::rate_limit::RateLimiter;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_VERIFY_LINK_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_RESET_THROTTLE_SECONDS: i64 = 60;
const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    app_key: SecretString,
    base_url: String,
    frontend_base_url: String,
    token_ttl_seconds: i64,
    verify_link_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    reset_throttle_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(app_key: SecretString) -> Self {
        Self {
            app_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            frontend_base_url: DEFAULT_FRONTEND_URL.to_string(),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            verify_link_ttl_seconds: DEFAULT_VERIFY_LINK_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            reset_throttle_seconds: DEFAULT_RESET_THROTTLE_SECONDS,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_frontend_url(mut self, frontend_base_url: String) -> Self {
        self.frontend_base_url = frontend_base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_token_ttl(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verify_link_ttl(mut self, seconds: i64) -> Self {
        self.verify_link_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_throttle(mut self, seconds: i64) -> Self {
        self.reset_throttle_seconds = seconds;
        self
    }

    pub(super) fn app_key(&self) -> &SecretString {
        &self.app_key
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    pub(super) fn verify_link_ttl_seconds(&self) -> i64 {
        self.verify_link_ttl_seconds
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(super) fn reset_throttle_seconds(&self) -> i64 {
        self.reset_throttle_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    pub fn new(config: AuthConfig, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            config,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::*;

    fn key() -> SecretString {
        SecretString::from("base64:test-key")
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(key());

        assert_eq!(config.base_url(), super::DEFAULT_BASE_URL);
        assert_eq!(config.frontend_base_url(), super::DEFAULT_FRONTEND_URL);
        assert_eq!(config.token_ttl_seconds(), super::DEFAULT_TOKEN_TTL_SECONDS);
        assert_eq!(
            config.verify_link_ttl_seconds(),
            super::DEFAULT_VERIFY_LINK_TTL_SECONDS
        );
        assert_eq!(
            config.reset_throttle_seconds(),
            super::DEFAULT_RESET_THROTTLE_SECONDS
        );

        let config = config
            .with_base_url("https://api.sesamo.dev/".to_string())
            .with_frontend_url("https://app.sesamo.dev/".to_string())
            .with_token_ttl(7200)
            .with_verify_link_ttl(300)
            .with_reset_token_ttl(900)
            .with_reset_throttle(30);

        // trailing slashes are stripped so link building can join paths
        assert_eq!(config.base_url(), "https://api.sesamo.dev");
        assert_eq!(config.frontend_base_url(), "https://app.sesamo.dev");
        assert_eq!(config.token_ttl_seconds(), 7200);
        assert_eq!(config.verify_link_ttl_seconds(), 300);
        assert_eq!(config.reset_token_ttl_seconds(), 900);
        assert_eq!(config.reset_throttle_seconds(), 30);
    }

    #[test]
    fn auth_state_constructs_with_noop_rate_limiter() {
        let state = AuthState::new(AuthConfig::new(key()), Arc::new(NoopRateLimiter));
        assert_eq!(state.config().base_url(), super::DEFAULT_BASE_URL);
    }
}
