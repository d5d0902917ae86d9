use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub backend: BackendConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub client_info: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Origin that auth emails redirect back to
    pub site_origin: String,
    pub signup_callback_path: String,
    pub reset_password_path: String,
    /// Key under which the session token is persisted locally
    pub storage_key: String,
    pub profile_collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub config_dir: Option<PathBuf>,
    pub token_file: String,
}

impl AuthConfig {
    pub fn signup_redirect(&self) -> String {
        format!("{}{}", self.site_origin.trim_end_matches('/'), self.signup_callback_path)
    }

    pub fn reset_redirect(&self) -> String {
        format!("{}{}", self.site_origin.trim_end_matches('/'), self.reset_password_path)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("BILLO_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Backend overrides
        if let Ok(v) = env::var("SUPABASE_URL") {
            self.backend.url = v;
        }
        if let Ok(v) = env::var("SUPABASE_ANON_KEY") {
            self.backend.anon_key = v;
        }
        if let Ok(v) = env::var("BILLO_CLIENT_INFO") {
            self.backend.client_info = v;
        }
        if let Ok(v) = env::var("BILLO_REQUEST_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = v.parse().unwrap_or(self.backend.request_timeout_secs);
        }

        // Auth overrides
        if let Ok(v) = env::var("BILLO_SITE_ORIGIN") {
            self.auth.site_origin = v;
        }
        if let Ok(v) = env::var("BILLO_AUTH_STORAGE_KEY") {
            self.auth.storage_key = v;
        }
        if let Ok(v) = env::var("BILLO_PROFILE_COLLECTION") {
            self.auth.profile_collection = v;
        }

        // Storage overrides
        if let Ok(v) = env::var("BILLO_CONFIG_DIR") {
            self.storage.config_dir = Some(PathBuf::from(v));
        }

        self
    }

    fn base(environment: Environment, site_origin: &str, timeout: u64) -> Self {
        Self {
            environment,
            backend: BackendConfig {
                url: "http://localhost:54321".to_string(),
                anon_key: String::new(),
                client_info: "billo-pwa/1.0.0".to_string(),
                request_timeout_secs: timeout,
            },
            auth: AuthConfig {
                site_origin: site_origin.to_string(),
                signup_callback_path: "/auth/callback".to_string(),
                reset_password_path: "/reset-password".to_string(),
                storage_key: "sb-auth-token".to_string(),
                profile_collection: "profiles".to_string(),
            },
            storage: StorageConfig {
                config_dir: None,
                token_file: "auth.json".to_string(),
            },
        }
    }

    fn development() -> Self {
        Self::base(Environment::Development, "http://localhost:5173", 30)
    }

    fn staging() -> Self {
        Self::base(Environment::Staging, "https://staging.billo.app", 15)
    }

    fn production() -> Self {
        Self::base(Environment::Production, "https://app.billo.app", 10)
    }

    /// Directory holding locally persisted client state
    pub fn config_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.storage.config_dir {
            return Some(dir.clone());
        }
        env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".config").join("billo"))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.backend.client_info, "billo-pwa/1.0.0");
        assert_eq!(config.auth.storage_key, "sb-auth-token");
        assert_eq!(config.backend.request_timeout_secs, 30);
    }

    #[test]
    fn test_redirect_targets() {
        let mut config = AppConfig::production();
        assert_eq!(config.auth.reset_redirect(), "https://app.billo.app/reset-password");

        config.auth.site_origin = "http://localhost:8080/".to_string();
        assert_eq!(config.auth.signup_redirect(), "http://localhost:8080/auth/callback");
    }

    #[test]
    fn test_explicit_config_dir_wins() {
        let mut config = AppConfig::staging();
        config.storage.config_dir = Some(PathBuf::from("/tmp/billo-test"));
        assert_eq!(config.config_dir(), Some(PathBuf::from("/tmp/billo-test")));
    }
}
