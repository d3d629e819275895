use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BUREAU_URL: &str = "https://challenge.noverde.name/";
pub const DEFAULT_BUREAU_TIMEOUT_SECS: u64 = 5;
pub const BUREAU_API_TOKEN_SECRET: &str = "/bureau/api/token";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub bureau: BureauConfig,
    pub rates: RateModelConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let base_url =
            env::var("BUREAU_BASE_URL").unwrap_or_else(|_| DEFAULT_BUREAU_URL.to_string());
        let timeout_secs = match env::var("BUREAU_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidTimeout)?,
            Err(_) => DEFAULT_BUREAU_TIMEOUT_SECS,
        };

        let rate_model_path = env::var("RATE_MODEL_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            bureau: BureauConfig {
                base_url,
                api_key: get_secret(BUREAU_API_TOKEN_SECRET),
                timeout: Duration::from_secs(timeout_secs),
            },
            rates: RateModelConfig {
                path: rate_model_path,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Connection settings for the score/commitment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BureauConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for BureauConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BUREAU_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_BUREAU_TIMEOUT_SECS),
        }
    }
}

/// Where the rate model comes from; the bundled table when no path is set.
#[derive(Debug, Clone, Default)]
pub struct RateModelConfig {
    pub path: Option<PathBuf>,
}

/// Environment variable holding a secret parameter such as `/bureau/api/token`.
pub fn secret_env_name(parameter: &str) -> String {
    parameter
        .trim_start_matches('/')
        .replace('/', "_")
        .to_ascii_uppercase()
}

/// Resolve a secret parameter from the environment.
pub fn get_secret(parameter: &str) -> Option<String> {
    env::var(secret_env_name(parameter))
        .ok()
        .filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout => {
                write!(f, "BUREAU_TIMEOUT_SECS must be a positive number of seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidTimeout => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("BUREAU_BASE_URL");
        env::remove_var("BUREAU_TIMEOUT_SECS");
        env::remove_var("BUREAU_API_TOKEN");
        env::remove_var("RATE_MODEL_PATH");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.bureau.base_url, DEFAULT_BUREAU_URL);
        assert_eq!(config.bureau.timeout, Duration::from_secs(5));
        assert!(config.rates.path.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_bureau_settings_and_api_key_secret() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("BUREAU_BASE_URL", "https://bureau.internal/");
        env::set_var("BUREAU_TIMEOUT_SECS", "12");
        env::set_var("BUREAU_API_TOKEN", "FOOBar");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.bureau.base_url, "https://bureau.internal/");
        assert_eq!(config.bureau.timeout, Duration::from_secs(12));
        assert_eq!(config.bureau.api_key.as_deref(), Some("FOOBar"));
        reset_env();
    }

    #[test]
    fn rejects_zero_timeout() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("BUREAU_TIMEOUT_SECS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidTimeout)
        ));
        reset_env();
    }

    #[test]
    fn secret_names_map_to_env_vars() {
        assert_eq!(secret_env_name("/bureau/api/token"), "BUREAU_API_TOKEN");
        assert_eq!(secret_env_name("plain"), "PLAIN");
    }
}
