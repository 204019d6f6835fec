//! Configuration for the freight API

use core_config::{AppInfo, ConfigError, FromEnv, app_info, env_optional, env_or_default, env_parse};
use core_config::server::ServerConfig;
use domain_freight::{ExchangeRateApiClient, FreightSettings};
use std::path::PathBuf;
use std::time::Duration;

pub use core_config::Environment;

const DEFAULT_CROSSING_POINTS_FILE: &str = "apps/freight/api/data/crossing_points.json";

/// Where crossing point configuration is read from
#[derive(Clone, Debug, PartialEq)]
pub enum CrossingPointsLocation {
    Url(String),
    File(PathBuf),
}

/// External services the quote engine talks to
#[derive(Clone, Debug)]
pub struct CollaboratorConfig {
    pub crossing_points: CrossingPointsLocation,
    pub exchange_rate_url: String,
    /// Stored rates are reused while younger than this
    pub exchange_rate_max_age: Duration,
    /// Directions API is used when set; otherwise routes are estimated
    pub google_maps_api_key: Option<String>,
}

impl FromEnv for CollaboratorConfig {
    /// - CROSSING_POINTS_URL: HTTP store, wins over the file
    /// - CROSSING_POINTS_FILE: JSON file store
    /// - EXCHANGE_RATE_API_URL
    /// - EXCHANGE_RATE_MAX_AGE_HOURS (6)
    /// - GOOGLE_MAPS_API_KEY
    fn from_env() -> Result<Self, ConfigError> {
        let crossing_points = match env_optional("CROSSING_POINTS_URL") {
            Some(url) => CrossingPointsLocation::Url(url),
            None => CrossingPointsLocation::File(PathBuf::from(env_or_default(
                "CROSSING_POINTS_FILE",
                DEFAULT_CROSSING_POINTS_FILE,
            ))),
        };

        Ok(Self {
            crossing_points,
            exchange_rate_url: env_or_default(
                "EXCHANGE_RATE_API_URL",
                ExchangeRateApiClient::DEFAULT_URL,
            ),
            exchange_rate_max_age: Duration::from_secs(
                env_parse("EXCHANGE_RATE_MAX_AGE_HOURS", 6u64)? * 3600,
            ),
            google_maps_api_key: env_optional("GOOGLE_MAPS_API_KEY"),
        })
    }
}

/// Application-specific configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub server: ServerConfig,
    pub environment: Environment,
    pub freight: FreightSettings,
    pub collaborators: CollaboratorConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8080
        server.validate_for(&environment)?;

        Ok(Self {
            app: app_info!(),
            server,
            environment,
            freight: FreightSettings::from_env()?,
            collaborators: CollaboratorConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_defaults() {
        temp_env::with_vars_unset(
            [
                "CROSSING_POINTS_URL",
                "CROSSING_POINTS_FILE",
                "EXCHANGE_RATE_API_URL",
                "EXCHANGE_RATE_MAX_AGE_HOURS",
                "GOOGLE_MAPS_API_KEY",
            ],
            || {
                let config = CollaboratorConfig::from_env().unwrap();
                assert_eq!(
                    config.crossing_points,
                    CrossingPointsLocation::File(PathBuf::from(DEFAULT_CROSSING_POINTS_FILE))
                );
                assert_eq!(config.exchange_rate_url, ExchangeRateApiClient::DEFAULT_URL);
                assert_eq!(config.exchange_rate_max_age, Duration::from_secs(6 * 3600));
                assert!(config.google_maps_api_key.is_none());
            },
        );
    }

    #[test]
    fn test_url_store_wins_over_file() {
        temp_env::with_vars(
            [
                ("CROSSING_POINTS_URL", Some("https://admin.example.com/crossing-points")),
                ("CROSSING_POINTS_FILE", Some("/etc/freight/points.json")),
                ("EXCHANGE_RATE_MAX_AGE_HOURS", Some("1")),
                ("GOOGLE_MAPS_API_KEY", Some("  ")),
            ],
            || {
                let config = CollaboratorConfig::from_env().unwrap();
                assert_eq!(
                    config.crossing_points,
                    CrossingPointsLocation::Url("https://admin.example.com/crossing-points".into())
                );
                assert_eq!(config.exchange_rate_max_age, Duration::from_secs(3600));
                assert!(config.google_maps_api_key.is_none());
            },
        );
    }

    #[test]
    fn test_production_needs_cors_origins() {
        temp_env::with_vars(
            [("APP_ENV", Some("production")), ("CORS_ALLOWED_ORIGIN", None)],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }
}
