use core_config::{ConfigError, FromEnv, env_parse};
use std::time::Duration;

/// Tunable constants of the quote engine
#[derive(Clone, Debug, PartialEq)]
pub struct FreightSettings {
    /// USD per ton for special handling
    pub special_handling_rate_usd: f64,
    /// USD per ton when a request does not name a margin
    pub default_profit_margin: f64,
    /// Bridge/ferry leg between the two customs posts, in km
    pub crossing_distance_km: f64,
    /// Upper bound for each configuration or distance call
    pub call_timeout: Duration,
}

impl Default for FreightSettings {
    fn default() -> Self {
        Self {
            special_handling_rate_usd: 2.50,
            default_profit_margin: 4.0,
            crossing_distance_km: 5.0,
            call_timeout: Duration::from_secs(10),
        }
    }
}

fn non_negative(key: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::ParseError {
            key: key.to_string(),
            details: format!("expected a non-negative number, got {value}"),
        })
    }
}

impl FromEnv for FreightSettings {
    /// - FREIGHT_SPECIAL_HANDLING_RATE_USD (2.50)
    /// - FREIGHT_DEFAULT_PROFIT_MARGIN (4.0)
    /// - FREIGHT_CROSSING_DISTANCE_KM (5)
    /// - FREIGHT_CANDIDATE_TIMEOUT_SECS (10)
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            special_handling_rate_usd: non_negative(
                "FREIGHT_SPECIAL_HANDLING_RATE_USD",
                env_parse(
                    "FREIGHT_SPECIAL_HANDLING_RATE_USD",
                    defaults.special_handling_rate_usd,
                )?,
            )?,
            default_profit_margin: non_negative(
                "FREIGHT_DEFAULT_PROFIT_MARGIN",
                env_parse("FREIGHT_DEFAULT_PROFIT_MARGIN", defaults.default_profit_margin)?,
            )?,
            crossing_distance_km: non_negative(
                "FREIGHT_CROSSING_DISTANCE_KM",
                env_parse("FREIGHT_CROSSING_DISTANCE_KM", defaults.crossing_distance_km)?,
            )?,
            call_timeout: at_least_one_second(
                "FREIGHT_CANDIDATE_TIMEOUT_SECS",
                env_parse("FREIGHT_CANDIDATE_TIMEOUT_SECS", defaults.call_timeout.as_secs())?,
            )?,
        })
    }
}

fn at_least_one_second(key: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::ParseError {
            key: key.to_string(),
            details: "must be at least 1 second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
