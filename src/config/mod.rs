//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::RoomConfig;
use crate::util::time::{
    millis, FINISH_GRACE_MS, FRAME_INTERVAL_MS, MATCH_DURATION_SECS, SPAWN_INTERVAL_MS,
    WRITE_TIMEOUT_MS,
};

/// Default ceiling on simultaneously live rooms
pub const DEFAULT_MAX_ROOMS: usize = 100_500;

/// Supabase credentials for result persistence
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Supabase project URL
    pub url: String,
    /// Supabase service role key (bypasses RLS - server only!)
    pub service_role_key: String,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Shared secret the auth tokens are signed with (HS256)
    pub jwt_secret: String,
    /// Allowed client origins for CORS, any origin when empty
    pub client_origins: Vec<String>,
    /// Results are only logged without it
    pub supabase: Option<SupabaseConfig>,

    pub max_rooms: usize,
    pub room: RoomConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key-value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8082".to_string()),
        };

        let supabase = match (lookup("SUPABASE_URL"), lookup("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(SupabaseConfig { url, service_role_key }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("SUPABASE_URL")),
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let room = RoomConfig {
            frame_interval: millis(parse_or(&lookup, "FRAME_INTERVAL_MS", FRAME_INTERVAL_MS)?),
            spawn_interval: millis(parse_or(&lookup, "SPAWN_INTERVAL_MS", SPAWN_INTERVAL_MS)?),
            match_duration: Duration::from_secs(parse_or(
                &lookup,
                "MATCH_DURATION_SECS",
                MATCH_DURATION_SECS,
            )?),
            finish_grace: millis(parse_or(&lookup, "FINISH_GRACE_MS", FINISH_GRACE_MS)?),
            write_timeout: millis(parse_or(&lookup, "WRITE_TIMEOUT_MS", WRITE_TIMEOUT_MS)?),
        };
        if room.frame_interval.is_zero() {
            return Err(ConfigError::Invalid("FRAME_INTERVAL_MS"));
        }
        if room.spawn_interval.is_zero() {
            return Err(ConfigError::Invalid("SPAWN_INTERVAL_MS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            jwt_secret: lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            client_origins,
            supabase,

            max_rooms: parse_or(&lookup, "MAX_ROOMS", DEFAULT_MAX_ROOMS)?,
            room,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_need_only_the_secret() {
        let config = load(&[("JWT_SECRET", "secret")]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8082".parse().unwrap());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_rooms, 100_500);
        assert_eq!(config.room, RoomConfig::default());
        assert!(config.supabase.is_none());
        assert!(config.client_origins.is_empty());
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("JWT_SECRET"))));
    }

    #[test]
    fn port_wins_over_server_addr() {
        let config = load(&[
            ("JWT_SECRET", "s"),
            ("PORT", "9000"),
            ("SERVER_ADDR", "127.0.0.1:1"),
        ])
        .unwrap();
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("JWT_SECRET", "s"),
            ("MAX_ROOMS", "3"),
            ("MATCH_DURATION_SECS", "60"),
            ("FRAME_INTERVAL_MS", "33"),
            ("CLIENT_ORIGIN", "https://a.example, https://b.example,"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "key"),
        ])
        .unwrap();
        assert_eq!(config.max_rooms, 3);
        assert_eq!(config.room.match_duration, Duration::from_secs(60));
        assert_eq!(config.room.frame_interval, Duration::from_millis(33));
        assert_eq!(config.client_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.supabase.unwrap().service_role_key, "key");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            load(&[("JWT_SECRET", "s"), ("MAX_ROOMS", "many")]),
            Err(ConfigError::Invalid("MAX_ROOMS"))
        ));
        assert!(matches!(
            load(&[("JWT_SECRET", "s"), ("FRAME_INTERVAL_MS", "0")]),
            Err(ConfigError::Invalid("FRAME_INTERVAL_MS"))
        ));
        assert!(matches!(
            load(&[("JWT_SECRET", "s"), ("SUPABASE_URL", "https://x.supabase.co")]),
            Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))
        ));
        assert!(matches!(
            load(&[("JWT_SECRET", "s"), ("SERVER_ADDR", "nowhere")]),
            Err(ConfigError::InvalidAddress)
        ));
    }
}
