use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::messaging::KafkaConfig;
use crate::store::PostgresConfig;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Everything comes from the process environment. Unset variables fall back to
// local-development defaults; set-but-invalid numeric values are an error.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub postgres: PostgresConfig,
    pub kafka: KafkaConfig,
    pub http_addr: SocketAddr,
    pub shutdown_grace: Duration,
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let postgres = PostgresConfig {
            host: text("POSTGRES_HOST", "localhost"),
            port: parse(&lookup, "POSTGRES_PORT", 5432)?,
            user: text("POSTGRES_USER", "myuser"),
            password: text("POSTGRES_PASSWORD", "mypassword"),
            database: text("POSTGRES_DB", "mydb"),
            max_connections: parse(&lookup, "POSTGRES_MAX_CONNECTIONS", 10)?,
            ..PostgresConfig::default()
        };

        let kafka = KafkaConfig {
            brokers: text("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
            topic: text("KAFKA_TOPIC", "orders"),
            group_id: text("KAFKA_GROUP_ID", "order-cache-service"),
            workers: parse(&lookup, "INGEST_WORKERS", 4)?,
            metadata_timeout: Duration::from_secs(parse(&lookup, "KAFKA_METADATA_TIMEOUT_SECS", 10)?),
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            postgres,
            kafka,
            http_addr: parse(&lookup, "HTTP_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            shutdown_grace: Duration::from_secs(parse(&lookup, "SHUTDOWN_GRACE_SECS", 5)?),
            log_format,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
