// ============================================================================
// Error Taxonomy
// ============================================================================
//
// DecodeError and PersistenceError are local to a single record or request and
// never stop the service. ConnectionError is fatal at startup.
// BrokerSessionError is recovered by the ingestor's backoff loop until the
// retry budget runs out.
//
// ============================================================================

/// A broker payload that cannot become an order.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload is empty")]
    Empty,

    #[error("Malformed order payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Order payload has no order_uid")]
    MissingOrderUid,
}

/// A failed read or write against the relational store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Schema bootstrap failed: {0}")]
    Schema(String),
}

/// Store or broker unreachable while the service is starting.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Cannot connect to Postgres: {0}")]
    Store(#[source] sqlx::Error),

    #[error("Cannot create Kafka consumer: {0}")]
    Broker(#[source] rdkafka::error::KafkaError),
}

/// Failure of the consumer group session after startup.
#[derive(Debug, thiserror::Error)]
pub enum BrokerSessionError {
    #[error("Kafka receive failed: {0}")]
    Receive(#[from] rdkafka::error::KafkaError),

    #[error("Kafka session failed {attempts} times in a row, giving up")]
    RetriesExhausted { attempts: u32 },
}

/// Invalid environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_describe_the_payload() {
        let malformed = serde_json::from_str::<serde_json::Value>("{").unwrap_err();

        assert_eq!(DecodeError::Empty.to_string(), "Payload is empty");
        assert!(DecodeError::from(malformed)
            .to_string()
            .starts_with("Malformed order payload"));
    }

    #[test]
    fn test_exhausted_session_reports_attempts() {
        let err = BrokerSessionError::RetriesExhausted { attempts: 10 };
        assert!(err.to_string().contains("10 times"));
    }
}
