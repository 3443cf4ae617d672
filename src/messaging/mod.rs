// ============================================================================
// Messaging - inbound order records from Kafka
// ============================================================================

mod consumer;
mod processor;

pub use consumer::{KafkaConfig, OffsetCommitter, OrderIngestor, RecordSource};
pub use processor::{InboundRecord, OrderProcessor, Outcome};
