use async_trait::async_trait;
use futures_util::future::join_all;
use rdkafka::{
    client::ClientContext,
    config::ClientConfig,
    consumer::{Consumer, ConsumerContext, StreamConsumer},
    error::{KafkaError, KafkaResult, RDKafkaErrorCode},
    Message, Offset, TopicPartitionList,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::processor::{InboundRecord, OrderProcessor};
use crate::error::{BrokerSessionError, ConnectionError};
use crate::metrics::Metrics;
use crate::utils::{Backoff, RetryConfig};

// ============================================================================
// Kafka Order Ingestor
// ============================================================================
//
// One poll loop joins the consumer group and fans records out to a fixed pool
// of workers. A record goes to worker `partition mod workers`, so each
// partition is handled by exactly one worker in offset order while different
// partitions make progress in parallel.
//
// Worker queues are bounded. When one worker falls behind and its queue fills,
// the poll loop waits for it, which holds back every partition until that
// worker catches up. The queue depth bounds how far ahead of a slow partition
// the others can run.
//
// Offsets are stored by the worker after a record is persisted and committed
// by librdkafka's auto-commit timer.
//
// librdkafka reports most broker outages through the client context rather
// than as receive errors. Both kinds count as session failures and are retried
// with exponential backoff; after the configured number of consecutive
// failures the ingestor gives up and returns an error. Shutdown is
// cooperative: the poll loop checks the shutdown signal between records and
// workers finish the records already handed to them.
//
// ============================================================================

const WORKER_QUEUE_DEPTH: usize = 64;

#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub workers: usize,
    /// How long startup waits for broker metadata before giving up.
    pub metadata_timeout: Duration,
}

/// Marks a record as processed so its offset can be committed.
pub trait OffsetCommitter: Send + Sync {
    fn acknowledge(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()>;
}

/// Yields consumed records, or the session failure that interrupted them.
#[async_trait]
pub trait RecordSource: Send {
    async fn next_record(&mut self) -> Result<InboundRecord, KafkaError>;
}

/// Client context that forwards session-level failures to the poll loop.
pub struct SessionContext {
    failures: mpsc::UnboundedSender<KafkaError>,
}

impl ClientContext for SessionContext {
    fn error(&self, error: KafkaError, reason: &str) {
        tracing::warn!(error = %error, reason = reason, "Kafka client error");
        if is_session_failure(&error) {
            let _ = self.failures.send(error);
        }
    }
}

impl ConsumerContext for SessionContext {}

type SessionConsumer = StreamConsumer<SessionContext>;

/// Errors that mean the consumer cannot reach the cluster at all. Single broker
/// disconnects are retried by librdkafka on its own.
fn is_session_failure(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::Resolve
                | RDKafkaErrorCode::Authentication
                | RDKafkaErrorCode::Fatal
        )
    )
}

impl OffsetCommitter for SessionConsumer {
    fn acknowledge(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()> {
        // The committed offset is the next one to read.
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1))?;
        self.store_offsets(&tpl)
    }
}

struct KafkaSource {
    consumer: Arc<SessionConsumer>,
    failures: mpsc::UnboundedReceiver<KafkaError>,
}

#[async_trait]
impl RecordSource for KafkaSource {
    async fn next_record(&mut self) -> Result<InboundRecord, KafkaError> {
        tokio::select! {
            Some(error) = self.failures.recv() => Err(error),
            received = self.consumer.recv() => received.map(|message| InboundRecord {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec),
            }),
        }
    }
}

pub struct OrderIngestor {
    source: Box<dyn RecordSource>,
    committer: Arc<dyn OffsetCommitter>,
    processor: Arc<OrderProcessor>,
    metrics: Arc<Metrics>,
    workers: usize,
    session_retry: RetryConfig,
}

impl OrderIngestor {
    /// Create the group consumer, check the cluster is reachable and subscribe
    /// to the orders topic. Blocks for up to `metadata_timeout`.
    pub fn new(
        config: &KafkaConfig,
        processor: Arc<OrderProcessor>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ConnectionError> {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let consumer: SessionConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .create_with_context(SessionContext { failures: failures_tx })
            .map_err(ConnectionError::Broker)?;

        let metadata = consumer
            .fetch_metadata(Some(&config.topic), config.metadata_timeout)
            .map_err(ConnectionError::Broker)?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(ConnectionError::Broker)?;

        tracing::info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            cluster_brokers = metadata.brokers().len(),
            workers = config.workers,
            "Kafka consumer subscribed"
        );

        let consumer = Arc::new(consumer);
        let source = KafkaSource {
            consumer: consumer.clone(),
            failures: failures_rx,
        };
        Ok(Self::with_source(source, consumer, processor, metrics, config.workers))
    }

    pub(crate) fn with_source(
        source: impl RecordSource + 'static,
        committer: Arc<dyn OffsetCommitter>,
        processor: Arc<OrderProcessor>,
        metrics: Arc<Metrics>,
        workers: usize,
    ) -> Self {
        Self {
            source: Box::new(source),
            committer,
            processor,
            metrics,
            workers: workers.max(1),
            session_retry: RetryConfig::session(),
        }
    }

    #[cfg(test)]
    fn with_session_retry(mut self, session_retry: RetryConfig) -> Self {
        self.session_retry = session_retry;
        self
    }

    /// Consume until `shutdown` flips to true or the session retry budget is spent.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), BrokerSessionError> {
        let Self {
            mut source,
            committer,
            processor,
            metrics,
            workers,
            session_retry,
        } = self;

        let (senders, handles) = spawn_workers(workers, &processor, &committer);
        let mut backoff = Backoff::new(session_retry);
        let mut result = Ok(());

        while !*shutdown.borrow() {
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = source.next_record() => received,
            };

            match received {
                Ok(record) => {
                    backoff.on_success();
                    let slot = worker_slot(record.partition, senders.len());
                    if senders[slot].send(record).await.is_err() {
                        tracing::error!(worker = slot, "Partition worker is gone, stopping ingestor");
                        break;
                    }
                }
                Err(e) => {
                    metrics.record_session_retry();
                    let Some(delay) = backoff.on_failure() else {
                        tracing::error!(
                            error = %e,
                            attempts = backoff.failures(),
                            "Kafka session keeps failing, giving up"
                        );
                        result = Err(BrokerSessionError::RetriesExhausted {
                            attempts: backoff.failures(),
                        });
                        break;
                    };

                    tracing::warn!(
                        error = %BrokerSessionError::from(e),
                        attempt = backoff.failures(),
                        delay_ms = delay.as_millis(),
                        "Kafka session failed, retrying after delay"
                    );

                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!("Kafka ingestor stopping, draining partition workers");
        drop(senders);
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Partition worker panicked");
            }
        }
        tracing::info!("Kafka ingestor stopped");

        result
    }
}

fn worker_slot(partition: i32, workers: usize) -> usize {
    partition.rem_euclid(workers as i32) as usize
}

fn spawn_workers(
    count: usize,
    processor: &Arc<OrderProcessor>,
    committer: &Arc<dyn OffsetCommitter>,
) -> (Vec<mpsc::Sender<InboundRecord>>, Vec<JoinHandle<()>>) {
    (0..count)
        .map(|id| {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
            let handle = tokio::spawn(run_worker(id, rx, processor.clone(), committer.clone()));
            (tx, handle)
        })
        .unzip()
}

/// Process records in arrival order, acknowledging only persisted ones.
pub(crate) async fn run_worker(
    id: usize,
    mut records: mpsc::Receiver<InboundRecord>,
    processor: Arc<OrderProcessor>,
    committer: Arc<dyn OffsetCommitter>,
) {
    tracing::debug!(worker = id, "Partition worker started");

    while let Some(record) = records.recv().await {
        let outcome = processor.process(&record).await;
        if !outcome.should_acknowledge() {
            continue;
        }

        if let Err(e) = committer.acknowledge(&record.topic, record.partition, record.offset) {
            tracing::error!(
                error = %e,
                worker = id,
                partition = record.partition,
                offset = record.offset,
                "Failed to store offset"
            );
        }
    }

    tracing::debug!(worker = id, "Partition worker stopped");
}
