use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, info};

use crate::{
    config::Config,
    models::{
        error::RelayError,
        message::NotificationRequest,
        retry::{DeathRecord, RetryMetadata},
        topology::{QueueArgument, QueueSpec, QueueTopology},
    },
    router::DeadLetterPublisher,
    utils::retry_with_backoff,
};

const X_DEATH: &str = "x-death";
const HDR_QUEUE: &str = "queue";
const HDR_COUNT: &str = "count";

pub struct RabbitMqClient {
    // Keeps the connection open for the lifetime of the channel.
    _connection: Connection,
    channel: Channel,
    topology: QueueTopology,
}

impl RabbitMqClient {
    /// Connects with backoff and declares the full queue topology.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        retry_with_backoff(&config.retry_config(), || Self::connect_once(config)).await
    }

    async fn connect_once(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        let topology = config.topology();
        Self::declare_topology(&channel, &topology).await?;

        info!(
            queue = %topology.main.name,
            prefetch_count = config.prefetch_count,
            "RabbitMQ connection established"
        );

        Ok(Self {
            _connection: connection,
            channel,
            topology,
        })
    }

    async fn declare_topology(channel: &Channel, topology: &QueueTopology) -> Result<(), Error> {
        for exchange in topology.exchanges() {
            channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Direct,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare exchange {}: {}", exchange, e))?;
        }

        for queue in topology.queues() {
            Self::declare_queue(channel, queue).await?;
        }

        Ok(())
    }

    async fn declare_queue(channel: &Channel, queue: &QueueSpec) -> Result<(), Error> {
        channel
            .queue_declare(
                &queue.name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                queue_arguments(&queue.arguments),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue.name, e))?;

        channel
            .queue_bind(
                &queue.name,
                &queue.exchange,
                &queue.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to bind queue {}: {}", queue.name, e))?;

        debug!(
            queue = %queue.name,
            exchange = %queue.exchange,
            routing_key = %queue.routing_key,
            "Queue declared and bound"
        );

        Ok(())
    }

    pub fn topology(&self) -> &QueueTopology {
        &self.topology
    }

    pub async fn create_consumer(&self, consumer_tag: &str) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                &self.topology.main.name,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        debug!(consumer_tag, queue = %self.topology.main.name, "Consumer created");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

        Ok(())
    }

    /// Rejects without requeueing, which dead-letters into the retry queue.
    pub async fn reject(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
            .await
            .map_err(|e| anyhow!("Failed to reject message: {}", e))?;

        Ok(())
    }

    async fn publish_to_dlq(&self, payload: &[u8]) -> Result<(), RelayError> {
        self.channel
            .basic_publish(
                &self.topology.dead.exchange,
                &self.topology.dead.routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .map_err(|e| RelayError::BrokerFailure(format!("Failed to publish message to dlq: {}", e)))?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        if self.channel.status().connected() {
            Ok(())
        } else {
            Err(anyhow!("RabbitMQ channel is not connected"))
        }
    }
}

#[async_trait]
impl DeadLetterPublisher for RabbitMqClient {
    async fn publish_dead_letter(&self, request: &NotificationRequest) -> Result<(), RelayError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| RelayError::BrokerFailure(format!("Failed to encode dead letter: {}", e)))?;

        self.publish_to_dlq(&payload).await
    }

    async fn publish_raw_dead_letter(&self, payload: &[u8]) -> Result<(), RelayError> {
        self.publish_to_dlq(payload).await
    }
}

pub fn queue_arguments(arguments: &[QueueArgument]) -> FieldTable {
    let mut table = FieldTable::default();

    for argument in arguments {
        let value = match argument {
            QueueArgument::DeadLetterExchange(v) | QueueArgument::DeadLetterRoutingKey(v) => {
                AMQPValue::LongString(v.clone().into())
            }
            QueueArgument::MessageTtlMs(ttl) => AMQPValue::LongUInt(*ttl),
        };
        table.insert(argument.key().into(), value);
    }

    table
}

/// Reads the broker's `x-death` history from message headers.
///
/// Returns `None` when the header is absent; entries without a queue name
/// are skipped and a missing count reads as zero.
pub fn retry_metadata(headers: Option<&FieldTable>) -> Option<RetryMetadata> {
    let deaths = headers?
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == X_DEATH)
        .map(|(_, value)| value)?;

    let AMQPValue::FieldArray(entries) = deaths else {
        return None;
    };

    let records = entries
        .as_slice()
        .iter()
        .filter_map(|entry| match entry {
            AMQPValue::FieldTable(table) => death_record(table),
            _ => None,
        })
        .collect();

    Some(records)
}

fn death_record(table: &FieldTable) -> Option<DeathRecord> {
    let mut queue_name = None;
    let mut failure_count = 0;

    for (key, value) in table.inner() {
        match key.as_str() {
            HDR_QUEUE => queue_name = amqp_string(value),
            HDR_COUNT => failure_count = amqp_count(value).unwrap_or(0),
            _ => {}
        }
    }

    queue_name.map(|queue_name| DeathRecord::new(queue_name, failure_count))
}

fn amqp_string(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(s) => Some(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        _ => None,
    }
}

fn amqp_count(value: &AMQPValue) -> Option<u64> {
    match *value {
        AMQPValue::ShortShortInt(n) => u64::try_from(n).ok(),
        AMQPValue::ShortShortUInt(n) => Some(u64::from(n)),
        AMQPValue::ShortInt(n) => u64::try_from(n).ok(),
        AMQPValue::ShortUInt(n) => Some(u64::from(n)),
        AMQPValue::LongInt(n) => u64::try_from(n).ok(),
        AMQPValue::LongUInt(n) => Some(u64::from(n)),
        AMQPValue::LongLongInt(n) => u64::try_from(n).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use lapin::types::FieldArray;

    use super::*;

    fn death(queue: &str, count: i64) -> AMQPValue {
        let mut table = FieldTable::default();
        table.insert(HDR_QUEUE.into(), AMQPValue::LongString(queue.into()));
        table.insert(HDR_COUNT.into(), AMQPValue::LongLongInt(count));
        table.insert("reason".into(), AMQPValue::LongString("rejected".into()));
        AMQPValue::FieldTable(table)
    }

    fn headers(deaths: Vec<AMQPValue>) -> FieldTable {
        let mut headers = FieldTable::default();
        headers.insert(X_DEATH.into(), AMQPValue::FieldArray(FieldArray::from(deaths)));
        headers
    }

    #[test]
    fn reads_death_history_in_order() {
        let headers = headers(vec![death("push", 2), death("push.retry", 2)]);

        let metadata = retry_metadata(Some(&headers)).expect("x-death present");

        assert_eq!(
            metadata.records(),
            &[DeathRecord::new("push", 2), DeathRecord::new("push.retry", 2)]
        );
    }

    #[test]
    fn missing_header_is_none() {
        assert!(retry_metadata(None).is_none());
        assert!(retry_metadata(Some(&FieldTable::default())).is_none());
    }

    #[test]
    fn entry_without_queue_is_skipped() {
        let mut nameless = FieldTable::default();
        nameless.insert(HDR_COUNT.into(), AMQPValue::LongLongInt(4));
        let headers = headers(vec![AMQPValue::FieldTable(nameless), death("push", 1)]);

        let metadata = retry_metadata(Some(&headers)).expect("x-death present");

        assert_eq!(metadata.records(), &[DeathRecord::new("push", 1)]);
    }

    #[test]
    fn builds_dead_letter_arguments() {
        let table = queue_arguments(&[
            QueueArgument::MessageTtlMs(5000),
            QueueArgument::DeadLetterExchange("push.exchange".into()),
        ]);

        let keys: Vec<&str> = table.inner().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["x-dead-letter-exchange", "x-message-ttl"]);
    }
}
