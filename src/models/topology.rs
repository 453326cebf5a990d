/// Arguments a queue is declared with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueArgument {
    DeadLetterExchange(String),
    DeadLetterRoutingKey(String),
    MessageTtlMs(u32),
}

impl QueueArgument {
    pub fn key(&self) -> &'static str {
        match self {
            QueueArgument::DeadLetterExchange(_) => "x-dead-letter-exchange",
            QueueArgument::DeadLetterRoutingKey(_) => "x-dead-letter-routing-key",
            QueueArgument::MessageTtlMs(_) => "x-message-ttl",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub exchange: String,
    pub routing_key: String,
    pub arguments: Vec<QueueArgument>,
}

/// The main, retry and dead-letter queues and how they are wired together.
///
/// Failed deliveries on the main queue are dead-lettered into the retry
/// queue, which holds them for the TTL and then dead-letters them back to
/// the main exchange. The dead-letter queue only receives explicit
/// publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub main: QueueSpec,
    pub retry: QueueSpec,
    pub dead: QueueSpec,
}

impl QueueTopology {
    pub fn new(
        exchange_name: &str,
        retry_exchange_name: &str,
        dead_exchange_name: &str,
        queue_name: &str,
        routing_key: &str,
        retry_ttl_ms: u32,
    ) -> Self {
        let retry_key = format!("{}.retry", routing_key);
        let dead_key = format!("{}.dlq", routing_key);

        Self {
            main: QueueSpec {
                name: queue_name.to_string(),
                exchange: exchange_name.to_string(),
                routing_key: routing_key.to_string(),
                arguments: vec![
                    QueueArgument::DeadLetterExchange(retry_exchange_name.to_string()),
                    QueueArgument::DeadLetterRoutingKey(retry_key.clone()),
                ],
            },
            retry: QueueSpec {
                name: format!("{}.retry", queue_name),
                exchange: retry_exchange_name.to_string(),
                routing_key: retry_key,
                arguments: vec![
                    QueueArgument::MessageTtlMs(retry_ttl_ms),
                    QueueArgument::DeadLetterExchange(exchange_name.to_string()),
                    QueueArgument::DeadLetterRoutingKey(routing_key.to_string()),
                ],
            },
            dead: QueueSpec {
                name: format!("{}.dlq", queue_name),
                exchange: dead_exchange_name.to_string(),
                routing_key: dead_key,
                arguments: Vec::new(),
            },
        }
    }

    pub fn exchanges(&self) -> [&str; 3] {
        [
            self.main.exchange.as_str(),
            self.retry.exchange.as_str(),
            self.dead.exchange.as_str(),
        ]
    }

    pub fn queues(&self) -> [&QueueSpec; 3] {
        [&self.main, &self.retry, &self.dead]
    }
}
