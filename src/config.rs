use std::thread::available_parallelism;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{
    models::{
        retry::{RetryConfig, RetryPolicy},
        topology::QueueTopology,
    },
    utils::worker_pool_size,
};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub exchange_name: String,
    pub retry_exchange_name: String,
    pub dead_exchange_name: String,
    pub queue_name: String,
    pub routing_key: String,
    #[serde(default = "default_retry_ttl_ms")]
    pub retry_ttl_ms: u32,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    pub worker_concurrency: Option<usize>,
    pub max_worker_concurrency: Option<usize>,

    pub database_url: String,

    pub fcm_project_id: String,
    #[serde(default = "default_fcm_base_url")]
    pub fcm_base_url: String,
    pub fcm_access_token: Option<String>,
    #[serde(default = "default_fcm_timeout_ms")]
    pub fcm_timeout_ms: u64,
    #[serde(default = "default_notification_body")]
    pub notification_body: String,

    #[serde(default = "default_broker_connect_attempts")]
    pub broker_connect_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_retry_ttl_ms() -> u32 {
    5000
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_max_retry_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

fn default_fcm_base_url() -> String {
    "https://fcm.googleapis.com".to_string()
}

fn default_fcm_timeout_ms() -> u64 {
    10_000
}

fn default_notification_body() -> String {
    "A new notice has been posted. Tap to read it.".to_string()
}

fn default_broker_connect_attempts() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_server_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = pairs.into_iter().map(|(k, v)| {
            let key: String = k.into();
            (key.to_uppercase(), v.into())
        });

        let config = envy::from_iter::<_, Self>(pairs)
            .map_err(|e| anyhow!("Invalid or missing configuration value: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_retry_attempts == 0 {
            return Err(anyhow!("MAX_RETRY_ATTEMPTS must be at least 1"));
        }

        if self.retry_ttl_ms == 0 {
            return Err(anyhow!("RETRY_TTL_MS must be greater than 0"));
        }

        if self.prefetch_count == 0 {
            return Err(anyhow!("PREFETCH_COUNT must be greater than 0"));
        }

        if self.fcm_timeout_ms == 0 {
            return Err(anyhow!("FCM_TIMEOUT_MS must be greater than 0"));
        }

        if self.queue_name.trim().is_empty() || self.routing_key.trim().is_empty() {
            return Err(anyhow!("QUEUE_NAME and ROUTING_KEY cannot be empty"));
        }

        if let (Some(concurrency), Some(max)) = (self.worker_concurrency, self.max_worker_concurrency) {
            if concurrency > max {
                return Err(anyhow!(
                    "WORKER_CONCURRENCY ({}) exceeds MAX_WORKER_CONCURRENCY ({})",
                    concurrency,
                    max
                ));
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retry_attempts)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.broker_connect_attempts.max(1),
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn topology(&self) -> QueueTopology {
        QueueTopology::new(
            &self.exchange_name,
            &self.retry_exchange_name,
            &self.dead_exchange_name,
            &self.queue_name,
            &self.routing_key,
            self.retry_ttl_ms,
        )
    }

    /// Number of consumer workers to start on this host.
    pub fn worker_count(&self) -> usize {
        let parallelism = available_parallelism().map(|n| n.get()).unwrap_or(1);
        worker_pool_size(
            parallelism,
            self.worker_concurrency,
            self.max_worker_concurrency,
        )
    }
}
