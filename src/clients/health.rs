use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{database::TokenRepository, rbmq::RabbitMqClient},
    models::health::{HealthCheckResponse, ServiceHealth},
};

pub struct HealthChecker {
    database: Arc<TokenRepository>,
    rabbitmq: Arc<RabbitMqClient>,
}

impl HealthChecker {
    pub fn new(database: Arc<TokenRepository>, rabbitmq: Arc<RabbitMqClient>) -> Self {
        Self { database, rabbitmq }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("message_broker".to_string(), self.check_rabbitmq().await);

        HealthCheckResponse {
            status: HealthCheckResponse::overall(&checks),
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.database.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
            }
        }
    }

    async fn check_rabbitmq(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.rabbitmq.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "RabbitMQ health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "RabbitMQ health check failed");
                ServiceHealth::unhealthy(format!("Channel unavailable: {}", e))
            }
        }
    }
}
