use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use push_relay::{
    api::run_api_server,
    clients::{
        database::TokenRepository, fcm::FcmClient, health::HealthChecker, rbmq::RabbitMqClient,
    },
    config::Config,
    consumer::NotificationConsumer,
    router::DeliveryRouter,
    worker::{run_worker, supervise},
};
use tokio::{signal, sync::watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let config = Config::load()?;

    let rabbitmq = Arc::new(RabbitMqClient::connect(&config).await?);
    let registry = Arc::new(TokenRepository::connect(&config.database_url).await?);
    let gateway = Arc::new(FcmClient::new(&config).await?);

    let router = DeliveryRouter::new(config.retry_policy(), registry.clone(), rabbitmq.clone());
    let consumer = Arc::new(NotificationConsumer::new(
        gateway,
        router,
        config.queue_name.clone(),
        config.notification_body.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api = tokio::spawn(run_api_server(
        config.server_port,
        HealthChecker::new(registry, rabbitmq.clone()),
        shutdown_rx.clone(),
    ));

    let worker_count = config.worker_count();
    info!(
        worker_count,
        max_attempts = config.max_retry_attempts,
        queue = %config.queue_name,
        "Starting push relay workers"
    );

    let workers: Vec<_> = (0..worker_count)
        .map(|worker_id| {
            tokio::spawn(run_worker(
                worker_id,
                rabbitmq.clone(),
                consumer.clone(),
                shutdown_rx.clone(),
            ))
        })
        .collect();

    let relay = supervise(workers, &shutdown_tx, async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    })
    .await;

    if let Ok(Err(e)) = api.await {
        error!(error = %e, "Health server exited with error");
    }

    info!("Push relay stopped");

    relay
}
