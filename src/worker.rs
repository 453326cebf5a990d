use std::{future::Future, sync::Arc};

use anyhow::{Error, Result, anyhow};
use futures_util::{
    StreamExt,
    future::{join_all, select_all},
};
use lapin::message::Delivery;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    clients::rbmq::{RabbitMqClient, retry_metadata},
    consumer::NotificationConsumer,
    models::error::RelayError,
    router::Disposition,
    utils::decode_request,
};

/// Pulls deliveries one at a time until shutdown is signalled. Shutdown is
/// only observed between deliveries; losing the consumer stream before that
/// is an error.
pub async fn run_worker(
    worker_id: usize,
    rabbitmq: Arc<RabbitMqClient>,
    consumer: Arc<NotificationConsumer>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let consumer_tag = format!("push_relay-{}-{}", worker_id, Uuid::new_v4());
    let mut deliveries = rabbitmq.create_consumer(&consumer_tag).await?;

    info!(worker_id, consumer_tag = %consumer_tag, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delivery = tokio::select! {
            _ = shutdown.changed() => break,
            next = deliveries.next() => next,
        };

        match delivery {
            Some(Ok(delivery)) => process_delivery(worker_id, &rabbitmq, &consumer, delivery).await,
            Some(Err(e)) => {
                error!(worker_id, error = %e, "Consumer delivery error");
                return Err(anyhow!("Worker {} lost its consumer: {}", worker_id, e));
            }
            None => {
                warn!(worker_id, "Consumer stream ended");
                return Err(anyhow!("Worker {} consumer stream ended", worker_id));
            }
        }
    }

    info!(worker_id, "Worker stopped");

    Ok(())
}

async fn process_delivery(
    worker_id: usize,
    rabbitmq: &RabbitMqClient,
    consumer: &NotificationConsumer,
    delivery: Delivery,
) {
    let delivery_tag = delivery.delivery_tag;

    let metadata = retry_metadata(delivery.properties.headers().as_ref());

    let result = match decode_request(&delivery.data) {
        Ok(request) => consumer.handle_message(&request, metadata.as_ref()).await,
        Err(e) => {
            consumer
                .handle_undecodable(&delivery.data, e, metadata.as_ref())
                .await
        }
    };

    settle(worker_id, rabbitmq, delivery_tag, result).await;
}

/// The single place a delivery is acknowledged or rejected.
async fn settle(
    worker_id: usize,
    rabbitmq: &RabbitMqClient,
    delivery_tag: u64,
    result: Result<Disposition, RelayError>,
) {
    let settled = match result {
        Ok(disposition) => {
            info!(worker_id, delivery_tag, ?disposition, "Acknowledging message");
            rabbitmq.acknowledge(delivery_tag).await
        }
        Err(e) => {
            warn!(worker_id, delivery_tag, error = %e, "Rejecting message for retry");
            rabbitmq.reject(delivery_tag).await
        }
    };

    if let Err(e) = settled {
        error!(worker_id, delivery_tag, error = %e, "Failed to settle message");
    }
}

/// Waits for the shutdown signal or the first worker to exit, whichever comes
/// first, then stops and joins the rest.
///
/// A worker exiting before shutdown means the relay is no longer consuming;
/// that is returned as an error so the process can be restarted.
pub async fn supervise<S>(
    mut workers: Vec<JoinHandle<Result<(), Error>>>,
    stop: &watch::Sender<bool>,
    shutdown_signal: S,
) -> Result<(), Error>
where
    S: Future<Output = ()>,
{
    let early_exit = if workers.is_empty() {
        shutdown_signal.await;
        None
    } else {
        tokio::select! {
            _ = shutdown_signal => None,
            (result, index, _) = select_all(workers.iter_mut()) => Some((index, result)),
        }
    };

    if let Some((index, _)) = &early_exit {
        workers.remove(*index);
        error!(worker = index, "Worker stopped before shutdown, stopping the relay");
    } else {
        info!("Shutdown signal received, finishing in-flight messages");
    }

    let _ = stop.send(true);

    for worker in join_all(workers).await {
        match worker {
            Ok(Err(e)) => error!(error = %e, "Worker exited with error"),
            Err(e) => error!(error = %e, "Worker task panicked"),
            Ok(Ok(())) => {}
        }
    }

    match early_exit {
        None => Ok(()),
        Some((_, Ok(Err(e)))) => Err(e),
        Some((index, Ok(Ok(())))) => Err(anyhow!("Worker {} stopped consuming", index)),
        Some((index, Err(e))) => Err(anyhow!("Worker {} panicked: {}", index, e)),
    }
}
