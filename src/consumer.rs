use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    models::{
        error::RelayError,
        message::NotificationRequest,
        outcome::{SendResult, classify},
        retry::{RetryMetadata, count_attempts},
    },
    router::{DeliveryRouter, Disposition},
    utils::message_data,
};

/// The push gateway's send call.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(
        &self,
        recipient_token: &str,
        title: &str,
        body: &str,
        data: HashMap<String, String>,
    ) -> SendResult;
}

/// Sends one request and settles it through the router.
pub struct NotificationConsumer {
    gateway: Arc<dyn PushGateway>,
    router: DeliveryRouter,
    main_queue_name: String,
    notification_body: String,
}

impl NotificationConsumer {
    pub fn new(
        gateway: Arc<dyn PushGateway>,
        router: DeliveryRouter,
        main_queue_name: impl Into<String>,
        notification_body: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            router,
            main_queue_name: main_queue_name.into(),
            notification_body: notification_body.into(),
        }
    }

    pub async fn handle_message(
        &self,
        request: &NotificationRequest,
        metadata: Option<&RetryMetadata>,
    ) -> Result<Disposition, RelayError> {
        if request.is_first_in_batch {
            info!(title = %request.title, "Batch delivery started");
        }

        let result = self
            .gateway
            .send(
                &request.recipient_token,
                &request.title,
                &self.notification_body,
                message_data(&request.payload_id),
            )
            .await;

        let outcome = classify(&result);
        let attempts = count_attempts(metadata, &self.main_queue_name);

        debug!(
            token = %request.recipient_token,
            delivered = outcome.is_delivered(),
            recipient_invalid = outcome.is_recipient_invalid(),
            attempts,
            "Send attempt classified"
        );

        let disposition = self.router.route(request, &outcome, attempts).await?;

        if disposition == Disposition::Delivered && request.is_last_in_batch {
            info!(title = %request.title, "Batch delivery completed");
        }

        Ok(disposition)
    }

    pub async fn handle_undecodable(
        &self,
        payload: &[u8],
        reason: RelayError,
        metadata: Option<&RetryMetadata>,
    ) -> Result<Disposition, RelayError> {
        let attempts = count_attempts(metadata, &self.main_queue_name);
        self.router
            .quarantine_undecodable(payload, &reason, attempts)
            .await
    }
}
