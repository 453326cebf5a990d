use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::models::{
    error::RelayError, message::NotificationRequest, outcome::DeliveryOutcome,
    retry::RetryPolicy,
};

/// Storage of push destinations that can be deregistered.
#[async_trait]
pub trait RecipientRegistry: Send + Sync {
    async fn remove_token(&self, token: &str) -> Result<(), RelayError>;
}

/// Terminal store for requests that ran out of attempts.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish_dead_letter(&self, request: &NotificationRequest) -> Result<(), RelayError>;

    /// Quarantines a payload that could not be decoded, byte for byte.
    async fn publish_raw_dead_letter(&self, payload: &[u8]) -> Result<(), RelayError>;
}

/// How a delivery was settled. Every variant means the message is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Delivered,
    RecipientRemoved,
    Quarantined,
    /// Undecodable and could not be quarantined within the attempt budget.
    Dropped,
}

/// Decides what happens to a message once its send attempt is classified.
///
/// An `Err` from [`DeliveryRouter::route`] is the retry signal: the caller
/// rejects the delivery without requeueing it so the broker moves it into
/// the delay queue.
#[derive(Clone)]
pub struct DeliveryRouter {
    policy: RetryPolicy,
    registry: Arc<dyn RecipientRegistry>,
    dead_letters: Arc<dyn DeadLetterPublisher>,
}

impl DeliveryRouter {
    pub fn new(
        policy: RetryPolicy,
        registry: Arc<dyn RecipientRegistry>,
        dead_letters: Arc<dyn DeadLetterPublisher>,
    ) -> Self {
        Self {
            policy,
            registry,
            dead_letters,
        }
    }

    pub async fn route(
        &self,
        request: &NotificationRequest,
        outcome: &DeliveryOutcome,
        attempts: u32,
    ) -> Result<Disposition, RelayError> {
        if outcome.is_delivered() {
            return Ok(Disposition::Delivered);
        }

        // Invalid recipients are never retried, whatever the attempt count.
        if outcome.is_recipient_invalid() {
            warn!(
                token = %request.recipient_token,
                reason = %outcome.diagnostic_message(),
                "Removing invalid recipient token"
            );

            if let Err(e) = self.registry.remove_token(&request.recipient_token).await {
                warn!(
                    token = %request.recipient_token,
                    error = %e,
                    "Failed to remove invalid recipient token, acknowledging anyway"
                );
            }

            return Ok(Disposition::RecipientRemoved);
        }

        let next_attempt = attempts.saturating_add(1);

        error!(
            token = %request.recipient_token,
            reason = %outcome.diagnostic_message(),
            attempts,
            next_attempt,
            "Push notification send failed"
        );

        if self.policy.is_exhausted(next_attempt) {
            self.dead_letters.publish_dead_letter(request).await?;

            error!(
                token = %request.recipient_token,
                max_attempts = self.policy.max_attempts,
                "Retries exhausted, message moved to dead-letter queue"
            );

            return Ok(Disposition::Quarantined);
        }

        info!(
            token = %request.recipient_token,
            next_attempt,
            "Scheduling retry through delay queue"
        );

        Err(RelayError::TransientSendFailure {
            attempt: next_attempt,
            reason: outcome.diagnostic_message().to_string(),
        })
    }

    /// Settles a payload that is not a notification request. It never becomes
    /// valid, so it goes straight to the dead-letter queue. A failed publish is
    /// retried through the delay queue until the attempt budget runs out.
    pub async fn quarantine_undecodable(
        &self,
        payload: &[u8],
        reason: &RelayError,
        attempts: u32,
    ) -> Result<Disposition, RelayError> {
        error!(error = %reason, attempts, "Undecodable message, moving to dead-letter queue");

        let Err(e) = self.dead_letters.publish_raw_dead_letter(payload).await else {
            return Ok(Disposition::Quarantined);
        };

        let next_attempt = attempts.saturating_add(1);
        if self.policy.is_exhausted(next_attempt) {
            error!(
                error = %e,
                next_attempt,
                max_attempts = self.policy.max_attempts,
                payload = %String::from_utf8_lossy(payload),
                "Dead-letter publish failed with retries exhausted, dropping undecodable message"
            );
            return Ok(Disposition::Dropped);
        }

        Err(e)
    }
}
