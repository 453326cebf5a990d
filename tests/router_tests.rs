use std::sync::Arc;

use anyhow::Result;
use push_relay::{
    models::{error::RelayError, outcome::DeliveryOutcome},
    router::Disposition,
};
use tokio_test::{assert_err, assert_ok};

use crate::fakes::{RecordingPublisher, RecordingRegistry, request, router};

/// Test: Delivered outcomes are acknowledged with no side effects
#[tokio::test]
async fn test_delivered_is_acknowledged_without_side_effects() -> Result<()> {
    let registry = Arc::new(RecordingRegistry::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let router = router(3, &registry, &publisher);

    for attempts in [0, 1, 2, 5] {
        let disposition = router
            .route(&request(), &DeliveryOutcome::delivered("Sent: abc123"), attempts)
            .await?;

        assert_eq!(disposition, Disposition::Delivered);
    }

    assert!(registry.removed().is_empty(), "No registry call expected");
    assert!(publisher.published().is_empty(), "No dead-letter publish expected");

    Ok(())
}

/// Test: Invalid recipients are removed once and never retried, at any attempt count
#[tokio::test]
async fn test_invalid_recipient_removed_regardless_of_attempts() -> Result<()> {
    for attempts in [0, 1, 2, 3, 10] {
        let registry = Arc::new(RecordingRegistry::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let router = router(3, &registry, &publisher);

        let disposition = router
            .route(
                &request(),
                &DeliveryOutcome::recipient_invalid("UNREGISTERED: unregistered token"),
                attempts,
            )
            .await?;

        assert_eq!(disposition, Disposition::RecipientRemoved);
        assert_eq!(registry.removed(), vec!["token".to_string()]);
        assert!(
            publisher.published().is_empty(),
            "Invalid recipient must not reach the dead-letter queue (attempts={})",
            attempts
        );
    }

    Ok(())
}

/// Test: A failed token removal still acknowledges the message
#[tokio::test]
async fn test_registry_failure_still_acknowledges() -> Result<()> {
    let registry = Arc::new(RecordingRegistry::failing());
    let publisher = Arc::new(RecordingPublisher::default());
    let router = router(3, &registry, &publisher);

    let result = router
        .route(&request(), &DeliveryOutcome::recipient_invalid("bad-token"), 0)
        .await;

    assert_eq!(assert_ok!(result), Disposition::RecipientRemoved);
    assert_eq!(registry.removed().len(), 1);
    assert!(publisher.published().is_empty());

    Ok(())
}

/// Test: Transient failure below the budget raises the retry signal
#[tokio::test]
async fn test_transient_failure_below_budget_signals_retry() -> Result<()> {
    let registry = Arc::new(RecordingRegistry::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let router = router(3, &registry, &publisher);

    // attempts = 1, next attempt = 2 < 3
    let result = router
        .route(&request(), &DeliveryOutcome::retryable("INTERNAL: retryable"), 1)
        .await;

    let error = assert_err!(result);
    assert!(matches!(
        error,
        RelayError::TransientSendFailure { attempt: 2, ref reason } if reason == "INTERNAL: retryable"
    ));
    assert!(publisher.published().is_empty());
    assert!(registry.removed().is_empty());

    Ok(())
}

/// Test: First delivery failure is retried
#[tokio::test]
async fn test_first_failure_signals_retry() -> Result<()> {
    let registry = Arc::new(RecordingRegistry::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let router = router(3, &registry, &publisher);

    let result = router
        .route(&request(), &DeliveryOutcome::retryable("UNAVAILABLE: try later"), 0)
        .await;

    assert!(matches!(
        result,
        Err(RelayError::TransientSendFailure { attempt: 1, .. })
    ));
    assert!(publisher.published().is_empty());

    Ok(())
}

/// Test: Exhausted budget quarantines the original request and acknowledges
#[tokio::test]
async fn test_exhausted_budget_quarantines_once() -> Result<()> {
    let registry = Arc::new(RecordingRegistry::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let router = router(3, &registry, &publisher);
    let original = request();

    // attempts = 2, next attempt = 3 >= 3
    let disposition = router
        .route(&original, &DeliveryOutcome::retryable("any-error"), 2)
        .await?;

    assert_eq!(disposition, Disposition::Quarantined);
    assert_eq!(publisher.published(), vec![original]);
    assert!(registry.removed().is_empty());

    Ok(())
}

/// Test: Attempt counts past the budget still quarantine rather than retry
#[tokio::test]
async fn test_attempts_beyond_budget_quarantine() -> Result<()> {
    let registry = Arc::new(RecordingRegistry::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let router = router(3, &registry, &publisher);

    let disposition = router
        .route(&request(), &DeliveryOutcome::retryable("any-error"), 7)
        .await?;

    assert_eq!(disposition, Disposition::Quarantined);
    assert_eq!(publisher.published().len(), 1);

    Ok(())
}

/// Test: A single-attempt policy quarantines on the first failure
#[tokio::test]
async fn test_single_attempt_policy_never_retries() -> Result<()> {
    let registry = Arc::new(RecordingRegistry::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let router = router(1, &registry, &publisher);

    let disposition = router
        .route(&request(), &DeliveryOutcome::retryable("any-error"), 0)
        .await?;

    assert_eq!(disposition, Disposition::Quarantined);

    Ok(())
}

/// Test: A failed dead-letter publish is surfaced as a retry signal
#[tokio::test]
async fn test_dead_letter_publish_failure_signals_retry() -> Result<()> {
    let registry = Arc::new(RecordingRegistry::default());
    let publisher = Arc::new(RecordingPublisher::failing());
    let router = router(3, &registry, &publisher);

    let result = router
        .route(&request(), &DeliveryOutcome::retryable("any-error"), 2)
        .await;

    let error = assert_err!(result);
    assert!(matches!(error, RelayError::BrokerFailure(_)));
    assert_eq!(publisher.published().len(), 1);

    Ok(())
}

/// Test: Undecodable payloads bypass the gateway path and are dropped only after the budget
#[tokio::test]
async fn test_undecodable_payload_respects_attempt_budget() -> Result<()> {
    let registry = Arc::new(RecordingRegistry::default());
    let publisher = Arc::new(RecordingPublisher::failing());
    let router = router(3, &registry, &publisher);
    let reason = RelayError::MalformedPayload("expected value".to_string());

    for attempts in [0, 1] {
        let result = router.quarantine_undecodable(b"[]", &reason, attempts).await;
        assert!(matches!(assert_err!(result), RelayError::BrokerFailure(_)));
    }

    let result = router.quarantine_undecodable(b"[]", &reason, 2).await;
    assert_eq!(assert_ok!(result), Disposition::Dropped);

    assert_eq!(publisher.raw().len(), 3);
    assert!(publisher.published().is_empty());
    assert!(registry.removed().is_empty());

    Ok(())
}
