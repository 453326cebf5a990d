use std::collections::HashMap;

use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::models::{error::RelayError, message::NotificationRequest, retry::RetryConfig};

pub fn decode_request(payload: &[u8]) -> Result<NotificationRequest, RelayError> {
    serde_json::from_slice(payload).map_err(|e| RelayError::MalformedPayload(e.to_string()))
}

/// Data map attached to every push so the client app can open the content.
pub fn message_data(payload_id: &str) -> HashMap<String, String> {
    HashMap::from([("publicId".to_string(), payload_id.to_string())])
}

/// Worker count: the configured value, or twice the available parallelism,
/// capped at the configured bound (three times the parallelism by default).
pub fn worker_pool_size(
    parallelism: usize,
    configured: Option<usize>,
    max_configured: Option<usize>,
) -> usize {
    let parallelism = parallelism.max(1);
    let upper = max_configured.unwrap_or(parallelism * 3).max(1);
    let wanted = configured.unwrap_or(parallelism * 2);

    wanted.clamp(1, upper)
}

pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = config.max_attempts,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(e);
                }

                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms,
                    error = %e,
                    "Retry attempt failed, backing off"
                );

                let jitter = rand::random_range(-0.1..=0.1);

                let jittered_delay = (delay_ms as f64 * (1.0 + jitter)) as u64;

                sleep(Duration::from_millis(jittered_delay)).await;

                delay_ms = std::cmp::min(
                    delay_ms.saturating_mul(config.backoff_multiplier),
                    config.max_delay_ms,
                );
            }
        }
    }
}
