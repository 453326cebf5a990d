use serde::{Deserialize, Serialize};

/// One unit of work taken off the main queue.
///
/// Produced upstream and never modified here; a quarantined request is
/// published to the dead-letter queue exactly as it was received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub recipient_token: String,
    pub title: String,
    pub payload_id: String,

    #[serde(default)]
    pub is_first_in_batch: bool,

    #[serde(default)]
    pub is_last_in_batch: bool,
}
