use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Transient send failure (attempt {attempt}): {reason}")]
    TransientSendFailure { attempt: u32, reason: String },

    #[error("Recipient registry failure: {0}")]
    RegistryFailure(String),

    #[error("Broker failure: {0}")]
    BrokerFailure(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}
