use std::fmt::{Display, Formatter, Result as FmtResult};

/// Error codes the push gateway reports for a failed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayErrorCode {
    Unregistered,
    InvalidArgument,
    SenderIdMismatch,
    QuotaExceeded,
    Unavailable,
    Internal,
    ThirdPartyAuthError,
    Transport,
    Unknown(String),
}

impl GatewayErrorCode {
    /// The recipient registration is gone for good and must not be retried.
    pub fn invalidates_recipient(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::Unregistered | GatewayErrorCode::InvalidArgument
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            GatewayErrorCode::Unregistered => "UNREGISTERED",
            GatewayErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            GatewayErrorCode::SenderIdMismatch => "SENDER_ID_MISMATCH",
            GatewayErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            GatewayErrorCode::Unavailable => "UNAVAILABLE",
            GatewayErrorCode::Internal => "INTERNAL",
            GatewayErrorCode::ThirdPartyAuthError => "THIRD_PARTY_AUTH_ERROR",
            GatewayErrorCode::Transport => "TRANSPORT",
            GatewayErrorCode::Unknown(code) => code,
        }
    }
}

impl From<&str> for GatewayErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "UNREGISTERED" => GatewayErrorCode::Unregistered,
            "INVALID_ARGUMENT" => GatewayErrorCode::InvalidArgument,
            "SENDER_ID_MISMATCH" => GatewayErrorCode::SenderIdMismatch,
            "QUOTA_EXCEEDED" | "RESOURCE_EXHAUSTED" => GatewayErrorCode::QuotaExceeded,
            "UNAVAILABLE" => GatewayErrorCode::Unavailable,
            "INTERNAL" => GatewayErrorCode::Internal,
            "THIRD_PARTY_AUTH_ERROR" => GatewayErrorCode::ThirdPartyAuthError,
            other => GatewayErrorCode::Unknown(other.to_string()),
        }
    }
}

impl Display for GatewayErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Reference returned by the gateway for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendError {
    pub code: GatewayErrorCode,
    pub message: String,
}

impl SendError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for SendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type SendResult = Result<SendReceipt, SendError>;

/// Result of one send attempt.
///
/// `recipient_invalid` can only be set on an undelivered outcome; the
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    delivered: bool,
    recipient_invalid: bool,
    diagnostic_message: String,
}

impl DeliveryOutcome {
    pub fn delivered(diagnostic_message: impl Into<String>) -> Self {
        Self {
            delivered: true,
            recipient_invalid: false,
            diagnostic_message: diagnostic_message.into(),
        }
    }

    pub fn recipient_invalid(diagnostic_message: impl Into<String>) -> Self {
        Self {
            delivered: false,
            recipient_invalid: true,
            diagnostic_message: diagnostic_message.into(),
        }
    }

    pub fn retryable(diagnostic_message: impl Into<String>) -> Self {
        Self {
            delivered: false,
            recipient_invalid: false,
            diagnostic_message: diagnostic_message.into(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    pub fn is_recipient_invalid(&self) -> bool {
        self.recipient_invalid
    }

    pub fn diagnostic_message(&self) -> &str {
        &self.diagnostic_message
    }
}

/// Maps a raw gateway response onto a delivery outcome. Retry and
/// quarantine decisions are left to the router.
pub fn classify(result: &SendResult) -> DeliveryOutcome {
    match result {
        Ok(receipt) => DeliveryOutcome::delivered(format!("Sent: {}", receipt.reference)),
        Err(e) if e.code.invalidates_recipient() => DeliveryOutcome::recipient_invalid(e.to_string()),
        Err(e) => DeliveryOutcome::retryable(e.to_string()),
    }
}
