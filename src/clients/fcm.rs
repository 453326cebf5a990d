use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::Client;
use tracing::{debug, info};

use crate::{
    config::Config,
    consumer::PushGateway,
    models::{
        fcm::{FcmErrorResponse, FcmMessage, FcmNotification, FcmRequest, FcmSendResponse},
        outcome::{GatewayErrorCode, SendError, SendReceipt, SendResult},
    },
};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

enum Credentials {
    Static(String),
    Google(Arc<dyn TokenProvider>),
}

pub struct FcmClient {
    http_client: Client,
    send_url: String,
    credentials: Credentials,
}

impl FcmClient {
    pub async fn new(config: &Config) -> Result<Self, Error> {
        let credentials = match &config.fcm_access_token {
            Some(token) => Credentials::Static(token.clone()),
            None => Credentials::Google(
                gcp_auth::provider()
                    .await
                    .map_err(|e| anyhow!("Failed to load Google credentials: {}", e))?,
            ),
        };

        let send_url = format!(
            "{}/v1/projects/{}/messages:send",
            config.fcm_base_url.trim_end_matches('/'),
            config.fcm_project_id
        );

        // Bounds the whole exchange; a timed-out send surfaces as a transport error.
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.fcm_timeout_ms))
            .build()
            .map_err(|e| anyhow!("Failed to build FCM HTTP client: {}", e))?;

        info!(
            project_id = %config.fcm_project_id,
            timeout_ms = config.fcm_timeout_ms,
            "FCM client initialized"
        );

        Ok(Self {
            http_client,
            send_url,
            credentials,
        })
    }

    async fn bearer_token(&self) -> Result<String, SendError> {
        match &self.credentials {
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::Google(provider) => provider
                .token(FCM_SCOPES)
                .await
                .map(|token| token.as_str().to_string())
                .map_err(|e| {
                    SendError::new(
                        GatewayErrorCode::ThirdPartyAuthError,
                        format!("Failed to obtain access token: {}", e),
                    )
                }),
        }
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send(
        &self,
        recipient_token: &str,
        title: &str,
        body: &str,
        data: HashMap<String, String>,
    ) -> SendResult {
        debug!(token = recipient_token, "Sending FCM push notification");

        let request = FcmRequest {
            message: FcmMessage {
                token: recipient_token.to_string(),
                notification: FcmNotification {
                    title: title.to_string(),
                    body: body.to_string(),
                },
                data: Some(data),
            },
        };

        let token = self.bearer_token().await?;

        let response = self
            .http_client
            .post(&self.send_url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| SendError::new(GatewayErrorCode::Transport, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SendError::new(GatewayErrorCode::Transport, e.to_string()))?;

        if status.is_success() {
            let sent = serde_json::from_str::<FcmSendResponse>(&text).map_err(|e| {
                SendError::new(
                    GatewayErrorCode::Unknown("MALFORMED_RESPONSE".to_string()),
                    e.to_string(),
                )
            })?;
            debug!(reference = %sent.name, "FCM push notification accepted");
            return Ok(SendReceipt {
                reference: sent.name,
            });
        }

        Err(parse_error(status.as_u16(), &text))
    }
}

fn parse_error(status: u16, text: &str) -> SendError {
    match serde_json::from_str::<FcmErrorResponse>(text) {
        Ok(response) => {
            let code = response
                .error
                .error_code()
                .map(GatewayErrorCode::from)
                .unwrap_or_else(|| GatewayErrorCode::Unknown(status.to_string()));
            SendError::new(code, response.error.message)
        }
        Err(_) => SendError::new(
            GatewayErrorCode::Unknown(status.to_string()),
            format!("FCM request failed with status {}: {}", status, text),
        ),
    }
}
