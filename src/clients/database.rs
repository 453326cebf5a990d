use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use crate::{models::error::RelayError, router::RecipientRegistry};

/// Device registrations stored in the `fcm_token` table.
pub struct TokenRepository {
    client: Client,
}

impl TokenRepository {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    pub async fn delete_by_token(&self, token: &str) -> Result<u64, Error> {
        let removed = self
            .client
            .execute("DELETE FROM fcm_token WHERE token = $1", &[&token])
            .await
            .map_err(|e| anyhow!("Database delete failed: {}", e))?;

        Ok(removed)
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl RecipientRegistry for TokenRepository {
    async fn remove_token(&self, token: &str) -> Result<(), RelayError> {
        let removed = self.delete_by_token(token).await.map_err(|e| {
            error!(error = %e, token, "Failed to delete recipient token");
            RelayError::RegistryFailure(e.to_string())
        })?;

        debug!(token, removed, "Recipient token deleted");

        Ok(())
    }
}
