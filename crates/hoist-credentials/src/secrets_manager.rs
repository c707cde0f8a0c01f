//! AWS Secrets Manager secret store.

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use hoist_core::secret::{SecretStore, SecretValue};
use hoist_core::{AwsAuth, Error, Result};
use tracing::debug;

use crate::aws::sdk_config;

const VERSION_STAGE: &str = "AWSCURRENT";

pub struct SecretsManagerStore {
    client: Client,
}

impl SecretsManagerStore {
    pub async fn connect(auth: &AwsAuth) -> Self {
        let config = sdk_config(auth).await;
        Self::from_client(Client::new(&config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    fn name(&self) -> &'static str {
        "secrets-manager"
    }

    async fn get(&self, path: &str) -> Result<SecretValue> {
        debug!(secret = path, "Reading secret from Secrets Manager");

        let output = self
            .client
            .get_secret_value()
            .secret_id(path)
            .version_stage(VERSION_STAGE)
            .send()
            .await
            .map_err(|e| {
                Error::Auth(format!(
                    "failed to read secret `{}`: {}",
                    path,
                    DisplayErrorContext(e)
                ))
            })?;

        let raw = output
            .secret_string()
            .ok_or_else(|| Error::Auth(format!("secret `{}` has no string value", path)))?;

        Ok(SecretValue::from_json_or_string(raw))
    }
}
