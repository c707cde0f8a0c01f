//! Amazon ECR sessions.

use aws_sdk_ecr::error::DisplayErrorContext;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hoist_core::{AwsAuth, Error, RegistryCredentials, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::aws::sdk_config;
use crate::registry::RegistryLogin;

// <account>.dkr.ecr[-fips].<region>.amazonaws.com[.cn]/<repository>
static ECR_REGISTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{12}\.dkr\.ecr(-fips)?\.[a-z0-9-]+\.amazonaws\.com(\.cn)?/").unwrap()
});

/// Whether `image` lives in a private ECR registry.
pub fn is_private_registry(image: &str) -> bool {
    ECR_REGISTRY.is_match(image)
}

/// Registry prefix for an account and region.
pub fn registry_prefix(account: &str, region: &str) -> String {
    format!("{}.dkr.ecr.{}.amazonaws.com", account, region)
}

/// Decode an ECR authorization token (`base64("AWS:<password>")`).
pub fn decode_authorization_token(token: &str) -> Result<(String, String)> {
    let decoded = STANDARD
        .decode(token)
        .map_err(|e| Error::Auth(format!("failed to decode ECR token: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| Error::Auth(format!("invalid UTF-8 in ECR token: {}", e)))?;

    decoded
        .split_once(':')
        .map(|(user, password)| (user.to_string(), password.to_string()))
        .ok_or_else(|| Error::Auth("malformed ECR token".to_string()))
}

/// STS and ECR clients for one AWS identity.
pub struct EcrSession {
    sts: aws_sdk_sts::Client,
    ecr: aws_sdk_ecr::Client,
    region: String,
}

impl EcrSession {
    pub async fn connect(auth: &AwsAuth) -> Self {
        let config = sdk_config(auth).await;
        Self {
            sts: aws_sdk_sts::Client::new(&config),
            ecr: aws_sdk_ecr::Client::new(&config),
            region: auth.region.clone(),
        }
    }

    /// `<account>.dkr.ecr.<region>.amazonaws.com` for the calling identity.
    pub async fn registry_prefix(&self) -> Result<String> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| {
                Error::Auth(format!(
                    "failed to resolve AWS account: {}",
                    aws_sdk_sts::error::DisplayErrorContext(e)
                ))
            })?;

        let account = identity
            .account()
            .ok_or_else(|| Error::Auth("caller identity has no account".to_string()))?;

        Ok(registry_prefix(account, &self.region))
    }

    /// Exchange an authorization token for registry credentials.
    pub async fn login(&self) -> Result<RegistryLogin> {
        let output = self
            .ecr
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| {
                Error::Auth(format!(
                    "failed to get ECR authorization token: {}",
                    DisplayErrorContext(e)
                ))
            })?;

        let data = output
            .authorization_data()
            .first()
            .ok_or_else(|| Error::Auth("ECR returned no authorization data".to_string()))?;

        let token = data
            .authorization_token()
            .ok_or_else(|| Error::Auth("ECR authorization data has no token".to_string()))?;
        let (username, password) = decode_authorization_token(token)?;

        let prefix = self.registry_prefix().await?;
        debug!(
            registry = %prefix,
            proxy_endpoint = data.proxy_endpoint().unwrap_or_default(),
            "Obtained ECR credentials"
        );

        Ok(ecr_login(&prefix, username, password))
    }
}

/// Images are pushed under `prefix`, so credentials are scoped to it too.
fn ecr_login(prefix: &str, username: String, password: String) -> RegistryLogin {
    let endpoint = format!("https://{}", prefix);
    RegistryLogin {
        credentials: RegistryCredentials {
            username,
            password,
            server_address: endpoint.clone(),
        },
        endpoint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_registry_detection() {
        assert!(is_private_registry(
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/base:latest"
        ));
        assert!(is_private_registry(
            "123456789012.dkr.ecr-fips.us-gov-west-1.amazonaws.com/base"
        ));
        assert!(is_private_registry(
            "123456789012.dkr.ecr.cn-north-1.amazonaws.com.cn/base:1"
        ));
        assert!(!is_private_registry("hoist/pytorch:1.9-py38-gpu"));
        assert!(!is_private_registry("public.ecr.aws/lambda/python:3.9"));
        assert!(!is_private_registry("ghcr.io/acme/dkr.ecr.amazonaws.com"));
    }

    #[test]
    fn test_registry_prefix() {
        assert_eq!(
            registry_prefix("123456789012", "eu-west-1"),
            "123456789012.dkr.ecr.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_login_targets_account_registry() {
        let prefix = registry_prefix("123456789012", "eu-west-1");
        let login = ecr_login(&prefix, "AWS".to_string(), "secret".to_string());

        assert_eq!(login.host(), "123456789012.dkr.ecr.eu-west-1.amazonaws.com");
        assert_eq!(
            login.credentials.server_address,
            "https://123456789012.dkr.ecr.eu-west-1.amazonaws.com"
        );
        assert!(is_private_registry(&format!("{}/acme/app", login.host())));
    }

    #[test]
    fn test_decode_authorization_token() {
        let token = STANDARD.encode("AWS:eyJwYXlsb2Fk");
        let (user, password) = decode_authorization_token(&token).unwrap();
        assert_eq!(user, "AWS");
        assert_eq!(password, "eyJwYXlsb2Fk");

        assert!(decode_authorization_token("%%%").is_err());
        assert!(decode_authorization_token(&STANDARD.encode("no-colon")).is_err());
    }
}
