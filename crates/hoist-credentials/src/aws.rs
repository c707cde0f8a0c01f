//! AWS session helpers shared by the ECR, S3 and Secrets Manager clients.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use hoist_config::AwsSettings;
use hoist_core::{AwsAuth, AwsIdentity, Error, Result};

/// Build SDK configuration for one [`AwsAuth`].
pub async fn sdk_config(auth: &AwsAuth) -> SdkConfig {
    let loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(auth.region.clone()));

    let loader = match &auth.identity {
        AwsIdentity::Ambient => loader,
        AwsIdentity::Profile(name) => loader.profile_name(name),
        AwsIdentity::Static {
            access_key_id,
            secret_access_key,
        } => loader.credentials_provider(Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "hoist",
        )),
    };

    loader.load().await
}

/// Session material derived from deployment settings alone.
///
/// Delegated (container task role) deployments carry a region only;
/// otherwise the configured profile is used.
pub fn settings_auth(settings: &AwsSettings) -> Result<AwsAuth> {
    let region = settings
        .region
        .clone()
        .ok_or_else(|| Error::Auth("AWS region is not configured".to_string()))?;

    let identity = match (&settings.profile, settings.delegated()) {
        (_, true) | (None, false) => AwsIdentity::Ambient,
        (Some(profile), false) => AwsIdentity::Profile(profile.clone()),
    };

    Ok(AwsAuth { identity, region })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegated_ignores_profile() {
        let settings = AwsSettings {
            profile: Some("dev".to_string()),
            region: Some("us-east-1".to_string()),
            container_credentials_uri: Some("/v2/credentials/task".to_string()),
        };
        let auth = settings_auth(&settings).unwrap();
        assert_eq!(auth.identity, AwsIdentity::Ambient);
        assert_eq!(auth.region, "us-east-1");
    }

    #[test]
    fn test_profile_when_not_delegated() {
        let settings = AwsSettings {
            profile: Some("dev".to_string()),
            region: Some("eu-west-1".to_string()),
            container_credentials_uri: None,
        };
        let auth = settings_auth(&settings).unwrap();
        assert_eq!(auth.identity, AwsIdentity::Profile("dev".to_string()));
    }

    #[test]
    fn test_region_required() {
        let err = settings_auth(&AwsSettings::default()).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
