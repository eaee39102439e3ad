use crate::{FormPostWriter, ObjectStoreWriter, StorageError, StorageResult, StorageWriter};
use dataship_core::{Credentials, StorageStrategy};
use std::sync::Arc;

/// Create a storage writer for one set of credentials.
///
/// `Auto` picks multipart when the credentials carry access keys and form
/// POST when they carry a policy and signature.
pub fn create_writer(
    creds: &Credentials,
    strategy: StorageStrategy,
    endpoint_url: Option<&str>,
    proxy_url: Option<&str>,
) -> StorageResult<Arc<dyn StorageWriter>> {
    let strategy = match strategy {
        StorageStrategy::Auto if creds.has_access_keys() => StorageStrategy::Multipart,
        StorageStrategy::Auto if creds.has_post_policy() => StorageStrategy::FormPost,
        StorageStrategy::Auto => {
            return Err(StorageError::ConfigError(
                "credentials carry neither access keys nor a POST policy".to_string(),
            ))
        }
        explicit => explicit,
    };

    tracing::debug!(
        %strategy,
        bucket = %creds.storage_bucket,
        "Selected storage write strategy"
    );

    match strategy {
        StorageStrategy::FormPost => {
            let mut writer = FormPostWriter::new(creds, proxy_url)?;
            if let Some(endpoint) = endpoint_url {
                writer = writer.with_endpoint(endpoint);
            }
            Ok(Arc::new(writer))
        }
        _ => Ok(Arc::new(ObjectStoreWriter::from_credentials(
            creds,
            endpoint_url,
            proxy_url,
        )?)),
    }
}

/// Source of a writer for freshly fetched credentials.
///
/// The orchestrator asks for a new writer on every upload because each
/// credential bundle is single-use.
pub trait StorageProvider: Send + Sync {
    fn writer_for(&self, creds: &Credentials) -> StorageResult<Arc<dyn StorageWriter>>;
}

/// Default provider: builds writers with [`create_writer`].
#[derive(Debug, Clone, Default)]
pub struct CredentialStorageProvider {
    pub strategy: StorageStrategy,
    pub endpoint_url: Option<String>,
    pub proxy_url: Option<String>,
}

impl CredentialStorageProvider {
    pub fn new(
        strategy: StorageStrategy,
        endpoint_url: Option<String>,
        proxy_url: Option<String>,
    ) -> Self {
        Self {
            strategy,
            endpoint_url,
            proxy_url,
        }
    }
}

impl StorageProvider for CredentialStorageProvider {
    fn writer_for(&self, creds: &Credentials) -> StorageResult<Arc<dyn StorageWriter>> {
        create_writer(
            creds,
            self.strategy,
            self.endpoint_url.as_deref(),
            self.proxy_url.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_creds() -> Credentials {
        Credentials {
            access_key_id: Some("AKIA".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..Credentials::new("tiles", "k")
        }
    }

    fn policy_creds() -> Credentials {
        let mut creds = Credentials::new("tiles", "k");
        creds.extra.insert("policy".to_string(), "p".into());
        creds.extra.insert("signature".to_string(), "s".into());
        creds
    }

    #[test]
    fn auto_prefers_access_keys() {
        let writer = create_writer(&key_creds(), StorageStrategy::Auto, None, None).unwrap();
        assert_eq!(writer.strategy(), StorageStrategy::Multipart);
    }

    #[test]
    fn auto_falls_back_to_form_post() {
        let writer = create_writer(&policy_creds(), StorageStrategy::Auto, None, None).unwrap();
        assert_eq!(writer.strategy(), StorageStrategy::FormPost);
    }

    #[test]
    fn auto_without_auth_fields_is_a_config_error() {
        let result = create_writer(&Credentials::new("tiles", "k"), StorageStrategy::Auto, None, None);
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[test]
    fn explicit_multipart_still_needs_keys() {
        let result = create_writer(&policy_creds(), StorageStrategy::Multipart, None, None);
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[test]
    fn provider_applies_endpoint() {
        let provider = CredentialStorageProvider::new(
            StorageStrategy::FormPost,
            Some("http://localhost:9000".to_string()),
            None,
        );
        let writer = provider.writer_for(&policy_creds()).unwrap();
        assert_eq!(writer.object_url("k"), "http://localhost:9000/tiles/k");
    }
}
