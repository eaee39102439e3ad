use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fields that never go to the storage layer as policy form fields.
const RESERVED_FIELDS: &[&str] = &["url", "file", "region"];

/// Scoped, single-use storage credentials issued by the upload service.
///
/// Only `storage_key` and `storage_bucket` are interpreted by every writer.
/// The remaining fields are transport specific: access keys for a
/// multipart upload, or a pre-signed policy for a form POST.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default, alias = "key")]
    pub storage_key: String,
    #[serde(default, alias = "bucket")]
    pub storage_bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Object URL to register, when the service dictates one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Everything else the service sent (policy, signature, acl, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Credentials {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            storage_bucket: bucket.into(),
            storage_key: key.into(),
            ..Self::default()
        }
    }

    /// Name of the first required field that is absent or empty.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.storage_key.trim().is_empty() {
            Some("key")
        } else if self.storage_bucket.trim().is_empty() {
            Some("bucket")
        } else {
            None
        }
    }

    pub fn has_access_keys(&self) -> bool {
        matches!(
            (&self.access_key_id, &self.secret_access_key),
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty()
        )
    }

    pub fn has_post_policy(&self) -> bool {
        self.extra.contains_key("policy") && self.extra.contains_key("signature")
    }

    /// Form fields for a pre-signed POST, in a stable order.
    ///
    /// `key` is always first. Access keys and the session token are sent
    /// under the field names S3 expects for a POST policy.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("key".to_string(), self.storage_key.clone())];

        if let Some(id) = &self.access_key_id {
            fields.push(("AWSAccessKeyId".to_string(), id.clone()));
        }
        if let Some(token) = &self.session_token {
            fields.push(("x-amz-security-token".to_string(), token.clone()));
        }

        for (name, value) in &self.extra {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                continue;
            }
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            fields.push((name.clone(), value));
        }

        fields
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extra_keys: Vec<&str> = self.extra.keys().map(String::as_str).collect();
        f.debug_struct("Credentials")
            .field("storage_key", &self.storage_key)
            .field("storage_bucket", &self.storage_bucket)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("region", &self.region)
            .field("url", &self.url)
            .field("extra", &extra_keys)
            .finish()
    }
}
