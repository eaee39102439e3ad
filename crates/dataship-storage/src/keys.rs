//! Storage key checks shared by every writer.

use crate::traits::{StorageError, StorageResult};

/// Reject keys that could escape the credential's scope.
///
/// Keys are issued by the upload service, so this only guards against
/// obviously malformed bundles: empty keys, a leading `/`, or `..` segments.
pub fn validate_storage_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!("{key}: leading '/'")));
    }
    if key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(format!("{key}: '..' segment")));
    }
    Ok(())
}

/// Percent-encode each path segment of a key for use in a URL.
pub fn encode_key_for_url(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
