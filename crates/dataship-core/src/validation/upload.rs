//! Upload configuration validation
//!
//! Rules applied synchronously before any network call:
//! - dataset ids have the form `<account>.<suffix>` and the account prefix
//!   must equal the uploading account
//! - display names are at most 64 characters drawn from `[A-Za-z0-9_.\- ]`

use std::path::Path;

use crate::constants::MAX_DISPLAY_NAME_LENGTH;
use crate::error::ValidationError;

fn is_display_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | ' ')
}

/// Fails with `MissingField` when `value` is empty or whitespace.
pub fn validate_required(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

/// Split a dataset id into its account and name parts.
///
/// Exactly one `.` separator with non-empty parts on both sides is accepted.
pub fn split_dataset_id(dataset_id: &str) -> Result<(&str, &str), ValidationError> {
    let mut parts = dataset_id.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(account), Some(name), None) if !account.is_empty() && !name.is_empty() => {
            Ok((account, name))
        }
        _ => Err(ValidationError::MalformedDatasetId(dataset_id.to_string())),
    }
}

/// Check that `dataset_id` is `<account>.<name>` for this `account`.
pub fn validate_dataset_id(dataset_id: &str, account: &str) -> Result<(), ValidationError> {
    let prefix = dataset_id.split('.').next().unwrap_or_default();
    if prefix != account {
        return Err(ValidationError::DatasetAccountMismatch {
            dataset_id: dataset_id.to_string(),
            account: account.to_string(),
        });
    }
    split_dataset_id(dataset_id)?;
    Ok(())
}

/// Check a caller-supplied display name.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let length = name.chars().count();
    if length > MAX_DISPLAY_NAME_LENGTH {
        return Err(ValidationError::DisplayNameTooLong {
            length,
            max: MAX_DISPLAY_NAME_LENGTH,
        });
    }
    if !name.chars().all(is_display_name_char) {
        return Err(ValidationError::DisplayNameCharset(name.to_string()));
    }
    Ok(())
}

/// Derive a display name from a file path: the basename minus its extension.
///
/// Characters outside the allowed set are replaced with `_` and the result
/// is truncated to the length limit, so a derived name always validates.
/// Returns `None` when the path has no usable stem.
pub fn derive_display_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();

    let sanitized: String = stem
        .chars()
        .take(MAX_DISPLAY_NAME_LENGTH)
        .map(|c| if is_display_name_char(c) { c } else { '_' })
        .collect();

    if sanitized.trim().is_empty() {
        return None;
    }

    Some(sanitized)
}

/// Display name for an object hosted at `url`: its last path segment,
/// decoded, without the extension. Query and fragment are ignored.
pub fn derive_display_name_from_url(url: &str) -> Option<String> {
    let url = url.split(['#', '?']).next().unwrap_or_default();
    let path = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (_, path) = path.split_once('/')?;
    let segment = path.rsplit('/').next().filter(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment).ok()?;
    derive_display_name(Path::new(decoded.as_ref()))
}
