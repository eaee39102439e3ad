use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage write strategies
///
/// A credential bundle can authorize either an SDK-managed multipart upload
/// (access key, secret and session token) or a single pre-signed form POST
/// (policy and signature). `Auto` picks whichever the bundle supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageStrategy {
    #[default]
    Auto,
    Multipart,
    FormPost,
}

impl FromStr for StorageStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(StorageStrategy::Auto),
            "multipart" => Ok(StorageStrategy::Multipart),
            "form-post" | "form_post" | "post" => Ok(StorageStrategy::FormPost),
            _ => Err(anyhow::anyhow!("Invalid storage strategy: {}", s)),
        }
    }
}

impl Display for StorageStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageStrategy::Auto => write!(f, "auto"),
            StorageStrategy::Multipart => write!(f, "multipart"),
            StorageStrategy::FormPost => write!(f, "form-post"),
        }
    }
}
