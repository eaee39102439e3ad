use dataship_core::validation::split_dataset_id;
use dataship_core::{ProgressSnapshot, ValidationError};

/// Initialize tracing for the CLI. Logs go to stderr so progress lines on
/// stdout stay clean.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

/// Account that owns `dataset_id` (`<account>.<name>`).
pub fn parse_dataset_id(dataset_id: &str) -> Result<&str, ValidationError> {
    split_dataset_id(dataset_id).map(|(account, _)| account)
}

/// Sources given as http(s) URLs are registered in place, not uploaded.
pub fn is_remote_source(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub fn format_progress(snapshot: &ProgressSnapshot) -> String {
    match snapshot.percentage {
        Some(percentage) => format!("Uploaded {}%", percentage.floor() as u64),
        None => format!("Uploaded {} bytes", snapshot.bytes_transferred),
    }
}
