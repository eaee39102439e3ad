//! Constants shared across the dataship crates.

use std::time::Duration;

/// Upload service used when neither the caller nor the environment overrides it.
pub const DEFAULT_SERVICE_URL: &str = "https://api.dataship.io";

/// Maximum length of a dataset display name, in characters.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 64;

/// Wall-clock interval between progress snapshots.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout applied to requests against the upload service.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Size of each part in a multipart storage upload (the S3 minimum).
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

/// Number of multipart parts allowed in flight at once.
pub const MAX_IN_FLIGHT_PARTS: usize = 4;
