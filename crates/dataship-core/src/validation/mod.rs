//! Validation modules

pub mod upload;

pub use upload::{
    derive_display_name, derive_display_name_from_url, split_dataset_id, validate_dataset_id, validate_display_name,
    validate_required,
};
