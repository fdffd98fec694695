pub mod extraction;
pub mod hash;
pub mod uploads;
pub mod validation;

pub use hash::{content_hash, is_content_hash};
pub use validation::{FileValidator, SupportedFormats, ValidatedFile, ValidationError};
