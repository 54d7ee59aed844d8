//! Domain layer types and invariants.

pub mod error;
pub mod record;

pub use error::ValidationError;
pub use fequery_api_types::{AGE_MAX, AGE_MIN, ExampleRecord, UserInfo};
pub use record::{compare_names, sort_by_name, validate_record};
