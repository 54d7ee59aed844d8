use thiserror::Error;

/// Local validation failure, raised before any request leaves the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{field}` is required")]
    Required { field: &'static str },
    #[error("`{field}` must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
        value: u32,
    },
}

impl ValidationError {
    pub fn required(field: &'static str) -> Self {
        Self::Required { field }
    }

    pub fn out_of_range(field: &'static str, min: u32, max: u32, value: u32) -> Self {
        Self::OutOfRange {
            field,
            min,
            max,
            value,
        }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Required { field } | Self::OutOfRange { field, .. } => field,
        }
    }
}
