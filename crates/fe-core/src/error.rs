use thiserror::Error;

pub type FeResult<T> = Result<T, FeError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Configuration error: {what}")]
    Configuration { what: String },

    #[error("Numerical failure: {what}")]
    Numerical { what: String },

    #[error("Invariant violated: {what}")]
    Invariant { what: String },
}
