use thiserror::Error;

/// Failures raised by the resampling core.
///
/// Both kinds are programming or configuration mistakes on the caller side: nothing is retried and no
/// partial result is returned. Units lacking trials are not an error, see
/// [`SampleSizer::count_excluded_units`](crate::counts::SampleSizer::count_excluded_units).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResampleError {
    /// Malformed inputs (mismatched lengths, unsupported feature values, empty counts...).
    #[error("Validation error: {0}")]
    Validation(String),
    /// Inconsistent configuration (more folds than samples, non-positive sizes...).
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ResampleError>;

impl ResampleError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        ResampleError::Validation(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        ResampleError::Config(msg.into())
    }
}
