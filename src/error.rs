use thiserror::Error;

/// Errors surfaced by plan construction, point setup and execution.
///
/// ### Variants
///
/// * `InvalidArgument` - The caller supplied inconsistent or out-of-range
///   input (transform count, rank/mode-count mismatch, negative bin sizes,
///   short buffers, points outside the periodic domain)
/// * `Unimplemented` - A recognised but unsupported configuration (type-3
///   transforms, Horner evaluation at a custom upsampling factor, ranks
///   outside 1..=3, placeholder device spreading methods)
/// * `Internal` - Resource or consistency failures (fine grid above the
///   hard cap, spread-only grid mismatch, thread pool construction)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NufftError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, NufftError>;

impl NufftError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Self::Unimplemented(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
