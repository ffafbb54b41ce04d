use std::error::Error as StdError;
use std::fmt;

/// Normalized outcome of a failed backend call.
///
/// By the time a caller sees one of these, the adapter has already shown
/// the user whatever notice the failure deserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response was received (connect failure, timeout, DNS).
    Network(String),
    /// The primary backend answered 401 for a call other than login.
    Unauthorized,
    /// Non-2xx status, or a 2xx body whose envelope reports failure.
    Rejected { status: u16, message: String },
    /// The response body did not have the expected shape.
    Decode(String),
    /// The request could not be built.
    Request(String),
}

impl ApiError {
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(detail) => write!(f, "Network unreachable: {detail}"),
            ApiError::Unauthorized => write!(f, "Session expired, please log in again"),
            ApiError::Rejected { status, message } => {
                write!(f, "Request rejected ({status}): {message}")
            }
            ApiError::Decode(detail) => write!(f, "Unexpected response body: {detail}"),
            ApiError::Request(detail) => write!(f, "Invalid request: {detail}"),
        }
    }
}

impl StdError for ApiError {}
