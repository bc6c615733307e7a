use serde::Serialize;

/// Why a call to the scanning service produced no usable data.
///
/// Kept `Clone` and serializable so the last failure of each operation can be
/// stored in the session and reported by the UI state endpoint.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint} returned malformed JSON: {message}")]
    Decode { endpoint: String, message: String },

    #[error("{endpoint} returned an unexpected payload: {violation}")]
    Contract {
        endpoint: String,
        violation: ContractViolation,
    },
}

impl ApiError {
    pub fn endpoint(&self) -> &str {
        match self {
            ApiError::Transport { endpoint, .. }
            | ApiError::Status { endpoint, .. }
            | ApiError::Decode { endpoint, .. }
            | ApiError::Contract { endpoint, .. } => endpoint,
        }
    }

    pub(crate) fn transport(endpoint: &str, err: reqwest::Error) -> Self {
        ApiError::Transport {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

/// A response body that parsed as JSON but does not have the agreed shape.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{0}")]
pub struct ContractViolation(pub String);

impl ContractViolation {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
