use alloy_primitives::Address;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContractClientError {
    #[error("invalid descriptor: {0}")]
    Construction(String),

    #[error("invalid input `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("cannot encode value as {type_name}: {reason}")]
    Encoding { type_name: String, reason: String },

    #[error("cannot decode contract output: {0}")]
    Decoding(String),

    #[error("call to `{function}` failed")]
    CallFailed {
        function: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("transaction `{function}` failed")]
    SendFailed {
        function: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("missing signatures from {missing:?}")]
    QuorumNotReached { missing: Vec<Address> },

    #[error("nonce is stale: signed for {expected}, contract is at {current}")]
    StaleNonce { expected: u64, current: u64 },

    #[error("operation was already submitted")]
    AlreadySubmitted,

    #[error("configuration error: {0}")]
    Config(String),
}

impl ContractClientError {
    pub fn invalid_input(field: impl Into<String>, reason: impl ToString) -> Self {
        ContractClientError::InvalidInput {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    pub fn construction(reason: impl Into<String>) -> Self {
        ContractClientError::Construction(reason.into())
    }

    /// Failures coming from the network or the contract may succeed on a
    /// second attempt; marshalling and descriptor failures never do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ContractClientError::CallFailed { .. }
                | ContractClientError::SendFailed { .. }
                | ContractClientError::StaleNonce { .. }
        )
    }
}

pub type Result<T, E = ContractClientError> = std::result::Result<T, E>;
