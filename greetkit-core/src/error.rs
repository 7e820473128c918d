use thiserror::Error;

/// Error outputs from `GreetKit`
#[derive(Debug, Error)]
pub enum GreetKitError {
    /// The joined greeting does not fit in the 31 usable bytes of a word
    #[error("encoding_too_long: {len} bytes, max {max}")]
    EncodingTooLong {
        /// Byte length of the joined greeting.
        len: usize,
        /// Usable capacity of the word.
        max: usize,
    },
    /// A 32-byte word could not be decoded into `name`, `age` and `message`
    #[error("malformed_greeting: {0}")]
    MalformedGreeting(String),
    /// A greeting field was rejected at construction time
    #[error("invalid_greeting_field: {field}: {reason}")]
    InvalidGreetingField {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// The identity could not be derived (e.g. the signer declined)
    #[error("identity_derivation_failed: {0}")]
    IdentityDerivationFailed(String),
    /// The identity commitment is not part of the membership set
    #[error("membership_not_found")]
    MembershipNotFound,
    /// The requested tree cannot hold the membership set
    #[error("invalid_tree: {0}")]
    InvalidTree(String),
    /// The witness inputs do not have the expected shape
    #[error("invalid_witness_input: {0}")]
    InvalidWitnessInput(String),
    /// The proving capability failed or returned inconsistent output
    #[error("proof_generation_failed: {0}")]
    ProofGenerationFailed(String),
    /// The proof does not follow the element layout the verifier expects
    #[error("proof_packing_failed: {0}")]
    ProofPackingFailed(String),
    /// The verifier rejected the submission. The reason is kept verbatim.
    #[error("submission_rejected: {0}")]
    SubmissionRejected(String),
    /// The verifier could not be reached
    #[error("submission_unreachable: {0}")]
    SubmissionUnreachable(String),
    /// The presented data is not a valid scalar
    #[error("invalid_number")]
    InvalidNumber,
    /// Network connection error with details
    #[error("network_error at {url}: {error}")]
    NetworkError {
        /// The URL of the request.
        url: String,
        /// The HTTP status, if a response was received.
        status: Option<u16>,
        /// The error message.
        error: String,
    },
    /// Unexpected error serializing information
    #[error("serialization_error: {0}")]
    SerializationError(String),
    /// The Poseidon hasher failed
    #[error("hashing_error: {0}")]
    Hashing(String),
}

impl GreetKitError {
    /// The single message shown to a user when a flow aborts with this error.
    ///
    /// Verifier rejection reasons are passed through untouched.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EncodingTooLong { .. } => "Your greeting is too long!".to_string(),
            Self::InvalidGreetingField { field, reason } => format!("{field}: {reason}"),
            Self::IdentityDerivationFailed(_) => {
                "Could not create your Semaphore identity.".to_string()
            }
            Self::MembershipNotFound => {
                "Your identity is not part of the group.".to_string()
            }
            Self::SubmissionRejected(reason) => reason.clone(),
            Self::SubmissionUnreachable(_) => {
                "The greeting service could not be reached.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for GreetKitError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError(error.to_string())
    }
}
