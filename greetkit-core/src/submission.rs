//! Posting a proven greeting to the verifier.

use serde::Serialize;

use crate::{
    error::GreetKitError, greeting::EncodedGreeting, http_request::Request, proof::PackedProof,
    scalar::Scalar,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GreetBody<'a> {
    greeting: &'a EncodedGreeting,
    nullifier_hash: Scalar,
    solidity_proof: &'a PackedProof,
}

/// Acknowledgement that the verifier accepted a greeting.
///
/// Inclusion is not confirmed here; the greeting shows up later on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// HTTP status returned by the verifier endpoint.
    pub status: u16,
}

/// Sends greetings with their proofs to the verifier endpoint.
pub struct SubmissionClient {
    url: String,
    request: Request,
}

impl SubmissionClient {
    /// Creates a client posting to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, request: Request) -> Self {
        Self {
            url: url.into(),
            request,
        }
    }

    /// Posts the greeting, its nullifier hash and the packed proof. A single attempt is made.
    ///
    /// # Errors
    /// - `GreetKitError::SubmissionRejected` with the verifier's reason, verbatim, on any non-2xx
    ///   status (e.g. a repeated nullifier hash for the round or an invalid proof).
    /// - `GreetKitError::SubmissionUnreachable` if the endpoint cannot be reached.
    pub async fn submit(
        &self,
        greeting: &EncodedGreeting,
        nullifier_hash: Scalar,
        proof: &PackedProof,
    ) -> Result<SubmissionReceipt, GreetKitError> {
        let body = GreetBody {
            greeting,
            nullifier_hash,
            solidity_proof: proof,
        };

        let response = self
            .request
            .handle(self.request.post(&self.url).json(&body))
            .await
            .map_err(|err| GreetKitError::SubmissionUnreachable(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            log::info!("greeting accepted by verifier with status {status}");
            return Ok(SubmissionReceipt {
                status: status.as_u16(),
            });
        }

        let reason = response
            .text()
            .await
            .map_err(|err| GreetKitError::SubmissionUnreachable(err.to_string()))?;
        let reason = if reason.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("rejected by verifier")
                .to_string()
        } else {
            reason
        };

        log::warn!("greeting rejected by verifier with status {status}: {reason}");
        Err(GreetKitError::SubmissionRejected(reason))
    }
}
