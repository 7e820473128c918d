//! The write path: from a greeting typed by the user to a proof-carrying submission.

use std::fmt;
use std::sync::Arc;

use crate::{
    config::GreetKitConfig,
    error::GreetKitError,
    greeting::Greeting,
    identity::{ChallengeSigner, IdentityManager},
    merkle_tree::{build_proof, HttpMembershipSource, MembershipSource},
    proof::{ProofGenerator, Prover},
    scalar::Scalar,
    submission::SubmissionClient,
};

/// Status updates emitted while a greeting is on its way.
///
/// `Display` gives the line shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter)]
pub enum GreetProgress {
    /// The challenge signature is being requested and the identity derived.
    CreatingIdentity,
    /// The membership proof and the zero-knowledge proof are being built.
    CreatingProof,
    /// The proof is being posted to the verifier.
    Submitting,
    /// The verifier accepted the greeting.
    Accepted,
}

impl fmt::Display for GreetProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = match self {
            Self::CreatingIdentity => "Creating your Semaphore identity...",
            Self::CreatingProof => "Creating your Semaphore proof...",
            Self::Submitting => "Submitting your greeting...",
            Self::Accepted => "Your anonymous greeting is onchain :)",
        };
        f.write_str(line)
    }
}

/// Outcome of an accepted greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreetReceipt {
    /// Round-scoped nullifier hash that was spent.
    pub nullifier_hash: Scalar,
    /// Membership root the proof was made against; also the round's external nullifier.
    pub root: Scalar,
    /// HTTP status of the verifier's response.
    pub status: u16,
}

/// Runs the anonymous greeting flow against injected capabilities.
///
/// Nothing here stops a caller from greeting twice; a repeat in the same round produces the same
/// nullifier hash and is turned away by the verifier.
pub struct Greeter {
    identity_manager: IdentityManager,
    membership: Arc<dyn MembershipSource>,
    proof_generator: ProofGenerator,
    submission: SubmissionClient,
    tree_depth: usize,
}

impl Greeter {
    /// Assembles a greeter from its parts.
    #[must_use]
    pub fn new(
        identity_manager: IdentityManager,
        membership: Arc<dyn MembershipSource>,
        proof_generator: ProofGenerator,
        submission: SubmissionClient,
        tree_depth: usize,
    ) -> Self {
        Self {
            identity_manager,
            membership,
            proof_generator,
            submission,
            tree_depth,
        }
    }

    /// Wires a greeter to the HTTP endpoints of `config`.
    #[must_use]
    pub fn from_config(
        config: &GreetKitConfig,
        signer: Arc<dyn ChallengeSigner>,
        prover: Arc<dyn Prover>,
    ) -> Self {
        let request = config.request();
        Self::new(
            IdentityManager::new(signer),
            Arc::new(HttpMembershipSource::new(
                config.commitments_url.clone(),
                request.clone(),
            )),
            ProofGenerator::new(prover, config.proving_key.clone(), config.tree_depth),
            SubmissionClient::new(config.submission_url.clone(), request),
            config.tree_depth,
        )
    }

    /// Posts `greeting` anonymously, calling `progress` as each stage starts.
    ///
    /// Stages run strictly in order and the first failure aborts the rest. The encoding is checked
    /// before anything else, so an oversized greeting never triggers a signature request.
    ///
    /// # Errors
    /// Any [`GreetKitError`] of the failing stage. [`GreetKitError::user_message`] turns it into
    /// the line to show.
    pub async fn greet<F>(
        &self,
        greeting: &Greeting,
        progress: F,
    ) -> Result<GreetReceipt, GreetKitError>
    where
        F: Fn(GreetProgress),
    {
        let signal = greeting.encode()?;

        progress(GreetProgress::CreatingIdentity);
        let identity = self.identity_manager.derive_identity().await?;

        progress(GreetProgress::CreatingProof);
        let commitments = self.membership.fetch_commitments().await?;
        let membership_proof = build_proof(&commitments, &identity.commitment(), self.tree_depth)?;
        let external_nullifier = membership_proof.root;

        let witness = self.proof_generator.gen_witness(
            &identity,
            &membership_proof,
            external_nullifier,
            &signal,
        )?;
        let output = self.proof_generator.gen_proof(witness).await?;
        let packed = self.proof_generator.pack_for_submission(&output.proof)?;
        let nullifier_hash = output.public_signals.nullifier_hash;

        progress(GreetProgress::Submitting);
        let receipt = self
            .submission
            .submit(&signal, nullifier_hash, &packed)
            .await?;

        progress(GreetProgress::Accepted);
        Ok(GreetReceipt {
            nullifier_hash,
            root: membership_proof.root,
            status: receipt.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::{
        greeting::Age,
        http_request::Request,
        identity::SignerError,
        proof::{Groth16Proof, ProofOutput, ProverError, ProvingKeyRef, PublicSignals, Witness},
    };

    struct PanickingSigner;

    #[async_trait]
    impl ChallengeSigner for PanickingSigner {
        async fn sign_challenge(&self, _challenge: &str) -> Result<Vec<u8>, SignerError> {
            panic!("signer must not be asked for an oversized greeting");
        }
    }

    struct DecliningSigner;

    #[async_trait]
    impl ChallengeSigner for DecliningSigner {
        async fn sign_challenge(&self, _challenge: &str) -> Result<Vec<u8>, SignerError> {
            Err(SignerError::Declined)
        }
    }

    struct StaticMembership(Vec<Scalar>);

    #[async_trait]
    impl MembershipSource for StaticMembership {
        async fn fetch_commitments(&self) -> Result<Vec<Scalar>, GreetKitError> {
            Ok(self.0.clone())
        }
    }

    struct UnusedProver;

    impl Prover for UnusedProver {
        fn prove(&self, _: &Witness, _: &ProvingKeyRef) -> Result<ProofOutput, ProverError> {
            Ok(ProofOutput {
                proof: Groth16Proof {
                    pi_a: vec![],
                    pi_b: vec![],
                    pi_c: vec![],
                    protocol: "groth16".to_string(),
                },
                public_signals: PublicSignals::from_ordered(&[Scalar::ZERO; 4])
                    .map_err(|err| ProverError::Backend(err.to_string()))?,
            })
        }
    }

    fn greeter(signer: Arc<dyn ChallengeSigner>, members: Vec<Scalar>) -> Greeter {
        Greeter::new(
            IdentityManager::new(signer),
            Arc::new(StaticMembership(members)),
            ProofGenerator::new(Arc::new(UnusedProver), ProvingKeyRef::default(), 4),
            SubmissionClient::new("http://127.0.0.1:9/api/greet", Request::new()),
            4,
        )
    }

    #[test]
    fn test_progress_lines() {
        let lines: Vec<String> = GreetProgress::iter().map(|p| p.to_string()).collect();
        assert_eq!(
            lines,
            [
                "Creating your Semaphore identity...",
                "Creating your Semaphore proof...",
                "Submitting your greeting...",
                "Your anonymous greeting is onchain :)",
            ]
        );
    }

    #[tokio::test]
    async fn test_too_long_fails_before_signing() {
        let greeting =
            Greeting::new("Alice", Age::new(30), "a message that is far too long").unwrap();
        let seen = Mutex::new(Vec::new());

        let err = greeter(Arc::new(PanickingSigner), vec![])
            .greet(&greeting, |p| seen.lock().unwrap().push(p))
            .await
            .unwrap_err();

        assert!(matches!(err, GreetKitError::EncodingTooLong { .. }));
        assert_eq!(err.user_message(), "Your greeting is too long!");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declined_signature_aborts() {
        let greeting = Greeting::new("Bob", Age::new(50), "Sup!").unwrap();
        let seen = Mutex::new(Vec::new());

        let err = greeter(Arc::new(DecliningSigner), vec![])
            .greet(&greeting, |p| seen.lock().unwrap().push(p))
            .await
            .unwrap_err();

        assert!(matches!(err, GreetKitError::IdentityDerivationFailed(_)));
        assert_eq!(*seen.lock().unwrap(), [GreetProgress::CreatingIdentity]);
    }

    #[tokio::test]
    async fn test_unregistered_identity_is_membership_not_found() {
        struct Signer;

        #[async_trait]
        impl ChallengeSigner for Signer {
            async fn sign_challenge(&self, _challenge: &str) -> Result<Vec<u8>, SignerError> {
                Ok(b"someone_not_registered".to_vec())
            }
        }

        let greeting = Greeting::new("Bob", Age::new(50), "Sup!").unwrap();
        let err = greeter(
            Arc::new(Signer),
            vec![Scalar::from(5_u64), Scalar::from(17_u64)],
        )
        .greet(&greeting, |_| {})
        .await
        .unwrap_err();

        assert!(matches!(err, GreetKitError::MembershipNotFound));
    }
}
