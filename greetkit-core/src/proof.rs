//! Witness assembly, proof generation through an injected prover, and packing of the proof into
//! the layout the on-chain verifier expects.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    error::GreetKitError, greeting::EncodedGreeting, identity::Identity,
    merkle_tree::MembershipProof, scalar::Scalar,
};

/// Number of field elements in a packed Groth16 proof.
pub const PACKED_PROOF_LEN: usize = 8;

/// Hashes a signal the way the Semaphore verifier does: `keccak256(word) >> 8`, which keeps the
/// result inside the scalar field.
#[must_use]
pub fn signal_hash(signal: &EncodedGreeting) -> Scalar {
    let hash = keccak256(signal.as_bytes());
    Scalar(Scalar::from_be_bytes(hash.0).0 >> 8)
}

/// Location of the precompiled proving parameters (circuit wasm and final zkey).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvingKeyRef {
    /// Witness calculator compiled to wasm.
    pub wasm_path: PathBuf,
    /// Groth16 proving key.
    pub zkey_path: PathBuf,
}

impl Default for ProvingKeyRef {
    fn default() -> Self {
        Self {
            wasm_path: PathBuf::from("./semaphore.wasm"),
            zkey_path: PathBuf::from("./semaphore_final.zkey"),
        }
    }
}

/// Full circuit input for one greeting.
///
/// Not `Serialize`: provers map it to their own input format. `Debug` redacts the
/// identity secrets.
#[derive(Clone)]
pub struct Witness {
    /// Secret identity nullifier.
    pub identity_nullifier: Scalar,
    /// Secret identity trapdoor.
    pub identity_trapdoor: Scalar,
    /// Direction bits of the membership path.
    pub tree_path_indices: Vec<u8>,
    /// Sibling hashes of the membership path.
    pub tree_siblings: Vec<Scalar>,
    /// Round scope of the nullifier hash.
    pub external_nullifier: Scalar,
    /// Hash of the signal bound into the proof.
    pub signal_hash: Scalar,
    /// Root the membership path leads to. Not a circuit input.
    pub root: Scalar,
}

impl fmt::Debug for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Witness")
            .field("identity_nullifier", &"[REDACTED]")
            .field("identity_trapdoor", &"[REDACTED]")
            .field("tree_path_indices", &self.tree_path_indices)
            .field("tree_siblings", &self.tree_siblings)
            .field("external_nullifier", &self.external_nullifier)
            .field("signal_hash", &self.signal_hash)
            .field("root", &self.root)
            .finish()
    }
}

/// A Groth16 proof in the `snarkjs` JSON layout (projective coordinates).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    /// `A` point.
    pub pi_a: Vec<Scalar>,
    /// `B` point (pairs of `Fq2` coordinates).
    pub pi_b: Vec<Vec<Scalar>>,
    /// `C` point.
    pub pi_c: Vec<Scalar>,
    /// Proving system, `groth16`.
    pub protocol: String,
}

/// Public outputs of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSignals {
    /// Root of the membership tree.
    pub root: Scalar,
    /// Round-scoped nullifier hash.
    pub nullifier_hash: Scalar,
    /// Hash of the signal.
    pub signal_hash: Scalar,
    /// Round scope.
    pub external_nullifier: Scalar,
}

impl PublicSignals {
    /// Reads the circuit's ordered public output
    /// `[root, nullifierHash, signalHash, externalNullifier]`.
    ///
    /// # Errors
    /// Returns `GreetKitError::ProofGenerationFailed` if the slice does not have four elements.
    pub fn from_ordered(signals: &[Scalar]) -> Result<Self, GreetKitError> {
        let [root, nullifier_hash, signal_hash, external_nullifier] = signals else {
            return Err(GreetKitError::ProofGenerationFailed(format!(
                "expected 4 public signals, got {}",
                signals.len()
            )));
        };
        Ok(Self {
            root: *root,
            nullifier_hash: *nullifier_hash,
            signal_hash: *signal_hash,
            external_nullifier: *external_nullifier,
        })
    }
}

/// What a prover returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOutput {
    /// The opaque proof.
    pub proof: Groth16Proof,
    /// Its public signals.
    pub public_signals: PublicSignals,
}

/// A proof flattened into the element order of the Solidity verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackedProof(pub [Scalar; PACKED_PROOF_LEN]);

/// Errors surfaced by a proving capability.
#[derive(Debug, Error)]
pub enum ProverError {
    /// The proving parameters could not be loaded.
    #[error("proving key unavailable: {0}")]
    ProvingKey(String),
    /// The witness does not satisfy the circuit.
    #[error("witness rejected: {0}")]
    InvalidWitness(String),
    /// Anything else the backend reports.
    #[error("proof generation failed: {0}")]
    Backend(String),
}

/// The capability to generate a Groth16 proof for the Semaphore circuit.
///
/// Implementations may shell out to external provers or use in-process proving libraries. The
/// call is CPU-bound and may take seconds; it is always run on a blocking worker thread.
pub trait Prover: Send + Sync {
    /// Proves `witness` with the parameters at `proving_key`.
    fn prove(
        &self,
        witness: &Witness,
        proving_key: &ProvingKeyRef,
    ) -> Result<ProofOutput, ProverError>;
}

/// Assembles witnesses and drives a [`Prover`].
#[derive(Clone)]
pub struct ProofGenerator {
    prover: Arc<dyn Prover>,
    proving_key: ProvingKeyRef,
    tree_depth: usize,
}

impl ProofGenerator {
    /// Creates a generator for circuits with membership trees of `tree_depth` levels.
    #[must_use]
    pub fn new(prover: Arc<dyn Prover>, proving_key: ProvingKeyRef, tree_depth: usize) -> Self {
        Self {
            prover,
            proving_key,
            tree_depth,
        }
    }

    /// Assembles the circuit input. Only shapes are checked here; whether the witness satisfies
    /// the circuit is up to the prover.
    ///
    /// # Errors
    /// Returns `GreetKitError::InvalidWitnessInput` if the path does not have the configured
    /// depth or an index is not a bit.
    pub fn gen_witness(
        &self,
        identity: &Identity,
        membership_proof: &MembershipProof,
        external_nullifier: Scalar,
        signal: &EncodedGreeting,
    ) -> Result<Witness, GreetKitError> {
        if membership_proof.path_elements.len() != self.tree_depth {
            return Err(GreetKitError::InvalidWitnessInput(format!(
                "expected {} path elements, got {}",
                self.tree_depth,
                membership_proof.path_elements.len()
            )));
        }
        if membership_proof.path_indices.len() != self.tree_depth {
            return Err(GreetKitError::InvalidWitnessInput(format!(
                "expected {} path indices, got {}",
                self.tree_depth,
                membership_proof.path_indices.len()
            )));
        }
        if membership_proof.path_indices.iter().any(|index| *index > 1) {
            return Err(GreetKitError::InvalidWitnessInput(
                "path indices must be 0 or 1".to_string(),
            ));
        }

        Ok(Witness {
            identity_nullifier: identity.nullifier(),
            identity_trapdoor: identity.trapdoor(),
            tree_path_indices: membership_proof.path_indices.clone(),
            tree_siblings: membership_proof.path_elements.clone(),
            external_nullifier,
            signal_hash: signal_hash(signal),
            root: membership_proof.root,
        })
    }

    /// Runs the prover on the blocking worker pool and checks its public signals against the
    /// witness. There is no cancellation: once started, the prover runs to completion.
    ///
    /// # Errors
    /// Returns `GreetKitError::ProofGenerationFailed` if the prover fails, panics, or returns
    /// public signals that do not belong to this witness.
    pub async fn gen_proof(&self, witness: Witness) -> Result<ProofOutput, GreetKitError> {
        let expected_nullifier_hash = crate::poseidon::poseidon2(
            witness.external_nullifier,
            witness.identity_nullifier,
        )?;

        let prover = Arc::clone(&self.prover);
        let proving_key = self.proving_key.clone();
        let expected = PublicSignals {
            root: witness.root,
            nullifier_hash: expected_nullifier_hash,
            signal_hash: witness.signal_hash,
            external_nullifier: witness.external_nullifier,
        };

        log::info!("generating proof with {}", proving_key.zkey_path.display());
        let output = tokio::task::spawn_blocking(move || prover.prove(&witness, &proving_key))
            .await
            .map_err(|err| GreetKitError::ProofGenerationFailed(err.to_string()))?
            .map_err(|err| GreetKitError::ProofGenerationFailed(err.to_string()))?;

        if output.public_signals != expected {
            return Err(GreetKitError::ProofGenerationFailed(
                "public signals do not match the witness".to_string(),
            ));
        }

        Ok(output)
    }

    /// See [`pack_for_submission`].
    ///
    /// # Errors
    /// Returns `GreetKitError::ProofPackingFailed` on an unexpected proof layout.
    pub fn pack_for_submission(&self, proof: &Groth16Proof) -> Result<PackedProof, GreetKitError> {
        pack_for_submission(proof)
    }
}

/// Reorders a `snarkjs` proof into `[a0, a1, b01, b00, b11, b10, c0, c1]`.
///
/// # Errors
/// Returns `GreetKitError::ProofPackingFailed` if the proof is not a Groth16 proof with
/// 3 / 3x2 / 3 coordinates, which points at a backend version mismatch.
pub fn pack_for_submission(proof: &Groth16Proof) -> Result<PackedProof, GreetKitError> {
    if proof.protocol != "groth16" {
        return Err(GreetKitError::ProofPackingFailed(format!(
            "unsupported protocol {}",
            proof.protocol
        )));
    }

    let [a0, a1, _] = proof.pi_a.as_slice() else {
        return Err(GreetKitError::ProofPackingFailed(format!(
            "pi_a has {} elements, expected 3",
            proof.pi_a.len()
        )));
    };
    let [b0, b1, _] = proof.pi_b.as_slice() else {
        return Err(GreetKitError::ProofPackingFailed(format!(
            "pi_b has {} rows, expected 3",
            proof.pi_b.len()
        )));
    };
    let (Some([b00, b01]), Some([b10, b11])) = (pair(b0), pair(b1)) else {
        return Err(GreetKitError::ProofPackingFailed(
            "pi_b rows must have 2 elements".to_string(),
        ));
    };
    let [c0, c1, _] = proof.pi_c.as_slice() else {
        return Err(GreetKitError::ProofPackingFailed(format!(
            "pi_c has {} elements, expected 3",
            proof.pi_c.len()
        )));
    };

    Ok(PackedProof([*a0, *a1, b01, b00, b11, b10, *c0, *c1]))
}

fn pair(row: &[Scalar]) -> Option<[Scalar; 2]> {
    match row {
        [x, y] => Some([*x, *y]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{greeting::Age, merkle_tree::build_proof};

    struct EchoProver;

    impl Prover for EchoProver {
        fn prove(
            &self,
            witness: &Witness,
            _proving_key: &ProvingKeyRef,
        ) -> Result<ProofOutput, ProverError> {
            Ok(ProofOutput {
                proof: sample_proof(),
                public_signals: PublicSignals {
                    root: witness.root,
                    nullifier_hash: crate::poseidon::poseidon2(
                        witness.external_nullifier,
                        witness.identity_nullifier,
                    )
                    .map_err(|err| ProverError::Backend(err.to_string()))?,
                    signal_hash: witness.signal_hash,
                    external_nullifier: witness.external_nullifier,
                },
            })
        }
    }

    struct FailingProver;

    impl Prover for FailingProver {
        fn prove(&self, _: &Witness, _: &ProvingKeyRef) -> Result<ProofOutput, ProverError> {
            Err(ProverError::ProvingKey("missing zkey".to_string()))
        }
    }

    struct LyingProver;

    impl Prover for LyingProver {
        fn prove(&self, witness: &Witness, _: &ProvingKeyRef) -> Result<ProofOutput, ProverError> {
            Ok(ProofOutput {
                proof: sample_proof(),
                public_signals: PublicSignals {
                    root: witness.root,
                    nullifier_hash: Scalar::from(1_u64),
                    signal_hash: witness.signal_hash,
                    external_nullifier: witness.external_nullifier,
                },
            })
        }
    }

    fn s(value: u64) -> Scalar {
        Scalar::from(value)
    }

    fn sample_proof() -> Groth16Proof {
        Groth16Proof {
            pi_a: vec![s(1), s(2), s(1)],
            pi_b: vec![vec![s(3), s(4)], vec![s(5), s(6)], vec![s(1), s(0)]],
            pi_c: vec![s(7), s(8), s(1)],
            protocol: "groth16".to_string(),
        }
    }

    fn fixture(depth: usize) -> (Identity, MembershipProof, EncodedGreeting) {
        let identity = Identity::from_secret_material(b"not_a_real_signature").unwrap();
        let commitments = vec![s(5), identity.commitment(), s(42)];
        let proof = build_proof(&commitments, &identity.commitment(), depth).unwrap();
        let greeting = crate::greeting::encode("Bob", Age::new(50), "Sup!").unwrap();
        (identity, proof, greeting)
    }

    fn generator(prover: Arc<dyn Prover>, depth: usize) -> ProofGenerator {
        ProofGenerator::new(prover, ProvingKeyRef::default(), depth)
    }

    #[test]
    fn test_pack_order() {
        let packed = pack_for_submission(&sample_proof()).unwrap();
        assert_eq!(
            packed.0,
            [s(1), s(2), s(4), s(3), s(6), s(5), s(7), s(8)]
        );
    }

    #[test]
    fn test_pack_rejects_bad_shapes() {
        let mut proof = sample_proof();
        proof.pi_a.pop();
        assert!(matches!(
            pack_for_submission(&proof),
            Err(GreetKitError::ProofPackingFailed(_))
        ));

        let mut proof = sample_proof();
        proof.pi_b[1].push(s(9));
        assert!(pack_for_submission(&proof).is_err());

        let mut proof = sample_proof();
        proof.protocol = "plonk".to_string();
        assert!(pack_for_submission(&proof).is_err());
    }

    #[test]
    fn test_snarkjs_json_parses() {
        let json = r#"{
            "pi_a": ["1", "2", "1"],
            "pi_b": [["3", "4"], ["5", "6"], ["1", "0"]],
            "pi_c": ["7", "8", "1"],
            "protocol": "groth16",
            "curve": "bn128"
        }"#;
        let proof: Groth16Proof = serde_json::from_str(json).unwrap();
        assert_eq!(proof, sample_proof());
    }

    #[test]
    fn test_signal_hash_fits_field() {
        let word = crate::greeting::encode("Bob", Age::new(50), "Sup!").unwrap();
        let hash = signal_hash(&word);
        assert!(hash.is_field_element());
        assert_eq!(hash.to_be_bytes()[0], 0);
        assert_eq!(hash, signal_hash(&word));
    }

    #[test]
    fn test_witness_shape() {
        let (identity, proof, greeting) = fixture(4);
        let witness = generator(Arc::new(EchoProver), 4)
            .gen_witness(&identity, &proof, proof.root, &greeting)
            .unwrap();

        assert_eq!(witness.tree_siblings.len(), 4);
        assert_eq!(witness.external_nullifier, proof.root);
        assert_eq!(witness.signal_hash, signal_hash(&greeting));
        assert_eq!(witness.tree_path_indices, proof.path_indices);
        assert_eq!(witness.identity_trapdoor, identity.trapdoor());
    }

    #[test]
    fn test_witness_debug_redacts_secrets() {
        let (identity, proof, greeting) = fixture(4);
        let witness = generator(Arc::new(EchoProver), 4)
            .gen_witness(&identity, &proof, proof.root, &greeting)
            .unwrap();
        let debug = format!("{witness:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&identity.nullifier().to_string()));
    }

    #[test]
    fn test_witness_rejects_wrong_depth() {
        let (identity, proof, greeting) = fixture(3);
        let result = generator(Arc::new(EchoProver), 20).gen_witness(
            &identity,
            &proof,
            proof.root,
            &greeting,
        );
        assert!(matches!(result, Err(GreetKitError::InvalidWitnessInput(_))));
    }

    #[tokio::test]
    async fn test_gen_proof() {
        let (identity, proof, greeting) = fixture(4);
        let generator = generator(Arc::new(EchoProver), 4);
        let witness = generator
            .gen_witness(&identity, &proof, proof.root, &greeting)
            .unwrap();

        let output = generator.gen_proof(witness).await.unwrap();
        assert_eq!(
            output.public_signals.nullifier_hash,
            identity.nullifier_hash(proof.root).unwrap()
        );
        assert_eq!(output.public_signals.root, proof.root);
    }

    #[tokio::test]
    async fn test_gen_proof_surfaces_prover_failure() {
        let (identity, proof, greeting) = fixture(4);
        let generator = generator(Arc::new(FailingProver), 4);
        let witness = generator
            .gen_witness(&identity, &proof, proof.root, &greeting)
            .unwrap();

        let err = generator.gen_proof(witness).await.unwrap_err();
        assert!(matches!(
            err,
            GreetKitError::ProofGenerationFailed(msg) if msg.contains("missing zkey")
        ));
    }

    #[tokio::test]
    async fn test_gen_proof_rejects_mismatched_signals() {
        let (identity, proof, greeting) = fixture(4);
        let generator = generator(Arc::new(LyingProver), 4);
        let witness = generator
            .gen_witness(&identity, &proof, proof.root, &greeting)
            .unwrap();

        assert!(matches!(
            generator.gen_proof(witness).await,
            Err(GreetKitError::ProofGenerationFailed(_))
        ));
    }

    #[test]
    fn test_public_signals_from_ordered() {
        let signals = PublicSignals::from_ordered(&[s(1), s(2), s(3), s(4)]).unwrap();
        assert_eq!(signals.nullifier_hash, s(2));
        assert_eq!(signals.external_nullifier, s(4));
        assert!(PublicSignals::from_ordered(&[s(1)]).is_err());
    }
}
