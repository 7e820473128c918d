use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use greetkit_core::{
    identity::{ChallengeSigner, SignerError},
    proof::{Groth16Proof, ProofOutput, Prover, ProverError, ProvingKeyRef, PublicSignals, Witness},
    Scalar,
};

/// Proves by running `snarkjs groth16 fullprove` in a scratch directory.
pub struct SnarkjsProver {
    executable: PathBuf,
}

impl SnarkjsProver {
    pub const fn new(executable: PathBuf) -> Self {
        Self { executable }
    }

    fn run(&self, dir: &Path, proving_key: &ProvingKeyRef) -> Result<(), ProverError> {
        let output = Command::new(&self.executable)
            .arg("groth16")
            .arg("fullprove")
            .arg(dir.join("input.json"))
            .arg(&proving_key.wasm_path)
            .arg(&proving_key.zkey_path)
            .arg(dir.join("proof.json"))
            .arg(dir.join("public.json"))
            .output()
            .map_err(|err| {
                ProverError::Backend(format!("failed to run {}: {err}", self.executable.display()))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !proving_key.zkey_path.exists() || !proving_key.wasm_path.exists() {
            return Err(ProverError::ProvingKey(stderr.into_owned()));
        }
        Err(ProverError::InvalidWitness(stderr.into_owned()))
    }
}

impl Prover for SnarkjsProver {
    fn prove(
        &self,
        witness: &Witness,
        proving_key: &ProvingKeyRef,
    ) -> Result<ProofOutput, ProverError> {
        let dir = tempfile::tempdir().map_err(|err| ProverError::Backend(err.to_string()))?;

        let input = serde_json::to_vec(&CircuitInput::from(witness)).map_err(backend)?;
        std::fs::write(dir.path().join("input.json"), input).map_err(backend)?;

        tracing::debug!("running snarkjs in {}", dir.path().display());
        self.run(dir.path(), proving_key)?;

        let proof: Groth16Proof =
            serde_json::from_slice(&std::fs::read(dir.path().join("proof.json")).map_err(backend)?)
                .map_err(backend)?;
        let public: Vec<String> =
            serde_json::from_slice(&std::fs::read(dir.path().join("public.json")).map_err(backend)?)
                .map_err(backend)?;
        let public = public
            .iter()
            .map(|signal| Scalar::parse(signal))
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;

        Ok(ProofOutput {
            proof,
            public_signals: PublicSignals::from_ordered(&public).map_err(backend)?,
        })
    }
}

fn backend(err: impl std::fmt::Display) -> ProverError {
    ProverError::Backend(err.to_string())
}

/// snarkjs wants every field element as a decimal string.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CircuitInput {
    identity_nullifier: String,
    identity_trapdoor: String,
    tree_path_indices: Vec<u8>,
    tree_siblings: Vec<String>,
    external_nullifier: String,
    signal_hash: String,
}

impl From<&Witness> for CircuitInput {
    fn from(witness: &Witness) -> Self {
        let decimal = |scalar: &Scalar| scalar.0.to_string();
        Self {
            identity_nullifier: decimal(&witness.identity_nullifier),
            identity_trapdoor: decimal(&witness.identity_trapdoor),
            tree_path_indices: witness.tree_path_indices.clone(),
            tree_siblings: witness.tree_siblings.iter().map(decimal).collect(),
            external_nullifier: decimal(&witness.external_nullifier),
            signal_hash: decimal(&witness.signal_hash),
        }
    }
}

/// Hands out secret material supplied on the command line in place of a wallet signature.
pub struct LocalSigner(Vec<u8>);

impl LocalSigner {
    pub fn new(secret: &str) -> eyre::Result<Self> {
        Ok(Self(secret_material(secret)?))
    }
}

#[async_trait]
impl ChallengeSigner for LocalSigner {
    async fn sign_challenge(&self, _challenge: &str) -> Result<Vec<u8>, SignerError> {
        Ok(self.0.clone())
    }
}

/// `0x` prefixed input is hex decoded, anything else is taken as raw bytes.
pub fn secret_material(secret: &str) -> eyre::Result<Vec<u8>> {
    match secret.strip_prefix("0x") {
        Some(hex) => Ok(hex::decode(hex)?),
        None => Ok(secret.as_bytes().to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_material() {
        assert_eq!(secret_material("0x0a0b").unwrap(), vec![10, 11]);
        assert_eq!(secret_material("hunter2").unwrap(), b"hunter2".to_vec());
        assert!(secret_material("0xzz").is_err());
    }

    #[test]
    fn test_circuit_input_is_decimal() {
        let witness = Witness {
            identity_nullifier: Scalar::from(1_u64),
            identity_trapdoor: Scalar::from(2_u64),
            tree_path_indices: vec![1, 0],
            tree_siblings: vec![Scalar::from(5_u64), Scalar::from(255_u64)],
            external_nullifier: Scalar::from(3_u64),
            signal_hash: Scalar::from(4_u64),
            root: Scalar::from(3_u64),
        };
        let json = serde_json::to_value(CircuitInput::from(&witness)).unwrap();
        assert_eq!(json["treeSiblings"], serde_json::json!(["5", "255"]));
        assert_eq!(json["identityTrapdoor"], "2");
        assert!(json.get("root").is_none());
    }

    #[test]
    fn test_missing_executable_is_backend_error() {
        let prover = SnarkjsProver::new(PathBuf::from("/nonexistent/snarkjs"));
        let witness = Witness {
            identity_nullifier: Scalar::from(1_u64),
            identity_trapdoor: Scalar::from(2_u64),
            tree_path_indices: vec![],
            tree_siblings: vec![],
            external_nullifier: Scalar::from(3_u64),
            signal_hash: Scalar::from(4_u64),
            root: Scalar::from(3_u64),
        };
        assert!(matches!(
            prover.prove(&witness, &ProvingKeyRef::default()),
            Err(ProverError::Backend(_))
        ));
    }
}
