//! Semaphore identities derived from a wallet signature.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretBox};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{error::GreetKitError, poseidon::poseidon, poseidon::poseidon2, scalar::Scalar};

/// The fixed challenge a sender signs to obtain the secret material for their identity.
pub const IDENTITY_CHALLENGE: &str = "Sign this message to create your identity!";

const TRAPDOOR_TAG: &[u8] = b"identity_trapdoor";
const NULLIFIER_TAG: &[u8] = b"identity_nullifier";

/// Errors surfaced by an external signing capability.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The user declined to sign.
    #[error("signature request declined")]
    Declined,
    /// No signer is available (e.g. wallet not connected).
    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// The capability to sign a challenge string with a key the user controls.
///
/// The signature is only used as derivation input, so any deterministic signature scheme works as
/// long as the same key always produces the same bytes for the same challenge.
#[async_trait]
pub trait ChallengeSigner: Send + Sync {
    /// Signs `challenge` and returns the raw signature bytes.
    async fn sign_challenge(&self, challenge: &str) -> Result<Vec<u8>, SignerError>;
}

/// An anonymous Semaphore identity.
///
/// The trapdoor and nullifier are secret and never leave this type except as witness input for
/// the prover. Only the commitment and round-scoped nullifier hashes are public.
#[derive(Debug)]
pub struct Identity {
    trapdoor: SecretBox<[u8; 32]>,
    nullifier: SecretBox<[u8; 32]>,
    commitment: Scalar,
}

impl Identity {
    /// Derives an identity from arbitrary secret material, usually a signature over
    /// [`IDENTITY_CHALLENGE`]. The same material always yields the same identity.
    ///
    /// # Errors
    /// Returns `GreetKitError::IdentityDerivationFailed` if the material is empty.
    pub fn from_secret_material(secret_material: &[u8]) -> Result<Self, GreetKitError> {
        if secret_material.is_empty() {
            return Err(GreetKitError::IdentityDerivationFailed(
                "empty secret material".to_string(),
            ));
        }

        let seed_hex = hex::encode(Sha256::digest(secret_material));
        let trapdoor = derive_field(seed_hex.as_bytes(), TRAPDOOR_TAG);
        let nullifier = derive_field(seed_hex.as_bytes(), NULLIFIER_TAG);

        let commitment = commitment_for(trapdoor, nullifier)?;

        Ok(Self {
            trapdoor: SecretBox::init_with(|| trapdoor.to_be_bytes()),
            nullifier: SecretBox::init_with(|| nullifier.to_be_bytes()),
            commitment,
        })
    }

    /// The public identity commitment, the leaf inserted into the membership set.
    #[must_use]
    pub const fn commitment(&self) -> Scalar {
        self.commitment
    }

    /// Generates the nullifier hash for a round. It is identical for every attempt by this
    /// identity with the same `external_nullifier`, which is what lets the verifier reject
    /// repeat posts.
    ///
    /// # Errors
    /// Returns `GreetKitError::Hashing` if hashing fails.
    pub fn nullifier_hash(&self, external_nullifier: Scalar) -> Result<Scalar, GreetKitError> {
        poseidon2(external_nullifier, self.nullifier())
    }

    /// Compares two identities in constant time.
    #[must_use]
    pub fn is_equal_to(&self, other: &Self) -> bool {
        let trapdoor = self
            .trapdoor
            .expose_secret()
            .ct_eq(other.trapdoor.expose_secret());
        let nullifier = self
            .nullifier
            .expose_secret()
            .ct_eq(other.nullifier.expose_secret());
        (trapdoor & nullifier).into()
    }

    pub(crate) fn trapdoor(&self) -> Scalar {
        Scalar::from_be_bytes(*self.trapdoor.expose_secret())
    }

    pub(crate) fn nullifier(&self) -> Scalar {
        Scalar::from_be_bytes(*self.nullifier.expose_secret())
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal_to(other)
    }
}

impl Eq for Identity {}

fn derive_field(seed_hex: &[u8], tag: &[u8]) -> Scalar {
    let digest = Sha256::new().chain_update(seed_hex).chain_update(tag).finalize();
    Scalar::reduce_be_bytes(&digest)
}

fn commitment_for(trapdoor: Scalar, nullifier: Scalar) -> Result<Scalar, GreetKitError> {
    let secret = poseidon2(nullifier, trapdoor)?;
    poseidon(&[secret])
}

/// Derives identities from signatures obtained through an injected [`ChallengeSigner`].
pub struct IdentityManager {
    signer: Arc<dyn ChallengeSigner>,
}

impl IdentityManager {
    /// Creates a manager backed by `signer`.
    #[must_use]
    pub fn new(signer: Arc<dyn ChallengeSigner>) -> Self {
        Self { signer }
    }

    /// Asks the signer to sign [`IDENTITY_CHALLENGE`] and derives the identity from the signature.
    ///
    /// # Errors
    /// Returns `GreetKitError::IdentityDerivationFailed` if the signer declines or fails.
    pub async fn derive_identity(&self) -> Result<Identity, GreetKitError> {
        let signature = self
            .signer
            .sign_challenge(IDENTITY_CHALLENGE)
            .await
            .map_err(|err| GreetKitError::IdentityDerivationFailed(err.to_string()))?;

        let identity = Identity::from_secret_material(&signature)?;
        log::debug!(
            "derived identity with commitment {}",
            identity.commitment().to_hex_string()
        );
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSigner(Option<Vec<u8>>);

    #[async_trait]
    impl ChallengeSigner for FixedSigner {
        async fn sign_challenge(&self, challenge: &str) -> Result<Vec<u8>, SignerError> {
            assert_eq!(challenge, IDENTITY_CHALLENGE);
            self.0.clone().ok_or(SignerError::Declined)
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = Identity::from_secret_material(b"not_a_real_signature").unwrap();
        let b = Identity::from_secret_material(b"not_a_real_signature").unwrap();

        assert_eq!(a.trapdoor(), b.trapdoor());
        assert_eq!(a.nullifier(), b.nullifier());
        assert_eq!(a.commitment(), b.commitment());
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_material_gives_different_identity() {
        let a = Identity::from_secret_material(b"signature_one").unwrap();
        let b = Identity::from_secret_material(b"signature_two").unwrap();

        assert_ne!(a.trapdoor(), b.trapdoor());
        assert_ne!(a.nullifier(), b.nullifier());
        assert_ne!(a.commitment(), b.commitment());
        assert_ne!(a, b);
    }

    #[test]
    fn test_secrets_are_field_elements() {
        let identity = Identity::from_secret_material(b"not_a_real_signature").unwrap();
        assert!(identity.trapdoor().is_field_element());
        assert!(identity.nullifier().is_field_element());
        assert!(identity.commitment().is_field_element());
        assert_ne!(identity.trapdoor(), identity.nullifier());
    }

    #[test]
    fn test_commitment_matches_semaphore_construction() {
        let identity = Identity::from_secret_material(b"not_a_real_signature").unwrap();
        let secret = poseidon2(identity.nullifier(), identity.trapdoor()).unwrap();
        assert_eq!(identity.commitment(), poseidon(&[secret]).unwrap());
    }

    #[test]
    fn test_nullifier_hash_is_round_scoped() {
        let identity = Identity::from_secret_material(b"not_a_real_signature").unwrap();
        let round_one = Scalar::from(1_u64);
        let round_two = Scalar::from(2_u64);

        assert_eq!(
            identity.nullifier_hash(round_one).unwrap(),
            identity.nullifier_hash(round_one).unwrap()
        );
        assert_ne!(
            identity.nullifier_hash(round_one).unwrap(),
            identity.nullifier_hash(round_two).unwrap()
        );
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let identity = Identity::from_secret_material(b"not_a_real_signature").unwrap();
        let debug = format!("{identity:?}");
        assert!(!debug.contains(&hex::encode(identity.trapdoor().to_be_bytes())));
        assert!(!debug.contains(&hex::encode(identity.nullifier().to_be_bytes())));
    }

    #[test]
    fn test_empty_material_is_rejected() {
        assert!(matches!(
            Identity::from_secret_material(b""),
            Err(GreetKitError::IdentityDerivationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_manager_uses_signature() {
        let manager = IdentityManager::new(Arc::new(FixedSigner(Some(b"sig".to_vec()))));
        let identity = manager.derive_identity().await.unwrap();
        assert_eq!(identity, Identity::from_secret_material(b"sig").unwrap());
    }

    #[tokio::test]
    async fn test_manager_surfaces_declined_signature() {
        let manager = IdentityManager::new(Arc::new(FixedSigner(None)));
        let err = manager.derive_identity().await.unwrap_err();
        assert!(matches!(
            err,
            GreetKitError::IdentityDerivationFailed(msg) if msg.contains("declined")
        ));
    }
}
