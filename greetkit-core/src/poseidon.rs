//! Circom-compatible Poseidon over BN254, the hash the Semaphore circuit uses for identity
//! commitments, nullifier hashes and Merkle nodes.

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::{error::GreetKitError, scalar::Scalar};

/// Poseidon hash of an arbitrary number of inputs (1 to 12).
///
/// # Errors
/// Returns `GreetKitError::Hashing` if the hasher rejects the input width.
pub fn poseidon(inputs: &[Scalar]) -> Result<Scalar, GreetKitError> {
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())
        .map_err(|err| GreetKitError::Hashing(err.to_string()))?;
    let inputs: Vec<Fr> = inputs.iter().map(|input| input.to_fr()).collect();
    let result = hasher
        .hash(&inputs)
        .map_err(|err| GreetKitError::Hashing(err.to_string()))?;
    Ok(result.into())
}

/// Hash of a pair of tree nodes or of `(a, b)` secrets.
///
/// # Errors
/// See [`poseidon`].
pub fn poseidon2(left: Scalar, right: Scalar) -> Result<Scalar, GreetKitError> {
    poseidon(&[left, right])
}
