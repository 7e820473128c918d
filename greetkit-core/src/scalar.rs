use std::ops::Deref;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use ruint::aliases::U256;
use ruint::uint;
use serde::{Deserialize, Serialize};

use crate::error::GreetKitError;

/// Order of the BN254 scalar field. Tree leaves and hash inputs must be below it.
pub const BN254_SCALAR_MODULUS: U256 = uint!(
    21888242871839275222246405745257275088548364400416034343698204186575808495617_U256
);

/// A 256-bit value as used by the membership tree, the proofs and the verifier.
///
/// Most inputs and outputs of the zero-knowledge proofs are `U256` values. When sent as JSON
/// they are represented as padded hex strings from Big Endian bytes. Parsing also accepts
/// decimal strings, which is how membership lists are commonly published.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Default)]
pub struct Scalar(pub U256);

impl Scalar {
    /// The zero value, also used to pad absent tree leaves.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Outputs a hex string representation padded to 32 bytes (plus two bytes for the `0x` prefix).
    #[must_use]
    pub fn to_hex_string(&self) -> String {
        format!("{:#066x}", self.0)
    }

    /// Attempts to parse a hex string, with or without `0x` prefix.
    ///
    /// # Errors
    /// Will return `GreetKitError::InvalidNumber` if the input is not a hex number up to 256 bits.
    pub fn try_from_hex_string(hex_string: &str) -> Result<Self, GreetKitError> {
        let hex_string = hex_string.trim().trim_start_matches("0x");

        let number = U256::from_str_radix(hex_string, 16)
            .map_err(|_| GreetKitError::InvalidNumber)?;

        Ok(Self(number))
    }

    /// Parses either a `0x`-prefixed hex string or a decimal string.
    ///
    /// # Errors
    /// Will return `GreetKitError::InvalidNumber` if the input is neither.
    pub fn parse(value: &str) -> Result<Self, GreetKitError> {
        let value = value.trim();
        if value.starts_with("0x") || value.starts_with("0X") {
            return Self::try_from_hex_string(&value[2..]);
        }
        U256::from_str_radix(value, 10)
            .map(Self)
            .map_err(|_| GreetKitError::InvalidNumber)
    }

    /// Like [`Scalar::parse`], but also requires the value to be a BN254 scalar field element.
    ///
    /// # Errors
    /// Will return `GreetKitError::InvalidNumber` on parse failure or if the value is out of range.
    pub fn parse_field_element(value: &str) -> Result<Self, GreetKitError> {
        let scalar = Self::parse(value)?;
        if scalar.is_field_element() {
            Ok(scalar)
        } else {
            Err(GreetKitError::InvalidNumber)
        }
    }

    /// Whether the value is strictly below the BN254 scalar modulus.
    #[must_use]
    pub fn is_field_element(&self) -> bool {
        self.0 < BN254_SCALAR_MODULUS
    }

    /// Interprets 32 big-endian bytes as a number.
    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(U256::from_be_bytes(bytes))
    }

    /// Big-endian bytes of the value.
    #[must_use]
    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes::<32>()
    }

    /// Interprets 32 big-endian bytes as a number reduced into the scalar field.
    #[must_use]
    pub fn reduce_be_bytes(bytes: &[u8]) -> Self {
        Self::from(Fr::from_be_bytes_mod_order(bytes))
    }

    pub(crate) fn to_fr(self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.to_be_bytes())
    }
}

impl From<Fr> for Scalar {
    fn from(value: Fr) -> Self {
        let bytes = value.into_bigint().to_bytes_be();
        Self(U256::from_be_slice(&bytes))
    }
}

impl From<Scalar> for U256 {
    fn from(val: Scalar) -> Self {
        val.0
    }
}

impl From<U256> for Scalar {
    fn from(val: U256) -> Self {
        Self(val)
    }
}

impl From<u64> for Scalar {
    fn from(val: u64) -> Self {
        Self(U256::from(val))
    }
}

impl FromStr for Scalar {
    type Err = GreetKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

impl Deref for Scalar {
    type Target = U256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex_string())
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
