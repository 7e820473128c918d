//! Packing of a `(name, age, message)` greeting into a single 32-byte word, the payload carried
//! by the verifier's `NewGreeting` event.
//!
//! The fields are joined with [`GREETING_SEPARATOR`] and stored as UTF-8, zero padded. The last
//! byte is always zero, so at most [`MAX_GREETING_BYTES`] bytes of text fit.
//!
//! No escaping is performed: a separator inside `name` or `message` is encoded as-is and the word
//! will not decode back into the same three fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GreetKitError;

/// Separator placed between the greeting fields.
pub const GREETING_SEPARATOR: char = '\n';

/// Size of the encoded word.
pub const WORD_SIZE: usize = 32;

/// Usable bytes in a word; one byte is reserved for the terminator.
pub const MAX_GREETING_BYTES: usize = WORD_SIZE - 1;

/// Age of the sender, validated when it enters the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Age(u16);

impl Age {
    /// Creates an age from a number.
    #[must_use]
    pub const fn new(years: u16) -> Self {
        Self(years)
    }

    /// The age in years.
    #[must_use]
    pub const fn years(self) -> u16 {
        self.0
    }
}

impl FromStr for Age {
    type Err = GreetKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u16>()
            .map(Self)
            .map_err(|err| GreetKitError::InvalidGreetingField {
                field: "age",
                reason: format!("not a number: {err}"),
            })
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 32-byte greeting word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedGreeting([u8; WORD_SIZE]);

impl EncodedGreeting {
    /// Wraps a raw word without checking its contents.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; WORD_SIZE]) -> Self {
        Self(bytes)
    }

    /// Wraps a raw word from a slice.
    ///
    /// # Errors
    /// Returns `GreetKitError::MalformedGreeting` if the slice is not exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, GreetKitError> {
        let word: [u8; WORD_SIZE] = bytes.try_into().map_err(|_| {
            GreetKitError::MalformedGreeting(format!(
                "expected {WORD_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(word))
    }

    /// The raw bytes of the word.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; WORD_SIZE] {
        &self.0
    }

    /// `0x`-prefixed hex form of the word, as sent to the verifier.
    #[must_use]
    pub fn to_hex_string(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses the `0x`-prefixed (or bare) hex form of a word.
    ///
    /// # Errors
    /// Returns `GreetKitError::MalformedGreeting` if the input is not 32 hex-encoded bytes.
    pub fn try_from_hex_string(hex_string: &str) -> Result<Self, GreetKitError> {
        let bytes = hex::decode(hex_string.trim().trim_start_matches("0x"))
            .map_err(|err| GreetKitError::MalformedGreeting(err.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for EncodedGreeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncodedGreeting")
            .field(&self.to_hex_string())
            .finish()
    }
}

impl Serialize for EncodedGreeting {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex_string())
    }
}

impl<'de> Deserialize<'de> for EncodedGreeting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::try_from_hex_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Packs the three fields into a word.
///
/// # Errors
/// Returns `GreetKitError::EncodingTooLong` if the joined text exceeds [`MAX_GREETING_BYTES`].
pub fn encode(name: &str, age: Age, message: &str) -> Result<EncodedGreeting, GreetKitError> {
    let text = format!("{name}{GREETING_SEPARATOR}{age}{GREETING_SEPARATOR}{message}");
    let bytes = text.as_bytes();
    if bytes.len() > MAX_GREETING_BYTES {
        return Err(GreetKitError::EncodingTooLong {
            len: bytes.len(),
            max: MAX_GREETING_BYTES,
        });
    }

    let mut word = [0_u8; WORD_SIZE];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(EncodedGreeting(word))
}

/// Unpacks a word into `(name, age, message)`.
///
/// The age is read as any integer. Words come from a public event stream that anyone can write
/// to, so a negative or oversized age is passed on rather than rejected; only [`Age`] input is
/// range checked.
///
/// # Errors
/// Returns `GreetKitError::MalformedGreeting` if the word is not terminated, is not UTF-8, does
/// not split into exactly three fields, or carries an age that is not an integer.
pub fn decode(word: &EncodedGreeting) -> Result<(String, i64, String), GreetKitError> {
    let bytes = word.as_bytes();
    if bytes[WORD_SIZE - 1] != 0 {
        return Err(GreetKitError::MalformedGreeting(
            "missing null terminator".to_string(),
        ));
    }

    let end = bytes.iter().position(|b| *b == 0).unwrap_or(WORD_SIZE - 1);
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|err| GreetKitError::MalformedGreeting(err.to_string()))?;

    let parts: Vec<&str> = text.split(GREETING_SEPARATOR).collect();
    let [name, age, message] = parts.as_slice() else {
        return Err(GreetKitError::MalformedGreeting(format!(
            "expected 3 fields, found {}",
            parts.len()
        )));
    };

    let age = age.parse::<i64>().map_err(|err| {
        GreetKitError::MalformedGreeting(format!("age is not an integer: {err}"))
    })?;

    Ok(((*name).to_string(), age, (*message).to_string()))
}

/// A greeting as entered by a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    /// Display name of the sender.
    pub name: String,
    /// Age of the sender.
    pub age: Age,
    /// The greeting text.
    pub message: String,
}

impl Greeting {
    /// Builds a greeting, rejecting empty fields.
    ///
    /// # Errors
    /// Returns `GreetKitError::InvalidGreetingField` if `name` or `message` is empty.
    pub fn new(
        name: impl Into<String>,
        age: Age,
        message: impl Into<String>,
    ) -> Result<Self, GreetKitError> {
        let name = name.into();
        let message = message.into();
        if name.is_empty() {
            return Err(GreetKitError::InvalidGreetingField {
                field: "name",
                reason: "name is required".to_string(),
            });
        }
        if message.is_empty() {
            return Err(GreetKitError::InvalidGreetingField {
                field: "message",
                reason: "message is required".to_string(),
            });
        }
        Ok(Self { name, age, message })
    }

    /// Builds a greeting from raw form input, parsing the age.
    ///
    /// # Errors
    /// Returns `GreetKitError::InvalidGreetingField` for an empty field or a non-integer age.
    pub fn parse(name: &str, age: &str, message: &str) -> Result<Self, GreetKitError> {
        Self::new(name, age.parse()?, message)
    }

    /// See [`encode`].
    ///
    /// # Errors
    /// Returns `GreetKitError::EncodingTooLong` if the greeting does not fit in a word.
    pub fn encode(&self) -> Result<EncodedGreeting, GreetKitError> {
        encode(&self.name, self.age, &self.message)
    }

    /// See [`decode`]. The age must also fit an [`Age`].
    ///
    /// # Errors
    /// Returns `GreetKitError::MalformedGreeting` if the word cannot be decoded or its age is
    /// out of range.
    pub fn decode(word: &EncodedGreeting) -> Result<Self, GreetKitError> {
        let (name, age, message) = decode(word)?;
        let age = u16::try_from(age).map(Age).map_err(|_| {
            GreetKitError::MalformedGreeting(format!("age {age} is out of range"))
        })?;
        Ok(Self { name, age, message })
    }
}
