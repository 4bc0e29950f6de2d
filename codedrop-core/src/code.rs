//! Session codes.
//!
//! Short, human-typeable identifiers minted by the relay. The alphabet drops
//! `0/O`, `1/I/L` so codes survive being read aloud or copied by hand.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ProtocolError;

/// Characters a code may contain.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Number of characters in a code.
pub const CODE_LENGTH: usize = 6;

/// Opaque identifier for one transfer's worth of files at the relay.
///
/// Immutable once issued. Construction goes through [`SessionCode::generate`]
/// or validated parsing; there is no way to build an ill-formed code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionCode(String);

impl SessionCode {
    /// Draw a fresh random code.
    ///
    /// Uniqueness among live sessions is the registry's job, not this one's.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parse user input. Surrounding whitespace is ignored and lowercase is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidCode`] on wrong length or characters
    /// outside [`CODE_ALPHABET`].
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let normalized = input.trim().to_ascii_uppercase();
        if normalized.len() != CODE_LENGTH
            || !normalized.bytes().all(|b| CODE_ALPHABET.contains(&b))
        {
            return Err(ProtocolError::InvalidCode);
        }
        Ok(Self(normalized))
    }

    /// The code as typed by users.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated hash for log lines. Codes are bearer secrets and never
    /// appear in logs verbatim.
    pub fn log_id(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for SessionCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
