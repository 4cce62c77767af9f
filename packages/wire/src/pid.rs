//! Process identifiers.
//!
//! A [`Pid`] is 160 bits drawn from the operating system's CSPRNG. Its
//! string form is base58 (Bitcoin alphabet) so it can be embedded in
//! protocol paths and URLs without escaping.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of a [`Pid`] in bytes.
pub const PID_LEN: usize = 20;

/// Errors produced when parsing a [`Pid`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PidError {
    /// The string was empty.
    #[error("empty pid")]
    Empty,

    /// The string is not valid base58.
    #[error("invalid pid encoding: {0}")]
    Encoding(String),

    /// The decoded value does not fit in 160 bits.
    #[error("pid decodes to {0} bytes, expected at most {PID_LEN}")]
    Length(usize),
}

/// Opaque 160-bit process identifier.
///
/// Equality, ordering and hashing are byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid([u8; PID_LEN]);

impl Pid {
    /// Generate a new random Pid.
    pub fn new() -> Self {
        let mut bytes = [0u8; PID_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a Pid from raw bytes.
    pub const fn from_bytes(bytes: [u8; PID_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PID_LEN] {
        &self.0
    }

    /// Parse a Pid from its base58 string form.
    ///
    /// Values that decode to fewer than 20 bytes are left-padded with zeros,
    /// so a string that dropped its leading `1` digits still names the same
    /// identifier.
    pub fn parse(s: &str) -> Result<Self, PidError> {
        if s.is_empty() {
            return Err(PidError::Empty);
        }

        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| PidError::Encoding(e.to_string()))?;
        if decoded.len() > PID_LEN {
            return Err(PidError::Length(decoded.len()));
        }

        let mut bytes = [0u8; PID_LEN];
        bytes[PID_LEN - decoded.len()..].copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl Default for Pid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self)
    }
}

impl FromStr for Pid {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<[u8; PID_LEN]> for Pid {
    fn from(bytes: [u8; PID_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Pid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Pid::parse(&s).map_err(serde::de::Error::custom)
    }
}
