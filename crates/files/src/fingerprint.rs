//! Content fingerprints and the digest algorithms that produce them.

use crate::{FilesError, FilesResult};
use sha2::{Digest, Sha256, Sha512};
use std::{fmt, str::FromStr};

/// Digest algorithm used to fingerprint content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Lowercase name, also used as the top-level directory for this algorithm's objects.
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of a hex-encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
        }
    }

    /// Fingerprints `content`. The raw bytes are hashed as-is, with no normalisation.
    pub fn digest(self, content: &[u8]) -> Fingerprint {
        let hex = match self {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(content)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(content)),
        };
        Fingerprint {
            algorithm: self,
            hex,
        }
    }

    fn from_hex_len(len: usize) -> Option<Self> {
        [HashAlgorithm::Sha256, HashAlgorithm::Sha512]
            .into_iter()
            .find(|algorithm| algorithm.hex_len() == len)
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = FilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(HashAlgorithm::Sha512),
            other => Err(FilesError::InvalidConfig(format!(
                "unsupported hash algorithm '{}' (expected sha256 or sha512)",
                other
            ))),
        }
    }
}

/// Lowercase hex digest identifying a stored object.
///
/// The algorithm is implied by the digest length, so a fingerprint can be parsed from a bare
/// string without extra context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    algorithm: HashAlgorithm,
    hex: String,
}

impl Fingerprint {
    /// Parses a fingerprint supplied from outside the store.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidPath`] unless `input` is 64 or 128 lowercase hex characters.
    /// Uppercase digests are rejected rather than normalised so that one object has exactly one
    /// spelling on disk.
    pub fn parse(input: &str) -> FilesResult<Self> {
        let algorithm = HashAlgorithm::from_hex_len(input.len()).ok_or_else(|| {
            FilesError::InvalidPath(format!(
                "fingerprint must be 64 or 128 hex characters, got {}",
                input.len()
            ))
        })?;

        if !input
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(FilesError::InvalidPath(
                "fingerprint must contain only lowercase hex characters".into(),
            ));
        }

        Ok(Self {
            algorithm,
            hex: input.to_owned(),
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// The two directory levels an object is sharded under: `hex[0..2]` and `hex[2..4]`.
    pub(crate) fn shards(&self) -> (&str, &str) {
        (&self.hex[0..2], &self.hex[2..4])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl FromStr for Fingerprint {
    type Err = FilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.hex)
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Fingerprint::parse(&s).map_err(serde::de::Error::custom)
    }
}
