use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Builder;

pub const STABLE_ID_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StableIdError {
    #[error("stable id must be {expected} characters, found {found}")]
    Length { expected: usize, found: usize },
    #[error("stable id contains non lowercase-hex character {0:?}")]
    NonHex(char),
    #[error("no entropy available for a new stable id: {0}")]
    Entropy(String),
}

/// Externally exposed surrogate key: 128 random bits as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    /// Draws a fresh version 4 identifier from the OS entropy source.
    pub fn generate() -> Result<Self, StableIdError> {
        let mut bytes = [0_u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| StableIdError::Entropy(err.to_string()))?;
        Ok(Self::from_random_bytes(bytes))
    }

    fn from_random_bytes(bytes: [u8; 16]) -> Self {
        Self(Builder::from_random_bytes(bytes).into_uuid().simple().to_string())
    }

    /// Wraps a value already persisted in the store. Rows written by other producers are not
    /// re-validated.
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StableId {
    type Err = StableIdError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let found = input.chars().count();
        if found != STABLE_ID_LEN {
            return Err(StableIdError::Length {
                expected: STABLE_ID_LEN,
                found,
            });
        }
        if let Some(bad) = input
            .chars()
            .find(|ch| !matches!(ch, '0'..='9' | 'a'..='f'))
        {
            return Err(StableIdError::NonHex(bad));
        }
        Ok(Self(input.to_string()))
    }
}

/// Source of identifiers for backfill and for producer-side inserts.
pub trait IdSource {
    fn next_id(&mut self) -> Result<StableId, StableIdError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&mut self) -> Result<StableId, StableIdError> {
        StableId::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_fixed_length_lowercase_hex() {
        let id = StableId::generate().expect("entropy");
        assert_eq!(id.as_str().len(), STABLE_ID_LEN);
        assert!(id
            .as_str()
            .chars()
            .all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
        assert_eq!(id.as_str().parse::<StableId>(), Ok(id.clone()));
    }

    #[test]
    fn random_source_does_not_repeat() {
        let mut source = RandomIds;
        let ids = (0..2_000)
            .map(|_| source.next_id().expect("entropy"))
            .collect::<HashSet<_>>();
        assert_eq!(ids.len(), 2_000);
    }

    #[test]
    fn random_bytes_are_stamped_as_version_4() {
        let id = StableId::from_random_bytes([0xff; 16]);
        assert_eq!(id.as_str(), "ffffffffffff4fffbfffffffffffffff");
        assert_eq!(id.as_str().parse::<StableId>(), Ok(id.clone()));
    }

    #[test]
    fn parse_rejects_hyphenated_and_uppercase_forms() {
        assert_eq!(
            "6f1c2a0e-93b4-4d7e-a1f0-3c5d9e8b7a61".parse::<StableId>(),
            Err(StableIdError::Length {
                expected: 32,
                found: 36
            })
        );
        assert_eq!(
            "6F1C2A0E93B44D7EA1F03C5D9E8B7A61".parse::<StableId>(),
            Err(StableIdError::NonHex('F'))
        );
    }

    #[test]
    fn stored_values_keep_their_original_text() {
        let legacy = StableId::from_stored("6f1c2a0e-93b4-4d7e-a1f0-3c5d9e8b7a61".to_string());
        assert_eq!(legacy.to_string(), "6f1c2a0e-93b4-4d7e-a1f0-3c5d9e8b7a61");
    }
}
