//! Stable names for key derivation chains.
//!
//! A signature is written next to every encrypted artifact so the key can be
//! re-derived later from `signature + salt + password` alone. Once a
//! signature has shipped its chain must never change; new parameters get a
//! new signature.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio_util::sync::CancellationToken;

use super::kdf::{Argon2id, ChainedKeyDeriver, HashAlgorithm, Hkdf, KeyBytes, Pbkdf2, Scrypt};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDeriverSignature {
    BackupFastV1,
    BackupSecureV1,
    ItemFastV1,
    ItemSecureV1,
    TestingV1,
    TestingFailingV1,
}

impl KeyDeriverSignature {
    pub const ALL: [KeyDeriverSignature; 6] = [
        KeyDeriverSignature::BackupFastV1,
        KeyDeriverSignature::BackupSecureV1,
        KeyDeriverSignature::ItemFastV1,
        KeyDeriverSignature::ItemSecureV1,
        KeyDeriverSignature::TestingV1,
        KeyDeriverSignature::TestingFailingV1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyDeriverSignature::BackupFastV1 => "backup-fast-v1",
            KeyDeriverSignature::BackupSecureV1 => "backup-secure-v1",
            KeyDeriverSignature::ItemFastV1 => "item-fast-v1",
            KeyDeriverSignature::ItemSecureV1 => "item-secure-v1",
            KeyDeriverSignature::TestingV1 => "testing-v1",
            KeyDeriverSignature::TestingFailingV1 => "testing-failing-v1",
        }
    }
}

impl fmt::Display for KeyDeriverSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyDeriverSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|sig| sig.as_str() == s)
            .ok_or_else(|| Error::UnknownKeyDeriverSignature(s.to_string()))
    }
}

impl Serialize for KeyDeriverSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for KeyDeriverSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// A chain together with the signature that names it.
#[derive(Debug, Clone)]
pub struct SignedKeyDeriver {
    signature: KeyDeriverSignature,
    chain: ChainedKeyDeriver,
}

impl SignedKeyDeriver {
    pub fn new(signature: KeyDeriverSignature, chain: ChainedKeyDeriver) -> Self {
        Self { signature, chain }
    }

    pub fn signature(&self) -> KeyDeriverSignature {
        self.signature
    }

    pub fn chain(&self) -> &ChainedKeyDeriver {
        &self.chain
    }

    pub fn derive(&self, password: &[u8], salt: &[u8]) -> Result<KeyBytes> {
        self.chain.derive(password, salt)
    }

    pub fn derive_cancellable(
        &self,
        password: &[u8],
        salt: &[u8],
        token: &CancellationToken,
    ) -> Result<KeyBytes> {
        self.chain.derive_cancellable(password, salt, token)
    }
}

type DeriverConstructor = fn() -> ChainedKeyDeriver;

/// Immutable signature → chain mapping.
///
/// Build it once and hand out references; it carries no interior mutability.
#[derive(Clone)]
pub struct KeyDeriverRegistry {
    entries: HashMap<KeyDeriverSignature, DeriverConstructor>,
}

impl fmt::Debug for KeyDeriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl Default for KeyDeriverRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl KeyDeriverRegistry {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Every signature this release knows how to reproduce.
    pub fn standard() -> Self {
        Self::empty()
            .with(KeyDeriverSignature::BackupFastV1, backup_fast_v1)
            .with(KeyDeriverSignature::BackupSecureV1, backup_secure_v1)
            .with(KeyDeriverSignature::ItemFastV1, item_fast_v1)
            .with(KeyDeriverSignature::ItemSecureV1, item_secure_v1)
            .with(KeyDeriverSignature::TestingV1, testing_v1)
            .with(KeyDeriverSignature::TestingFailingV1, testing_failing_v1)
    }

    pub fn with(mut self, signature: KeyDeriverSignature, constructor: DeriverConstructor) -> Self {
        self.entries.insert(signature, constructor);
        self
    }

    pub fn get(&self, signature: KeyDeriverSignature) -> Result<SignedKeyDeriver> {
        self.entries
            .get(&signature)
            .map(|constructor| SignedKeyDeriver::new(signature, constructor()))
            .ok_or_else(|| Error::UnknownKeyDeriverSignature(signature.to_string()))
    }

    pub fn lookup(&self, signature: &str) -> Result<SignedKeyDeriver> {
        self.get(signature.parse()?)
    }

    pub fn contains(&self, signature: KeyDeriverSignature) -> bool {
        self.entries.contains_key(&signature)
    }
}

fn backup_secure_v1() -> ChainedKeyDeriver {
    ChainedKeyDeriver::starting_with(Pbkdf2 {
        algorithm: HashAlgorithm::Sha384,
        iterations: 1_000_000,
    })
    .then(Scrypt {
        log_n: 17,
        r: 8,
        p: 1,
    })
    .then(Argon2id {
        memory_kib: 128 * 1024,
        iterations: 4,
        parallelism: 1,
    })
}

fn backup_fast_v1() -> ChainedKeyDeriver {
    ChainedKeyDeriver::starting_with(Pbkdf2 {
        algorithm: HashAlgorithm::Sha384,
        iterations: 1_000,
    })
    .then(Scrypt {
        log_n: 8,
        r: 8,
        p: 1,
    })
    .then(Argon2id {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
}

fn item_secure_v1() -> ChainedKeyDeriver {
    ChainedKeyDeriver::starting_with(Pbkdf2 {
        algorithm: HashAlgorithm::Sha512,
        iterations: 600_000,
    })
    .then(Argon2id {
        memory_kib: 64 * 1024,
        iterations: 3,
        parallelism: 1,
    })
}

fn item_fast_v1() -> ChainedKeyDeriver {
    ChainedKeyDeriver::starting_with(Pbkdf2 {
        algorithm: HashAlgorithm::Sha512,
        iterations: 1_000,
    })
    .then(Argon2id {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
}

fn testing_v1() -> ChainedKeyDeriver {
    ChainedKeyDeriver::starting_with(Hkdf {
        algorithm: HashAlgorithm::Sha256,
        info: b"vaultkeep.testing.v1",
    })
}

// second stage is rejected on purpose
fn testing_failing_v1() -> ChainedKeyDeriver {
    ChainedKeyDeriver::starting_with(Hkdf {
        algorithm: HashAlgorithm::Sha256,
        info: b"vaultkeep.testing.failing.v1",
    })
    .then(Pbkdf2 {
        algorithm: HashAlgorithm::Sha256,
        iterations: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_strings_roundtrip() {
        for sig in KeyDeriverSignature::ALL {
            assert_eq!(sig.as_str().parse::<KeyDeriverSignature>().unwrap(), sig);
        }
    }

    #[test]
    fn unknown_signature_string_fails() {
        match "backup-quantum-v9".parse::<KeyDeriverSignature>() {
            Err(Error::UnknownKeyDeriverSignature(s)) => assert_eq!(s, "backup-quantum-v9"),
            other => panic!("expected UnknownKeyDeriverSignature, got: {other:?}"),
        }
    }

    #[test]
    fn standard_registry_knows_every_signature() {
        let registry = KeyDeriverRegistry::standard();
        for sig in KeyDeriverSignature::ALL {
            assert!(registry.contains(sig), "{sig} missing");
            assert_eq!(registry.get(sig).unwrap().signature(), sig);
        }
    }

    #[test]
    fn registry_without_entry_reports_unknown_signature() {
        let registry =
            KeyDeriverRegistry::empty().with(KeyDeriverSignature::TestingV1, testing_v1);

        assert!(registry.lookup("testing-v1").is_ok());
        assert!(matches!(
            registry.lookup("backup-fast-v1"),
            Err(Error::UnknownKeyDeriverSignature(_))
        ));
    }

    #[test]
    fn lookup_is_deterministic() {
        let registry = KeyDeriverRegistry::standard();
        let salt = [9u8; 16];

        for sig in ["testing-v1", "backup-fast-v1", "item-fast-v1"] {
            let a = registry.lookup(sig).unwrap().derive(b"hunter2", &salt).unwrap();
            let b = registry.lookup(sig).unwrap().derive(b"hunter2", &salt).unwrap();
            assert_eq!(a, b, "{sig}");
        }
    }

    #[test]
    fn different_signatures_give_different_keys() {
        let registry = KeyDeriverRegistry::standard();
        let salt = [9u8; 16];

        let a = registry.lookup("backup-fast-v1").unwrap().derive(b"pw", &salt).unwrap();
        let b = registry.lookup("item-fast-v1").unwrap().derive(b"pw", &salt).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn failing_fixture_always_fails() {
        let registry = KeyDeriverRegistry::standard();
        let deriver = registry.get(KeyDeriverSignature::TestingFailingV1).unwrap();
        assert!(matches!(
            deriver.derive(b"pw", &[0u8; 16]),
            Err(Error::KeyDerivationFailed(_))
        ));
    }

    #[test]
    fn signature_serializes_as_plain_string() {
        let json = serde_json::to_string(&KeyDeriverSignature::ItemSecureV1).unwrap();
        assert_eq!(json, "\"item-secure-v1\"");
        let back: KeyDeriverSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, KeyDeriverSignature::ItemSecureV1);
    }
}
