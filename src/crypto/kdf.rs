//! Key derivation primitives and the chained deriver built from them.
//!
//! Every primitive turns `(password, salt)` into a [`KEY_LEN`]-byte key. A
//! [`ChainedKeyDeriver`] runs several primitives in order, feeding each
//! stage's output to the next stage as its password. All stages share the
//! caller's salt.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use ring::{hkdf, pbkdf2};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zeroize::Zeroizing;

use super::KEY_LEN;
use crate::error::{Error, Result};

/// Derived key material, wiped on drop.
pub type KeyBytes = Zeroizing<[u8; KEY_LEN]>;

/// A single password-to-key function.
pub trait KeyDerivation: Send + Sync + fmt::Debug {
    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<KeyBytes>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    fn pbkdf2(self) -> pbkdf2::Algorithm {
        match self {
            HashAlgorithm::Sha256 => pbkdf2::PBKDF2_HMAC_SHA256,
            HashAlgorithm::Sha384 => pbkdf2::PBKDF2_HMAC_SHA384,
            HashAlgorithm::Sha512 => pbkdf2::PBKDF2_HMAC_SHA512,
        }
    }

    fn hkdf(self) -> hkdf::Algorithm {
        match self {
            HashAlgorithm::Sha256 => hkdf::HKDF_SHA256,
            HashAlgorithm::Sha384 => hkdf::HKDF_SHA384,
            HashAlgorithm::Sha512 => hkdf::HKDF_SHA512,
        }
    }
}

/// PBKDF2-HMAC password stretching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pbkdf2 {
    pub algorithm: HashAlgorithm,
    pub iterations: u32,
}

impl KeyDerivation for Pbkdf2 {
    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<KeyBytes> {
        let iterations = NonZeroU32::new(self.iterations).ok_or_else(|| {
            Error::KeyDerivationFailed("pbkdf2 iterations must be non-zero".to_string())
        })?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::derive(
            self.algorithm.pbkdf2(),
            iterations,
            salt,
            password,
            key.as_mut(),
        );
        Ok(key)
    }
}

/// scrypt, memory-hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scrypt {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl KeyDerivation for Scrypt {
    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<KeyBytes> {
        let params = scrypt::Params::new(self.log_n, self.r, self.p, KEY_LEN)
            .map_err(|e| Error::KeyDerivationFailed(format!("invalid scrypt parameters: {e}")))?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        scrypt::scrypt(password, salt, &params, key.as_mut())
            .map_err(|e| Error::KeyDerivationFailed(format!("scrypt key derivation failed: {e}")))?;
        Ok(key)
    }
}

/// Argon2id v1.3, memory-hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2id {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KeyDerivation for Argon2id {
    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<KeyBytes> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| Error::KeyDerivationFailed(format!("invalid Argon2 parameters: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(password, salt, key.as_mut())
            .map_err(|e| Error::KeyDerivationFailed(format!("argon2 key derivation failed: {e}")))?;
        Ok(key)
    }
}

/// HKDF extract-and-expand. Cheap; only suitable for high-entropy input
/// or as a test fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hkdf {
    pub algorithm: HashAlgorithm,
    pub info: &'static [u8],
}

struct OkmLen(usize);

impl hkdf::KeyType for OkmLen {
    fn len(&self) -> usize {
        self.0
    }
}

impl KeyDerivation for Hkdf {
    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<KeyBytes> {
        let prk = hkdf::Salt::new(self.algorithm.hkdf(), salt).extract(password);
        let info = [self.info];
        let okm = prk
            .expand(&info, OkmLen(KEY_LEN))
            .map_err(|_| Error::KeyDerivationFailed("hkdf expand failed".to_string()))?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        okm.fill(key.as_mut())
            .map_err(|_| Error::KeyDerivationFailed("hkdf fill failed".to_string()))?;
        Ok(key)
    }
}

/// An ordered, non-empty sequence of KDF stages.
#[derive(Debug, Clone)]
pub struct ChainedKeyDeriver {
    stages: Vec<Arc<dyn KeyDerivation>>,
}

impl ChainedKeyDeriver {
    pub fn new(stages: Vec<Arc<dyn KeyDerivation>>) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::KeyDerivationFailed(
                "key deriver chain needs at least one stage".to_string(),
            ));
        }
        Ok(Self { stages })
    }

    pub fn starting_with(stage: impl KeyDerivation + 'static) -> Self {
        Self {
            stages: vec![Arc::new(stage)],
        }
    }

    pub fn then(mut self, stage: impl KeyDerivation + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stages(&self) -> &[Arc<dyn KeyDerivation>] {
        &self.stages
    }

    pub fn derive(&self, password: &[u8], salt: &[u8]) -> Result<KeyBytes> {
        self.run(password, salt, None)
    }

    /// Like [`derive`](Self::derive), but gives up with [`Error::Cancelled`]
    /// at the next stage boundary once `token` is cancelled.
    pub fn derive_cancellable(
        &self,
        password: &[u8],
        salt: &[u8],
        token: &CancellationToken,
    ) -> Result<KeyBytes> {
        self.run(password, salt, Some(token))
    }

    fn run(
        &self,
        password: &[u8],
        salt: &[u8],
        token: Option<&CancellationToken>,
    ) -> Result<KeyBytes> {
        let mut key: Option<KeyBytes> = None;

        for (index, stage) in self.stages.iter().enumerate() {
            if token.is_some_and(CancellationToken::is_cancelled) {
                debug!(stage = index, "key derivation cancelled");
                return Err(Error::Cancelled);
            }

            debug!(stage = index, kdf = ?stage, "running key derivation stage");
            let input: &[u8] = match &key {
                Some(previous) => previous.as_slice(),
                None => password,
            };
            let next = stage.derive(input, salt).map_err(|e| match e {
                Error::KeyDerivationFailed(msg) => {
                    Error::KeyDerivationFailed(format!("stage {index}: {msg}"))
                }
                other => other,
            })?;
            key = Some(next);
        }

        key.ok_or_else(|| Error::KeyDerivationFailed("empty key deriver chain".to_string()))
    }
}
