//! The derived encryption key value object.
//!
//! A [`DerivedEncryptionKey`] is the only secret that leaves the deriver:
//! key bytes, the salt they were derived with, and the signature of the
//! chain that produced them. The password itself is never kept.

use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::aead::generate_salt;
use super::kdf::KeyBytes;
use super::signature::{KeyDeriverSignature, SignedKeyDeriver};
use super::KEY_LEN;
use crate::error::{Error, Result};
use crate::format::{CURRENT_VERSION, is_compatible};

#[derive(Clone)]
pub struct DerivedEncryptionKey {
    key: KeyBytes,
    salt: Vec<u8>,
    signature: KeyDeriverSignature,
}

impl fmt::Debug for DerivedEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedEncryptionKey")
            .field("key", &"[REDACTED]")
            .field("salt", &self.salt)
            .field("signature", &self.signature)
            .finish()
    }
}

impl PartialEq for DerivedEncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.salt == other.salt && self.signature == other.signature
    }
}

impl Eq for DerivedEncryptionKey {}

impl DerivedEncryptionKey {
    pub fn new(key: KeyBytes, salt: Vec<u8>, signature: KeyDeriverSignature) -> Self {
        Self {
            key,
            salt,
            signature,
        }
    }

    /// Re-derives a key from an existing salt. Blocks for as long as the
    /// chain takes; see [`derive_in_background`] for the async variant.
    pub fn derive(deriver: &SignedKeyDeriver, password: &[u8], salt: &[u8]) -> Result<Self> {
        let key = deriver.derive(password, salt)?;
        Ok(Self::new(key, salt.to_vec(), deriver.signature()))
    }

    /// Derives a key under a newly generated random salt.
    pub fn derive_fresh(deriver: &SignedKeyDeriver, password: &[u8]) -> Result<Self> {
        let salt = generate_salt()?;
        Self::derive(deriver, password, &salt)
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn signature(&self) -> KeyDeriverSignature {
        self.signature
    }
}

/// Runs a derivation on the blocking pool so async callers stay responsive.
///
/// Cancelling `token` resolves the future with [`Error::Cancelled`]
/// immediately; the worker notices at its next stage boundary and exits.
pub async fn derive_in_background(
    deriver: SignedKeyDeriver,
    password: Zeroizing<Vec<u8>>,
    salt: Option<Vec<u8>>,
    token: CancellationToken,
) -> Result<DerivedEncryptionKey> {
    let salt = match salt {
        Some(salt) => salt,
        None => generate_salt()?.to_vec(),
    };
    let signature = deriver.signature();
    let worker_token = token.child_token();

    debug!(%signature, "starting background key derivation");
    let worker = tokio::task::spawn_blocking(move || -> Result<DerivedEncryptionKey> {
        let key = deriver.derive_cancellable(&password, &salt, &worker_token)?;
        Ok(DerivedEncryptionKey::new(key, salt, deriver.signature()))
    });

    tokio::select! {
        _ = token.cancelled() => {
            info!(%signature, "background key derivation cancelled");
            Err(Error::Cancelled)
        }
        joined = worker => joined.map_err(|e| {
            Error::KeyDerivationFailed(format!("derivation worker stopped: {e}"))
        })?,
    }
}

/// Portable record of a device's backup key, so a later export can reuse
/// it without asking for (or re-deriving from) the password.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupPasswordExport {
    #[serde(rename = "VERSION")]
    pub version: Version,
    #[serde(
        rename = "KEY",
        serialize_with = "b64::serialize",
        deserialize_with = "b64::deserialize_secret"
    )]
    pub key: Zeroizing<Vec<u8>>,
    #[serde(rename = "SALT", with = "b64")]
    pub salt: Vec<u8>,
    #[serde(rename = "KEY_DERIVER")]
    pub key_deriver: String,
}

impl fmt::Debug for BackupPasswordExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupPasswordExport")
            .field("version", &self.version.to_string())
            .field("key", &"[REDACTED]")
            .field("salt", &self.salt)
            .field("key_deriver", &self.key_deriver)
            .finish()
    }
}

impl BackupPasswordExport {
    pub fn from_key(key: &DerivedEncryptionKey) -> Self {
        Self {
            version: CURRENT_VERSION,
            key: Zeroizing::new(key.key().to_vec()),
            salt: key.salt().to_vec(),
            key_deriver: key.signature().to_string(),
        }
    }

    /// Validates the record and turns it back into a usable key.
    pub fn into_key(self) -> Result<DerivedEncryptionKey> {
        if !is_compatible(&self.version, &CURRENT_VERSION) {
            return Err(Error::IncompatibleVersion {
                found: self.version,
                supported: CURRENT_VERSION.major,
            });
        }

        let signature: KeyDeriverSignature = self.key_deriver.parse()?;

        let bytes: [u8; KEY_LEN] = self.key.as_slice().try_into().map_err(|_| {
            Error::MalformedContainer(format!(
                "backup password key must be {KEY_LEN} bytes, found {}",
                self.key.len()
            ))
        })?;

        Ok(DerivedEncryptionKey::new(
            Zeroizing::new(bytes),
            self.salt,
            signature,
        ))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::EncodingFailed(e.to_string()))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|e| Error::MalformedContainer(format!("invalid backup password record: {e}")))
    }
}

mod b64 {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};
    use zeroize::Zeroizing;

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }

    pub fn deserialize_secret<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Zeroizing<Vec<u8>>, D::Error> {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        STANDARD
            .decode(encoded.as_bytes())
            .map(Zeroizing::new)
            .map_err(serde::de::Error::custom)
    }
}
