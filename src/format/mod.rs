//! Encrypted vault container format.
//!
//! Provides version-aware parsing and serialization of the container that
//! carries an encrypted vault payload between devices.

use chrono::{DateTime, Utc};
use semver::Version;

use crate::error::{Error, Result};

pub mod v1;

/// Magic bytes identifying a vaultkeep backup container ("VKBK").
pub const MAGIC: &[u8; 4] = b"VKBK";
/// Length of magic bytes.
pub const MAGIC_LEN: usize = 4;
/// Length of the semantic version field (three little-endian u16).
pub const VER_LEN: usize = 6;
/// Version written by this build.
pub const CURRENT_VERSION: Version = Version::new(1, 0, 0);

/// Two versions can be read by each other iff their major components match.
pub fn is_compatible(found: &Version, supported: &Version) -> bool {
    found.major == supported.major
}

/// An encrypted vault as it travels: ciphertext plus everything needed to
/// re-derive its key and check it can be read. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedVault {
    version: Version,
    created: DateTime<Utc>,
    signature: String,
    salt: Vec<u8>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl EncryptedVault {
    /// Creates a container stamped with the current format version.
    pub fn new(
        created: DateTime<Utc>,
        signature: String,
        salt: Vec<u8>,
        iv: Vec<u8>,
        ciphertext: Vec<u8>,
    ) -> Self {
        Self::with_version(CURRENT_VERSION, created, signature, salt, iv, ciphertext)
    }

    pub fn with_version(
        version: Version,
        created: DateTime<Utc>,
        signature: String,
        salt: Vec<u8>,
        iv: Vec<u8>,
        ciphertext: Vec<u8>,
    ) -> Self {
        Self {
            version,
            created: truncate_to_millis(created),
            signature,
            salt,
            iv,
            ciphertext,
        }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Signature of the key deriver, kept as the raw string so containers
    /// from newer releases can still be inspected.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// Timestamps are stored with millisecond precision.
fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Parses a container and dispatches on its major version.
///
/// # Errors
///
/// Returns an error if:
/// - The data is too short or the magic bytes are wrong
/// - The major version is not one this build reads
/// - The version-specific layout is malformed
pub fn parse(data: &[u8]) -> Result<EncryptedVault> {
    if data.len() < MAGIC_LEN + VER_LEN {
        return Err(Error::MalformedContainer("file too short".to_string()));
    }

    if &data[..MAGIC_LEN] != MAGIC {
        return Err(Error::MalformedContainer("invalid magic".to_string()));
    }

    let version = read_version(&data[MAGIC_LEN..MAGIC_LEN + VER_LEN]);

    match version.major {
        1 => v1::parse(data, version),
        _ => Err(Error::IncompatibleVersion {
            found: version,
            supported: CURRENT_VERSION.major,
        }),
    }
}

/// Serializes a container to bytes.
///
/// # Errors
///
/// Returns an error if the version is unsupported or a field does not fit
/// the layout.
pub fn serialize(vault: &EncryptedVault) -> Result<Vec<u8>> {
    match vault.version().major {
        1 => v1::serialize(vault),
        _ => Err(Error::IncompatibleVersion {
            found: vault.version().clone(),
            supported: CURRENT_VERSION.major,
        }),
    }
}

fn read_version(bytes: &[u8]) -> Version {
    let field = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]) as u64;
    Version::new(field(0), field(2), field(4))
}
