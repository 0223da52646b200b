//! Error types for the backup pipeline and the vault store.

use semver::Version;
use thiserror::Error;
use uuid::Uuid;

/// Convenience alias used across the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by key derivation, export and import.
#[derive(Debug, Error)]
pub enum Error {
    /// A KDF stage rejected its parameters or inputs.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// The signature is not present in the key deriver registry.
    ///
    /// Usually a backup written by a newer release opened by an older one.
    #[error("unknown key deriver signature '{0}'")]
    UnknownKeyDeriverSignature(String),

    #[error("incompatible version {found} (this build reads {supported}.x.x)")]
    IncompatibleVersion { found: Version, supported: u64 },

    /// Wrong password or tampered ciphertext. The two are indistinguishable.
    #[error("invalid password or corrupted data")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("OS random generator unavailable")]
    RandomUnavailable,

    #[error("key derivation was cancelled")]
    Cancelled,

    #[error("malformed backup container: {0}")]
    MalformedContainer(String),

    #[error("failed to decode backup payload: {0}")]
    DecodingFailed(#[from] DecodingError),

    #[error("failed to encode backup payload: {0}")]
    EncodingFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The plaintext decrypted fine but is not a well-formed payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodingError {
    #[error("plaintext is not a valid payload document: {0}")]
    Payload(String),

    #[error("item #{index}: {source}")]
    Item {
        index: usize,
        #[source]
        source: ItemDecodeError,
    },

    #[error("tag #{index}: {source}")]
    Tag {
        index: usize,
        #[source]
        source: TagDecodeError,
    },
}

/// Reasons a single wire item cannot be turned back into a vault item.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemDecodeError {
    #[error("invalid item id '{0}'")]
    InvalidId(String),
    #[error("unrecognised item type '{0}'")]
    InvalidItemType(String),
    #[error("{item_type} item is missing required field '{field}'")]
    MissingField {
        item_type: &'static str,
        field: &'static str,
    },
    #[error("unrecognised OTP type '{0}'")]
    InvalidOtpType(String),
    #[error("unrecognised OTP algorithm '{0}'")]
    InvalidAlgorithm(String),
    #[error("unrecognised OTP secret format '{0}'")]
    InvalidSecretFormat(String),
    #[error("OTP secret data is not valid base64")]
    InvalidSecretData,
    #[error("unrecognised visibility '{0}'")]
    InvalidVisibility(String),
    #[error("unrecognised searchable level '{0}'")]
    InvalidSearchableLevel(String),
    #[error("unrecognised lock state '{0}'")]
    InvalidLockState(String),
    #[error("unrecognised note format '{0}'")]
    InvalidNoteFormat(String),
    #[error("invalid tag reference '{0}'")]
    InvalidTagReference(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagDecodeError {
    #[error("invalid tag id '{0}'")]
    InvalidId(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("item '{0}' already exists")]
    ItemAlreadyExists(Uuid),
    #[error("item '{0}' not found")]
    ItemNotFound(Uuid),
    #[error("tag '{0}' not found")]
    TagNotFound(Uuid),
    #[error("item '{item}' references unknown tag '{tag}'")]
    UnknownTag { item: Uuid, tag: Uuid },
}

impl Error {
    /// Whether retrying with a different password could succeed.
    pub fn is_password_related(&self) -> bool {
        matches!(self, Error::DecryptionFailed)
    }
}
