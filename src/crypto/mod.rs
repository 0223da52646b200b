//! Cryptographic primitives for the backup pipeline.
//!
//! Provides key derivation (single primitives, chains and the signature
//! registry), the derived key value object, and authenticated encryption.

pub mod aead;
pub mod kdf;
pub mod key;
pub mod signature;

pub use aead::{decrypt, encrypt, generate_salt};
pub use kdf::{
    Argon2id, ChainedKeyDeriver, HashAlgorithm, Hkdf, KeyBytes, KeyDerivation, Pbkdf2, Scrypt,
};
pub use key::{BackupPasswordExport, DerivedEncryptionKey, derive_in_background};
pub use signature::{KeyDeriverRegistry, KeyDeriverSignature, SignedKeyDeriver};

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of every derived key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
