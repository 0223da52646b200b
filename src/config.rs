//! Runtime configuration.

use crate::crypto::KeyDeriverSignature;

/// Which family of key derivation chains new artifacts are sealed with.
///
/// Only affects what gets written. Existing files always carry their own
/// signature and are opened with whatever chain it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum KdfProfile {
    /// Cheap parameters for development and tests.
    Fast,
    /// Production parameters.
    Secure,
}

impl Default for KdfProfile {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            KdfProfile::Fast
        } else {
            KdfProfile::Secure
        }
    }
}

impl KdfProfile {
    pub fn backup_signature(self) -> KeyDeriverSignature {
        match self {
            KdfProfile::Fast => KeyDeriverSignature::BackupFastV1,
            KdfProfile::Secure => KeyDeriverSignature::BackupSecureV1,
        }
    }

    /// Signature for the device-local vault file.
    pub fn local_signature(self) -> KeyDeriverSignature {
        match self {
            KdfProfile::Fast => KeyDeriverSignature::ItemFastV1,
            KdfProfile::Secure => KeyDeriverSignature::ItemSecureV1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub kdf_profile: KdfProfile,
}

impl Config {
    pub fn with_profile(kdf_profile: KdfProfile) -> Self {
        Self { kdf_profile }
    }
}
