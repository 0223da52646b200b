use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{self, DerivedEncryptionKey, KeyDeriverRegistry, KeyDeriverSignature};
use crate::error::{Error, Result};
use crate::format::{CURRENT_VERSION, EncryptedVault, is_compatible};
use crate::model::VaultApplicationPayload;
use crate::wire;

/// Where the decryption key comes from.
#[derive(Debug, Clone, Copy)]
pub enum DecryptionKeySource<'k> {
    /// Re-derive from the password using the container's signature and salt.
    Password(&'k [u8]),
    /// A key derived earlier, skipping the expensive derivation.
    Key(&'k DerivedEncryptionKey),
}

/// Opens an [`EncryptedVault`] back into a payload.
#[derive(Debug, Clone, Copy)]
pub struct BackupImporter<'a> {
    registry: &'a KeyDeriverRegistry,
}

impl<'a> BackupImporter<'a> {
    pub fn new(registry: &'a KeyDeriverRegistry) -> Self {
        Self { registry }
    }

    /// Cheap major-version gate, run before any key derivation.
    pub fn check_version(vault: &EncryptedVault) -> Result<()> {
        if is_compatible(vault.version(), &CURRENT_VERSION) {
            Ok(())
        } else {
            Err(Error::IncompatibleVersion {
                found: vault.version().clone(),
                supported: CURRENT_VERSION.major,
            })
        }
    }

    /// Re-derives the key `vault` was sealed with.
    pub fn derive_key_for(
        &self,
        vault: &EncryptedVault,
        password: &[u8],
    ) -> Result<DerivedEncryptionKey> {
        Self::check_version(vault)?;
        let deriver = self.registry.lookup(vault.signature())?;
        DerivedEncryptionKey::derive(&deriver, password, vault.salt())
    }

    pub fn import(
        &self,
        vault: &EncryptedVault,
        source: DecryptionKeySource<'_>,
    ) -> Result<VaultApplicationPayload> {
        Self::check_version(vault)?;

        match source {
            DecryptionKeySource::Password(password) => {
                let key = self.derive_key_for(vault, password)?;
                self.decrypt_with_key(vault, &key)
            }
            DecryptionKeySource::Key(key) => self.decrypt_with_key(vault, key),
        }
    }

    /// Decrypts and decodes with an already derived key.
    pub fn decrypt_with_key(
        &self,
        vault: &EncryptedVault,
        key: &DerivedEncryptionKey,
    ) -> Result<VaultApplicationPayload> {
        Self::check_version(vault)?;

        let signature: KeyDeriverSignature = vault.signature().parse()?;
        if !self.registry.contains(signature) {
            return Err(Error::UnknownKeyDeriverSignature(signature.to_string()));
        }
        if key.signature() != signature || key.salt() != vault.salt() {
            warn!(
                backup = %signature,
                key = %key.signature(),
                "supplied key was not derived for this backup"
            );
            return Err(Error::DecryptionFailed);
        }

        let plaintext = crypto::decrypt(key.key(), vault.iv(), vault.ciphertext())?;
        debug!(bytes = plaintext.len(), "backup decrypted");

        let payload = wire::decode_payload(&plaintext)?;
        info!(
            items = payload.items.len(),
            tags = payload.tags.len(),
            created = %vault.created(),
            "backup decoded"
        );
        Ok(payload)
    }

    /// Password import with the derivation moved off the calling task and
    /// cancellable through `token`. Returns the key too so callers can keep
    /// it for later exports.
    pub async fn import_in_background(
        &self,
        vault: &EncryptedVault,
        password: Zeroizing<Vec<u8>>,
        token: CancellationToken,
    ) -> Result<(VaultApplicationPayload, DerivedEncryptionKey)> {
        Self::check_version(vault)?;
        let deriver = self.registry.lookup(vault.signature())?;
        let key =
            crypto::derive_in_background(deriver, password, Some(vault.salt().to_vec()), token)
                .await?;
        let payload = self.decrypt_with_key(vault, &key)?;
        Ok((payload, key))
    }
}
