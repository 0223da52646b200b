use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use zeroize::Zeroizing;

use crate::crypto::{self, DerivedEncryptionKey, KeyDeriverRegistry, KeyDeriverSignature};
use crate::error::Result;
use crate::format::EncryptedVault;
use crate::model::VaultApplicationPayload;
use crate::wire;

/// Seals a payload into an [`EncryptedVault`]. Read-only with respect to
/// the store: it only ever sees an already assembled payload.
#[derive(Debug, Clone, Copy)]
pub struct BackupExporter<'a> {
    registry: &'a KeyDeriverRegistry,
    signature: KeyDeriverSignature,
}

impl<'a> BackupExporter<'a> {
    pub fn new(registry: &'a KeyDeriverRegistry, signature: KeyDeriverSignature) -> Self {
        Self {
            registry,
            signature,
        }
    }

    pub fn signature(&self) -> KeyDeriverSignature {
        self.signature
    }

    /// Derives a key for a new backup under a fresh random salt.
    pub fn derive_key(&self, password: &[u8]) -> Result<DerivedEncryptionKey> {
        let deriver = self.registry.get(self.signature)?;
        DerivedEncryptionKey::derive_fresh(&deriver, password)
    }

    pub fn export(
        &self,
        payload: &VaultApplicationPayload,
        password: &[u8],
    ) -> Result<EncryptedVault> {
        let key = self.derive_key(password)?;
        self.export_with_key(payload, &key)
    }

    /// Seals with a key the caller already holds, e.g. a saved backup
    /// password. Only the IV is fresh.
    pub fn export_with_key(
        &self,
        payload: &VaultApplicationPayload,
        key: &DerivedEncryptionKey,
    ) -> Result<EncryptedVault> {
        let plaintext = wire::encode_payload(payload)?;
        let (ciphertext, iv) = crypto::encrypt(key.key(), &plaintext)?;

        info!(
            items = payload.items.len(),
            tags = payload.tags.len(),
            signature = %key.signature(),
            "vault payload sealed"
        );

        Ok(EncryptedVault::new(
            Utc::now(),
            key.signature().to_string(),
            key.salt().to_vec(),
            iv.to_vec(),
            ciphertext,
        ))
    }

    /// [`export`](Self::export) with the derivation moved off the calling
    /// task and cancellable through `token`.
    pub async fn export_in_background(
        &self,
        payload: &VaultApplicationPayload,
        password: Zeroizing<Vec<u8>>,
        token: CancellationToken,
    ) -> Result<EncryptedVault> {
        let deriver = self.registry.get(self.signature)?;
        let key = crypto::derive_in_background(deriver, password, None, token).await?;
        self.export_with_key(payload, &key)
    }
}
