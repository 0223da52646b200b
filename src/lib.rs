pub mod backup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod format;
pub mod model;
mod storage;
pub mod store;
pub mod wire;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use tokio_util::sync::CancellationToken;
use tracing::info;
use zeroize::Zeroizing;

pub use crate::backup::{
    BackupExporter, BackupImporter, DecryptionKeySource, ImportPolicy, ImportResolver,
    ImportSummary,
};
pub use crate::config::{Config, KdfProfile};
pub use crate::crypto::{
    BackupPasswordExport, DerivedEncryptionKey, KeyDeriverRegistry, KeyDeriverSignature,
};
pub use crate::format::EncryptedVault;
pub use crate::storage::Storage;
use crate::store::{ImportBatch, Store, VaultStore};

/// The device-local vault: a [`Store`] persisted as an encrypted container.
///
/// The file uses the same container and pipeline as backups, sealed with
/// the local (`item-*`) chain. The key is derived once on open and reused
/// for every save.
pub struct Vault {
    store: Store,
    storage: Storage,
    key: DerivedEncryptionKey,
    registry: Arc<KeyDeriverRegistry>,
    config: Config,
}

impl Vault {
    /// Creates a new vault, deriving its key on the blocking pool so
    /// `token` can abort a slow local chain.
    pub async fn init(
        password: Zeroizing<Vec<u8>>,
        storage: Storage,
        config: Config,
        token: CancellationToken,
    ) -> Result<Self> {
        if storage.exists() {
            bail!("vault already exists at {}", storage.path().display());
        }

        let registry = Arc::new(KeyDeriverRegistry::standard());
        let deriver = registry.get(config.kdf_profile.local_signature())?;
        let key = crypto::derive_in_background(deriver, password, None, token)
            .await
            .context("failed to derive vault key")?;
        Self::create(storage, config, registry, key)
    }

    pub fn init_with_storage(password: &[u8], storage: Storage, config: Config) -> Result<Self> {
        Self::init_with_registry(
            password,
            storage,
            config,
            Arc::new(KeyDeriverRegistry::standard()),
        )
    }

    pub fn init_with_registry(
        password: &[u8],
        storage: Storage,
        config: Config,
        registry: Arc<KeyDeriverRegistry>,
    ) -> Result<Self> {
        if storage.exists() {
            bail!("vault already exists at {}", storage.path().display());
        }

        let deriver = registry.get(config.kdf_profile.local_signature())?;
        let key = DerivedEncryptionKey::derive_fresh(&deriver, password)
            .context("failed to derive vault key")?;
        Self::create(storage, config, registry, key)
    }

    fn create(
        storage: Storage,
        config: Config,
        registry: Arc<KeyDeriverRegistry>,
        key: DerivedEncryptionKey,
    ) -> Result<Self> {
        let vault = Self {
            store: Store::new(),
            storage,
            key,
            registry,
            config,
        };
        vault.save()?;

        info!(signature = %vault.key.signature(), "vault initialized");
        Ok(vault)
    }

    /// Opens an existing vault with the key derived on the blocking pool.
    /// Cancelling `token` returns [`Error::Cancelled`](crate::error::Error::Cancelled).
    pub async fn open(
        password: Zeroizing<Vec<u8>>,
        storage: Storage,
        config: Config,
        token: CancellationToken,
    ) -> Result<Self> {
        let registry = Arc::new(KeyDeriverRegistry::standard());
        let container = Self::read_container(&storage)?;

        BackupImporter::check_version(&container)?;
        let deriver = registry.lookup(container.signature())?;
        let key = crypto::derive_in_background(
            deriver,
            password,
            Some(container.salt().to_vec()),
            token,
        )
        .await
        .context("unable to derive vault key")?;

        Self::unseal(storage, config, registry, &container, key)
    }

    pub fn open_with_storage(password: &[u8], storage: Storage, config: Config) -> Result<Self> {
        Self::open_with_registry(
            password,
            storage,
            config,
            Arc::new(KeyDeriverRegistry::standard()),
        )
    }

    pub fn open_with_registry(
        password: &[u8],
        storage: Storage,
        config: Config,
        registry: Arc<KeyDeriverRegistry>,
    ) -> Result<Self> {
        let container = Self::read_container(&storage)?;
        let key = BackupImporter::new(&registry)
            .derive_key_for(&container, password)
            .context("unable to derive vault key")?;

        Self::unseal(storage, config, registry, &container, key)
    }

    fn read_container(storage: &Storage) -> Result<EncryptedVault> {
        if !storage.exists() {
            bail!("no vault at {}", storage.path().display());
        }
        format::parse(&storage.load()?).context("vault file is damaged")
    }

    fn unseal(
        storage: Storage,
        config: Config,
        registry: Arc<KeyDeriverRegistry>,
        container: &EncryptedVault,
        key: DerivedEncryptionKey,
    ) -> Result<Self> {
        let payload = BackupImporter::new(&registry)
            .decrypt_with_key(container, &key)
            .context("unable to open vault; wrong password or corrupted data")?;

        let mut store = Store::new();
        store.commit(ImportBatch {
            clear_existing: true,
            items: payload.items,
            tags: payload.tags,
        })?;

        Ok(Self {
            store,
            storage,
            key,
            registry,
            config,
        })
    }

    /// Re-seals the whole store under the existing key and a fresh IV.
    pub fn save(&self) -> Result<()> {
        let payload = self.store.export_payload("")?;
        let container = BackupExporter::new(&self.registry, self.key.signature())
            .export_with_key(&payload, &self.key)?;
        self.storage.save(&format::serialize(&container)?)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn registry(&self) -> &KeyDeriverRegistry {
        &self.registry
    }

    pub fn config(&self) -> Config {
        self.config
    }

    fn exporter(&self) -> BackupExporter<'_> {
        BackupExporter::new(&self.registry, self.config.kdf_profile.backup_signature())
    }

    /// Derives a backup key under a fresh salt, for saving as a
    /// [`BackupPasswordExport`].
    pub async fn derive_backup_key(
        &self,
        password: Zeroizing<Vec<u8>>,
        token: CancellationToken,
    ) -> Result<DerivedEncryptionKey> {
        let deriver = self
            .registry
            .get(self.config.kdf_profile.backup_signature())?;
        Ok(crypto::derive_in_background(deriver, password, None, token).await?)
    }

    pub async fn export_backup(
        &self,
        password: Zeroizing<Vec<u8>>,
        description: &str,
        token: CancellationToken,
    ) -> Result<EncryptedVault> {
        let payload = self.store.export_payload(description)?;
        Ok(self
            .exporter()
            .export_in_background(&payload, password, token)
            .await?)
    }

    pub fn export_backup_with_key(
        &self,
        key: &DerivedEncryptionKey,
        description: &str,
    ) -> Result<EncryptedVault> {
        let payload = self.store.export_payload(description)?;
        Ok(self.exporter().export_with_key(&payload, key)?)
    }

    /// Decrypts `backup` and applies it to the in-memory store. Call
    /// [`save`](Self::save) to persist the result.
    pub async fn import_backup(
        &mut self,
        backup: &EncryptedVault,
        password: Zeroizing<Vec<u8>>,
        policy: ImportPolicy,
        token: CancellationToken,
    ) -> Result<ImportSummary> {
        let (payload, _) = BackupImporter::new(&self.registry)
            .import_in_background(backup, password, token)
            .await?;
        Ok(ImportResolver::apply(&mut self.store, payload, policy)?)
    }

    pub fn import_backup_with_key(
        &mut self,
        backup: &EncryptedVault,
        key: &DerivedEncryptionKey,
        policy: ImportPolicy,
    ) -> Result<ImportSummary> {
        let payload =
            BackupImporter::new(&self.registry).import(backup, DecryptionKeySource::Key(key))?;
        Ok(ImportResolver::apply(&mut self.store, payload, policy)?)
    }
}

pub fn default_storage() -> Result<Storage> {
    let project_dirs = ProjectDirs::from("", "", "vaultkeep")
        .context("could not determine platform directories")?;

    Ok(Storage::new(project_dirs.data_dir().join("vault.vkbk")))
}
