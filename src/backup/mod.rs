//! Export and import of encrypted vault backups.
//!
//! Export: store snapshot -> wire payload -> JSON -> XChaCha20-Poly1305 under
//! a chained-KDF key -> [`EncryptedVault`](crate::format::EncryptedVault).
//! Import runs the same steps in reverse and hands the decoded payload to
//! [`ImportResolver`].

pub mod export;
pub mod import;
pub mod resolver;

pub use export::BackupExporter;
pub use import::{BackupImporter, DecryptionKeySource};
pub use resolver::{ImportPolicy, ImportResolver, ImportSummary};
