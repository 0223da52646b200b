//! Vault items and tags as the rest of the application sees them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

#[derive(Debug, Clone, PartialEq)]
pub struct VaultItem {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    /// Sole input to merge conflict resolution.
    pub updated: DateTime<Utc>,
    pub metadata: ItemMetadata,
    pub payload: ItemPayload,
}

impl VaultItem {
    /// A new item stamped with the current time and default metadata.
    pub fn new(payload: ItemPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created: now,
            updated: now,
            metadata: ItemMetadata::default(),
            payload,
        }
    }

    pub fn title(&self) -> &str {
        match &self.payload {
            ItemPayload::Otp(code) if code.issuer.is_empty() => &code.account_name,
            ItemPayload::Otp(code) => &code.issuer,
            ItemPayload::Note(note) => &note.title,
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.payload {
            ItemPayload::Otp(OtpCode {
                kind: OtpKind::Totp { .. },
                ..
            }) => "totp",
            ItemPayload::Otp(OtpCode {
                kind: OtpKind::Hotp { .. },
                ..
            }) => "hotp",
            ItemPayload::Note(_) => "note",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemMetadata {
    pub visibility: Visibility,
    pub searchable_level: SearchableLevel,
    pub search_passphrase: Option<String>,
    pub lock_state: LockState,
    pub color: Option<ItemColor>,
    pub user_description: String,
    pub tags: BTreeSet<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Always,
    OnlySearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchableLevel {
    None,
    #[default]
    Full,
    OnlyTitle,
    OnlyPassphrase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    NotLocked,
    LockedWithNativeSecurity,
}

/// sRGB components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemColor {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemPayload {
    Otp(OtpCode),
    Note(SecureNote),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpCode {
    pub kind: OtpKind,
    pub secret: OtpSecret,
    pub algorithm: OtpAlgorithm,
    pub digits: u16,
    pub issuer: String,
    pub account_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpKind {
    Totp { period: u64 },
    Hotp { counter: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpSecret {
    pub format: SecretFormat,
    pub data: Zeroizing<Vec<u8>>,
}

/// How the secret was originally presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretFormat {
    Base32,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureNote {
    pub title: String,
    pub contents: String,
    pub format: NoteFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteFormat {
    #[default]
    Plain,
    Markdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VaultItemTag {
    pub id: Uuid,
    pub name: String,
    pub color: Option<ItemColor>,
    pub icon_name: Option<String>,
}

impl VaultItemTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color: None,
            icon_name: None,
        }
    }
}

/// Everything that goes into one backup. Built fresh per export and
/// dropped once an import has been applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VaultApplicationPayload {
    pub user_description: String,
    pub items: Vec<VaultItem>,
    pub tags: Vec<VaultItemTag>,
}
