//! Flat wire record for a vault item.
//!
//! Discriminators travel as strings and every type-specific field is
//! optional, so a record written by another release can be checked field by
//! field instead of failing wholesale inside serde.

use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::WireColor;
use crate::error::ItemDecodeError;
use crate::model::{
    ItemMetadata, ItemPayload, LockState, NoteFormat, OtpAlgorithm, OtpCode, OtpKind, OtpSecret,
    SearchableLevel, SecretFormat, SecureNote, VaultItem, Visibility,
};

const OTP_CODE: &str = "otpCode";
const SECURE_NOTE: &str = "secureNote";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireItem {
    pub id: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub item_type: String,
    pub visibility: String,
    pub searchable_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_passphrase: Option<String>,
    pub lock_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<WireColor>,
    #[serde(default)]
    pub user_description: String,
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_period: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_counter: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_secret_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_secret_data: Option<Zeroizing<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_digits: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_contents: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_format: Option<String>,
}

pub fn encode_item(item: &VaultItem) -> WireItem {
    let meta = &item.metadata;
    let mut wire = WireItem {
        id: item.id.to_string(),
        created: item.created,
        updated: item.updated,
        item_type: String::new(),
        visibility: visibility_code(meta.visibility).to_string(),
        searchable_level: searchable_code(meta.searchable_level).to_string(),
        search_passphrase: meta.search_passphrase.clone(),
        lock_state: lock_code(meta.lock_state).to_string(),
        color: meta.color.map(WireColor::from),
        user_description: meta.user_description.clone(),
        tags: meta.tags.iter().map(Uuid::to_string).collect(),
        otp_type: None,
        otp_period: None,
        otp_counter: None,
        otp_secret_format: None,
        otp_secret_data: None,
        otp_algorithm: None,
        otp_digits: None,
        otp_issuer: None,
        otp_account_name: None,
        note_title: None,
        note_contents: None,
        note_format: None,
    };

    match &item.payload {
        ItemPayload::Otp(code) => {
            wire.item_type = OTP_CODE.to_string();
            match code.kind {
                OtpKind::Totp { period } => {
                    wire.otp_type = Some("totp".to_string());
                    wire.otp_period = Some(period);
                }
                OtpKind::Hotp { counter } => {
                    wire.otp_type = Some("hotp".to_string());
                    wire.otp_counter = Some(counter);
                }
            }
            wire.otp_secret_format = Some(secret_format_code(code.secret.format).to_string());
            wire.otp_secret_data =
                Some(Zeroizing::new(STANDARD.encode(code.secret.data.as_slice())));
            wire.otp_algorithm = Some(algorithm_code(code.algorithm).to_string());
            wire.otp_digits = Some(code.digits);
            wire.otp_issuer = Some(code.issuer.clone());
            wire.otp_account_name = Some(code.account_name.clone());
        }
        ItemPayload::Note(note) => {
            wire.item_type = SECURE_NOTE.to_string();
            wire.note_title = Some(note.title.clone());
            wire.note_contents = Some(note.contents.clone());
            wire.note_format = Some(note_format_code(note.format).to_string());
        }
    }

    wire
}

pub fn decode_item(wire: WireItem) -> Result<VaultItem, ItemDecodeError> {
    let id = Uuid::parse_str(&wire.id).map_err(|_| ItemDecodeError::InvalidId(wire.id.clone()))?;

    let tags: BTreeSet<Uuid> = wire
        .tags
        .iter()
        .map(|tag| {
            Uuid::parse_str(tag).map_err(|_| ItemDecodeError::InvalidTagReference(tag.clone()))
        })
        .collect::<Result<_, _>>()?;

    let metadata = ItemMetadata {
        visibility: parse_visibility(&wire.visibility)?,
        searchable_level: parse_searchable(&wire.searchable_level)?,
        search_passphrase: wire.search_passphrase.clone(),
        lock_state: parse_lock(&wire.lock_state)?,
        color: wire.color.map(Into::into),
        user_description: wire.user_description.clone(),
        tags,
    };

    let payload = match wire.item_type.as_str() {
        OTP_CODE => ItemPayload::Otp(decode_otp(&wire)?),
        SECURE_NOTE => ItemPayload::Note(decode_note(&wire)?),
        other => return Err(ItemDecodeError::InvalidItemType(other.to_string())),
    };

    Ok(VaultItem {
        id,
        created: wire.created,
        updated: wire.updated,
        metadata,
        payload,
    })
}

fn require<T>(value: Option<T>, item_type: &'static str, field: &'static str) -> Result<T, ItemDecodeError> {
    value.ok_or(ItemDecodeError::MissingField { item_type, field })
}

fn decode_otp(wire: &WireItem) -> Result<OtpCode, ItemDecodeError> {
    let otp_type = require(wire.otp_type.as_deref(), OTP_CODE, "otpType")?;
    let kind = match otp_type {
        "totp" => OtpKind::Totp {
            period: require(wire.otp_period, "totp", "otpPeriod")?,
        },
        "hotp" => OtpKind::Hotp {
            counter: require(wire.otp_counter, "hotp", "otpCounter")?,
        },
        other => return Err(ItemDecodeError::InvalidOtpType(other.to_string())),
    };

    let format = parse_secret_format(require(
        wire.otp_secret_format.as_deref(),
        OTP_CODE,
        "otpSecretFormat",
    )?)?;
    let encoded = require(wire.otp_secret_data.as_ref(), OTP_CODE, "otpSecretData")?;
    let data = STANDARD
        .decode(encoded.as_bytes())
        .map(Zeroizing::new)
        .map_err(|_| ItemDecodeError::InvalidSecretData)?;

    let algorithm = parse_algorithm(require(
        wire.otp_algorithm.as_deref(),
        OTP_CODE,
        "otpAlgorithm",
    )?)?;

    Ok(OtpCode {
        kind,
        secret: OtpSecret { format, data },
        algorithm,
        digits: require(wire.otp_digits, OTP_CODE, "otpDigits")?,
        issuer: wire.otp_issuer.clone().unwrap_or_default(),
        account_name: wire.otp_account_name.clone().unwrap_or_default(),
    })
}

fn decode_note(wire: &WireItem) -> Result<SecureNote, ItemDecodeError> {
    let contents = require(wire.note_contents.clone(), SECURE_NOTE, "noteContents")?;
    let format = match wire.note_format.as_deref() {
        Some(code) => parse_note_format(code)?,
        None => NoteFormat::default(),
    };

    Ok(SecureNote {
        title: wire.note_title.clone().unwrap_or_default(),
        contents,
        format,
    })
}

fn visibility_code(value: Visibility) -> &'static str {
    match value {
        Visibility::Always => "always",
        Visibility::OnlySearch => "onlySearch",
    }
}

fn parse_visibility(code: &str) -> Result<Visibility, ItemDecodeError> {
    match code {
        "always" => Ok(Visibility::Always),
        "onlySearch" => Ok(Visibility::OnlySearch),
        other => Err(ItemDecodeError::InvalidVisibility(other.to_string())),
    }
}

fn searchable_code(value: SearchableLevel) -> &'static str {
    match value {
        SearchableLevel::None => "none",
        SearchableLevel::Full => "full",
        SearchableLevel::OnlyTitle => "onlyTitle",
        SearchableLevel::OnlyPassphrase => "onlyPassphrase",
    }
}

fn parse_searchable(code: &str) -> Result<SearchableLevel, ItemDecodeError> {
    match code {
        "none" => Ok(SearchableLevel::None),
        "full" => Ok(SearchableLevel::Full),
        "onlyTitle" => Ok(SearchableLevel::OnlyTitle),
        "onlyPassphrase" => Ok(SearchableLevel::OnlyPassphrase),
        other => Err(ItemDecodeError::InvalidSearchableLevel(other.to_string())),
    }
}

fn lock_code(value: LockState) -> &'static str {
    match value {
        LockState::NotLocked => "notLocked",
        LockState::LockedWithNativeSecurity => "lockedWithNativeSecurity",
    }
}

fn parse_lock(code: &str) -> Result<LockState, ItemDecodeError> {
    match code {
        "notLocked" => Ok(LockState::NotLocked),
        "lockedWithNativeSecurity" => Ok(LockState::LockedWithNativeSecurity),
        other => Err(ItemDecodeError::InvalidLockState(other.to_string())),
    }
}

fn algorithm_code(value: OtpAlgorithm) -> &'static str {
    match value {
        OtpAlgorithm::Sha1 => "SHA1",
        OtpAlgorithm::Sha256 => "SHA256",
        OtpAlgorithm::Sha512 => "SHA512",
    }
}

fn parse_algorithm(code: &str) -> Result<OtpAlgorithm, ItemDecodeError> {
    match code {
        "SHA1" => Ok(OtpAlgorithm::Sha1),
        "SHA256" => Ok(OtpAlgorithm::Sha256),
        "SHA512" => Ok(OtpAlgorithm::Sha512),
        other => Err(ItemDecodeError::InvalidAlgorithm(other.to_string())),
    }
}

fn secret_format_code(value: SecretFormat) -> &'static str {
    match value {
        SecretFormat::Base32 => "base32",
        SecretFormat::Base64 => "base64",
    }
}

fn parse_secret_format(code: &str) -> Result<SecretFormat, ItemDecodeError> {
    match code {
        "base32" => Ok(SecretFormat::Base32),
        "base64" => Ok(SecretFormat::Base64),
        other => Err(ItemDecodeError::InvalidSecretFormat(other.to_string())),
    }
}

fn note_format_code(value: NoteFormat) -> &'static str {
    match value {
        NoteFormat::Plain => "plain",
        NoteFormat::Markdown => "markdown",
    }
}

fn parse_note_format(code: &str) -> Result<NoteFormat, ItemDecodeError> {
    match code {
        "plain" => Ok(NoteFormat::Plain),
        "markdown" => Ok(NoteFormat::Markdown),
        other => Err(ItemDecodeError::InvalidNoteFormat(other.to_string())),
    }
}
