//! Wire representation of the vault payload.
//!
//! This is the plaintext that gets encrypted into a backup: a JSON document
//! of flat item and tag records.

pub mod item;
pub mod tag;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub use item::{WireItem, decode_item, encode_item};
pub use tag::{WireTag, decode_tag, encode_tag};

use crate::error::{DecodingError, Error, Result};
use crate::model::{ItemColor, VaultApplicationPayload};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl From<ItemColor> for WireColor {
    fn from(color: ItemColor) -> Self {
        Self {
            r: color.red,
            g: color.green,
            b: color.blue,
        }
    }
}

impl From<WireColor> for ItemColor {
    fn from(color: WireColor) -> Self {
        Self {
            red: color.r,
            green: color.g,
            blue: color.b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePayload {
    #[serde(default)]
    pub user_description: String,
    pub items: Vec<WireItem>,
    pub tags: Vec<WireTag>,
}

pub fn encode_payload(payload: &VaultApplicationPayload) -> Result<Zeroizing<Vec<u8>>> {
    let wire = WirePayload {
        user_description: payload.user_description.clone(),
        items: payload.items.iter().map(encode_item).collect(),
        tags: payload.tags.iter().map(encode_tag).collect(),
    };

    serde_json::to_vec(&wire)
        .map(Zeroizing::new)
        .map_err(|e| Error::EncodingFailed(e.to_string()))
}

/// Decodes a decrypted payload. The first malformed item or tag aborts the
/// whole decode; nothing from a partially valid backup is returned.
pub fn decode_payload(plaintext: &[u8]) -> Result<VaultApplicationPayload, DecodingError> {
    let wire: WirePayload =
        serde_json::from_slice(plaintext).map_err(|e| DecodingError::Payload(e.to_string()))?;

    let items = wire
        .items
        .into_iter()
        .enumerate()
        .map(|(index, item)| decode_item(item).map_err(|source| DecodingError::Item { index, source }))
        .collect::<Result<Vec<_>, _>>()?;

    let tags = wire
        .tags
        .into_iter()
        .enumerate()
        .map(|(index, tag)| decode_tag(tag).map_err(|source| DecodingError::Tag { index, source }))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(VaultApplicationPayload {
        user_description: wire.user_description,
        items,
        tags,
    })
}
