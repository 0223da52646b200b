use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WireColor;
use crate::error::TagDecodeError;
use crate::model::VaultItemTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTag {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<WireColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_name: Option<String>,
}

pub fn encode_tag(tag: &VaultItemTag) -> WireTag {
    WireTag {
        id: tag.id.to_string(),
        name: tag.name.clone(),
        color: tag.color.map(WireColor::from),
        icon_name: tag.icon_name.clone(),
    }
}

pub fn decode_tag(wire: WireTag) -> Result<VaultItemTag, TagDecodeError> {
    let id = Uuid::parse_str(&wire.id).map_err(|_| TagDecodeError::InvalidId(wire.id.clone()))?;
    Ok(VaultItemTag {
        id,
        name: wire.name,
        color: wire.color.map(Into::into),
        icon_name: wire.icon_name,
    })
}
