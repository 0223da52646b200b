//! Container format v1.
//!
//! V1 Layout (integers little-endian):
//! ```text
//! MAGIC (4) | MAJOR (2) | MINOR (2) | PATCH (2) | CREATED_MS (8) | SIG_LEN (1) | SIG | SALT_LEN (1) | SALT | IV (24) | CIPHERTEXT
//! ```

use chrono::DateTime;
use semver::Version;

use super::{EncryptedVault, MAGIC, MAGIC_LEN, VER_LEN};
use crate::crypto::NONCE_LEN;
use crate::error::{Error, Result};

const CREATED_LEN: usize = 8;
const LEN_PREFIX: usize = 1;

const MIN_LEN: usize = MAGIC_LEN + VER_LEN + CREATED_LEN + LEN_PREFIX + LEN_PREFIX + NONCE_LEN;

fn malformed(msg: &str) -> Error {
    Error::MalformedContainer(msg.to_string())
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| malformed(&format!("truncated {what}")))?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn rest(self) -> &'a [u8] {
        &self.data[self.offset..]
    }
}

/// Parses a v1 container. `version` has already been read and vetted by the
/// caller.
///
/// # Errors
///
/// Returns an error if the data is truncated or a field is invalid.
pub fn parse(data: &[u8], version: Version) -> Result<EncryptedVault> {
    if data.len() < MIN_LEN {
        return Err(malformed("file too short for v1"));
    }

    let mut reader = Reader {
        data,
        offset: MAGIC_LEN + VER_LEN,
    };

    let created_ms = i64::from_le_bytes(
        reader
            .take(CREATED_LEN, "timestamp")?
            .try_into()
            .map_err(|_| malformed("timestamp"))?,
    );
    let created =
        DateTime::from_timestamp_millis(created_ms).ok_or_else(|| malformed("timestamp out of range"))?;

    let sig_len = reader.take(LEN_PREFIX, "signature length")?[0] as usize;
    let signature = std::str::from_utf8(reader.take(sig_len, "signature")?)
        .map_err(|_| malformed("signature is not utf-8"))?
        .to_string();

    let salt_len = reader.take(LEN_PREFIX, "salt length")?[0] as usize;
    let salt = reader.take(salt_len, "salt")?.to_vec();

    let iv = reader.take(NONCE_LEN, "iv")?.to_vec();
    let ciphertext = reader.rest().to_vec();

    Ok(EncryptedVault::with_version(
        version, created, signature, salt, iv, ciphertext,
    ))
}

/// Serializes a container to v1 bytes.
///
/// # Errors
///
/// Returns an error if the version is not 1.x or a field does not fit.
pub fn serialize(vault: &EncryptedVault) -> Result<Vec<u8>> {
    let version = vault.version();
    if version.major != 1 {
        return Err(malformed("wrong version for v1 serializer"));
    }

    let field = |value: u64, name: &str| {
        u16::try_from(value).map_err(|_| malformed(&format!("{name} version too large")))
    };
    let (major, minor, patch) = (
        field(version.major, "major")?,
        field(version.minor, "minor")?,
        field(version.patch, "patch")?,
    );

    let sig_len = u8::try_from(vault.signature().len()).map_err(|_| malformed("signature too long"))?;
    let salt_len = u8::try_from(vault.salt().len()).map_err(|_| malformed("salt too long"))?;

    if vault.iv().len() != NONCE_LEN {
        return Err(malformed("invalid iv length for v1"));
    }

    let mut buf = Vec::with_capacity(
        MIN_LEN + vault.signature().len() + vault.salt().len() + vault.ciphertext().len(),
    );

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&major.to_le_bytes());
    buf.extend_from_slice(&minor.to_le_bytes());
    buf.extend_from_slice(&patch.to_le_bytes());
    buf.extend_from_slice(&vault.created().timestamp_millis().to_le_bytes());

    buf.push(sig_len);
    buf.extend_from_slice(vault.signature().as_bytes());
    buf.push(salt_len);
    buf.extend_from_slice(vault.salt());

    buf.extend_from_slice(vault.iv());
    buf.extend_from_slice(vault.ciphertext());

    Ok(buf)
}
