use alloy_primitives::B256;
use anyhow::{Context, Result, bail};

use super::traits::serializer::Serializer;
use crate::constants::{CONTENT_HASH_LENGTH, MULTIHASH_SHA256_PREFIX};

#[derive(Debug, Clone, Copy, Default)]
pub struct Base58Serializer;

impl Serializer for Base58Serializer {
    fn serialize(&self, data: &[u8]) -> String {
        bs58::encode(data).into_string()
    }

    fn deserialize(&self, s: &str) -> Result<Vec<u8>> {
        bs58::decode(s)
            .into_vec()
            .with_context(|| format!("Failed to decode Base58 string: '{}'", s))
    }
}

/// Extracts the 32-byte digest from a CIDv0 content hash (`Qm...`).
pub fn content_hash_to_digest(hash: &str) -> Result<B256> {
    let bytes = Base58Serializer.deserialize(hash)?;

    if bytes.len() != CONTENT_HASH_LENGTH {
        bail!(
            "Content hash must be {} bytes, got {}",
            CONTENT_HASH_LENGTH,
            bytes.len()
        );
    }
    if bytes[..2] != MULTIHASH_SHA256_PREFIX {
        bail!("Content hash is not a sha2-256 multihash: prefix {:02x?}", &bytes[..2]);
    }

    Ok(B256::from_slice(&bytes[2..]))
}

pub fn digest_to_content_hash(digest: &B256) -> String {
    let mut bytes = Vec::with_capacity(CONTENT_HASH_LENGTH);
    bytes.extend_from_slice(&MULTIHASH_SHA256_PREFIX);
    bytes.extend_from_slice(digest.as_slice());

    Base58Serializer.serialize(&bytes)
}
