use anyhow::Result;

/// Text form of a binary identifier (content hashes, keys).
pub trait Serializer: Send + Sync {
    fn serialize(&self, data: &[u8]) -> String;
    fn deserialize(&self, s: &str) -> Result<Vec<u8>>;
}
