use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result, anyhow, bail};
use byteorder::{LittleEndian, ReadBytesExt};

use crate::types::{WireKind, WireValue};

use super::next_arg::NextArg;
use super::serializers::{u32_to_bytes, u64_to_bytes, u256_to_bytes};

// 32 / 8 bits = 4 bytes
pub const BYTES_32_OFFSET: usize = 4;
// 64 / 8 bits = 8 bytes
pub const BYTES_64_OFFSET: usize = 8;
// 160 / 8 bits = 20 bytes
pub const BYTES_160_OFFSET: usize = 20;
// 256 / 8 bits = 32 bytes
pub const BYTES_256_OFFSET: usize = 32;
pub const DEFAULT_OFFSET: usize = 0;

const MAX_SIZE: usize = u32::MAX as usize;

/// Little-endian, length-prefixed byte packing used for contract call data,
/// event payloads and the multisig signing payload.
#[derive(Debug, Clone, Default)]
pub struct Args {
    serialized: Vec<u8>,
    offset: usize, // For deserialization
}

impl Args {
    pub fn new() -> Self {
        Self {
            serialized: Vec::new(),
            offset: DEFAULT_OFFSET,
        }
    }

    /// Creates Args from existing serialized data, ready for deserialization.
    pub fn from_bytes(serialized: Vec<u8>) -> Self {
        Self {
            serialized,
            offset: DEFAULT_OFFSET,
        }
    }

    pub fn get_offset(&self) -> usize {
        self.offset
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.serialized.clone()
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.serialized.len() - self.offset
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads a specific number of bytes from the current offset and advances
    /// past them.
    fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        let current_offset = self.offset;
        let end_offset = current_offset.checked_add(len).ok_or_else(|| {
            anyhow!(
                "Offset overflow while trying to read {} bytes from offset {}",
                len,
                current_offset
            )
        })?;

        if end_offset > self.serialized.len() {
            bail!(
                "Not enough bytes to read. Wanted {} bytes from offset {}, but buffer length is {}",
                len,
                current_offset,
                self.serialized.len()
            );
        }

        self.offset = end_offset;
        Ok(&self.serialized[current_offset..end_offset])
    }

    // --- Deserialization Methods (`next*`) ---

    pub fn next_u8(&mut self) -> Result<u8> {
        self.read_bytes(1)?.read_u8().context("Failed to read u8")
    }

    pub fn next_u32(&mut self) -> Result<u32> {
        self.read_bytes(BYTES_32_OFFSET)?
            .read_u32::<LittleEndian>()
            .context("Failed to read u32")
    }

    pub fn next_u64(&mut self) -> Result<u64> {
        self.read_bytes(BYTES_64_OFFSET)?
            .read_u64::<LittleEndian>()
            .context("Failed to read u64")
    }

    pub fn next_u256(&mut self) -> Result<U256> {
        let le_bytes = self
            .read_bytes(BYTES_256_OFFSET)
            .context("Failed to read u256")?;

        let mut buffer = [0u8; 32];
        buffer.copy_from_slice(le_bytes);

        Ok(U256::from_le_bytes(buffer))
    }

    /// Reads the next boolean (a u8, non-zero is true).
    pub fn next_bool(&mut self) -> Result<bool> {
        Ok(self.next_u8()? != 0)
    }

    pub fn next_address(&mut self) -> Result<Address> {
        let bytes = self
            .read_bytes(BYTES_160_OFFSET)
            .context("Failed to read address")?;
        Ok(Address::from_slice(bytes))
    }

    pub fn next_b256(&mut self) -> Result<B256> {
        let bytes = self
            .read_bytes(BYTES_256_OFFSET)
            .context("Failed to read bytes32")?;
        Ok(B256::from_slice(bytes))
    }

    /// Reads the next string (length as u32, then UTF-8 bytes).
    pub fn next_string(&mut self) -> Result<String> {
        let len = self.next_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .with_context(|| format!("Failed to decode UTF-8 string with length {}", len))
    }

    /// Reads the next byte array (length as u32, then bytes).
    pub fn next_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.next_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(bytes.to_vec())
    }

    /// Reads one kind-tagged wire value.
    pub fn next_wire_value(&mut self) -> Result<WireValue> {
        let tag = self.next_u8()?;
        let kind =
            WireKind::from_u8(tag).ok_or_else(|| anyhow!("Unknown wire value tag: {}", tag))?;

        let value = match kind {
            WireKind::Address => WireValue::Address(self.next_arg(kind)?),
            WireKind::Bool => WireValue::Bool(self.next_arg(kind)?),
            WireKind::Uint => WireValue::Uint(self.next_arg(kind)?),
            WireKind::Bytes => WireValue::Bytes(self.next_arg(kind)?),
            WireKind::FixedBytes => WireValue::FixedBytes(self.next_arg(kind)?),
            WireKind::String => WireValue::String(self.next_arg(kind)?),
            WireKind::Array => WireValue::Array(self.next_wire_values()?),
        };

        Ok(value)
    }

    /// Reads a count-prefixed sequence of tagged wire values.
    pub fn next_wire_values(&mut self) -> Result<Vec<WireValue>> {
        let len = self.next_u32()? as usize;
        let mut result = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            result.push(self.next_wire_value()?);
        }
        Ok(result)
    }

    // --- Serialization Methods (`add*`) ---

    pub fn add_u8(&mut self, value: u8) -> &mut Self {
        self.serialized.push(value);
        self
    }

    pub fn add_u32(&mut self, value: u32) -> &mut Self {
        self.serialized.extend_from_slice(&u32_to_bytes(value));
        self
    }

    pub fn add_u64(&mut self, value: u64) -> &mut Self {
        self.serialized.extend_from_slice(&u64_to_bytes(value));
        self
    }

    pub fn add_u256(&mut self, value: U256) -> &mut Self {
        self.serialized.extend_from_slice(&u256_to_bytes(value));
        self
    }

    /// Adds a boolean (as a u8: 1 for true, 0 for false).
    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.add_u8(if value { 1 } else { 0 })
    }

    pub fn add_address(&mut self, value: &Address) -> &mut Self {
        self.serialized.extend_from_slice(value.as_slice());
        self
    }

    pub fn add_b256(&mut self, value: &B256) -> &mut Self {
        self.serialized.extend_from_slice(value.as_slice());
        self
    }

    /// Adds a string (length as u32, then UTF-8 bytes).
    pub fn add_string(&mut self, value: &str) -> &mut Self {
        self.add_bytes(value.as_bytes())
    }

    /// Adds a byte array (length as u32, then bytes).
    pub fn add_bytes(&mut self, value: &[u8]) -> &mut Self {
        if value.len() > MAX_SIZE {
            panic!(
                "Byte array length {} exceeds maximum allowed size {}",
                value.len(),
                MAX_SIZE
            );
        }
        self.add_u32(value.len() as u32);
        self.serialized.extend_from_slice(value);
        self
    }

    /// Adds one wire value, prefixed with its kind tag.
    pub fn add_wire_value(&mut self, value: &WireValue) -> &mut Self {
        self.add_u8(value.kind() as u8);
        match value {
            WireValue::Address(address) => self.add_address(address),
            WireValue::Bool(b) => self.add_bool(*b),
            WireValue::Uint(n) => self.add_u256(*n),
            WireValue::Bytes(bytes) => self.add_bytes(bytes),
            WireValue::FixedBytes(word) => self.add_b256(word),
            WireValue::String(s) => self.add_string(s),
            WireValue::Array(items) => self.add_wire_values(items),
        }
    }

    /// Adds a count-prefixed sequence of tagged wire values.
    pub fn add_wire_values(&mut self, values: &[WireValue]) -> &mut Self {
        self.add_u32(values.len() as u32);
        for value in values {
            self.add_wire_value(value);
        }
        self
    }
}

/// Packs positional call arguments the way the adapter receives them as
/// call data.
pub fn encode_call_data(function_name: &str, args: &[WireValue]) -> Vec<u8> {
    Args::new()
        .add_string(function_name)
        .add_wire_values(args)
        .serialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_next_primitives() -> Result<()> {
        let mut args = Args::new();
        args.add_u8(10).add_u64(500).add_bool(true).add_u32(7);

        let mut reader_args = Args::from_bytes(args.serialize());
        assert_eq!(reader_args.next_u8()?, 10);
        assert_eq!(reader_args.next_u64()?, 500);
        assert!(reader_args.next_bool()?);
        assert_eq!(reader_args.next_u32()?, 7);
        assert_eq!(reader_args.get_offset(), 1 + 8 + 1 + 4);
        assert!(reader_args.is_exhausted());

        Ok(())
    }

    #[test]
    fn test_add_and_next_string() -> Result<()> {
        let mut args = Args::new();
        let s1 = "hello";
        let s2 = "world!";
        args.add_string(s1).add_string(s2);

        let mut reader_args = Args::from_bytes(args.serialize());
        assert_eq!(reader_args.next_string()?, s1);
        assert_eq!(reader_args.next_string()?, s2);
        assert_eq!(reader_args.get_offset(), (4 + s1.len()) + (4 + s2.len()));

        Ok(())
    }

    #[test]
    fn test_wire_values() -> Result<()> {
        let values = vec![
            WireValue::Address(Address::repeat_byte(0x11)),
            WireValue::Bool(false),
            WireValue::Uint(U256::from(u128::MAX) + U256::from(1u8)),
            WireValue::Bytes(vec![0xde, 0xad]),
            WireValue::FixedBytes(B256::repeat_byte(0x22)),
            WireValue::String("makeTask".to_string()),
            WireValue::Array(vec![WireValue::Uint(U256::from(3u8))]),
        ];

        let mut args = Args::new();
        args.add_wire_values(&values);

        let mut reader_args = Args::from_bytes(args.serialize());
        assert_eq!(reader_args.next_wire_values()?, values);
        assert!(reader_args.is_exhausted());

        Ok(())
    }

    #[test]
    fn test_unknown_wire_tag() {
        let mut reader_args = Args::from_bytes(vec![42]);
        assert!(reader_args.next_wire_value().is_err());
    }

    #[test]
    fn test_call_data_binds_function_name() {
        let args = [WireValue::Uint(U256::from(1u8))];
        assert_ne!(
            encode_call_data("setTaskBrief", &args),
            encode_call_data("setTaskDueDate", &args)
        );
    }

    #[test]
    fn test_read_past_end() {
        let mut args = Args::new();
        args.add_u8(1).add_u8(2);

        let mut reader_args = Args::from_bytes(args.serialize());
        assert!(reader_args.next_u8().is_ok());
        assert!(reader_args.next_u8().is_ok());
        assert!(reader_args.next_u8().is_err());
    }

    #[test]
    fn test_read_string_not_enough_data_for_content() {
        let mut args = Args::new();
        args.add_u32(10);
        args.serialized.push(1);
        args.serialized.push(2);

        let mut reader_args = Args::from_bytes(args.serialize());
        assert!(reader_args.next_string().is_err());
    }
}
