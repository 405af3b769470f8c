use alloy_primitives::U256;

pub fn u32_to_bytes(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn u64_to_bytes(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn u256_to_bytes(value: U256) -> Vec<u8> {
    U256::to_le_bytes_vec(&value)
}

/// Narrows a wire integer, `None` when it does not fit in 64 bits.
pub fn u256_to_u64(value: U256) -> Option<u64> {
    if value > U256::from(u64::MAX) {
        return None;
    }
    Some(value.to::<u64>())
}
