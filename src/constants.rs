/// Largest integer the `number` type accepts (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

// sha2-256 multihash header of a CIDv0 content hash
pub const MULTIHASH_SHA256_PREFIX: [u8; 2] = [0x12, 0x20];
pub const CONTENT_HASH_LENGTH: usize = 34;

pub const MANAGER_ROLE: &str = "MANAGER";
pub const EVALUATOR_ROLE: &str = "EVALUATOR";
pub const WORKER_ROLE: &str = "WORKER";

pub const DEFAULT_ROLES: [(&str, u64); 3] = [(MANAGER_ROLE, 0), (EVALUATOR_ROLE, 1), (WORKER_ROLE, 2)];

pub const DEFAULT_EVENT_BLOCK_RANGE: u64 = 10_000;

pub enum EnvVar {
    ContractAddress,
    ContractName,
    EventBlockRange,
    SignerPrivateKey,
}

impl EnvVar {
    pub fn name(&self) -> &'static str {
        match self {
            EnvVar::ContractAddress => "CONTRACT_ADDRESS",
            EnvVar::ContractName => "CONTRACT_NAME",
            EnvVar::EventBlockRange => "EVENT_BLOCK_RANGE",
            EnvVar::SignerPrivateKey => "SIGNER_PRIVATE_KEY",
        }
    }
}
