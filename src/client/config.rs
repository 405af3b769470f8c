use std::env;

use alloy_primitives::Address;

use crate::{
    constants::{DEFAULT_EVENT_BLOCK_RANGE, EnvVar},
    error::{ContractClientError, Result},
    types::registry::parse_address,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub name: String,
    pub contract_address: Address,
    /// Span of blocks scanned by `ContractEvent::query_recent`.
    pub default_block_range: u64,
}

impl ClientConfig {
    pub fn new(name: impl Into<String>, contract_address: Address) -> Self {
        Self {
            name: name.into(),
            contract_address,
            default_block_range: DEFAULT_EVENT_BLOCK_RANGE,
        }
    }

    pub fn with_block_range(mut self, default_block_range: u64) -> Self {
        self.default_block_range = default_block_range;
        self
    }

    /// Reads `CONTRACT_ADDRESS`, and optionally `CONTRACT_NAME` and
    /// `EVENT_BLOCK_RANGE`, after loading a `.env` file if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let address_var = EnvVar::ContractAddress.name();
        let address = env::var(address_var)
            .map_err(|_| ContractClientError::Config(format!("{address_var} not set")))?;
        let contract_address = parse_address(&address).map_err(ContractClientError::Config)?;

        let name = env::var(EnvVar::ContractName.name()).unwrap_or_else(|_| "contract".to_string());

        let default_block_range = match env::var(EnvVar::EventBlockRange.name()) {
            Ok(range) => range.parse::<u64>().map_err(|e| {
                ContractClientError::Config(format!(
                    "{} is not a block count: {e}",
                    EnvVar::EventBlockRange.name()
                ))
            })?,
            Err(_) => DEFAULT_EVENT_BLOCK_RANGE,
        };

        Ok(Self {
            name,
            contract_address,
            default_block_range,
        })
    }
}
