use alloy_primitives::{Address, B256, Signature};
use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::types::{
    WireValue,
    event::{BlockRange, RawLog, TransactionReceipt},
};

/// One co-signer's approval attached to a multisig submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedSignature {
    pub signer: Address,
    pub signature: Signature,
}

/// Connection to the chain: contract reads, transaction submission and log
/// retrieval. Implementations own their signer and their concurrency.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn read(
        &self,
        contract: Address,
        function_name: &str,
        args: &[WireValue],
    ) -> Result<Vec<WireValue>>;

    /// Submits a state-changing call and resolves once it is confirmed.
    /// Dropping the future abandons the wait, not the transaction.
    async fn submit(
        &self,
        contract: Address,
        function_name: &str,
        args: &[WireValue],
        signatures: Option<&[CollectedSignature]>,
    ) -> Result<TransactionReceipt>;

    async fn get_logs(
        &self,
        contract: Address,
        event_name: &str,
        range: BlockRange,
    ) -> Result<Vec<RawLog>>;

    async fn block_number(&self) -> Result<u64>;

    async fn sign(&self, _payload_hash: B256) -> Result<Signature> {
        bail!("This adapter holds no signing key")
    }
}
