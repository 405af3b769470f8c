use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use super::Values;

/// Event log as returned by the chain adapter. `data` holds the event's
/// fields packed with `Args`, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: Address,
    pub event: String,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub status: TxStatus,
    pub logs: Vec<RawLog>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}

/// Inclusive block window for log queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// The last `span` blocks ending at `latest`.
    pub fn latest(latest: u64, span: u64) -> Self {
        Self {
            from: latest.saturating_sub(span.saturating_sub(1)),
            to: latest,
        }
    }

    pub fn contains(&self, block: u64) -> bool {
        self.from <= block && block <= self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub event: String,
    pub address: Address,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
    pub fields: Values,
}

/// Metadata of a confirmed send, returned next to the decoded outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptMeta {
    pub transaction_hash: B256,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub outputs: Values,
    pub receipt: ReceiptMeta,
    pub events: Vec<DecodedEvent>,
}
