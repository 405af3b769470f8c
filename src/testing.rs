use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use alloy_primitives::{Address, B256, Signature, U256, keccak256};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

use crate::{
    basic_elements::{
        args::Args,
        keys::{LocalSigner, PayloadSigner},
    },
    client::adapter::{ChainAdapter, CollectedSignature},
    types::{
        WireValue,
        event::{BlockRange, RawLog, TransactionReceipt, TxStatus},
    },
};

type ReadFn = Box<dyn Fn(&[WireValue]) -> Result<Vec<WireValue>> + Send + Sync>;

/// Packs event fields the way log data arrives from the chain.
pub fn log_data(fields: &[WireValue]) -> Vec<u8> {
    let mut args = Args::new();
    for field in fields {
        args.add_wire_value(field);
    }
    args.serialize()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub contract: Address,
    pub function_name: String,
    pub args: Vec<WireValue>,
    pub signatures: Option<Vec<CollectedSignature>>,
}

struct NonceTracking {
    nonce_function: String,
    execute_function: String,
    key_len: usize,
}

#[derive(Default)]
struct State {
    reads: Vec<(String, Vec<WireValue>)>,
    submissions: Vec<Submission>,
    nonces: HashMap<Vec<u8>, u64>,
    emitted: HashMap<String, Vec<(Address, String, Vec<u8>)>>,
    reverting: HashSet<String>,
    chain_logs: Vec<RawLog>,
    block_number: u64,
}

/// In-memory chain: scripted reads, recorded submissions, per-key change
/// nonces and canned logs.
#[derive(Default)]
pub struct MemoryAdapter {
    readers: Mutex<HashMap<String, ReadFn>>,
    nonce_tracking: Mutex<Option<NonceTracking>>,
    signer: Option<LocalSigner>,
    state: Mutex<State>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signer(signer: LocalSigner) -> Self {
        Self {
            signer: Some(signer),
            ..Self::default()
        }
    }

    pub fn on_read<F>(&self, function_name: &str, reader: F)
    where
        F: Fn(&[WireValue]) -> Result<Vec<WireValue>> + Send + Sync + 'static,
    {
        self.readers
            .lock()
            .unwrap()
            .insert(function_name.to_string(), Box::new(reader));
    }

    /// Serves `nonce_function` from a counter keyed by its arguments. Each
    /// submission to `execute_function` bumps the counter keyed by the first
    /// `key_len` arguments of the wrapped call.
    pub fn track_nonce(&self, nonce_function: &str, execute_function: &str, key_len: usize) {
        *self.nonce_tracking.lock().unwrap() = Some(NonceTracking {
            nonce_function: nonce_function.to_string(),
            execute_function: execute_function.to_string(),
            key_len,
        });
    }

    pub fn emit_on_submit(&self, function_name: &str, address: Address, event: &str, data: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .emitted
            .entry(function_name.to_string())
            .or_default()
            .push((address, event.to_string(), data));
    }

    pub fn revert_on(&self, function_name: &str) {
        self.state
            .lock()
            .unwrap()
            .reverting
            .insert(function_name.to_string());
    }

    pub fn push_log(&self, address: Address, event: &str, data: Vec<u8>, block_number: u64) {
        let mut state = self.state.lock().unwrap();
        let log_index = state.chain_logs.len() as u64;
        state.chain_logs.push(RawLog {
            address,
            event: event.to_string(),
            data,
            block_number,
            transaction_hash: B256::with_last_byte(log_index as u8),
            log_index,
        });
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.state.lock().unwrap().block_number = block_number;
    }

    pub fn reads(&self, function_name: &str) -> Vec<Vec<WireValue>> {
        self.state
            .lock()
            .unwrap()
            .reads
            .iter()
            .filter(|(name, _)| name == function_name)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn nonce_key(args: &[WireValue]) -> Vec<u8> {
        Args::new().add_wire_values(args).serialize()
    }

    fn wrapped_call_key(args: &[WireValue], key_len: usize) -> Result<Vec<u8>> {
        let Some(WireValue::Bytes(call_data)) = args.first() else {
            bail!("Execute call carries no call data");
        };
        let mut call = Args::from_bytes(call_data.clone());
        let _function_name = call.next_string()?;
        let wrapped_args = call.next_wire_values()?;
        let key = wrapped_args
            .get(..key_len)
            .ok_or_else(|| anyhow!("Wrapped call has fewer than {} arguments", key_len))?;
        Ok(Self::nonce_key(key))
    }
}

#[async_trait]
impl ChainAdapter for MemoryAdapter {
    async fn read(&self, _contract: Address, function_name: &str, args: &[WireValue]) -> Result<Vec<WireValue>> {
        self.state
            .lock()
            .unwrap()
            .reads
            .push((function_name.to_string(), args.to_vec()));

        if let Some(tracking) = self.nonce_tracking.lock().unwrap().as_ref() {
            if tracking.nonce_function == function_name {
                let nonce = self
                    .state
                    .lock()
                    .unwrap()
                    .nonces
                    .get(&Self::nonce_key(args))
                    .copied()
                    .unwrap_or_default();
                return Ok(vec![WireValue::Uint(U256::from(nonce))]);
            }
        }

        let readers = self.readers.lock().unwrap();
        let reader = readers
            .get(function_name)
            .ok_or_else(|| anyhow!("No scripted result for {}", function_name))?;
        reader(args)
    }

    async fn submit(
        &self,
        contract: Address,
        function_name: &str,
        args: &[WireValue],
        signatures: Option<&[CollectedSignature]>,
    ) -> Result<TransactionReceipt> {
        let bumped_key = match self.nonce_tracking.lock().unwrap().as_ref() {
            Some(tracking) if tracking.execute_function == function_name => {
                Some(Self::wrapped_call_key(args, tracking.key_len)?)
            }
            _ => None,
        };

        let mut state = self.state.lock().unwrap();
        state.submissions.push(Submission {
            contract,
            function_name: function_name.to_string(),
            args: args.to_vec(),
            signatures: signatures.map(<[_]>::to_vec),
        });
        state.block_number += 1;

        let transaction_hash = keccak256((state.submissions.len() as u64).to_le_bytes());
        let block_number = state.block_number;

        if state.reverting.contains(function_name) {
            return Ok(TransactionReceipt {
                transaction_hash,
                block_number,
                status: TxStatus::Reverted,
                logs: Vec::new(),
            });
        }

        if let Some(key) = bumped_key {
            *state.nonces.entry(key).or_default() += 1;
        }

        let logs = state
            .emitted
            .get(function_name)
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(index, (address, event, data))| RawLog {
                address: *address,
                event: event.clone(),
                data: data.clone(),
                block_number,
                transaction_hash,
                log_index: index as u64,
            })
            .collect();

        Ok(TransactionReceipt {
            transaction_hash,
            block_number,
            status: TxStatus::Success,
            logs,
        })
    }

    async fn get_logs(&self, contract: Address, event_name: &str, range: BlockRange) -> Result<Vec<RawLog>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .chain_logs
            .iter()
            .filter(|log| {
                log.address == contract && log.event == event_name && range.contains(log.block_number)
            })
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().block_number)
    }

    async fn sign(&self, payload_hash: B256) -> Result<Signature> {
        match &self.signer {
            Some(signer) => signer.sign(&payload_hash),
            None => bail!("MemoryAdapter has no signer"),
        }
    }
}
