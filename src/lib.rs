pub mod basic_elements;
pub mod client;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod helpers;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{
    adapter::{ChainAdapter, CollectedSignature},
    caller::Caller,
    config::ClientConfig,
    contract_client::{ClientBuilder, ContractClient},
    descriptor::{
        EventHandlerSpec, EventSpec, OperationSpec, id_within_count, resolve_signees_fn,
        validate_empty_fn,
    },
    events::{ContractEvent, EventSubscription},
    multisig::{MultisigOperation, MultisigSender, MultisigSpec, MultisigState, MultisigStatus},
    sender::Sender,
    table::DescriptorTable,
};
pub use error::{ContractClientError, Result};
pub use types::{
    ParamSpec, Value, Values, WireValue,
    event::{BlockRange, DecodedEvent, SendResult, TransactionReceipt},
    registry::{EnumType, ParamType, TypeRegistry},
    values,
};
