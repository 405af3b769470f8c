pub mod adapter;
pub mod caller;
pub mod config;
pub mod contract_client;
pub mod descriptor;
pub mod events;
pub mod multisig;
pub mod sender;
pub mod table;
