pub mod event;
pub mod registry;

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named input or output values of one operation.
pub type Values = BTreeMap<String, Value>;

/// Builds a `Values` map from `(name, value)` pairs.
pub fn values<K, V, I>(pairs: I) -> Values
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}

/// Host-side value of a parameter, before encoding or after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(u64),
    BigNumber(U256),
    Address(Address),
    String(String),
    Bytes(Vec<u8>),
    Date(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(address) => Some(*address),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_big_number(&self) -> Option<U256> {
        match self {
            Value::BigNumber(n) => Some(*n),
            Value::Number(n) => Some(U256::from(*n)),
            _ => None,
        }
    }

    /// Loose conversion used for default values written in JSON descriptor
    /// tables. The registry normalises the result against the declared type.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_u64().map(Value::Number),
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigNumber(_) => "big number",
            Value::Address(_) => "address",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value as u64)
    }
}

impl From<U256> for Value {
    fn from(value: U256) -> Self {
        Value::BigNumber(value)
    }
}

impl From<Address> for Value {
    fn from(value: Address) -> Self {
        Value::Address(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

/// Value in the shape the chain adapter exchanges with the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireValue {
    Address(Address),
    Bool(bool),
    Uint(U256),
    Bytes(Vec<u8>),
    FixedBytes(B256),
    String(String),
    Array(Vec<WireValue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireKind {
    Address = 0,
    Bool = 1,
    Uint = 2,
    Bytes = 3,
    FixedBytes = 4,
    String = 5,
    Array = 6,
}

impl WireKind {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(WireKind::Address),
            1 => Some(WireKind::Bool),
            2 => Some(WireKind::Uint),
            3 => Some(WireKind::Bytes),
            4 => Some(WireKind::FixedBytes),
            5 => Some(WireKind::String),
            6 => Some(WireKind::Array),
            _ => None,
        }
    }
}

impl WireValue {
    pub fn kind(&self) -> WireKind {
        match self {
            WireValue::Address(_) => WireKind::Address,
            WireValue::Bool(_) => WireKind::Bool,
            WireValue::Uint(_) => WireKind::Uint,
            WireValue::Bytes(_) => WireKind::Bytes,
            WireValue::FixedBytes(_) => WireKind::FixedBytes,
            WireValue::String(_) => WireKind::String,
            WireValue::Array(_) => WireKind::Array,
        }
    }
}

/// Declared parameter as written in a descriptor: a name, a registry type
/// tag and an optional default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}
