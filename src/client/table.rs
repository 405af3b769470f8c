use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use super::{
    descriptor::{EventHandlerSpec, EventSpec, OperationSpec},
    multisig::MultisigSpec,
};
use crate::{
    error::{ContractClientError, Result},
    types::{ParamSpec, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Caller,
    Sender,
    Multisig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub name: String,
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHandlerEntry {
    pub event: String,
    /// `own`, or the name a related client was registered under.
    #[serde(default = "own_source")]
    pub source: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

fn own_source() -> String {
    "own".to_string()
}

fn address_field() -> String {
    "address".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultisigEntry {
    pub function_name: String,
    pub nonce_function: String,
    #[serde(default)]
    pub nonce_input: Vec<String>,
    /// Caller used to look up each role's address. Without it a resolver
    /// must be attached with `ClientBuilder::signee_resolver`.
    #[serde(default)]
    pub signee_caller: Option<String>,
    #[serde(default)]
    pub signee_roles: Vec<String>,
    #[serde(default = "address_field")]
    pub signee_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEntry {
    pub name: String,
    pub kind: OperationKind,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub input: Vec<(String, String)>,
    #[serde(default)]
    pub output: Vec<(String, String)>,
    #[serde(default)]
    pub default_values: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub echo_inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub event_handlers: Vec<EventHandlerEntry>,
    #[serde(default)]
    pub multisig: Option<MultisigEntry>,
}

/// Declarative description of a contract, usually loaded from JSON. Code
/// hooks are attached separately on the `ClientBuilder`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorTable {
    #[serde(default)]
    pub events: Vec<EventEntry>,
    #[serde(default)]
    pub operations: Vec<OperationEntry>,
}

pub(crate) enum TableOperation {
    Caller(OperationSpec),
    Sender(OperationSpec),
    Multisig(OperationSpec, MultisigSpec),
}

pub(crate) struct TableParts {
    pub events: Vec<EventSpec>,
    pub operations: Vec<TableOperation>,
}

impl DescriptorTable {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ContractClientError::Config(format!("invalid descriptor table: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            ContractClientError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub(crate) fn into_parts(self) -> Result<TableParts> {
        let events = self
            .events
            .into_iter()
            .map(|entry| EventSpec::new(entry.name, entry.params))
            .collect();

        let operations = self
            .operations
            .into_iter()
            .map(OperationEntry::into_operation)
            .collect::<Result<_>>()?;

        Ok(TableParts { events, operations })
    }
}

impl OperationEntry {
    fn into_operation(self) -> Result<TableOperation> {
        let mut spec = OperationSpec::new(&self.name);
        if let Some(function_name) = self.function_name {
            spec = spec.function_name(function_name);
        }
        spec.input = self
            .input
            .into_iter()
            .map(|(name, tag)| ParamSpec::new(name, tag))
            .collect();
        spec.output = self
            .output
            .into_iter()
            .map(|(name, tag)| ParamSpec::new(name, tag))
            .collect();

        for (name, json) in self.default_values {
            let value = Value::from_json(&json).ok_or_else(|| {
                ContractClientError::Config(format!(
                    "`{}` default for `{name}` is not a scalar: {json}",
                    self.name
                ))
            })?;
            spec.default_values.insert(name, value);
        }

        spec.echo_inputs = self.echo_inputs.into_iter().collect();

        for entry in self.event_handlers {
            let mut handler = match entry.source.as_str() {
                "own" => EventHandlerSpec::own(entry.event),
                related => EventHandlerSpec::related(related, entry.event),
            };
            handler.fields = entry.fields.into_iter().collect();
            spec = spec.event_handler(handler);
        }

        let operation = match (self.kind, self.multisig) {
            (OperationKind::Caller, None) => TableOperation::Caller(spec),
            (OperationKind::Sender, None) => TableOperation::Sender(spec),
            (OperationKind::Multisig, Some(entry)) => {
                let mut multisig = MultisigSpec::new(entry.function_name, entry.nonce_function);
                multisig.nonce_inputs = entry.nonce_input;
                if let Some(caller) = entry.signee_caller {
                    multisig = multisig.signees_by_role(caller, entry.signee_roles, entry.signee_field);
                }
                TableOperation::Multisig(spec, multisig)
            }
            (OperationKind::Multisig, None) => {
                return Err(ContractClientError::Config(format!(
                    "multisig operation `{}` has no multisig section",
                    self.name
                )));
            }
            (_, Some(_)) => {
                return Err(ContractClientError::Config(format!(
                    "`{}` has a multisig section but is not a multisig operation",
                    self.name
                )));
            }
        };

        Ok(operation)
    }
}
