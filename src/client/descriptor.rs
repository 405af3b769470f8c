use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{Arc, Weak},
};

use alloy_primitives::Address;
use anyhow::anyhow;
use futures::future::BoxFuture;
use tracing::debug;

use super::contract_client::ContractClient;
use crate::{
    error::{ContractClientError, Result},
    types::{
        ParamSpec, Value, Values, WireValue,
        registry::{ParamType, TypeRegistry},
    },
};

/// Pre-network check run against the merged input. Returning `false` or an
/// error aborts the operation with a precondition failure.
pub type ValidateEmptyFn =
    Arc<dyn Fn(ContractClient, Values) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

/// Computes the addresses that must co-sign a multisig operation.
pub type ResolveSigneesFn = Arc<
    dyn Fn(ContractClient, Values) -> BoxFuture<'static, anyhow::Result<Vec<Address>>>
        + Send
        + Sync,
>;

pub fn validate_empty_fn<F, Fut>(f: F) -> ValidateEmptyFn
where
    F: Fn(ContractClient, Values) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    Arc::new(move |client, input| Box::pin(f(client, input)))
}

pub fn resolve_signees_fn<F, Fut>(f: F) -> ResolveSigneesFn
where
    F: Fn(ContractClient, Values) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<Address>>> + Send + 'static,
{
    Arc::new(move |client, input| Box::pin(f(client, input)))
}

/// Fails unless `id_input` is at most the `count_output` returned by the
/// `count_operation` caller, the usual "entity exists" check.
pub fn id_within_count(count_operation: &str, id_input: &str, count_output: &str) -> ValidateEmptyFn {
    let count_operation = count_operation.to_string();
    let id_input = id_input.to_string();
    let count_output = count_output.to_string();

    validate_empty_fn(move |client: ContractClient, input: Values| {
        check_id_within_count(
            client,
            input,
            count_operation.clone(),
            id_input.clone(),
            count_output.clone(),
        )
    })
}

async fn check_id_within_count(
    client: ContractClient,
    input: Values,
    count_operation: String,
    id_input: String,
    count_output: String,
) -> anyhow::Result<bool> {
    let Some(id) = input.get(&id_input).and_then(Value::as_u64) else {
        return Ok(true);
    };
    let output = client.call(&count_operation, Values::new()).await?;
    let count = output
        .get(&count_output)
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("`{count_operation}` returned no `{count_output}`"))?;

    if id > count {
        return Err(anyhow!("{id_input} {id} not found"));
    }
    Ok(true)
}

/// A declared parameter with its type resolved against the registry.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub type_tag: String,
    pub ty: ParamType,
}

#[derive(Debug, Clone)]
pub struct EventDescriptor {
    pub name: String,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventSpec {
    pub name: String,
    pub params: Vec<ParamSpec>,
}

impl EventSpec {
    pub fn new<N: Into<String>, T: Into<String>>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = (N, T)>,
    ) -> Self {
        Self {
            name: name.into(),
            params: params
                .into_iter()
                .map(|(name, tag)| ParamSpec::new(name, tag))
                .collect(),
        }
    }

    pub(crate) fn resolve(&self, registry: &TypeRegistry) -> Result<EventDescriptor> {
        if self.name.is_empty() {
            return Err(ContractClientError::construction("event name is empty"));
        }
        let params = resolve_params(registry, &self.params, &format!("event `{}`", self.name))?;
        Ok(EventDescriptor {
            name: self.name.clone(),
            params,
        })
    }
}

/// Identity of a deployed contract that events can be attributed to.
#[derive(Debug)]
pub struct ContractContext {
    pub name: String,
    pub address: Address,
    pub events: HashMap<String, Arc<EventDescriptor>>,
}

/// Where an event handler looks for its log. A related contract is held
/// weakly: the handler does not keep the other client alive.
#[derive(Debug, Clone)]
pub enum EventSource {
    Own,
    Related(Weak<ContractContext>),
}

#[derive(Debug, Clone)]
pub struct EventHandler {
    pub event: Arc<EventDescriptor>,
    pub source: EventSource,
    /// `(event field, output name)`; empty copies every field unchanged.
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventSourceSpec {
    Own,
    Related(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventHandlerSpec {
    pub event: String,
    pub source: EventSourceSpec,
    pub fields: Vec<(String, String)>,
}

impl EventHandlerSpec {
    pub fn own(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            source: EventSourceSpec::Own,
            fields: Vec::new(),
        }
    }

    pub fn related(client_name: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            source: EventSourceSpec::Related(client_name.into()),
            fields: Vec::new(),
        }
    }

    /// Copies event field `from` into the result as `to`.
    pub fn field(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.fields.push((from.into(), to.into()));
        self
    }
}

/// Declarative form of one contract operation, before validation.
#[derive(Clone)]
pub struct OperationSpec {
    pub name: String,
    pub function_name: Option<String>,
    pub input: Vec<ParamSpec>,
    pub output: Vec<ParamSpec>,
    pub default_values: Values,
    pub validate_empty: Option<ValidateEmptyFn>,
    pub event_handlers: Vec<EventHandlerSpec>,
    pub echo_inputs: Vec<(String, String)>,
}

impl OperationSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            function_name: None,
            input: Vec::new(),
            output: Vec::new(),
            default_values: Values::new(),
            validate_empty: None,
            event_handlers: Vec::new(),
            echo_inputs: Vec::new(),
        }
    }

    /// Contract function to invoke; defaults to the operation name.
    pub fn function_name(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = Some(function_name.into());
        self
    }

    pub fn input<N: Into<String>, T: Into<String>>(
        mut self,
        params: impl IntoIterator<Item = (N, T)>,
    ) -> Self {
        self.input
            .extend(params.into_iter().map(|(name, tag)| ParamSpec::new(name, tag)));
        self
    }

    pub fn input_param(mut self, param: ParamSpec) -> Self {
        self.input.push(param);
        self
    }

    pub fn output<N: Into<String>, T: Into<String>>(
        mut self,
        params: impl IntoIterator<Item = (N, T)>,
    ) -> Self {
        self.output
            .extend(params.into_iter().map(|(name, tag)| ParamSpec::new(name, tag)));
        self
    }

    pub fn default_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_values.insert(name.into(), value.into());
        self
    }

    pub fn validate_empty<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ContractClient, Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.validate_empty = Some(validate_empty_fn(f));
        self
    }

    pub fn validate_empty_with(mut self, hook: ValidateEmptyFn) -> Self {
        self.validate_empty = Some(hook);
        self
    }

    pub fn event_handler(mut self, handler: EventHandlerSpec) -> Self {
        self.event_handlers.push(handler);
        self
    }

    /// Copies input `from` into the output as `to`.
    pub fn echo_input(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.echo_inputs.push((from.into(), to.into()));
        self
    }

    pub(crate) fn resolve(
        &self,
        registry: &TypeRegistry,
        own_events: &HashMap<String, Arc<EventDescriptor>>,
        related: &HashMap<String, Weak<ContractContext>>,
    ) -> Result<OperationDescriptor> {
        let context = format!("operation `{}`", self.name);
        if self.name.is_empty() {
            return Err(ContractClientError::construction("operation name is empty"));
        }

        let function_name = self.function_name.clone().unwrap_or_else(|| self.name.clone());
        if function_name.is_empty() {
            return Err(ContractClientError::construction(format!(
                "{context} has an empty function name"
            )));
        }

        let input = resolve_params(registry, &self.input, &format!("{context} input"))?;
        let output = resolve_params(registry, &self.output, &format!("{context} output"))?;

        let mut default_values = Values::new();
        for spec in &self.input {
            if let Some(default) = &spec.default {
                default_values.insert(spec.name.clone(), default.clone());
            }
        }
        default_values.extend(self.default_values.clone());

        let mut normalized_defaults = Values::new();
        for (name, value) in &default_values {
            let param = input.iter().find(|p| &p.name == name).ok_or_else(|| {
                ContractClientError::construction(format!(
                    "{context} has a default for undeclared input `{name}`"
                ))
            })?;
            let normalized = param.ty.normalize(value).map_err(|reason| {
                ContractClientError::construction(format!(
                    "{context} default for `{name}` is invalid: {reason}"
                ))
            })?;
            normalized_defaults.insert(name.clone(), normalized);
        }

        for (from, _) in &self.echo_inputs {
            if !input.iter().any(|p| &p.name == from) {
                return Err(ContractClientError::construction(format!(
                    "{context} echoes undeclared input `{from}`"
                )));
            }
        }

        let mut event_handlers = Vec::with_capacity(self.event_handlers.len());
        for handler in &self.event_handlers {
            let (event, source) = match &handler.source {
                EventSourceSpec::Own => (own_events.get(&handler.event).cloned(), EventSource::Own),
                EventSourceSpec::Related(client_name) => {
                    let weak = related.get(client_name).ok_or_else(|| {
                        ContractClientError::construction(format!(
                            "{context} handler refers to unknown related client `{client_name}`"
                        ))
                    })?;
                    let event = weak
                        .upgrade()
                        .and_then(|other| other.events.get(&handler.event).cloned());
                    (event, EventSource::Related(weak.clone()))
                }
            };
            let event = event.ok_or_else(|| {
                ContractClientError::construction(format!(
                    "{context} handles unknown event `{}`",
                    handler.event
                ))
            })?;
            for (from, _) in &handler.fields {
                if !event.params.iter().any(|p| &p.name == from) {
                    return Err(ContractClientError::construction(format!(
                        "event `{}` has no field `{from}`",
                        event.name
                    )));
                }
            }
            event_handlers.push(EventHandler {
                event,
                source,
                fields: handler.fields.clone(),
            });
        }

        Ok(OperationDescriptor {
            name: self.name.clone(),
            function_name,
            input,
            output,
            default_values: normalized_defaults,
            validate_empty: self.validate_empty.clone(),
            event_handlers,
            echo_inputs: self.echo_inputs.clone(),
        })
    }
}

fn resolve_params(registry: &TypeRegistry, specs: &[ParamSpec], context: &str) -> Result<Vec<Param>> {
    let mut seen = HashSet::new();
    let mut params = Vec::with_capacity(specs.len());

    for spec in specs {
        if spec.name.is_empty() {
            return Err(ContractClientError::construction(format!(
                "{context} has an unnamed parameter"
            )));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(ContractClientError::construction(format!(
                "{context} declares `{}` twice",
                spec.name
            )));
        }
        let ty = registry.resolve(&spec.type_tag).ok_or_else(|| {
            ContractClientError::construction(format!(
                "{context} parameter `{}` has unknown type `{}`",
                spec.name, spec.type_tag
            ))
        })?;
        params.push(Param {
            name: spec.name.clone(),
            type_tag: spec.type_tag.clone(),
            ty: ty.clone(),
        });
    }

    Ok(params)
}

/// Validated, immutable declaration of one operation.
pub struct OperationDescriptor {
    pub name: String,
    pub function_name: String,
    pub input: Vec<Param>,
    pub output: Vec<Param>,
    pub default_values: Values,
    pub validate_empty: Option<ValidateEmptyFn>,
    pub event_handlers: Vec<EventHandler>,
    pub echo_inputs: Vec<(String, String)>,
}

impl OperationDescriptor {
    /// Explicit values win over defaults.
    pub fn merge_defaults(&self, input: &Values) -> Values {
        let mut merged = self.default_values.clone();
        merged.extend(input.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub async fn check_preconditions(&self, client: &ContractClient, merged: &Values) -> Result<()> {
        let Some(validate_empty) = &self.validate_empty else {
            return Ok(());
        };

        match validate_empty(client.clone(), merged.clone()).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ContractClientError::Precondition(format!(
                "precondition for `{}` is not satisfied",
                self.name
            ))),
            Err(e) => Err(ContractClientError::Precondition(e.to_string())),
        }
    }

    /// Positional wire arguments in input declaration order.
    pub fn encode_inputs(&self, merged: &Values) -> Result<Vec<WireValue>> {
        encode_params(&self.input, merged)
    }

    pub fn decode_outputs(&self, raw: &[WireValue], merged: &Values) -> Result<Values> {
        if raw.len() != self.output.len() {
            return Err(ContractClientError::Decoding(format!(
                "`{}` returned {} values, {} declared",
                self.function_name,
                raw.len(),
                self.output.len()
            )));
        }

        let mut outputs = self.echoed_inputs(merged);
        for (param, wire) in self.output.iter().zip(raw) {
            let value = param.ty.decode(wire).map_err(|e| {
                ContractClientError::Decoding(format!("output `{}`: {}", param.name, e))
            })?;
            outputs.insert(param.name.clone(), value);
        }

        debug!(operation = %self.name, outputs = outputs.len(), "Decoded call result");
        Ok(outputs)
    }

    pub fn echoed_inputs(&self, merged: &Values) -> Values {
        self.echo_inputs
            .iter()
            .filter_map(|(from, to)| merged.get(from).map(|v| (to.clone(), v.clone())))
            .collect()
    }
}

pub(crate) fn encode_params(params: &[Param], merged: &Values) -> Result<Vec<WireValue>> {
    params
        .iter()
        .map(|param| {
            let value = merged
                .get(&param.name)
                .ok_or_else(|| ContractClientError::invalid_input(&param.name, "missing value"))?;
            param.ty.encode(value).map_err(|e| match e {
                ContractClientError::Encoding { reason, .. } => {
                    ContractClientError::invalid_input(&param.name, reason)
                }
                other => other,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn resolve(spec: &OperationSpec) -> Result<OperationDescriptor> {
        spec.resolve(&TypeRegistry::with_defaults(), &HashMap::new(), &HashMap::new())
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let spec = OperationSpec::new("getTaskRole").input([("taskId", "number"), ("taskId", "role")]);
        assert!(matches!(resolve(&spec), Err(ContractClientError::Construction(_))));

        let spec = OperationSpec::new("getTaskRole")
            .output([("address", "address"), ("address", "boolean")]);
        assert!(matches!(resolve(&spec), Err(ContractClientError::Construction(_))));
    }

    #[test]
    fn test_rejects_unknown_type_and_empty_function() {
        let spec = OperationSpec::new("getTask").input([("taskId", "uint")]);
        assert!(matches!(resolve(&spec), Err(ContractClientError::Construction(_))));

        let spec = OperationSpec::new("getTask").function_name("");
        assert!(matches!(resolve(&spec), Err(ContractClientError::Construction(_))));
    }

    #[test]
    fn test_rejects_bad_defaults() {
        let spec = OperationSpec::new("createTask").default_value("domainId", 1u64);
        assert!(resolve(&spec).is_err());

        let spec = OperationSpec::new("createTask")
            .input([("domainId", "number")])
            .default_value("domainId", "one");
        assert!(resolve(&spec).is_err());
    }

    #[test]
    fn test_rejects_unknown_event() {
        let spec = OperationSpec::new("createTask").event_handler(EventHandlerSpec::own("TaskAdded"));
        assert!(resolve(&spec).is_err());
    }

    #[test]
    fn test_merge_and_encode() -> Result<()> {
        let spec = OperationSpec::new("moveFundsBetweenPots")
            .input_param(ParamSpec::new("fromPot", "number").with_default(1u64))
            .input([("toPot", "number"), ("amount", "bigNumber")]);
        let descriptor = resolve(&spec)?;

        let merged = descriptor.merge_defaults(&crate::types::values([
            ("toPot", Value::from(2u64)),
            ("amount", Value::from("500")),
        ]));
        let args = descriptor.encode_inputs(&merged)?;
        assert_eq!(
            args,
            vec![
                WireValue::Uint(U256::from(1u8)),
                WireValue::Uint(U256::from(2u8)),
                WireValue::Uint(U256::from(500u16)),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_encode_names_offending_field() -> Result<()> {
        let descriptor = resolve(&OperationSpec::new("setOwner").input([("user", "address")]))?;

        let merged = crate::types::values([("user", "not-an-address")]);
        match descriptor.encode_inputs(&merged) {
            Err(ContractClientError::InvalidInput { field, .. }) => assert_eq!(field, "user"),
            other => panic!("unexpected {other:?}"),
        }

        match descriptor.encode_inputs(&Values::new()) {
            Err(ContractClientError::InvalidInput { field, reason }) => {
                assert_eq!(field, "user");
                assert_eq!(reason, "missing value");
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_decode_length_mismatch() -> Result<()> {
        let descriptor = resolve(
            &OperationSpec::new("getDomain").output([("localSkillId", "number"), ("potId", "number")]),
        )?;

        let short = [WireValue::Uint(U256::from(1u8))];
        assert!(matches!(
            descriptor.decode_outputs(&short, &Values::new()),
            Err(ContractClientError::Decoding(_))
        ));

        let long = [
            WireValue::Uint(U256::from(1u8)),
            WireValue::Uint(U256::from(2u8)),
            WireValue::Uint(U256::from(3u8)),
        ];
        assert!(matches!(
            descriptor.decode_outputs(&long, &Values::new()),
            Err(ContractClientError::Decoding(_))
        ));
        Ok(())
    }
}
