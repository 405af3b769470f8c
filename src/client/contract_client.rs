use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use alloy_primitives::Address;
use tracing::{debug, info};

use super::{
    adapter::ChainAdapter,
    caller::Caller,
    config::ClientConfig,
    descriptor::{
        ContractContext, EventSpec, OperationDescriptor, OperationSpec, ResolveSigneesFn,
        ValidateEmptyFn,
    },
    events::ContractEvent,
    multisig::{MultisigDescriptor, MultisigSender, MultisigSpec, SigneeSpec},
    sender::Sender,
    table::{DescriptorTable, TableOperation},
};
use crate::{
    error::{ContractClientError, Result},
    types::{Values, WireValue, event::SendResult, registry::TypeRegistry},
};

pub(crate) enum Operation {
    Caller(Arc<OperationDescriptor>),
    Sender(Arc<OperationDescriptor>),
    Multisig(Arc<MultisigDescriptor>),
}

impl Operation {
    fn kind(&self) -> &'static str {
        match self {
            Operation::Caller(_) => "caller",
            Operation::Sender(_) => "sender",
            Operation::Multisig(_) => "multisig sender",
        }
    }
}

struct ClientInner {
    config: ClientConfig,
    context: Arc<ContractContext>,
    adapter: Arc<dyn ChainAdapter>,
    registry: TypeRegistry,
    operations: HashMap<String, Operation>,
}

/// Typed access to one deployed contract. Cloning is cheap and every clone
/// shares the same read-only descriptor table.
#[derive(Clone)]
pub struct ContractClient {
    inner: Arc<ClientInner>,
}

impl ContractClient {
    pub fn builder(config: ClientConfig, adapter: Arc<dyn ChainAdapter>) -> ClientBuilder {
        ClientBuilder::new(config, adapter)
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn address(&self) -> Address {
        self.inner.context.address
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn adapter(&self) -> &Arc<dyn ChainAdapter> {
        &self.inner.adapter
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    pub(crate) fn context(&self) -> &Arc<ContractContext> {
        &self.inner.context
    }

    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.inner.operations.keys().map(String::as_str)
    }

    fn operation(&self, name: &str) -> Result<&Operation> {
        self.inner
            .operations
            .get(name)
            .ok_or_else(|| ContractClientError::UnknownOperation(name.to_string()))
    }

    fn wrong_kind(&self, name: &str, operation: &Operation, wanted: &str) -> ContractClientError {
        ContractClientError::UnknownOperation(format!(
            "{name} (a {}, not a {wanted})",
            operation.kind()
        ))
    }

    pub fn caller(&self, name: &str) -> Result<Caller> {
        match self.operation(name)? {
            Operation::Caller(descriptor) => Ok(Caller::new(self.clone(), descriptor.clone())),
            other => Err(self.wrong_kind(name, other, "caller")),
        }
    }

    pub fn sender(&self, name: &str) -> Result<Sender> {
        match self.operation(name)? {
            Operation::Sender(descriptor) => Ok(Sender::new(self.clone(), descriptor.clone())),
            other => Err(self.wrong_kind(name, other, "sender")),
        }
    }

    pub fn multisig(&self, name: &str) -> Result<MultisigSender> {
        match self.operation(name)? {
            Operation::Multisig(descriptor) => {
                Ok(MultisigSender::new(self.clone(), descriptor.clone()))
            }
            other => Err(self.wrong_kind(name, other, "multisig sender")),
        }
    }

    pub fn event(&self, name: &str) -> Result<ContractEvent> {
        let descriptor = self
            .inner
            .context
            .events
            .get(name)
            .cloned()
            .ok_or_else(|| ContractClientError::UnknownOperation(format!("event {name}")))?;
        Ok(ContractEvent::new(self.clone(), descriptor))
    }

    pub async fn call(&self, name: &str, input: Values) -> Result<Values> {
        self.caller(name)?.call(input).await
    }

    pub async fn send(&self, name: &str, input: Values) -> Result<SendResult> {
        self.sender(name)?.send(input).await
    }

    pub(crate) async fn read_raw(&self, function_name: &str, args: &[WireValue]) -> Result<Vec<WireValue>> {
        debug!(
            contract = %self.address(),
            function = function_name,
            args = args.len(),
            "Reading contract"
        );

        self.inner
            .adapter
            .read(self.address(), function_name, args)
            .await
            .map_err(|source| ContractClientError::CallFailed {
                function: function_name.to_string(),
                source,
            })
    }
}

enum PendingOperation {
    Caller(OperationSpec),
    Sender(OperationSpec),
    Multisig(OperationSpec, MultisigSpec),
}

impl PendingOperation {
    fn spec_mut(&mut self) -> &mut OperationSpec {
        match self {
            PendingOperation::Caller(spec)
            | PendingOperation::Sender(spec)
            | PendingOperation::Multisig(spec, _) => spec,
        }
    }

    fn name(&self) -> &str {
        match self {
            PendingOperation::Caller(spec)
            | PendingOperation::Sender(spec)
            | PendingOperation::Multisig(spec, _) => &spec.name,
        }
    }
}

/// Collects descriptors and hooks, then validates all of them at once in
/// `build`.
pub struct ClientBuilder {
    config: ClientConfig,
    adapter: Arc<dyn ChainAdapter>,
    registry: TypeRegistry,
    events: Vec<EventSpec>,
    operations: Vec<PendingOperation>,
    related: HashMap<String, Weak<ContractContext>>,
    validators: Vec<(String, ValidateEmptyFn)>,
    resolvers: Vec<(String, ResolveSigneesFn)>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig, adapter: Arc<dyn ChainAdapter>) -> Self {
        Self {
            config,
            adapter,
            registry: TypeRegistry::with_defaults(),
            events: Vec::new(),
            operations: Vec::new(),
            related: HashMap::new(),
            validators: Vec::new(),
            resolvers: Vec::new(),
        }
    }

    pub fn registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn event(mut self, spec: EventSpec) -> Self {
        self.events.push(spec);
        self
    }

    pub fn caller(mut self, spec: OperationSpec) -> Self {
        self.operations.push(PendingOperation::Caller(spec));
        self
    }

    pub fn sender(mut self, spec: OperationSpec) -> Self {
        self.operations.push(PendingOperation::Sender(spec));
        self
    }

    pub fn multisig_sender(mut self, spec: OperationSpec, multisig: MultisigSpec) -> Self {
        self.operations.push(PendingOperation::Multisig(spec, multisig));
        self
    }

    pub fn table(mut self, table: DescriptorTable) -> Result<Self> {
        let parts = table.into_parts()?;
        self.events.extend(parts.events);
        self.operations
            .extend(parts.operations.into_iter().map(|operation| match operation {
                TableOperation::Caller(spec) => PendingOperation::Caller(spec),
                TableOperation::Sender(spec) => PendingOperation::Sender(spec),
                TableOperation::Multisig(spec, multisig) => PendingOperation::Multisig(spec, multisig),
            }));
        Ok(self)
    }

    /// Makes `client`'s events available to handlers declared with
    /// `EventHandlerSpec::related(name, ..)`.
    pub fn related(mut self, name: impl Into<String>, client: &ContractClient) -> Self {
        self.related
            .insert(name.into(), Arc::downgrade(client.context()));
        self
    }

    pub fn validate_empty(mut self, operation: impl Into<String>, hook: ValidateEmptyFn) -> Self {
        self.validators.push((operation.into(), hook));
        self
    }

    pub fn signee_resolver(mut self, operation: impl Into<String>, resolver: ResolveSigneesFn) -> Self {
        self.resolvers.push((operation.into(), resolver));
        self
    }

    pub fn build(mut self) -> Result<ContractClient> {
        let mut events = HashMap::new();
        for spec in &self.events {
            let descriptor = spec.resolve(&self.registry)?;
            if events
                .insert(descriptor.name.clone(), Arc::new(descriptor))
                .is_some()
            {
                return Err(ContractClientError::construction(format!(
                    "event `{}` declared twice",
                    spec.name
                )));
            }
        }

        for (operation, hook) in std::mem::take(&mut self.validators) {
            let pending = self
                .operations
                .iter_mut()
                .find(|p| p.name() == operation)
                .ok_or_else(|| {
                    ContractClientError::construction(format!(
                        "validator for unknown operation `{operation}`"
                    ))
                })?;
            pending.spec_mut().validate_empty = Some(hook);
        }

        for (operation, resolver) in std::mem::take(&mut self.resolvers) {
            let pending = self
                .operations
                .iter_mut()
                .find(|p| p.name() == operation)
                .ok_or_else(|| {
                    ContractClientError::construction(format!(
                        "signee resolver for unknown operation `{operation}`"
                    ))
                })?;
            match pending {
                PendingOperation::Multisig(_, multisig) => {
                    multisig.signees = Some(SigneeSpec::Custom(resolver));
                }
                _ => {
                    return Err(ContractClientError::construction(format!(
                        "signee resolver for `{operation}`, which is not a multisig sender"
                    )));
                }
            }
        }

        let mut operations = HashMap::new();
        for pending in &self.operations {
            let operation = match pending {
                PendingOperation::Caller(spec) => Operation::Caller(Arc::new(spec.resolve(
                    &self.registry,
                    &events,
                    &self.related,
                )?)),
                PendingOperation::Sender(spec) => Operation::Sender(Arc::new(spec.resolve(
                    &self.registry,
                    &events,
                    &self.related,
                )?)),
                PendingOperation::Multisig(spec, multisig) => {
                    let base = spec.resolve(&self.registry, &events, &self.related)?;
                    Operation::Multisig(Arc::new(multisig.resolve(base, &self.registry)?))
                }
            };
            if operations
                .insert(pending.name().to_string(), operation)
                .is_some()
            {
                return Err(ContractClientError::construction(format!(
                    "operation `{}` declared twice",
                    pending.name()
                )));
            }
        }

        // Signee lookups go through callers of this same client.
        for operation in operations.values() {
            if let Operation::Multisig(descriptor) = operation {
                if let Some(caller) = descriptor.signee_caller() {
                    let Some(Operation::Caller(lookup)) = operations.get(caller) else {
                        return Err(ContractClientError::construction(format!(
                            "`{}` resolves signees through `{caller}`, which is not a caller",
                            descriptor.base.name
                        )));
                    };
                    descriptor.check_signee_caller(lookup)?;
                }
            }
        }

        let context = Arc::new(ContractContext {
            name: self.config.name.clone(),
            address: self.config.contract_address,
            events,
        });

        info!(
            contract = %context.address,
            name = %context.name,
            operations = operations.len(),
            events = context.events.len(),
            "Contract client initialized"
        );

        Ok(ContractClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                context,
                adapter: self.adapter,
                registry: self.registry,
                operations,
            }),
        })
    }
}
