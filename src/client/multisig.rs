use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use alloy_primitives::{Address, B256, Signature, hex, keccak256};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    adapter::CollectedSignature,
    contract_client::ContractClient,
    descriptor::{OperationDescriptor, Param, ResolveSigneesFn, encode_params},
    sender,
};
use crate::{
    basic_elements::{
        args::{Args, encode_call_data},
        keys::{PayloadSigner, recover_signer, signature_from_bytes, signature_to_bytes},
    },
    error::{ContractClientError, Result},
    types::{
        Value, Values, WireValue,
        event::SendResult,
        registry::{ParamType, TypeRegistry, is_valid_address},
    },
};

/// How the required co-signers of an operation are found.
#[derive(Clone)]
pub enum SigneeSpec {
    /// One `caller` invocation per role, with the role name passed as
    /// `role_input`; the signee is the `address_output` of each result.
    Roles {
        caller: String,
        roles: Vec<String>,
        role_input: String,
        address_output: String,
    },
    Custom(ResolveSigneesFn),
}

#[derive(Clone)]
pub struct MultisigSpec {
    pub function_name: String,
    pub nonce_function: String,
    pub nonce_inputs: Vec<String>,
    pub signees: Option<SigneeSpec>,
}

impl MultisigSpec {
    /// `function_name` is the contract entry point that executes a signed
    /// change; `nonce_function` returns the current change nonce.
    pub fn new(function_name: impl Into<String>, nonce_function: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            nonce_function: nonce_function.into(),
            nonce_inputs: Vec::new(),
            signees: None,
        }
    }

    pub fn nonce_input(mut self, name: impl Into<String>) -> Self {
        self.nonce_inputs.push(name.into());
        self
    }

    pub fn signees_by_role<R: Into<String>>(
        mut self,
        caller: impl Into<String>,
        roles: impl IntoIterator<Item = R>,
        address_output: impl Into<String>,
    ) -> Self {
        self.signees = Some(SigneeSpec::Roles {
            caller: caller.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            role_input: "role".to_string(),
            address_output: address_output.into(),
        });
        self
    }

    pub fn signee_resolver(mut self, resolver: ResolveSigneesFn) -> Self {
        self.signees = Some(SigneeSpec::Custom(resolver));
        self
    }

    pub(crate) fn resolve(
        &self,
        base: OperationDescriptor,
        registry: &TypeRegistry,
    ) -> Result<MultisigDescriptor> {
        let context = format!("multisig operation `{}`", base.name);

        if self.function_name.is_empty() || self.nonce_function.is_empty() {
            return Err(ContractClientError::construction(format!(
                "{context} needs both an execute function and a nonce function"
            )));
        }

        let nonce_inputs = self
            .nonce_inputs
            .iter()
            .map(|name| {
                base.input
                    .iter()
                    .find(|p| &p.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        ContractClientError::construction(format!(
                            "{context} keys its nonce by undeclared input `{name}`"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let signees = self.signees.clone().ok_or_else(|| {
            ContractClientError::construction(format!("{context} has no signee resolver"))
        })?;

        if let SigneeSpec::Roles { roles, .. } = &signees {
            let Some(ParamType::Enum(role_type)) = registry.resolve("role") else {
                return Err(ContractClientError::construction(
                    "the `role` type is not an enumeration",
                ));
            };
            if roles.is_empty() {
                return Err(ContractClientError::construction(format!(
                    "{context} names no signing roles"
                )));
            }
            if let Some(unknown) = roles.iter().find(|r| role_type.value_of(r).is_none()) {
                return Err(ContractClientError::construction(format!(
                    "{context} names unknown role `{unknown}`"
                )));
            }
        }

        Ok(MultisigDescriptor {
            base,
            multisig_function_name: self.function_name.clone(),
            nonce_function: self.nonce_function.clone(),
            nonce_inputs,
            signees,
        })
    }
}

pub struct MultisigDescriptor {
    pub base: OperationDescriptor,
    pub multisig_function_name: String,
    pub nonce_function: String,
    pub nonce_inputs: Vec<Param>,
    pub signees: SigneeSpec,
}

impl MultisigDescriptor {
    pub(crate) fn signee_caller(&self) -> Option<&str> {
        match &self.signees {
            SigneeSpec::Roles { caller, .. } => Some(caller),
            SigneeSpec::Custom(_) => None,
        }
    }

    /// The role lookup must take an enumerated role and return an address.
    pub(crate) fn check_signee_caller(&self, caller: &OperationDescriptor) -> Result<()> {
        let SigneeSpec::Roles {
            role_input,
            address_output,
            ..
        } = &self.signees
        else {
            return Ok(());
        };
        let context = format!("`{}` resolves signees through `{}`", self.base.name, caller.name);

        match caller.input.iter().find(|p| &p.name == role_input) {
            Some(Param {
                ty: ParamType::Enum(_),
                ..
            }) => {}
            Some(param) => {
                return Err(ContractClientError::construction(format!(
                    "{context}, whose `{role_input}` input is `{}`, not an enumeration",
                    param.type_tag
                )));
            }
            None => {
                return Err(ContractClientError::construction(format!(
                    "{context}, which has no `{role_input}` input"
                )));
            }
        }

        match caller.output.iter().find(|p| &p.name == address_output) {
            Some(Param {
                ty: ParamType::Address | ParamType::TokenAddress,
                ..
            }) => Ok(()),
            _ => Err(ContractClientError::construction(format!(
                "{context}, which returns no `{address_output}` address"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultisigStatus {
    Building,
    AwaitingSignatures,
    Ready,
    Submitted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigState {
    pub nonce: u64,
    pub required_signees: BTreeSet<Address>,
    pub collected_signatures: BTreeMap<Address, Signature>,
    pub payload_hash: B256,
}

impl MultisigState {
    pub fn missing_signees(&self) -> Vec<Address> {
        self.required_signees
            .iter()
            .filter(|&a| !self.collected_signatures.contains_key(a))
            .copied()
            .collect()
    }

    pub fn has_quorum(&self) -> bool {
        self.required_signees
            .iter()
            .all(|a| self.collected_signatures.contains_key(a))
    }
}

/// Hash every co-signer signs: the contract address, the packed call data
/// of the wrapped function and the nonce.
pub fn payload_hash(contract: Address, call_data: &[u8], nonce: u64) -> B256 {
    let payload = Args::new()
        .add_address(&contract)
        .add_bytes(call_data)
        .add_u64(nonce)
        .serialize();
    keccak256(payload)
}

#[derive(Serialize, Deserialize)]
struct ExportedSignature {
    signer: Address,
    signature: String,
}

#[derive(Serialize, Deserialize)]
struct ExportedOperation {
    operation: String,
    input: Values,
    nonce: u64,
    payload_hash: B256,
    signatures: Vec<ExportedSignature>,
}

/// Entry point of a multisig operation: starts fresh signing rounds or
/// restores exported ones.
#[derive(Clone)]
pub struct MultisigSender {
    client: ContractClient,
    descriptor: Arc<MultisigDescriptor>,
}

impl MultisigSender {
    pub(crate) fn new(client: ContractClient, descriptor: Arc<MultisigDescriptor>) -> Self {
        Self { client, descriptor }
    }

    pub fn descriptor(&self) -> &MultisigDescriptor {
        &self.descriptor
    }

    /// Validates the input, resolves the required signees and reads the
    /// current nonce.
    pub async fn start(&self, input: Values) -> Result<MultisigOperation> {
        let name = &self.descriptor.base.name;
        debug!(operation = %name, status = ?MultisigStatus::Building, "Building multisig operation");

        self.build(input).await.inspect_err(|e| {
            warn!(operation = %name, error = %e, "Multisig operation failed while building");
        })
    }

    async fn build(&self, input: Values) -> Result<MultisigOperation> {
        let base = &self.descriptor.base;

        let merged = base.merge_defaults(&input);
        base.check_preconditions(&self.client, &merged).await?;
        let args = base.encode_inputs(&merged)?;

        let required_signees = self.resolve_signees(&merged).await?;
        let nonce = read_nonce(&self.client, &self.descriptor, &merged).await?;

        let call_data = encode_call_data(&base.function_name, &args);
        let payload_hash = payload_hash(self.client.address(), &call_data, nonce);

        let mut operation = MultisigOperation {
            client: self.client.clone(),
            descriptor: self.descriptor.clone(),
            input: merged,
            call_data,
            state: MultisigState {
                nonce,
                required_signees,
                collected_signatures: BTreeMap::new(),
                payload_hash,
            },
            status: MultisigStatus::AwaitingSignatures,
            failure: None,
        };
        operation.refresh_status();

        info!(
            operation = %base.name,
            nonce,
            signees = operation.state.required_signees.len(),
            payload = %payload_hash,
            status = ?operation.status,
            "Multisig operation awaiting signatures"
        );
        Ok(operation)
    }

    async fn resolve_signees(&self, merged: &Values) -> Result<BTreeSet<Address>> {
        let resolved = match &self.descriptor.signees {
            SigneeSpec::Custom(resolver) => resolver(self.client.clone(), merged.clone())
                .await
                .map_err(|source| ContractClientError::CallFailed {
                    function: format!("{} signee resolver", self.descriptor.base.name),
                    source,
                })?,
            SigneeSpec::Roles {
                caller,
                roles,
                role_input,
                address_output,
            } => {
                let caller = self.client.caller(caller)?;
                let lookups = roles.iter().map(|role| {
                    let mut input = merged.clone();
                    input.insert(role_input.clone(), Value::String(role.clone()));
                    let caller = caller.clone();
                    async move { caller.call(input).await }
                });

                try_join_all(lookups)
                    .await?
                    .iter()
                    .filter_map(|output| output.get(address_output).and_then(Value::as_address))
                    .collect()
            }
        };

        Ok(resolved.into_iter().filter(is_valid_address).collect())
    }

    /// Rebuilds an operation from `MultisigOperation::export` output. The
    /// input is validated again, the nonce must not have moved and every
    /// signature is verified again.
    pub async fn restore(&self, exported: &str) -> Result<MultisigOperation> {
        let exported: ExportedOperation = serde_json::from_str(exported)
            .map_err(|e| ContractClientError::invalid_input("exported operation", e))?;

        if exported.operation != self.descriptor.base.name {
            return Err(ContractClientError::UnknownOperation(format!(
                "exported `{}` restored as `{}`",
                exported.operation, self.descriptor.base.name
            )));
        }

        let mut operation = self.start(exported.input).await?;
        if operation.state.nonce != exported.nonce {
            return Err(ContractClientError::StaleNonce {
                expected: exported.nonce,
                current: operation.state.nonce,
            });
        }
        if operation.state.payload_hash != exported.payload_hash {
            return Err(ContractClientError::InvalidSignature(format!(
                "exported payload {} does not match rebuilt payload {}",
                exported.payload_hash, operation.state.payload_hash
            )));
        }

        for entry in exported.signatures {
            let bytes = hex::decode(&entry.signature)
                .map_err(|e| ContractClientError::InvalidSignature(e.to_string()))?;
            let signature = signature_from_bytes(&bytes)
                .map_err(|e| ContractClientError::InvalidSignature(e.to_string()))?;
            operation.add_signature_for(entry.signer, signature)?;
        }

        Ok(operation)
    }

    /// Starts an operation, signs it with every local signer and sends it.
    pub async fn send_with(&self, input: Values, signers: &[&dyn PayloadSigner]) -> Result<SendResult> {
        let mut operation = self.start(input).await?;
        for signer in signers {
            operation.sign_with(*signer)?;
        }
        operation.send().await
    }
}

async fn read_nonce(client: &ContractClient, descriptor: &MultisigDescriptor, merged: &Values) -> Result<u64> {
    let args = encode_params(&descriptor.nonce_inputs, merged)?;
    let raw = client.read_raw(&descriptor.nonce_function, &args).await?;

    let [wire] = raw.as_slice() else {
        return Err(ContractClientError::Decoding(format!(
            "`{}` returned {} values, expected the nonce",
            descriptor.nonce_function,
            raw.len()
        )));
    };

    ParamType::Number
        .decode(wire)?
        .as_u64()
        .ok_or_else(|| ContractClientError::Decoding("nonce is not a number".to_string()))
}

/// One signing round. Owned by a single invocation and never shared;
/// signatures are only ever added.
pub struct MultisigOperation {
    client: ContractClient,
    descriptor: Arc<MultisigDescriptor>,
    input: Values,
    call_data: Vec<u8>,
    state: MultisigState,
    status: MultisigStatus,
    failure: Option<String>,
}

impl MultisigOperation {
    pub fn status(&self) -> MultisigStatus {
        self.status
    }

    pub fn state(&self) -> &MultisigState {
        &self.state
    }

    pub fn payload_hash(&self) -> B256 {
        self.state.payload_hash
    }

    pub fn nonce(&self) -> u64 {
        self.state.nonce
    }

    pub fn input(&self) -> &Values {
        &self.input
    }

    /// Reason of the failure that moved the operation to `Failed`.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn missing_signees(&self) -> Vec<Address> {
        self.state.missing_signees()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.status {
            MultisigStatus::Submitted => Err(ContractClientError::AlreadySubmitted),
            MultisigStatus::Failed => Err(ContractClientError::Precondition(format!(
                "multisig operation failed: {}",
                self.failure.as_deref().unwrap_or("unknown reason")
            ))),
            _ => Ok(()),
        }
    }

    fn refresh_status(&mut self) {
        if self.status == MultisigStatus::AwaitingSignatures && self.state.has_quorum() {
            self.status = MultisigStatus::Ready;
            info!(
                operation = %self.descriptor.base.name,
                signatures = self.state.collected_signatures.len(),
                "Multisig operation ready"
            );
        }
    }

    /// Adds a signature whose signer is recovered from the payload hash.
    pub fn add_signature(&mut self, signature: Signature) -> Result<MultisigStatus> {
        self.ensure_open()?;
        let signer = self.recover(&signature)?;
        self.accept(signer, signature)
    }

    /// Adds a signature attributed to `signer`; it must recover to that
    /// address.
    pub fn add_signature_for(&mut self, signer: Address, signature: Signature) -> Result<MultisigStatus> {
        self.ensure_open()?;
        let recovered = self.recover(&signature)?;
        if recovered != signer {
            warn!(claimed = %signer, %recovered, "Rejected signature from another key");
            return Err(ContractClientError::InvalidSignature(format!(
                "signature attributed to {signer} was made by {recovered}"
            )));
        }
        self.accept(signer, signature)
    }

    pub fn sign_with(&mut self, signer: &dyn PayloadSigner) -> Result<MultisigStatus> {
        let signature = signer
            .sign(&self.state.payload_hash)
            .map_err(|e| ContractClientError::InvalidSignature(e.to_string()))?;
        self.add_signature_for(signer.address(), signature)
    }

    /// Signs with the key held by the chain adapter.
    pub async fn sign_with_adapter(&mut self) -> Result<MultisigStatus> {
        self.ensure_open()?;
        let signature = self
            .client
            .adapter()
            .sign(self.state.payload_hash)
            .await
            .map_err(|e| ContractClientError::InvalidSignature(e.to_string()))?;
        self.add_signature(signature)
    }

    fn recover(&self, signature: &Signature) -> Result<Address> {
        recover_signer(&self.state.payload_hash, signature).map_err(|e| {
            warn!(operation = %self.descriptor.base.name, error = %e, "Rejected unrecoverable signature");
            ContractClientError::InvalidSignature(e.to_string())
        })
    }

    fn accept(&mut self, signer: Address, signature: Signature) -> Result<MultisigStatus> {
        if !self.state.required_signees.contains(&signer) {
            warn!(
                operation = %self.descriptor.base.name,
                %signer,
                "Rejected signature from non-required signer"
            );
            return Err(ContractClientError::InvalidSignature(format!(
                "{signer} is not a required signee"
            )));
        }

        self.state
            .collected_signatures
            .entry(signer)
            .or_insert(signature);
        debug!(
            operation = %self.descriptor.base.name,
            %signer,
            missing = self.state.missing_signees().len(),
            "Accepted signature"
        );

        self.refresh_status();
        Ok(self.status)
    }

    /// Submits once every required signee has signed. The nonce is read
    /// again first; if it moved the operation fails with `StaleNonce`.
    pub async fn send(&mut self) -> Result<SendResult> {
        self.ensure_open()?;
        if !self.state.has_quorum() {
            return Err(ContractClientError::QuorumNotReached {
                missing: self.state.missing_signees(),
            });
        }

        match self.submit().await {
            Ok(result) => {
                self.status = MultisigStatus::Submitted;
                info!(
                    operation = %self.descriptor.base.name,
                    nonce = self.state.nonce,
                    tx = %result.receipt.transaction_hash,
                    "Multisig operation submitted"
                );
                Ok(result)
            }
            Err(e) => {
                self.status = MultisigStatus::Failed;
                self.failure = Some(e.to_string());
                warn!(operation = %self.descriptor.base.name, error = %e, "Multisig operation failed");
                Err(e)
            }
        }
    }

    async fn submit(&self) -> Result<SendResult> {
        let current = read_nonce(&self.client, &self.descriptor, &self.input).await?;
        if current != self.state.nonce {
            return Err(ContractClientError::StaleNonce {
                expected: self.state.nonce,
                current,
            });
        }

        let signatures: Vec<CollectedSignature> = self
            .state
            .collected_signatures
            .iter()
            .map(|(signer, signature)| CollectedSignature {
                signer: *signer,
                signature: *signature,
            })
            .collect();

        sender::submit(
            &self.client,
            &self.descriptor.base,
            &self.descriptor.multisig_function_name,
            &[WireValue::Bytes(self.call_data.clone())],
            Some(&signatures),
            &self.input,
        )
        .await
    }

    /// JSON snapshot that another party can `restore`, sign and pass on.
    pub fn export(&self) -> Result<String> {
        let exported = ExportedOperation {
            operation: self.descriptor.base.name.clone(),
            input: self.input.clone(),
            nonce: self.state.nonce,
            payload_hash: self.state.payload_hash,
            signatures: self
                .state
                .collected_signatures
                .iter()
                .map(|(signer, signature)| ExportedSignature {
                    signer: *signer,
                    signature: hex::encode_prefixed(signature_to_bytes(signature)),
                })
                .collect(),
        };

        serde_json::to_string(&exported).map_err(|e| ContractClientError::Encoding {
            type_name: "multisig operation".to_string(),
            reason: e.to_string(),
        })
    }
}
