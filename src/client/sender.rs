use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use super::{
    adapter::CollectedSignature, contract_client::ContractClient, descriptor::OperationDescriptor,
};
use crate::{
    error::{ContractClientError, Result},
    helpers::events::scan_receipt,
    types::{
        Values, WireValue,
        event::{ReceiptMeta, SendResult},
    },
};

/// State-changing operation. Every successful `send` makes exactly one
/// submission; nothing is retried here.
#[derive(Clone)]
pub struct Sender {
    client: ContractClient,
    descriptor: Arc<OperationDescriptor>,
}

impl Sender {
    pub(crate) fn new(client: ContractClient, descriptor: Arc<OperationDescriptor>) -> Self {
        Self { client, descriptor }
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub async fn send(&self, input: Values) -> Result<SendResult> {
        let descriptor = &self.descriptor;

        let merged = descriptor.merge_defaults(&input);
        descriptor.check_preconditions(&self.client, &merged).await?;
        let args = descriptor.encode_inputs(&merged)?;

        submit(
            &self.client,
            descriptor,
            &descriptor.function_name,
            &args,
            None,
            &merged,
        )
        .await
    }
}

/// Submits `args` to `function_name`, waits for the receipt and builds the
/// result from the echoed inputs and the descriptor's event handlers.
pub(crate) async fn submit(
    client: &ContractClient,
    descriptor: &OperationDescriptor,
    function_name: &str,
    args: &[WireValue],
    signatures: Option<&[CollectedSignature]>,
    merged: &Values,
) -> Result<SendResult> {
    debug!(
        contract = %client.address(),
        function = function_name,
        signatures = signatures.map_or(0, <[_]>::len),
        "Submitting transaction"
    );

    let receipt = client
        .adapter()
        .submit(client.address(), function_name, args, signatures)
        .await
        .map_err(|source| ContractClientError::SendFailed {
            function: function_name.to_string(),
            source,
        })?;

    if !receipt.is_success() {
        return Err(ContractClientError::SendFailed {
            function: function_name.to_string(),
            source: anyhow!("transaction {} reverted", receipt.transaction_hash),
        });
    }

    let (event_fields, events) = scan_receipt(client.context(), &descriptor.event_handlers, &receipt)?;

    let mut outputs = descriptor.echoed_inputs(merged);
    outputs.extend(event_fields);

    for param in &descriptor.output {
        if !outputs.contains_key(&param.name) {
            warn!(
                operation = %descriptor.name,
                output = %param.name,
                "Declared output not found in transaction events"
            );
        }
    }

    info!(
        operation = %descriptor.name,
        tx = %receipt.transaction_hash,
        block = receipt.block_number,
        events = events.len(),
        "Transaction confirmed"
    );

    Ok(SendResult {
        outputs,
        receipt: ReceiptMeta {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        },
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{
            config::ClientConfig,
            descriptor::{EventHandlerSpec, EventSpec, OperationSpec},
        },
        testing::{MemoryAdapter, log_data},
        types::{Value, values},
    };
    use alloy_primitives::{Address, U256};

    const COLONY: Address = Address::new([0xc0; 20]);
    const TOKEN: Address = Address::new([0x70; 20]);

    fn uint(n: u64) -> WireValue {
        WireValue::Uint(U256::from(n))
    }

    fn colony(adapter: Arc<MemoryAdapter>, token: &ContractClient) -> ContractClient {
        ContractClient::builder(ClientConfig::new("colony", COLONY), adapter)
            .related("token", token)
            .event(EventSpec::new("TaskAdded", [("id", "number")]))
            .event(EventSpec::new("PotAdded", [("id", "number")]))
            .sender(
                OperationSpec::new("createTask")
                    .input([("specificationHash", "ipfsHash"), ("domainId", "number")])
                    .output([("taskId", "number")])
                    .default_value("domainId", 1u64)
                    .event_handler(EventHandlerSpec::own("TaskAdded").field("id", "taskId")),
            )
            .sender(
                OperationSpec::new("addDomain")
                    .input([("parentSkillId", "number")])
                    .output([("id", "number")])
                    .event_handler(EventHandlerSpec::own("TaskAdded"))
                    .event_handler(EventHandlerSpec::own("PotAdded")),
            )
            .sender(
                OperationSpec::new("mintTokens")
                    .input([("amount", "bigNumber")])
                    .output([("minted", "bigNumber")])
                    .event_handler(
                        EventHandlerSpec::related("token", "Mint").field("amount", "minted"),
                    ),
            )
            .build()
            .unwrap()
    }

    fn token(adapter: Arc<MemoryAdapter>) -> ContractClient {
        ContractClient::builder(ClientConfig::new("token", TOKEN), adapter)
            .event(EventSpec::new("Mint", [("address", "address"), ("amount", "bigNumber")]))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_merges_event_fields() -> Result<()> {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.emit_on_submit("createTask", COLONY, "TaskAdded", log_data(&[uint(4)]));
        let token = token(adapter.clone());

        let result = colony(adapter.clone(), &token)
            .send(
                "createTask",
                values([("specificationHash", "QmcNbGg6EVfFn2Z1QxWauR9XY9KhnEcyb5DUXCXHi8pwMJ")]),
            )
            .await?;

        assert_eq!(result.outputs, values([("taskId", 4u64)]));
        assert_eq!(result.events.len(), 1);

        let submissions = adapter.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].function_name, "createTask");
        assert_eq!(submissions[0].args[1], uint(1));
        assert!(submissions[0].signatures.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_last_handler_wins_on_collision() -> Result<()> {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.emit_on_submit("addDomain", COLONY, "TaskAdded", log_data(&[uint(1)]));
        adapter.emit_on_submit("addDomain", COLONY, "PotAdded", log_data(&[uint(9)]));
        let token = token(adapter.clone());

        let result = colony(adapter, &token)
            .send("addDomain", values([("parentSkillId", 1u64)]))
            .await?;
        assert_eq!(result.outputs.get("id"), Some(&Value::Number(9)));
        Ok(())
    }

    #[tokio::test]
    async fn test_related_contract_event() -> Result<()> {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.emit_on_submit(
            "mintTokens",
            TOKEN,
            "Mint",
            log_data(&[WireValue::Address(COLONY), uint(1_000)]),
        );
        // Same event name from the wrong contract is ignored.
        adapter.emit_on_submit(
            "mintTokens",
            COLONY,
            "Mint",
            log_data(&[WireValue::Address(COLONY), uint(5)]),
        );
        let token = token(adapter.clone());

        let result = colony(adapter, &token)
            .send("mintTokens", values([("amount", "1000")]))
            .await?;
        assert_eq!(
            result.outputs.get("minted"),
            Some(&Value::BigNumber(U256::from(1_000u32)))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_reverted_transaction_is_send_failed() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.revert_on("addDomain");
        let token = token(adapter.clone());

        let result = colony(adapter.clone(), &token)
            .send("addDomain", values([("parentSkillId", 1u64)]))
            .await;
        match result {
            Err(e @ ContractClientError::SendFailed { .. }) => assert!(e.is_retryable()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(adapter.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_never_submitted() {
        let adapter = Arc::new(MemoryAdapter::new());
        let token = token(adapter.clone());

        let result = colony(adapter.clone(), &token)
            .send("createTask", values([("specificationHash", "not-a-hash")]))
            .await;
        assert!(matches!(result, Err(ContractClientError::InvalidInput { .. })));
        assert!(adapter.submissions().is_empty());
    }
}
