use std::sync::Arc;

use super::{contract_client::ContractClient, descriptor::OperationDescriptor};
use crate::{error::Result, types::Values};

/// Read-only operation. Calls have no side effects and can be retried or
/// issued concurrently.
#[derive(Clone)]
pub struct Caller {
    client: ContractClient,
    descriptor: Arc<OperationDescriptor>,
}

impl Caller {
    pub(crate) fn new(client: ContractClient, descriptor: Arc<OperationDescriptor>) -> Self {
        Self { client, descriptor }
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub async fn call(&self, input: Values) -> Result<Values> {
        let descriptor = &self.descriptor;

        let merged = descriptor.merge_defaults(&input);
        descriptor.check_preconditions(&self.client, &merged).await?;
        let args = descriptor.encode_inputs(&merged)?;

        let raw = self.client.read_raw(&descriptor.function_name, &args).await?;

        descriptor.decode_outputs(&raw, &merged)
    }
}
