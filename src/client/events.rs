use std::{sync::Arc, time::Duration};

use futures::{Stream, stream};
use tracing::debug;

use super::{contract_client::ContractClient, descriptor::EventDescriptor};
use crate::{
    error::{ContractClientError, Result},
    helpers::events::decode_log,
    types::event::{BlockRange, DecodedEvent},
};

/// Decoded view over one event of a contract.
#[derive(Clone)]
pub struct ContractEvent {
    client: ContractClient,
    descriptor: Arc<EventDescriptor>,
}

impl ContractEvent {
    pub(crate) fn new(client: ContractClient, descriptor: Arc<EventDescriptor>) -> Self {
        Self { client, descriptor }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub async fn query(&self, range: BlockRange) -> Result<Vec<DecodedEvent>> {
        let logs = self
            .client
            .adapter()
            .get_logs(self.client.address(), &self.descriptor.name, range)
            .await
            .map_err(|source| ContractClientError::CallFailed {
                function: format!("getLogs({})", self.descriptor.name),
                source,
            })?;

        let mut events = logs
            .iter()
            .filter(|log| log.address == self.client.address() && log.event == self.descriptor.name)
            .map(|log| decode_log(&self.descriptor, log))
            .collect::<Result<Vec<_>>>()?;
        events.sort_by_key(|e| (e.block_number, e.log_index));

        debug!(
            event = %self.descriptor.name,
            from = range.from,
            to = range.to,
            found = events.len(),
            "Queried events"
        );
        Ok(events)
    }

    /// Events of the last `default_block_range` blocks.
    pub async fn query_recent(&self) -> Result<Vec<DecodedEvent>> {
        let latest = self.latest_block().await?;
        self.query(BlockRange::latest(latest, self.client.config().default_block_range))
            .await
    }

    pub fn subscribe(&self, from_block: u64) -> EventSubscription {
        EventSubscription {
            event: self.clone(),
            next_block: from_block,
        }
    }

    async fn latest_block(&self) -> Result<u64> {
        self.client
            .adapter()
            .block_number()
            .await
            .map_err(|source| ContractClientError::CallFailed {
                function: "blockNumber".to_string(),
                source,
            })
    }
}

/// Cursor over new events. Each `poll` returns the events of the blocks
/// confirmed since the previous one.
pub struct EventSubscription {
    event: ContractEvent,
    next_block: u64,
}

impl EventSubscription {
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    pub async fn poll(&mut self) -> Result<Vec<DecodedEvent>> {
        let latest = self.event.latest_block().await?;
        if latest < self.next_block {
            return Ok(Vec::new());
        }

        let events = self
            .event
            .query(BlockRange::new(self.next_block, latest))
            .await?;
        self.next_block = latest + 1;
        Ok(events)
    }

    /// Polls every `interval` and yields events one at a time. An error is
    /// yielded once and the stream continues from the same block.
    pub fn into_stream(self, interval: Duration) -> impl Stream<Item = Result<DecodedEvent>> {
        let pending: Vec<DecodedEvent> = Vec::new();
        stream::unfold(
            (self, pending.into_iter(), true),
            move |(mut subscription, mut pending, first)| async move {
                let mut first = first;
                loop {
                    if let Some(event) = pending.next() {
                        return Some((Ok(event), (subscription, pending, first)));
                    }
                    if !first {
                        tokio::time::sleep(interval).await;
                    }
                    first = false;
                    match subscription.poll().await {
                        Ok(events) => pending = events.into_iter(),
                        Err(e) => return Some((Err(e), (subscription, pending, first))),
                    }
                }
            },
        )
    }
}
