use tracing::{debug, warn};

use crate::{
    basic_elements::args::Args,
    client::descriptor::{ContractContext, EventDescriptor, EventHandler, EventSource},
    error::{ContractClientError, Result},
    types::{
        Values,
        event::{DecodedEvent, RawLog, TransactionReceipt},
    },
};

// Decodes the fields of a log against its event declaration
pub fn decode_log(event: &EventDescriptor, log: &RawLog) -> Result<DecodedEvent> {
    let mut args = Args::from_bytes(log.data.clone());
    let mut fields = Values::new();

    for param in &event.params {
        let wire = args.next_wire_value().map_err(|e| {
            ContractClientError::Decoding(format!(
                "event `{}` field `{}`: {}",
                event.name, param.name, e
            ))
        })?;
        let value = param.ty.decode(&wire).map_err(|e| {
            ContractClientError::Decoding(format!(
                "event `{}` field `{}`: {}",
                event.name, param.name, e
            ))
        })?;
        fields.insert(param.name.clone(), value);
    }

    if !args.is_exhausted() {
        return Err(ContractClientError::Decoding(format!(
            "event `{}` carries {} trailing bytes",
            event.name,
            args.remaining()
        )));
    }

    Ok(DecodedEvent {
        event: event.name.clone(),
        address: log.address,
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
        fields,
    })
}

/// Applies `handlers` in order to the logs of `receipt`. Fields are merged
/// into one map; on a name collision the later handler wins.
pub fn scan_receipt(
    own: &ContractContext,
    handlers: &[EventHandler],
    receipt: &TransactionReceipt,
) -> Result<(Values, Vec<DecodedEvent>)> {
    let mut merged = Values::new();
    let mut events = Vec::new();

    for handler in handlers {
        let address = match &handler.source {
            EventSource::Own => own.address,
            EventSource::Related(weak) => match weak.upgrade() {
                Some(related) => related.address,
                None => {
                    warn!(
                        event = %handler.event.name,
                        "Related contract client dropped, skipping event handler"
                    );
                    continue;
                }
            },
        };

        let matching = receipt
            .logs
            .iter()
            .filter(|log| log.address == address && log.event == handler.event.name);

        for log in matching {
            let decoded = decode_log(&handler.event, log)?;

            if handler.fields.is_empty() {
                merged.extend(decoded.fields.clone());
            } else {
                for (from, to) in &handler.fields {
                    if let Some(value) = decoded.fields.get(from) {
                        merged.insert(to.clone(), value.clone());
                    }
                }
            }

            debug!(
                event = %decoded.event,
                contract = %decoded.address,
                log_index = decoded.log_index,
                "Decoded event"
            );
            events.push(decoded);
        }
    }

    Ok((merged, events))
}
