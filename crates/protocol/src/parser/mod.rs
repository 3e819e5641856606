//! Calldata parsing: raw transaction bytes to typed [`Command`]s.
//!
//! A payload is protocol data when it is valid UTF-8 beginning with the
//! `data:application/json,` header; the remainder is JSON routed by its
//! `(p, op)` pair.

mod ierc20;
mod pow;
mod types;

pub use types::QuotedU64;

use ierc_types::{
    protocol::{PROTOCOL_HEADER, ZERO_ADDRESS},
    Command, CommandBase, ErrCode, Operate, ProtocolError, Protocol, Transaction
};
use serde::Deserialize;

#[derive(Debug, Default, Clone)]
pub struct ProtocolParser;

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    p:  String,
    #[serde(default)]
    op: String
}

impl ProtocolParser {
    pub fn new() -> Self {
        Self
    }

    /// Cheap pre-filter used at fetch time: is this calldata worth storing?
    pub fn check_format(&self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::new(ErrCode::NotProtocolData, "not protocol data"));
        }

        let Ok(text) = std::str::from_utf8(data) else {
            return Err(ProtocolError::new(ErrCode::NotProtocolData, "not protocol data"));
        };

        let Some(payload) = text.strip_prefix(PROTOCOL_HEADER) else {
            return Err(ProtocolError::new(ErrCode::NotProtocolData, "not protocol data"));
        };

        let envelope: RawEnvelope = serde_json::from_str(payload).map_err(|_| {
            ProtocolError::new(ErrCode::InvalidProtocolFormat, "invalid protocol format")
        })?;

        if envelope.p.is_empty() {
            return Err(ProtocolError::new(ErrCode::UnknownProtocol, "unknown protocol"));
        }

        Ok(())
    }

    /// Decodes the transaction's calldata into a typed command, enforcing the
    /// envelope address rules.
    pub fn parse(&self, tx: &Transaction) -> Result<Command, ProtocolError> {
        let payload = tx.data.strip_prefix(PROTOCOL_HEADER).ok_or_else(|| {
            ProtocolError::new(ErrCode::NotProtocolData, "not protocol data")
        })?;

        let envelope: RawEnvelope = serde_json::from_str(payload).map_err(|_| {
            ProtocolError::new(ErrCode::InvalidProtocolFormat, "invalid protocol format")
        })?;

        let protocol: Protocol = envelope
            .p
            .parse()
            .map_err(|_| ProtocolError::new(ErrCode::UnknownProtocol, "unknown protocol"))?;

        let base = command_base(tx, protocol, &envelope.op)?;

        match protocol {
            Protocol::Terc20 | Protocol::Ierc20 => ierc20::parse(base, payload),
            Protocol::IercPow => pow::parse(base, payload)
        }
    }
}

/// Builds and validates the command envelope shared by every operation.
fn command_base(
    tx: &Transaction,
    protocol: Protocol,
    op: &str
) -> Result<CommandBase, ProtocolError> {
    let to = tx.to.to_lowercase();

    let operate = match op.parse::<Operate>() {
        Ok(operate) => operate,
        Err(()) => {
            // unknown operations still fall under the default envelope rule
            if to != ZERO_ADDRESS {
                return Err(ProtocolError::new(
                    ErrCode::InvalidProtocolParams,
                    "invalid to address. must be zero address"
                ));
            }

            return Err(ProtocolError::new(ErrCode::UnknownOperate, "unknown operate"));
        }
    };

    let base = CommandBase {
        block_number: tx.block_number,
        tx_hash: tx.hash.clone(),
        tx_value: tx.value.clone(),
        position_in_block: tx.position,
        from: tx.from.to_lowercase(),
        to,
        gas: tx.gas.clone(),
        gas_price: tx.gas_price.clone(),
        event_at: tx.timestamp,
        protocol,
        operate
    };

    base.validate()?;

    Ok(base)
}
