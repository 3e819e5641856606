//! Domain events, the sole durable record of protocol semantics.
//!
//! Every event is an envelope (block position, transaction context, error
//! outcome) around one of six payload kinds. Persistence stores the numeric
//! kind next to the JSON payload; reconstruction is a match on the kind.

use serde::{Deserialize, Serialize};

use crate::{
    commands::{DistributionRule, TickConfigDetail, TokenomicsDetail},
    decimal::Decimal,
    errors::ProtocolError,
    protocol::{Operate, Protocol}
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    TickCreated        = 0,
    Minted             = 1,
    PoWTickCreated     = 2,
    PoWMinted          = 3,
    Transferred        = 4,
    StakingPoolUpdated = 5
}

impl EventKind {
    pub fn from_u8(kind: u8) -> Option<Self> {
        match kind {
            0 => Some(EventKind::TickCreated),
            1 => Some(EventKind::Minted),
            2 => Some(EventKind::PoWTickCreated),
            3 => Some(EventKind::PoWMinted),
            4 => Some(EventKind::Transferred),
            5 => Some(EventKind::StakingPoolUpdated),
            _ => None
        }
    }
}

/// Common event wrapper. `value` is the enclosing transaction's ETH value in
/// wei, kept as a string so the payload survives JSON round-trips untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub block_number:         u64,
    pub prev_block_number:    u64,
    pub tx_hash:              String,
    pub position_in_ierc_txs: i32,
    pub from:                 String,
    pub to:                   String,
    pub value:                String,
    #[serde(rename = "event_data")]
    pub data:                 T,
    pub err_code:             i32,
    pub err_reason:           String,
    pub event_at:             u64
}

impl<T> Envelope<T> {
    pub fn set_error(&mut self, err: &ProtocolError) {
        self.err_code = err.code_value();
        self.err_reason = err.message().to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickCreatedData {
    pub protocol:     Protocol,
    pub operate:      Operate,
    pub tick:         String,
    pub decimals:     i64,
    pub max_supply:   Decimal,
    pub limit:        Decimal,
    pub wallet_limit: Decimal,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub work_c:       String,
    pub nonce:        String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintedData {
    pub protocol:      Protocol,
    pub operate:       Operate,
    pub tick:          String,
    pub from:          String,
    pub to:            String,
    pub minted_amount: Decimal,
    pub gas:           Decimal,
    pub gas_price:     Decimal,
    pub nonce:         String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoWTickCreatedData {
    pub protocol:   Protocol,
    pub operate:    Operate,
    pub tick:       String,
    pub decimals:   i64,
    pub max_supply: Decimal,
    pub tokenomics: Vec<TokenomicsDetail>,
    pub rule:       DistributionRule,
    pub creator:    String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoWMintedData {
    pub protocol:          Protocol,
    pub operate:           Operate,
    pub tick:              String,
    pub from:              String,
    pub to:                String,
    pub is_pow:            bool,
    pub pow_minted_amount: Decimal,
    pub pow_total_share:   Decimal,
    pub pow_miner_share:   Decimal,
    #[serde(rename = "is_dpos")]
    pub is_pos:            bool,
    pub pos_minted_amount: Decimal,
    pub pos_total_share:   Decimal,
    pub pos_miner_share:   Decimal,
    pub pos_points_source: String,
    pub gas:               Decimal,
    pub gas_price:         Decimal,
    pub is_airdrop:        bool,
    #[serde(rename = "airdrop")]
    pub airdrop_amount:    Decimal,
    #[serde(rename = "burn")]
    pub burn_amount:       Decimal,
    pub nonce:             String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferredData {
    pub protocol:     Protocol,
    pub operate:      Operate,
    pub tick:         String,
    pub from:         String,
    pub to:           String,
    pub amount:       Decimal,
    pub eth_value:    Decimal,
    pub gas_price:    Decimal,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce:        String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signer_nonce: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sign:         String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingPoolUpdatedData {
    pub protocol:   Protocol,
    pub operate:    Operate,
    pub from:       String,
    pub to:         String,
    pub pool:       String,
    pub pool_id:    u64,
    pub name:       String,
    pub owner:      String,
    pub admins:     Vec<String>,
    pub details:    Vec<TickConfigDetail>,
    pub stop_block: u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    TickCreated(Envelope<TickCreatedData>),
    Minted(Envelope<MintedData>),
    PoWTickCreated(Envelope<PoWTickCreatedData>),
    PoWMinted(Envelope<PoWMintedData>),
    Transferred(Envelope<TransferredData>),
    StakingPoolUpdated(Envelope<StakingPoolUpdatedData>)
}

macro_rules! with_envelope {
    ($event:expr, $e:ident => $body:expr) => {
        match $event {
            Event::TickCreated($e) => $body,
            Event::Minted($e) => $body,
            Event::PoWTickCreated($e) => $body,
            Event::PoWMinted($e) => $body,
            Event::Transferred($e) => $body,
            Event::StakingPoolUpdated($e) => $body
        }
    };
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TickCreated(_) => EventKind::TickCreated,
            Event::Minted(_) => EventKind::Minted,
            Event::PoWTickCreated(_) => EventKind::PoWTickCreated,
            Event::PoWMinted(_) => EventKind::PoWMinted,
            Event::Transferred(_) => EventKind::Transferred,
            Event::StakingPoolUpdated(_) => EventKind::StakingPoolUpdated
        }
    }

    pub fn block_number(&self) -> u64 {
        with_envelope!(self, e => e.block_number)
    }

    pub fn prev_block_number(&self) -> u64 {
        with_envelope!(self, e => e.prev_block_number)
    }

    pub fn tx_hash(&self) -> &str {
        with_envelope!(self, e => &e.tx_hash)
    }

    pub fn position(&self) -> i32 {
        with_envelope!(self, e => e.position_in_ierc_txs)
    }

    pub fn err_code(&self) -> i32 {
        with_envelope!(self, e => e.err_code)
    }

    pub fn err_reason(&self) -> &str {
        with_envelope!(self, e => &e.err_reason)
    }

    pub fn event_at(&self) -> u64 {
        with_envelope!(self, e => e.event_at)
    }

    pub fn eth_from(&self) -> &str {
        with_envelope!(self, e => &e.from)
    }

    pub fn eth_to(&self) -> &str {
        with_envelope!(self, e => &e.to)
    }

    pub fn set_error(&mut self, err: &ProtocolError) {
        with_envelope!(self, e => e.set_error(err))
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Event::TickCreated(e) => e.data.protocol,
            Event::Minted(e) => e.data.protocol,
            Event::PoWTickCreated(e) => e.data.protocol,
            Event::PoWMinted(e) => e.data.protocol,
            Event::Transferred(e) => e.data.protocol,
            Event::StakingPoolUpdated(e) => e.data.protocol
        }
    }

    pub fn operate(&self) -> Operate {
        match self {
            Event::TickCreated(e) => e.data.operate,
            Event::Minted(e) => e.data.operate,
            Event::PoWTickCreated(e) => e.data.operate,
            Event::PoWMinted(e) => e.data.operate,
            Event::Transferred(e) => e.data.operate,
            Event::StakingPoolUpdated(e) => e.data.operate
        }
    }

    pub fn tick(&self) -> Option<&str> {
        match self {
            Event::TickCreated(e) => Some(&e.data.tick),
            Event::Minted(e) => Some(&e.data.tick),
            Event::PoWTickCreated(e) => Some(&e.data.tick),
            Event::PoWMinted(e) => Some(&e.data.tick),
            Event::Transferred(e) => Some(&e.data.tick),
            Event::StakingPoolUpdated(_) => None
        }
    }

    /// The one-shot approval signature this event touched, if any.
    pub fn sign(&self) -> Option<&str> {
        match self {
            Event::Transferred(e) if !e.data.sign.is_empty() => Some(&e.data.sign),
            _ => None
        }
    }

    /// Domain-level amount the event moved or minted.
    pub fn amount(&self) -> Option<Decimal> {
        match self {
            Event::Minted(e) => Some(e.data.minted_amount.clone()),
            Event::PoWMinted(e) => Some(&e.data.pow_minted_amount + &e.data.pos_minted_amount),
            Event::Transferred(e) => Some(e.data.amount.clone()),
            _ => None
        }
    }

    /// Serializes the payload for persistence next to its numeric kind.
    pub fn to_kind_and_data(&self) -> (u8, serde_json::Value) {
        let data = match self {
            Event::TickCreated(e) => serde_json::to_value(e),
            Event::Minted(e) => serde_json::to_value(e),
            Event::PoWTickCreated(e) => serde_json::to_value(e),
            Event::PoWMinted(e) => serde_json::to_value(e),
            Event::Transferred(e) => serde_json::to_value(e),
            Event::StakingPoolUpdated(e) => serde_json::to_value(e)
        }
        .expect("event payloads always serialize");

        (self.kind() as u8, data)
    }

    /// Rebuilds an event from its persisted `(kind, payload)` pair.
    pub fn from_kind_and_data(kind: u8, data: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let kind = EventKind::from_u8(kind).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown event kind {kind}"))
        })?;

        Ok(match kind {
            EventKind::TickCreated => Event::TickCreated(serde_json::from_value(data.clone())?),
            EventKind::Minted => Event::Minted(serde_json::from_value(data.clone())?),
            EventKind::PoWTickCreated => Event::PoWTickCreated(serde_json::from_value(data.clone())?),
            EventKind::PoWMinted => Event::PoWMinted(serde_json::from_value(data.clone())?),
            EventKind::Transferred => Event::Transferred(serde_json::from_value(data.clone())?),
            EventKind::StakingPoolUpdated => {
                Event::StakingPoolUpdated(serde_json::from_value(data.clone())?)
            }
        })
    }
}

/// All events one block produced, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsByBlock {
    pub block_number: u64,
    pub events:       Vec<Event>
}

impl EventsByBlock {
    pub fn prev_block_number(&self) -> u64 {
        self.events
            .first()
            .map(Event::prev_block_number)
            .unwrap_or_default()
    }
}
