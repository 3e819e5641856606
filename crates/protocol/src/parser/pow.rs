//! Payload decoding for the `ierc-pow` protocol.

use std::collections::HashMap;

use ierc_types::{
    commands::{
        ClaimAirdropCommand, DeployPoWCommand, DistributionRule, FreezeRecord,
        FreezeSellCommand, MintPoWCommand, ModifyCommand, ProxyTransferCommand,
        ProxyTransferRecord, TokenomicsDetail, TransferCommand, TransferRecord,
        UnfreezeRecord, UnfreezeSellCommand
    },
    protocol::{tick_max_supply_limit, DPOS_DISABLE_DUAL_MINING_BLOCK_HEIGHT, TICK_ETHPI,
               TICK_MAX_LENGTH},
    Command, CommandBase, Decimal, ErrCode, Operate, ProtocolError
};
use num_traits::Zero;
use serde::Deserialize;
use serde_json::Value;

use super::types::{de_decimal, decimal_from_value, invalid_params, valid_work_c};

/// Ticks allowed to use `modify` and `airdrop_claim`.
const SUPPORTED_AIRDROP_TICKS: &[&str] = &[TICK_ETHPI];

#[derive(Debug, Default, Deserialize)]
struct RawRule {
    #[serde(default, deserialize_with = "de_decimal")]
    pow:              Decimal,
    #[serde(default, rename = "min_workc")]
    min_work_c:       String,
    #[serde(default, deserialize_with = "de_decimal")]
    difficulty_ratio: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    pos:              Decimal,
    #[serde(default)]
    pool:             String,
    #[serde(default, rename = "max_reward_block")]
    max_reward_block: String
}

#[derive(Debug, Deserialize)]
struct RawDeploy {
    #[serde(default)]
    tick:       String,
    #[serde(default, deserialize_with = "de_decimal")]
    max:        Decimal,
    #[serde(default)]
    dec:        String,
    #[serde(default)]
    tokenomics: HashMap<String, Value>,
    #[serde(default)]
    rule:       RawRule
}

#[derive(Debug, Deserialize)]
struct RawMint {
    #[serde(default)]
    tick:      String,
    #[serde(default)]
    use_point: String,
    #[serde(default)]
    block:     String,
    #[serde(default)]
    nonce:     String
}

#[derive(Debug, Deserialize)]
struct RawModify {
    #[serde(default)]
    tick: String,
    #[serde(default, deserialize_with = "de_decimal")]
    max:  Decimal
}

#[derive(Debug, Deserialize)]
struct RawAirdropClaim {
    #[serde(default)]
    tick:  String,
    #[serde(default, deserialize_with = "de_decimal")]
    claim: Decimal
}

#[derive(Debug, Deserialize)]
struct RawTransferTo {
    #[serde(default)]
    recv: String,
    #[serde(default, deserialize_with = "de_decimal")]
    amt:  Decimal
}

#[derive(Debug, Deserialize)]
struct RawTransfer {
    #[serde(default)]
    tick: String,
    #[serde(default)]
    to:   Vec<RawTransferTo>
}

#[derive(Debug, Deserialize)]
struct RawFreezeRecord {
    #[serde(default)]
    tick:      String,
    #[serde(default)]
    platform:  String,
    #[serde(default)]
    seller:    String,
    #[serde(default, deserialize_with = "de_decimal")]
    amt:       Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    value:     Decimal,
    #[serde(default, deserialize_with = "de_decimal", rename = "gasPrice")]
    gas_price: Decimal,
    #[serde(default)]
    sign:      String,
    #[serde(default)]
    nonce:     String
}

#[derive(Debug, Deserialize)]
struct RawFreeze {
    #[serde(default)]
    freeze: Vec<RawFreezeRecord>
}

#[derive(Debug, Deserialize)]
struct RawUnfreezeRecord {
    #[serde(default, rename = "txHash")]
    tx_hash:  String,
    #[serde(default)]
    position: String,
    #[serde(default)]
    sign:     String,
    #[serde(default)]
    msg:      String
}

#[derive(Debug, Deserialize)]
struct RawUnfreeze {
    #[serde(default)]
    unfreeze: Vec<RawUnfreezeRecord>
}

#[derive(Debug, Deserialize)]
struct RawProxyRecord {
    #[serde(default)]
    tick:  String,
    #[serde(default)]
    from:  String,
    #[serde(default)]
    to:    String,
    #[serde(default, deserialize_with = "de_decimal")]
    amt:   Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    value: Decimal,
    #[serde(default)]
    sign:  String,
    #[serde(default)]
    nonce: String
}

#[derive(Debug, Deserialize)]
struct RawProxy {
    #[serde(default)]
    proxy: Vec<RawProxyRecord>
}

fn decode<'a, T: Deserialize<'a>>(payload: &'a str) -> Result<T, ProtocolError> {
    serde_json::from_str(payload).map_err(|_| {
        ProtocolError::new(ErrCode::InvalidProtocolFormat, "invalid protocol format")
    })
}

fn supports_airdrop(tick: &str) -> bool {
    SUPPORTED_AIRDROP_TICKS.contains(&tick)
}

pub(super) fn parse(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    match base.operate {
        Operate::Deploy => parse_deploy(base, payload),
        Operate::Mint => parse_mint(base, payload),
        Operate::Transfer => parse_transfer(base, payload),
        Operate::FreezeSell => parse_freeze_sell(base, payload),
        Operate::UnfreezeSell => parse_unfreeze_sell(base, payload),
        Operate::ProxyTransfer => parse_proxy_transfer(base, payload),
        Operate::Modify => parse_modify(base, payload),
        Operate::AirdropClaim => parse_airdrop_claim(base, payload),
        _ => Err(ProtocolError::new(ErrCode::UnknownOperate, "unknown operate"))
    }
}

fn parse_deploy(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    let raw: RawDeploy = decode(payload)?;

    let decimals: i64 = raw.dec.parse().map_err(|_| invalid_params("invalid dec"))?;
    if !(0..=18).contains(&decimals) {
        return Err(invalid_params("invalid dec"));
    }

    let tick = raw.tick.trim().to_string();
    if tick.is_empty() || tick.len() > TICK_MAX_LENGTH {
        return Err(invalid_params("invalid tick"));
    }

    if raw.max <= Decimal::zero() || raw.max > tick_max_supply_limit() {
        return Err(invalid_params("invalid max"));
    }

    let mut tokenomics = Vec::with_capacity(raw.tokenomics.len());
    for (block, amount) in &raw.tokenomics {
        let block_number: u64 = block
            .parse()
            .map_err(|_| invalid_params("invalid tokenomics"))?;
        let amount = decimal_from_value(amount, "tokenomics")?;
        if amount < Decimal::zero() {
            return Err(invalid_params("invalid tokenomics"));
        }

        tokenomics.push(TokenomicsDetail { block_number, amount });
    }
    tokenomics.sort_by_key(|detail| detail.block_number);

    let max_reward_block = if raw.rule.max_reward_block.is_empty() {
        0
    } else {
        raw.rule
            .max_reward_block
            .parse()
            .map_err(|_| invalid_params("invalid max_reward_block"))?
    };

    if raw.rule.pow < Decimal::zero()
        || raw.rule.pos < Decimal::zero()
        || (&raw.rule.pow + &raw.rule.pos).is_zero()
    {
        return Err(invalid_params("invalid rule"));
    }

    if !raw.rule.min_work_c.is_empty() && !valid_work_c(&raw.rule.min_work_c) {
        return Err(invalid_params("invalid min_workc"));
    }

    Ok(Command::DeployPoW(DeployPoWCommand {
        base,
        tick,
        decimals,
        max_supply: raw.max,
        tokenomics,
        rule: DistributionRule {
            pow_ratio:        raw.rule.pow,
            min_work_c:       raw.rule.min_work_c,
            difficulty_ratio: raw.rule.difficulty_ratio,
            pos_ratio:        raw.rule.pos,
            pos_pool:         raw.rule.pool.to_lowercase(),
            max_reward_block
        }
    }))
}

fn parse_mint(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    let raw: RawMint = decode(payload)?;

    let mut points = if raw.use_point.is_empty() {
        Decimal::zero()
    } else {
        raw.use_point
            .parse()
            .map_err(|_| invalid_params("invalid point"))?
    };

    let block = if raw.block.is_empty() {
        0
    } else {
        let block: u64 = raw
            .block
            .parse()
            .map_err(|_| invalid_params("invalid block"))?;

        // dual mining (hash share + points in one mint) is retired
        if block >= DPOS_DISABLE_DUAL_MINING_BLOCK_HEIGHT {
            points = Decimal::zero();
        }

        block
    };

    let nonce: u64 = raw
        .nonce
        .parse()
        .map_err(|_| invalid_params("invalid nonce"))?;

    Ok(Command::MintPoW(MintPoWCommand { base, tick: raw.tick, points, block, nonce }))
}

fn parse_transfer(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    let raw: RawTransfer = decode(payload)?;

    let records = raw
        .to
        .iter()
        .map(|record| TransferRecord {
            tick:   raw.tick.clone(),
            from:   base.from.clone(),
            recv:   record.recv.clone(),
            amount: record.amt.clone()
        })
        .collect();

    Ok(Command::Transfer(TransferCommand { base, records }))
}

fn parse_freeze_sell(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    let raw: RawFreeze = decode(payload)?;

    let records = raw
        .freeze
        .iter()
        .map(|record| FreezeRecord {
            tick:        record.tick.clone(),
            platform:    record.platform.to_lowercase(),
            seller:      record.seller.to_lowercase(),
            seller_sign: record.sign.clone(),
            sign_nonce:  record.nonce.clone(),
            amount:      record.amt.clone(),
            value:       record.value.clone(),
            gas_price:   record.gas_price.clone()
        })
        .collect();

    Ok(Command::FreezeSell(FreezeSellCommand { base, records }))
}

fn parse_unfreeze_sell(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    let raw: RawUnfreeze = decode(payload)?;

    let mut records = Vec::with_capacity(raw.unfreeze.len());
    for record in &raw.unfreeze {
        let position: i64 = record
            .position
            .parse()
            .map_err(|_| invalid_params("invalid position"))?;

        records.push(UnfreezeRecord {
            tx_hash:  record.tx_hash.to_lowercase(),
            position: position as i32,
            sign:     record.sign.clone(),
            msg:      record.msg.clone()
        });
    }

    Ok(Command::UnfreezeSell(UnfreezeSellCommand { base, records }))
}

fn parse_proxy_transfer(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    let raw: RawProxy = decode(payload)?;

    let records = raw
        .proxy
        .iter()
        .map(|record| ProxyTransferRecord {
            tick:         record.tick.clone(),
            from:         record.from.to_lowercase(),
            to:           record.to.to_lowercase(),
            amount:       record.amt.clone(),
            value:        record.value.clone(),
            sign:         record.sign.clone(),
            signer_nonce: record.nonce.clone()
        })
        .collect();

    Ok(Command::ProxyTransfer(ProxyTransferCommand { base, records }))
}

fn parse_modify(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    let raw: RawModify = decode(payload)?;

    if !supports_airdrop(&raw.tick) {
        return Err(invalid_params("not support airdrop"));
    }

    Ok(Command::Modify(ModifyCommand { base, tick: raw.tick, max_supply: raw.max }))
}

fn parse_airdrop_claim(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    let raw: RawAirdropClaim = decode(payload)?;

    if !supports_airdrop(&raw.tick) {
        return Err(invalid_params("not support airdrop"));
    }

    Ok(Command::ClaimAirdrop(ClaimAirdropCommand {
        base,
        tick: raw.tick,
        claim_amount: raw.claim
    }))
}
