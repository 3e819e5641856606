//! Payload decoding for the `terc-20` / `ierc-20` protocols.

use bigdecimal::num_bigint::BigInt;
use ierc_types::{
    commands::{
        ConfigStakeCommand, DeployCommand, FreezeRecord, FreezeSellCommand, MintCommand,
        ProxyTransferCommand, ProxyTransferRecord, StakingCommand, StakingDetail,
        TickConfigDetail, TransferCommand, TransferRecord, UnfreezeRecord, UnfreezeSellCommand
    },
    protocol::{tick_max_supply_limit, TICK_ETHI, TICK_MAX_LENGTH},
    Command, CommandBase, Decimal, DecimalExt, ErrCode, Operate, ProtocolError
};
use num_traits::Zero;
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use super::types::{de_decimal, decimal_from_value, invalid_params, valid_work_c, QuotedU64};

#[derive(Debug, Default, Deserialize)]
struct RawIerc20 {
    #[serde(default)]
    tick:     String,
    #[serde(default)]
    amt:      String,
    #[serde(default)]
    workc:    String,
    #[serde(default)]
    nonce:    Value,
    #[serde(default)]
    max:      String,
    #[serde(default)]
    lim:      String,
    #[serde(default)]
    wlim:     String,
    #[serde(default)]
    dec:      String,
    #[serde(default)]
    to:       Vec<RawTransferTo>,
    #[serde(default)]
    freeze:   Vec<RawFreeze>,
    #[serde(default)]
    unfreeze: Vec<RawUnfreeze>,
    #[serde(default)]
    proxy:    Vec<RawProxy>
}

#[derive(Debug, Deserialize)]
struct RawTransferTo {
    #[serde(default)]
    recv: String,
    #[serde(default)]
    amt:  Value
}

#[derive(Debug, Deserialize)]
struct RawFreeze {
    #[serde(default)]
    tick:      String,
    #[serde(default)]
    platform:  String,
    #[serde(default)]
    seller:    String,
    #[serde(default)]
    amt:       Value,
    #[serde(default)]
    value:     String,
    #[serde(default, rename = "gasPrice")]
    gas_price: String,
    #[serde(default)]
    sign:      String,
    #[serde(default)]
    nonce:     String
}

#[derive(Debug, Deserialize)]
struct RawUnfreeze {
    #[serde(default, rename = "txHash")]
    tx_hash:  String,
    #[serde(default)]
    position: i32,
    #[serde(default)]
    sign:     String,
    #[serde(default)]
    msg:      String
}

#[derive(Debug, Deserialize)]
struct RawProxy {
    #[serde(default)]
    tick:  String,
    #[serde(default)]
    from:  String,
    #[serde(default)]
    to:    String,
    #[serde(default)]
    amt:   Value,
    #[serde(default)]
    value: String,
    #[serde(default)]
    sign:  String,
    #[serde(default)]
    nonce: String
}

#[derive(Debug, Deserialize)]
struct RawTickConfig {
    #[serde(default)]
    tick:    String,
    #[serde(default, deserialize_with = "de_decimal")]
    ratio:   Decimal,
    #[serde(default, deserialize_with = "de_decimal", rename = "max_amt")]
    max_amt: Decimal
}

#[derive(Debug, Deserialize)]
struct RawConfigStaking {
    #[serde(default)]
    pool:       String,
    #[serde(default)]
    id:         QuotedU64,
    #[serde(default)]
    name:       String,
    #[serde(default)]
    owner:      String,
    #[serde(default)]
    details:    Vec<RawTickConfig>,
    #[serde(default)]
    stop_block: QuotedU64
}

#[derive(Debug, Deserialize)]
struct RawStakingDetail {
    #[serde(default)]
    staker: String,
    #[serde(default)]
    tick:   String,
    #[serde(default, deserialize_with = "de_decimal")]
    amt:    Decimal
}

#[derive(Debug, Deserialize)]
struct RawStaking {
    #[serde(default)]
    pool:    String,
    #[serde(default)]
    id:      QuotedU64,
    #[serde(default)]
    details: Vec<RawStakingDetail>
}

pub(super) fn parse(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    match base.operate {
        Operate::Deploy | Operate::Mint | Operate::Transfer | Operate::FreezeSell
        | Operate::UnfreezeSell | Operate::ProxyTransfer => {
            let raw: RawIerc20 = serde_json::from_str(payload).map_err(|_| {
                ProtocolError::new(ErrCode::InvalidProtocolFormat, "invalid protocol format")
            })?;

            match base.operate {
                Operate::Deploy => parse_deploy(base, &raw),
                Operate::Mint => parse_mint(base, &raw),
                Operate::Transfer => parse_transfer(base, &raw),
                Operate::FreezeSell => parse_freeze_sell(base, &raw),
                Operate::UnfreezeSell => parse_unfreeze_sell(base, &raw),
                Operate::ProxyTransfer => parse_proxy_transfer(base, &raw),
                _ => unreachable!()
            }
        }

        Operate::StakeConfig => parse_config_staking(base, payload),
        Operate::Stake | Operate::Unstake => parse_staking(base, payload, false),
        Operate::ProxyUnstake => parse_staking(base, payload, true),

        Operate::Refund => {
            error!(tx_hash = %base.tx_hash, "refund operate");
            Err(ProtocolError::new(ErrCode::UnknownOperate, "unknown operate"))
        }

        _ => Err(ProtocolError::new(ErrCode::UnknownOperate, "unknown operate"))
    }
}

/// Nonce rules are tick-dependent: `ethi` only ever accepted decimal
/// strings, everything else tolerates integral JSON numbers as well. A
/// leading zero or a negative value is rejected everywhere.
fn parse_nonce(tick: &str, value: &Value) -> Result<Decimal, ProtocolError> {
    if tick == TICK_ETHI {
        let Value::String(s) = value else {
            return Err(invalid_params(format!("invalid nonce({value})")));
        };

        if s.starts_with('0') {
            return Err(invalid_params(format!("invalid nonce({s})")));
        }

        let nonce: Decimal = s
            .parse()
            .map_err(|_| invalid_params(format!("invalid nonce({s})")))?;
        if nonce < Decimal::zero() {
            return Err(invalid_params(format!("invalid nonce({s})")));
        }

        return Ok(nonce);
    }

    match value {
        Value::Number(n) => {
            let nonce: Decimal = n
                .to_string()
                .parse()
                .map_err(|_| invalid_params(format!("invalid nonce({n})")))?;

            if !nonce.is_integer() || nonce < Decimal::zero() {
                return Err(invalid_params(format!("invalid nonce({n})")));
            }

            Ok(nonce.normalized())
        }

        Value::String(s) => {
            if s.starts_with('0') {
                return Err(invalid_params(format!("invalid nonce({s})")));
            }

            let int = BigInt::parse_bytes(s.as_bytes(), 10)
                .ok_or_else(|| invalid_params(format!("invalid nonce({s})")))?;

            let nonce = Decimal::from(int);
            if nonce < Decimal::zero() {
                return Err(invalid_params(format!("invalid nonce({s})")));
            }

            Ok(nonce)
        }

        _ => Err(invalid_params(format!("invalid nonce({value})")))
    }
}

fn parse_tick(raw: &str) -> Result<String, ProtocolError> {
    let tick = raw.trim().to_string();
    if tick.is_empty() || tick.len() > TICK_MAX_LENGTH {
        return Err(invalid_params("invalid tick"));
    }

    Ok(tick)
}

fn parse_deploy(base: CommandBase, raw: &RawIerc20) -> Result<Command, ProtocolError> {
    let max_supply: Decimal = raw
        .max
        .trim()
        .parse()
        .map_err(|_| invalid_params("invalid max_supply"))?;
    if max_supply <= Decimal::zero() || max_supply > tick_max_supply_limit() {
        return Err(invalid_params("invalid max_supply"));
    }

    let decimals: i64 = raw
        .dec
        .trim()
        .parse()
        .map_err(|_| invalid_params("invalid decimals"))?;
    if !(0..=18).contains(&decimals) {
        return Err(invalid_params("invalid decimals"));
    }

    let limit: Decimal = raw
        .lim
        .trim()
        .parse()
        .map_err(|_| invalid_params("invalid limit"))?;

    let wallet_limit: Decimal = raw
        .wlim
        .trim()
        .parse()
        .map_err(|_| invalid_params("invalid wallet_limit"))?;

    if limit <= Decimal::zero() || limit > wallet_limit || wallet_limit > max_supply {
        return Err(invalid_params("invalid limit"));
    }

    if !raw.workc.is_empty() && !valid_work_c(&raw.workc) {
        return Err(invalid_params("invalid workc"));
    }

    let tick = parse_tick(&raw.tick)?;
    let nonce = parse_nonce(&tick, &raw.nonce)?;

    Ok(Command::Deploy(DeployCommand {
        base,
        tick,
        max_supply,
        decimals,
        limit_per_tx: limit,
        limit_per_wallet: wallet_limit,
        work_c: raw.workc.clone(),
        nonce: nonce.to_string()
    }))
}

fn parse_mint(base: CommandBase, raw: &RawIerc20) -> Result<Command, ProtocolError> {
    let amount: Decimal = raw
        .amt
        .trim()
        .parse()
        .map_err(|_| invalid_params("invalid amount"))?;

    let tick = raw.tick.trim().to_string();
    let nonce = parse_nonce(&tick, &raw.nonce)?;
    if nonce.is_zero() {
        return Err(invalid_params("invalid nonce"));
    }

    Ok(Command::Mint(MintCommand { base, tick, amount, nonce: nonce.to_string() }))
}

fn parse_transfer(base: CommandBase, raw: &RawIerc20) -> Result<Command, ProtocolError> {
    let tick = raw.tick.trim().to_string();

    let mut records = Vec::with_capacity(raw.to.len());
    for to in &raw.to {
        let amount = decimal_from_value(&to.amt, "amount")?;

        records.push(TransferRecord {
            tick: tick.clone(),
            from: base.from.clone(),
            recv: to.recv.trim().to_lowercase(),
            amount
        });
    }

    Ok(Command::Transfer(TransferCommand { base, records }))
}

fn parse_freeze_sell(base: CommandBase, raw: &RawIerc20) -> Result<Command, ProtocolError> {
    let mut records = Vec::with_capacity(raw.freeze.len());
    for freeze in &raw.freeze {
        let tick = freeze.tick.trim().to_string();
        let nonce = parse_nonce(&tick, &Value::String(freeze.nonce.clone()))?;

        let amount = decimal_from_value(&freeze.amt, "amount")?;

        let value: Decimal = freeze.value.trim().parse().map_err(|_| {
            invalid_params(format!("invalid sell value. {}", freeze.value))
        })?;

        let gas_price: Decimal = freeze
            .gas_price
            .parse()
            .map_err(|_| invalid_params("invalid gas_price"))?;

        records.push(FreezeRecord {
            tick,
            platform: freeze.platform.trim().to_lowercase(),
            seller: freeze.seller.trim().to_lowercase(),
            seller_sign: freeze.sign.trim().to_string(),
            sign_nonce: nonce.to_string(),
            amount,
            value,
            gas_price
        });
    }

    Ok(Command::FreezeSell(FreezeSellCommand { base, records }))
}

fn parse_unfreeze_sell(base: CommandBase, raw: &RawIerc20) -> Result<Command, ProtocolError> {
    let records = raw
        .unfreeze
        .iter()
        .map(|unfreeze| UnfreezeRecord {
            tx_hash:  unfreeze.tx_hash.to_lowercase(),
            position: unfreeze.position,
            sign:     unfreeze.sign.clone(),
            msg:      unfreeze.msg.clone()
        })
        .collect();

    Ok(Command::UnfreezeSell(UnfreezeSellCommand { base, records }))
}

fn parse_proxy_transfer(base: CommandBase, raw: &RawIerc20) -> Result<Command, ProtocolError> {
    let mut records = Vec::with_capacity(raw.proxy.len());
    for proxy in &raw.proxy {
        let tick = proxy.tick.trim().to_string();
        let nonce = parse_nonce(&tick, &Value::String(proxy.nonce.clone()))?;

        let amount = decimal_from_value(&proxy.amt, "amount")?;

        let value: Decimal = proxy
            .value
            .trim()
            .parse()
            .map_err(|_| invalid_params("invalid eth value"))?;

        records.push(ProxyTransferRecord {
            tick,
            from: proxy.from.trim().to_lowercase(),
            to: proxy.to.trim().to_lowercase(),
            amount,
            value,
            sign: proxy.sign.trim().to_string(),
            signer_nonce: nonce.to_string()
        });
    }

    Ok(Command::ProxyTransfer(ProxyTransferCommand { base, records }))
}

fn parse_config_staking(base: CommandBase, payload: &str) -> Result<Command, ProtocolError> {
    let raw: RawConfigStaking = serde_json::from_str(payload).map_err(|_| {
        ProtocolError::new(ErrCode::InvalidProtocolFormat, "invalid protocol format")
    })?;

    let details = raw
        .details
        .iter()
        .map(|item| TickConfigDetail {
            tick:       item.tick.clone(),
            ratio:      item.ratio.clone(),
            max_amount: item.max_amt.clone()
        })
        .collect();

    Ok(Command::ConfigStake(ConfigStakeCommand {
        owner: base.from.clone(),
        base,
        pool: raw.pool.to_lowercase(),
        pool_sub_id: raw.id.0,
        name: raw.name,
        // the payload's owner field becomes the managing admin
        admins: vec![raw.owner.to_lowercase()],
        stop_block: raw.stop_block.0,
        details
    }))
}

fn parse_staking(base: CommandBase, payload: &str, proxy: bool) -> Result<Command, ProtocolError> {
    let raw: RawStaking = serde_json::from_str(payload).map_err(|_| {
        ProtocolError::new(ErrCode::InvalidProtocolFormat, "invalid protocol format")
    })?;

    let pool = raw.pool.to_lowercase();
    let pool_sub_id = raw.id.0;

    let details = raw
        .details
        .iter()
        .map(|item| StakingDetail {
            staker: if proxy { item.staker.to_lowercase() } else { base.from.clone() },
            pool:   pool.clone(),
            pool_sub_id,
            tick:   item.tick.clone(),
            amount: item.amt.clone()
        })
        .collect();

    Ok(Command::Staking(StakingCommand { base, pool, pool_sub_id, details }))
}
