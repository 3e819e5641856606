use std::{
    collections::{HashMap, HashSet},
    sync::Arc
};

use alloy_primitives::{hex, keccak256};
use ierc_protocol::{Approval, ProtocolParser};
use ierc_state::{Balance, BalanceKey, PoolAggregate, Tick};
use ierc_types::{
    dec,
    events::{Envelope, TransferredData},
    protocol::{PLATFORM_ADDRESS, PROTOCOL_HEADER, ZERO_ADDRESS},
    Block, Decimal, ErrCode, Event, Transaction
};
use num_traits::Zero;
use secp256k1::{Message, SecretKey, SECP256K1};

use super::BlockAggregate;

const ALICE: &str = "0x00000000000000000000000000000000000000a1";
const BOB: &str = "0x00000000000000000000000000000000000000b2";
const POOL: &str = "0x0000000000000000000000000000000000900001";

fn wei(eth: &str) -> Decimal {
    dec(eth) * dec("1000000000000000000")
}

fn signer(seed: u8) -> (String, SecretKey) {
    let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
    let pk = sk.public_key(&SECP256K1);
    let hash = keccak256(&pk.serialize_uncompressed()[1..]);
    (format!("0x{}", hex::encode(&hash[12..])), sk)
}

fn sign_approval(approval: &Approval, sk: &SecretKey) -> String {
    let message = approval.message();
    let digest = keccak256(format!(
        "\x19Ethereum Signed Message:\n{}{}",
        message.len(),
        message
    ));
    let msg = Message::from_digest_slice(digest.as_slice()).unwrap();
    let (rec_id, compact) = SECP256K1
        .sign_ecdsa_recoverable(&msg, sk)
        .serialize_compact();

    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&compact);
    bytes[64] = rec_id.to_i32() as u8 + 27;
    format!("0x{}", hex::encode(bytes))
}

struct TestTx {
    hash:    String,
    from:    String,
    to:      String,
    value:   Decimal,
    payload: String
}

fn tx(hash: &str, from: &str, to: &str, value: Decimal, payload: &str) -> TestTx {
    TestTx {
        hash:    hash.to_string(),
        from:    from.to_string(),
        to:      to.to_string(),
        value,
        payload: payload.to_string()
    }
}

/// Replays blocks against persistent state the way the block service does,
/// without the storage layer.
struct TestChain {
    parser:         ProtocolParser,
    previous_block: u64,
    ticks:          HashMap<String, Tick>,
    balances:       HashMap<BalanceKey, Balance>,
    signatures:     HashMap<String, Envelope<TransferredData>>,
    pools:          HashMap<String, PoolAggregate>,
    invalid_hashes: Arc<HashSet<String>>,
    fee_start:      u64
}

impl TestChain {
    fn new() -> Self {
        Self {
            parser:         ProtocolParser::new(),
            previous_block: 0,
            ticks:          HashMap::new(),
            balances:       HashMap::new(),
            signatures:     HashMap::new(),
            pools:          HashMap::new(),
            invalid_hashes: Arc::new(HashSet::new()),
            fee_start:      1
        }
    }

    fn run_block(&mut self, number: u64, txs: Vec<TestTx>) -> Vec<Event> {
        let transactions = txs
            .into_iter()
            .enumerate()
            .map(|(position, t)| {
                let mut tx = Transaction {
                    block_number: number,
                    position:     position as i64,
                    hash:         t.hash,
                    from:         t.from,
                    to:           t.to,
                    data:         format!("{PROTOCOL_HEADER}{}", t.payload),
                    value:        t.value,
                    gas:          dec("21000"),
                    gas_price:    dec("1000000000"),
                    nonce:        1,
                    timestamp:    1_700_000_000 + number,
                    is_processed: false,
                    code:         0,
                    remark:       String::new(),
                    command:      None
                };

                match self.parser.parse(&tx) {
                    Ok(command) => tx.command = Some(command),
                    Err(err) => tx.mark_failed(err.code_value(), err.message())
                }

                tx
            })
            .collect();

        let block = Block {
            number,
            parent_hash: format!("0xparent{number}"),
            hash: format!("0xhash{number}"),
            transaction_count: 0,
            transactions,
            is_processed: false,
            timestamp: 1_700_000_000 + number
        };

        let mut aggregate = BlockAggregate::new(
            self.previous_block,
            block,
            self.invalid_hashes.clone(),
            self.fee_start
        );
        aggregate.ticks = self.ticks.clone();
        aggregate.balances = self.balances.clone();
        aggregate.signatures = self.signatures.clone();
        aggregate.staking_pools = self.pools.clone();

        aggregate.handle();

        self.ticks = aggregate.ticks;
        self.balances = aggregate.balances;
        self.signatures = aggregate.signatures;
        self.pools = aggregate.staking_pools;
        if !aggregate.events.is_empty() {
            self.previous_block = number;
        }

        aggregate.events
    }

    fn balance(&self, address: &str, tick: &str) -> Balance {
        self.balances
            .get(&BalanceKey::new(address, tick))
            .cloned()
            .unwrap_or_else(|| Balance::new(address, tick))
    }
}

fn deploy_payload(tick: &str, max: &str, lim: &str, wlim: &str) -> String {
    format!(
        r#"{{"p":"ierc-20","op":"deploy","tick":"{tick}","max":"{max}","lim":"{lim}","wlim":"{wlim}","dec":"18","nonce":"1"}}"#
    )
}

fn mint_payload(tick: &str, amt: &str, nonce: &str) -> String {
    format!(r#"{{"p":"ierc-20","op":"mint","tick":"{tick}","amt":"{amt}","nonce":"{nonce}"}}"#)
}

fn stake_config_payload(pool: &str, id: u64, tick: &str, ratio: &str) -> String {
    format!(
        r#"{{"p":"ierc-20","op":"stake_config","pool":"{pool}","id":"{id}","name":"main","owner":"{ALICE}","details":[{{"tick":"{tick}","ratio":"{ratio}","max_amt":"0"}}]}}"#
    )
}

#[test]
fn deploy_and_mint_to_the_wallet_cap() {
    let mut chain = TestChain::new();

    chain.run_block(100, vec![tx(
        "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "100", "10", "20")
    )]);

    let events = chain.run_block(101, vec![tx(
        "0xm1", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "10", "2")
    )]);
    assert_eq!(events[0].err_code(), 0);

    let events = chain.run_block(102, vec![tx(
        "0xm2", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "10", "3")
    )]);
    assert_eq!(events[0].err_code(), 0);
    assert_eq!(chain.balance(ALICE, "abcd").available, dec("20"));

    // the wallet cap is exhausted
    let events = chain.run_block(103, vec![tx(
        "0xm3", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "10", "4")
    )]);
    assert_eq!(events[0].err_code(), ErrCode::MintAmountExceedLimit.value());
    assert_eq!(chain.balance(ALICE, "abcd").available, dec("20"));

    let Tick::Ierc20(tick) = &chain.ticks["abcd"] else { panic!("wrong tick kind") };
    assert_eq!(tick.supply, dec("20"));
}

#[test]
fn double_mint_in_one_block() {
    let mut chain = TestChain::new();
    chain.run_block(100, vec![tx(
        "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "100", "10", "20")
    )]);

    let events = chain.run_block(101, vec![
        tx("0xm1", ALICE, ZERO_ADDRESS, Decimal::zero(), &mint_payload("abcd", "10", "2")),
        tx("0xm2", ALICE, ZERO_ADDRESS, Decimal::zero(), &mint_payload("abcd", "10", "3")),
    ]);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].err_code(), 0);
    assert_eq!(events[1].err_code(), ErrCode::MintTickMinted.value());
    assert_eq!(chain.balance(ALICE, "abcd").available, dec("10"));
}

#[test]
fn freeze_then_unfreeze_releases_the_seller() {
    let mut chain = TestChain::new();
    let (seller, seller_key) = signer(7);

    chain.run_block(100, vec![tx(
        "0xd0", &seller, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "1000", "100", "100")
    )]);
    chain.run_block(101, vec![tx(
        "0xm1", &seller, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "100", "2")
    )]);

    let approval = Approval::new("abcd", &seller, PLATFORM_ADDRESS, "30", "0.045", "1");
    let sign = sign_approval(&approval, &seller_key);

    let freeze_payload = format!(
        r#"{{"p":"ierc-20","op":"freeze_sell","freeze":[{{"tick":"abcd","platform":"{PLATFORM_ADDRESS}","seller":"{seller}","amt":"30","value":"0.045","gasPrice":"1","sign":"{sign}","nonce":"1"}}]}}"#
    );

    // 30 * 0.045 * 1.02 = 1.377 ETH buyer payment
    let events = chain.run_block(102, vec![tx(
        "0xf1", BOB, PLATFORM_ADDRESS, wei("1.377"), &freeze_payload
    )]);
    assert_eq!(events[0].err_code(), 0, "{}", events[0].err_reason());

    let frozen = chain.balance(&seller, "abcd");
    assert_eq!(frozen.available, dec("70"));
    assert_eq!(frozen.freeze, dec("30"));

    let unfreeze_payload = format!(
        r#"{{"p":"ierc-20","op":"unfreeze_sell","unfreeze":[{{"txHash":"0xf1","position":0,"sign":"{sign}","msg":""}}]}}"#
    );
    let events = chain.run_block(103, vec![tx(
        "0xu1", PLATFORM_ADDRESS, ZERO_ADDRESS, Decimal::zero(), &unfreeze_payload
    )]);
    assert_eq!(events[0].err_code(), 0, "{}", events[0].err_reason());

    let released = chain.balance(&seller, "abcd");
    assert_eq!(released.available, dec("100"));
    assert_eq!(released.freeze, dec("0"));

    // the signature is spent
    let events = chain.run_block(104, vec![tx(
        "0xu2", PLATFORM_ADDRESS, ZERO_ADDRESS, Decimal::zero(), &unfreeze_payload
    )]);
    assert_eq!(events[0].err_code(), ErrCode::SignatureAlreadyUsed.value());
}

#[test]
fn freeze_then_proxy_transfer_settles_the_trade() {
    let mut chain = TestChain::new();
    let (seller, seller_key) = signer(9);

    chain.run_block(100, vec![tx(
        "0xd0", &seller, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "1000", "100", "100")
    )]);
    chain.run_block(101, vec![tx(
        "0xm1", &seller, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "100", "2")
    )]);

    let approval = Approval::new("abcd", &seller, PLATFORM_ADDRESS, "30", "0.045", "1");
    let sign = sign_approval(&approval, &seller_key);

    let freeze_payload = format!(
        r#"{{"p":"ierc-20","op":"freeze_sell","freeze":[{{"tick":"abcd","platform":"{PLATFORM_ADDRESS}","seller":"{seller}","amt":"30","value":"0.045","gasPrice":"1","sign":"{sign}","nonce":"1"}}]}}"#
    );
    chain.run_block(102, vec![tx(
        "0xf1", BOB, PLATFORM_ADDRESS, wei("1.377"), &freeze_payload
    )]);

    let proxy_payload = format!(
        r#"{{"p":"ierc-20","op":"proxy_transfer","proxy":[{{"tick":"abcd","from":"{seller}","to":"{BOB}","amt":"30","value":"0.045","sign":"{sign}","nonce":"1"}}]}}"#
    );
    let events = chain.run_block(103, vec![tx(
        "0xp1", PLATFORM_ADDRESS, ZERO_ADDRESS, wei("1.35"), &proxy_payload
    )]);
    assert_eq!(events[0].err_code(), 0, "{}", events[0].err_reason());

    assert_eq!(chain.balance(&seller, "abcd").available, dec("70"));
    assert_eq!(chain.balance(&seller, "abcd").freeze, dec("0"));
    assert_eq!(chain.balance(BOB, "abcd").available, dec("30"));

    // once transferred, the freeze can no longer be undone
    let unfreeze_payload = format!(
        r#"{{"p":"ierc-20","op":"unfreeze_sell","unfreeze":[{{"txHash":"0xf1","position":0,"sign":"{sign}","msg":""}}]}}"#
    );
    let events = chain.run_block(104, vec![tx(
        "0xu1", PLATFORM_ADDRESS, ZERO_ADDRESS, Decimal::zero(), &unfreeze_payload
    )]);
    assert_eq!(events[0].err_code(), ErrCode::SignatureAlreadyUsed.value());
}

fn pow_deploy_payload(tick: &str, start_block: u64) -> String {
    format!(
        r#"{{"p":"ierc-pow","op":"deploy","tick":"{tick}","max":"1000000","dec":"18","tokenomics":{{"{start_block}":"1000"}},"rule":{{"pow":"50","min_workc":"0x00","difficulty_ratio":"5","pos":"50","pool":"{POOL}","max_reward_block":"0"}}}}"#
    )
}

#[test]
fn pow_mint_splits_emission_proportionally() {
    let mut chain = TestChain::new();

    chain.run_block(999, vec![tx(
        "0xc0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &stake_config_payload(POOL, 1, "abcd", "0.01")
    )]);
    chain.run_block(1000, vec![tx(
        "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &pow_deploy_payload("powt", 1000)
    )]);

    // both hashes carry one zero beyond the work constraint: share 5 each
    let mint = r#"{"p":"ierc-pow","op":"mint","tick":"powt","block":"1001","nonce":"1"}"#;
    let events = chain.run_block(1001, vec![
        tx("0x000a01", ALICE, ZERO_ADDRESS, Decimal::zero(), mint),
        tx("0x000b02", BOB, ZERO_ADDRESS, Decimal::zero(), mint),
    ]);

    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(event.err_code(), 0, "{}", event.err_reason());
        let Event::PoWMinted(minted) = event else { panic!("expected pow mint") };
        assert_eq!(minted.data.pow_minted_amount, dec("250"));
        assert_eq!(minted.data.pow_total_share, dec("10"));
        assert_eq!(minted.data.pow_miner_share, dec("5"));
        assert!(minted.data.is_pow);
        assert!(!minted.data.is_pos);
    }

    assert_eq!(chain.balance(ALICE, "powt").available, dec("250"));
    assert_eq!(chain.balance(BOB, "powt").available, dec("250"));

    let Tick::Pow(tick) = &chain.ticks["powt"] else { panic!("wrong tick kind") };
    assert_eq!(tick.pow_supply, dec("500"));
    assert_eq!(tick.pos_supply, dec("0"));
}

#[test]
fn pow_double_mint_is_rejected_in_the_pre_pass() {
    let mut chain = TestChain::new();
    chain.run_block(999, vec![tx(
        "0xc0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &stake_config_payload(POOL, 1, "abcd", "0.01")
    )]);
    chain.run_block(1000, vec![tx(
        "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &pow_deploy_payload("powt", 1000)
    )]);

    let mint = r#"{"p":"ierc-pow","op":"mint","tick":"powt","block":"1001","nonce":"1"}"#;
    let events = chain.run_block(1001, vec![
        tx("0x00aa01", ALICE, ZERO_ADDRESS, Decimal::zero(), mint),
        tx("0x00aa02", ALICE, ZERO_ADDRESS, Decimal::zero(), mint),
    ]);

    // the duplicate is dropped before share aggregation: one event, full share
    assert_eq!(events.len(), 1);
    let Event::PoWMinted(minted) = &events[0] else { panic!("expected pow mint") };
    assert_eq!(minted.data.pow_minted_amount, dec("500"));
    assert_eq!(chain.balance(ALICE, "powt").available, dec("500"));
}

#[test]
fn staking_rewards_accrue_and_get_consumed() {
    let mut chain = TestChain::new();

    chain.run_block(900, vec![tx(
        "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "10000", "1000", "1000")
    )]);
    chain.run_block(901, vec![tx(
        "0xm0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "1000", "2")
    )]);
    chain.run_block(902, vec![tx(
        "0xc0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &stake_config_payload(POOL, 1, "abcd", "0.01")
    )]);

    let stake_payload = format!(
        r#"{{"p":"ierc-20","op":"stake","pool":"{POOL}","id":"1","details":[{{"tick":"abcd","amt":"100"}}]}}"#
    );
    let events = chain.run_block(1000, vec![tx(
        "0xs0", ALICE, ZERO_ADDRESS, Decimal::zero(), &stake_payload
    )]);
    assert_eq!(events[0].err_code(), 0, "{}", events[0].err_reason());

    // staked funds sit frozen under the pool address
    assert_eq!(chain.balance(ALICE, "abcd").available, dec("900"));
    assert_eq!(chain.balance(POOL, "abcd").freeze, dec("100"));

    // 100 blocks later: 100 * 0.01 * 100 = 100 rewards
    let pool = &chain.pools[POOL];
    assert!(pool.can_use_rewards(1100, ALICE, &dec("100")));
    assert!(!pool.can_use_rewards(1100, ALICE, &dec("100.000000000000000001")));

    let mut pool = chain.pools[POOL].clone();
    pool.use_rewards(1100, ALICE, &dec("60"));
    assert!(pool.can_use_rewards(1100, ALICE, &dec("40")));
    assert!(!pool.can_use_rewards(1100, ALICE, &dec("41")));
}

#[test]
fn unstake_reverses_the_balance_moves() {
    let mut chain = TestChain::new();
    chain.run_block(900, vec![tx(
        "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "10000", "1000", "1000")
    )]);
    chain.run_block(901, vec![tx(
        "0xm0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "1000", "2")
    )]);
    chain.run_block(902, vec![tx(
        "0xc0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &stake_config_payload(POOL, 1, "abcd", "0.01")
    )]);

    let stake_payload = format!(
        r#"{{"p":"ierc-20","op":"stake","pool":"{POOL}","id":"1","details":[{{"tick":"abcd","amt":"100"}}]}}"#
    );
    chain.run_block(1000, vec![tx("0xs0", ALICE, ZERO_ADDRESS, Decimal::zero(), &stake_payload)]);

    let unstake_payload = format!(
        r#"{{"p":"ierc-20","op":"unstake","pool":"{POOL}","id":"1","details":[{{"tick":"abcd","amt":"40"}}]}}"#
    );
    let events = chain.run_block(1100, vec![tx(
        "0xw0", ALICE, ZERO_ADDRESS, Decimal::zero(), &unstake_payload
    )]);
    assert_eq!(events[0].err_code(), 0, "{}", events[0].err_reason());

    assert_eq!(chain.balance(ALICE, "abcd").available, dec("940"));
    assert_eq!(chain.balance(POOL, "abcd").freeze, dec("60"));

    // more than staked
    let over_payload = format!(
        r#"{{"p":"ierc-20","op":"unstake","pool":"{POOL}","id":"1","details":[{{"tick":"abcd","amt":"100"}}]}}"#
    );
    let events = chain.run_block(1101, vec![tx(
        "0xw1", ALICE, ZERO_ADDRESS, Decimal::zero(), &over_payload
    )]);
    assert_eq!(events[0].err_code(), ErrCode::UnstakingAmountInsufficient.value());
}

#[test]
fn proxy_unstake_requires_an_admin() {
    let mut chain = TestChain::new();
    chain.run_block(900, vec![tx(
        "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "10000", "1000", "1000")
    )]);
    chain.run_block(901, vec![tx(
        "0xm0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "1000", "2")
    )]);
    chain.run_block(902, vec![tx(
        "0xc0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &stake_config_payload(POOL, 1, "abcd", "0.01")
    )]);
    let stake_payload = format!(
        r#"{{"p":"ierc-20","op":"stake","pool":"{POOL}","id":"1","details":[{{"tick":"abcd","amt":"100"}}]}}"#
    );
    chain.run_block(1000, vec![tx("0xs0", ALICE, ZERO_ADDRESS, Decimal::zero(), &stake_payload)]);

    let proxy_payload = format!(
        r#"{{"p":"ierc-20","op":"proxy_unstake","pool":"{POOL}","id":"1","details":[{{"staker":"{ALICE}","tick":"abcd","amt":"100"}}]}}"#
    );

    // a stranger cannot force the unstake
    let events = chain.run_block(1100, vec![tx(
        "0xx0", BOB, ZERO_ADDRESS, Decimal::zero(), &proxy_payload
    )]);
    assert_eq!(events[0].err_code(), ErrCode::ProxyUnstakingNotAdmin.value());

    // the configured admin can (stake_config names ALICE as admin, and the
    // pool owner is the config sender)
    let events = chain.run_block(1101, vec![tx(
        "0xx1", ALICE, ZERO_ADDRESS, Decimal::zero(), &proxy_payload
    )]);
    assert_eq!(events[0].err_code(), 0, "{}", events[0].err_reason());
    assert_eq!(chain.balance(ALICE, "abcd").available, dec("1000"));
}

#[test]
fn transfer_records_are_independent() {
    let mut chain = TestChain::new();
    chain.run_block(900, vec![tx(
        "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "10000", "1000", "1000")
    )]);
    chain.run_block(901, vec![tx(
        "0xm0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "100", "2")
    )]);

    // second record overdraws, third still executes
    let payload = format!(
        r#"{{"p":"ierc-20","op":"transfer","tick":"abcd","to":[
            {{"recv":"{BOB}","amt":"60"}},
            {{"recv":"{BOB}","amt":"60"}},
            {{"recv":"{BOB}","amt":"40"}}
        ]}}"#
    );
    let events = chain.run_block(902, vec![tx(
        "0xt0", ALICE, ZERO_ADDRESS, Decimal::zero(), &payload
    )]);

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].err_code(), 0);
    assert_eq!(events[1].err_code(), ErrCode::InsufficientAvailableFunds.value());
    assert_eq!(events[2].err_code(), 0);
    assert_eq!(events[1].position(), 1);

    assert_eq!(chain.balance(ALICE, "abcd").available, dec("0"));
    assert_eq!(chain.balance(BOB, "abcd").available, dec("100"));
}

#[test]
fn invalid_tx_hash_blocks_state_changes() {
    let mut chain = TestChain::new();
    chain.run_block(900, vec![tx(
        "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "10000", "1000", "1000")
    )]);

    let mut invalid = HashSet::new();
    invalid.insert("0xbad0".to_string());
    chain.invalid_hashes = Arc::new(invalid);

    let events = chain.run_block(901, vec![tx(
        "0xbad0", ALICE, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "100", "2")
    )]);

    assert_eq!(events[0].err_code(), ErrCode::InvalidTxHash.value());
    assert_eq!(chain.balance(ALICE, "abcd").available, dec("0"));
}

#[test]
fn replay_is_deterministic() {
    let run = || {
        let mut chain = TestChain::new();
        let mut events = Vec::new();
        events.extend(chain.run_block(900, vec![tx(
            "0xd0", ALICE, ZERO_ADDRESS, Decimal::zero(),
            &deploy_payload("abcd", "10000", "1000", "1000")
        )]));
        events.extend(chain.run_block(901, vec![
            tx("0xm0", ALICE, ZERO_ADDRESS, Decimal::zero(), &mint_payload("abcd", "1000", "2")),
            tx("0xm1", BOB, ZERO_ADDRESS, Decimal::zero(), &mint_payload("abcd", "500", "3")),
        ]));
        events.extend(chain.run_block(902, vec![tx(
            "0xc0", ALICE, ZERO_ADDRESS, Decimal::zero(),
            &stake_config_payload(POOL, 1, "abcd", "0.01")
        )]));
        let stake_payload = format!(
            r#"{{"p":"ierc-20","op":"stake","pool":"{POOL}","id":"1","details":[{{"tick":"abcd","amt":"100"}}]}}"#
        );
        events.extend(chain.run_block(903, vec![tx(
            "0xs0", ALICE, ZERO_ADDRESS, Decimal::zero(), &stake_payload
        )]));
        (events, chain.ticks, chain.balances, chain.pools)
    };

    let (events_a, ticks_a, balances_a, pools_a) = run();
    let (events_b, ticks_b, balances_b, pools_b) = run();

    assert_eq!(events_a, events_b);
    assert_eq!(ticks_a, ticks_b);
    assert_eq!(balances_a, balances_b);
    assert_eq!(pools_a, pools_b);
}

#[test]
fn tick_conservation_across_market_operations() {
    let mut chain = TestChain::new();
    let (seller, seller_key) = signer(11);

    chain.run_block(100, vec![tx(
        "0xd0", &seller, ZERO_ADDRESS, Decimal::zero(),
        &deploy_payload("abcd", "1000", "100", "200")
    )]);
    chain.run_block(101, vec![tx(
        "0xm1", &seller, ZERO_ADDRESS, Decimal::zero(),
        &mint_payload("abcd", "100", "2")
    )]);

    let approval = Approval::new("abcd", &seller, PLATFORM_ADDRESS, "30", "0.01", "9");
    let sign = sign_approval(&approval, &seller_key);
    let freeze_payload = format!(
        r#"{{"p":"ierc-20","op":"freeze_sell","freeze":[{{"tick":"abcd","platform":"{PLATFORM_ADDRESS}","seller":"{seller}","amt":"30","value":"0.01","gasPrice":"1","sign":"{sign}","nonce":"9"}}]}}"#
    );
    chain.run_block(102, vec![tx("0xf1", BOB, PLATFORM_ADDRESS, wei("1"), &freeze_payload)]);

    let proxy_payload = format!(
        r#"{{"p":"ierc-20","op":"proxy_transfer","proxy":[{{"tick":"abcd","from":"{seller}","to":"{BOB}","amt":"30","value":"0.01","sign":"{sign}","nonce":"9"}}]}}"#
    );
    chain.run_block(103, vec![tx("0xp1", PLATFORM_ADDRESS, ZERO_ADDRESS, wei("1"), &proxy_payload)]);

    // sum over every holder equals the minted supply
    let total: Decimal = chain
        .balances
        .values()
        .filter(|b| b.tick == "abcd")
        .map(Balance::total)
        .fold(Decimal::zero(), |acc, t| acc + t);

    let Tick::Ierc20(tick) = &chain.ticks["abcd"] else { panic!("wrong tick kind") };
    assert_eq!(total, tick.supply);
}
