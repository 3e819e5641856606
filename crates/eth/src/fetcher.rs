//! JSON-RPC block fetcher.
//!
//! Fetches full blocks over plain `eth_*` calls. When several endpoints are
//! configured every block is fetched from all of them and compared by
//! `(hash, tx_count)` so a single misbehaving node cannot poison the index.

use async_trait::async_trait;
use bigdecimal::num_bigint::BigInt;
use ierc_protocol::ProtocolParser;
use ierc_types::{protocol::ZERO_ADDRESS, Block, BlockHeader, Decimal, Transaction};
use ierc_utils::parse_hex_u64;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rpc transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("block {0} not available")]
    MissingBlock(u64),

    #[error("block {0} inconsistent across endpoints")]
    BlockInconsistent(u64),

    #[error("invalid rpc response: {0}")]
    InvalidResponse(String)
}

#[async_trait]
pub trait BlockFetcher: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64, FetchError>;

    /// Header at `number`; 0 means the chain head.
    async fn header_by_number(&self, number: u64) -> Result<BlockHeader, FetchError>;

    async fn block_by_number(&self, number: u64) -> Result<Block, FetchError>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id:      u64,
    method:  &'a str,
    params:  Value
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error:  Option<RpcErrorObject>
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code:    i64,
    message: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHeader {
    number:      String,
    hash:        String,
    parent_hash: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    number:       String,
    hash:         String,
    parent_hash:  String,
    timestamp:    String,
    transactions: Vec<RawTransaction>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    hash:      String,
    from:      String,
    to:        Option<String>,
    input:     String,
    value:     String,
    gas:       String,
    gas_price: Option<String>,
    nonce:     String
}

pub struct RpcBlockFetcher {
    endpoints: Vec<Url>,
    client:    reqwest::Client,
    parser:    ProtocolParser
}

impl RpcBlockFetcher {
    pub fn new(endpoints: Vec<Url>, parser: ProtocolParser) -> Result<Self, FetchError> {
        if endpoints.is_empty() {
            return Err(FetchError::InvalidResponse("missing rpc endpoints".to_string()));
        }

        Ok(Self { endpoints, client: reqwest::Client::new(), parser })
    }

    /// One JSON-RPC call; `Ok(None)` is a well-formed null result.
    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &Url,
        method: &str,
        params: Value
    ) -> Result<Option<T>, FetchError> {
        let request = RpcRequest { jsonrpc: "2.0", id: 1, method, params };

        let response: RpcResponse<T> = self
            .client
            .post(endpoint.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(FetchError::Rpc { code: err.code, message: err.message });
        }

        Ok(response.result)
    }

    async fn raw_block(&self, endpoint: &Url, number: u64) -> Result<RawBlock, FetchError> {
        let tag = format!("0x{number:x}");
        self.call(endpoint, "eth_getBlockByNumber", json!([tag, true]))
            .await?
            .ok_or(FetchError::MissingBlock(number))
    }

    fn to_domain(&self, raw: RawBlock) -> Result<Block, FetchError> {
        let number = parse_hex_u64(&raw.number)
            .ok_or_else(|| FetchError::InvalidResponse(format!("block number {}", raw.number)))?;
        let timestamp = parse_hex_u64(&raw.timestamp).ok_or_else(|| {
            FetchError::InvalidResponse(format!("block timestamp {}", raw.timestamp))
        })?;

        let mut transactions = Vec::new();
        for (position, tx) in raw.transactions.iter().enumerate() {
            let Some(data) = decode_hex(&tx.input) else {
                return Err(FetchError::InvalidResponse(format!("calldata of {}", tx.hash)));
            };

            // only inscription-carrying transactions are worth storing
            if self.parser.check_format(&data).is_err() {
                continue;
            }

            let data = String::from_utf8(data)
                .map_err(|_| FetchError::InvalidResponse(format!("calldata of {}", tx.hash)))?;

            transactions.push(Transaction {
                block_number: number,
                position:     position as i64,
                hash:         tx.hash.clone(),
                from:         tx.from.clone(),
                to:           tx.to.clone().unwrap_or_else(|| ZERO_ADDRESS.to_string()),
                data,
                value:        hex_to_decimal(&tx.value)?,
                gas:          hex_to_decimal(&tx.gas)?,
                gas_price:    tx
                    .gas_price
                    .as_deref()
                    .map(hex_to_decimal)
                    .transpose()?
                    .unwrap_or_default(),
                nonce:        parse_hex_u64(&tx.nonce).unwrap_or_default(),
                timestamp,
                is_processed: false,
                code:         0,
                remark:       String::new(),
                command:      None
            });
        }

        Ok(Block {
            number,
            parent_hash: raw.parent_hash,
            hash: raw.hash,
            transaction_count: transactions.len(),
            is_processed: transactions.is_empty(),
            transactions,
            timestamp
        })
    }
}

#[async_trait]
impl BlockFetcher for RpcBlockFetcher {
    async fn latest_block_number(&self) -> Result<u64, FetchError> {
        let result: String = self
            .call(&self.endpoints[0], "eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| FetchError::InvalidResponse("eth_blockNumber: empty result".to_string()))?;

        parse_hex_u64(&result)
            .ok_or_else(|| FetchError::InvalidResponse(format!("block number {result}")))
    }

    async fn header_by_number(&self, number: u64) -> Result<BlockHeader, FetchError> {
        let tag = if number == 0 {
            Value::String("latest".to_string())
        } else {
            Value::String(format!("0x{number:x}"))
        };

        let raw: RawHeader = self
            .call(&self.endpoints[0], "eth_getBlockByNumber", json!([tag, false]))
            .await?
            .ok_or(FetchError::MissingBlock(number))?;

        Ok(BlockHeader {
            number:      parse_hex_u64(&raw.number).ok_or_else(|| {
                FetchError::InvalidResponse(format!("block number {}", raw.number))
            })?,
            hash:        raw.hash,
            parent_hash: raw.parent_hash
        })
    }

    async fn block_by_number(&self, number: u64) -> Result<Block, FetchError> {
        let mut agreed: Option<RawBlock> = None;

        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            let candidate = self.raw_block(endpoint, number).await?;

            if let Some(block) = &agreed {
                if candidate.hash != block.hash
                    || candidate.transactions.len() != block.transactions.len()
                {
                    warn!(
                        endpoint = idx,
                        number,
                        first_hash = %block.hash,
                        second_hash = %candidate.hash,
                        "block mismatch between endpoints"
                    );
                    return Err(FetchError::BlockInconsistent(number));
                }
            }

            agreed = Some(candidate);
        }

        let raw = agreed.ok_or(FetchError::MissingBlock(number))?;
        self.to_domain(raw)
    }
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.len() % 2 != 0 {
        return None;
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

fn hex_to_decimal(value: &str) -> Result<Decimal, FetchError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    BigInt::parse_bytes(digits.as_bytes(), 16)
        .map(Decimal::from)
        .ok_or_else(|| FetchError::InvalidResponse(format!("hex quantity {value}")))
}
