//! Chain blocks and the raw transactions they carry.

use crate::{commands::Command, decimal::Decimal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number:      u64,
    pub hash:        String,
    pub parent_hash: String
}

/// Snapshot of where the indexer stands relative to the chain head.
#[derive(Debug, Clone, Default)]
pub struct BlockHandleStatus {
    pub latest_block:       Option<BlockHeader>,
    pub last_indexed_block: Option<BlockHeader>,
    pub last_sync_block:    Option<BlockHeader>
}

#[derive(Debug, Clone)]
pub struct Block {
    pub number:            u64,
    pub parent_hash:       String,
    pub hash:              String,
    pub transaction_count: usize,
    pub transactions:      Vec<Transaction>,
    pub is_processed:      bool,
    pub timestamp:         u64
}

impl Block {
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            number:      self.number,
            hash:        self.hash.clone(),
            parent_hash: self.parent_hash.clone()
        }
    }
}

/// A raw transaction plus its processing outcome. `command` is attached once
/// the calldata has been parsed; transactions that never carried protocol
/// data are stored without one.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub block_number: u64,
    pub position:     i64,
    pub hash:         String,
    pub from:         String,
    pub to:           String,
    pub data:         String,
    pub value:        Decimal,
    pub gas:          Decimal,
    pub gas_price:    Decimal,
    pub nonce:        u64,
    pub timestamp:    u64,

    pub is_processed: bool,
    pub code:         i32,
    pub remark:       String,

    pub command: Option<Command>
}

impl Transaction {
    /// Marks the transaction processed with a failure outcome.
    pub fn mark_failed(&mut self, code: i32, remark: impl Into<String>) {
        self.is_processed = true;
        self.code = code;
        self.remark = remark.into();
    }
}
