//! Data model for registered files and the hash-linked ledger.

use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::crypto::{canonical_json, sha256_hex};
use crate::error::ChainFault;

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Payload of one ledger entry: a registered file's name and content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub digest: String,
}

impl Record {
    pub fn new(name: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            digest: digest.into(),
        }
    }

    fn genesis() -> Self {
        Self::new("genesis", "0")
    }
}

/// One immutable, self-hashing ledger entry.
///
/// All fields are fixed at construction. The serialized form is also the
/// on-disk form; deserializing trusts the stored `hash` verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    /// Seconds since the Unix epoch.
    timestamp: f64,
    record: Record,
    previous_hash: String,
    hash: String,
}

impl Block {
    /// Build a block and derive its hash.
    pub fn new(index: u64, timestamp: f64, record: Record, previous_hash: impl Into<String>) -> Self {
        let mut block = Self {
            index,
            timestamp,
            record,
            previous_hash: previous_hash.into(),
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Rebuild a block from persisted fields without recomputing its hash.
    pub fn from_stored(
        index: u64,
        timestamp: f64,
        record: Record,
        previous_hash: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            index,
            timestamp,
            record,
            previous_hash: previous_hash.into(),
            hash: hash.into(),
        }
    }

    /// SHA-256 over the sorted-key encoding of index, timestamp, record and
    /// previous hash. The stored `hash` field is not an input.
    pub fn calculate_hash(&self) -> String {
        let content = json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "record": &self.record,
            "previous_hash": &self.previous_hash,
        });
        sha256_hex(&canonical_json(&content))
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Display view of a registered file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub position: u64,
    pub name: String,
    pub digest: String,
    pub timestamp: f64,
}

/// Append-only chain of blocks, genesis first.
///
/// The ledger never validates or persists on its own: callers run
/// [`Ledger::validate`] before saving and [`Ledger::repair`] when they want a
/// broken chain fixed.
#[derive(Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    validation_errors: Vec<ChainFault>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// A ledger holding only a fresh genesis block.
    pub fn new() -> Self {
        let mut ledger = Self {
            chain: Vec::new(),
            validation_errors: Vec::new(),
        };
        ledger.create_genesis();
        ledger
    }

    /// Wrap blocks loaded from disk as-is. No validation happens here.
    pub fn from_blocks(chain: Vec<Block>) -> Self {
        Self {
            chain,
            validation_errors: Vec::new(),
        }
    }

    /// Replace the whole chain with a single genesis block.
    pub fn create_genesis(&mut self) {
        self.chain = vec![Block::new(
            0,
            now_timestamp(),
            Record::genesis(),
            GENESIS_PREVIOUS_HASH,
        )];
    }

    /// Drop every entry and start over from genesis.
    pub fn reset(&mut self) {
        self.create_genesis();
        self.validation_errors.clear();
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    /// Faults recorded by the most recent [`Ledger::validate`] call.
    pub fn validation_errors(&self) -> &[ChainFault] {
        &self.validation_errors
    }

    /// Link a new block for `record` onto the current tail.
    ///
    /// The tail's stored hash is trusted as-is, so an already broken chain
    /// stays broken.
    pub fn append(&mut self, record: Record) -> Block {
        let Some(tail) = self.chain.last() else {
            self.create_genesis();
            return self.append(record);
        };
        let block = Block::new(self.chain.len() as u64, now_timestamp(), record, tail.hash.clone());
        self.chain.push(block.clone());
        block
    }

    /// Check genesis, hashes, links and indices in order.
    ///
    /// Stops at the first fault, so at most one error is recorded.
    pub fn validate(&mut self) -> bool {
        self.validation_errors.clear();
        match self.first_fault() {
            Some(fault) => {
                self.validation_errors.push(fault);
                false
            }
            None => true,
        }
    }

    fn first_fault(&self) -> Option<ChainFault> {
        let Some(genesis) = self.chain.first() else {
            return Some(ChainFault::Empty);
        };
        if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
            return Some(ChainFault::InvalidGenesis);
        }

        for (i, pair) in self.chain.windows(2).enumerate() {
            let (previous, current) = (&pair[0], &pair[1]);
            let position = i + 1;
            if current.calculate_hash() != current.hash {
                return Some(ChainFault::InvalidHash(position));
            }
            if current.previous_hash != previous.hash {
                return Some(ChainFault::BrokenLink(position));
            }
            if current.index != position as u64 {
                return Some(ChainFault::NonSequentialIndex(position));
            }
        }
        None
    }

    /// Rebuild hash linkage from each block's timestamp and record.
    ///
    /// Stored hashes, links and indices are discarded and re-derived in
    /// position order. A chain of one block or less is replaced by a fresh
    /// genesis. Payloads are trusted verbatim.
    pub fn repair(&mut self) -> bool {
        if self.chain.len() <= 1 {
            self.create_genesis();
            return true;
        }

        let mut rebuilt: Vec<Block> = Vec::with_capacity(self.chain.len());
        for (position, block) in self.chain.iter().enumerate() {
            let previous_hash = rebuilt
                .last()
                .map(|b| b.hash.clone())
                .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());
            rebuilt.push(Block::new(
                position as u64,
                block.timestamp,
                block.record.clone(),
                previous_hash,
            ));
        }
        self.chain = rebuilt;
        true
    }

    /// Registered files in chain order, genesis excluded.
    pub fn entries(&self) -> Vec<FileEntry> {
        self.chain
            .iter()
            .skip(1)
            .map(|b| FileEntry {
                position: b.index,
                name: b.record.name.clone(),
                digest: b.record.digest.clone(),
                timestamp: b.timestamp,
            })
            .collect()
    }

    /// Most recent non-genesis block registered under `name`.
    pub fn find_latest_by_name(&self, name: &str) -> Option<&Block> {
        self.chain
            .iter()
            .skip(1)
            .rev()
            .find(|b| b.record.name == name)
    }
}

/// Current time as fractional seconds since the Unix epoch.
pub fn now_timestamp() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}
