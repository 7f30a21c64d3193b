//! In-memory collaborator backends, used by tests and tooling.

use crate::coin::{Coin, outpoint_key};
use crate::error::{Error, Result};
use crate::source::{BlockLocator, BlockSource, BlockUndo, CoinsView};
use crate::store::{Store, WriteBatch};
use bitcoin::{Block, BlockHash, OutPoint};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// A [`Store`] over a sorted map. Batches are applied under one write
/// lock, so commits are atomic with respect to readers.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.map.read().contains_key(key))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut map = self.map.write();
        for (key, value) in batch.into_ops() {
            map.insert(key, value);
        }
        Ok(())
    }

    fn iterate(
        &self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_>> {
        let entries: Vec<_> = self
            .map
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn estimate_size(&self) -> Result<u64> {
        Ok(self
            .map
            .read()
            .iter()
            .map(|(key, value)| (key.len() + value.len()) as u64)
            .sum())
    }
}

struct SourceEntry {
    block: Block,
    undo: BlockUndo,
    height: u32,
}

/// A [`BlockSource`] over an in-memory block tree. Disconnected branches
/// stay readable, exactly like an on-disk block index.
#[derive(Default)]
pub struct MemoryBlockSource {
    entries: RwLock<HashMap<BlockHash, SourceEntry>>,
}

impl MemoryBlockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block with its undo record; returns its locator.
    pub fn add_block(&self, block: Block, undo: BlockUndo, height: u32) -> BlockLocator {
        let hash = block.block_hash();
        self.entries.write().insert(
            hash,
            SourceEntry {
                block,
                undo,
                height,
            },
        );
        BlockLocator { hash, height }
    }
}

impl BlockSource for MemoryBlockSource {
    fn block(&self, hash: &BlockHash) -> Result<Block> {
        self.entries
            .read()
            .get(hash)
            .map(|entry| entry.block.clone())
            .ok_or_else(|| Error::Io(format!("block {hash} not found")))
    }

    fn undo(&self, hash: &BlockHash) -> Result<BlockUndo> {
        self.entries
            .read()
            .get(hash)
            .map(|entry| entry.undo.clone())
            .ok_or_else(|| Error::Io(format!("undo data for block {hash} not found")))
    }

    fn prev(&self, hash: &BlockHash) -> Result<Option<BlockLocator>> {
        let entries = self.entries.read();
        let entry = entries
            .get(hash)
            .ok_or_else(|| Error::Io(format!("block {hash} not found")))?;
        if entry.height == 0 {
            return Ok(None);
        }

        let parent_hash = entry.block.header.prev_blockhash;
        let parent = entries
            .get(&parent_hash)
            .ok_or_else(|| Error::Io(format!("parent block {parent_hash} not found")))?;
        Ok(Some(BlockLocator {
            hash: parent_hash,
            height: parent.height,
        }))
    }

    fn ancestor(&self, tip: &BlockLocator, height: u32) -> Result<BlockLocator> {
        if height > tip.height {
            return Err(Error::Invariant(format!(
                "ancestor height {height} is above tip height {}",
                tip.height
            )));
        }

        let mut current = *tip;
        while current.height > height {
            current = self.prev(&current.hash)?.ok_or_else(|| {
                Error::Invariant(format!("no ancestor of {} at height {height}", tip.hash))
            })?;
        }
        Ok(current)
    }
}

/// A [`CoinsView`] over a sorted in-memory coin map.
pub struct MemoryCoinsView {
    best: RwLock<BlockLocator>,
    coins: RwLock<BTreeMap<[u8; 36], (OutPoint, Coin)>>,
}

impl MemoryCoinsView {
    pub fn new(best: BlockLocator) -> Self {
        Self {
            best: RwLock::new(best),
            coins: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn add_coin(&self, outpoint: OutPoint, coin: Coin) {
        self.coins
            .write()
            .insert(outpoint_key(&outpoint), (outpoint, coin));
    }

    pub fn remove_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins
            .write()
            .remove(&outpoint_key(outpoint))
            .map(|(_, coin)| coin)
    }

    pub fn set_best(&self, best: BlockLocator) {
        *self.best.write() = best;
    }
}

impl CoinsView for MemoryCoinsView {
    fn best_block(&self) -> BlockLocator {
        *self.best.read()
    }

    fn coins(&self) -> Box<dyn Iterator<Item = Result<(OutPoint, Coin)>> + '_> {
        let entries: Vec<_> = self.coins.read().values().cloned().collect();
        Box::new(entries.into_iter().map(Ok))
    }

    fn estimate_size(&self) -> u64 {
        self.coins
            .read()
            .values()
            .map(|(_, coin)| 36 + 13 + coin.script_pubkey.len() as u64)
            .sum()
    }
}
