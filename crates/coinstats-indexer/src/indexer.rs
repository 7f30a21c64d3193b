//! The indexer core: drives the rolling digest and the aggregate counters
//! forward through blocks and backward through undo records, persisting a
//! snapshot for every height.

use crate::coin::Coin;
use crate::error::{Error, Result};
use crate::params::{block_subsidy, is_duplicate_coinbase_height};
use crate::schema::{self, Snapshot, UnspendableTotals};
use crate::source::{BlockLocator, BlockSource, BlockUndo};
use crate::store::{Store, WriteBatch};
use bitcoin::{Block, BlockHash, OutPoint};
use coinstats_crypto::{LtHash, MuHash3072, MultisetHash};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The operations a block index exposes to the harness.
///
/// The harness owns the handle and serializes `init`, `apply_block` and
/// `rewind`; `lookup` is read-only and may run concurrently with them.
pub trait UtxoIndex {
    fn name(&self) -> &'static str;

    /// Load the persisted state. `best` is the block the harness last saw
    /// the index reach, or `None` on first start.
    fn init(&mut self, best: Option<BlockLocator>) -> Result<()>;

    /// Fold one block into the digest and persist its snapshot.
    fn apply_block(&mut self, block: &Block, at: BlockLocator) -> Result<()>;

    /// Unwind from `current_tip` down to (but not including) `new_tip`.
    /// Returns `false` when interrupted, in which case nothing was
    /// committed.
    fn rewind(&mut self, current_tip: BlockLocator, new_tip: BlockLocator) -> Result<bool>;

    /// Snapshot for the given block, whether or not it is still on the
    /// active chain.
    fn lookup(&self, block: BlockLocator) -> Result<Option<Snapshot>>;

    /// The index's own key-value store.
    fn store(&self) -> &dyn Store;
}

/// Running counters that accompany the digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Aggregates {
    tx_outputs: u64,
    bogo_size: u64,
    total_amount: i64,
    disk_size: u64,
    unspendables: UnspendableTotals,
}

impl Aggregates {
    fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            tx_outputs: snapshot.tx_outputs,
            bogo_size: snapshot.bogo_size,
            total_amount: snapshot.total_amount,
            disk_size: snapshot.disk_size,
            unspendables: snapshot.unspendables.unwrap_or_default(),
        }
    }
}

/// Rolling UTXO-set digest index, generic over the multiset hash bound at
/// construction time.
///
/// Single-writer: all mutating operations stage their changes locally and
/// touch `self` only after the store batch has committed, so a failed
/// write leaves the in-memory state unchanged.
pub struct CoinStatsIndex<H, S, B> {
    store: S,
    source: B,
    track_unspendables: bool,
    muset: H,
    aggregates: Aggregates,
    best: Option<BlockLocator>,
    interrupt: Arc<AtomicBool>,
}

/// Index variant backed by the multiplicative 3072-bit hash.
pub type MuHashIndex<S, B> = CoinStatsIndex<MuHash3072, S, B>;

/// Index variant backed by the additive 2048-byte hash.
pub type LtHashIndex<S, B> = CoinStatsIndex<LtHash, S, B>;

impl<H, S, B> CoinStatsIndex<H, S, B>
where
    H: MultisetHash,
    S: Store,
    B: BlockSource,
{
    /// Create an index over the given collaborators. `track_unspendables`
    /// selects the extended snapshot variant, which partitions provably
    /// unspendable value into dedicated buckets instead of dropping it.
    pub fn new(store: S, source: B, track_unspendables: bool) -> Self {
        Self {
            store,
            source,
            track_unspendables,
            muset: H::empty(),
            aggregates: Aggregates::default(),
            best: None,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between heights during long rewinds; setting it makes
    /// the operation abort cleanly without committing.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Block the in-memory state is consistent with.
    pub fn best(&self) -> Option<BlockLocator> {
        self.best
    }

    /// Digest tag of the current multiset.
    pub fn digest(&self) -> [u8; 32] {
        self.muset.digest()
    }

    /// Digest in display form.
    pub fn digest_hex(&self) -> String {
        self.muset.digest_hex()
    }

    /// Count of unspent outputs currently represented.
    pub fn tx_outputs(&self) -> u64 {
        self.aggregates.tx_outputs
    }

    /// Sum of values of unspent outputs, in satoshis.
    pub fn total_amount(&self) -> i64 {
        self.aggregates.total_amount
    }

    fn make_snapshot(&self, muset: &H, aggregates: &Aggregates) -> Snapshot {
        Snapshot {
            digest: muset.digest(),
            tx_outputs: aggregates.tx_outputs,
            bogo_size: aggregates.bogo_size,
            total_amount: aggregates.total_amount,
            disk_size: aggregates.disk_size,
            unspendables: self.track_unspendables.then_some(aggregates.unspendables),
        }
    }

    fn read_height_record(&self, height: u32) -> Result<Option<(BlockHash, Snapshot)>> {
        match self.store.read(&schema::height_key(height))? {
            Some(bytes) => schema::decode_height_value(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Verify that the stored record at `height - 1` belongs to this
    /// block's parent.
    fn check_parent_linkage(&self, block: &Block, height: u32) -> Result<()> {
        let (stored_parent, _) = self.read_height_record(height - 1)?.ok_or_else(|| {
            Error::Corrupt(format!("no snapshot for parent height {}", height - 1))
        })?;
        let expected_parent = block.header.prev_blockhash;
        if stored_parent != expected_parent {
            return Err(Error::Corrupt(format!(
                "snapshot at height {} belongs to unexpected block {stored_parent}, \
                 expected {expected_parent}",
                height - 1
            )));
        }
        Ok(())
    }

    /// Walk one block forward over staged state.
    fn roll_forward(
        &self,
        block: &Block,
        at: BlockLocator,
        undo: &BlockUndo,
        muset: &mut H,
        aggregates: &mut Aggregates,
    ) -> Result<()> {
        let duplicate_height = is_duplicate_coinbase_height(at.height, &at.hash);
        let mut seen_txids = HashSet::with_capacity(block.txdata.len());
        let mut spent = H::empty();
        let mut block_value_in: i64 = 0;
        let mut block_value_out: i64 = 0;

        for (i, tx) in block.txdata.iter().enumerate() {
            let txid = tx.compute_txid();
            let is_coinbase = i == 0;

            // At the historical duplicate heights the coinbase reuses an
            // already absorbed txid, and within any one block a repeated
            // txid contributes outputs only once.
            let skip_outputs = !seen_txids.insert(txid) || (duplicate_height && is_coinbase);
            if skip_outputs {
                tracing::warn!(
                    height = at.height,
                    %txid,
                    "Skipping outputs of duplicate coinbase txid"
                );
            }

            for (vout, output) in tx.output.iter().enumerate() {
                let coin = Coin::from_txout(output, at.height, is_coinbase);
                block_value_out += coin.amount as i64;
                if skip_outputs {
                    continue;
                }
                if coin.is_unspendable() {
                    if self.track_unspendables {
                        if coin.is_op_return() {
                            aggregates.unspendables.op_return += coin.amount as i64;
                        } else {
                            aggregates.unspendables.big_script += coin.amount as i64;
                        }
                    }
                    continue;
                }

                let outpoint = OutPoint {
                    txid,
                    vout: vout as u32,
                };
                muset.insert(&coin.hash_element(&outpoint));
                aggregates.tx_outputs += 1;
                aggregates.total_amount += coin.amount as i64;
                aggregates.bogo_size += coin.bogo_size();
            }

            // The coinbase spends no former output and has no undo entry;
            // at height 0 only the creation step runs.
            if i > 0 && at.height > 0 {
                let tx_undo = undo.tx_undo.get(i - 1).ok_or_else(|| {
                    Error::Corrupt(format!("no undo entry for transaction {i} at {}", at.hash))
                })?;
                if tx_undo.spent_coins.len() != tx.input.len() {
                    return Err(Error::Corrupt(format!(
                        "undo entry for transaction {i} at {} does not match its inputs",
                        at.hash
                    )));
                }

                for (input, coin) in tx.input.iter().zip(&tx_undo.spent_coins) {
                    let outpoint = input.previous_output;
                    block_value_in += coin.amount as i64;

                    spent.insert(&coin.hash_element(&outpoint));
                    aggregates.tx_outputs = aggregates.tx_outputs.checked_sub(1).ok_or_else(
                        || Error::Corrupt("spent more outputs than the index tracks".into()),
                    )?;
                    aggregates.bogo_size = aggregates
                        .bogo_size
                        .checked_sub(coin.bogo_size())
                        .ok_or_else(|| {
                            Error::Corrupt("spent more bytes than the index tracks".into())
                        })?;
                    aggregates.total_amount -= coin.amount as i64;
                }
            }
        }

        // One group operation for the whole block's spends.
        muset.split(&spent);

        if self.track_unspendables {
            let unclaimed =
                (block_value_in + block_subsidy(at.height) as i64 - block_value_out).max(0);
            aggregates.unspendables.unclaimed_rewards += unclaimed;
        }

        Ok(())
    }

    /// Walk one block backward over staged state: the exact inverse of
    /// [`Self::roll_forward`]. Counters move the opposite direction and
    /// nothing is written.
    fn roll_back(
        &self,
        block: &Block,
        at: BlockLocator,
        muset: &mut H,
        aggregates: &mut Aggregates,
    ) -> Result<()> {
        if at.height > 0 {
            self.check_parent_linkage(block, at.height)?;
        }
        let undo = if at.height > 0 {
            self.source.undo(&at.hash)?
        } else {
            BlockUndo::default()
        };

        let duplicate_height = is_duplicate_coinbase_height(at.height, &at.hash);
        let mut seen_txids = HashSet::with_capacity(block.txdata.len());
        let mut created = H::empty();
        let mut respent = H::empty();
        let mut block_value_in: i64 = 0;
        let mut block_value_out: i64 = 0;

        for (i, tx) in block.txdata.iter().enumerate() {
            let txid = tx.compute_txid();
            let is_coinbase = i == 0;

            let skip_outputs = !seen_txids.insert(txid) || (duplicate_height && is_coinbase);

            for (vout, output) in tx.output.iter().enumerate() {
                let coin = Coin::from_txout(output, at.height, is_coinbase);
                block_value_out += coin.amount as i64;
                if skip_outputs {
                    continue;
                }
                if coin.is_unspendable() {
                    if self.track_unspendables {
                        if coin.is_op_return() {
                            aggregates.unspendables.op_return -= coin.amount as i64;
                        } else {
                            aggregates.unspendables.big_script -= coin.amount as i64;
                        }
                    }
                    continue;
                }

                let outpoint = OutPoint {
                    txid,
                    vout: vout as u32,
                };
                created.insert(&coin.hash_element(&outpoint));
                aggregates.tx_outputs = aggregates.tx_outputs.checked_sub(1).ok_or_else(
                    || Error::Corrupt("removed more outputs than the index tracks".into()),
                )?;
                aggregates.bogo_size = aggregates
                    .bogo_size
                    .checked_sub(coin.bogo_size())
                    .ok_or_else(|| {
                        Error::Corrupt("removed more bytes than the index tracks".into())
                    })?;
                aggregates.total_amount -= coin.amount as i64;
            }

            if i > 0 && at.height > 0 {
                let tx_undo = undo.tx_undo.get(i - 1).ok_or_else(|| {
                    Error::Corrupt(format!("no undo entry for transaction {i} at {}", at.hash))
                })?;
                if tx_undo.spent_coins.len() != tx.input.len() {
                    return Err(Error::Corrupt(format!(
                        "undo entry for transaction {i} at {} does not match its inputs",
                        at.hash
                    )));
                }

                for (input, coin) in tx.input.iter().zip(&tx_undo.spent_coins) {
                    let outpoint = input.previous_output;
                    block_value_in += coin.amount as i64;

                    respent.insert(&coin.hash_element(&outpoint));
                    aggregates.tx_outputs += 1;
                    aggregates.bogo_size += coin.bogo_size();
                    aggregates.total_amount += coin.amount as i64;
                }
            }
        }

        muset.split(&created);
        muset.combine(&respent);

        if self.track_unspendables {
            let unclaimed =
                (block_value_in + block_subsidy(at.height) as i64 - block_value_out).max(0);
            aggregates.unspendables.unclaimed_rewards -= unclaimed;
        }

        Ok(())
    }
}

impl<H, S, B> UtxoIndex for CoinStatsIndex<H, S, B>
where
    H: MultisetHash,
    S: Store,
    B: BlockSource,
{
    fn name(&self) -> &'static str {
        "coinstatsindex"
    }

    fn init(&mut self, best: Option<BlockLocator>) -> Result<()> {
        let muset = match self.store.read(&schema::MUSET_KEY)? {
            Some(bytes) => H::deserialize(&bytes).ok_or_else(|| {
                Error::Corrupt(format!("cannot decode the live {} state", H::NAME))
            })?,
            None => {
                // A miss is only a fresh start when the key is truly
                // absent. A store that reports the key present but hands
                // back no value must not be silently wiped.
                if self.store.exists(&schema::MUSET_KEY)? {
                    return Err(Error::Corrupt(format!(
                        "cannot read the live {} state",
                        H::NAME
                    )));
                }

                self.muset = H::empty();
                self.aggregates = Aggregates::default();
                self.best = None;
                tracing::info!(hash = H::NAME, "Initialized empty index");
                return Ok(());
            }
        };

        let Some(at) = best else {
            return Err(Error::Corrupt(
                "live state is present but no best block was supplied".into(),
            ));
        };

        let (stored_hash, snapshot) = self.read_height_record(at.height)?.ok_or_else(|| {
            Error::Corrupt(format!("no snapshot at best height {}", at.height))
        })?;
        if stored_hash != at.hash {
            return Err(Error::Corrupt(format!(
                "snapshot at height {} belongs to block {stored_hash}, expected {}",
                at.height, at.hash
            )));
        }
        if snapshot.digest != muset.digest() {
            return Err(Error::Corrupt(
                "live digest does not match the best block's snapshot".into(),
            ));
        }

        self.muset = muset;
        self.aggregates = Aggregates::from_snapshot(&snapshot);
        self.best = Some(at);
        tracing::info!(
            hash = H::NAME,
            height = at.height,
            digest = %self.digest_hex(),
            "Loaded index state"
        );
        Ok(())
    }

    fn apply_block(&mut self, block: &Block, at: BlockLocator) -> Result<()> {
        // Only the creation step runs for the genesis block; everything
        // else first proves it extends what the index already holds.
        let undo = if at.height > 0 {
            self.check_parent_linkage(block, at.height)?;
            self.source.undo(&at.hash)?
        } else {
            BlockUndo::default()
        };

        let mut muset = self.muset.clone();
        let mut aggregates = self.aggregates;
        self.roll_forward(block, at, &undo, &mut muset, &mut aggregates)?;

        aggregates.disk_size = self.store.estimate_size()?;

        let snapshot = self.make_snapshot(&muset, &aggregates);
        let mut batch = WriteBatch::new();
        batch.put(
            schema::height_key(at.height).to_vec(),
            schema::encode_height_value(&at.hash, &snapshot),
        );
        batch.put(schema::MUSET_KEY.to_vec(), muset.serialize());
        self.store.write_batch(batch)?;

        self.muset = muset;
        self.aggregates = aggregates;
        self.best = Some(at);

        tracing::debug!(
            height = at.height,
            hash = %at.hash,
            tx_outputs = aggregates.tx_outputs,
            "Applied block"
        );
        Ok(())
    }

    fn rewind(&mut self, current_tip: BlockLocator, new_tip: BlockLocator) -> Result<bool> {
        if self.source.ancestor(&current_tip, new_tip.height)? != new_tip {
            return Err(Error::Invariant(
                "rewind target is not an ancestor of the current tip".into(),
            ));
        }

        let mut muset = self.muset.clone();
        let mut aggregates = self.aggregates;
        let mut batch = WriteBatch::new();

        let mut iter = current_tip;
        while iter != new_tip {
            if self.interrupt.load(Ordering::Relaxed) {
                tracing::info!(height = iter.height, "Rewind interrupted, nothing committed");
                return Ok(false);
            }

            let block = self.source.block(&iter.hash)?;
            self.roll_back(&block, iter, &mut muset, &mut aggregates)?;

            // The height lane entry is about to be overwritten by the
            // replacement branch; keep it reachable by block hash.
            let (evicted_hash, snapshot) = self.read_height_record(iter.height)?.ok_or_else(
                || Error::Corrupt(format!("no snapshot at height {} to evict", iter.height)),
            )?;
            batch.put(schema::hash_key(&evicted_hash).to_vec(), snapshot.encode());

            iter = self.source.prev(&iter.hash)?.ok_or_else(|| {
                Error::Invariant("walked past the genesis block during rewind".into())
            })?;
        }

        // The snapshot at the target is the source of truth for the
        // aggregates; restoring it guards against drift.
        let (stored_hash, snapshot) = self.read_height_record(new_tip.height)?.ok_or_else(
            || Error::Corrupt(format!("no snapshot at rewind target height {}", new_tip.height)),
        )?;
        if stored_hash != new_tip.hash {
            return Err(Error::Corrupt(format!(
                "snapshot at height {} belongs to block {stored_hash}, expected {}",
                new_tip.height, new_tip.hash
            )));
        }
        if snapshot.digest != muset.digest() {
            return Err(Error::Corrupt(
                "rewound digest does not match the target snapshot".into(),
            ));
        }
        aggregates = Aggregates::from_snapshot(&snapshot);

        batch.put(schema::MUSET_KEY.to_vec(), muset.serialize());
        self.store.write_batch(batch)?;

        self.muset = muset;
        self.aggregates = aggregates;
        self.best = Some(new_tip);

        tracing::info!(
            from = current_tip.height,
            to = new_tip.height,
            "Rewound index"
        );
        Ok(true)
    }

    fn lookup(&self, block: BlockLocator) -> Result<Option<Snapshot>> {
        // Fast path: the block is on the active chain and its record sits
        // in the height lane.
        if let Some((stored_hash, snapshot)) = self.read_height_record(block.height)? {
            if stored_hash == block.hash {
                return Ok(Some(snapshot));
            }
        }

        // Slow path: the block was disconnected by a reorg.
        match self.store.read(&schema::hash_key(&block.hash))? {
            Some(bytes) => Snapshot::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self) -> &dyn Store {
        &self.store
    }
}
