//! Chain constants consulted by the indexer.

use bitcoin::BlockHash;
use std::sync::LazyLock;

/// 1 BTC in satoshis.
pub const COIN: u64 = 100_000_000;

/// Initial block reward.
pub const INITIAL_SUBSIDY: u64 = 50 * COIN;

/// Blocks between subsidy halvings.
pub const HALVING_INTERVAL: u32 = 210_000;

/// Scripts larger than this can never be spent.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Returns the amount of subsidy in satoshis at the given height.
pub fn block_subsidy(height: u32) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    // Force block reward to zero when right shift is undefined.
    if halvings >= 64 {
        return 0;
    }

    INITIAL_SUBSIDY >> halvings
}

/// Blocks whose coinbase reuses the txid of an earlier block's coinbase.
///
/// Only the first occurrence of such a txid contributes outputs to the
/// set; the applier skips the repeats.
static DUPLICATE_COINBASE_BLOCKS: LazyLock<[(u32, BlockHash); 2]> = LazyLock::new(|| {
    [
        (
            91_842,
            "00000000000a4d0a398161ffc163c503763b1f4360639393e0e4c8e300e0caec"
                .parse()
                .expect("hardcoded block hash is valid; qed"),
        ),
        (
            91_880,
            "00000000000743f190a18c5577a3c2d2a1f610ae9601ac046a38084ccb7cd721"
                .parse()
                .expect("hardcoded block hash is valid; qed"),
        ),
    ]
});

/// Whether the block at `height` with `block_hash` is one of the historical
/// duplicate-coinbase blocks.
pub fn is_duplicate_coinbase_height(height: u32, block_hash: &BlockHash) -> bool {
    DUPLICATE_COINBASE_BLOCKS
        .iter()
        .any(|(h, hash)| *h == height && hash == block_hash)
}
