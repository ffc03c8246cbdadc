use ember_primitives::{
    Address, BlockNumber, Bytes, Header, SealedBlock, SealedHeader, Transaction, B256, U256,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Returns a random number generator for test data.
pub fn rng() -> StdRng {
    StdRng::from_entropy()
}

/// Generates a random transaction.
pub fn random_tx<R: Rng>(rng: &mut R) -> Transaction {
    Transaction {
        nonce: rng.gen(),
        gas_price: rng.gen::<u64>() as u128,
        gas_limit: 21_000,
        to: Address::from(rng.gen::<[u8; 20]>()),
        value: U256::from(rng.gen::<u64>()),
        input: Bytes::default(),
    }
}

/// Generates a random sealed header with the given number, parented on
/// `parent` if provided.
pub fn random_header<R: Rng>(
    rng: &mut R,
    number: BlockNumber,
    parent: Option<B256>,
) -> SealedHeader {
    Header {
        parent_hash: parent.unwrap_or_else(|| B256::from(rng.gen::<[u8; 32]>())),
        number,
        difficulty: U256::from(rng.gen_range(1_000u64..100_000)),
        gas_limit: 8_000_000,
        timestamp: rng.gen(),
        nonce: rng.gen(),
        ..Default::default()
    }
    .seal_slow()
}

/// Generates a random sealed block with the given number, parented on
/// `parent` if provided.
///
/// `tx_count` transactions and `ommer_count` ommer headers are generated,
/// both defaulting to zero.
pub fn random_block<R: Rng>(
    rng: &mut R,
    number: BlockNumber,
    parent: Option<B256>,
    tx_count: Option<usize>,
    ommer_count: Option<usize>,
) -> SealedBlock {
    let body = (0..tx_count.unwrap_or_default()).map(|_| random_tx(rng)).collect();
    let ommers = (0..ommer_count.unwrap_or_default())
        .map(|_| random_header(rng, number.saturating_sub(1), None).unseal())
        .collect();
    SealedBlock { header: random_header(rng, number, parent), body, ommers }
}

/// Generates a chain of consecutive random blocks over `numbers`, the first
/// one parented on `head`. Each block carries `tx_count` transactions.
pub fn random_block_range<R: Rng>(
    rng: &mut R,
    numbers: std::ops::RangeInclusive<BlockNumber>,
    head: B256,
    tx_count: usize,
) -> Vec<SealedBlock> {
    let mut parent = head;
    numbers
        .map(|number| {
            let block = random_block(rng, number, Some(parent), Some(tx_count), None);
            parent = block.hash();
            block
        })
        .collect()
}
