use crate::{BlockHash, BlockNumber, Header, SealedHeader, Transaction};
use alloy_primitives::U256;

/// Sealed block composed of a locked header, the transaction body and the
/// referenced ommer headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    /// Locked block header.
    pub header: SealedHeader,
    /// Transactions included in the block.
    pub body: Vec<Transaction>,
    /// Ommer headers referenced by the block.
    pub ommers: Vec<Header>,
}

impl SealedBlock {
    /// Creates a sealed block without transactions or ommers.
    pub fn new(header: SealedHeader) -> Self {
        Self { header, body: Vec::new(), ommers: Vec::new() }
    }

    /// The number of the block.
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    /// The hash of the block header.
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// The hash of the parent block.
    pub fn parent_hash(&self) -> BlockHash {
        self.header.parent_hash
    }
}

/// A block ready to be announced to peers, paired with the total difficulty
/// of the chain ending in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlock {
    /// The announced block.
    pub block: SealedBlock,
    /// Cumulative proof-of-work weight of the chain up to and including the
    /// block.
    pub total_difficulty: U256,
}
