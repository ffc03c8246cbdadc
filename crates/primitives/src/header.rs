use crate::{BlockHash, BlockNumber};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use std::ops::Deref;

/// A pre-merge Ethereum-family block header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
pub struct Header {
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Hash of the ommer headers referenced by this block.
    pub ommers_hash: B256,
    /// Address that collects the block reward.
    pub beneficiary: Address,
    /// Root of the state trie after executing this block.
    pub state_root: B256,
    /// Proof-of-work difficulty target this block met.
    pub difficulty: U256,
    /// Number of ancestor blocks.
    pub number: BlockNumber,
    /// Maximum gas the block may consume.
    pub gas_limit: u64,
    /// Gas consumed by the block's transactions.
    pub gas_used: u64,
    /// Unix timestamp at which the block was sealed.
    pub timestamp: u64,
    /// Arbitrary extra data chosen by the miner.
    pub extra_data: Bytes,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl Header {
    /// Heavy function that hashes the header and locks it into a
    /// [`SealedHeader`].
    pub fn seal_slow(self) -> SealedHeader {
        let hash = keccak256(alloy_rlp::encode(&self));
        SealedHeader { header: self, hash }
    }
}

/// A [`Header`] together with its memoised keccak hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SealedHeader {
    /// Locked header.
    header: Header,
    /// Hash of the RLP encoded header.
    hash: BlockHash,
}

impl SealedHeader {
    /// Creates a sealed header from a header and its precomputed hash.
    ///
    /// The hash is trusted, no check is performed.
    pub fn new(header: Header, hash: BlockHash) -> Self {
        Self { header, hash }
    }

    /// The hash of the header.
    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    /// Extracts the raw header, dropping the memoised hash.
    pub fn unseal(self) -> Header {
        self.header
    }
}

impl Deref for SealedHeader {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}
