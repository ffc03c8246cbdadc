//! Commonly used types for the ember node.
//!
//! This crate contains the block, header and transaction types shared by the
//! chain-facing subsystems, along with the wire-level [`NewBlock`]
//! announcement unit.

mod block;
mod header;
mod transaction;

pub use block::{NewBlock, SealedBlock};
pub use header::{Header, SealedHeader};
pub use transaction::Transaction;

pub use alloy_primitives::{self, keccak256, Address, Bytes, B256, B512, U256};

/// A block number.
pub type BlockNumber = u64;

/// A block hash.
pub type BlockHash = B256;

/// A transaction hash.
pub type TxHash = B256;

/// Identifier of a devp2p peer, the uncompressed secp256k1 public key.
pub type PeerId = B512;
