use crate::TxHash;
use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// A legacy money-transfer or contract-call transaction.
///
/// Transactions are compared by identity, two transactions are the same
/// transaction iff their [`hash`](Self::hash) matches; the derived equality
/// over the fields is equivalent because the hash covers the full RLP
/// encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
pub struct Transaction {
    /// Sender nonce.
    pub nonce: u64,
    /// Price per unit of gas the sender is willing to pay.
    pub gas_price: u128,
    /// Maximum gas the transaction may consume.
    pub gas_limit: u64,
    /// Recipient of the call or transfer.
    pub to: Address,
    /// Amount of wei transferred to the recipient.
    pub value: U256,
    /// Call data.
    pub input: Bytes,
}

impl Transaction {
    /// Heavy function that hashes the RLP encoding of the transaction.
    pub fn hash(&self) -> TxHash {
        keccak256(alloy_rlp::encode(self))
    }
}
