use ember_interfaces::pool::{OmmerPoolHandle, TransactionPoolHandle};
use ember_primitives::{SealedBlock, Transaction};
use std::collections::HashSet;

/// Settles the ommer pool and the pending transaction pool after the chain
/// moved.
#[derive(Debug, Clone)]
pub(crate) struct PoolSynchronizer {
    ommer_pool: OmmerPoolHandle,
    transaction_pool: TransactionPoolHandle,
}

// === impl PoolSynchronizer ===

impl PoolSynchronizer {
    pub(crate) fn new(
        ommer_pool: OmmerPoolHandle,
        transaction_pool: TransactionPoolHandle,
    ) -> Self {
        Self { ommer_pool, transaction_pool }
    }

    /// Applies the pool side-effects of adopting `added` and displacing
    /// `removed`, both oldest first.
    ///
    /// Only the first displaced block is offered as an ommer candidate: it
    /// forks directly off a canonical ancestor, deeper displaced blocks fork
    /// off other displaced blocks and can never be referenced. Displaced
    /// transactions go back to the pending set before adopted blocks take
    /// theirs out, so a transaction present on both sides ends up removed.
    pub(crate) fn synchronize(&self, added: &[SealedBlock], removed: &[SealedBlock]) {
        if let Some(fork) = removed.first() {
            self.ommer_pool.add_ommers(vec![fork.header.clone().unseal()]);
        }
        for block in removed {
            let transactions: HashSet<Transaction> = block.body.iter().cloned().collect();
            if !transactions.is_empty() {
                self.transaction_pool.add_transactions(transactions);
            }
        }
        for block in added {
            let mut headers = Vec::with_capacity(block.ommers.len() + 1);
            headers.push(block.header.clone().unseal());
            headers.extend(block.ommers.iter().cloned());
            self.ommer_pool.remove_ommers(headers);
            if !block.body.is_empty() {
                self.transaction_pool.remove_transactions(block.body.clone());
            }
        }
    }
}
