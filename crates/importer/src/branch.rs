use ember_interfaces::{
    fetcher::FetcherHandle,
    ledger::{BranchClassification, Ledger},
    pool::{OmmerPoolHandle, TransactionPoolHandle},
};
use ember_primitives::{SealedBlock, Transaction};
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

/// Decides what happens to a candidate branch before any block of it is
/// handed to the ledger.
///
/// The classification itself comes from the ledger; this type owns the
/// side-effects: returning displaced transactions to the pending pool,
/// offering ommer candidates and steering the fetcher. Pool messages are
/// dispatched before the to-import list is returned, so a batch import
/// failing later cannot lose reorg-bound transactions.
pub(crate) struct BranchResolver<L> {
    ledger: Arc<L>,
    fetcher: FetcherHandle,
    ommer_pool: OmmerPoolHandle,
    transaction_pool: TransactionPoolHandle,
    /// Lookback applied when re-fetching an unknown branch.
    branch_resolution_request_size: u64,
}

impl<L> Clone for BranchResolver<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            fetcher: self.fetcher.clone(),
            ommer_pool: self.ommer_pool.clone(),
            transaction_pool: self.transaction_pool.clone(),
            branch_resolution_request_size: self.branch_resolution_request_size,
        }
    }
}

// === impl BranchResolver ===

impl<L: Ledger> BranchResolver<L> {
    pub(crate) fn new(
        ledger: Arc<L>,
        fetcher: FetcherHandle,
        ommer_pool: OmmerPoolHandle,
        transaction_pool: TransactionPoolHandle,
        branch_resolution_request_size: u64,
    ) -> Self {
        Self { ledger, fetcher, ommer_pool, transaction_pool, branch_resolution_request_size }
    }

    /// Classifies `blocks` (oldest first) and returns the sub-sequence that
    /// should go through the ledger. An empty return means the batch was
    /// dealt with here.
    pub(crate) fn resolve(&self, blocks: Vec<SealedBlock>) -> Vec<SealedBlock> {
        let Some(first) = blocks.first() else { return blocks };

        let headers = blocks.iter().map(|block| block.header.clone()).collect();
        match self.ledger.resolve_branch(headers) {
            BranchClassification::NewBetterBranch { old_branch } => {
                debug!(
                    target: "sync::importer",
                    blocks = blocks.len(),
                    displacing = old_branch.len(),
                    "branch accepted for import"
                );
                // Displaced transactions go back to the pending pool before
                // any import of the new branch can fail.
                let transactions: HashSet<Transaction> =
                    old_branch.iter().flat_map(|block| block.body.iter().cloned()).collect();
                if !transactions.is_empty() {
                    self.transaction_pool.add_transactions(transactions);
                }
                // The first displaced block forks straight off a canonical
                // ancestor and is the only one eligible as an ommer.
                if let Some(fork) = old_branch.first() {
                    self.ommer_pool.add_ommers(vec![fork.header.clone().unseal()]);
                }
                blocks
            }
            BranchClassification::NoChainSwitch => {
                debug!(
                    target: "sync::importer",
                    first = first.number(),
                    "branch does not improve the chain"
                );
                self.ommer_pool.add_ommers(vec![first.header.clone().unseal()]);
                // The peer served a valid but uninteresting branch, no
                // blacklisting.
                self.fetcher.invalidate_blocks_from(
                    first.number(),
                    "no progress on chain",
                    false,
                );
                Vec::new()
            }
            BranchClassification::UnknownBranch => {
                let from = first.number().saturating_sub(self.branch_resolution_request_size);
                debug!(
                    target: "sync::importer",
                    first = first.number(),
                    from,
                    "unknown branch, re-fetching with history"
                );
                self.fetcher.invalidate_blocks_from(from, "unknown branch", true);
                Vec::new()
            }
            BranchClassification::InvalidBranch => {
                debug!(
                    target: "sync::importer",
                    first = first.number(),
                    "invalid branch"
                );
                self.fetcher.invalidate_blocks_from(first.number(), "invalid branch", true);
                Vec::new()
            }
        }
    }
}
