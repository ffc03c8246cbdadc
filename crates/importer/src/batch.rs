use crate::{
    config::BLOCK_BATCH_SIZE, error::ImporterError, metrics::ImporterMetrics,
    pool_sync::PoolSynchronizer, service::NextBehavior,
};
use ember_interfaces::{
    broadcast::BroadcasterHandle,
    fetcher::FetcherHandle,
    ledger::{ImportOutcome, Ledger, LedgerError},
};
use ember_primitives::{BlockNumber, NewBlock, SealedBlock, B256};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Why a batch import stopped before consuming every block.
#[derive(Debug)]
pub(crate) enum BatchFault {
    /// The ledger hit a state trie node that is absent from the store.
    MissingStateNode {
        /// Hash of the missing node.
        hash: B256,
        /// The faulting block and everything after it, to be retried once
        /// the node arrived.
        blocks_to_retry: Vec<SealedBlock>,
    },
    /// The ledger rejected a block.
    Rejected {
        /// Number of the first block that was not imported.
        number: BlockNumber,
        /// Failure reason, forwarded to the fetcher.
        reason: String,
    },
}

/// Result of walking one batch through the ledger.
#[derive(Debug)]
pub(crate) enum BatchOutcome {
    /// Every block of the batch was consumed.
    Complete {
        /// Adopted blocks with their total difficulties.
        imported: Vec<NewBlock>,
        /// Canonical blocks displaced by reorganisations inside the batch,
        /// oldest first.
        displaced: Vec<SealedBlock>,
    },
    /// The import stopped early.
    Interrupted {
        /// Blocks adopted before the fault.
        imported: Vec<NewBlock>,
        /// Canonical blocks displaced before the fault.
        displaced: Vec<SealedBlock>,
        /// The fault that stopped the batch.
        fault: BatchFault,
    },
}

/// Imports fetched batches strictly in order and applies the boundary
/// side-effects of every run: pool synchronisation, announcement of adopted
/// blocks and fetcher feedback.
pub(crate) struct BatchImporter<L> {
    ledger: Arc<L>,
    fetcher: FetcherHandle,
    broadcaster: BroadcasterHandle,
    pool_sync: PoolSynchronizer,
    metrics: ImporterMetrics,
    /// Whether a missing trie node is repaired instead of being fatal.
    redownload_missing_state_nodes: bool,
}

impl<L> Clone for BatchImporter<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            fetcher: self.fetcher.clone(),
            broadcaster: self.broadcaster.clone(),
            pool_sync: self.pool_sync.clone(),
            metrics: self.metrics.clone(),
            redownload_missing_state_nodes: self.redownload_missing_state_nodes,
        }
    }
}

// === impl BatchImporter ===

impl<L: Ledger> BatchImporter<L> {
    pub(crate) fn new(
        ledger: Arc<L>,
        fetcher: FetcherHandle,
        broadcaster: BroadcasterHandle,
        pool_sync: PoolSynchronizer,
        metrics: ImporterMetrics,
        redownload_missing_state_nodes: bool,
    ) -> Self {
        Self { ledger, fetcher, broadcaster, pool_sync, metrics, redownload_missing_state_nodes }
    }

    /// Runs a full batch and returns the behaviour the service switches to.
    pub(crate) async fn run(&self, blocks: Vec<SealedBlock>) -> Result<NextBehavior, ImporterError> {
        match self.import_batch(blocks).await? {
            BatchOutcome::Complete { imported, displaced } => {
                self.flush(imported, displaced);
                self.fetcher.pick_blocks(BLOCK_BATCH_SIZE);
                Ok(NextBehavior::Running)
            }
            BatchOutcome::Interrupted { imported, displaced, fault } => {
                self.flush(imported, displaced);
                match fault {
                    BatchFault::MissingStateNode { hash, blocks_to_retry } => {
                        self.metrics.missing_state_nodes.increment(1);
                        warn!(
                            target: "sync::importer",
                            %hash,
                            retrying = blocks_to_retry.len(),
                            "missing state node, requesting it from the network"
                        );
                        self.fetcher.fetch_state_node(hash);
                        Ok(NextBehavior::ResolvingMissingNode { blocks_to_retry })
                    }
                    BatchFault::Rejected { number, reason } => {
                        self.metrics.rejected_blocks.increment(1);
                        debug!(
                            target: "sync::importer",
                            number,
                            %reason,
                            "block rejected, invalidating fetched range"
                        );
                        self.fetcher.invalidate_blocks_from(number, reason, true);
                        self.fetcher.pick_blocks(BLOCK_BATCH_SIZE);
                        Ok(NextBehavior::Running)
                    }
                }
            }
        }
    }

    /// Walks `blocks` (oldest first) through the ledger one at a time.
    ///
    /// Adopted blocks accumulate in import order, except that a
    /// reorganisation prepends its newly canonical branch in reverse, so the
    /// accumulator is newest-first at the reorg boundary.
    pub(crate) async fn import_batch(
        &self,
        blocks: Vec<SealedBlock>,
    ) -> Result<BatchOutcome, ImporterError> {
        let mut imported: Vec<NewBlock> = Vec::with_capacity(blocks.len());
        let mut displaced: Vec<SealedBlock> = Vec::new();

        for (idx, block) in blocks.iter().enumerate() {
            let number = block.number();
            match self.ledger.import_block(block.clone()).await {
                Ok(ImportOutcome::ImportedToTop { chain }) => {
                    trace!(target: "sync::importer", number, "block imported to top");
                    imported.extend(chain);
                }
                Ok(ImportOutcome::Reorganised { old, new, new_tds }) => {
                    self.metrics.reorganisations.increment(1);
                    debug!(
                        target: "sync::importer",
                        number,
                        depth = old.len(),
                        "chain reorganised while importing batch"
                    );
                    let adopted: Vec<NewBlock> = new
                        .into_iter()
                        .zip(new_tds)
                        .rev()
                        .map(|(block, total_difficulty)| NewBlock { block, total_difficulty })
                        .collect();
                    imported.splice(0..0, adopted);
                    displaced.extend(old);
                }
                Ok(ImportOutcome::Duplicate) => {
                    trace!(target: "sync::importer", number, "duplicate block in batch")
                }
                Ok(ImportOutcome::Enqueued) => {
                    trace!(target: "sync::importer", number, "block enqueued for later")
                }
                Ok(ImportOutcome::UnknownParent) => {
                    return Ok(BatchOutcome::Interrupted {
                        imported,
                        displaced,
                        fault: BatchFault::Rejected {
                            number,
                            reason: "unknown parent".to_owned(),
                        },
                    })
                }
                Ok(ImportOutcome::Failed(error)) => {
                    return Ok(BatchOutcome::Interrupted {
                        imported,
                        displaced,
                        fault: BatchFault::Rejected { number, reason: error.to_string() },
                    })
                }
                Err(LedgerError::MissingStateNode(hash))
                    if self.redownload_missing_state_nodes =>
                {
                    return Ok(BatchOutcome::Interrupted {
                        imported,
                        displaced,
                        fault: BatchFault::MissingStateNode {
                            hash,
                            blocks_to_retry: blocks[idx..].to_vec(),
                        },
                    })
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(BatchOutcome::Complete { imported, displaced })
    }

    /// Settles the pools and announces whatever the batch adopted.
    fn flush(&self, imported: Vec<NewBlock>, displaced: Vec<SealedBlock>) {
        if imported.is_empty() && displaced.is_empty() {
            return
        }
        let added: Vec<SealedBlock> =
            imported.iter().map(|announce| announce.block.clone()).collect();
        self.pool_sync.synchronize(&added, &displaced);
        if !imported.is_empty() {
            self.metrics.imported_blocks.increment(imported.len() as u64);
            info!(
                target: "sync::importer",
                count = imported.len(),
                "extended canonical chain from batch"
            );
            self.broadcaster.broadcast_blocks(imported);
        }
    }
}
