use crate::{
    error::ImporterError, metrics::ImporterMetrics, pool_sync::PoolSynchronizer,
    service::NextBehavior,
};
use ember_interfaces::{
    broadcast::BroadcasterHandle,
    fetcher::FetcherHandle,
    ledger::{ImportOutcome, Ledger, LedgerError},
    pool::OmmerPoolHandle,
};
use ember_primitives::{NewBlock, PeerId, SealedBlock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a block that arrived outside the fetcher's batch flow came from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum BlockOrigin {
    /// Mined by this node.
    Mined,
    /// Announced by a peer through a `NewBlock` broadcast.
    Peer(PeerId),
}

// === impl BlockOrigin ===

impl BlockOrigin {
    /// Whether the fetcher should hear about a failed import.
    ///
    /// The fetcher never produced a locally mined block, so a mined block
    /// failing must not penalise any peer.
    fn informs_fetcher_on_fail(&self) -> bool {
        matches!(self, BlockOrigin::Peer(_))
    }
}

/// Imports one mined or peer-announced block at the chain tip.
pub(crate) struct SingleBlockImporter<L> {
    ledger: Arc<L>,
    fetcher: FetcherHandle,
    ommer_pool: OmmerPoolHandle,
    broadcaster: BroadcasterHandle,
    pool_sync: PoolSynchronizer,
    metrics: ImporterMetrics,
    /// Whether a missing trie node is survivable here.
    redownload_missing_state_nodes: bool,
}

impl<L> Clone for SingleBlockImporter<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            fetcher: self.fetcher.clone(),
            ommer_pool: self.ommer_pool.clone(),
            broadcaster: self.broadcaster.clone(),
            pool_sync: self.pool_sync.clone(),
            metrics: self.metrics.clone(),
            redownload_missing_state_nodes: self.redownload_missing_state_nodes,
        }
    }
}

// === impl SingleBlockImporter ===

impl<L: Ledger> SingleBlockImporter<L> {
    pub(crate) fn new(
        ledger: Arc<L>,
        fetcher: FetcherHandle,
        ommer_pool: OmmerPoolHandle,
        broadcaster: BroadcasterHandle,
        pool_sync: PoolSynchronizer,
        metrics: ImporterMetrics,
        redownload_missing_state_nodes: bool,
    ) -> Self {
        Self {
            ledger,
            fetcher,
            ommer_pool,
            broadcaster,
            pool_sync,
            metrics,
            redownload_missing_state_nodes,
        }
    }

    /// Imports `block` and applies the side-effects of the outcome.
    pub(crate) async fn run(
        &self,
        block: SealedBlock,
        origin: BlockOrigin,
    ) -> Result<NextBehavior, ImporterError> {
        let header = block.header.clone();
        let number = block.number();
        match origin {
            BlockOrigin::Mined => {
                debug!(target: "sync::importer", number, hash = %block.hash(), "importing mined block")
            }
            BlockOrigin::Peer(peer) => {
                debug!(target: "sync::importer", number, hash = %block.hash(), %peer, "importing block announced by peer")
            }
        }

        match self.ledger.import_block(block).await {
            Ok(ImportOutcome::ImportedToTop { chain }) => {
                info!(
                    target: "sync::importer",
                    number,
                    adopted = chain.len(),
                    "block imported to the top of the chain"
                );
                self.metrics.imported_blocks.increment(chain.len() as u64);
                self.broadcaster.broadcast_blocks(chain.clone());
                let added: Vec<SealedBlock> =
                    chain.into_iter().map(|announce| announce.block).collect();
                self.pool_sync.synchronize(&added, &[]);
            }
            Ok(ImportOutcome::Enqueued) => {
                debug!(
                    target: "sync::importer",
                    number,
                    "block enqueued, offering its header as an ommer candidate"
                );
                self.ommer_pool.add_ommers(vec![header.unseal()]);
            }
            Ok(ImportOutcome::Duplicate) => {
                debug!(target: "sync::importer", number, "block already known")
            }
            // ordinary for announcements arriving out of order
            Ok(ImportOutcome::UnknownParent) => {
                debug!(target: "sync::importer", number, "parent unknown, block ignored")
            }
            Ok(ImportOutcome::Reorganised { old, new, new_tds }) => {
                self.metrics.reorganisations.increment(1);
                info!(
                    target: "sync::importer",
                    number,
                    displaced = old.len(),
                    adopted = new.len(),
                    "block reorganised the chain"
                );
                self.pool_sync.synchronize(&new, &old);
                let announcements: Vec<NewBlock> = new
                    .into_iter()
                    .zip(new_tds)
                    .map(|(block, total_difficulty)| NewBlock { block, total_difficulty })
                    .collect();
                self.broadcaster.broadcast_blocks(announcements);
            }
            Ok(ImportOutcome::Failed(error)) => {
                self.metrics.rejected_blocks.increment(1);
                warn!(target: "sync::importer", number, %error, "failed to import block");
                if origin.informs_fetcher_on_fail() {
                    self.fetcher.block_import_failed(number, error.to_string());
                }
            }
            Err(LedgerError::MissingStateNode(hash)) if self.redownload_missing_state_nodes => {
                // No repair on this path: header sync re-requests the block
                // and fetches the node along the way.
                self.metrics.single_block_missing_state_nodes.increment(1);
                warn!(
                    target: "sync::importer",
                    number,
                    %hash,
                    "missing state node while importing single block, deferring to header sync"
                );
            }
            Err(error) => return Err(error.into()),
        }

        Ok(NextBehavior::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ember_interfaces::{
        broadcast::BroadcasterCommand,
        fetcher::FetcherCommand,
        ledger::BlockImportError,
        pool::{OmmerPoolCommand, TxPoolCommand},
        test_utils::{
            broadcaster_channel, drain, fetcher_channel, generators, ommer_pool_channel,
            transaction_pool_channel, TestLedger,
        },
    };
    use ember_primitives::U256;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        importer: SingleBlockImporter<TestLedger>,
        ledger: Arc<TestLedger>,
        fetcher_rx: UnboundedReceiver<FetcherCommand>,
        ommers_rx: UnboundedReceiver<OmmerPoolCommand>,
        txs_rx: UnboundedReceiver<TxPoolCommand>,
        broadcast_rx: UnboundedReceiver<BroadcasterCommand>,
    }

    fn harness() -> Harness {
        let ledger = Arc::new(TestLedger::default());
        let (fetcher, fetcher_rx) = fetcher_channel();
        let (ommer_pool, ommers_rx) = ommer_pool_channel();
        let (transaction_pool, txs_rx) = transaction_pool_channel();
        let (broadcaster, broadcast_rx) = broadcaster_channel();
        let importer = SingleBlockImporter::new(
            Arc::clone(&ledger),
            fetcher,
            ommer_pool.clone(),
            broadcaster,
            PoolSynchronizer::new(ommer_pool, transaction_pool),
            ImporterMetrics::default(),
            true,
        );
        Harness { importer, ledger, fetcher_rx, ommers_rx, txs_rx, broadcast_rx }
    }

    #[tokio::test]
    async fn imported_to_top_broadcasts_and_settles_pools() {
        let mut rng = generators::rng();
        let block = generators::random_block(&mut rng, 10, None, Some(2), None);
        let mut harness = harness();

        let next = harness.importer.run(block.clone(), BlockOrigin::Mined).await.unwrap();
        assert_matches!(next, NextBehavior::Running);

        let expected =
            NewBlock { block: block.clone(), total_difficulty: block.header.difficulty };
        assert_eq!(
            drain(&mut harness.broadcast_rx),
            vec![BroadcasterCommand::BroadcastBlocks(vec![expected])]
        );
        assert_eq!(
            drain(&mut harness.txs_rx),
            vec![TxPoolCommand::RemoveTransactions(block.body.clone())]
        );
        assert_eq!(
            drain(&mut harness.ommers_rx),
            vec![OmmerPoolCommand::RemoveOmmers(vec![block.header.clone().unseal()])]
        );
    }

    #[tokio::test]
    async fn enqueued_block_becomes_ommer_candidate() {
        let mut rng = generators::rng();
        let block = generators::random_block(&mut rng, 10, None, None, None);
        let mut harness = harness();
        harness.ledger.push_outcome(Ok(ImportOutcome::Enqueued));

        harness.importer.run(block.clone(), BlockOrigin::Mined).await.unwrap();

        assert_eq!(
            drain(&mut harness.ommers_rx),
            vec![OmmerPoolCommand::AddOmmers(vec![block.header.clone().unseal()])]
        );
        assert!(drain(&mut harness.broadcast_rx).is_empty());
    }

    #[tokio::test]
    async fn duplicate_and_unknown_parent_are_silent() {
        let mut rng = generators::rng();
        let mut harness = harness();
        harness.ledger.push_outcome(Ok(ImportOutcome::Duplicate));
        harness.ledger.push_outcome(Ok(ImportOutcome::UnknownParent));

        for _ in 0..2 {
            let block = generators::random_block(&mut rng, 10, None, Some(1), None);
            harness
                .importer
                .run(block, BlockOrigin::Peer(PeerId::repeat_byte(1)))
                .await
                .unwrap();
        }

        assert!(drain(&mut harness.fetcher_rx).is_empty());
        assert!(drain(&mut harness.ommers_rx).is_empty());
        assert!(drain(&mut harness.txs_rx).is_empty());
        assert!(drain(&mut harness.broadcast_rx).is_empty());
    }

    #[tokio::test]
    async fn reorganisation_settles_pools_then_broadcasts() {
        let mut rng = generators::rng();
        let block = generators::random_block(&mut rng, 10, None, None, None);
        let displaced = generators::random_block(&mut rng, 10, None, Some(1), None);
        let adopted = generators::random_block_range(&mut rng, 10..=11, Default::default(), 1);

        let mut harness = harness();
        harness.ledger.push_outcome(Ok(ImportOutcome::Reorganised {
            old: vec![displaced.clone()],
            new: adopted.clone(),
            new_tds: vec![U256::from(10u64), U256::from(11u64)],
        }));

        harness.importer.run(block, BlockOrigin::Mined).await.unwrap();

        // the displaced fork block is offered as an ommer, the adopted
        // blocks clear their own headers
        let ommers = drain(&mut harness.ommers_rx);
        assert_eq!(ommers[0], OmmerPoolCommand::AddOmmers(vec![displaced.header.clone().unseal()]));
        assert_eq!(ommers.len(), 1 + adopted.len());

        let txs = drain(&mut harness.txs_rx);
        assert_eq!(
            txs[0],
            TxPoolCommand::AddTransactions(displaced.body.iter().cloned().collect())
        );

        let expected: Vec<NewBlock> = adopted
            .iter()
            .zip([U256::from(10u64), U256::from(11u64)])
            .map(|(block, total_difficulty)| NewBlock { block: block.clone(), total_difficulty })
            .collect();
        assert_eq!(
            drain(&mut harness.broadcast_rx),
            vec![BroadcasterCommand::BroadcastBlocks(expected)]
        );
    }

    #[tokio::test]
    async fn failed_peer_block_is_reported_to_the_fetcher() {
        let mut rng = generators::rng();
        let block = generators::random_block(&mut rng, 10, None, None, None);
        let mut harness = harness();
        harness.ledger.push_outcome(Ok(ImportOutcome::Failed(BlockImportError::Validation(
            "bad seal".to_owned(),
        ))));

        harness
            .importer
            .run(block.clone(), BlockOrigin::Peer(PeerId::repeat_byte(2)))
            .await
            .unwrap();

        let commands = drain(&mut harness.fetcher_rx);
        assert_matches!(
            commands.as_slice(),
            [FetcherCommand::BlockImportFailed { number, reason }]
                if *number == block.number() && reason.contains("bad seal")
        );
    }

    #[tokio::test]
    async fn failed_mined_block_is_not_reported() {
        let mut rng = generators::rng();
        let block = generators::random_block(&mut rng, 10, None, None, None);
        let mut harness = harness();
        harness.ledger.push_outcome(Ok(ImportOutcome::Failed(BlockImportError::Validation(
            "bad seal".to_owned(),
        ))));

        harness.importer.run(block, BlockOrigin::Mined).await.unwrap();

        assert!(drain(&mut harness.fetcher_rx).is_empty());
    }

    #[tokio::test]
    async fn missing_state_node_logs_and_keeps_running() {
        let mut rng = generators::rng();
        let block = generators::random_block(&mut rng, 10, None, None, None);
        let mut harness = harness();
        harness
            .ledger
            .push_outcome(Err(LedgerError::MissingStateNode(ember_primitives::B256::repeat_byte(7))));

        let next = harness.importer.run(block, BlockOrigin::Mined).await.unwrap();

        // no repair request on this path, header sync takes over
        assert_matches!(next, NextBehavior::Running);
        assert!(drain(&mut harness.fetcher_rx).is_empty());
    }
}
