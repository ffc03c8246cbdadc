use crate::{
    batch::BatchImporter,
    branch::BranchResolver,
    config::{ImporterConfig, BLOCK_BATCH_SIZE},
    error::ImporterError,
    metrics::ImporterMetrics,
    pool_sync::PoolSynchronizer,
    single::{BlockOrigin, SingleBlockImporter},
    state::ImporterState,
};
use ember_interfaces::{
    broadcast::BroadcasterHandle,
    events::{ImporterEvent, ImporterHandle},
    fetcher::FetcherHandle,
    ledger::Ledger,
    pool::{OmmerPoolHandle, TransactionPoolHandle},
};
use ember_primitives::{keccak256, Bytes, PeerId, SealedBlock, B256};
use futures_util::{future::BoxFuture, FutureExt, StreamExt};
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{self, Interval, MissedTickBehavior},
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, trace, warn};

/// The behaviour the service switches to once an import future completed.
#[derive(Debug)]
pub(crate) enum NextBehavior {
    /// Resume normal event processing.
    Running,
    /// Wait for the fetcher to deliver a missing state node, then retry the
    /// tail of the interrupted batch.
    ResolvingMissingNode {
        /// The faulting block and everything after it.
        blocks_to_retry: Vec<SealedBlock>,
    },
}

/// Behaviour of the service between events.
#[derive(Debug)]
enum SyncBehavior {
    /// Waiting for `Start`.
    Idle,
    /// Normal operation.
    Running,
    /// A batch import hit a missing trie node; only a fetched node resumes
    /// importing. The importing gate stays shut across the wait.
    ResolvingMissingNode {
        /// The faulting block and everything after it.
        blocks_to_retry: Vec<SealedBlock>,
    },
}

type ImportFuture = BoxFuture<'static, Result<NextBehavior, ImporterError>>;

/// Drives candidate blocks from the fetcher, the local miner and peer
/// announcements through the ledger, keeping the ommer pool, the pending
/// transaction pool and the block broadcaster consistent with every
/// decision.
///
/// The service is a future that must be spawned. All importer state lives on
/// this one task: producers reach it only through the [`ImporterHandle`] and
/// the single in-flight import future reports back by being polled here, so
/// there is never a second writer to [`ImporterState`].
///
/// The future resolves with an error on faults the importer cannot recover
/// from; whoever spawned it is expected to build a fresh service and call
/// [`ImporterHandle::start`] again. It resolves cleanly once every producer
/// dropped its handle.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct BlockImportService<L> {
    /// Chain facade used for importing, branch classification and node
    /// repair.
    ledger: Arc<L>,
    /// Endpoint of the block fetcher.
    fetcher: FetcherHandle,
    /// Endpoint of the ommer pool, used when single blocks are gated out.
    ommer_pool: OmmerPoolHandle,
    /// Inbox of producer events.
    events: UnboundedReceiverStream<ImporterEvent>,
    /// Sender side of the inbox, handed to the fetcher on start.
    ///
    /// Held weakly so the service still shuts down once every producer
    /// dropped its handle.
    to_service: mpsc::WeakUnboundedSender<ImporterEvent>,
    /// Tip and import-gate flags.
    state: ImporterState,
    /// Current behaviour of the event loop.
    behavior: SyncBehavior,
    /// The single in-flight import, if any.
    inflight: Option<ImportFuture>,
    /// Period of the self-prompt asking the fetcher for the next batch.
    sync_retry_interval: Duration,
    /// Self-prompt timer, armed lazily on the runtime.
    retry: Option<Interval>,
    branch_resolver: BranchResolver<L>,
    batch_importer: BatchImporter<L>,
    single_importer: SingleBlockImporter<L>,
    metrics: ImporterMetrics,
}

// === impl BlockImportService ===

impl<L: Ledger> BlockImportService<L> {
    /// Creates the service and the handle producers use to reach it.
    pub fn new(
        config: ImporterConfig,
        ledger: Arc<L>,
        fetcher: FetcherHandle,
        ommer_pool: OmmerPoolHandle,
        transaction_pool: TransactionPoolHandle,
        broadcaster: BroadcasterHandle,
    ) -> (Self, ImporterHandle) {
        let (to_service, events) = mpsc::unbounded_channel();
        let handle = ImporterHandle::new(to_service.clone());

        let metrics = ImporterMetrics::default();
        let pool_sync = PoolSynchronizer::new(ommer_pool.clone(), transaction_pool.clone());
        let branch_resolver = BranchResolver::new(
            Arc::clone(&ledger),
            fetcher.clone(),
            ommer_pool.clone(),
            transaction_pool,
            config.branch_resolution_request_size,
        );
        let batch_importer = BatchImporter::new(
            Arc::clone(&ledger),
            fetcher.clone(),
            broadcaster.clone(),
            pool_sync.clone(),
            metrics.clone(),
            config.redownload_missing_state_nodes,
        );
        let single_importer = SingleBlockImporter::new(
            Arc::clone(&ledger),
            fetcher.clone(),
            ommer_pool.clone(),
            broadcaster,
            pool_sync,
            metrics.clone(),
            config.redownload_missing_state_nodes,
        );

        let service = Self {
            ledger,
            fetcher,
            ommer_pool,
            events: UnboundedReceiverStream::new(events),
            to_service: to_service.downgrade(),
            state: ImporterState::default(),
            behavior: SyncBehavior::Idle,
            inflight: None,
            sync_retry_interval: config.sync_retry_interval,
            retry: None,
            branch_resolver,
            batch_importer,
            single_importer,
            metrics,
        };
        (service, handle)
    }

    /// Arms an import future and shuts the importing gate.
    fn dispatch<F>(&mut self, import: F)
    where
        F: Future<Output = Result<NextBehavior, ImporterError>> + Send + 'static,
    {
        debug_assert!(!self.state.is_importing(), "second import dispatched");
        self.state = self.state.begin_import();
        self.inflight = Some(Box::pin(import));
    }

    /// Applies the behaviour switch an import future completed with.
    fn on_import_done(&mut self, next: NextBehavior) {
        match next {
            NextBehavior::Running => {
                self.state = self.state.end_import();
                self.behavior = SyncBehavior::Running;
            }
            NextBehavior::ResolvingMissingNode { blocks_to_retry } => {
                // the import is not over until the tail went through, the
                // gate stays shut
                self.behavior = SyncBehavior::ResolvingMissingNode { blocks_to_retry };
            }
        }
    }

    fn on_event(&mut self, event: ImporterEvent) -> Result<(), ImporterError> {
        match event {
            ImporterEvent::OnTip => {
                self.state = self.state.set_on_tip();
                Ok(())
            }
            ImporterEvent::NotOnTop => {
                self.state = self.state.clear_on_tip();
                Ok(())
            }
            ImporterEvent::Start => {
                self.on_start();
                Ok(())
            }
            ImporterEvent::PickedBlocks(blocks) => {
                self.on_picked_blocks(blocks);
                Ok(())
            }
            ImporterEvent::MinedBlock(block) => {
                self.on_mined_block(block);
                Ok(())
            }
            ImporterEvent::NewBlock { block, peer } => {
                self.on_new_block(block, peer);
                Ok(())
            }
            ImporterEvent::FetchedStateNode(nodes) => self.on_fetched_state_node(nodes),
        }
    }

    fn on_start(&mut self) {
        if !matches!(self.behavior, SyncBehavior::Idle) {
            trace!(target: "sync::importer", "start ignored, already running");
            return
        }
        let Some(to_service) = self.to_service.upgrade() else { return };
        let best = self.ledger.best_block_number();
        info!(target: "sync::importer", best, "starting block import");
        self.fetcher.start(ImporterHandle::new(to_service), best);
        self.state = ImporterState::default();
        self.behavior = SyncBehavior::Running;
    }

    fn on_picked_blocks(&mut self, blocks: Vec<SealedBlock>) {
        if !matches!(self.behavior, SyncBehavior::Running) {
            trace!(target: "sync::importer", count = blocks.len(), "batch dropped, not running");
            return
        }
        if blocks.is_empty() {
            trace!(target: "sync::importer", "empty batch delivered");
            return
        }
        if self.state.is_importing() {
            // the fetcher re-delivers through the ordinary retry prompt
            trace!(
                target: "sync::importer",
                count = blocks.len(),
                "batch dropped, import already in flight"
            );
            return
        }
        debug!(
            target: "sync::importer",
            count = blocks.len(),
            first = blocks[0].number(),
            "importing fetched batch"
        );
        let resolver = self.branch_resolver.clone();
        let batch = self.batch_importer.clone();
        self.dispatch(async move {
            let to_import = resolver.resolve(blocks);
            batch.run(to_import).await
        });
    }

    fn on_mined_block(&mut self, block: SealedBlock) {
        if matches!(self.behavior, SyncBehavior::Idle) {
            trace!(target: "sync::importer", number = block.number(), "mined block before start");
            return
        }
        if matches!(self.behavior, SyncBehavior::Running) && self.state.accepts_single_blocks() {
            let importer = self.single_importer.clone();
            self.dispatch(async move { importer.run(block, BlockOrigin::Mined).await });
        } else {
            // the header can still be referenced by whatever block wins
            debug!(
                target: "sync::importer",
                number = block.number(),
                on_tip = self.state.is_on_tip(),
                importing = self.state.is_importing(),
                "rerouting mined block to the ommer pool"
            );
            self.metrics.rerouted_mined_blocks.increment(1);
            self.ommer_pool.add_ommers(vec![block.header.unseal()]);
        }
    }

    fn on_new_block(&mut self, block: SealedBlock, peer: PeerId) {
        if matches!(self.behavior, SyncBehavior::Running) && self.state.accepts_single_blocks() {
            let importer = self.single_importer.clone();
            self.dispatch(async move { importer.run(block, BlockOrigin::Peer(peer)).await });
        } else {
            // ordinary sync will deliver it again through the fetcher
            trace!(
                target: "sync::importer",
                number = block.number(),
                %peer,
                "dropping announced block, not ready to import"
            );
        }
    }

    fn on_fetched_state_node(
        &mut self,
        nodes: HashMap<B256, Bytes>,
    ) -> Result<(), ImporterError> {
        let SyncBehavior::ResolvingMissingNode { blocks_to_retry } = &mut self.behavior else {
            trace!(target: "sync::importer", "state node delivered while not repairing");
            return Ok(())
        };
        let Some(node) = nodes.into_values().next() else {
            warn!(target: "sync::importer", "empty state node response");
            return Ok(())
        };

        let hash = keccak256(&node);
        // key the node by the block whose execution faulted
        let number = blocks_to_retry.first().map(|block| block.number()).unwrap_or_default();
        let blocks = std::mem::take(blocks_to_retry);
        self.ledger.save_node(hash, node, number)?;
        debug!(
            target: "sync::importer",
            %hash,
            number,
            retrying = blocks.len(),
            "state node persisted, retrying interrupted batch"
        );

        self.behavior = SyncBehavior::Running;
        debug_assert!(self.state.is_importing(), "repair outside of an import");
        // the gate never opened, re-arm the import future directly
        let batch = self.batch_importer.clone();
        self.inflight = Some(Box::pin(async move { batch.run(blocks).await }));
        Ok(())
    }

    /// Resets the retry prompt; called whenever an event was processed so
    /// the prompt only fires after a quiet period.
    fn reset_retry(&mut self) {
        if let Some(retry) = self.retry.as_mut() {
            retry.reset();
        }
    }

    fn retry_mut(&mut self) -> &mut Interval {
        let period = self.sync_retry_interval;
        self.retry.get_or_insert_with(|| {
            let mut retry = time::interval(period);
            retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
            retry
        })
    }
}

impl<L: Ledger> Future for BlockImportService<L> {
    type Output = Result<(), ImporterError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            let mut made_progress = false;

            // drive the in-flight import first so its completion is observed
            // before any new event can race the importing gate
            if let Some(mut import) = this.inflight.take() {
                match import.poll_unpin(cx) {
                    Poll::Ready(Ok(next)) => {
                        this.on_import_done(next);
                        this.reset_retry();
                        made_progress = true;
                    }
                    Poll::Ready(Err(err)) => {
                        error!(target: "sync::importer", %err, "import failed fatally");
                        return Poll::Ready(Err(err))
                    }
                    Poll::Pending => this.inflight = Some(import),
                }
            }

            // producer events are processed even while an import is in
            // flight; only import-starting events are gated
            match this.events.poll_next_unpin(cx) {
                Poll::Ready(Some(event)) => {
                    if let Err(err) = this.on_event(event) {
                        error!(target: "sync::importer", %err, "importer failed");
                        return Poll::Ready(Err(err))
                    }
                    this.reset_retry();
                    made_progress = true;
                }
                Poll::Ready(None) => {
                    info!(target: "sync::importer", "all producers gone, shutting down");
                    return Poll::Ready(Ok(()))
                }
                Poll::Pending => {}
            }

            // quiet period with nothing in flight: prompt for the next batch
            if matches!(this.behavior, SyncBehavior::Running) &&
                !this.state.is_importing() &&
                this.retry_mut().poll_tick(cx).is_ready()
            {
                trace!(target: "sync::importer", "requesting next batch from fetcher");
                this.fetcher.pick_blocks(BLOCK_BATCH_SIZE);
                made_progress = true;
            }

            if !made_progress {
                return Poll::Pending
            }
        }
    }
}

impl<L> std::fmt::Debug for BlockImportService<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockImportService")
            .field("state", &self.state)
            .field("behavior", &self.behavior)
            .field("importing", &self.inflight.is_some())
            .finish_non_exhaustive()
    }
}
