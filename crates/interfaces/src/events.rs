use ember_primitives::{Bytes, PeerId, SealedBlock, B256};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Events consumed by the block import service.
///
/// Producers never wait for a reply: the importer is the terminal sink for
/// every candidate block and deals with failures itself.
#[derive(Debug)]
pub enum ImporterEvent {
    /// Starts importing, pointing the fetcher at the current best block.
    Start,
    /// The fetcher caught up with the network tip.
    OnTip,
    /// The fetcher fell behind the network tip.
    NotOnTop,
    /// A batch of fetched blocks, oldest first.
    PickedBlocks(Vec<SealedBlock>),
    /// State nodes delivered in response to a fetch request, keyed by hash.
    FetchedStateNode(HashMap<B256, Bytes>),
    /// A block mined by this node.
    MinedBlock(SealedBlock),
    /// A block announced by a peer through a `NewBlock` broadcast.
    NewBlock {
        /// The announced block.
        block: SealedBlock,
        /// The announcing peer.
        peer: PeerId,
    },
}

/// A communication channel to the block import service.
#[derive(Debug, Clone)]
pub struct ImporterHandle {
    /// Sender half of the message channel to the service.
    to_service: mpsc::UnboundedSender<ImporterEvent>,
}

// === impl ImporterHandle ===

impl ImporterHandle {
    /// Creates a new handle wrapping the given event sender.
    pub fn new(to_service: mpsc::UnboundedSender<ImporterEvent>) -> Self {
        Self { to_service }
    }

    fn send(&self, event: ImporterEvent) {
        let _ = self.to_service.send(event);
    }

    /// Starts the import service.
    pub fn start(&self) {
        self.send(ImporterEvent::Start)
    }

    /// Signals that the fetcher caught up with the network tip.
    pub fn on_tip(&self) {
        self.send(ImporterEvent::OnTip)
    }

    /// Signals that the fetcher fell behind the network tip.
    pub fn not_on_top(&self) {
        self.send(ImporterEvent::NotOnTop)
    }

    /// Delivers a batch of fetched blocks, oldest first.
    pub fn picked_blocks(&self, blocks: Vec<SealedBlock>) {
        self.send(ImporterEvent::PickedBlocks(blocks))
    }

    /// Delivers state nodes previously requested from the network.
    pub fn fetched_state_node(&self, nodes: HashMap<B256, Bytes>) {
        self.send(ImporterEvent::FetchedStateNode(nodes))
    }

    /// Submits a locally mined block.
    pub fn mined_block(&self, block: SealedBlock) {
        self.send(ImporterEvent::MinedBlock(block))
    }

    /// Submits a block announced by a peer.
    pub fn new_block(&self, block: SealedBlock, peer: PeerId) {
        self.send(ImporterEvent::NewBlock { block, peer })
    }
}
