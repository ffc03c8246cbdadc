use ember_primitives::NewBlock;
use tokio::sync::mpsc;

/// Commands understood by the block broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcasterCommand {
    /// Announces newly canonical blocks to peers, each paired with its total
    /// difficulty.
    BroadcastBlocks(Vec<NewBlock>),
}

/// A communication channel to the block broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcasterHandle {
    /// Sender half of the command channel to the broadcaster.
    to_broadcaster: mpsc::UnboundedSender<BroadcasterCommand>,
}

// === impl BroadcasterHandle ===

impl BroadcasterHandle {
    /// Creates a new handle wrapping the given command sender.
    pub fn new(to_broadcaster: mpsc::UnboundedSender<BroadcasterCommand>) -> Self {
        Self { to_broadcaster }
    }

    /// Announces newly canonical blocks to peers.
    pub fn broadcast_blocks(&self, blocks: Vec<NewBlock>) {
        let _ = self.to_broadcaster.send(BroadcasterCommand::BroadcastBlocks(blocks));
    }
}
