use crate::events::ImporterHandle;
use ember_primitives::{BlockNumber, B256};
use tokio::sync::mpsc;

/// Commands understood by the block fetcher.
#[derive(Debug)]
pub enum FetcherCommand {
    /// Starts fetching forward of the given block number, delivering results
    /// to the importer behind the handle.
    Start {
        /// Endpoint the fetcher delivers blocks and state nodes to.
        importer: ImporterHandle,
        /// Number of the current best block.
        from: BlockNumber,
    },
    /// Requests the next `count` ready blocks.
    PickBlocks {
        /// Maximum number of blocks to deliver.
        count: usize,
    },
    /// Requests a state trie node by hash.
    FetchStateNode {
        /// Hash of the missing node.
        hash: B256,
    },
    /// Discards fetched blocks from the given number on so the range is
    /// re-requested.
    InvalidateBlocksFrom {
        /// First block number to discard.
        from: BlockNumber,
        /// Human readable reason, used for peer-management logging.
        reason: String,
        /// Whether the peers that served the range should be blacklisted.
        with_blacklist: bool,
    },
    /// Reports that a block received outside the fetch flow failed to
    /// import, so the serving peer can be penalised.
    BlockImportFailed {
        /// Number of the offending block.
        number: BlockNumber,
        /// Human readable failure reason.
        reason: String,
    },
}

/// A communication channel to the block fetcher.
#[derive(Debug, Clone)]
pub struct FetcherHandle {
    /// Sender half of the command channel to the fetcher.
    to_fetcher: mpsc::UnboundedSender<FetcherCommand>,
}

// === impl FetcherHandle ===

impl FetcherHandle {
    /// Creates a new handle wrapping the given command sender.
    pub fn new(to_fetcher: mpsc::UnboundedSender<FetcherCommand>) -> Self {
        Self { to_fetcher }
    }

    fn send(&self, command: FetcherCommand) {
        let _ = self.to_fetcher.send(command);
    }

    /// Starts the fetcher forward of `from`, delivering to `importer`.
    pub fn start(&self, importer: ImporterHandle, from: BlockNumber) {
        self.send(FetcherCommand::Start { importer, from })
    }

    /// Requests the next `count` ready blocks.
    pub fn pick_blocks(&self, count: usize) {
        self.send(FetcherCommand::PickBlocks { count })
    }

    /// Requests a state trie node by hash.
    pub fn fetch_state_node(&self, hash: B256) {
        self.send(FetcherCommand::FetchStateNode { hash })
    }

    /// Invalidates fetched blocks from `from` on.
    pub fn invalidate_blocks_from(
        &self,
        from: BlockNumber,
        reason: impl Into<String>,
        with_blacklist: bool,
    ) {
        self.send(FetcherCommand::InvalidateBlocksFrom {
            from,
            reason: reason.into(),
            with_blacklist,
        })
    }

    /// Reports a failed out-of-band block import.
    pub fn block_import_failed(&self, number: BlockNumber, reason: impl Into<String>) {
        self.send(FetcherCommand::BlockImportFailed { number, reason: reason.into() })
    }
}
