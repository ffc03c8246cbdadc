use async_trait::async_trait;
use ember_primitives::{BlockNumber, Bytes, NewBlock, SealedBlock, SealedHeader, B256, U256};

/// The chain facade the importer drives blocks through.
///
/// `import_block` connects, executes and commits a single block; branch
/// resolution classifies a candidate header sequence against the canonical
/// chain without touching state. Both are backed by the same blockchain and
/// state trie store, which is why the node repair write
/// ([`save_node`](Self::save_node)) hangs off this trait too.
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// Imports a single block, committing it to the chain if it is valid.
    ///
    /// The future completes on the execution worker pool; callers must not
    /// issue a second import before the previous one resolved.
    async fn import_block(&self, block: SealedBlock) -> Result<ImportOutcome, LedgerError>;

    /// Classifies the branch formed by `headers` (oldest first) against the
    /// canonical chain.
    fn resolve_branch(&self, headers: Vec<SealedHeader>) -> BranchClassification;

    /// Number of the current best canonical block.
    fn best_block_number(&self) -> BlockNumber;

    /// Persists a state trie node under its hash, associated with the block
    /// whose execution required it.
    fn save_node(&self, hash: B256, node: Bytes, block_number: BlockNumber)
        -> Result<(), LedgerError>;
}

/// The per-block result of [`Ledger::import_block`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The block extended the canonical chain, together with any previously
    /// enqueued children it connected. Blocks carry the total difficulty of
    /// the chain ending in them, ready for announcement.
    ImportedToTop {
        /// Newly canonical blocks, oldest first.
        chain: Vec<NewBlock>,
    },
    /// The block was stored for later; its parent is known but not the
    /// current tip.
    Enqueued,
    /// The block is already known.
    Duplicate,
    /// The parent of the block is unknown.
    UnknownParent,
    /// The block completed a competing branch with more total difficulty,
    /// displacing a suffix of the canonical chain.
    Reorganised {
        /// Displaced blocks, oldest first.
        old: Vec<SealedBlock>,
        /// Newly canonical blocks, oldest first.
        new: Vec<SealedBlock>,
        /// Total difficulties of the `new` blocks, paired positionally.
        new_tds: Vec<U256>,
    },
    /// The block failed validation or execution.
    Failed(BlockImportError),
}

/// Classification of a candidate branch relative to the canonical chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchClassification {
    /// The branch carries more total difficulty than the canonical suffix it
    /// replaces and should be imported.
    NewBetterBranch {
        /// Canonical blocks the branch displaces, oldest first. Empty when
        /// the branch plainly extends the current tip.
        old_branch: Vec<SealedBlock>,
    },
    /// The branch does not improve on the canonical chain.
    NoChainSwitch,
    /// The branch cannot be connected to any known ancestor.
    UnknownBranch,
    /// The branch is internally inconsistent.
    InvalidBranch,
}

/// Reasons the ledger rejects a single block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockImportError {
    /// Header or body validation failed.
    #[error("block validation failed: {0}")]
    Validation(String),
    /// Executing the block produced an unexpected result.
    #[error("block execution failed: {0}")]
    Execution(String),
}

/// Faults the ledger surfaces outside the per-block outcome protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// A trie node needed to execute the block is absent from the state
    /// store. Recoverable by fetching the node from the network.
    #[error("missing state trie node {0}")]
    MissingStateNode(B256),
    /// The ledger failed in a way the importer cannot recover from.
    #[error("ledger failure: {0}")]
    Internal(String),
}
