#![allow(unused)]

use crate::{
    broadcast::{BroadcasterCommand, BroadcasterHandle},
    events::{ImporterEvent, ImporterHandle},
    fetcher::{FetcherCommand, FetcherHandle},
    ledger::{BranchClassification, ImportOutcome, Ledger, LedgerError},
    pool::{OmmerPoolCommand, OmmerPoolHandle, TransactionPoolHandle, TxPoolCommand},
};
use async_trait::async_trait;
use ember_primitives::{BlockNumber, Bytes, NewBlock, SealedBlock, SealedHeader, B256};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
};
use tokio::sync::{mpsc, Semaphore};

/// Generators for random headers, transactions and parented block chains.
pub mod generators;

/// A scripted [`Ledger`] for tests.
///
/// Import outcomes are popped in FIFO order, falling back to
/// `ImportedToTop` for the imported block itself once the script runs dry.
/// Every call is recorded so tests can assert on what the importer asked
/// for.
#[derive(Debug)]
pub struct TestLedger {
    best_block: AtomicU64,
    classification: Mutex<BranchClassification>,
    outcomes: Mutex<VecDeque<Result<ImportOutcome, LedgerError>>>,
    imported: Mutex<Vec<SealedBlock>>,
    resolved: Mutex<Vec<Vec<SealedHeader>>>,
    saved_nodes: Mutex<Vec<(B256, Bytes, BlockNumber)>>,
    gated: AtomicBool,
    gate: Semaphore,
}

impl Default for TestLedger {
    fn default() -> Self {
        Self {
            best_block: AtomicU64::new(0),
            classification: Mutex::new(BranchClassification::NewBetterBranch {
                old_branch: Vec::new(),
            }),
            outcomes: Mutex::new(VecDeque::new()),
            imported: Mutex::new(Vec::new()),
            resolved: Mutex::new(Vec::new()),
            saved_nodes: Mutex::new(Vec::new()),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }
}

// === impl TestLedger ===

impl TestLedger {
    /// Creates a ledger whose best block is `best_block`.
    pub fn new(best_block: BlockNumber) -> Self {
        let this = Self::default();
        this.best_block.store(best_block, Ordering::SeqCst);
        this
    }

    /// Scripts the outcome of the next unscripted `import_block` call.
    pub fn push_outcome(&self, outcome: Result<ImportOutcome, LedgerError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Scripts the outcomes of the next `import_block` calls in order.
    pub fn extend_outcomes(
        &self,
        outcomes: impl IntoIterator<Item = Result<ImportOutcome, LedgerError>>,
    ) {
        self.outcomes.lock().unwrap().extend(outcomes);
    }

    /// Sets the classification returned by `resolve_branch`.
    pub fn set_classification(&self, classification: BranchClassification) {
        *self.classification.lock().unwrap() = classification;
    }

    /// Makes `import_block` wait for [`Self::release_import`] before
    /// resolving, so tests can observe an import in flight.
    pub fn hold_imports(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Lets one held `import_block` call proceed.
    pub fn release_import(&self) {
        self.gate.add_permits(1);
    }

    /// Blocks handed to `import_block` so far, in call order.
    pub fn imported_blocks(&self) -> Vec<SealedBlock> {
        self.imported.lock().unwrap().clone()
    }

    /// Header sequences handed to `resolve_branch` so far.
    pub fn resolved_branches(&self) -> Vec<Vec<SealedHeader>> {
        self.resolved.lock().unwrap().clone()
    }

    /// Nodes persisted through `save_node` so far.
    pub fn saved_nodes(&self) -> Vec<(B256, Bytes, BlockNumber)> {
        self.saved_nodes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for TestLedger {
    async fn import_block(&self, block: SealedBlock) -> Result<ImportOutcome, LedgerError> {
        // record before the gate so tests can observe an import in flight
        self.imported.lock().unwrap().push(block.clone());
        if self.gated.load(Ordering::SeqCst) {
            self.gate.acquire().await.expect("import gate closed").forget();
        }
        let scripted = self.outcomes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let total_difficulty = block.header.difficulty;
            Ok(ImportOutcome::ImportedToTop { chain: vec![NewBlock { block, total_difficulty }] })
        })
    }

    fn resolve_branch(&self, headers: Vec<SealedHeader>) -> BranchClassification {
        self.resolved.lock().unwrap().push(headers);
        self.classification.lock().unwrap().clone()
    }

    fn best_block_number(&self) -> BlockNumber {
        self.best_block.load(Ordering::SeqCst)
    }

    fn save_node(
        &self,
        hash: B256,
        node: Bytes,
        block_number: BlockNumber,
    ) -> Result<(), LedgerError> {
        self.saved_nodes.lock().unwrap().push((hash, node, block_number));
        Ok(())
    }
}

/// Creates a connected fetcher handle and command receiver.
pub fn fetcher_channel() -> (FetcherHandle, mpsc::UnboundedReceiver<FetcherCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FetcherHandle::new(tx), rx)
}

/// Creates a connected ommer pool handle and command receiver.
pub fn ommer_pool_channel() -> (OmmerPoolHandle, mpsc::UnboundedReceiver<OmmerPoolCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OmmerPoolHandle::new(tx), rx)
}

/// Creates a connected transaction pool handle and command receiver.
pub fn transaction_pool_channel() -> (TransactionPoolHandle, mpsc::UnboundedReceiver<TxPoolCommand>)
{
    let (tx, rx) = mpsc::unbounded_channel();
    (TransactionPoolHandle::new(tx), rx)
}

/// Creates a connected broadcaster handle and command receiver.
pub fn broadcaster_channel() -> (BroadcasterHandle, mpsc::UnboundedReceiver<BroadcasterCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BroadcasterHandle::new(tx), rx)
}

/// Creates a connected importer handle and event receiver.
pub fn importer_channel() -> (ImporterHandle, mpsc::UnboundedReceiver<ImporterEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ImporterHandle::new(tx), rx)
}

/// Drains every message currently buffered in the channel.
pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}
