use ember_primitives::{Header, Transaction};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Commands understood by the ommer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OmmerPoolCommand {
    /// Offers candidate ommer headers for inclusion in future blocks.
    AddOmmers(Vec<Header>),
    /// Drops headers that can no longer be referenced as ommers.
    RemoveOmmers(Vec<Header>),
}

/// A communication channel to the ommer pool.
#[derive(Debug, Clone)]
pub struct OmmerPoolHandle {
    /// Sender half of the command channel to the pool.
    to_pool: mpsc::UnboundedSender<OmmerPoolCommand>,
}

// === impl OmmerPoolHandle ===

impl OmmerPoolHandle {
    /// Creates a new handle wrapping the given command sender.
    pub fn new(to_pool: mpsc::UnboundedSender<OmmerPoolCommand>) -> Self {
        Self { to_pool }
    }

    /// Offers candidate ommer headers.
    pub fn add_ommers(&self, headers: Vec<Header>) {
        let _ = self.to_pool.send(OmmerPoolCommand::AddOmmers(headers));
    }

    /// Drops headers that can no longer be referenced as ommers.
    pub fn remove_ommers(&self, headers: Vec<Header>) {
        let _ = self.to_pool.send(OmmerPoolCommand::RemoveOmmers(headers));
    }
}

/// Commands understood by the pending transaction pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxPoolCommand {
    /// Returns transactions to the pending set, e.g. after their block was
    /// displaced by a reorganisation.
    AddTransactions(HashSet<Transaction>),
    /// Removes transactions that were included in a canonical block.
    RemoveTransactions(Vec<Transaction>),
}

/// A communication channel to the pending transaction pool.
#[derive(Debug, Clone)]
pub struct TransactionPoolHandle {
    /// Sender half of the command channel to the pool.
    to_pool: mpsc::UnboundedSender<TxPoolCommand>,
}

// === impl TransactionPoolHandle ===

impl TransactionPoolHandle {
    /// Creates a new handle wrapping the given command sender.
    pub fn new(to_pool: mpsc::UnboundedSender<TxPoolCommand>) -> Self {
        Self { to_pool }
    }

    /// Returns transactions to the pending set.
    pub fn add_transactions(&self, transactions: HashSet<Transaction>) {
        let _ = self.to_pool.send(TxPoolCommand::AddTransactions(transactions));
    }

    /// Removes transactions included in a canonical block.
    pub fn remove_transactions(&self, transactions: Vec<Transaction>) {
        let _ = self.to_pool.send(TxPoolCommand::RemoveTransactions(transactions));
    }
}
