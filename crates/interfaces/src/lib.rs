//! Contracts between the block importer and the rest of the node.
//!
//! The importer owns no collaborator: the ledger is consumed through the
//! [`Ledger`](ledger::Ledger) trait, while the block fetcher, the ommer
//! pool, the pending transaction pool and the block broadcaster are reached
//! by message through cloneable channel handles defined here. The importer's
//! own inbox lives here as well, so that fetcher and importer hold
//! send-capabilities to each other rather than owning references.

/// Block broadcaster messages.
pub mod broadcast;

/// The importer inbox and the handle producers use to fill it.
pub mod events;

/// Block fetcher messages.
pub mod fetcher;

/// The ledger contract and its import outcomes.
pub mod ledger;

/// Ommer pool and pending transaction pool messages.
pub mod pool;

/// Common test helpers for collaborator endpoints.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
