//! Block import service for the ember node.
//!
//! The importer consumes candidate blocks from three producers (batches
//! delivered by the block fetcher, locally mined blocks and peer `NewBlock`
//! announcements) and drives them through the ledger to advance the
//! canonical chain. Per block or batch it decides whether to extend the
//! chain, enqueue for later, reorganise onto a competing branch, discard, or
//! repair missing state, and it keeps the ommer pool, the pending
//! transaction pool and the block broadcaster consistent with those
//! decisions.
//!
//! The entry point is [`BlockImportService`]: a future that owns all
//! importer state and processes one event at a time, with at most one
//! ledger import in flight.

mod batch;
mod branch;
mod config;
mod error;
mod metrics;
mod pool_sync;
mod service;
mod single;
mod state;

pub use config::{ImporterConfig, BLOCK_BATCH_SIZE};
pub use error::ImporterError;
pub use service::BlockImportService;
pub use state::ImporterState;
