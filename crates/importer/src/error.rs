use ember_interfaces::ledger::LedgerError;

/// Fatal faults that terminate the block import service.
///
/// Everything the importer can recover from (rejected blocks, unknown
/// branches, missing state nodes while repair is enabled) is handled
/// internally and never surfaces here. Whoever spawned the service is
/// expected to restart it and re-issue `start`.
#[derive(Debug, thiserror::Error)]
pub enum ImporterError {
    /// The ledger failed outside the per-block outcome protocol.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
