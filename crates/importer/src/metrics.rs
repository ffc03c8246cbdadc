use metrics::{counter, Counter};

/// Block importer metrics.
#[derive(Clone)]
pub(crate) struct ImporterMetrics {
    /// Total number of blocks adopted into the canonical chain.
    pub(crate) imported_blocks: Counter,
    /// Total number of chain reorganisations observed while importing.
    pub(crate) reorganisations: Counter,
    /// Total number of blocks the ledger rejected.
    pub(crate) rejected_blocks: Counter,
    /// Total number of missing-state-node repairs started from a batch.
    pub(crate) missing_state_nodes: Counter,
    /// Total number of missing-state-node observations on the single-block
    /// path, which defers to header sync instead of repairing.
    pub(crate) single_block_missing_state_nodes: Counter,
    /// Total number of mined blocks rerouted to the ommer pool because an
    /// import was in flight or the node was not at the tip.
    pub(crate) rerouted_mined_blocks: Counter,
}

impl Default for ImporterMetrics {
    fn default() -> Self {
        Self {
            imported_blocks: counter!("sync.importer.imported_blocks"),
            reorganisations: counter!("sync.importer.reorganisations"),
            rejected_blocks: counter!("sync.importer.rejected_blocks"),
            missing_state_nodes: counter!("sync.importer.missing_state_nodes"),
            single_block_missing_state_nodes: counter!(
                "sync.importer.single_block_missing_state_nodes"
            ),
            rerouted_mined_blocks: counter!("sync.importer.rerouted_mined_blocks"),
        }
    }
}
