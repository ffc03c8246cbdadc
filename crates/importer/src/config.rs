use serde::Deserialize;
use std::time::Duration;

/// Number of blocks requested from the fetcher per batch.
pub const BLOCK_BATCH_SIZE: usize = 50;

/// The configuration of the block import service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    /// How long the importer waits for events before prompting the fetcher
    /// for the next batch.
    pub sync_retry_interval: Duration,
    /// How many blocks before an unknown branch the fetcher restarts from,
    /// so the re-fetched range carries enough history to connect the branch.
    pub branch_resolution_request_size: u64,
    /// Whether a state trie node reported missing during import is repaired
    /// by re-downloading it from the network.
    ///
    /// When disabled a missing node terminates the service.
    pub redownload_missing_state_nodes: bool,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            sync_retry_interval: Duration::from_secs(5),
            branch_resolution_request_size: 30,
            redownload_missing_state_nodes: true,
        }
    }
}
