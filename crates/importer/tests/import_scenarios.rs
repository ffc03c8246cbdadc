//! End-to-end scenarios for the block import service, exercised through its
//! handle against a scripted ledger and recording collaborator endpoints.

use assert_matches::assert_matches;
use ember_importer::{BlockImportService, ImporterConfig, ImporterError, BLOCK_BATCH_SIZE};
use ember_interfaces::{
    broadcast::BroadcasterCommand,
    events::ImporterHandle,
    fetcher::FetcherCommand,
    ledger::{ImportOutcome, LedgerError},
    pool::{OmmerPoolCommand, TxPoolCommand},
    test_utils::{
        broadcaster_channel, drain, fetcher_channel, generators, ommer_pool_channel,
        transaction_pool_channel, TestLedger,
    },
};
use ember_primitives::{keccak256, Bytes, NewBlock, PeerId, SealedBlock, B256};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    task::JoinHandle,
    time::{sleep, timeout},
};

struct Harness {
    ledger: Arc<TestLedger>,
    handle: ImporterHandle,
    fetcher_rx: UnboundedReceiver<FetcherCommand>,
    ommers_rx: UnboundedReceiver<OmmerPoolCommand>,
    txs_rx: UnboundedReceiver<TxPoolCommand>,
    broadcast_rx: UnboundedReceiver<BroadcasterCommand>,
    service: JoinHandle<Result<(), ImporterError>>,
}

fn spawn_importer(config: ImporterConfig, ledger: Arc<TestLedger>) -> Harness {
    let (fetcher, fetcher_rx) = fetcher_channel();
    let (ommer_pool, ommers_rx) = ommer_pool_channel();
    let (transaction_pool, txs_rx) = transaction_pool_channel();
    let (broadcaster, broadcast_rx) = broadcaster_channel();
    let (service, handle) = BlockImportService::new(
        config,
        Arc::clone(&ledger),
        fetcher,
        ommer_pool,
        transaction_pool,
        broadcaster,
    );
    let service = tokio::spawn(service);
    Harness { ledger, handle, fetcher_rx, ommers_rx, txs_rx, broadcast_rx, service }
}

/// A config whose retry prompt stays out of the way of scripted scenarios.
fn quiet_config() -> ImporterConfig {
    ImporterConfig { sync_retry_interval: Duration::from_secs(120), ..Default::default() }
}

async fn recv<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

/// Waits until the ledger has seen `count` import calls.
async fn wait_for_imports(ledger: &TestLedger, count: usize) {
    timeout(Duration::from_secs(5), async {
        while ledger.imported_blocks().len() < count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for import calls")
}

fn announced(block: &SealedBlock) -> NewBlock {
    NewBlock { block: block.clone(), total_difficulty: block.header.difficulty }
}

/// Consumes the start sequence: the fetcher start command and the initial
/// batch prompt.
async fn expect_started(harness: &mut Harness, best: u64) {
    assert_matches!(
        recv(&mut harness.fetcher_rx).await,
        FetcherCommand::Start { from, .. } if from == best
    );
    assert_matches!(
        recv(&mut harness.fetcher_rx).await,
        FetcherCommand::PickBlocks { count: BLOCK_BATCH_SIZE }
    );
}

#[tokio::test]
async fn happy_batch_extends_the_chain() {
    let ledger = Arc::new(TestLedger::new(0));
    let mut harness = spawn_importer(quiet_config(), ledger);
    harness.handle.start();
    expect_started(&mut harness, 0).await;

    let mut rng = generators::rng();
    let blocks = generators::random_block_range(&mut rng, 1..=3, B256::ZERO, 1);
    harness.handle.picked_blocks(blocks.clone());

    // one announcement covering the whole batch, with total difficulties
    let expected: Vec<NewBlock> = blocks.iter().map(announced).collect();
    assert_eq!(
        recv(&mut harness.broadcast_rx).await,
        BroadcasterCommand::BroadcastBlocks(expected)
    );

    // the next batch is requested right after
    assert_matches!(
        recv(&mut harness.fetcher_rx).await,
        FetcherCommand::PickBlocks { count: BLOCK_BATCH_SIZE }
    );

    // pools drop what the batch adopted
    for block in &blocks {
        assert_eq!(
            recv(&mut harness.txs_rx).await,
            TxPoolCommand::RemoveTransactions(block.body.clone())
        );
        assert_eq!(
            recv(&mut harness.ommers_rx).await,
            OmmerPoolCommand::RemoveOmmers(vec![block.header.clone().unseal()])
        );
    }

    assert_eq!(harness.ledger.imported_blocks(), blocks);
}

#[tokio::test]
async fn missing_state_node_is_repaired_and_batch_tail_retried() {
    let ledger = Arc::new(TestLedger::new(0));
    let mut rng = generators::rng();
    let blocks = generators::random_block_range(&mut rng, 1..=3, B256::ZERO, 0);
    let missing = B256::repeat_byte(0xaa);

    ledger.push_outcome(Ok(ImportOutcome::ImportedToTop { chain: vec![announced(&blocks[0])] }));
    ledger.push_outcome(Err(LedgerError::MissingStateNode(missing)));

    let mut harness = spawn_importer(quiet_config(), ledger);
    harness.handle.start();
    expect_started(&mut harness, 0).await;

    harness.handle.picked_blocks(blocks.clone());
    assert_matches!(
        recv(&mut harness.fetcher_rx).await,
        FetcherCommand::FetchStateNode { hash } if hash == missing
    );

    // a mined block arriving mid-repair is rerouted, the import gate is
    // still shut
    let mined = generators::random_block(&mut rng, 4, None, None, None);
    harness.handle.mined_block(mined.clone());
    assert_eq!(
        recv(&mut harness.ommers_rx).await,
        OmmerPoolCommand::AddOmmers(vec![mined.header.clone().unseal()])
    );

    // deliver the node under a different key than its hash, only the bytes
    // matter
    let node = Bytes::from_static(b"branch-node");
    harness.handle.fetched_state_node(HashMap::from([(missing, node.clone())]));

    // the tail [B2, B3] goes through again and completes the batch
    let expected: Vec<NewBlock> = blocks[1..].iter().map(announced).collect();
    assert_eq!(
        recv(&mut harness.broadcast_rx).await,
        BroadcasterCommand::BroadcastBlocks(expected)
    );
    assert_matches!(
        recv(&mut harness.fetcher_rx).await,
        FetcherCommand::PickBlocks { count: BLOCK_BATCH_SIZE }
    );

    // the node was keyed by its own hash and the faulting block's number
    assert_eq!(harness.ledger.saved_nodes(), vec![(keccak256(&node), node, blocks[1].number())]);

    let imported = harness.ledger.imported_blocks();
    assert_eq!(imported, vec![blocks[0].clone(), blocks[1].clone(), blocks[1].clone(), blocks[2].clone()]);
}

#[tokio::test]
async fn mined_block_off_tip_becomes_ommer_candidate() {
    let ledger = Arc::new(TestLedger::new(0));
    let mut harness = spawn_importer(quiet_config(), ledger);
    harness.handle.start();
    expect_started(&mut harness, 0).await;

    // the fetcher explicitly reported us behind
    harness.handle.not_on_top();

    let mut rng = generators::rng();
    let mined = generators::random_block(&mut rng, 5, None, None, None);
    harness.handle.mined_block(mined.clone());

    assert_eq!(
        recv(&mut harness.ommers_rx).await,
        OmmerPoolCommand::AddOmmers(vec![mined.header.clone().unseal()])
    );
    assert!(harness.ledger.imported_blocks().is_empty());
}

#[tokio::test]
async fn mined_block_on_tip_is_imported_and_announced() {
    let ledger = Arc::new(TestLedger::new(0));
    let mut harness = spawn_importer(quiet_config(), ledger);
    harness.handle.start();
    expect_started(&mut harness, 0).await;
    harness.handle.on_tip();

    let mut rng = generators::rng();
    let mined = generators::random_block(&mut rng, 5, None, Some(1), None);
    harness.handle.mined_block(mined.clone());

    assert_eq!(
        recv(&mut harness.broadcast_rx).await,
        BroadcasterCommand::BroadcastBlocks(vec![announced(&mined)])
    );
    assert_eq!(harness.ledger.imported_blocks(), vec![mined]);
}

#[tokio::test]
async fn announced_block_while_importing_is_dropped_silently() {
    let ledger = Arc::new(TestLedger::new(0));
    ledger.hold_imports();

    let mut harness = spawn_importer(quiet_config(), Arc::clone(&ledger));
    harness.handle.start();
    expect_started(&mut harness, 0).await;
    harness.handle.on_tip();

    let mut rng = generators::rng();
    let batch = generators::random_block_range(&mut rng, 1..=1, B256::ZERO, 1);
    harness.handle.picked_blocks(batch.clone());
    wait_for_imports(&ledger, 1).await;

    // a peer announcement and a mined block arrive mid-import
    let announced_block = generators::random_block(&mut rng, 2, None, Some(1), None);
    harness.handle.new_block(announced_block, PeerId::repeat_byte(3));
    let mined = generators::random_block(&mut rng, 2, None, None, None);
    harness.handle.mined_block(mined.clone());

    // the mined block is rerouted exactly once, the announcement leaves no
    // trace
    assert_eq!(
        recv(&mut harness.ommers_rx).await,
        OmmerPoolCommand::AddOmmers(vec![mined.header.clone().unseal()])
    );
    sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut harness.broadcast_rx).is_empty());
    assert!(drain(&mut harness.fetcher_rx).is_empty());
    assert_eq!(ledger.imported_blocks(), batch);

    // releasing the gate lets the held batch finish
    ledger.release_import();
    assert_matches!(recv(&mut harness.broadcast_rx).await, BroadcasterCommand::BroadcastBlocks(_));
}

#[tokio::test]
async fn retry_prompt_requests_batches_while_idle() {
    let config = ImporterConfig {
        sync_retry_interval: Duration::from_millis(50),
        ..Default::default()
    };
    let ledger = Arc::new(TestLedger::new(7));
    let mut harness = spawn_importer(config, ledger);
    harness.handle.start();
    expect_started(&mut harness, 7).await;

    // with no events at all, the prompt keeps asking for blocks
    assert_matches!(recv(&mut harness.fetcher_rx).await, FetcherCommand::PickBlocks { .. });
    assert_matches!(recv(&mut harness.fetcher_rx).await, FetcherCommand::PickBlocks { .. });
}

#[tokio::test]
async fn events_before_start_are_ignored() {
    let ledger = Arc::new(TestLedger::new(0));
    let mut rng = generators::rng();
    let block = generators::random_block(&mut rng, 1, None, None, None);

    let mut harness = spawn_importer(quiet_config(), ledger);
    harness.handle.on_tip();
    harness.handle.picked_blocks(vec![block.clone()]);
    harness.handle.new_block(block, PeerId::repeat_byte(9));

    sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut harness.fetcher_rx).is_empty());
    assert!(drain(&mut harness.broadcast_rx).is_empty());
    assert!(harness.ledger.imported_blocks().is_empty());
}

#[tokio::test]
async fn internal_ledger_failure_is_fatal() {
    let ledger = Arc::new(TestLedger::new(0));
    ledger.push_outcome(Err(LedgerError::Internal("database gone".to_owned())));

    let mut rng = generators::rng();
    let blocks = generators::random_block_range(&mut rng, 1..=1, B256::ZERO, 0);

    let mut harness = spawn_importer(quiet_config(), ledger);
    harness.handle.start();
    expect_started(&mut harness, 0).await;
    harness.handle.picked_blocks(blocks);

    let result = timeout(Duration::from_secs(5), harness.service)
        .await
        .expect("service did not terminate")
        .expect("service panicked");
    assert_matches!(result, Err(ImporterError::Ledger(LedgerError::Internal(_))));
}

#[tokio::test]
async fn missing_state_node_is_fatal_when_redownload_is_disabled() {
    let config = ImporterConfig { redownload_missing_state_nodes: false, ..quiet_config() };
    let ledger = Arc::new(TestLedger::new(0));
    ledger.push_outcome(Err(LedgerError::MissingStateNode(B256::repeat_byte(1))));

    let mut rng = generators::rng();
    let blocks = generators::random_block_range(&mut rng, 1..=1, B256::ZERO, 0);

    let mut harness = spawn_importer(config, ledger);
    harness.handle.start();
    expect_started(&mut harness, 0).await;
    harness.handle.picked_blocks(blocks);

    let result = timeout(Duration::from_secs(5), harness.service)
        .await
        .expect("service did not terminate")
        .expect("service panicked");
    assert_matches!(result, Err(ImporterError::Ledger(LedgerError::MissingStateNode(_))));
}

#[tokio::test]
async fn service_shuts_down_once_producers_are_gone() {
    let ledger = Arc::new(TestLedger::new(0));
    let harness = spawn_importer(quiet_config(), ledger);

    let Harness { handle, service, fetcher_rx, .. } = harness;
    // never started, so the fetcher holds no handle back to the importer
    drop(handle);
    drop(fetcher_rx);

    let result = timeout(Duration::from_secs(5), service)
        .await
        .expect("service did not shut down")
        .expect("service panicked");
    assert_matches!(result, Ok(()));
}
