// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Event processor.
//!
//! Tails the synchronizer through the store: advances a processed-block
//! watermark window by window, decodes the raw events in each window, and
//! commits the decoded records together with the watermark rows. The
//! watermark only moves on commit, so a failed window is retried whole.

use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ChainConfig;
use crate::dispatcher::TreasuryDispatcher;
use crate::error::{SyncError, SyncResult};
use crate::metrics::IndexerMetrics;
use crate::store::Store;
use crate::types::{DecodedRecords, ProcessedBlock};

pub struct EventProcessor {
    store: Arc<dyn Store>,
    dispatchers: Vec<TreasuryDispatcher>,

    block_step: u64,
    loop_interval: std::time::Duration,
    starting_height: u64,

    // Last fully processed block; `None` until the first window commits
    // (unless the store already has processed state).
    watermark: Option<u64>,

    metrics: Arc<IndexerMetrics>,
}

impl EventProcessor {
    pub async fn new(
        config: &ChainConfig,
        store: Arc<dyn Store>,
        metrics: Arc<IndexerMetrics>,
    ) -> SyncResult<Self> {
        let watermark = store.latest_processed_block().await?.map(|b| b.number);
        match watermark {
            Some(number) => info!(number, "event processor resuming from watermark"),
            None => info!(
                starting_height = config.starting_height,
                "no processed state, event processor starting fresh"
            ),
        }

        let dispatchers = config
            .watched_contracts
            .iter()
            .map(|address| TreasuryDispatcher::new(*address))
            .collect();

        Ok(Self {
            store,
            dispatchers,
            block_step: config.block_step,
            loop_interval: config.loop_interval(),
            starting_height: config.starting_height,
            watermark,
            metrics,
        })
    }

    pub async fn run(mut self, cancel: CancellationToken) -> SyncResult<()> {
        info!(
            block_step = self.block_step,
            dispatchers = self.dispatchers.len(),
            "starting event processor"
        );

        let mut interval = time::interval(self.loop_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("event processor cancelled");
                    return Ok(());
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(()) => {}
                        Err(e) if e.is_recoverable() => {
                            // Watermark unchanged; the same window is
                            // retried on the next tick.
                            self.metrics.sync_errors.with_label_values(&[e.error_type()]).inc();
                            warn!(error = %e, "event processing tick failed");
                        }
                        Err(SyncError::Cancelled) => {
                            info!("event processor cancelled");
                            return Ok(());
                        }
                        Err(e) => {
                            self.metrics.sync_errors.with_label_values(&[e.error_type()]).inc();
                            error!(error = %e, "event processor halting on critical error");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Process one window `[watermark+1, watermark+block_step]`, clamped to
    /// what the synchronizer has already ingested.
    pub(crate) async fn tick(&mut self) -> SyncResult<()> {
        let low = match self.watermark {
            Some(watermark) => watermark + 1,
            None => self.starting_height,
        };

        let high_cap = low + self.block_step - 1;
        let Some(high_block) = self.store.largest_block_le(high_cap).await? else {
            debug!("no ingested blocks yet, nothing to process");
            return Ok(());
        };
        if high_block.number < low {
            debug!(
                low,
                ingested = high_block.number,
                "synchronizer has not advanced past watermark"
            );
            return Ok(());
        }
        let high = high_block.number;

        let blocks = self.store.blocks_in_range(low, high).await?;
        let events = self.store.events_in_range(low, high, None).await?;
        debug!(
            from_height = low,
            to_height = high,
            events = events.len(),
            "parsing contract events"
        );

        let mut records = DecodedRecords::default();
        for dispatcher in &self.dispatchers {
            records.extend(dispatcher.dispatch(&events)?);
        }

        let processed: Vec<ProcessedBlock> = blocks.iter().map(ProcessedBlock::from).collect();
        self.store.store_decoded_batch(&records, &processed).await?;

        self.metrics.last_processed_block.set(high as i64);
        self.metrics
            .decoded_records
            .with_label_values(&["deposit"])
            .inc_by(records.deposits.len() as u64);
        self.metrics
            .decoded_records
            .with_label_values(&["withdraw"])
            .inc_by(records.withdrawals.len() as u64);
        self.metrics
            .decoded_records
            .with_label_values(&["reward_grant"])
            .inc_by(records.reward_grants.len() as u64);
        self.metrics
            .decoded_records
            .with_label_values(&["manager_update"])
            .inc_by(records.manager_updates.len() as u64);

        if !records.is_empty() {
            info!(
                from_height = low,
                to_height = high,
                records = records.len(),
                "committed decoded records"
            );
        }

        self.watermark = Some(high);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn watermark(&self) -> Option<u64> {
        self.watermark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{DepositTokenFilter, GrantRewardTokenAmountFilter};
    use crate::store::mem::MemStore;
    use crate::test_utils::{encode_u256, make_chain, make_event, TREASURY_ADDRESS};
    use ethers::contract::EthEvent;
    use ethers::types::{Address, H256, U256};

    fn chain_config(block_step: u64, starting_height: u64) -> ChainConfig {
        ChainConfig {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 17000,
            starting_height,
            confirmation_depth: 0,
            block_step,
            loop_interval_ms: 100,
            watched_contracts: vec![TREASURY_ADDRESS],
        }
    }

    async fn new_processor(config: &ChainConfig, store: Arc<MemStore>) -> EventProcessor {
        EventProcessor::new(config, store, IndexerMetrics::new_for_testing())
            .await
            .unwrap()
    }

    fn deposit_event(block_number: u64, log_index: u64, amount: u64) -> crate::types::ContractEvent {
        make_event(
            TREASURY_ADDRESS,
            block_number,
            log_index,
            vec![
                DepositTokenFilter::signature(),
                H256::repeat_byte(0xb0),
                H256::repeat_byte(0xc0),
            ],
            encode_u256(U256::from(amount)),
        )
    }

    /// Blocks 1..=100 with one deposit each at 10, 20 and 30; the processor
    /// catches up in two windows of 50.
    #[tokio::test]
    async fn test_catch_up_in_two_windows() {
        let chain = make_chain(101);
        let store = Arc::new(MemStore::new());
        let events = vec![
            deposit_event(10, 0, 1),
            deposit_event(20, 0, 2),
            deposit_event(30, 0, 3),
        ];
        store.store_block_batch(&chain[1..], &events).await.unwrap();

        let mut processor = new_processor(&chain_config(50, 1), store.clone()).await;

        // Tick 1: [1, 50], three records
        processor.tick().await.unwrap();
        assert_eq!(processor.watermark(), Some(50));
        assert_eq!(store.deposits().len(), 3);
        let processed = store.processed();
        assert_eq!(processed.len(), 50);
        assert_eq!(processed.first().unwrap().number, 1);
        assert_eq!(processed.last().unwrap().number, 50);

        // Tick 2: [51, 100], no records
        processor.tick().await.unwrap();
        assert_eq!(processor.watermark(), Some(100));
        assert_eq!(store.deposits().len(), 3);
        assert_eq!(store.processed().len(), 100);

        // Tick 3: nothing new
        processor.tick().await.unwrap();
        assert_eq!(processor.watermark(), Some(100));
    }

    #[tokio::test]
    async fn test_idle_until_synchronizer_advances() {
        let store = Arc::new(MemStore::new());
        let mut processor = new_processor(&chain_config(50, 1), store.clone()).await;

        processor.tick().await.unwrap();
        assert_eq!(processor.watermark(), None);
        assert!(store.processed().is_empty());

        // Blocks below the watermark window do not count as progress.
        let chain = make_chain(101);
        store.store_block_batch(&chain[..1], &[]).await.unwrap();
        let mut processor = {
            let mut config = chain_config(50, 1);
            config.starting_height = 1;
            new_processor(&config, store.clone()).await
        };
        processor.tick().await.unwrap();
        assert_eq!(processor.watermark(), None);
    }

    #[tokio::test]
    async fn test_decode_failure_is_fatal_and_rolls_back() {
        // Event at block 42 with a known signature but truncated data.
        let chain = make_chain(51);
        let store = Arc::new(MemStore::new());
        let bad = make_event(
            TREASURY_ADDRESS,
            42,
            0,
            vec![
                DepositTokenFilter::signature(),
                H256::repeat_byte(0xb0),
                H256::repeat_byte(0xc0),
            ],
            vec![0u8; 8],
        );
        store.store_block_batch(&chain[1..], &[bad]).await.unwrap();

        let mut processor = new_processor(&chain_config(50, 1), store.clone()).await;
        // Process [1, 41] first so the watermark sits just below the bad
        // block.
        let mut processor_41 = new_processor(&chain_config(41, 1), store.clone()).await;
        processor_41.tick().await.unwrap();
        assert_eq!(processor_41.watermark(), Some(41));

        processor.watermark = Some(41);
        let err = processor.tick().await.unwrap_err();
        assert!(matches!(err, SyncError::Decode { block_number: 42, .. }));

        // Watermark unchanged, nothing past 41 marked processed.
        assert_eq!(processor.watermark(), Some(41));
        assert_eq!(store.processed().last().unwrap().number, 41);
        assert!(store.deposits().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_leaves_watermark_for_retry() {
        let chain = make_chain(11);
        let store = Arc::new(MemStore::new());
        store
            .store_block_batch(&chain[1..], &[deposit_event(5, 0, 7)])
            .await
            .unwrap();

        let mut processor = new_processor(&chain_config(50, 1), store.clone()).await;
        store.fail_next_writes(1);

        let err = processor.tick().await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(processor.watermark(), None);
        assert!(store.processed().is_empty());

        // Retry of the same range succeeds.
        processor.tick().await.unwrap();
        assert_eq!(processor.watermark(), Some(10));
        assert_eq!(store.deposits().len(), 1);
    }

    #[tokio::test]
    async fn test_records_keep_chain_order_and_block_timestamps() {
        let chain = make_chain(6);
        let store = Arc::new(MemStore::new());
        let events = vec![
            deposit_event(3, 1, 30),
            deposit_event(3, 0, 20),
            deposit_event(2, 5, 10),
        ];
        store.store_block_batch(&chain, &events).await.unwrap();

        let mut processor = new_processor(&chain_config(50, 0), store.clone()).await;
        processor.tick().await.unwrap();

        let deposits = store.deposits();
        assert_eq!(deposits.len(), 3);
        // Ascending (block_number, log_index)
        assert_eq!(deposits[0].amount, U256::from(10u64));
        assert_eq!(deposits[1].amount, U256::from(20u64));
        assert_eq!(deposits[2].amount, U256::from(30u64));
        // Record timestamps come from the emitting block
        assert_eq!(deposits[0].timestamp, chain[2].timestamp);
        assert_eq!(deposits[1].timestamp, chain[3].timestamp);
    }

    #[tokio::test]
    async fn test_watermark_reseeds_from_store() {
        let chain = make_chain(21);
        let store = Arc::new(MemStore::new());
        store.store_block_batch(&chain, &[]).await.unwrap();

        let mut processor = new_processor(&chain_config(10, 0), store.clone()).await;
        processor.tick().await.unwrap();
        assert_eq!(processor.watermark(), Some(9));

        // A fresh processor over the same store resumes where it left off.
        let processor = new_processor(&chain_config(10, 0), store.clone()).await;
        assert_eq!(processor.watermark(), Some(9));
    }

    #[tokio::test]
    async fn test_processed_never_exceeds_ingested() {
        let chain = make_chain(31);
        let store = Arc::new(MemStore::new());
        store.store_block_batch(&chain, &[]).await.unwrap();

        let mut processor = new_processor(&chain_config(100, 0), store.clone()).await;
        processor.tick().await.unwrap();

        let max_processed = store.processed().last().unwrap().number;
        let max_ingested = store.blocks().last().unwrap().number;
        assert!(max_processed <= max_ingested);

        // Every processed row mirrors an ingested block with the same hash.
        for processed in store.processed() {
            let block = store
                .block_by_number(processed.number)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(block.hash, processed.hash);
        }
    }

    /// The same fixture into two fresh stores yields identical domain
    /// tables, surrogate keys aside.
    #[tokio::test]
    async fn test_reingestion_is_deterministic() {
        let chain = make_chain(16);
        let events = vec![deposit_event(4, 0, 100), deposit_event(9, 1, 200)];

        let mut runs = Vec::new();
        for _ in 0..2 {
            let store = Arc::new(MemStore::new());
            store.store_block_batch(&chain, &events).await.unwrap();
            let mut processor = new_processor(&chain_config(100, 0), store.clone()).await;
            processor.tick().await.unwrap();
            runs.push(store.deposits());
        }

        let (first, second) = (&runs[0], &runs[1]);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.block_number, b.block_number);
            assert_eq!(a.token_address, b.token_address);
            assert_eq!(a.sender, b.sender);
            assert_eq!(a.amount, b.amount);
            assert_eq!(a.timestamp, b.timestamp);
        }
    }

    /// Multiple event kinds in one window all land, covered by the
    /// watermark.
    #[tokio::test]
    async fn test_mixed_kinds_covered_by_watermark() {
        let chain = make_chain(11);
        let store = Arc::new(MemStore::new());

        let mut grant_data = Vec::new();
        grant_data.extend_from_slice(H256::repeat_byte(0xe0).as_bytes());
        grant_data.extend_from_slice(&encode_u256(U256::from(12u64)));
        let grant = make_event(
            TREASURY_ADDRESS,
            7,
            0,
            vec![
                GrantRewardTokenAmountFilter::signature(),
                H256::from(Address::repeat_byte(0xb0)),
            ],
            grant_data,
        );

        store
            .store_block_batch(&chain, &[deposit_event(4, 0, 100), grant])
            .await
            .unwrap();

        let mut processor = new_processor(&chain_config(100, 0), store.clone()).await;
        processor.tick().await.unwrap();

        assert_eq!(store.deposits().len(), 1);
        assert_eq!(store.reward_grants().len(), 1);
        for record_block in [4u64, 7u64] {
            assert!(store
                .processed()
                .iter()
                .any(|p| p.number >= record_block));
        }
    }
}
