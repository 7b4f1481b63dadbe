// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`Store`] for tests.
//!
//! Enforces the same uniqueness rules as the Postgres schema and keeps the
//! two batch writes atomic, so pipeline tests observe the same transaction
//! semantics as production. Writes can be made to fail on demand to exercise
//! the retry path.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::types::{Address, H256};

use crate::error::{SyncError, SyncResult};
use crate::store::Store;
use crate::types::{
    BlockHeader, ContractEvent, DecodedRecords, DepositToken, GrantRewardToken, ProcessedBlock,
    WithdrawManagerUpdate, WithdrawToken,
};

#[derive(Default)]
struct MemInner {
    blocks: BTreeMap<u64, BlockHeader>,
    block_hashes: HashSet<H256>,
    events: Vec<ContractEvent>,
    event_keys: HashSet<(H256, u64)>,
    processed: BTreeMap<u64, ProcessedBlock>,
    deposits: Vec<DepositToken>,
    withdrawals: Vec<WithdrawToken>,
    reward_grants: Vec<GrantRewardToken>,
    manager_updates: Vec<WithdrawManagerUpdate>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
    fail_writes: AtomicU32,
    commits: AtomicU32,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` write transactions fail with a storage error.
    pub fn fail_next_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Number of successfully committed write transactions.
    pub fn commit_count(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn blocks(&self) -> Vec<BlockHeader> {
        self.inner.lock().unwrap().blocks.values().cloned().collect()
    }

    pub fn events(&self) -> Vec<ContractEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn processed(&self) -> Vec<ProcessedBlock> {
        self.inner
            .lock()
            .unwrap()
            .processed
            .values()
            .cloned()
            .collect()
    }

    pub fn deposits(&self) -> Vec<DepositToken> {
        self.inner.lock().unwrap().deposits.clone()
    }

    pub fn withdrawals(&self) -> Vec<WithdrawToken> {
        self.inner.lock().unwrap().withdrawals.clone()
    }

    pub fn reward_grants(&self) -> Vec<GrantRewardToken> {
        self.inner.lock().unwrap().reward_grants.clone()
    }

    pub fn manager_updates(&self) -> Vec<WithdrawManagerUpdate> {
        self.inner.lock().unwrap().manager_updates.clone()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn latest_block(&self) -> SyncResult<Option<BlockHeader>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.blocks.values().next_back().cloned())
    }

    async fn block_by_number(&self, number: u64) -> SyncResult<Option<BlockHeader>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.blocks.get(&number).cloned())
    }

    async fn largest_block_le(&self, n: u64) -> SyncResult<Option<BlockHeader>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.blocks.range(..=n).next_back().map(|(_, b)| b.clone()))
    }

    async fn blocks_in_range(&self, lo: u64, hi: u64) -> SyncResult<Vec<BlockHeader>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.blocks.range(lo..=hi).map(|(_, b)| b.clone()).collect())
    }

    async fn events_in_range(
        &self,
        lo: u64,
        hi: u64,
        contract: Option<Address>,
    ) -> SyncResult<Vec<ContractEvent>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<ContractEvent> = inner
            .events
            .iter()
            .filter(|e| e.block_number >= lo && e.block_number <= hi)
            .filter(|e| contract.map_or(true, |c| e.contract_address == c))
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn latest_processed_block(&self) -> SyncResult<Option<ProcessedBlock>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.processed.values().next_back().cloned())
    }

    async fn store_block_batch(
        &self,
        blocks: &[BlockHeader],
        events: &[ContractEvent],
    ) -> SyncResult<()> {
        if self.take_injected_failure() {
            return Err(SyncError::Storage("injected write failure".to_string()));
        }

        let mut inner = self.inner.lock().unwrap();

        // Constraint checks before any mutation keeps the batch atomic.
        for block in blocks {
            if inner.blocks.contains_key(&block.number) {
                return Err(SyncError::Storage(format!(
                    "duplicate block number {}",
                    block.number
                )));
            }
            if inner.block_hashes.contains(&block.hash) {
                return Err(SyncError::Storage(format!(
                    "duplicate block hash {:?}",
                    block.hash
                )));
            }
        }
        for event in events {
            if inner.event_keys.contains(&(event.tx_hash, event.log_index)) {
                return Err(SyncError::Storage(format!(
                    "duplicate event ({:?}, {})",
                    event.tx_hash, event.log_index
                )));
            }
        }

        for block in blocks {
            inner.block_hashes.insert(block.hash);
            inner.blocks.insert(block.number, block.clone());
        }
        for event in events {
            inner.event_keys.insert((event.tx_hash, event.log_index));
            inner.events.push(event.clone());
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn store_decoded_batch(
        &self,
        records: &DecodedRecords,
        processed: &[ProcessedBlock],
    ) -> SyncResult<()> {
        if self.take_injected_failure() {
            return Err(SyncError::Storage("injected write failure".to_string()));
        }

        let mut inner = self.inner.lock().unwrap();

        for block in processed {
            if inner.processed.contains_key(&block.number) {
                return Err(SyncError::Storage(format!(
                    "duplicate processed block {}",
                    block.number
                )));
            }
        }

        inner.deposits.extend(records.deposits.iter().cloned());
        inner.withdrawals.extend(records.withdrawals.iter().cloned());
        inner
            .reward_grants
            .extend(records.reward_grants.iter().cloned());
        inner
            .manager_updates
            .extend(records.manager_updates.iter().cloned());
        for block in processed {
            inner.processed.insert(block.number, block.clone());
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_chain;

    #[tokio::test]
    async fn test_block_queries() {
        let store = MemStore::new();
        let chain = make_chain(10);
        store.store_block_batch(&chain, &[]).await.unwrap();

        assert_eq!(store.latest_block().await.unwrap().unwrap().number, 9);
        assert_eq!(
            store.block_by_number(4).await.unwrap().unwrap().number,
            4
        );
        assert!(store.block_by_number(100).await.unwrap().is_none());
        assert_eq!(
            store.largest_block_le(100).await.unwrap().unwrap().number,
            9
        );
        assert_eq!(store.blocks_in_range(2, 5).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_duplicate_block_number_rejected_atomically() {
        let store = MemStore::new();
        let chain = make_chain(5);
        store.store_block_batch(&chain[..3], &[]).await.unwrap();

        // Overlapping batch trips the constraint; nothing from it lands.
        let err = store.store_block_batch(&chain[2..], &[]).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(store.blocks().len(), 3);
    }

    #[tokio::test]
    async fn test_injected_failure_consumed_per_write() {
        let store = MemStore::new();
        let chain = make_chain(3);
        store.fail_next_writes(1);

        assert!(store.store_block_batch(&chain, &[]).await.is_err());
        assert!(store.blocks().is_empty());

        store.store_block_batch(&chain, &[]).await.unwrap();
        assert_eq!(store.blocks().len(), 3);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_processed_block_rejected() {
        let store = MemStore::new();
        let chain = make_chain(2);
        let processed: Vec<ProcessedBlock> = chain.iter().map(ProcessedBlock::from).collect();
        let records = DecodedRecords::default();

        store
            .store_decoded_batch(&records, &processed)
            .await
            .unwrap();
        let err = store
            .store_decoded_batch(&records, &processed)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(store.processed().len(), 2);
    }
}
