// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transactional persistence seam.
//!
//! The two write operations are the pipeline's transaction boundaries:
//! headers and their events commit together, decoded records and the
//! processed-block watermark commit together. Either everything in a call is
//! visible afterwards or nothing is. Reads never observe a partial batch.

use async_trait::async_trait;
use ethers::types::Address;

use crate::error::SyncResult;
use crate::types::{BlockHeader, ContractEvent, DecodedRecords, ProcessedBlock};

mod pg;

pub use pg::PgStore;

#[cfg(test)]
pub mod mem;

#[async_trait]
pub trait Store: Send + Sync {
    /// Highest ingested block, if any.
    async fn latest_block(&self) -> SyncResult<Option<BlockHeader>>;

    async fn block_by_number(&self, number: u64) -> SyncResult<Option<BlockHeader>>;

    /// Highest ingested block with `number <= n`.
    async fn largest_block_le(&self, n: u64) -> SyncResult<Option<BlockHeader>>;

    /// Ingested blocks in the inclusive range, ascending.
    async fn blocks_in_range(&self, lo: u64, hi: u64) -> SyncResult<Vec<BlockHeader>>;

    /// Raw events in the inclusive block range, ordered by
    /// `(block_number, log_index)`, optionally restricted to one contract.
    async fn events_in_range(
        &self,
        lo: u64,
        hi: u64,
        contract: Option<Address>,
    ) -> SyncResult<Vec<ContractEvent>>;

    /// Highest fully processed block, if any.
    async fn latest_processed_block(&self) -> SyncResult<Option<ProcessedBlock>>;

    /// Append a synchronizer batch in one transaction. Uniqueness on block
    /// `number`, block `hash` and event `(tx_hash, log_index)` is enforced
    /// by the store; a replayed batch that trips a constraint rolls back
    /// whole.
    async fn store_block_batch(
        &self,
        blocks: &[BlockHeader],
        events: &[ContractEvent],
    ) -> SyncResult<()>;

    /// Append a processor batch (domain records plus the processed-block
    /// rows covering them) in one transaction.
    async fn store_decoded_batch(
        &self,
        records: &DecodedRecords,
        processed: &[ProcessedBlock],
    ) -> SyncResult<()>;
}
