// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Postgres-backed [`Store`] over diesel-async.

use async_trait::async_trait;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use ethers::types::{Address, H256, U256};
use event_sync_pg_db::Db;
use event_sync_schema::models::{
    DepositTokenRow, GrantRewardTokenRow, ProcessedBlockRow, RawBlockRow, RawEventRow,
    WithdrawManagerUpdateRow, WithdrawTokenRow,
};
use event_sync_schema::schema::{
    deposit_tokens, grant_reward_tokens, processed_blocks, raw_blocks, raw_events,
    withdraw_manager_updates, withdraw_tokens,
};

use crate::error::{SyncError, SyncResult};
use crate::store::Store;
use crate::types::{
    BlockHeader, ContractEvent, DecodedRecords, DepositToken, GrantRewardToken, ProcessedBlock,
    WithdrawManagerUpdate, WithdrawToken,
};

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn connect(&self) -> SyncResult<event_sync_pg_db::Connection<'_>> {
        self.db
            .connect()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))
    }
}

fn storage_err<E: std::fmt::Display>(e: E) -> SyncError {
    SyncError::Storage(e.to_string())
}

fn h256(bytes: &[u8]) -> SyncResult<H256> {
    if bytes.len() != 32 {
        return Err(SyncError::Storage(format!(
            "expected 32-byte hash, found {} bytes",
            bytes.len()
        )));
    }
    Ok(H256::from_slice(bytes))
}

fn address(bytes: &[u8]) -> SyncResult<Address> {
    if bytes.len() != 20 {
        return Err(SyncError::Storage(format!(
            "expected 20-byte address, found {} bytes",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(bytes))
}

fn u256_bytes(value: U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf.to_vec()
}

fn block_row(header: &BlockHeader) -> RawBlockRow {
    RawBlockRow {
        hash: header.hash.as_bytes().to_vec(),
        parent_hash: header.parent_hash.as_bytes().to_vec(),
        number: header.number as i64,
        timestamp: header.timestamp as i64,
        encoded_header: header.encoded.to_vec(),
    }
}

fn block_from_row(row: RawBlockRow) -> SyncResult<BlockHeader> {
    Ok(BlockHeader {
        hash: h256(&row.hash)?,
        parent_hash: h256(&row.parent_hash)?,
        number: row.number as u64,
        timestamp: row.timestamp as u64,
        encoded: row.encoded_header.into(),
    })
}

fn event_row(event: &ContractEvent) -> RawEventRow {
    RawEventRow {
        guid: event.guid,
        block_hash: event.block_hash.as_bytes().to_vec(),
        block_number: event.block_number as i64,
        tx_hash: event.tx_hash.as_bytes().to_vec(),
        log_index: event.log_index as i64,
        contract_address: event.contract_address.as_bytes().to_vec(),
        event_signature: event.event_signature.as_bytes().to_vec(),
        topics: event.topics.iter().map(|t| t.as_bytes().to_vec()).collect(),
        data: event.data.to_vec(),
        timestamp: event.timestamp as i64,
        encoded_log: event.encoded_log.to_vec(),
    }
}

fn event_from_row(row: RawEventRow) -> SyncResult<ContractEvent> {
    let topics = row
        .topics
        .iter()
        .map(|t| h256(t))
        .collect::<SyncResult<Vec<_>>>()?;
    Ok(ContractEvent {
        guid: row.guid,
        block_hash: h256(&row.block_hash)?,
        block_number: row.block_number as u64,
        tx_hash: h256(&row.tx_hash)?,
        log_index: row.log_index as u64,
        contract_address: address(&row.contract_address)?,
        event_signature: h256(&row.event_signature)?,
        topics,
        data: row.data.into(),
        timestamp: row.timestamp as u64,
        encoded_log: row.encoded_log.into(),
    })
}

fn processed_row(block: &ProcessedBlock) -> ProcessedBlockRow {
    ProcessedBlockRow {
        hash: block.hash.as_bytes().to_vec(),
        parent_hash: block.parent_hash.as_bytes().to_vec(),
        number: block.number as i64,
        timestamp: block.timestamp as i64,
    }
}

fn processed_from_row(row: ProcessedBlockRow) -> SyncResult<ProcessedBlock> {
    Ok(ProcessedBlock {
        hash: h256(&row.hash)?,
        parent_hash: h256(&row.parent_hash)?,
        number: row.number as u64,
        timestamp: row.timestamp as u64,
    })
}

fn deposit_row(record: &DepositToken) -> DepositTokenRow {
    DepositTokenRow {
        guid: record.guid,
        block_number: record.block_number as i64,
        token_address: record.token_address.as_bytes().to_vec(),
        sender: record.sender.as_bytes().to_vec(),
        amount: u256_bytes(record.amount),
        timestamp: record.timestamp as i64,
    }
}

fn withdraw_row(record: &WithdrawToken) -> WithdrawTokenRow {
    WithdrawTokenRow {
        guid: record.guid,
        block_number: record.block_number as i64,
        token_address: record.token_address.as_bytes().to_vec(),
        sender: record.sender.as_bytes().to_vec(),
        receiver: record.receiver.as_bytes().to_vec(),
        amount: u256_bytes(record.amount),
        timestamp: record.timestamp as i64,
    }
}

fn grant_row(record: &GrantRewardToken) -> GrantRewardTokenRow {
    GrantRewardTokenRow {
        guid: record.guid,
        block_number: record.block_number as i64,
        token_address: record.token_address.as_bytes().to_vec(),
        granter: record.granter.as_bytes().to_vec(),
        amount: u256_bytes(record.amount),
        timestamp: record.timestamp as i64,
    }
}

fn manager_update_row(record: &WithdrawManagerUpdate) -> WithdrawManagerUpdateRow {
    WithdrawManagerUpdateRow {
        guid: record.guid,
        block_number: record.block_number as i64,
        withdraw_manager: record.withdraw_manager.as_bytes().to_vec(),
        timestamp: record.timestamp as i64,
    }
}

#[async_trait]
impl Store for PgStore {
    async fn latest_block(&self) -> SyncResult<Option<BlockHeader>> {
        use raw_blocks::dsl;

        let mut conn = self.connect().await?;
        let row: Option<RawBlockRow> = dsl::raw_blocks
            .order(dsl::number.desc())
            .first(&mut conn)
            .await
            .optional()
            .map_err(storage_err)?;

        row.map(block_from_row).transpose()
    }

    async fn block_by_number(&self, number: u64) -> SyncResult<Option<BlockHeader>> {
        use raw_blocks::dsl;

        let mut conn = self.connect().await?;
        let row: Option<RawBlockRow> = dsl::raw_blocks
            .filter(dsl::number.eq(number as i64))
            .first(&mut conn)
            .await
            .optional()
            .map_err(storage_err)?;

        row.map(block_from_row).transpose()
    }

    async fn largest_block_le(&self, n: u64) -> SyncResult<Option<BlockHeader>> {
        use raw_blocks::dsl;

        let mut conn = self.connect().await?;
        let row: Option<RawBlockRow> = dsl::raw_blocks
            .filter(dsl::number.le(n as i64))
            .order(dsl::number.desc())
            .first(&mut conn)
            .await
            .optional()
            .map_err(storage_err)?;

        row.map(block_from_row).transpose()
    }

    async fn blocks_in_range(&self, lo: u64, hi: u64) -> SyncResult<Vec<BlockHeader>> {
        use raw_blocks::dsl;

        let mut conn = self.connect().await?;
        let rows: Vec<RawBlockRow> = dsl::raw_blocks
            .filter(dsl::number.ge(lo as i64))
            .filter(dsl::number.le(hi as i64))
            .order(dsl::number.asc())
            .load(&mut conn)
            .await
            .map_err(storage_err)?;

        rows.into_iter().map(block_from_row).collect()
    }

    async fn events_in_range(
        &self,
        lo: u64,
        hi: u64,
        contract: Option<Address>,
    ) -> SyncResult<Vec<ContractEvent>> {
        use raw_events::dsl;

        let mut conn = self.connect().await?;
        let mut query = dsl::raw_events
            .filter(dsl::block_number.ge(lo as i64))
            .filter(dsl::block_number.le(hi as i64))
            .into_boxed();
        if let Some(contract) = contract {
            query = query.filter(dsl::contract_address.eq(contract.as_bytes().to_vec()));
        }

        let rows: Vec<RawEventRow> = query
            .order((dsl::block_number.asc(), dsl::log_index.asc()))
            .load(&mut conn)
            .await
            .map_err(storage_err)?;

        rows.into_iter().map(event_from_row).collect()
    }

    async fn latest_processed_block(&self) -> SyncResult<Option<ProcessedBlock>> {
        use processed_blocks::dsl;

        let mut conn = self.connect().await?;
        let row: Option<ProcessedBlockRow> = dsl::processed_blocks
            .order(dsl::number.desc())
            .first(&mut conn)
            .await
            .optional()
            .map_err(storage_err)?;

        row.map(processed_from_row).transpose()
    }

    async fn store_block_batch(
        &self,
        blocks: &[BlockHeader],
        events: &[ContractEvent],
    ) -> SyncResult<()> {
        let block_rows: Vec<RawBlockRow> = blocks.iter().map(block_row).collect();
        let event_rows: Vec<RawEventRow> = events.iter().map(event_row).collect();

        let mut conn = self.connect().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                if !block_rows.is_empty() {
                    diesel::insert_into(raw_blocks::table)
                        .values(&block_rows)
                        .execute(conn)
                        .await?;
                }
                if !event_rows.is_empty() {
                    diesel::insert_into(raw_events::table)
                        .values(&event_rows)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(storage_err)
    }

    async fn store_decoded_batch(
        &self,
        records: &DecodedRecords,
        processed: &[ProcessedBlock],
    ) -> SyncResult<()> {
        let deposit_rows: Vec<DepositTokenRow> = records.deposits.iter().map(deposit_row).collect();
        let withdraw_rows: Vec<WithdrawTokenRow> =
            records.withdrawals.iter().map(withdraw_row).collect();
        let grant_rows: Vec<GrantRewardTokenRow> =
            records.reward_grants.iter().map(grant_row).collect();
        let update_rows: Vec<WithdrawManagerUpdateRow> = records
            .manager_updates
            .iter()
            .map(manager_update_row)
            .collect();
        let processed_rows: Vec<ProcessedBlockRow> = processed.iter().map(processed_row).collect();

        let mut conn = self.connect().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                if !deposit_rows.is_empty() {
                    diesel::insert_into(deposit_tokens::table)
                        .values(&deposit_rows)
                        .execute(conn)
                        .await?;
                }
                if !withdraw_rows.is_empty() {
                    diesel::insert_into(withdraw_tokens::table)
                        .values(&withdraw_rows)
                        .execute(conn)
                        .await?;
                }
                if !grant_rows.is_empty() {
                    diesel::insert_into(grant_reward_tokens::table)
                        .values(&grant_rows)
                        .execute(conn)
                        .await?;
                }
                if !update_rows.is_empty() {
                    diesel::insert_into(withdraw_manager_updates::table)
                        .values(&update_rows)
                        .execute(conn)
                        .await?;
                }
                if !processed_rows.is_empty() {
                    diesel::insert_into(processed_blocks::table)
                        .values(&processed_rows)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(storage_err)
    }
}
