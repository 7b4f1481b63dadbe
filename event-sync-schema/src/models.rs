// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Row models for the event-sync tables.
//!
//! Addresses are stored as 20-byte `BYTEA`, hashes and topics as 32-byte
//! `BYTEA`, token amounts as 32-byte big-endian `BYTEA` (full uint256
//! precision), and timestamps as Unix seconds.

use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::{
    deposit_tokens, grant_reward_tokens, processed_blocks, raw_blocks, raw_events,
    withdraw_manager_updates, withdraw_tokens,
};

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Insertable)]
#[diesel(table_name = raw_blocks)]
pub struct RawBlockRow {
    pub hash: Vec<u8>,
    pub parent_hash: Vec<u8>,
    pub number: i64,
    pub timestamp: i64,
    pub encoded_header: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Insertable)]
#[diesel(table_name = raw_events)]
pub struct RawEventRow {
    pub guid: Uuid,
    pub block_hash: Vec<u8>,
    pub block_number: i64,
    pub tx_hash: Vec<u8>,
    pub log_index: i64,
    pub contract_address: Vec<u8>,
    pub event_signature: Vec<u8>,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
    pub timestamp: i64,
    pub encoded_log: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Insertable)]
#[diesel(table_name = processed_blocks)]
pub struct ProcessedBlockRow {
    pub hash: Vec<u8>,
    pub parent_hash: Vec<u8>,
    pub number: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Insertable)]
#[diesel(table_name = deposit_tokens)]
pub struct DepositTokenRow {
    pub guid: Uuid,
    pub block_number: i64,
    pub token_address: Vec<u8>,
    pub sender: Vec<u8>,
    pub amount: Vec<u8>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Insertable)]
#[diesel(table_name = withdraw_tokens)]
pub struct WithdrawTokenRow {
    pub guid: Uuid,
    pub block_number: i64,
    pub token_address: Vec<u8>,
    pub sender: Vec<u8>,
    pub receiver: Vec<u8>,
    pub amount: Vec<u8>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Insertable)]
#[diesel(table_name = grant_reward_tokens)]
pub struct GrantRewardTokenRow {
    pub guid: Uuid,
    pub block_number: i64,
    pub token_address: Vec<u8>,
    pub granter: Vec<u8>,
    pub amount: Vec<u8>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Insertable)]
#[diesel(table_name = withdraw_manager_updates)]
pub struct WithdrawManagerUpdateRow {
    pub guid: Uuid,
    pub block_number: i64,
    pub withdraw_manager: Vec<u8>,
    pub timestamp: i64,
}
