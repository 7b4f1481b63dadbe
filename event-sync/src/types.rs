// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Domain types shared by the synchronizer and the event processor.

use ethers::types::{Address, Bytes, Log, H256, U256};
use uuid::Uuid;

/// A confirmed block header as ingested by the synchronizer.
///
/// `encoded` carries the provider's encoding of the full header; the core
/// treats it as an opaque provenance blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub hash: H256,
    pub parent_hash: H256,
    pub number: u64,
    pub timestamp: u64,
    pub encoded: Bytes,
}

/// A raw contract event as emitted on chain, stamped with the timestamp of
/// its containing block. Insert-only; `(tx_hash, log_index)` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractEvent {
    pub guid: Uuid,
    pub block_hash: H256,
    pub block_number: u64,
    pub tx_hash: H256,
    pub log_index: u64,
    pub contract_address: Address,
    pub event_signature: H256,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub timestamp: u64,
    pub encoded_log: Bytes,
}

impl ContractEvent {
    /// Build a [`ContractEvent`] from an on-chain log. Returns `None` for
    /// pending logs that carry no block or transaction position yet.
    pub fn from_log(log: &Log, timestamp: u64) -> Option<Self> {
        let block_hash = log.block_hash?;
        let block_number = log.block_number?.as_u64();
        let tx_hash = log.transaction_hash?;
        let log_index = log.log_index?.as_u64();
        let encoded_log = serde_json::to_vec(log).ok()?;

        Some(Self {
            guid: Uuid::new_v4(),
            block_hash,
            block_number,
            tx_hash,
            log_index,
            contract_address: log.address,
            event_signature: log.topics.first().copied().unwrap_or_default(),
            topics: log.topics.clone(),
            data: log.data.clone(),
            timestamp,
            encoded_log: encoded_log.into(),
        })
    }
}

/// The highest block for which the event processor has committed decoded
/// records. Always a subset of the stored raw blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedBlock {
    pub hash: H256,
    pub parent_hash: H256,
    pub number: u64,
    pub timestamp: u64,
}

impl From<&BlockHeader> for ProcessedBlock {
    fn from(header: &BlockHeader) -> Self {
        Self {
            hash: header.hash,
            parent_hash: header.parent_hash,
            number: header.number,
            timestamp: header.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositToken {
    pub guid: Uuid,
    pub block_number: u64,
    pub token_address: Address,
    pub sender: Address,
    pub amount: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawToken {
    pub guid: Uuid,
    pub block_number: u64,
    pub token_address: Address,
    pub sender: Address,
    pub receiver: Address,
    pub amount: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRewardToken {
    pub guid: Uuid,
    pub block_number: u64,
    pub token_address: Address,
    pub granter: Address,
    pub amount: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawManagerUpdate {
    pub guid: Uuid,
    pub block_number: u64,
    pub withdraw_manager: Address,
    pub timestamp: u64,
}

/// Decoded domain records accumulated from one dispatch pass, in chain order
/// (ascending block number, then log index) within each kind.
#[derive(Debug, Clone, Default)]
pub struct DecodedRecords {
    pub deposits: Vec<DepositToken>,
    pub withdrawals: Vec<WithdrawToken>,
    pub reward_grants: Vec<GrantRewardToken>,
    pub manager_updates: Vec<WithdrawManagerUpdate>,
}

impl DecodedRecords {
    pub fn len(&self) -> usize {
        self.deposits.len()
            + self.withdrawals.len()
            + self.reward_grants.len()
            + self.manager_updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extend(&mut self, other: DecodedRecords) {
        self.deposits.extend(other.deposits);
        self.withdrawals.extend(other.withdrawals);
        self.reward_grants.extend(other.reward_grants);
        self.manager_updates.extend(other.manager_updates);
    }
}
