// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-contract event dispatch.
//!
//! Turns raw contract events into typed domain records. Events from other
//! contracts or with unrecognized signatures pass through untouched; a decode
//! failure on a matching event fails the whole batch, because silently
//! skipping a log would leave a gap in the indexed history.

use ethers::types::Address;
use tracing::debug;
use uuid::Uuid;

use crate::abi::TreasuryEvent;
use crate::error::SyncResult;
use crate::types::{
    ContractEvent, DecodedRecords, DepositToken, GrantRewardToken, WithdrawManagerUpdate,
    WithdrawToken,
};

/// Stateless decoder for one watched TreasuryManager deployment.
#[derive(Debug, Clone)]
pub struct TreasuryDispatcher {
    contract_address: Address,
}

impl TreasuryDispatcher {
    pub fn new(contract_address: Address) -> Self {
        Self { contract_address }
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// Decode all matching events into domain records, preserving chain
    /// order within each kind. Record timestamps come from the emitting
    /// block, carried on the raw event row.
    pub fn dispatch(&self, events: &[ContractEvent]) -> SyncResult<DecodedRecords> {
        let mut records = DecodedRecords::default();

        for event in events {
            if event.contract_address != self.contract_address {
                continue;
            }

            match TreasuryEvent::try_decode(event)? {
                None => {
                    debug!(
                        signature = ?event.event_signature,
                        block_number = event.block_number,
                        "ignoring unrecognized event signature"
                    );
                }
                Some(TreasuryEvent::Deposit(deposit)) => {
                    records.deposits.push(DepositToken {
                        guid: Uuid::new_v4(),
                        block_number: event.block_number,
                        token_address: deposit.token_address,
                        sender: deposit.sender,
                        amount: deposit.amount,
                        timestamp: event.timestamp,
                    });
                }
                Some(TreasuryEvent::Withdraw(withdraw)) => {
                    records.withdrawals.push(WithdrawToken {
                        guid: Uuid::new_v4(),
                        block_number: event.block_number,
                        token_address: withdraw.token_address,
                        sender: withdraw.sender,
                        receiver: withdraw.withdraw_address,
                        amount: withdraw.amount,
                        timestamp: event.timestamp,
                    });
                }
                Some(TreasuryEvent::GrantReward(grant)) => {
                    records.reward_grants.push(GrantRewardToken {
                        guid: Uuid::new_v4(),
                        block_number: event.block_number,
                        token_address: grant.token_address,
                        granter: grant.granter,
                        amount: grant.amount,
                        timestamp: event.timestamp,
                    });
                }
                Some(TreasuryEvent::ManagerUpdate(update)) => {
                    records.manager_updates.push(WithdrawManagerUpdate {
                        guid: Uuid::new_v4(),
                        block_number: event.block_number,
                        withdraw_manager: update.withdraw_manager,
                        timestamp: event.timestamp,
                    });
                }
            }
        }

        Ok(records)
    }
}
