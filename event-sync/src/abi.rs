// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! TreasuryManager event ABI.
//!
//! Filter structs mirror the contract's event declarations; topic hashes are
//! derived from the canonical signatures.

use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::types::{Address, H256, U256};

use crate::error::{SyncError, SyncResult};
use crate::types::ContractEvent;

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "DepositToken",
    abi = "DepositToken(address,address,uint256)"
)]
pub struct DepositTokenFilter {
    #[ethevent(indexed)]
    pub token_address: Address,
    #[ethevent(indexed)]
    pub sender: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "WithdrawToken",
    abi = "WithdrawToken(address,address,address,uint256)"
)]
pub struct WithdrawTokenFilter {
    #[ethevent(indexed)]
    pub token_address: Address,
    pub sender: Address,
    pub withdraw_address: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "GrantRewardTokenAmount",
    abi = "GrantRewardTokenAmount(address,address,uint256)"
)]
pub struct GrantRewardTokenAmountFilter {
    #[ethevent(indexed)]
    pub token_address: Address,
    pub granter: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "WithdrawManagerUpdate",
    abi = "WithdrawManagerUpdate(address)"
)]
pub struct WithdrawManagerUpdateFilter {
    #[ethevent(indexed)]
    pub withdraw_manager: Address,
}

/// A decoded TreasuryManager event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreasuryEvent {
    Deposit(DepositTokenFilter),
    Withdraw(WithdrawTokenFilter),
    GrantReward(GrantRewardTokenAmountFilter),
    ManagerUpdate(WithdrawManagerUpdateFilter),
}

impl TreasuryEvent {
    /// Decode a raw contract event. Returns `Ok(None)` for signatures this
    /// contract does not declare; a malformed log under a known signature is
    /// an error, never silently dropped.
    pub fn try_decode(event: &ContractEvent) -> SyncResult<Option<Self>> {
        let raw = RawLog {
            topics: event.topics.clone(),
            data: event.data.to_vec(),
        };
        let topic0 = event.event_signature;

        if topic0 == DepositTokenFilter::signature() {
            let parsed = DepositTokenFilter::decode_log(&raw)
                .map_err(|e| decode_err("DepositToken", event, e))?;
            Ok(Some(TreasuryEvent::Deposit(parsed)))
        } else if topic0 == WithdrawTokenFilter::signature() {
            let parsed = WithdrawTokenFilter::decode_log(&raw)
                .map_err(|e| decode_err("WithdrawToken", event, e))?;
            Ok(Some(TreasuryEvent::Withdraw(parsed)))
        } else if topic0 == GrantRewardTokenAmountFilter::signature() {
            let parsed = GrantRewardTokenAmountFilter::decode_log(&raw)
                .map_err(|e| decode_err("GrantRewardTokenAmount", event, e))?;
            Ok(Some(TreasuryEvent::GrantReward(parsed)))
        } else if topic0 == WithdrawManagerUpdateFilter::signature() {
            let parsed = WithdrawManagerUpdateFilter::decode_log(&raw)
                .map_err(|e| decode_err("WithdrawManagerUpdate", event, e))?;
            Ok(Some(TreasuryEvent::ManagerUpdate(parsed)))
        } else {
            Ok(None)
        }
    }
}

fn decode_err(
    event_name: &'static str,
    event: &ContractEvent,
    e: ethers::abi::Error,
) -> SyncError {
    SyncError::Decode {
        event: event_name,
        block_number: event.block_number,
        reason: e.to_string(),
    }
}

/// topic0 for each recognized event, as emitted by the deployed contract.
pub fn known_signatures() -> [H256; 4] {
    [
        DepositTokenFilter::signature(),
        WithdrawTokenFilter::signature(),
        GrantRewardTokenAmountFilter::signature(),
        WithdrawManagerUpdateFilter::signature(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{encode_u256, make_event};

    // Canonical hashes from the deployed contract's ABI bindings.
    const DEPOSIT_TOKEN_TOPIC: &str =
        "4b3f81827ede20c81afbf1bb77b954afcdcae24d391d99042310cb1d9210dd57";
    const WITHDRAW_TOKEN_TOPIC: &str =
        "9ca7c1e047552a8048d924a5a8d3c150eb861086a72a9100e5f19d1176c1b746";
    const GRANT_REWARD_TOPIC: &str =
        "10621458f3ad2a9cfcb87c216122570629e44079d6af4d717035eb55d2c60424";
    const MANAGER_UPDATE_TOPIC: &str =
        "799e16a314d482c87bc47fd219011aaf33f4f9c7e302be5d7a0af286a52998b9";

    fn topic(hex: &str) -> H256 {
        hex.parse().unwrap()
    }

    #[test]
    fn test_signatures_match_deployed_abi() {
        assert_eq!(DepositTokenFilter::signature(), topic(DEPOSIT_TOKEN_TOPIC));
        assert_eq!(
            WithdrawTokenFilter::signature(),
            topic(WITHDRAW_TOKEN_TOPIC)
        );
        assert_eq!(
            GrantRewardTokenAmountFilter::signature(),
            topic(GRANT_REWARD_TOPIC)
        );
        assert_eq!(
            WithdrawManagerUpdateFilter::signature(),
            topic(MANAGER_UPDATE_TOPIC)
        );
    }

    #[test]
    fn test_decode_deposit_token() {
        let token = Address::repeat_byte(0xb0);
        let sender = Address::repeat_byte(0xc0);
        let amount = U256::from(100u64);

        let event = make_event(
            Address::repeat_byte(0xaa),
            10,
            2,
            vec![
                DepositTokenFilter::signature(),
                H256::from(token),
                H256::from(sender),
            ],
            encode_u256(amount),
        );

        let decoded = TreasuryEvent::try_decode(&event).unwrap().unwrap();
        assert_eq!(
            decoded,
            TreasuryEvent::Deposit(DepositTokenFilter {
                token_address: token,
                sender,
                amount,
            })
        );
    }

    #[test]
    fn test_decode_withdraw_token() {
        let token = Address::repeat_byte(0xb0);
        let sender = Address::repeat_byte(0xc0);
        let receiver = Address::repeat_byte(0xd0);
        let amount = U256::from(42u64);

        let mut data = Vec::new();
        data.extend_from_slice(H256::from(sender).as_bytes());
        data.extend_from_slice(H256::from(receiver).as_bytes());
        data.extend_from_slice(&encode_u256(amount));

        let event = make_event(
            Address::repeat_byte(0xaa),
            11,
            0,
            vec![WithdrawTokenFilter::signature(), H256::from(token)],
            data,
        );

        let decoded = TreasuryEvent::try_decode(&event).unwrap().unwrap();
        assert_eq!(
            decoded,
            TreasuryEvent::Withdraw(WithdrawTokenFilter {
                token_address: token,
                sender,
                withdraw_address: receiver,
                amount,
            })
        );
    }

    #[test]
    fn test_decode_grant_reward() {
        let token = Address::repeat_byte(0xb0);
        let granter = Address::repeat_byte(0xe0);
        let amount = U256::from(7u64);

        let mut data = Vec::new();
        data.extend_from_slice(H256::from(granter).as_bytes());
        data.extend_from_slice(&encode_u256(amount));

        let event = make_event(
            Address::repeat_byte(0xaa),
            12,
            1,
            vec![GrantRewardTokenAmountFilter::signature(), H256::from(token)],
            data,
        );

        let decoded = TreasuryEvent::try_decode(&event).unwrap().unwrap();
        assert_eq!(
            decoded,
            TreasuryEvent::GrantReward(GrantRewardTokenAmountFilter {
                token_address: token,
                granter,
                amount,
            })
        );
    }

    #[test]
    fn test_decode_manager_update() {
        let manager = Address::repeat_byte(0xf0);
        let event = make_event(
            Address::repeat_byte(0xaa),
            13,
            0,
            vec![WithdrawManagerUpdateFilter::signature(), H256::from(manager)],
            Vec::new(),
        );

        let decoded = TreasuryEvent::try_decode(&event).unwrap().unwrap();
        assert_eq!(
            decoded,
            TreasuryEvent::ManagerUpdate(WithdrawManagerUpdateFilter {
                withdraw_manager: manager,
            })
        );
    }

    #[test]
    fn test_unknown_signature_is_ignored() {
        let event = make_event(
            Address::repeat_byte(0xaa),
            14,
            0,
            vec![H256::repeat_byte(0x99)],
            Vec::new(),
        );
        assert_eq!(TreasuryEvent::try_decode(&event).unwrap(), None);
    }

    #[test]
    fn test_known_signatures_are_distinct() {
        let signatures = known_signatures();
        for (i, a) in signatures.iter().enumerate() {
            for b in signatures.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_truncated_data_fails() {
        // Known signature but the uint256 payload is cut short.
        let event = make_event(
            Address::repeat_byte(0xaa),
            42,
            0,
            vec![
                DepositTokenFilter::signature(),
                H256::repeat_byte(0xb0),
                H256::repeat_byte(0xc0),
            ],
            vec![0u8; 16],
        );

        let err = TreasuryEvent::try_decode(&event).unwrap_err();
        match err {
            SyncError::Decode {
                event,
                block_number,
                ..
            } => {
                assert_eq!(event, "DepositToken");
                assert_eq!(block_number, 42);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
