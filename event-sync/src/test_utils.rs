// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixtures shared by the pipeline tests: a deterministic header chain, a
//! programmable mock chain client, and helpers for building raw events.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Log, H256, U256, U64};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::chain_client::{ChainClient, FilterQuery, FilteredLogs};
use crate::error::{SyncError, SyncResult};
use crate::types::{BlockHeader, ContractEvent};

/// Watched contract used throughout the fixtures.
pub const TREASURY_ADDRESS: Address = Address::repeat_byte(0xaa);

/// Install a test subscriber so failing pipeline tests show their logs.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Deterministic hash for block `number` on fork `fork`.
pub fn block_hash(number: u64, fork: u8) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xb1;
    bytes[1] = fork;
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    H256::from(bytes)
}

fn header_at(number: u64, fork: u8, parent_hash: H256) -> BlockHeader {
    BlockHeader {
        hash: block_hash(number, fork),
        parent_hash,
        number,
        timestamp: 1_700_000_000 + number * 12,
        encoded: Bytes::from(number.to_be_bytes().to_vec()),
    }
}

/// Linked chain of `len` headers, numbered from 0.
pub fn make_chain(len: u64) -> Vec<BlockHeader> {
    let mut headers = Vec::with_capacity(len as usize);
    let mut parent = H256::zero();
    for number in 0..len {
        let header = header_at(number, 0, parent);
        parent = header.hash;
        headers.push(header);
    }
    headers
}

/// Linked fork-chain suffix of `len` headers starting at `fork_parent + 1`,
/// connected to the canonical block at `fork_parent`.
pub fn reorged_suffix(fork_parent: u64, len: u64) -> Vec<BlockHeader> {
    let mut headers = Vec::with_capacity(len as usize);
    let mut parent = block_hash(fork_parent, 0);
    for number in fork_parent + 1..=fork_parent + len {
        let header = header_at(number, 1, parent);
        parent = header.hash;
        headers.push(header);
    }
    headers
}

/// Raw contract event with the given topic layout and ABI-encoded data.
pub fn make_event(
    contract: Address,
    block_number: u64,
    log_index: u64,
    topics: Vec<H256>,
    data: Vec<u8>,
) -> ContractEvent {
    ContractEvent {
        guid: Uuid::new_v4(),
        block_hash: block_hash(block_number, 0),
        block_number,
        tx_hash: tx_hash(block_number, log_index),
        log_index,
        contract_address: contract,
        event_signature: topics.first().copied().unwrap_or_default(),
        topics,
        data: Bytes::from(data),
        timestamp: 1_700_000_000 + block_number * 12,
        encoded_log: Bytes::new(),
    }
}

/// Deterministic transaction hash per (block, log) position.
pub fn tx_hash(block_number: u64, log_index: u64) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x7f;
    bytes[8..16].copy_from_slice(&block_number.to_be_bytes());
    bytes[24..].copy_from_slice(&log_index.to_be_bytes());
    H256::from(bytes)
}

/// 32-byte big-endian ABI encoding of a uint256.
pub fn encode_u256(value: U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf.to_vec()
}

/// On-chain log positioned inside `header`.
pub fn make_log(
    header: &BlockHeader,
    contract: Address,
    log_index: u64,
    topics: Vec<H256>,
    data: Vec<u8>,
) -> Log {
    Log {
        address: contract,
        topics,
        data: Bytes::from(data),
        block_hash: Some(header.hash),
        block_number: Some(U64::from(header.number)),
        transaction_hash: Some(tx_hash(header.number, log_index)),
        transaction_index: Some(U64::zero()),
        log_index: Some(U256::from(log_index)),
        transaction_log_index: None,
        log_type: None,
        removed: Some(false),
    }
}

struct MockChainState {
    headers: Vec<BlockHeader>,
    logs: Vec<Log>,
    fail_next_filter: bool,
}

/// Programmable [`ChainClient`]: a header vector indexed by block number,
/// plus a flat list of logs. Reorgs are injected by rewriting a suffix of
/// the header vector.
pub struct MockChainClient {
    chain_id: u64,
    state: Mutex<MockChainState>,
}

impl MockChainClient {
    pub fn new(chain_id: u64, headers: Vec<BlockHeader>) -> Self {
        Self {
            chain_id,
            state: Mutex::new(MockChainState {
                headers,
                logs: Vec::new(),
                fail_next_filter: false,
            }),
        }
    }

    pub fn new_arc(chain_id: u64, headers: Vec<BlockHeader>) -> Arc<Self> {
        Arc::new(Self::new(chain_id, headers))
    }

    pub async fn push_logs(&self, logs: Vec<Log>) {
        self.state.lock().await.logs.extend(logs);
    }

    pub async fn extend_chain(&self, headers: Vec<BlockHeader>) {
        self.state.lock().await.headers.extend(headers);
    }

    /// Replace every header from block `number` onwards with `replacement`,
    /// simulating a reorg that rewrites the tail of the chain.
    pub async fn rewrite_from(&self, number: u64, replacement: Vec<BlockHeader>) {
        let mut state = self.state.lock().await;
        state.headers.truncate(number as usize);
        state.headers.extend(replacement);
    }

    pub async fn fail_next_filter(&self) {
        self.state.lock().await.fail_next_filter = true;
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> SyncResult<u64> {
        Ok(self.chain_id)
    }

    async fn latest_header(&self) -> SyncResult<BlockHeader> {
        let state = self.state.lock().await;
        state
            .headers
            .last()
            .cloned()
            .ok_or_else(|| SyncError::Rpc("latest header unreported".to_string()))
    }

    async fn header_by_number(&self, number: u64) -> SyncResult<Option<BlockHeader>> {
        let state = self.state.lock().await;
        Ok(state.headers.get(number as usize).cloned())
    }

    async fn headers_by_range(&self, start: u64, end: u64) -> SyncResult<Vec<BlockHeader>> {
        let state = self.state.lock().await;
        let mut headers = Vec::new();
        for number in start..=end {
            let header = state
                .headers
                .get(number as usize)
                .cloned()
                .ok_or_else(|| SyncError::Rpc(format!("header {number} unreported")))?;
            headers.push(header);
        }
        Ok(headers)
    }

    async fn filter_logs(&self, query: FilterQuery) -> SyncResult<FilteredLogs> {
        let mut state = self.state.lock().await;
        if state.fail_next_filter {
            state.fail_next_filter = false;
            return Err(SyncError::Rpc("injected filter failure".to_string()));
        }

        let logs: Vec<Log> = state
            .logs
            .iter()
            .filter(|log| {
                let number = log.block_number.map(|n| n.as_u64()).unwrap_or_default();
                number >= query.from_block
                    && number <= query.to_block
                    && query.addresses.contains(&log.address)
            })
            .cloned()
            .collect();

        let to_header = state
            .headers
            .get(query.to_block as usize)
            .cloned()
            .ok_or_else(|| {
                SyncError::Rpc(format!("to-block header {} unreported", query.to_block))
            })?;

        Ok(FilteredLogs { logs, to_header })
    }
}
