// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain access seam.
//!
//! The pipelines consume the [`ChainClient`] trait; [`EthChainClient`] is the
//! production implementation over an ethers JSON-RPC provider.

use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::types::{Address, Block, BlockNumber, Filter, Log, TxHash};

use crate::error::{SyncError, SyncResult};
use crate::types::BlockHeader;

/// Log filter over an inclusive block range for a set of contract addresses.
#[derive(Debug, Clone)]
pub struct FilterQuery {
    pub from_block: u64,
    pub to_block: u64,
    pub addresses: Vec<Address>,
}

/// Logs for a filter window together with the header the provider considered
/// to be at the top of the range. The caller compares it against its own view
/// of the window to detect a reorg between header fetch and log fetch.
#[derive(Debug, Clone)]
pub struct FilteredLogs {
    pub logs: Vec<Log>,
    pub to_header: BlockHeader,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> SyncResult<u64>;

    /// Current tip header.
    async fn latest_header(&self) -> SyncResult<BlockHeader>;

    async fn header_by_number(&self, number: u64) -> SyncResult<Option<BlockHeader>>;

    /// Contiguous headers for the inclusive range `[start, end]`. Every
    /// header in the range must be present.
    async fn headers_by_range(&self, start: u64, end: u64) -> SyncResult<Vec<BlockHeader>>;

    async fn filter_logs(&self, query: FilterQuery) -> SyncResult<FilteredLogs>;
}

pub struct EthChainClient<P> {
    provider: Provider<P>,
    expected_chain_id: u64,
}

impl EthChainClient<Http> {
    /// Connect over HTTP and verify the provider serves the expected chain.
    pub async fn connect(rpc_url: &str, expected_chain_id: u64) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let client = Self {
            provider,
            expected_chain_id,
        };
        client.describe().await?;
        Ok(client)
    }
}

impl<P> EthChainClient<P>
where
    P: JsonRpcClient + 'static,
{
    // Validate chain identifier and log connection info
    async fn describe(&self) -> anyhow::Result<()> {
        let chain_id = self.provider.get_chainid().await?.as_u64();
        let block_number = self.provider.get_block_number().await?;

        if chain_id != self.expected_chain_id {
            return Err(anyhow::anyhow!(
                "Chain ID mismatch: expected {}, got {}. This could indicate connecting to the wrong network!",
                self.expected_chain_id,
                chain_id
            ));
        }
        tracing::info!(
            "Chain client connected to chain {} (verified), current block: {}",
            chain_id,
            block_number
        );
        Ok(())
    }

    fn header_from_block(block: Block<TxHash>) -> SyncResult<BlockHeader> {
        let encoded = serde_json::to_vec(&block)
            .map_err(|e| SyncError::Rpc(format!("unencodable header: {e}")))?;
        let hash = block
            .hash
            .ok_or_else(|| SyncError::Rpc("header without hash (pending block)".to_string()))?;
        let number = block
            .number
            .ok_or_else(|| SyncError::Rpc("header without number (pending block)".to_string()))?
            .as_u64();

        Ok(BlockHeader {
            hash,
            parent_hash: block.parent_hash,
            number,
            timestamp: block.timestamp.as_u64(),
            encoded: encoded.into(),
        })
    }
}

fn rpc_err<E: std::fmt::Display>(e: E) -> SyncError {
    SyncError::Rpc(e.to_string())
}

#[async_trait]
impl<P> ChainClient for EthChainClient<P>
where
    P: JsonRpcClient + 'static,
{
    async fn chain_id(&self) -> SyncResult<u64> {
        Ok(self.provider.get_chainid().await.map_err(rpc_err)?.as_u64())
    }

    async fn latest_header(&self) -> SyncResult<BlockHeader> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(rpc_err)?
            .ok_or_else(|| SyncError::Rpc("latest header unreported".to_string()))?;
        Self::header_from_block(block)
    }

    async fn header_by_number(&self, number: u64) -> SyncResult<Option<BlockHeader>> {
        let Some(block) = self.provider.get_block(number).await.map_err(rpc_err)? else {
            return Ok(None);
        };
        Ok(Some(Self::header_from_block(block)?))
    }

    async fn headers_by_range(&self, start: u64, end: u64) -> SyncResult<Vec<BlockHeader>> {
        let mut headers = Vec::with_capacity((end.saturating_sub(start) + 1) as usize);
        for number in start..=end {
            let block = self
                .provider
                .get_block(number)
                .await
                .map_err(rpc_err)?
                .ok_or_else(|| SyncError::Rpc(format!("header {number} unreported")))?;
            headers.push(Self::header_from_block(block)?);
        }
        Ok(headers)
    }

    async fn filter_logs(&self, query: FilterQuery) -> SyncResult<FilteredLogs> {
        let filter = Filter::new()
            .from_block(query.from_block)
            .to_block(query.to_block)
            .address(query.addresses.clone());
        let logs = self.provider.get_logs(&filter).await.map_err(rpc_err)?;

        // The header fetched here is the provider's current view of the top
        // of the range, which is what the reorg check needs.
        let to_block = self
            .provider
            .get_block(query.to_block)
            .await
            .map_err(rpc_err)?
            .ok_or_else(|| {
                SyncError::Rpc(format!("to-block header {} unreported", query.to_block))
            })?;

        Ok(FilteredLogs {
            logs,
            to_header: Self::header_from_block(to_block)?,
        })
    }
}
