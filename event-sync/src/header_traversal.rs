// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stateful cursor over confirmed block headers.
//!
//! Hands out contiguous header windows that lag the tip by the configured
//! confirmation depth, and detects when the provider's view of history no
//! longer connects to the cursor.

use std::sync::Arc;

use crate::chain_client::ChainClient;
use crate::error::{SyncError, SyncResult};
use crate::types::BlockHeader;

pub struct HeaderTraversal {
    client: Arc<dyn ChainClient>,
    chain_id: u64,

    latest_header: Option<BlockHeader>,
    last_traversed: Option<BlockHeader>,

    confirmation_depth: u64,
}

impl HeaderTraversal {
    /// `from` anchors the cursor: the first window starts at
    /// `from.number + 1`. `None` starts ingestion from block 0.
    pub fn new(
        client: Arc<dyn ChainClient>,
        from: Option<BlockHeader>,
        confirmation_depth: u64,
        chain_id: u64,
    ) -> Self {
        Self {
            client,
            chain_id,
            latest_header: None,
            last_traversed: from,
            confirmation_depth,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Tip header observed on the most recent [`Self::next_headers`] call.
    pub fn latest_header(&self) -> Option<&BlockHeader> {
        self.latest_header.as_ref()
    }

    pub fn last_traversed(&self) -> Option<&BlockHeader> {
        self.last_traversed.as_ref()
    }

    /// Next window of at most `max_size` confirmed headers.
    ///
    /// Empty result means caught up (or the chain is shorter than the
    /// confirmation depth). [`SyncError::AheadOfProvider`] and
    /// [`SyncError::MismatchedState`] are critical: the caller must halt.
    pub async fn next_headers(&mut self, max_size: u64) -> SyncResult<Vec<BlockHeader>> {
        let latest = self.client.latest_header().await?;
        let tip_number = latest.number;
        self.latest_header = Some(latest);

        let Some(safe_end) = tip_number.checked_sub(self.confirmation_depth) else {
            // No blocks with the configured confirmation depth available yet
            return Ok(Vec::new());
        };

        if let Some(cursor) = &self.last_traversed {
            if cursor.number == safe_end {
                return Ok(Vec::new());
            }
            if cursor.number > safe_end {
                return Err(SyncError::AheadOfProvider);
            }
        }

        let next_height = self
            .last_traversed
            .as_ref()
            .map(|h| h.number + 1)
            .unwrap_or(0);
        let end_height = safe_end.min(next_height + max_size - 1);

        let headers = self.client.headers_by_range(next_height, end_height).await?;
        if headers.is_empty() {
            return Ok(headers);
        }

        if let Some(cursor) = &self.last_traversed {
            if headers[0].parent_hash != cursor.hash {
                return Err(SyncError::MismatchedState);
            }
        }

        self.last_traversed = headers.last().cloned();
        Ok(headers)
    }
}
