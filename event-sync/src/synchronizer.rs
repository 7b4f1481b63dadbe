// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Block synchronizer.
//!
//! Pulls confirmed header windows off the traversal, fetches the matching
//! contract logs, and persists headers and events in one transaction. A
//! batch that fails to persist stays buffered and is replayed on the next
//! tick; the store's unique keys make the replay idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use ethers::types::{Address, H256};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain_client::{ChainClient, FilterQuery};
use crate::config::ChainConfig;
use crate::error::{SyncError, SyncResult};
use crate::header_traversal::HeaderTraversal;
use crate::metrics::IndexerMetrics;
use crate::retry::{retry, RetryPolicy};
use crate::store::Store;
use crate::types::{BlockHeader, ContractEvent};

pub struct Synchronizer {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    header_traversal: HeaderTraversal,

    contracts: Vec<Address>,
    block_step: u64,
    loop_interval: std::time::Duration,
    retry_policy: RetryPolicy,

    // Batch held across ticks while persistence is failing.
    headers: Option<Vec<BlockHeader>>,

    metrics: Arc<IndexerMetrics>,
}

impl Synchronizer {
    /// Seed the traversal cursor from the store; an empty store anchors at
    /// the configured starting height (ingestion begins at the next block),
    /// or at genesis when no starting height is set.
    pub async fn new(
        config: &ChainConfig,
        client: Arc<dyn ChainClient>,
        store: Arc<dyn Store>,
        metrics: Arc<IndexerMetrics>,
    ) -> SyncResult<Self> {
        let from_header = match store.latest_block().await? {
            Some(header) => {
                info!(
                    number = header.number,
                    hash = ?header.hash,
                    "sync detected last indexed block"
                );
                Some(header)
            }
            None if config.starting_height > 0 => {
                info!(
                    height = config.starting_height,
                    "no indexed state, anchoring at configured starting height"
                );
                let header = client
                    .header_by_number(config.starting_height)
                    .await?
                    .ok_or_else(|| {
                        SyncError::Rpc(format!(
                            "starting header {} unreported",
                            config.starting_height
                        ))
                    })?;
                Some(header)
            }
            None => {
                info!("no indexed state, starting from genesis of ingestion");
                None
            }
        };

        let header_traversal = HeaderTraversal::new(
            client.clone(),
            from_header,
            config.confirmation_depth,
            config.chain_id,
        );

        Ok(Self {
            client,
            store,
            header_traversal,
            contracts: config.watched_contracts.clone(),
            block_step: config.block_step,
            loop_interval: config.loop_interval(),
            retry_policy: RetryPolicy::default(),
            headers: None,
            metrics,
        })
    }

    /// Run the tick loop until cancellation or a critical error.
    pub async fn run(mut self, cancel: CancellationToken) -> SyncResult<()> {
        info!(
            block_step = self.block_step,
            contracts = self.contracts.len(),
            "starting synchronizer"
        );

        let mut interval = time::interval(self.loop_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("synchronizer cancelled");
                    return Ok(());
                }
                _ = interval.tick() => {
                    match self.tick(&cancel).await {
                        Ok(()) => {}
                        Err(SyncError::Cancelled) => {
                            info!("synchronizer cancelled");
                            return Ok(());
                        }
                        Err(e) => {
                            self.metrics.sync_errors.with_label_values(&[e.error_type()]).inc();
                            error!(error = %e, "synchronizer halting on critical error");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// One tick: acquire or reuse a batch and try to persist it. Transient
    /// failures are absorbed here (the batch stays buffered); only critical
    /// errors surface.
    pub(crate) async fn tick(&mut self, cancel: &CancellationToken) -> SyncResult<()> {
        let headers = match self.headers.clone() {
            Some(buffered) => {
                info!(size = buffered.len(), "retrying previously buffered batch");
                buffered
            }
            None => {
                let new_headers = match self.header_traversal.next_headers(self.block_step).await {
                    Ok(headers) => headers,
                    Err(e) if e.is_recoverable() => {
                        self.metrics
                            .sync_errors
                            .with_label_values(&[e.error_type()])
                            .inc();
                        warn!(error = %e, "error querying for headers");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };
                if new_headers.is_empty() {
                    debug!("no new headers, syncer at head");
                    return Ok(());
                }
                self.headers = Some(new_headers.clone());
                new_headers
            }
        };

        self.process_batch(&headers, cancel).await
    }

    async fn process_batch(
        &mut self,
        headers: &[BlockHeader],
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let first_header = headers.first().expect("batch is never empty");
        let last_header = headers.last().expect("batch is never empty");
        debug!(
            size = headers.len(),
            start_block = first_header.number,
            end_block = last_header.number,
            "extracting batch"
        );

        let filtered = match self
            .client
            .filter_logs(FilterQuery {
                from_block: first_header.number,
                to_block: last_header.number,
                addresses: self.contracts.clone(),
            })
            .await
        {
            Ok(filtered) => filtered,
            Err(e) if e.is_recoverable() => {
                self.metrics
                    .sync_errors
                    .with_label_values(&[e.error_type()])
                    .inc();
                warn!(error = %e, "failed to extract logs");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // The provider reports the header it evaluated the filter against at
        // the top of the range. A mismatch means the chain moved under us.
        if filtered.to_header.number != last_header.number
            || filtered.to_header.hash != last_header.hash
        {
            return Err(SyncError::ReorgDuringFilter {
                number: last_header.number,
            });
        }

        let header_map: HashMap<H256, &BlockHeader> =
            headers.iter().map(|h| (h.hash, h)).collect();

        let mut events = Vec::with_capacity(filtered.logs.len());
        for log in &filtered.logs {
            let Some(block_hash) = log.block_hash else {
                continue;
            };
            let Some(header) = header_map.get(&block_hash) else {
                // Log from a block outside the window, i.e. a forked block.
                debug!(block_hash = ?block_hash, "dropping log outside the batch window");
                continue;
            };
            if let Some(event) = ContractEvent::from_log(log, header.timestamp) {
                events.push(event);
            }
        }

        if !events.is_empty() {
            info!(size = events.len(), "detected logs");
        }

        let persist_start = Instant::now();
        let store = self.store.clone();
        let persist_result = retry(&self.retry_policy, cancel, || {
            store.store_block_batch(headers, &events)
        })
        .await;

        match persist_result {
            Ok(()) => {
                self.metrics
                    .batch_persist_latency
                    .observe(persist_start.elapsed().as_secs_f64());
                self.metrics.synced_headers.inc_by(headers.len() as u64);
                self.metrics.synced_events.inc_by(events.len() as u64);
                self.metrics.last_synced_block.set(last_header.number as i64);
                info!(
                    start_block = first_header.number,
                    end_block = last_header.number,
                    events = events.len(),
                    "persisted batch"
                );
                self.headers = None;
                Ok(())
            }
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(e) if e.is_recoverable() => {
                // Batch stays buffered; the next tick replays it unchanged.
                self.metrics
                    .sync_errors
                    .with_label_values(&[e.error_type()])
                    .inc();
                error!(error = %e, "unable to persist batch");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
