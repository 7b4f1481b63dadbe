// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pipeline supervisor.
//!
//! Owns the cancellation token and the task handles for the two loops. A
//! critical error in either loop cancels the token, which winds down the
//! other loop at its next suspension point; [`EventSync::stop`] then
//! surfaces the cause.

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::chain_client::ChainClient;
use crate::config::Config;
use crate::error::SyncResult;
use crate::event_processor::EventProcessor;
use crate::metrics::IndexerMetrics;
use crate::store::Store;
use crate::synchronizer::Synchronizer;

pub struct EventSync {
    cancel: CancellationToken,
    synchronizer: Option<Synchronizer>,
    event_processor: Option<EventProcessor>,
    handles: Vec<JoinHandle<SyncResult<()>>>,
    stopped: bool,
}

impl std::fmt::Debug for EventSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSync")
            .field("stopped", &self.stopped)
            .field("handles", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl EventSync {
    pub async fn new(
        config: &Config,
        client: Arc<dyn ChainClient>,
        store: Arc<dyn Store>,
        metrics: Arc<IndexerMetrics>,
    ) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        // Providers disagreeing about the chain fail before any loop starts.
        let chain_id = client.chain_id().await.context("querying chain id")?;
        anyhow::ensure!(
            chain_id == config.chain.chain_id,
            "chain id mismatch: configured {}, provider reports {}",
            config.chain.chain_id,
            chain_id
        );

        let synchronizer = Synchronizer::new(
            &config.chain,
            client.clone(),
            store.clone(),
            metrics.clone(),
        )
        .await
        .context("constructing synchronizer")?;

        let event_processor = EventProcessor::new(&config.chain, store, metrics)
            .await
            .context("constructing event processor")?;

        Ok(Self {
            cancel: CancellationToken::new(),
            synchronizer: Some(synchronizer),
            event_processor: Some(event_processor),
            handles: Vec::new(),
            stopped: false,
        })
    }

    /// Spawn both loops and return immediately.
    pub fn start(&mut self) {
        let synchronizer = self
            .synchronizer
            .take()
            .expect("start may only be called once");
        let event_processor = self
            .event_processor
            .take()
            .expect("start may only be called once");

        self.handles
            .push(spawn_loop("synchronizer", &self.cancel, |cancel| {
                synchronizer.run(cancel)
            }));
        self.handles
            .push(spawn_loop("event processor", &self.cancel, |cancel| {
                event_processor.run(cancel)
            }));

        info!("event sync pipelines started");
    }

    /// Resolves when the supervisor token is cancelled, either by
    /// [`Self::stop`] or by a critical error in one of the loops.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Whether both loops have exited.
    pub fn stopped(&self) -> bool {
        self.stopped || (!self.handles.is_empty() && self.handles.iter().all(|h| h.is_finished()))
    }

    /// Cancel and wait for both loops. Returns the first critical error if
    /// one of them failed.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        self.cancel.cancel();

        let mut first_error = None;
        for handle in self.handles.drain(..) {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(anyhow::Error::new(e));
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        first_error = Some(
                            anyhow::Error::new(join_error).context("pipeline task panicked"),
                        );
                    }
                }
            }
        }

        self.stopped = true;
        match first_error {
            None => {
                info!("event sync pipelines stopped");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    cancel: &CancellationToken,
    run: F,
) -> JoinHandle<SyncResult<()>>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = SyncResult<()>> + Send + 'static,
{
    let cancel = cancel.clone();
    tokio::spawn(async move {
        let result = run(cancel.clone()).await;
        if let Err(e) = &result {
            error!(task = name, error = %e, "pipeline task failed, cancelling supervisor");
            cancel.cancel();
        }
        result
    })
}
