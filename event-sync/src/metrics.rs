// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Histogram, IntCounter,
    IntCounterVec, IntGauge, Registry,
};

const PERSIST_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

#[derive(Clone, Debug)]
pub struct IndexerMetrics {
    pub(crate) last_synced_block: IntGauge,
    pub(crate) last_processed_block: IntGauge,
    pub(crate) synced_headers: IntCounter,
    pub(crate) synced_events: IntCounter,
    pub(crate) decoded_records: IntCounterVec,
    pub(crate) sync_errors: IntCounterVec,
    pub(crate) batch_persist_latency: Histogram,
}

impl IndexerMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            last_synced_block: register_int_gauge_with_registry!(
                "event_sync_last_synced_block",
                "Highest block number persisted by the synchronizer",
                registry,
            )
            .unwrap(),
            last_processed_block: register_int_gauge_with_registry!(
                "event_sync_last_processed_block",
                "Highest block number fully decoded by the event processor",
                registry,
            )
            .unwrap(),
            synced_headers: register_int_counter_with_registry!(
                "event_sync_synced_headers_total",
                "Total number of block headers persisted",
                registry,
            )
            .unwrap(),
            synced_events: register_int_counter_with_registry!(
                "event_sync_synced_events_total",
                "Total number of raw contract events persisted",
                registry,
            )
            .unwrap(),
            decoded_records: register_int_counter_vec_with_registry!(
                "event_sync_decoded_records_total",
                "Total number of decoded domain records, by kind",
                &["kind"],
                registry,
            )
            .unwrap(),
            sync_errors: register_int_counter_vec_with_registry!(
                "event_sync_errors_total",
                "Total number of pipeline errors, by error type",
                &["error_type"],
                registry,
            )
            .unwrap(),
            batch_persist_latency: register_histogram_with_registry!(
                "event_sync_batch_persist_latency_seconds",
                "Latency of batch persistence transactions",
                PERSIST_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Arc<Self> {
        Arc::new(Self::new(&Registry::new()))
    }
}
