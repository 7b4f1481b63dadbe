// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

/// Error type for the sync pipelines.
///
/// Recoverable errors are retried (in-tick for persistence, next tick for
/// RPC); everything else cancels the supervisor token and stops both loops.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    // The traversal cursor sits above the provider's safe head. The provider
    // has regressed (switched endpoint, clock skew); continuing would ingest
    // an inconsistent history.
    #[error("header traversal is ahead of the provider")]
    AheadOfProvider,

    // The first header returned by the provider does not connect to the
    // traversal cursor; the cursor's block has been rewritten.
    #[error("header traversal and provider have diverged in state")]
    MismatchedState,

    // The provider evaluated the log filter against a different tip-of-range
    // block than the batch was built from.
    #[error("log filter tip mismatch at block {number}")]
    ReorgDuringFilter { number: u64 },

    #[error("failed to decode {event} log at block {block_number}: {reason}")]
    Decode {
        event: &'static str,
        block_number: u64,
        reason: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether this error is recoverable (should retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Rpc(_) | SyncError::Storage(_))
    }

    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            SyncError::Rpc(_) => "rpc",
            SyncError::Storage(_) => "storage",
            SyncError::AheadOfProvider => "ahead_of_provider",
            SyncError::MismatchedState => "mismatched_state",
            SyncError::ReorgDuringFilter { .. } => "reorg_during_filter",
            SyncError::Decode { .. } => "decode",
            SyncError::Cancelled => "cancelled",
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
