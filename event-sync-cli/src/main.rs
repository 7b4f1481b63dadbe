// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use event_sync::chain_client::EthChainClient;
use event_sync::config::Config;
use event_sync::metrics::IndexerMetrics;
use event_sync::node::EventSync;
use event_sync::store::PgStore;
use event_sync_pg_db::{Db, DbArgs};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "event-sync", rename_all = "kebab-case")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Command {
    // Run the block synchronizer and the event processor until interrupted
    Index {
        #[clap(long = "config-path")]
        config_path: PathBuf,
        #[clap(flatten)]
        db_args: DbArgs,
    },
    // Apply pending schema migrations and exit
    Migrate {
        #[clap(long = "config-path")]
        config_path: PathBuf,
        #[clap(flatten)]
        db_args: DbArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Migrate {
            config_path,
            db_args,
        } => {
            let config = Config::load(&config_path)?;
            let db = Db::for_write(config.store.database_url.clone(), db_args).await?;
            let versions = db.run_migrations(event_sync_schema::MIGRATIONS).await?;
            info!(applied = versions.len(), "migrations applied");
        }
        Command::Index {
            config_path,
            db_args,
        } => {
            let config = Config::load(&config_path)?;

            let registry = prometheus::Registry::new();
            let metrics = Arc::new(IndexerMetrics::new(&registry));

            let client = Arc::new(
                EthChainClient::connect(&config.chain.rpc_url, config.chain.chain_id).await?,
            );
            let db = Db::for_write(config.store.database_url.clone(), db_args).await?;
            let store = Arc::new(PgStore::new(db));

            let mut node = EventSync::new(&config, client, store, metrics).await?;
            node.start();

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                }
                _ = node.cancelled() => {}
            }

            // Propagates the critical error (and a non-zero exit code) when
            // a pipeline stopped on its own.
            node.stop().await?;
        }
    }

    Ok(())
}
