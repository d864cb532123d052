//! Runs a supervisor over a SQLite database.
//!
//! Usage: `wardend [config.toml]`. Environment variables `WARDEN_*` override
//! the file; `RUST_LOG` sets the log filter.
//!
//! On first start, before root is bootstrapped, a one-time root bootstrap
//! token is generated and printed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use rand::{distributions::Alphanumeric, Rng};
use tracing::info;
use tracing_subscriber::EnvFilter;
use warden::core::hash_password;
use warden::store::{SqliteStore, Store, StoreOp};
use warden::{Supervisor, WardenConfig};

const BOOTSTRAP_TOKEN_LEN: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => WardenConfig::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WardenConfig::default(),
    };
    config.merge_with_env()?;
    config.validate()?;

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;

    let flags = store.load_root_flags().await?;
    if !flags.enabled && store.load_root_password().await?.is_none() {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(BOOTSTRAP_TOKEN_LEN)
            .map(char::from)
            .collect();
        store
            .commit(vec![StoreOp::SetRootPassword(hash_password(&token)?)])
            .await?;
        println!("root bootstrap token: {token}");
    }

    let handle = Supervisor::new(config, Arc::new(store)).start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    drop(handle);
    Ok(())
}
