#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use caravel_diff::{DiffEngine, ShellEngine, TextEngine};
use caravel_node::{Node, NodeConfig, NodeProps, SafeMempool};
use caravel_sandbox::docker::{DockerSandbox, DockerSandboxConfig};
use caravel_store::MemoryStore;
use caravel_types::transaction::address_from_key;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[clap(name = "caravel-node", about = "Run a local Caravel mining node")]
struct Opts {
    /// Path to a TOML configuration file.
    #[clap(long)]
    config: Option<PathBuf>,
    /// Override the configured mining difficulty.
    #[clap(long)]
    difficulty: Option<u64>,
    /// Use the in-process diff engine instead of diff(1)/patch(1).
    #[clap(long)]
    pure_diff: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    caravel_telemetry::init_tracing()?;
    let opts = Opts::parse();

    let mut config = match &opts.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(difficulty) = opts.difficulty {
        config.difficulty = difficulty;
    }
    std::fs::create_dir_all(&config.data_dir)?;

    if config.miner_address.is_empty() {
        // Throwaway identity for this run; configure miner_address to keep one.
        let key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        config.miner_address = address_from_key(&key.verifying_key());
        info!(address = %config.miner_address, "generated miner identity");
    }

    let engine: Arc<dyn DiffEngine> = if opts.pure_diff {
        Arc::new(TextEngine::new())
    } else {
        Arc::new(ShellEngine::new())
    };
    let sandbox = DockerSandbox::new(DockerSandboxConfig {
        timeout_secs: config.sandbox_timeout_secs,
        ..Default::default()
    })
    .context("connecting to the docker daemon")?;

    let node = Node::new(NodeProps {
        config,
        mempool: Arc::new(SafeMempool::new()),
        store: Arc::new(MemoryStore::new()),
        sandbox: Arc::new(sandbox),
        engine,
    });

    let shutdown = node.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    node.run().await
}
