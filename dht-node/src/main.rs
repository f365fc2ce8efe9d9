//! Binary entry point: parse CLI flags, load the layered config, build the
//! node, run until shutdown. Exit codes per §6 come from `NodeError::exit_code`;
//! `run` itself returns `anyhow::Result` (typed errors at the library
//! boundary, `anyhow` at this orchestration boundary), so `main` recovers
//! the code by downcasting back to `NodeError` when one is present.

use anyhow::{Context, Result};
use clap::Parser;
use dht_node::cli::{Cli, Command};
use dht_node::config::NodeConfig;
use dht_node::error::NodeError;
use dht_node::node::Node;
use dht_node::protocol_handle;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "dht-node exited with an error");
            let code = e.downcast_ref::<NodeError>().map(NodeError::exit_code).unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => run_node(args).await,
        Command::Keygen { address, id_override, id_bits } => keygen(address, id_override, id_bits),
    }
}

async fn run_node(args: dht_node::cli::RunArgs) -> Result<()> {
    let mut config = NodeConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config)?;
    config.validate()?;

    info!(
        protocol = ?config.dht.protocol,
        id_bits = config.dht.id_bits,
        addr = %config.node_address(),
        "starting dht-node"
    );

    let node = Node::build(config).await?;
    node.run().await?;
    Ok(())
}

fn keygen(address: String, id_override: Option<String>, id_bits: u32) -> Result<()> {
    let (host, port) = address.rsplit_once(':').context("address must be host:port")?;
    let port: u16 = port.parse().context("port must be a valid u16")?;

    let mut config = NodeConfig::default();
    config.node.host = host.to_string();
    config.node.port = port;
    config.node.id_override = id_override;
    config.dht.id_bits = id_bits;

    let id = protocol_handle::self_id(&config).context("failed to derive id")?;
    println!("{}", id.to_hex());
    Ok(())
}
