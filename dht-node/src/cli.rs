//! CLI overrides layered on top of the file/env config, per the doc comment
//! on `NodeConfig::load`: defaults, then file, then `DHT__*` env vars, then
//! these flags. `dht-node` has two subcommands: `run`, which starts the
//! node, and `keygen`, a one-shot utility that prints the id an address
//! would derive without binding anything.

use crate::config::{ConfigError, NodeConfig, Protocol};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dht-node", about = "Chord / Koorde / simple-hash distributed web cache node")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a node and serve RPC + the HTTP cache surface until shutdown.
    Run(RunArgs),
    /// Print the id `address` (or an `--id-override` hex string) derives to, then exit.
    Keygen {
        /// host:port this node would bind to.
        address: String,
        #[arg(long)]
        id_override: Option<String>,
        #[arg(long, default_value_t = 66)]
        id_bits: u32,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// TOML config file; missing is not an error, only skipped.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, value_parser = ["chord", "koorde", "simple"])]
    pub protocol: Option<String>,

    #[arg(long = "bootstrap-peer")]
    pub bootstrap_peers: Vec<String>,

    #[arg(long)]
    pub id_override: Option<String>,
}

impl RunArgs {
    pub fn apply_overrides(&self, config: &mut NodeConfig) -> Result<(), ConfigError> {
        if let Some(bind) = &self.bind {
            config.node.bind = bind.clone();
        }
        if let Some(host) = &self.host {
            config.node.host = host.clone();
        }
        if let Some(port) = self.port {
            config.node.port = port;
        }
        if let Some(id_override) = &self.id_override {
            config.node.id_override = Some(id_override.clone());
        }
        if let Some(protocol) = &self.protocol {
            config.dht.protocol = match protocol.as_str() {
                "chord" => Protocol::Chord,
                "koorde" => Protocol::Koorde,
                "simple" => Protocol::Simple,
                other => return Err(ConfigError::InvalidProtocol(other.to_string())),
            };
        }
        if !self.bootstrap_peers.is_empty() {
            config.dht.bootstrap_peers = self.bootstrap_peers.clone();
        }
        Ok(())
    }
}
