//! Binary entrypoint for the mesh agent: loads and validates the node's
//! configuration (§6.4), wires the concrete NATS/netlink-backed adapters
//! into the orchestrator (§4.F), and blocks until asked to shut down.

use anyhow::{Context, Result};
use clap::Parser;
use meshd_shared::{AgentConfig, Peer, PublicKey};
use std::{env, path::PathBuf};

#[derive(Debug, Parser)]
#[clap(name = "meshd", author, version, about)]
struct Opts {
    /// Path to the agent's TOML configuration file.
    config: PathBuf,

    /// Verbose output, use -vv for even higher verbositude.
    #[clap(short, long, parse(from_occurrences))]
    verbose: u64,
}

fn init_logger(verbosity: u64) {
    if env::var_os("RUST_LOG").is_none() {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        env::set_var("RUST_LOG", format!("warn,meshd={level},meshd_core={level}"));
    }
    pretty_env_logger::init();
}

fn main() {
    let opts = Opts::parse();
    init_logger(opts.verbose);

    if let Err(e) = run(opts) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn self_peer(config: &AgentConfig, public_key: PublicKey) -> Peer {
    Peer {
        name: config.node_name.clone(),
        public_key,
        advertise_address: config.advertise_address,
        allowed_ip: config.private_cidr(),
        wg_port: config.listen_port,
    }
}

#[cfg(target_os = "linux")]
fn run(opts: Opts) -> Result<()> {
    use meshd_core::{
        device::WgTunnelDevice,
        kv::nats::NatsKvStore,
        Agent,
    };
    use std::sync::Arc;

    let config = AgentConfig::from_file(&opts.config)
        .with_context(|| format!("failed to load {}", opts.config.display()))?;
    config.validate().context("invalid configuration")?;

    let private_key = config.load_private_key()?;
    let public_key = PublicKey::from(private_key.get_public());
    log::info!("node {:?}, public key {}", config.node_name, public_key);

    let kv = Arc::new(NatsKvStore::connect(
        &config.kv_url,
        &config.kv_creds_path,
        &config.kv_bucket,
    )?);
    let device = Arc::new(WgTunnelDevice::new(config.device_interface_name()));

    let agent = Arc::new(Agent::new(
        self_peer(&config, public_key),
        private_key,
        kv,
        device,
    ));
    agent.start()?;
    log::info!("joined mesh, allowed-ip {}", agent.self_peer().allowed_ip);

    let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("failed to install signal handler")?;
    let _ = shutdown_rx.recv();

    log::info!("shutting down");
    agent.stop();
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run(_opts: Opts) -> Result<()> {
    anyhow::bail!("meshd's tunnel device controller is only implemented for Linux (netlink + wireguard-control kernel backend)")
}
