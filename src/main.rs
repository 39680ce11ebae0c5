//! Ink miner node.
//!
//! Registers with the directory, serves peers and local art-apps on
//! one listener, and mines continuously until killed.
//!
//! Usage: `ink-miner <directory-addr> <public-key-hex> <private-key-hex>`

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use blockart::crypto::{Keypair, PublicKey, SecretKey};
use blockart::network;
use blockart::network::directory::{run_discovery, run_heartbeat, DirectoryClient};
use blockart::state::NodeHandle;
use blockart::types::MinerInfo;
use blockart::{miner, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        bail!("usage: ink-miner <directory-addr> <public-key-hex> <private-key-hex>");
    }

    let secret = SecretKey::from_hex(&args[3]).context("bad private key")?;
    let keypair = Keypair::from_secret(secret);
    let declared = PublicKey::from_hex(&args[2]).context("bad public key")?;
    if !keypair.matches(&declared) {
        bail!("public key does not match the private key");
    }

    info!(version = VERSION, miner = %declared, "ink miner starting");

    let listener = TcpListener::bind("0.0.0.0:0")
        .await
        .context("cannot open listener")?;
    let address = listener.local_addr()?.to_string();

    let directory = DirectoryClient::new(args[1].clone());
    let local_info = MinerInfo {
        address: address.clone(),
        key: *keypair.public_key(),
    };

    // Start-up registration is the one fatal failure mode.
    let settings = directory
        .register(&local_info)
        .await
        .context("directory registration failed")?;
    info!(
        genesis = %settings.genesis_block_hash,
        canvas_x = settings.canvas.x_max,
        canvas_y = settings.canvas.y_max,
        "registered with directory"
    );

    let node = NodeHandle::new(settings.clone(), keypair, address);

    tokio::spawn(network::serve(node.clone(), listener));
    tokio::spawn(run_heartbeat(
        directory.clone(),
        node.local_info.key,
        settings.heartbeat_ms,
    ));
    tokio::spawn(run_discovery(node.clone(), directory.clone()));
    tokio::spawn(miner::run(node.clone()));

    // First round of introductions; discovery keeps topping up later.
    match directory.get_nodes(&node.local_info.key).await {
        Ok(addrs) => {
            for addr in addrs {
                if let Err(e) = network::connect_peer(&node, &addr).await {
                    warn!(peer = %addr, error = %e, "initial introduction failed");
                }
            }
        }
        Err(e) => warn!(error = %e, "initial peer discovery failed"),
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
