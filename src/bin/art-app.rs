//! Art-app exerciser.
//!
//! Opens a canvas against a running miner, draws a couple of shapes,
//! waits for their confirmations, and renders the resulting canvas to
//! `Canvas.html`.
//!
//! Usage: `art-app <private-key-hex> <miner-addr>`

use std::path::Path;

use anyhow::{bail, Context};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use blockart::client::{html, Canvas};
use blockart::crypto::{Keypair, SecretKey};
use blockart::types::ShapeType;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        bail!("usage: art-app <private-key-hex> <miner-addr>");
    }

    let secret = SecretKey::from_hex(&args[1]).context("bad private key")?;
    let keypair = Keypair::from_secret(secret);

    let mut canvas = Canvas::open(&args[2], keypair)
        .await
        .context("cannot open canvas")?;
    info!(
        x_max = canvas.settings().x_max,
        y_max = canvas.settings().y_max,
        "canvas opened"
    );

    let (square_id, block_hash, ink) = canvas
        .add_shape(
            2,
            ShapeType::Path,
            "M 0 0 L 20 0 L 20 20 L 0 20 Z",
            "transparent",
            "red",
        )
        .await
        .context("square was not accepted")?;
    info!(shape = %square_id, block = %block_hash, ink, "square confirmed");

    let (triangle_id, _, ink) = canvas
        .add_shape(2, ShapeType::Path, "M 30 0 L 50 0 L 50 20 Z", "purple", "red")
        .await
        .context("triangle was not accepted")?;
    info!(shape = %triangle_id, ink, "filled triangle confirmed");

    let svgs = html::get_all_svgs(&mut canvas).await?;
    html::write_canvas_html(Path::new("Canvas.html"), &svgs, canvas.settings())?;
    info!(shapes = svgs.len(), "wrote Canvas.html");

    let ink = canvas.close().await?;
    info!(ink, "session closed");
    Ok(())
}
