//! Peer gossip: connection management, block and operation flooding.
//!
//! Peers are introduced by the directory (or by an inbound handshake,
//! which triggers a reciprocal dial). Each live peer owns one outbound
//! TCP connection driven by a writer task; floods fan out through the
//! writer channels so one dead peer never stalls the rest. Inbound
//! deliveries validate under the state lock and re-flood to everyone
//! but the sender.

pub mod codec;
pub mod directory;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::crypto::OpSignature;
use crate::state::{BlockDisposition, NodeHandle};
use crate::types::{Block, MinerInfo, Operation};
use crate::validate::ValidationError;
use crate::{gateway, KEY_CHALLENGE};

/// Outbound send-buffer depth per peer.
const PEER_CHANNEL_DEPTH: usize = 64;

/// Network errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Transport failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Payload failed to encode or decode
    #[error("codec error: {0}")]
    Codec(String),
    /// Frame exceeds [`codec::MAX_FRAME_LEN`]
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
    /// Remote answered out of protocol
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// First frame on every inbound connection: who is talking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Hello {
    /// A fellow miner registering its identity
    Miner(MinerInfo),
    /// A local art-app proving it holds this miner's private key
    Art {
        /// Signature over the fixed challenge phrase
        signature: OpSignature,
    },
}

/// Messages flowing between registered miners.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerMessage {
    /// A mined or relayed block
    Block(Block),
    /// A locally-validated operation
    Operation(Operation),
}

/// Replies on a peer connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerReply {
    /// Handshake answer carrying the responder's identity
    Registered(MinerInfo),
    /// Message processed
    Ack,
}

/// A live peer: identity plus the channel into its writer task.
#[derive(Clone, Debug)]
pub struct Peer {
    /// The peer's advertised identity
    pub info: MinerInfo,
    /// Sender into the peer's outbound writer
    pub tx: mpsc::Sender<PeerMessage>,
}

/// Dial `addr`, perform the miner handshake, and register the peer.
///
/// A no-op when the peer is already connected or `addr` is this node.
///
/// # Errors
/// Returns the transport or protocol failure; no peer is registered.
pub async fn connect_peer(node: &NodeHandle, addr: &str) -> Result<(), NetworkError> {
    if addr == node.local_info.address {
        return Ok(());
    }
    {
        let state = node.state.read().await;
        if state.peers.contains_key(addr) {
            return Ok(());
        }
    }

    let mut stream = TcpStream::connect(addr).await?;
    codec::write_frame(&mut stream, &Hello::Miner(node.local_info.clone())).await?;

    let reply: PeerReply = codec::read_frame(&mut stream).await?;
    let PeerReply::Registered(info) = reply else {
        return Err(NetworkError::Protocol(
            "expected registration reply".to_string(),
        ));
    };

    let (tx, rx) = mpsc::channel(PEER_CHANNEL_DEPTH);
    {
        let mut state = node.state.write().await;
        if state.peers.contains_key(addr) {
            // Lost a connect race; keep the existing channel.
            return Ok(());
        }
        state.peers.insert(addr.to_string(), Peer { info, tx });
    }

    tokio::spawn(peer_writer(node.clone(), addr.to_string(), stream, rx));
    info!(peer = %addr, "peer connected");
    Ok(())
}

// Owns the outbound connection to one peer. Any transport error drops
// the peer from the shared set.
async fn peer_writer(
    node: NodeHandle,
    addr: String,
    mut stream: TcpStream,
    mut rx: mpsc::Receiver<PeerMessage>,
) {
    while let Some(message) = rx.recv().await {
        if codec::write_frame(&mut stream, &message).await.is_err() {
            break;
        }
        if codec::read_frame::<PeerReply, _>(&mut stream).await.is_err() {
            break;
        }
    }

    node.state.write().await.peers.remove(&addr);
    warn!(peer = %addr, "peer dropped");
}

/// Flood a block to every peer except `except`.
pub async fn flood_block(node: &NodeHandle, block: &Block, except: Option<&str>) {
    flood(node, &PeerMessage::Block(block.clone()), except).await;
}

/// Flood an operation to every peer except `except`.
pub async fn flood_operation(node: &NodeHandle, op: &Operation, except: Option<&str>) {
    flood(node, &PeerMessage::Operation(op.clone()), except).await;
}

async fn flood(node: &NodeHandle, message: &PeerMessage, except: Option<&str>) {
    let targets: Vec<(String, mpsc::Sender<PeerMessage>)> = {
        let state = node.state.read().await;
        state
            .peers
            .iter()
            .filter(|(addr, _)| except != Some(addr.as_str()))
            .map(|(addr, peer)| (addr.clone(), peer.tx.clone()))
            .collect()
    };

    for (addr, tx) in targets {
        // Never block the flood on one slow peer; its writer drains
        // the buffer at its own pace.
        if tx.try_send(message.clone()).is_err() {
            debug!(peer = %addr, "peer buffer full or closed, message dropped");
        }
    }
}

/// Accept inbound connections forever, dispatching each by its hello.
pub async fn serve(node: NodeHandle, listener: TcpListener) {
    info!(addr = %node.local_info.address, "listening");

    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                debug!(remote = %remote, "inbound connection");
                tokio::spawn(handle_conn(node.clone(), stream));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn handle_conn(node: NodeHandle, mut stream: TcpStream) {
    let hello: Hello = match codec::read_frame(&mut stream).await {
        Ok(hello) => hello,
        Err(e) => {
            debug!(error = %e, "connection dropped before hello");
            return;
        }
    };

    match hello {
        Hello::Miner(info) => handle_peer_session(node, stream, info).await,
        Hello::Art { signature } => {
            if crate::crypto::verify(&node.local_info.key, KEY_CHALLENGE, &signature).is_ok() {
                gateway::serve_session(node, stream).await;
            } else {
                warn!("art-app failed the key challenge");
                let _ = codec::write_frame(
                    &mut stream,
                    &gateway::ArtResponse::Error(gateway::ArtError::InvalidKey),
                )
                .await;
            }
        }
    }
}

async fn handle_peer_session(node: NodeHandle, mut stream: TcpStream, info: MinerInfo) {
    if codec::write_frame(&mut stream, &PeerReply::Registered(node.local_info.clone()))
        .await
        .is_err()
    {
        return;
    }

    // Dial back so our own floods reach this peer.
    {
        let node = node.clone();
        let addr = info.address.clone();
        tokio::spawn(async move {
            if let Err(e) = connect_peer(&node, &addr).await {
                debug!(peer = %addr, error = %e, "reciprocal dial failed");
            }
        });
    }

    let sender = info.address;
    loop {
        let message: PeerMessage = match codec::read_frame(&mut stream).await {
            Ok(message) => message,
            Err(_) => break,
        };

        match message {
            PeerMessage::Block(block) => {
                let outcome = {
                    let mut state = node.state.write().await;
                    state.accept_block(block.clone(), &node.signals)
                };

                match outcome {
                    Ok(BlockDisposition::Accepted) => {
                        info!(hash = %block.hash, peer = %sender, "accepted peer block");
                        flood_block(&node, &block, Some(&sender)).await;
                    }
                    Ok(BlockDisposition::AlreadyKnown) => {}
                    Err(ValidationError::UnknownParent(parent)) => {
                        // A fork we missed the prefix of; a longer
                        // chain will carry us past it.
                        warn!(parent = %parent, peer = %sender, "dropping block with unknown parent");
                    }
                    Err(e) => {
                        warn!(error = %e, peer = %sender, "rejected peer block");
                    }
                }
            }
            PeerMessage::Operation(op) => {
                let outcome = {
                    let mut state = node.state.write().await;
                    state.accept_operation(op.clone(), &node.signals)
                };

                match outcome {
                    Ok(true) => {
                        debug!(id = %op.unique_id, peer = %sender, "accepted peer operation");
                        flood_operation(&node, &op, Some(&sender)).await;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(error = %e, peer = %sender, "rejected peer operation");
                    }
                }
            }
        }

        if codec::write_frame(&mut stream, &PeerReply::Ack).await.is_err() {
            break;
        }
    }

    debug!(peer = %sender, "peer session ended");
}
