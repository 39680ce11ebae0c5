//! Client for the central directory service.
//!
//! The directory introduces miners to each other: registration returns
//! the network settings, heartbeats keep the registration alive, and
//! `get_nodes` hands out peer addresses whenever the connection count
//! dips below the configured minimum. Each call opens a fresh
//! connection; the directory is contacted rarely enough that holding
//! one open buys nothing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::crypto::PublicKey;
use crate::state::NodeHandle;
use crate::types::{MinerInfo, MinerNetSettings};

use super::{codec, connect_peer, NetworkError};

/// Requests the directory understands.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DirectoryRequest {
    /// Announce this miner and fetch the network settings
    Register(MinerInfo),
    /// Keep the registration alive
    Heartbeat(PublicKey),
    /// Ask for peer addresses
    GetNodes(PublicKey),
}

/// Directory replies, one per request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DirectoryResponse {
    /// Registration accepted
    Settings(MinerNetSettings),
    /// Heartbeat acknowledged (`false`: registration expired)
    Ack(bool),
    /// Known peer addresses
    Nodes(Vec<String>),
}

/// A handle on the directory service.
#[derive(Clone, Debug)]
pub struct DirectoryClient {
    addr: String,
}

impl DirectoryClient {
    /// Point a client at `addr`.
    #[must_use]
    pub fn new(addr: String) -> Self {
        Self { addr }
    }

    async fn call(&self, request: &DirectoryRequest) -> Result<DirectoryResponse, NetworkError> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        codec::write_frame(&mut stream, request).await?;
        codec::read_frame(&mut stream).await
    }

    /// Register this miner; returns the network settings.
    ///
    /// # Errors
    /// Returns the transport failure or an out-of-protocol reply.
    pub async fn register(&self, info: &MinerInfo) -> Result<MinerNetSettings, NetworkError> {
        match self.call(&DirectoryRequest::Register(info.clone())).await? {
            DirectoryResponse::Settings(settings) => Ok(settings),
            _ => Err(NetworkError::Protocol(
                "expected settings from registration".to_string(),
            )),
        }
    }

    /// Tell the directory this miner is alive.
    ///
    /// # Errors
    /// Returns the transport failure or an out-of-protocol reply.
    pub async fn heartbeat(&self, key: &PublicKey) -> Result<bool, NetworkError> {
        match self.call(&DirectoryRequest::Heartbeat(*key)).await? {
            DirectoryResponse::Ack(alive) => Ok(alive),
            _ => Err(NetworkError::Protocol(
                "expected ack from heartbeat".to_string(),
            )),
        }
    }

    /// Fetch peer addresses.
    ///
    /// # Errors
    /// Returns the transport failure or an out-of-protocol reply.
    pub async fn get_nodes(&self, key: &PublicKey) -> Result<Vec<String>, NetworkError> {
        match self.call(&DirectoryRequest::GetNodes(*key)).await? {
            DirectoryResponse::Nodes(addrs) => Ok(addrs),
            _ => Err(NetworkError::Protocol(
                "expected node list".to_string(),
            )),
        }
    }
}

/// Heartbeat forever at a fifth of the configured period, leaving
/// margin against scheduling jitter.
pub async fn run_heartbeat(client: DirectoryClient, key: PublicKey, heartbeat_ms: u32) {
    let period = Duration::from_millis(u64::from(heartbeat_ms / 5).max(1));
    let mut ticker = tokio::time::interval(period);

    loop {
        ticker.tick().await;

        match client.heartbeat(&key).await {
            Ok(true) => {}
            Ok(false) => warn!("directory dropped our registration"),
            Err(e) => warn!(error = %e, "heartbeat failed"),
        }
    }
}

/// Top the peer set back up whenever it dips below the minimum.
pub async fn run_discovery(node: NodeHandle, client: DirectoryClient) {
    let period = Duration::from_millis(u64::from(node.settings.heartbeat_ms).max(1));
    let mut ticker = tokio::time::interval(period);

    loop {
        ticker.tick().await;

        let connected = node.state.read().await.peers.len();
        let minimum = usize::from(node.settings.min_peer_connections);
        if connected >= minimum {
            continue;
        }

        debug!(connected, minimum, "below minimum peer count, asking directory");
        match client.get_nodes(&node.local_info.key).await {
            Ok(addrs) => {
                for addr in addrs {
                    if let Err(e) = connect_peer(&node, &addr).await {
                        debug!(peer = %addr, error = %e, "introduction failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "peer discovery failed"),
        }
    }
}
