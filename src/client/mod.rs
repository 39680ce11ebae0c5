//! The art-app client library.
//!
//! A [`Canvas`] is a typed handle on one miner's art-app endpoint. It
//! builds operations locally — parsing the path string, computing the
//! ink cost, signing with the art-app's key — and submits them over
//! the framed codec. Add and Delete block until the miner reports the
//! requested confirmation depth.

pub mod html;

use tokio::net::TcpStream;

use crate::crypto::Keypair;
use crate::gateway::{ArtError, ArtRequest, ArtResponse};
use crate::geometry;
use crate::network::{codec, Hello};
use crate::types::{CanvasSettings, Operation, Shape, ShapeType};
use crate::KEY_CHALLENGE;

/// A session with a miner's art-app endpoint.
pub struct Canvas {
    stream: TcpStream,
    keypair: Keypair,
    settings: CanvasSettings,
}

impl Canvas {
    /// Connect to `miner_addr` and authenticate with `keypair`, which
    /// must be the miner's own key pair.
    ///
    /// # Errors
    /// [`ArtError::Disconnected`] when the miner is unreachable,
    /// [`ArtError::InvalidKey`] when the key challenge fails.
    pub async fn open(miner_addr: &str, keypair: Keypair) -> Result<Self, ArtError> {
        let mut stream = TcpStream::connect(miner_addr)
            .await
            .map_err(|_| ArtError::Disconnected)?;

        let signature = keypair.sign(KEY_CHALLENGE);
        codec::write_frame(&mut stream, &Hello::Art { signature })
            .await
            .map_err(|_| ArtError::Disconnected)?;

        match codec::read_frame(&mut stream).await {
            Ok(ArtResponse::Canvas(settings)) => Ok(Self {
                stream,
                keypair,
                settings,
            }),
            Ok(ArtResponse::Error(e)) => Err(e),
            _ => Err(ArtError::Disconnected),
        }
    }

    /// The canvas dimensions reported at open.
    #[must_use]
    pub const fn settings(&self) -> &CanvasSettings {
        &self.settings
    }

    async fn call(&mut self, request: &ArtRequest) -> Result<ArtResponse, ArtError> {
        codec::write_frame(&mut self.stream, request)
            .await
            .map_err(|_| ArtError::Disconnected)?;

        match codec::read_frame(&mut self.stream).await {
            Ok(ArtResponse::Error(e)) => Err(e),
            Ok(response) => Ok(response),
            Err(_) => Err(ArtError::Disconnected),
        }
    }

    /// Add a shape and wait for `validate_num` confirmations.
    ///
    /// Returns `(shape_id, block_hash, ink_remaining)`.
    ///
    /// # Errors
    /// Any [`ArtError`]; geometry problems are caught locally before
    /// the miner is contacted.
    pub async fn add_shape(
        &mut self,
        validate_num: u8,
        shape_type: ShapeType,
        svg: &str,
        fill: &str,
        stroke: &str,
    ) -> Result<(String, String, u32), ArtError> {
        let parsed = geometry::parse_shape(svg, fill, stroke, &self.settings)?;

        let shape = Shape {
            shape_type,
            svg: svg.to_string(),
            fill: fill.to_string(),
            stroke: stroke.to_string(),
            segments: parsed.segments,
            ink_cost: parsed.ink_cost,
        };
        let op = Operation::new_add(&self.keypair, validate_num, shape);

        match self.call(&ArtRequest::Add(op)).await? {
            ArtResponse::ShapeAdded {
                shape_id,
                block_hash,
                ink_remaining,
            } => Ok((shape_id, block_hash, ink_remaining)),
            _ => Err(ArtError::Disconnected),
        }
    }

    /// Delete an owned shape and wait for `validate_num`
    /// confirmations. Returns the ink balance after the refund.
    ///
    /// # Errors
    /// [`ArtError::ShapeOwner`] when the shape is absent, already
    /// deleted, or not this key's.
    pub async fn delete_shape(
        &mut self,
        validate_num: u8,
        shape_id: &str,
    ) -> Result<u32, ArtError> {
        let request = ArtRequest::Delete {
            target_id: shape_id.to_string(),
            validate_num,
        };

        match self.call(&request).await? {
            ArtResponse::ShapeDeleted { ink_remaining } => Ok(ink_remaining),
            _ => Err(ArtError::Disconnected),
        }
    }

    /// Ask the miner whether deleting `target_id` would currently be
    /// accepted, without queueing anything.
    ///
    /// # Errors
    /// Transport failures only.
    pub async fn validate_delete(&mut self, target_id: &str) -> Result<bool, ArtError> {
        let op = Operation::new_delete(&self.keypair, 0, target_id.to_string());

        match self.call(&ArtRequest::ValidateDelete(op)).await? {
            ArtResponse::DeleteValid(valid) => Ok(valid),
            _ => Err(ArtError::Disconnected),
        }
    }

    /// Current ink balance of this key.
    ///
    /// # Errors
    /// Transport failures only.
    pub async fn get_ink(&mut self) -> Result<u32, ArtError> {
        match self.call(&ArtRequest::GetInk).await? {
            ArtResponse::Ink(ink) => Ok(ink),
            _ => Err(ArtError::Disconnected),
        }
    }

    /// SVG element of a live shape.
    ///
    /// # Errors
    /// [`ArtError::InvalidShapeHash`] when no live shape has this id.
    pub async fn get_svg_string(&mut self, shape_id: &str) -> Result<String, ArtError> {
        let request = ArtRequest::GetSvg {
            shape_id: shape_id.to_string(),
        };

        match self.call(&request).await? {
            ArtResponse::Svg(svg) => Ok(svg),
            _ => Err(ArtError::Disconnected),
        }
    }

    /// Ids of the shapes a block added.
    ///
    /// # Errors
    /// [`ArtError::InvalidBlockHash`] for an unknown block.
    pub async fn get_shapes(&mut self, block_hash: &str) -> Result<Vec<String>, ArtError> {
        let request = ArtRequest::GetShapes {
            block_hash: block_hash.to_string(),
        };

        match self.call(&request).await? {
            ArtResponse::Shapes(ids) => Ok(ids),
            _ => Err(ArtError::Disconnected),
        }
    }

    /// The genesis block hash.
    ///
    /// # Errors
    /// Transport failures only.
    pub async fn get_genesis_block(&mut self) -> Result<String, ArtError> {
        match self.call(&ArtRequest::GetGenesis).await? {
            ArtResponse::Genesis(hash) => Ok(hash),
            _ => Err(ArtError::Disconnected),
        }
    }

    /// Children of a block.
    ///
    /// # Errors
    /// [`ArtError::InvalidBlockHash`] for an unknown block.
    pub async fn get_children(&mut self, block_hash: &str) -> Result<Vec<String>, ArtError> {
        let request = ArtRequest::GetChildren {
            block_hash: block_hash.to_string(),
        };

        match self.call(&request).await? {
            ArtResponse::Children(hashes) => Ok(hashes),
            _ => Err(ArtError::Disconnected),
        }
    }

    /// Close the session. Returns the parting ink balance.
    ///
    /// # Errors
    /// Transport failures only.
    pub async fn close(mut self) -> Result<u32, ArtError> {
        match self.call(&ArtRequest::Close).await? {
            ArtResponse::Closed { ink_remaining } => Ok(ink_remaining),
            _ => Err(ArtError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NodeHandle;
    use crate::types::MinerNetSettings;
    use crate::{miner, network};
    use tokio::net::TcpListener;

    // Difficulty 4 paces the mining loop at a few blocks a second, so
    // confirmations land fast without the chain exploding mid-test.
    fn test_settings() -> MinerNetSettings {
        MinerNetSettings {
            genesis_block_hash: "genesis".to_string(),
            min_peer_connections: 1,
            ink_per_op_block: 500,
            ink_per_noop_block: 300,
            heartbeat_ms: 1000,
            pow_difficulty_op_block: 4,
            pow_difficulty_noop_block: 4,
            canvas: CanvasSettings {
                x_max: 1024,
                y_max: 1024,
            },
        }
    }

    /// A full node: gossip listener plus mining loop.
    async fn spawn_mining_node() -> (NodeHandle, Keypair) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let keypair = Keypair::generate();
        let client_copy = clone_keypair(&keypair);
        let node = NodeHandle::new(test_settings(), keypair, addr);

        tokio::spawn(network::serve(node.clone(), listener));
        tokio::spawn(miner::run(node.clone()));

        (node, client_copy)
    }

    /// A listener-only node, no miner: nobody ever earns ink.
    async fn spawn_idle_node() -> (NodeHandle, Keypair) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let keypair = Keypair::generate();
        let client_copy = clone_keypair(&keypair);
        let node = NodeHandle::new(test_settings(), keypair, addr);

        tokio::spawn(network::serve(node.clone(), listener));

        (node, client_copy)
    }

    // Keypair is deliberately not Clone; tests rebuild it from the
    // scalar so the art-app side can hold the same identity.
    fn clone_keypair(keypair: &Keypair) -> Keypair {
        let secret =
            crate::crypto::SecretKey::from_bytes(&keypair.secret_key().to_bytes()).unwrap();
        Keypair::from_secret(secret)
    }

    /// Block until mining rewards cover `minimum` ink.
    async fn wait_for_ink(canvas: &mut Canvas, minimum: u32) {
        for round in 0..=300 {
            if canvas.get_ink().await.unwrap() >= minimum {
                return;
            }
            assert!(round < 300, "mining never funded the artist");
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_with_wrong_key_rejected() {
        let (node, _kp) = spawn_idle_node().await;

        let stranger = Keypair::generate();
        let result = Canvas::open(&node.local_info.address, stranger).await;
        assert_eq!(result.err(), Some(ArtError::InvalidKey));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reads_on_fresh_chain() {
        let (node, kp) = spawn_idle_node().await;

        let mut canvas = Canvas::open(&node.local_info.address, kp).await.unwrap();
        assert_eq!(canvas.settings().x_max, 1024);

        assert_eq!(canvas.get_genesis_block().await.unwrap(), "genesis");
        assert!(canvas.get_children("genesis").await.unwrap().is_empty());
        assert_eq!(canvas.get_ink().await.unwrap(), 0);
        assert_eq!(
            canvas.get_children("missing").await.err(),
            Some(ArtError::InvalidBlockHash("missing".to_string()))
        );

        canvas.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_insufficient_ink_without_mining() {
        let (node, kp) = spawn_idle_node().await;

        let mut canvas = Canvas::open(&node.local_info.address, kp).await.unwrap();
        let result = canvas
            .add_shape(1, ShapeType::Path, "M 0 0 L 10 0", "transparent", "red")
            .await;

        assert_eq!(result.err(), Some(ArtError::InsufficientInk(0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_out_of_bounds_caught_locally() {
        let (node, kp) = spawn_idle_node().await;

        let mut canvas = Canvas::open(&node.local_info.address, kp).await.unwrap();
        let result = canvas
            .add_shape(1, ShapeType::Path, "M 60 60 L 1025 60", "transparent", "red")
            .await;

        assert_eq!(result.err(), Some(ArtError::OutOfBounds));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_add_confirm_delete_cycle() {
        let (node, kp) = spawn_mining_node().await;

        let mut canvas = Canvas::open(&node.local_info.address, kp).await.unwrap();
        wait_for_ink(&mut canvas, 100).await;

        let (shape_id, block_hash, ink_after_add) = canvas
            .add_shape(
                1,
                ShapeType::Path,
                "M 0 0 L 20 0 L 20 20 L 0 20 Z",
                "transparent",
                "red",
            )
            .await
            .expect("square confirms");

        assert!(!shape_id.is_empty());
        assert!(node.state.read().await.store.exists(&block_hash));

        // The shape renders, and exactly once.
        let svgs = html::get_all_svgs(&mut canvas).await.unwrap();
        let hits = svgs
            .iter()
            .filter(|s| s.contains("M 0 0 L 20 0 L 20 20 L 0 20 Z"))
            .count();
        assert_eq!(hits, 1);

        // Deleting refunds the 80 ink the square cost.
        let ink_after_delete = canvas.delete_shape(1, &shape_id).await.unwrap();
        assert!(ink_after_delete >= ink_after_add + 80);

        let svgs = html::get_all_svgs(&mut canvas).await.unwrap();
        assert!(!svgs.iter().any(|s| s.contains("M 0 0 L 20 0 L 20 20")));

        // Delete-of-delete surfaces ShapeOwner.
        let result = canvas.delete_shape(1, &shape_id).await;
        assert_eq!(result.err(), Some(ArtError::ShapeOwner(shape_id)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_filled_shape_confirms_and_renders() {
        let (node, kp) = spawn_mining_node().await;

        let mut canvas = Canvas::open(&node.local_info.address, kp).await.unwrap();
        wait_for_ink(&mut canvas, 300).await;

        let (triangle_id, _, _) = canvas
            .add_shape(1, ShapeType::Path, "M 30 0 L 50 0 L 50 20 Z", "purple", "red")
            .await
            .expect("filled triangle confirms");

        let svg = canvas.get_svg_string(&triangle_id).await.unwrap();
        assert_eq!(
            svg,
            "<path d=\"M 30 0 L 50 0 L 50 20 Z\" stroke=\"red\" fill=\"purple\" />"
        );

        canvas.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cross_owner_overlap_between_nodes() {
        let (node_a, kp_a) = spawn_mining_node().await;
        let (node_b, kp_b) = spawn_mining_node().await;

        network::connect_peer(&node_a, &node_b.local_info.address)
            .await
            .unwrap();

        let mut canvas_a = Canvas::open(&node_a.local_info.address, kp_a).await.unwrap();
        let mut canvas_b = Canvas::open(&node_b.local_info.address, kp_b).await.unwrap();

        wait_for_ink(&mut canvas_a, 100).await;
        let (triangle_id, _, _) = canvas_a
            .add_shape(
                1,
                ShapeType::Path,
                "M 30 0 L 50 0 L 50 20 Z",
                "transparent",
                "red",
            )
            .await
            .expect("A's triangle confirms");

        // Wait until B's best chain carries A's triangle and B has
        // mined enough ink to otherwise afford the same shape.
        for round in 0..=300 {
            let seen = canvas_b.get_svg_string(&triangle_id).await.is_ok();
            let funded = canvas_b.get_ink().await.unwrap() >= 100;
            if seen && funded {
                break;
            }
            assert!(round < 300, "gossip never converged");
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        let result = canvas_b
            .add_shape(
                2,
                ShapeType::Path,
                "M 30 0 L 50 0 L 50 20 Z",
                "transparent",
                "orange",
            )
            .await;

        assert_eq!(result.err(), Some(ArtError::ShapeOverlap(triangle_id)));
    }
}
