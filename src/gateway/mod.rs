//! The local art-app endpoint.
//!
//! A session opens when an art-app proves, by signature over the fixed
//! challenge phrase, that it holds this miner's private key (checked
//! by the connection dispatcher before [`serve_session`] runs). Add
//! and Delete calls validate against the best chain, enter the
//! mempool, flood to peers, and then block the caller until the
//! containing block is `validate_num` deep — or a bounded timeout
//! fires. Everything else is a pure read of the chain.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::chain::history_on;
use crate::geometry::ShapeError;
use crate::network::{codec, flood_operation};
use crate::state::NodeHandle;
use crate::types::Operation;
use crate::validate::{self, ValidationError};

/// How often a confirmation wait re-samples the best chain.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on a confirmation wait.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors surfaced to the art-app, in wire form.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ArtError {
    /// The miner cannot be reached
    #[error("cannot connect to the miner")]
    Disconnected,
    /// Not enough ink; carries the remaining balance
    #[error("not enough ink: {0} remaining")]
    InsufficientInk(u32),
    /// Bad or over-long path string, or bad colors
    #[error("bad shape svg string")]
    InvalidShape,
    /// The shape crosses another owner's shape
    #[error("shape overlaps previously added shape {0}")]
    ShapeOverlap(String),
    /// An endpoint lies outside the canvas
    #[error("shape is outside the bounds of the canvas")]
    OutOfBounds,
    /// No live shape has this hash
    #[error("invalid shape hash {0}")]
    InvalidShapeHash(String),
    /// Delete of a shape this key does not own (or that is gone)
    #[error("shape {0} owned by someone else or missing")]
    ShapeOwner(String),
    /// No block has this hash
    #[error("invalid block hash {0}")]
    InvalidBlockHash(String),
    /// The key does not match this miner
    #[error("key is not validated by the miner")]
    InvalidKey,
    /// The confirmation wait timed out; the operation stays pending
    #[error("timed out waiting for confirmation")]
    Timeout,
}

impl From<ValidationError> for ArtError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::BadSignature => Self::InvalidKey,
            ValidationError::Duplicate(id) => Self::InvalidShapeHash(id),
            ValidationError::TargetMissing(id) => Self::ShapeOwner(id),
            ValidationError::InvalidShape(shape_error) => shape_error.into(),
            ValidationError::InsufficientInk { remaining } => Self::InsufficientInk(remaining),
            ValidationError::Overlap(id) => Self::ShapeOverlap(id),
            // Internal kinds; an art-app never triggers them.
            ValidationError::BadPow | ValidationError::UnknownParent(_) => Self::Disconnected,
        }
    }
}

impl From<ShapeError> for ArtError {
    fn from(e: ShapeError) -> Self {
        match e {
            ShapeError::OutOfBounds => Self::OutOfBounds,
            ShapeError::StringTooLong | ShapeError::MalformedPath | ShapeError::InvalidColors => {
                Self::InvalidShape
            }
        }
    }
}

/// Requests an authenticated art-app may make.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ArtRequest {
    /// Submit an Add and wait for confirmation
    Add(Operation),
    /// Delete an owned shape and wait for confirmation
    Delete {
        /// Unique id of the shape to remove
        target_id: String,
        /// Confirmation depth to wait for
        validate_num: u8,
    },
    /// Pre-validate a client-built Delete without queueing it
    ValidateDelete(Operation),
    /// Current ink balance of the miner's key
    GetInk,
    /// SVG element of a live shape
    GetSvg {
        /// The shape's unique id
        shape_id: String,
    },
    /// Unique ids of the shapes a block added
    GetShapes {
        /// The block to inspect
        block_hash: String,
    },
    /// The genesis hash
    GetGenesis,
    /// Children of a block
    GetChildren {
        /// The block to inspect
        block_hash: String,
    },
    /// End the session
    Close,
}

/// Replies to [`ArtRequest`]s, plus the session-opening settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ArtResponse {
    /// Session opened; here are the canvas settings
    Canvas(crate::types::CanvasSettings),
    /// Add confirmed
    ShapeAdded {
        /// The shape's unique id
        shape_id: String,
        /// Block the operation landed in
        block_hash: String,
        /// Ink left after paying for the shape
        ink_remaining: u32,
    },
    /// Delete confirmed
    ShapeDeleted {
        /// Ink after the refund
        ink_remaining: u32,
    },
    /// Result of a delete pre-validation
    DeleteValid(bool),
    /// Current ink balance
    Ink(u32),
    /// SVG element text
    Svg(String),
    /// Shape ids added by the block
    Shapes(Vec<String>),
    /// The genesis hash
    Genesis(String),
    /// Child block hashes
    Children(Vec<String>),
    /// Session closed; parting ink balance
    Closed {
        /// Ink at close
        ink_remaining: u32,
    },
    /// The request failed
    Error(ArtError),
}

enum WaitOutcome {
    Confirmed { block_hash: String, ink_remaining: u32 },
    TimedOut,
    SessionClosed,
}

/// Drive one authenticated art-app session until it closes.
pub async fn serve_session(node: NodeHandle, stream: TcpStream) {
    let (mut reader, mut writer) = stream.into_split();

    if codec::write_frame(&mut writer, &ArtResponse::Canvas(node.settings.canvas))
        .await
        .is_err()
    {
        return;
    }
    info!("art-app session opened");

    loop {
        let request: ArtRequest = match codec::read_frame(&mut reader).await {
            Ok(request) => request,
            Err(_) => break,
        };

        let session_over =
            handle_request(&node, request, &mut reader, &mut writer).await;
        if session_over {
            break;
        }
    }

    debug!("art-app session closed");
}

// Returns true when the session is over.
async fn handle_request(
    node: &NodeHandle,
    request: ArtRequest,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
) -> bool {
    let response = match request {
        ArtRequest::Add(op) => {
            if !op.is_add() || op.owner != node.local_info.key {
                ArtResponse::Error(ArtError::InvalidKey)
            } else {
                match submit_and_wait(node, op, reader).await {
                    Submitted::Reply(response) => response,
                    Submitted::SessionClosed => return true,
                }
            }
        }

        ArtRequest::Delete {
            target_id,
            validate_num,
        } => {
            let op = Operation::new_delete(&node.keypair, validate_num, target_id);
            match submit_and_wait(node, op, reader).await {
                Submitted::Reply(response) => response,
                Submitted::SessionClosed => return true,
            }
        }

        ArtRequest::ValidateDelete(op) => {
            let valid = !op.is_add() && {
                let mut state = node.state.write().await;
                let tip = state.best_tip();
                let path = state.store.path_records(&tip).unwrap_or_default();
                validate::check_operation(&op, &path, &state.settings).is_ok()
            };
            ArtResponse::DeleteValid(valid)
        }

        ArtRequest::GetInk => {
            let ink = node.state.write().await.best_balance(&node.local_info.key);
            ArtResponse::Ink(ink)
        }

        ArtRequest::GetSvg { shape_id } => {
            let mut state = node.state.write().await;
            let tip = state.best_tip();
            let path = state.store.path_records(&tip).unwrap_or_default();

            history_on(&path)
                .iter()
                .find(|h| h.op.is_add() && !h.deleted && h.op.unique_id == shape_id)
                .and_then(|h| h.op.shape())
                .map_or(
                    ArtResponse::Error(ArtError::InvalidShapeHash(shape_id)),
                    |shape| ArtResponse::Svg(shape.to_svg_element()),
                )
        }

        ArtRequest::GetShapes { block_hash } => {
            let state = node.state.read().await;

            if let Some(record) = state.store.get(&block_hash) {
                let ids = record
                    .block
                    .ops
                    .iter()
                    .filter(|op| op.is_add())
                    .map(|op| op.unique_id.clone())
                    .collect();
                ArtResponse::Shapes(ids)
            } else if block_hash == state.store.genesis_hash() {
                ArtResponse::Shapes(Vec::new())
            } else {
                ArtResponse::Error(ArtError::InvalidBlockHash(block_hash))
            }
        }

        ArtRequest::GetGenesis => {
            let state = node.state.read().await;
            ArtResponse::Genesis(state.store.genesis_hash().to_string())
        }

        ArtRequest::GetChildren { block_hash } => {
            let state = node.state.read().await;
            state.store.children(&block_hash).map_or(
                ArtResponse::Error(ArtError::InvalidBlockHash(block_hash)),
                ArtResponse::Children,
            )
        }

        ArtRequest::Close => {
            let ink = node.state.write().await.best_balance(&node.local_info.key);
            let _ = codec::write_frame(writer, &ArtResponse::Closed { ink_remaining: ink }).await;
            return true;
        }
    };

    codec::write_frame(writer, &response).await.is_err()
}

enum Submitted {
    Reply(ArtResponse),
    SessionClosed,
}

// Queue an operation, flood it, and hold the caller until its block is
// deep enough. Shared by Add and Delete.
async fn submit_and_wait(node: &NodeHandle, op: Operation, reader: &mut OwnedReadHalf) -> Submitted {
    let was_delete = !op.is_add();

    let outcome = {
        let mut state = node.state.write().await;
        state.accept_operation(op.clone(), &node.signals)
    };

    match outcome {
        Err(e) => {
            warn!(id = %op.unique_id, error = %e, "art-app operation rejected");
            return Submitted::Reply(ArtResponse::Error(e.into()));
        }
        Ok(true) => {
            debug!(id = %op.unique_id, "art-app operation queued");
            flood_operation(node, &op, None).await;
        }
        Ok(false) => {
            // Known id: already queued or mined; just wait it out.
        }
    }

    match wait_confirmed(node, &op, reader).await {
        WaitOutcome::Confirmed {
            block_hash,
            ink_remaining,
        } => Submitted::Reply(if was_delete {
            ArtResponse::ShapeDeleted { ink_remaining }
        } else {
            ArtResponse::ShapeAdded {
                shape_id: op.unique_id,
                block_hash,
                ink_remaining,
            }
        }),
        WaitOutcome::TimedOut => Submitted::Reply(ArtResponse::Error(ArtError::Timeout)),
        WaitOutcome::SessionClosed => Submitted::SessionClosed,
    }
}

// Poll the best chain until the operation is validate_num deep. A
// frame (or disconnect) from the client during the wait is a Close:
// the wait is abandoned, the operation stays in the mempool.
async fn wait_confirmed(node: &NodeHandle, op: &Operation, reader: &mut OwnedReadHalf) -> WaitOutcome {
    let timeout = tokio::time::sleep(CONFIRM_TIMEOUT);
    tokio::pin!(timeout);

    let mut poll = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            () = &mut timeout => return WaitOutcome::TimedOut,

            _ = poll.tick() => {
                if let Some((block_hash, confirmations)) =
                    node.find_on_best_chain(&op.unique_id).await
                {
                    if confirmations >= u64::from(op.validate_num) {
                        let ink_remaining =
                            node.state.write().await.best_balance(&op.owner);
                        return WaitOutcome::Confirmed { block_hash, ink_remaining };
                    }
                }
            }

            _ = codec::read_frame::<ArtRequest, _>(reader) => {
                return WaitOutcome::SessionClosed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ShapeError;

    #[test]
    fn test_validation_error_mapping() {
        assert_eq!(
            ArtError::from(ValidationError::BadSignature),
            ArtError::InvalidKey
        );
        assert_eq!(
            ArtError::from(ValidationError::Duplicate("7".to_string())),
            ArtError::InvalidShapeHash("7".to_string())
        );
        assert_eq!(
            ArtError::from(ValidationError::TargetMissing("7".to_string())),
            ArtError::ShapeOwner("7".to_string())
        );
        assert_eq!(
            ArtError::from(ValidationError::InvalidShape(ShapeError::OutOfBounds)),
            ArtError::OutOfBounds
        );
        assert_eq!(
            ArtError::from(ValidationError::InvalidShape(ShapeError::StringTooLong)),
            ArtError::InvalidShape
        );
        assert_eq!(
            ArtError::from(ValidationError::InsufficientInk { remaining: 9 }),
            ArtError::InsufficientInk(9)
        );
        assert_eq!(
            ArtError::from(ValidationError::Overlap("3".to_string())),
            ArtError::ShapeOverlap("3".to_string())
        );
    }

    #[test]
    fn test_wire_roundtrip() {
        let response = ArtResponse::ShapeAdded {
            shape_id: "123".to_string(),
            block_hash: "abc".to_string(),
            ink_remaining: 42,
        };

        let bytes = bincode::serialize(&response).unwrap();
        let decoded: ArtResponse = bincode::deserialize(&bytes).unwrap();

        match decoded {
            ArtResponse::ShapeAdded { ink_remaining, .. } => assert_eq!(ink_remaining, 42),
            _ => panic!("wrong variant"),
        }
    }
}
