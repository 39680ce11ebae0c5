//! Canvas mutations: signed Add and Delete operations.
//!
//! An operation is built once by its owner's art-app, signed over the
//! fixed challenge phrase, and never mutated afterwards. Its unique id
//! is the decimal `(r, s)` of that signature, which doubles as the
//! shape hash for Adds.

use serde::{Deserialize, Serialize};

use crate::crypto::{verify, CryptoResult, Keypair, OpSignature, PublicKey};
use crate::geometry::LineSegment;

/// The kind of geometry a shape carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeType {
    /// An SVG path built from the `M m L l H h V v Z z` subset
    Path,
}

/// A parsed shape as carried inside an Add operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    /// Geometry kind
    pub shape_type: ShapeType,
    /// The raw path string as submitted
    pub svg: String,
    /// Fill color; `"transparent"` means outline only
    pub fill: String,
    /// Stroke color
    pub stroke: String,
    /// Segments derived from `svg`
    pub segments: Vec<LineSegment>,
    /// Ink consumed when the shape is accepted
    pub ink_cost: u32,
}

impl Shape {
    /// Render as an SVG `<path>` element.
    #[must_use]
    pub fn to_svg_element(&self) -> String {
        format!(
            "<path d=\"{}\" stroke=\"{}\" fill=\"{}\" />",
            self.svg, self.stroke, self.fill
        )
    }
}

/// What an operation does to the canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OpAction {
    /// Draw a new shape
    Add(Shape),
    /// Cancel a previously added shape
    Delete {
        /// Unique id of the Add this cancels
        target_id: String,
    },
}

/// A signed, immutable canvas mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Decimal `(r, s)` of `signature`; identifies the operation and,
    /// for Adds, the shape
    pub unique_id: String,
    /// Public key of the art-app that produced the operation
    pub owner: PublicKey,
    /// Signature over the fixed challenge phrase
    pub signature: OpSignature,
    /// Confirmation depth the submitter waits for
    pub validate_num: u8,
    /// The mutation itself
    pub action: OpAction,
}

impl Operation {
    /// Build and sign an Add.
    #[must_use]
    pub fn new_add(keypair: &Keypair, validate_num: u8, shape: Shape) -> Self {
        Self::new(keypair, validate_num, OpAction::Add(shape))
    }

    /// Build and sign a Delete of `target_id`.
    #[must_use]
    pub fn new_delete(keypair: &Keypair, validate_num: u8, target_id: String) -> Self {
        Self::new(keypair, validate_num, OpAction::Delete { target_id })
    }

    fn new(keypair: &Keypair, validate_num: u8, action: OpAction) -> Self {
        let signature = keypair.sign(crate::KEY_CHALLENGE);

        Self {
            unique_id: signature.unique_id(),
            owner: *keypair.public_key(),
            signature,
            validate_num,
            action,
        }
    }

    /// Whether this is an Add.
    #[must_use]
    pub const fn is_add(&self) -> bool {
        matches!(self.action, OpAction::Add(_))
    }

    /// The shape, for Adds.
    #[must_use]
    pub const fn shape(&self) -> Option<&Shape> {
        match &self.action {
            OpAction::Add(shape) => Some(shape),
            OpAction::Delete { .. } => None,
        }
    }

    /// Tag string mixed into the block hash preimage.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self.action {
            OpAction::Add(_) => "add",
            OpAction::Delete { .. } => "delete",
        }
    }

    /// Check the signature against the owner key and that the unique
    /// id really is derived from it.
    ///
    /// # Errors
    /// Returns an error when either check fails.
    pub fn verify_signature(&self) -> CryptoResult<()> {
        verify(&self.owner, crate::KEY_CHALLENGE, &self.signature)?;

        if self.signature.unique_id() == self.unique_id {
            Ok(())
        } else {
            Err(crate::crypto::CryptoError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::parse_segments;

    fn test_shape(svg: &str, fill: &str, stroke: &str) -> Shape {
        let segments = parse_segments(svg).unwrap();
        let ink_cost = crate::geometry::ink_cost(&segments, fill);

        Shape {
            shape_type: ShapeType::Path,
            svg: svg.to_string(),
            fill: fill.to_string(),
            stroke: stroke.to_string(),
            segments,
            ink_cost,
        }
    }

    #[test]
    fn test_add_operation_signature_roundtrip() {
        let kp = Keypair::generate();
        let op = Operation::new_add(&kp, 3, test_shape("M 0 0 L 10 0", "transparent", "red"));

        assert!(op.is_add());
        assert!(op.verify_signature().is_ok());
        assert_eq!(op.unique_id, op.signature.unique_id());
    }

    #[test]
    fn test_tampered_unique_id_rejected() {
        let kp = Keypair::generate();
        let mut op = Operation::new_delete(&kp, 1, "123".to_string());
        op.unique_id.push('7');

        assert!(op.verify_signature().is_err());
    }

    #[test]
    fn test_foreign_owner_rejected() {
        let kp = Keypair::generate();
        let other = Keypair::generate();

        let mut op = Operation::new_delete(&kp, 1, "123".to_string());
        op.owner = *other.public_key();

        assert!(op.verify_signature().is_err());
    }

    #[test]
    fn test_distinct_ids_per_operation() {
        let kp = Keypair::generate();
        let shape = test_shape("M 0 0 L 10 0", "transparent", "red");

        let a = Operation::new_add(&kp, 3, shape.clone());
        let b = Operation::new_add(&kp, 3, shape);
        assert_ne!(a.unique_id, b.unique_id);
    }

    #[test]
    fn test_svg_element_rendering() {
        let shape = test_shape("M 0 0 L 10 0", "transparent", "red");

        assert_eq!(
            shape.to_svg_element(),
            "<path d=\"M 0 0 L 10 0\" stroke=\"red\" fill=\"transparent\" />"
        );
    }
}
