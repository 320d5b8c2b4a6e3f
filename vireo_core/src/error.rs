use std::sync::Arc;

use thiserror::Error;
use vireo_field::{FieldError, FieldKind};
use vireo_ids::NodeId;

use crate::interface::InterfaceKind;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, VireoError>;

/// Errors raised by node, route, and dispatcher operations.
///
/// The taxonomy mirrors the VRML error categories: type mismatch,
/// unsupported interface, index out of bounds, and resource exhaustion are
/// kept distinct so an embedding can translate each into its own signaling
/// convention.
#[derive(Error, Debug)]
pub enum VireoError {
    #[error("field value type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("{node_type} node has no {interface} \"{id}\"")]
    UnsupportedInterface {
        node_type: Arc<str>,
        interface: InterfaceKind,
        id: String,
    },

    #[error("interface \"{id}\" already declared on {node_type}")]
    DuplicateInterface { node_type: Arc<str>, id: String },

    #[error("index {index} out of bounds for sequence of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("node {0} is not in the scene")]
    UnknownNode(NodeId),

    #[error("malformed field literal: {0}")]
    BadFieldLiteral(String),

    #[error("out of memory")]
    OutOfMemory,
}

impl From<FieldError> for VireoError {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::TypeMismatch { expected, found } => {
                VireoError::TypeMismatch { expected, found }
            }
            FieldError::IndexOutOfBounds { index, len } => {
                VireoError::IndexOutOfBounds { index, len }
            }
            FieldError::Malformed(msg) => VireoError::BadFieldLiteral(msg),
            FieldError::OutOfMemory => VireoError::OutOfMemory,
        }
    }
}
