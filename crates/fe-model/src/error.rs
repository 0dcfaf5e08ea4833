//! Model-specific error types.

use crate::dof::DofKey;
use fe_core::{FeError, NodeId};
use thiserror::Error;

/// Model construction and validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A DOF or element refers to a node that doesn't exist.
    UnknownNode { node: NodeId },

    /// A DOF is referenced but not present in the model's DOF table.
    UnknownDof { key: DofKey },

    /// An element lists the same DOF twice.
    DuplicateDof { element: String, key: DofKey },

    /// An element or condition has no DOFs.
    EmptyElement { element: String },

    /// Node ids are not contiguous with their storage position.
    NodeIdMismatch { expected: u32, actual: NodeId },

    /// More nodes, elements or conditions than an id can address.
    CapacityExceeded { what: &'static str, limit: usize },
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::UnknownNode { node } => {
                write!(f, "Node {} does not exist", node)
            }
            ModelError::UnknownDof { key } => {
                write!(f, "DOF {} is not registered in the model", key)
            }
            ModelError::DuplicateDof { element, key } => {
                write!(f, "Element '{}' lists DOF {} more than once", element, key)
            }
            ModelError::EmptyElement { element } => {
                write!(f, "Element '{}' has no DOFs", element)
            }
            ModelError::NodeIdMismatch { expected, actual } => {
                write!(f, "Node stored at {} carries id {}", expected, actual)
            }
            ModelError::CapacityExceeded { what, limit } => {
                write!(f, "Model holds more than {} {}", limit, what)
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type ModelResult<T> = Result<T, ModelError>;

impl From<ModelError> for FeError {
    fn from(err: ModelError) -> Self {
        FeError::Configuration {
            what: err.to_string(),
        }
    }
}

/// Errors raised while computing an element's local contribution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElementError {
    #[error("Element '{element}' needs the value of DOF {key}, which is unknown")]
    MissingDof { element: String, key: DofKey },

    #[error("Non-physical value: {what}")]
    NonPhysical { what: &'static str },

    #[error("Local system has shape {rows}x{cols} / rhs {rhs}, expected {expected}")]
    Shape {
        expected: usize,
        rows: usize,
        cols: usize,
        rhs: usize,
    },
}

pub type ElementResult<T> = Result<T, ElementError>;

impl From<ElementError> for FeError {
    fn from(e: ElementError) -> Self {
        match e {
            ElementError::NonPhysical { what } => FeError::InvalidArg { what },
            other => FeError::Numerical {
                what: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dof::Variable;
    use fe_core::Id;

    #[test]
    fn error_display() {
        let key = DofKey::new(Id::from_index(2), Variable::DisplacementX);
        let err = ModelError::UnknownDof { key };
        assert!(err.to_string().contains("2:DISPLACEMENT_X"));
    }

    #[test]
    fn error_conversion() {
        let fe: FeError = ModelError::UnknownNode {
            node: Id::from_index(3),
        }
        .into();
        assert!(matches!(fe, FeError::Configuration { .. }));

        let fe: FeError = ElementError::NonPhysical { what: "length" }.into();
        assert!(matches!(fe, FeError::InvalidArg { what: "length" }));
    }
}
