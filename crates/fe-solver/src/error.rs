//! Error types for build-and-solve operations.

use crate::linear::LinearSolverError;
use fe_core::error::FeError;
use fe_model::{ElementError, ModelError};
use thiserror::Error;

/// Diagnostics attached to a failed linear solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveDiagnostics {
    /// Size of the system handed to the linear solver
    pub system_size: usize,
    /// Stored entries of that system
    pub nnz: usize,
    /// Ratio of smallest to largest pivot magnitude, when the solver reports one
    pub condition_hint: Option<f64>,
}

/// Three-way classification used by drivers to pick a remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input (constraints, DOFs, config). Fatal.
    Configuration,
    /// Solver or element reported a numerical failure. The driver may retry.
    Numerical,
    /// Builder/assembler mismatch. A programming fault.
    Consistency,
}

/// Errors that can occur while building or solving the global system.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Configuration error: {what}")]
    Configuration { what: String },

    #[error("Sparsity mismatch: {what}")]
    Consistency { what: String },

    #[error("Linear solver '{solver}' failed on a {n}x{n} system: {source}", n = .diagnostics.system_size)]
    LinearSolve {
        solver: String,
        #[source]
        source: LinearSolverError,
        diagnostics: SolveDiagnostics,
    },

    #[error("Element '{element}' failed: {source}")]
    Element {
        element: String,
        #[source]
        source: ElementError,
    },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Numeric error: {what}")]
    Numeric { what: String },
}

pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    pub(crate) fn config(what: impl Into<String>) -> Self {
        SolverError::Configuration { what: what.into() }
    }

    pub(crate) fn consistency(what: impl Into<String>) -> Self {
        SolverError::Consistency { what: what.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SolverError::Configuration { .. } | SolverError::Model(_) => ErrorKind::Configuration,
            SolverError::Consistency { .. }
            | SolverError::Element {
                source: ElementError::Shape { .. },
                ..
            } => ErrorKind::Consistency,
            SolverError::LinearSolve { .. }
            | SolverError::Element { .. }
            | SolverError::Numeric { .. } => ErrorKind::Numerical,
        }
    }
}

impl From<SolverError> for FeError {
    fn from(e: SolverError) -> Self {
        match e.kind() {
            ErrorKind::Configuration => FeError::Configuration {
                what: e.to_string(),
            },
            ErrorKind::Numerical => FeError::Numerical {
                what: e.to_string(),
            },
            ErrorKind::Consistency => FeError::Invariant {
                what: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(SolverError::config("x").kind(), ErrorKind::Configuration);
        assert_eq!(SolverError::consistency("x").kind(), ErrorKind::Consistency);
        let err = SolverError::LinearSolve {
            solver: "lu".into(),
            source: LinearSolverError::Singular {
                detail: "zero pivot".into(),
                condition_hint: Some(0.0),
            },
            diagnostics: SolveDiagnostics {
                system_size: 3,
                nnz: 9,
                condition_hint: Some(0.0),
            },
        };
        assert_eq!(err.kind(), ErrorKind::Numerical);
        assert!(err.to_string().contains("3x3"));
    }

    #[test]
    fn local_shape_mismatch_is_a_consistency_fault() {
        let shape = SolverError::Element {
            element: "bar".into(),
            source: ElementError::Shape {
                expected: 2,
                rows: 3,
                cols: 3,
                rhs: 3,
            },
        };
        assert_eq!(shape.kind(), ErrorKind::Consistency);
        let physical = SolverError::Element {
            element: "bar".into(),
            source: ElementError::NonPhysical { what: "length" },
        };
        assert_eq!(physical.kind(), ErrorKind::Numerical);
    }

    #[test]
    fn conversion_to_fe_error() {
        let fe: FeError = SolverError::consistency("row 3").into();
        assert!(matches!(fe, FeError::Invariant { .. }));
    }
}
