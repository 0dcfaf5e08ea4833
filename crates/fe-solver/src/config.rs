//! Builder-and-solver configuration.

use crate::error::{SolverError, SolverResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How prescribed (Dirichlet) DOFs are enforced on the condensed system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DirichletPolicy {
    /// Remove fixed DOFs; move their known contribution to the RHS.
    #[default]
    RowColumnElimination,
    /// Keep fixed DOFs as identity rows scaled by a representative diagonal.
    DiagonalScaling,
}

/// Diagonal value used by [`DirichletPolicy::DiagonalScaling`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DiagonalScale {
    /// Fixed user value
    Explicit(f64),
    /// Largest free-block diagonal magnitude
    MaxDiagonal,
    /// Root-mean-square of the free-block diagonal
    #[default]
    NormDiagonal,
}

/// How element contributions are accumulated into the raw system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AssemblyStrategy {
    /// Single-threaded pass in element order.
    Serial,
    /// Per-task partial systems merged after a parallel pass.
    #[default]
    ThreadLocal,
}

/// Builder-and-solver configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SolverConfig {
    /// Dirichlet enforcement policy
    pub dirichlet: DirichletPolicy,
    /// Diagonal value for the diagonal-scaling policy
    pub diagonal_scale: DiagonalScale,
    /// Compute reactions for fixed and slave DOFs after each solve
    pub compute_reactions: bool,
    /// Keep registry and sparsity graph while the topology is unchanged
    pub reuse_sparsity: bool,
    /// Assembly accumulation strategy
    pub assembly: AssemblyStrategy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            dirichlet: DirichletPolicy::default(),
            diagonal_scale: DiagonalScale::default(),
            compute_reactions: true,
            reuse_sparsity: true,
            assembly: AssemblyStrategy::default(),
        }
    }
}

impl SolverConfig {
    /// Reject settings that cannot produce a solvable system.
    pub fn validate(&self) -> SolverResult<()> {
        if let DiagonalScale::Explicit(s) = self.diagonal_scale {
            if !s.is_finite() || s <= 0.0 {
                return Err(SolverError::config(format!(
                    "diagonal scale must be finite and positive, got {s}"
                )));
            }
        }
        Ok(())
    }
}
