//! Constrained builder-and-solver for finite-element equilibrium systems.
//!
//! The crate turns a [`fe_model::ModelProvider`] into a global sparse system,
//! eliminates master-slave constraints by condensation, enforces prescribed
//! DOFs, calls a pluggable [`LinearSolver`] and reconstructs increments and
//! reactions for every DOF. The same machinery solves adjoint systems for
//! design sensitivities.
//!
//! Systems are in increment form: the matrix is the tangent `-dR/du` and the
//! right-hand side the residual `R`, so the solution is `Δu`.

pub mod adjoint;
pub mod assembler;
pub mod builder_and_solver;
pub mod condenser;
pub mod config;
pub mod constraints;
pub mod dirichlet;
pub mod error;
pub mod linear;
pub mod registry;
pub mod sparsity;

pub use adjoint::{
    AdjointResponse, AdjointSolution, NodalDisplacementResponse, SensitivityAccumulator,
};
pub use assembler::{RawSystem, assemble};
pub use builder_and_solver::{BuilderAndSolver, StepSolution};
pub use condenser::{CondensationMap, CondensedSystem, condense};
pub use config::{AssemblyStrategy, DiagonalScale, DirichletPolicy, SolverConfig};
pub use constraints::{ConstraintTable, FlatRelation};
pub use dirichlet::{DirichletSystem, apply_dirichlet};
pub use error::{ErrorKind, SolveDiagnostics, SolverError, SolverResult};
pub use linear::{
    ConjugateGradientSolver, DenseLuSolver, LinearSolver, LinearSolverError, LinearSolverResult,
};
pub use registry::{DofClass, DofRegistry};
pub use sparsity::SparsityGraph;
