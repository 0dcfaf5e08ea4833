//! Contract between the model and the builder-and-solver.

use crate::dof::{DofKey, DofState};
use crate::element::{DofValues, Element};
use crate::error::ModelResult;
use fe_core::Real;

/// Everything the builder-and-solver needs from a model.
///
/// Read access must be callable repeatedly (once per nonlinear iteration) and
/// reflect the current state. Write access is limited to the results of one
/// solve.
pub trait ModelProvider: DofValues + Sync {
    /// Stamp that changes whenever elements, DOFs or fixity change.
    fn topology_revision(&self) -> u64;

    fn elements(&self) -> &[Box<dyn Element>];

    fn conditions(&self) -> &[Box<dyn Element>];

    fn dof_state(&self, key: DofKey) -> Option<&DofState>;

    /// Store the free equation index of `key` (`None` for fixed/slave DOFs).
    fn assign_equation_id(&mut self, key: DofKey, id: Option<usize>) -> ModelResult<()>;

    /// Add `increment` to the value of `key` and record its reaction.
    fn apply_increment(
        &mut self,
        key: DofKey,
        increment: Real,
        reaction: Option<Real>,
    ) -> ModelResult<()>;
}
