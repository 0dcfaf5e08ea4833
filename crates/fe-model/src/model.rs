//! In-memory model: nodes, DOF table, elements and conditions.

use crate::dof::{DofKey, DofState};
use crate::element::{DofValues, Element};
use crate::error::{ModelError, ModelResult};
use crate::provider::ModelProvider;
use crate::revision::next_revision;
use fe_core::{NodeId, Real};
use std::collections::BTreeMap;

/// A mesh node. Geometry is carried only for elements that need it.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub coordinates: [Real; 3],
}

/// A validated model. Built through [`crate::ModelBuilder`].
///
/// The DOF table is ordered by [`DofKey`], so iteration is deterministic.
pub struct Model {
    pub(crate) nodes: Vec<Node>,
    pub(crate) dofs: BTreeMap<DofKey, DofState>,
    pub(crate) elements: Vec<Box<dyn Element>>,
    pub(crate) conditions: Vec<Box<dyn Element>>,
    pub(crate) revision: u64,
}

impl Model {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get a node by ID (returns None if ID out of bounds).
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index() as usize)
    }

    pub fn dof(&self, key: DofKey) -> Option<&DofState> {
        self.dofs.get(&key)
    }

    /// Iterate over the DOF table in key order.
    pub fn dofs(&self) -> impl Iterator<Item = (&DofKey, &DofState)> {
        self.dofs.iter()
    }

    pub fn elements(&self) -> &[Box<dyn Element>] {
        &self.elements
    }

    pub fn conditions(&self) -> &[Box<dyn Element>] {
        &self.conditions
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn dof_mut(&mut self, key: DofKey) -> ModelResult<&mut DofState> {
        self.dofs
            .get_mut(&key)
            .ok_or(ModelError::UnknownDof { key })
    }

    /// Prescribe `key` to reach `target` after the next solve.
    ///
    /// Fixing a free DOF changes the active DOF set and bumps the revision;
    /// re-fixing an already fixed DOF only updates the prescribed increment.
    pub fn fix(&mut self, key: DofKey, target: Real) -> ModelResult<()> {
        let state = self.dof_mut(key)?;
        let newly_fixed = !state.fixed;
        state.fixed = true;
        state.prescribed_increment = target - state.value;
        if newly_fixed {
            self.revision = next_revision();
        }
        Ok(())
    }

    /// Release a fixed DOF.
    pub fn free(&mut self, key: DofKey) -> ModelResult<()> {
        let state = self.dof_mut(key)?;
        if state.fixed {
            state.fixed = false;
            state.prescribed_increment = 0.0;
            self.revision = next_revision();
        }
        Ok(())
    }

    /// Overwrite the current value of a DOF (initial conditions).
    pub fn set_value(&mut self, key: DofKey, value: Real) -> ModelResult<()> {
        let state = self.dof_mut(key)?;
        if state.fixed {
            state.prescribed_increment += state.value - value;
        }
        state.value = value;
        Ok(())
    }

    /// Remove a DOF from the table. Elements still referencing it make the
    /// model inconsistent until they are removed too.
    pub fn remove_dof(&mut self, key: DofKey) -> ModelResult<DofState> {
        let state = self
            .dofs
            .remove(&key)
            .ok_or(ModelError::UnknownDof { key })?;
        self.revision = next_revision();
        Ok(state)
    }

    /// Add an element after construction (topology change).
    pub fn add_element(&mut self, element: Box<dyn Element>) -> ModelResult<()> {
        crate::validate::validate_element(&self.nodes, &*element)?;
        for &key in element.dofs() {
            self.dofs.entry(key).or_default();
        }
        self.elements.push(element);
        self.revision = next_revision();
        Ok(())
    }

    pub fn value(&self, key: DofKey) -> Option<Real> {
        self.dofs.get(&key).map(|s| s.value)
    }

    pub fn reaction(&self, key: DofKey) -> Option<Real> {
        self.dofs.get(&key).map(|s| s.reaction)
    }
}

impl DofValues for Model {
    fn value(&self, key: DofKey) -> Option<Real> {
        Model::value(self, key)
    }
}

impl ModelProvider for Model {
    fn topology_revision(&self) -> u64 {
        self.revision
    }

    fn elements(&self) -> &[Box<dyn Element>] {
        &self.elements
    }

    fn conditions(&self) -> &[Box<dyn Element>] {
        &self.conditions
    }

    fn dof_state(&self, key: DofKey) -> Option<&DofState> {
        self.dofs.get(&key)
    }

    fn assign_equation_id(&mut self, key: DofKey, id: Option<usize>) -> ModelResult<()> {
        self.dof_mut(key)?.equation_id = id;
        Ok(())
    }

    fn apply_increment(
        &mut self,
        key: DofKey,
        increment: Real,
        reaction: Option<Real>,
    ) -> ModelResult<()> {
        let state = self.dof_mut(key)?;
        state.value += increment;
        if state.fixed {
            state.prescribed_increment -= increment;
        }
        if let Some(r) = reaction {
            state.reaction = r;
        }
        Ok(())
    }
}
