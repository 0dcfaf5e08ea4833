//! Master-slave constraint relations.

use crate::dof::DofKey;
use crate::revision::next_revision;
use fe_core::Real;

/// `slave = sum_i(weight_i * master_i) + constant`
#[derive(Debug, Clone, PartialEq)]
pub struct MasterSlaveConstraint {
    pub slave: DofKey,
    pub masters: Vec<(DofKey, Real)>,
    pub constant: Real,
}

impl MasterSlaveConstraint {
    pub fn new(slave: DofKey, masters: Vec<(DofKey, Real)>, constant: Real) -> Self {
        Self {
            slave,
            masters,
            constant,
        }
    }

    /// `slave = master`
    pub fn tie(slave: DofKey, master: DofKey) -> Self {
        Self::new(slave, vec![(master, 1.0)], 0.0)
    }
}

/// Source of the constraint relations active for a solve.
pub trait ConstraintProvider {
    /// Stamp that changes whenever the relation set changes.
    fn constraint_revision(&self) -> u64;

    fn constraints(&self) -> &[MasterSlaveConstraint];
}

/// Owned, revisioned collection of constraint relations.
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    relations: Vec<MasterSlaveConstraint>,
    revision: u64,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self {
            relations: Vec::new(),
            revision: next_revision(),
        }
    }

    pub fn from_relations(relations: Vec<MasterSlaveConstraint>) -> Self {
        Self {
            relations,
            revision: next_revision(),
        }
    }

    pub fn add(&mut self, relation: MasterSlaveConstraint) {
        self.relations.push(relation);
        self.revision = next_revision();
    }

    pub fn clear(&mut self) {
        self.relations.clear();
        self.revision = next_revision();
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

impl ConstraintProvider for ConstraintSet {
    fn constraint_revision(&self) -> u64 {
        self.revision
    }

    fn constraints(&self) -> &[MasterSlaveConstraint] {
        &self.relations
    }
}
