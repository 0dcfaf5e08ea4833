//! Degree-of-freedom identity and state.

use core::fmt;
use fe_core::{NodeId, Real};

/// Physical variable carried by a DOF.
///
/// The declaration order is part of the DOF total order (node first, then
/// variable), so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    DisplacementX,
    DisplacementY,
    DisplacementZ,
    RotationX,
    RotationY,
    RotationZ,
    Temperature,
}

impl Variable {
    pub fn name(self) -> &'static str {
        match self {
            Variable::DisplacementX => "DISPLACEMENT_X",
            Variable::DisplacementY => "DISPLACEMENT_Y",
            Variable::DisplacementZ => "DISPLACEMENT_Z",
            Variable::RotationX => "ROTATION_X",
            Variable::RotationY => "ROTATION_Y",
            Variable::RotationZ => "ROTATION_Z",
            Variable::Temperature => "TEMPERATURE",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies one scalar unknown: a (node, variable) pair.
///
/// Ordering is by node id, then variable. The DOF registry relies on this
/// order for reproducible equation numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DofKey {
    pub node: NodeId,
    pub variable: Variable,
}

impl DofKey {
    pub fn new(node: NodeId, variable: Variable) -> Self {
        Self { node, variable }
    }
}

impl fmt::Display for DofKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.variable)
    }
}

/// Mutable per-DOF data owned by the model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DofState {
    /// Prescribed (Dirichlet) DOF.
    pub fixed: bool,
    /// Current value.
    pub value: Real,
    /// Increment still to be imposed on a fixed DOF by the next solve.
    pub prescribed_increment: Real,
    /// Reaction from the last solve; zero for free DOFs or when reactions
    /// were not computed.
    pub reaction: Real,
    /// Free equation index from the last registry attach; `None` for fixed,
    /// slave, or unregistered DOFs.
    pub equation_id: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fe_core::Id;

    #[test]
    fn dof_keys_order_by_node_then_variable() {
        let a = DofKey::new(Id::from_index(0), Variable::DisplacementY);
        let b = DofKey::new(Id::from_index(1), Variable::DisplacementX);
        let c = DofKey::new(Id::from_index(0), Variable::DisplacementX);
        let mut keys = vec![a, b, c];
        keys.sort();
        assert_eq!(keys, vec![c, a, b]);
    }

    #[test]
    fn dof_key_display() {
        let key = DofKey::new(Id::from_index(4), Variable::RotationZ);
        assert_eq!(key.to_string(), "4:ROTATION_Z");
    }
}
