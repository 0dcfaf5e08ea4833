//! Incremental model builder.

use std::collections::BTreeMap;

use fe_core::{ElementId, Id, NodeId, Real};

use crate::dof::{DofKey, DofState, Variable};
use crate::element::Element;
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, Node};
use crate::revision::next_revision;
use crate::validate;

/// Builder for constructing a model incrementally.
///
/// Use `add_node`, `add_dof`, `add_element` and `add_condition` to build up
/// the model, then call `build()` to validate it.
#[derive(Default)]
pub struct ModelBuilder {
    nodes: Vec<Node>,
    dofs: BTreeMap<DofKey, DofState>,
    elements: Vec<Box<dyn Element>>,
    conditions: Vec<Box<dyn Element>>,
    fixes: Vec<(DofKey, Real)>,
    values: Vec<(DofKey, Real)>,
    capacity_exceeded: Option<&'static str>,
}

/// Id for the next entity stored at `index`. Past [`Id::MAX_INDEX`] the
/// overflow is recorded and reported by `build()`.
fn entity_id(index: usize, what: &'static str, overflow: &mut Option<&'static str>) -> Id {
    Id::try_from_index(index).unwrap_or_else(|| {
        overflow.get_or_insert(what);
        Id::from_index(Id::MAX_INDEX)
    })
}

impl ModelBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its ID.
    pub fn add_node(&mut self, coordinates: [Real; 3]) -> NodeId {
        let id: NodeId = entity_id(self.nodes.len(), "nodes", &mut self.capacity_exceeded);
        self.nodes.push(Node { id, coordinates });
        id
    }

    /// Register a DOF on a node and return its key.
    pub fn add_dof(&mut self, node: NodeId, variable: Variable) -> DofKey {
        let key = DofKey::new(node, variable);
        self.dofs.entry(key).or_default();
        key
    }

    /// Add an element; its DOFs are registered automatically.
    pub fn add_element(&mut self, element: Box<dyn Element>) -> ElementId {
        let id: ElementId = entity_id(self.elements.len(), "elements", &mut self.capacity_exceeded);
        for &key in element.dofs() {
            self.dofs.entry(key).or_default();
        }
        self.elements.push(element);
        id
    }

    /// Add a condition (load, boundary term); its DOFs are registered automatically.
    pub fn add_condition(&mut self, condition: Box<dyn Element>) -> ElementId {
        let id: ElementId =
            entity_id(self.conditions.len(), "conditions", &mut self.capacity_exceeded);
        for &key in condition.dofs() {
            self.dofs.entry(key).or_default();
        }
        self.conditions.push(condition);
        id
    }

    /// Prescribe the value of a DOF. Unknown keys are reported by `build()`.
    pub fn fix(&mut self, key: DofKey, value: Real) {
        self.fixes.push((key, value));
    }

    /// Set the initial value of a DOF. Unknown keys are reported by `build()`.
    pub fn set_value(&mut self, key: DofKey, value: Real) {
        self.values.push((key, value));
    }

    /// Build and validate the model.
    pub fn build(mut self) -> ModelResult<Model> {
        if let Some(what) = self.capacity_exceeded {
            return Err(ModelError::CapacityExceeded {
                what,
                limit: Id::MAX_INDEX as usize + 1,
            });
        }
        validate::validate_structure(&self.nodes, &self.dofs, &self.elements, &self.conditions)?;

        for (key, value) in self.values {
            let state = self
                .dofs
                .get_mut(&key)
                .ok_or(ModelError::UnknownDof { key })?;
            state.value = value;
        }
        for (key, target) in self.fixes {
            let state = self
                .dofs
                .get_mut(&key)
                .ok_or(ModelError::UnknownDof { key })?;
            state.fixed = true;
            state.prescribed_increment = target - state.value;
        }

        Ok(Model {
            nodes: self.nodes,
            dofs: self.dofs,
            elements: self.elements,
            conditions: self.conditions,
            revision: next_revision(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{PointLoad, Spring};

    #[test]
    fn builder_basic() {
        let mut builder = ModelBuilder::new();
        let n1 = builder.add_node([0.0; 3]);
        let n2 = builder.add_node([1.0, 0.0, 0.0]);
        let a = builder.add_dof(n1, Variable::DisplacementX);
        let b = DofKey::new(n2, Variable::DisplacementX);
        let e1 = builder.add_element(Box::new(Spring::new("s", a, b, 1.0)));

        assert_eq!(n1.index(), 0);
        assert_eq!(n2.index(), 1);
        assert_eq!(e1.index(), 0);
        assert_eq!(builder.dofs.len(), 2);
    }

    #[test]
    fn id_overflow_is_reported_by_build() {
        let mut overflow = None;
        let last = entity_id(Id::MAX_INDEX as usize, "elements", &mut overflow);
        assert_eq!(last.index(), Id::MAX_INDEX);
        assert_eq!(overflow, None);
        entity_id(Id::MAX_INDEX as usize + 1, "elements", &mut overflow);
        assert_eq!(overflow, Some("elements"));

        let mut builder = ModelBuilder::new();
        builder.add_node([0.0; 3]);
        builder.capacity_exceeded = overflow;
        let err = builder.build().err().unwrap();
        assert!(matches!(err, ModelError::CapacityExceeded { what: "elements", .. }));
    }

    #[test]
    fn builder_applies_values_before_fixes() {
        let mut builder = ModelBuilder::new();
        let n = builder.add_node([0.0; 3]);
        let u = builder.add_dof(n, Variable::DisplacementX);
        builder.fix(u, 1.0);
        builder.set_value(u, 0.25);
        let model = builder.build().unwrap();

        let state = model.dof(u).unwrap();
        assert!(state.fixed);
        assert_eq!(state.value, 0.25);
        assert_eq!(state.prescribed_increment, 0.75);
    }

    #[test]
    fn fixing_unknown_dof_fails() {
        let mut builder = ModelBuilder::new();
        let n = builder.add_node([0.0; 3]);
        builder.fix(DofKey::new(n, Variable::Temperature), 0.0);
        let err = builder.build().err().unwrap();
        assert!(matches!(err, ModelError::UnknownDof { .. }));
    }

    #[test]
    fn condition_on_unknown_node_fails() {
        let mut builder = ModelBuilder::new();
        builder.add_node([0.0; 3]);
        let ghost = DofKey::new(NodeId::from_index(9), Variable::DisplacementX);
        builder.add_condition(Box::new(PointLoad::new("p", ghost, 1.0)));
        let err = builder.build().err().unwrap();
        assert!(matches!(err, ModelError::UnknownNode { .. }));
    }
}
