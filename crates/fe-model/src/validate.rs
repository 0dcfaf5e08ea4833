//! Model validation logic.

use std::collections::{BTreeMap, HashSet};

use crate::dof::{DofKey, DofState};
use crate::element::Element;
use crate::error::{ModelError, ModelResult};
use crate::model::Node;

/// Validate the model structure: node ids, DOF owners, element DOF lists.
pub(crate) fn validate_structure(
    nodes: &[Node],
    dofs: &BTreeMap<DofKey, DofState>,
    elements: &[Box<dyn Element>],
    conditions: &[Box<dyn Element>],
) -> ModelResult<()> {
    // Node ids must be contiguous and match their storage index
    for (i, node) in nodes.iter().enumerate() {
        if node.id.index() as usize != i {
            return Err(ModelError::NodeIdMismatch {
                expected: i as u32,
                actual: node.id,
            });
        }
    }

    // Each DOF must belong to an existing node
    for key in dofs.keys() {
        if key.node.index() as usize >= nodes.len() {
            return Err(ModelError::UnknownNode { node: key.node });
        }
    }

    for element in elements.iter().chain(conditions) {
        validate_element(nodes, &**element)?;
    }

    Ok(())
}

/// Validate one element's DOF list: non-empty, distinct, on existing nodes.
pub(crate) fn validate_element(nodes: &[Node], element: &dyn Element) -> ModelResult<()> {
    let dofs = element.dofs();
    if dofs.is_empty() {
        return Err(ModelError::EmptyElement {
            element: element.name().to_string(),
        });
    }

    let mut seen: HashSet<DofKey> = HashSet::with_capacity(dofs.len());
    for &key in dofs {
        if key.node.index() as usize >= nodes.len() {
            return Err(ModelError::UnknownNode { node: key.node });
        }
        if !seen.insert(key) {
            return Err(ModelError::DuplicateDof {
                element: element.name().to_string(),
                key,
            });
        }
    }

    Ok(())
}
