//! DOF registry: deduplicated, ordered DOF set and equation numbering.

use crate::constraints::ConstraintTable;
use crate::error::{SolverError, SolverResult};
use fe_model::{DofKey, Element, ModelProvider};
use std::collections::BTreeSet;

/// Role of a registered DOF in the global system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DofClass {
    Free,
    Fixed,
    Slave,
}

/// Every DOF touched by an element, a condition or a constraint, in
/// `DofKey` order.
///
/// A DOF's position in [`DofRegistry::keys`] is its row in the raw system.
/// Free DOFs get equation ids `0..n_free`; fixed DOFs get condensed indices
/// `n_free..n_free + n_fixed`; slaves get neither.
#[derive(Debug, Clone, PartialEq)]
pub struct DofRegistry {
    keys: Vec<DofKey>,
    classes: Vec<DofClass>,
    condensed: Vec<Option<usize>>,
    n_free: usize,
    n_fixed: usize,
}

impl DofRegistry {
    pub fn build<M>(model: &M, table: &ConstraintTable) -> SolverResult<Self>
    where
        M: ModelProvider + ?Sized,
    {
        let mut members = BTreeSet::new();
        for element in model.elements().iter().chain(model.conditions()) {
            for &key in element.dofs() {
                if model.dof_state(key).is_none() {
                    return Err(SolverError::config(format!(
                        "DOF {key} required by '{}' is not defined in the model",
                        element.name()
                    )));
                }
                members.insert(key);
            }
        }
        for key in table.referenced_dofs() {
            if model.dof_state(key).is_none() {
                return Err(SolverError::config(format!(
                    "DOF {key} named by a constraint is not defined in the model"
                )));
            }
            members.insert(key);
        }

        let keys: Vec<DofKey> = members.into_iter().collect();
        let mut classes = Vec::with_capacity(keys.len());
        for &key in &keys {
            let fixed = model.dof_state(key).is_some_and(|s| s.fixed);
            let class = match (table.is_slave(key), fixed) {
                (true, true) => {
                    return Err(SolverError::config(format!(
                        "DOF {key} is both prescribed and a constraint slave"
                    )));
                }
                (true, false) => DofClass::Slave,
                (false, true) => DofClass::Fixed,
                (false, false) => DofClass::Free,
            };
            classes.push(class);
        }

        let n_free = classes.iter().filter(|&&c| c == DofClass::Free).count();
        let mut next_free = 0;
        let mut next_fixed = n_free;
        let condensed = classes
            .iter()
            .map(|class| match class {
                DofClass::Free => {
                    next_free += 1;
                    Some(next_free - 1)
                }
                DofClass::Fixed => {
                    next_fixed += 1;
                    Some(next_fixed - 1)
                }
                DofClass::Slave => None,
            })
            .collect();

        Ok(Self {
            keys,
            classes,
            condensed,
            n_free,
            n_fixed: next_fixed - n_free,
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of free equations (the public system size).
    pub fn n_free(&self) -> usize {
        self.n_free
    }

    pub fn n_fixed(&self) -> usize {
        self.n_fixed
    }

    pub fn n_slave(&self) -> usize {
        self.keys.len() - self.n_free - self.n_fixed
    }

    /// Size of the condensed system (free and fixed DOFs).
    pub fn n_condensed(&self) -> usize {
        self.n_free + self.n_fixed
    }

    pub fn keys(&self) -> &[DofKey] {
        &self.keys
    }

    /// Raw position of `key`.
    pub fn position(&self, key: DofKey) -> Option<usize> {
        self.keys.binary_search(&key).ok()
    }

    pub fn class(&self, position: usize) -> DofClass {
        self.classes[position]
    }

    pub fn class_of(&self, key: DofKey) -> Option<DofClass> {
        self.position(key).map(|p| self.classes[p])
    }

    /// Condensed index of the DOF at raw `position`; `None` for slaves.
    pub fn condensed_index(&self, position: usize) -> Option<usize> {
        self.condensed[position]
    }

    /// Free equation id of `key`; `None` unless the DOF is free.
    pub fn equation_id(&self, key: DofKey) -> Option<usize> {
        let p = self.position(key)?;
        match self.classes[p] {
            DofClass::Free => self.condensed[p],
            _ => None,
        }
    }

    /// Raw positions of an element's DOFs, in local order.
    pub fn element_positions(&self, element: &dyn Element) -> SolverResult<Vec<usize>> {
        element
            .dofs()
            .iter()
            .map(|&key| {
                self.position(key).ok_or_else(|| {
                    SolverError::consistency(format!(
                        "DOF {key} of '{}' is not registered",
                        element.name()
                    ))
                })
            })
            .collect()
    }

    /// Write free equation ids (or `None`) back into the model.
    pub fn attach<M>(&self, model: &mut M) -> SolverResult<()>
    where
        M: ModelProvider + ?Sized,
    {
        for (p, &key) in self.keys.iter().enumerate() {
            let id = match self.classes[p] {
                DofClass::Free => self.condensed[p],
                _ => None,
            };
            model.assign_equation_id(key, id)?;
        }
        Ok(())
    }
}
