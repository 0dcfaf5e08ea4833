//! Constraint table: validated, flattened master-slave relations.
//!
//! Chains (a slave used as a master elsewhere) are flattened by repeated
//! substitution until every master is an independent DOF. The number of
//! substitution passes is bounded by the number of relations plus one; a
//! relation that ends up depending on its own slave, or a table that does not
//! settle within the bound, is a cyclic configuration and is rejected.

use crate::error::{SolverError, SolverResult};
use fe_core::Real;
use fe_model::{ConstraintProvider, DofKey, DofValues, MasterSlaveConstraint};
use std::collections::{BTreeMap, BTreeSet};

/// A slave expressed directly in terms of independent masters.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRelation {
    /// Masters sorted by key; none of them is a slave.
    pub masters: Vec<(DofKey, Real)>,
    pub constant: Real,
}

impl FlatRelation {
    /// `sum(w * value(master)) + constant`
    pub fn evaluate(&self, values: &dyn DofValues) -> Option<Real> {
        let mut acc = self.constant;
        for &(m, w) in &self.masters {
            acc += w * values.value(m)?;
        }
        Some(acc)
    }
}

/// Flattened constraint relations keyed by slave DOF.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintTable {
    relations: BTreeMap<DofKey, FlatRelation>,
    passes: usize,
}

impl ConstraintTable {
    pub fn from_provider<C: ConstraintProvider + ?Sized>(provider: &C) -> SolverResult<Self> {
        Self::build(provider.constraints())
    }

    /// Validate and flatten a set of relations.
    pub fn build(relations: &[MasterSlaveConstraint]) -> SolverResult<Self> {
        let mut table: BTreeMap<DofKey, FlatRelation> = BTreeMap::new();

        for rel in relations {
            if !rel.constant.is_finite() {
                return Err(SolverError::config(format!(
                    "constraint on {} has non-finite constant {}",
                    rel.slave, rel.constant
                )));
            }
            let mut merged: BTreeMap<DofKey, Real> = BTreeMap::new();
            for &(master, weight) in &rel.masters {
                if master == rel.slave {
                    return Err(SolverError::config(format!(
                        "constraint on {} uses the slave as its own master",
                        rel.slave
                    )));
                }
                if !weight.is_finite() {
                    return Err(SolverError::config(format!(
                        "constraint on {} has non-finite weight {} for master {}",
                        rel.slave, weight, master
                    )));
                }
                *merged.entry(master).or_insert(0.0) += weight;
            }

            let flat = FlatRelation {
                masters: merged.into_iter().collect(),
                constant: rel.constant,
            };
            if table.insert(rel.slave, flat).is_some() {
                return Err(SolverError::config(format!(
                    "DOF {} is the slave of more than one constraint",
                    rel.slave
                )));
            }
        }

        let passes = flatten(&mut table)?;
        Ok(Self {
            relations: table,
            passes,
        })
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Substitution passes needed to flatten the input chains.
    pub fn flatten_passes(&self) -> usize {
        self.passes
    }

    pub fn relation(&self, slave: DofKey) -> Option<&FlatRelation> {
        self.relations.get(&slave)
    }

    pub fn is_slave(&self, key: DofKey) -> bool {
        self.relations.contains_key(&key)
    }

    /// Slave DOFs in key order.
    pub fn slaves(&self) -> impl Iterator<Item = DofKey> + '_ {
        self.relations.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DofKey, &FlatRelation)> {
        self.relations.iter()
    }

    /// Every DOF named by the table, slaves and masters.
    pub fn referenced_dofs(&self) -> BTreeSet<DofKey> {
        let mut dofs = BTreeSet::new();
        for (&slave, rel) in &self.relations {
            dofs.insert(slave);
            dofs.extend(rel.masters.iter().map(|&(m, _)| m));
        }
        dofs
    }

    /// Constant to use for `slave` when solving for increments.
    ///
    /// `c + sum(w * u_m) - u_s` at the current state, so that after the
    /// increments are applied the relation holds exactly even if the current
    /// state violates it.
    pub fn increment_offset(&self, slave: DofKey, values: &dyn DofValues) -> SolverResult<Real> {
        let rel = self
            .relations
            .get(&slave)
            .ok_or_else(|| SolverError::config(format!("DOF {slave} is not a slave")))?;
        let target = rel.evaluate(values).ok_or_else(|| {
            SolverError::config(format!("a master of {slave} has no value in the model"))
        })?;
        let current = values
            .value(slave)
            .ok_or_else(|| SolverError::config(format!("slave {slave} has no value in the model")))?;
        Ok(target - current)
    }

    /// [`ConstraintTable::increment_offset`] for every slave.
    pub fn increment_offsets(&self, values: &dyn DofValues) -> SolverResult<BTreeMap<DofKey, Real>> {
        self.slaves()
            .map(|slave| Ok((slave, self.increment_offset(slave, values)?)))
            .collect()
    }

    /// Largest `|u_s - (sum(w * u_m) + c)|` over all relations.
    pub fn max_violation(&self, values: &dyn DofValues) -> Option<Real> {
        let mut worst: Real = 0.0;
        for (&slave, rel) in &self.relations {
            let target = rel.evaluate(values)?;
            worst = worst.max((values.value(slave)? - target).abs());
        }
        Some(worst)
    }
}

/// Substitute slave masters until every master is independent.
///
/// Returns the number of passes that performed substitutions.
fn flatten(table: &mut BTreeMap<DofKey, FlatRelation>) -> SolverResult<usize> {
    let bound = table.len() + 1;

    for pass in 0..=bound {
        let pending: Vec<DofKey> = table
            .iter()
            .filter(|(_, rel)| rel.masters.iter().any(|(m, _)| table.contains_key(m)))
            .map(|(&slave, _)| slave)
            .collect();
        if pending.is_empty() {
            return Ok(pass);
        }
        if pass == bound {
            return Err(SolverError::config(format!(
                "constraint chains did not settle after {bound} substitution passes (cycle through {})",
                pending[0]
            )));
        }

        for slave in pending {
            let Some(rel) = table.get(&slave).cloned() else {
                continue;
            };
            let mut merged: BTreeMap<DofKey, Real> = BTreeMap::new();
            let mut constant = rel.constant;
            for (master, weight) in rel.masters {
                match table.get(&master) {
                    Some(inner) => {
                        for &(m, w) in &inner.masters {
                            *merged.entry(m).or_insert(0.0) += weight * w;
                        }
                        constant += weight * inner.constant;
                    }
                    None => *merged.entry(master).or_insert(0.0) += weight,
                }
            }
            if merged.contains_key(&slave) {
                return Err(SolverError::config(format!(
                    "cyclic constraint chain through DOF {slave}"
                )));
            }
            table.insert(
                slave,
                FlatRelation {
                    masters: merged.into_iter().collect(),
                    constant,
                },
            );
        }
    }

    Ok(bound)
}
