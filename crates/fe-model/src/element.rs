//! Core traits for elements and conditions.

use crate::dof::DofKey;
use crate::error::{ElementError, ElementResult};
use core::fmt;
use fe_core::Real;
use nalgebra::{DMatrix, DVector};
use std::collections::{BTreeMap, HashMap};

/// Read access to current DOF values.
pub trait DofValues {
    /// Current value of `key`, or `None` if the DOF is unknown.
    fn value(&self, key: DofKey) -> Option<Real>;
}

impl DofValues for HashMap<DofKey, Real> {
    fn value(&self, key: DofKey) -> Option<Real> {
        self.get(&key).copied()
    }
}

impl DofValues for BTreeMap<DofKey, Real> {
    fn value(&self, key: DofKey) -> Option<Real> {
        self.get(&key).copied()
    }
}

/// Named model parameter with respect to which sensitivities are computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DesignVariable(pub String);

impl DesignVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DesignVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local tangent and residual of one element, ordered like `Element::dofs`.
///
/// `lhs` is the tangent `-dR/du`, `rhs` the residual `R = f_ext - f_int`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSystem {
    pub lhs: DMatrix<Real>,
    pub rhs: DVector<Real>,
}

impl LocalSystem {
    pub fn zeros(n: usize) -> Self {
        Self {
            lhs: DMatrix::zeros(n, n),
            rhs: DVector::zeros(n),
        }
    }

    /// Check that the system is `n x n` with an `n`-vector residual.
    pub fn check_shape(&self, n: usize) -> ElementResult<()> {
        if self.lhs.nrows() != n || self.lhs.ncols() != n || self.rhs.len() != n {
            return Err(ElementError::Shape {
                expected: n,
                rows: self.lhs.nrows(),
                cols: self.lhs.ncols(),
                rhs: self.rhs.len(),
            });
        }
        Ok(())
    }
}

/// An element or condition contributing to the global system.
///
/// Elements are deterministic functions of the current DOF values, suitable
/// for parallel evaluation during assembly.
pub trait Element: Send + Sync {
    /// Element name for debugging and identification.
    fn name(&self) -> &str;

    /// DOFs of this element. The position in this slice is the local index
    /// of the rows/columns returned by [`Element::local_system`].
    fn dofs(&self) -> &[DofKey];

    /// Compute the local tangent and residual at the current state.
    fn local_system(&self, values: &dyn DofValues) -> ElementResult<LocalSystem>;

    /// Optional: derivative of the local residual with respect to `var`.
    ///
    /// Returns `Ok(None)` when the element does not depend on `var`.
    fn residual_sensitivity(
        &self,
        _var: &DesignVariable,
        _values: &dyn DofValues,
    ) -> ElementResult<Option<DVector<Real>>> {
        Ok(None)
    }
}

/// Collect the current values of an element's DOFs.
pub fn gather(
    element: &str,
    dofs: &[DofKey],
    values: &dyn DofValues,
) -> ElementResult<DVector<Real>> {
    let mut u = DVector::zeros(dofs.len());
    for (i, &key) in dofs.iter().enumerate() {
        u[i] = values.value(key).ok_or_else(|| ElementError::MissingDof {
            element: element.to_string(),
            key,
        })?;
    }
    Ok(u)
}
