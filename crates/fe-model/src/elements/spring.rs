//! Two-DOF axial spring.

use super::common::check_finite;
use crate::dof::DofKey;
use crate::element::{DesignVariable, DofValues, Element, LocalSystem, gather};
use crate::error::ElementResult;
use fe_core::Real;
use nalgebra::{DMatrix, DVector};

/// Spring between two DOFs with force `f = k*d + k3*d^3`, `d = u_b - u_a`.
///
/// With `cubic == 0` the spring is linear and one solve is exact.
#[derive(Debug, Clone)]
pub struct Spring {
    name: String,
    dofs: [DofKey; 2],
    /// Linear stiffness
    pub stiffness: Real,
    /// Cubic hardening coefficient
    pub cubic: Real,
    design: Option<DesignVariable>,
}

impl Spring {
    pub fn new(name: impl Into<String>, a: DofKey, b: DofKey, stiffness: Real) -> Self {
        Self {
            name: name.into(),
            dofs: [a, b],
            stiffness,
            cubic: 0.0,
            design: None,
        }
    }

    pub fn with_cubic(mut self, cubic: Real) -> Self {
        self.cubic = cubic;
        self
    }

    /// Expose `stiffness` as a design variable for sensitivity analysis.
    pub fn with_design_variable(mut self, var: DesignVariable) -> Self {
        self.design = Some(var);
        self
    }

    fn elongation(&self, values: &dyn DofValues) -> ElementResult<Real> {
        let u = gather(&self.name, &self.dofs, values)?;
        Ok(u[1] - u[0])
    }
}

impl Element for Spring {
    fn name(&self) -> &str {
        &self.name
    }

    fn dofs(&self) -> &[DofKey] {
        &self.dofs
    }

    fn local_system(&self, values: &dyn DofValues) -> ElementResult<LocalSystem> {
        check_finite(self.stiffness, "spring stiffness")?;
        check_finite(self.cubic, "spring cubic coefficient")?;

        let d = self.elongation(values)?;
        let force = self.stiffness * d + self.cubic * d * d * d;
        let tangent = self.stiffness + 3.0 * self.cubic * d * d;
        check_finite(force, "spring force")?;

        #[rustfmt::skip]
        let lhs = DMatrix::from_row_slice(2, 2, &[
             tangent, -tangent,
            -tangent,  tangent,
        ]);
        // R = -f_int, f_int = [-force, force]
        let rhs = DVector::from_column_slice(&[force, -force]);
        Ok(LocalSystem { lhs, rhs })
    }

    fn residual_sensitivity(
        &self,
        var: &DesignVariable,
        values: &dyn DofValues,
    ) -> ElementResult<Option<DVector<Real>>> {
        if self.design.as_ref() != Some(var) {
            return Ok(None);
        }
        let d = self.elongation(values)?;
        Ok(Some(DVector::from_column_slice(&[d, -d])))
    }
}
