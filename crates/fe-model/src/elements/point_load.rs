//! Nodal force condition.

use super::common::check_finite;
use crate::dof::DofKey;
use crate::element::{DesignVariable, DofValues, Element, LocalSystem};
use crate::error::ElementResult;
use fe_core::Real;
use nalgebra::DVector;

/// Constant external force on a single DOF. Contributes to the residual only.
#[derive(Debug, Clone)]
pub struct PointLoad {
    name: String,
    dofs: [DofKey; 1],
    pub magnitude: Real,
    design: Option<DesignVariable>,
}

impl PointLoad {
    pub fn new(name: impl Into<String>, dof: DofKey, magnitude: Real) -> Self {
        Self {
            name: name.into(),
            dofs: [dof],
            magnitude,
            design: None,
        }
    }

    /// Expose `magnitude` as a design variable for sensitivity analysis.
    pub fn with_design_variable(mut self, var: DesignVariable) -> Self {
        self.design = Some(var);
        self
    }
}

impl Element for PointLoad {
    fn name(&self) -> &str {
        &self.name
    }

    fn dofs(&self) -> &[DofKey] {
        &self.dofs
    }

    fn local_system(&self, _values: &dyn DofValues) -> ElementResult<LocalSystem> {
        check_finite(self.magnitude, "point load magnitude")?;
        let mut sys = LocalSystem::zeros(1);
        sys.rhs[0] = self.magnitude;
        Ok(sys)
    }

    fn residual_sensitivity(
        &self,
        var: &DesignVariable,
        _values: &dyn DofValues,
    ) -> ElementResult<Option<DVector<Real>>> {
        if self.design.as_ref() != Some(var) {
            return Ok(None);
        }
        Ok(Some(DVector::from_element(1, 1.0)))
    }
}
