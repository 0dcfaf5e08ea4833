//! Small-strain two-node bar in the plane.

use super::common::check_finite;
use crate::dof::{DofKey, Variable};
use crate::element::{DesignVariable, DofValues, Element, LocalSystem, gather};
use crate::error::{ElementError, ElementResult};
use fe_core::{NodeId, Real};
use nalgebra::{DMatrix, DVector};

/// Linear truss bar with axial rigidity `EA`.
///
/// DOF order: `[a.x, a.y, b.x, b.y]`.
#[derive(Debug, Clone)]
pub struct Truss2D {
    name: String,
    dofs: [DofKey; 4],
    /// Unit-rigidity stiffness `K / EA`, fixed by the geometry.
    unit_stiffness: DMatrix<Real>,
    /// Axial rigidity
    pub axial_rigidity: Real,
    design: Option<DesignVariable>,
}

impl Truss2D {
    /// Create a bar between two nodes at the given positions.
    pub fn new(
        name: impl Into<String>,
        nodes: [NodeId; 2],
        positions: [[Real; 2]; 2],
        axial_rigidity: Real,
    ) -> ElementResult<Self> {
        let dx = positions[1][0] - positions[0][0];
        let dy = positions[1][1] - positions[0][1];
        let length = (dx * dx + dy * dy).sqrt();
        check_finite(length, "truss length")?;
        check_finite(axial_rigidity, "truss axial rigidity")?;
        if length <= 0.0 {
            return Err(ElementError::NonPhysical {
                what: "truss length",
            });
        }

        let (c, s) = (dx / length, dy / length);
        let (cc, cs, ss) = (c * c / length, c * s / length, s * s / length);
        #[rustfmt::skip]
        let unit_stiffness = DMatrix::from_row_slice(4, 4, &[
             cc,  cs, -cc, -cs,
             cs,  ss, -cs, -ss,
            -cc, -cs,  cc,  cs,
            -cs, -ss,  cs,  ss,
        ]);

        Ok(Self {
            name: name.into(),
            dofs: [
                DofKey::new(nodes[0], Variable::DisplacementX),
                DofKey::new(nodes[0], Variable::DisplacementY),
                DofKey::new(nodes[1], Variable::DisplacementX),
                DofKey::new(nodes[1], Variable::DisplacementY),
            ],
            unit_stiffness,
            axial_rigidity,
            design: None,
        })
    }

    /// Expose `axial_rigidity` as a design variable for sensitivity analysis.
    pub fn with_design_variable(mut self, var: DesignVariable) -> Self {
        self.design = Some(var);
        self
    }
}

impl Element for Truss2D {
    fn name(&self) -> &str {
        &self.name
    }

    fn dofs(&self) -> &[DofKey] {
        &self.dofs
    }

    fn local_system(&self, values: &dyn DofValues) -> ElementResult<LocalSystem> {
        let u = gather(&self.name, &self.dofs, values)?;
        let lhs = &self.unit_stiffness * self.axial_rigidity;
        let rhs = -(&lhs * u);
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
        let u = gather(&self.name, &self.dofs, values)?;
        Ok(Some(-(&self.unit_stiffness * u)))
    }
}
