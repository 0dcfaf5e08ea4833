//! Adjoint sensitivities.
//!
//! For a response `J(u, p)` at an equilibrium state the adjoint `λ` solves
//! `Aᵀ λ = ∂J/∂u` with the same condensation as the primal solve, but with
//! homogeneous constraints and homogeneous Dirichlet conditions. The total
//! derivative is then `dJ/dp = ∂J/∂p + Σ_e λ_eᵀ ∂R_e/∂p`.

use crate::assembler::{RawSystem, assemble};
use crate::builder_and_solver::{BuilderAndSolver, solve_linear};
use crate::condenser::condense;
use crate::dirichlet::apply_dirichlet;
use crate::error::{SolverError, SolverResult};
use crate::linear::spmv;
use fe_core::{Real, relative_residual};
use fe_model::{ConstraintProvider, DesignVariable, DofKey, DofValues, ModelProvider};
use nalgebra::DVector;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// A scalar response function of the DOF values.
pub trait AdjointResponse: Sync {
    fn name(&self) -> &str;

    /// Current value of the response, if it can be evaluated.
    fn value(&self, values: &dyn DofValues) -> Option<Real>;

    /// Nonzero entries of `∂J/∂u`.
    fn dof_gradient(&self, values: &dyn DofValues) -> Vec<(DofKey, Real)>;

    /// Explicit `∂J/∂p`.
    fn partial_sensitivity(&self, _var: &DesignVariable, _values: &dyn DofValues) -> Real {
        0.0
    }
}

/// `J = u(dof)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodalDisplacementResponse {
    pub dof: DofKey,
}

impl NodalDisplacementResponse {
    pub fn new(dof: DofKey) -> Self {
        Self { dof }
    }
}

impl AdjointResponse for NodalDisplacementResponse {
    fn name(&self) -> &str {
        "nodal_displacement"
    }

    fn value(&self, values: &dyn DofValues) -> Option<Real> {
        values.value(self.dof)
    }

    fn dof_gradient(&self, _values: &dyn DofValues) -> Vec<(DofKey, Real)> {
        vec![(self.dof, 1.0)]
    }
}

/// Adjoint variables of one response.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjointSolution {
    pub response: String,
    /// `λ` for every registered DOF; zero at fixed DOFs
    pub lambda: BTreeMap<DofKey, Real>,
    pub solver: String,
    pub system_size: usize,
    pub relative_residual: Real,
}

impl AdjointSolution {
    pub fn lambda(&self, key: DofKey) -> Option<Real> {
        self.lambda.get(&key).copied()
    }

    /// `Σ_e λ_eᵀ ∂R_e/∂p` over elements and conditions.
    pub fn residual_contribution<M>(&self, model: &M, var: &DesignVariable) -> SolverResult<Real>
    where
        M: ModelProvider,
    {
        model
            .elements()
            .par_iter()
            .chain(model.conditions().par_iter())
            .map(|element| -> SolverResult<Real> {
                let dr = element
                    .residual_sensitivity(var, model)
                    .map_err(|source| SolverError::Element {
                        element: element.name().to_string(),
                        source,
                    })?;
                let Some(dr) = dr else {
                    return Ok(0.0);
                };
                let dofs = element.dofs();
                if dr.len() != dofs.len() {
                    return Err(SolverError::Numeric {
                        what: format!(
                            "'{}' returned {} residual derivatives for {} DOFs",
                            element.name(),
                            dr.len(),
                            dofs.len()
                        ),
                    });
                }
                Ok(dofs
                    .iter()
                    .zip(dr.iter())
                    .map(|(key, d)| self.lambda.get(key).copied().unwrap_or(0.0) * d)
                    .sum())
            })
            .try_reduce(|| 0.0, |a, b| Ok(a + b))
    }
}

impl BuilderAndSolver {
    /// Solve `Aᵀ λ = ∂J/∂u` at the current state of `model`.
    pub fn solve_adjoint<M, C>(
        &mut self,
        model: &M,
        constraints: &C,
        response: &dyn AdjointResponse,
    ) -> SolverResult<AdjointSolution>
    where
        M: ModelProvider,
        C: ConstraintProvider + ?Sized,
    {
        self.setup(model, constraints)?;
        let config = self.config().clone();
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| SolverError::consistency("builder used before setup"))?;
        let registry = &cache.registry;

        let primal = assemble(model, registry, cache.graph.raw(), config.assembly)?;
        let mut gradient = DVector::zeros(registry.len());
        for (key, g) in response.dof_gradient(model) {
            let p = registry.position(key).ok_or_else(|| {
                SolverError::config(format!(
                    "response '{}' depends on DOF {key}, which no element uses",
                    response.name()
                ))
            })?;
            gradient[p] += g;
        }
        let adjoint = RawSystem {
            lhs: primal.lhs.transpose(),
            rhs: gradient,
        };

        let condensed = condense(&adjoint, &cache.map, cache.graph.condensed(), None)?;
        let system = apply_dirichlet(
            condensed,
            registry.n_free(),
            DVector::zeros(registry.n_fixed()),
            cache.graph.free(),
            config.dirichlet,
            config.diagonal_scale,
        )?;

        let solver = self.linear_solver_name().to_string();
        let (solution, residual) = if system.n_free == 0 {
            (DVector::zeros(system.rhs.len()), 0.0)
        } else {
            let x = solve_linear(self.linear_solver_mut(), &system)?;
            let ax = spmv(&system.lhs, &x);
            let residual = relative_residual(ax.as_slice(), system.rhs.as_slice());
            (x, residual)
        };

        let cache = self.cached()?;
        let lambda_full = cache.map.expand(&system.recover(&solution), None);
        let lambda = cache
            .registry
            .keys()
            .iter()
            .copied()
            .zip(lambda_full.iter().copied())
            .collect();

        debug!(response = response.name(), residual, "adjoint solved");
        Ok(AdjointSolution {
            response: response.name().to_string(),
            lambda,
            solver,
            system_size: system.rhs.len(),
            relative_residual: residual,
        })
    }
}

/// Weighted total derivatives of one or more responses.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityAccumulator {
    weight: Real,
    totals: BTreeMap<DesignVariable, Real>,
    lambda_sums: BTreeMap<DofKey, Real>,
}

impl Default for SensitivityAccumulator {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SensitivityAccumulator {
    pub fn new(weight: Real) -> Self {
        Self {
            weight,
            totals: BTreeMap::new(),
            lambda_sums: BTreeMap::new(),
        }
    }

    pub fn weight(&self) -> Real {
        self.weight
    }

    pub fn set_weight(&mut self, weight: Real) {
        self.weight = weight;
    }

    /// Add `weight · dJ/dp` for each of `vars` and `weight · λ` per DOF.
    pub fn accumulate<M>(
        &mut self,
        model: &M,
        response: &dyn AdjointResponse,
        solution: &AdjointSolution,
        vars: &[DesignVariable],
    ) -> SolverResult<()>
    where
        M: ModelProvider,
    {
        for var in vars {
            let explicit = response.partial_sensitivity(var, model);
            let implicit = solution.residual_contribution(model, var)?;
            *self.totals.entry(var.clone()).or_insert(0.0) += self.weight * (explicit + implicit);
        }
        for (&key, &l) in &solution.lambda {
            *self.lambda_sums.entry(key).or_insert(0.0) += self.weight * l;
        }
        Ok(())
    }

    pub fn total(&self, var: &DesignVariable) -> Option<Real> {
        self.totals.get(var).copied()
    }

    pub fn totals(&self) -> &BTreeMap<DesignVariable, Real> {
        &self.totals
    }

    pub fn lambda_sum(&self, key: DofKey) -> Option<Real> {
        self.lambda_sums.get(&key).copied()
    }

    pub fn clear(&mut self) {
        self.totals.clear();
        self.lambda_sums.clear();
    }
}
