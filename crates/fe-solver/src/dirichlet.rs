//! Dirichlet enforcement on the condensed system.

use crate::condenser::CondensedSystem;
use crate::config::{DiagonalScale, DirichletPolicy};
use crate::error::{SolverError, SolverResult};
use crate::registry::{DofClass, DofRegistry};
use crate::sparsity::rows_mut;
use fe_core::Real;
use fe_model::ModelProvider;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use nalgebra_sparse::pattern::SparsityPattern;
use rayon::prelude::*;

/// System handed to the linear solver.
#[derive(Debug, Clone)]
pub struct DirichletSystem {
    pub lhs: CsrMatrix<Real>,
    pub rhs: DVector<Real>,
    /// Number of free equations (leading rows)
    pub n_free: usize,
    /// Prescribed increments of the fixed DOFs, in condensed order
    pub prescribed: DVector<Real>,
    /// Diagonal used for fixed rows under diagonal scaling
    pub scale: Option<Real>,
}

impl DirichletSystem {
    /// Condensed-space solution `[y_F; Δ_D]`.
    ///
    /// Fixed entries always come from the prescribed increments, never from
    /// the solver output.
    pub fn recover(&self, solution: &DVector<Real>) -> DVector<Real> {
        let n_fixed = self.prescribed.len();
        DVector::from_fn(self.n_free + n_fixed, |i, _| {
            if i < self.n_free {
                solution[i]
            } else {
                self.prescribed[i - self.n_free]
            }
        })
    }
}

/// Prescribed increments of fixed DOFs in condensed order.
pub fn prescribed_increments<M>(model: &M, registry: &DofRegistry) -> SolverResult<DVector<Real>>
where
    M: ModelProvider + ?Sized,
{
    let mut out = Vec::with_capacity(registry.n_fixed());
    for (p, &key) in registry.keys().iter().enumerate() {
        if registry.class(p) == DofClass::Fixed {
            let state = model
                .dof_state(key)
                .ok_or_else(|| SolverError::config(format!("DOF {key} is not defined in the model")))?;
            out.push(state.prescribed_increment);
        }
    }
    Ok(DVector::from_vec(out))
}

fn diagonal(lhs: &CsrMatrix<Real>, row: usize) -> Real {
    let r = lhs.row(row);
    r.col_indices()
        .binary_search(&row)
        .map_or(0.0, |k| r.values()[k])
}

/// Numeric value of a [`DiagonalScale`] for the given condensed matrix.
pub fn resolve_scale(scale: DiagonalScale, lhs: &CsrMatrix<Real>, n_free: usize) -> Real {
    let resolved = match scale {
        DiagonalScale::Explicit(s) => s,
        DiagonalScale::MaxDiagonal => (0..n_free)
            .map(|i| diagonal(lhs, i).abs())
            .fold(0.0, Real::max),
        DiagonalScale::NormDiagonal => {
            if n_free == 0 {
                0.0
            } else {
                let sum: Real = (0..n_free).map(|i| diagonal(lhs, i).powi(2)).sum();
                (sum / n_free as Real).sqrt()
            }
        }
    };
    if resolved.is_finite() && resolved > 0.0 {
        resolved
    } else {
        1.0
    }
}

/// Enforce `y_D = Δ_D` on the condensed system.
pub fn apply_dirichlet(
    system: CondensedSystem,
    n_free: usize,
    prescribed: DVector<Real>,
    free_pattern: &SparsityPattern,
    policy: DirichletPolicy,
    scale: DiagonalScale,
) -> SolverResult<DirichletSystem> {
    let n = system.rhs.len();
    if n_free + prescribed.len() != n || free_pattern.major_dim() != n_free {
        return Err(SolverError::consistency(format!(
            "Dirichlet split {n_free}+{} does not match a {n}-row condensed system",
            prescribed.len()
        )));
    }
    if prescribed.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::Numeric {
            what: "non-finite prescribed increment".to_string(),
        });
    }
    match policy {
        DirichletPolicy::RowColumnElimination => eliminate(system, n_free, prescribed, free_pattern),
        DirichletPolicy::DiagonalScaling => scale_rows(system, n_free, prescribed, scale),
    }
}

fn eliminate(
    system: CondensedSystem,
    n_free: usize,
    prescribed: DVector<Real>,
    free_pattern: &SparsityPattern,
) -> SolverResult<DirichletSystem> {
    let lhs = &system.lhs;
    let mut values = vec![0.0; free_pattern.nnz()];
    let mut rhs = system.rhs.rows(0, n_free).into_owned();

    rows_mut(free_pattern.major_offsets(), &mut values)
        .into_par_iter()
        .zip(rhs.as_mut_slice().par_iter_mut())
        .enumerate()
        .try_for_each(|(r, (row_values, rhs_r))| -> SolverResult<()> {
            let cols = free_pattern.lane(r);
            let row = lhs.row(r);
            for (&c, &a) in row.col_indices().iter().zip(row.values()) {
                if c < n_free {
                    let k = cols.binary_search(&c).map_err(|_| {
                        SolverError::consistency(format!(
                            "free entry ({r}, {c}) is outside the sparsity graph"
                        ))
                    })?;
                    row_values[k] += a;
                } else {
                    *rhs_r -= a * prescribed[c - n_free];
                }
            }
            Ok(())
        })?;

    let lhs = CsrMatrix::try_from_pattern_and_values(free_pattern.clone(), values)
        .map_err(|e| SolverError::consistency(format!("free matrix: {e}")))?;
    Ok(DirichletSystem {
        lhs,
        rhs,
        n_free,
        prescribed,
        scale: None,
    })
}

fn scale_rows(
    system: CondensedSystem,
    n_free: usize,
    prescribed: DVector<Real>,
    scale: DiagonalScale,
) -> SolverResult<DirichletSystem> {
    let s = resolve_scale(scale, &system.lhs, n_free);
    let CondensedSystem { mut lhs, mut rhs } = system;

    {
        let (offsets, cols, values) = lhs.csr_data_mut();
        rows_mut(offsets, values)
            .into_par_iter()
            .zip(rhs.as_mut_slice().par_iter_mut())
            .enumerate()
            .for_each(|(r, (row_values, rhs_r))| {
                let row_cols = &cols[offsets[r]..offsets[r + 1]];
                if r < n_free {
                    for (v, &c) in row_values.iter_mut().zip(row_cols) {
                        if c >= n_free {
                            *rhs_r -= *v * prescribed[c - n_free];
                            *v = 0.0;
                        }
                    }
                } else {
                    for (v, &c) in row_values.iter_mut().zip(row_cols) {
                        *v = if c == r { s } else { 0.0 };
                    }
                    *rhs_r = s * prescribed[r - n_free];
                }
            });
    }

    Ok(DirichletSystem {
        lhs,
        rhs,
        n_free,
        prescribed,
        scale: Some(s),
    })
}
