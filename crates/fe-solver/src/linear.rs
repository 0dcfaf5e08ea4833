//! Linear solver seam.
//!
//! The builder-and-solver hands a square CSR matrix and a right-hand side to a
//! [`LinearSolver`] and expects the solution vector back. Two backends ship
//! with the crate: a dense LU for small and moderate systems and a
//! Jacobi-preconditioned conjugate gradient for symmetric positive-definite
//! ones.

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use nalgebra_sparse::convert::serial::convert_csr_dense;
use rayon::prelude::*;
use thiserror::Error;

/// Failures reported by a linear solver backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinearSolverError {
    #[error("singular system: {detail}")]
    Singular {
        detail: String,
        condition_hint: Option<f64>,
    },

    #[error("no convergence after {iterations} iterations (relative residual {residual:e})")]
    NotConverged { iterations: usize, residual: f64 },

    #[error("system needs {requested_bytes} bytes of dense storage")]
    OutOfMemory { requested_bytes: usize },

    #[error("dimension mismatch: {rows}x{cols} matrix with RHS of length {rhs}")]
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },
}

impl LinearSolverError {
    pub fn condition_hint(&self) -> Option<f64> {
        match self {
            LinearSolverError::Singular { condition_hint, .. } => *condition_hint,
            _ => None,
        }
    }
}

pub type LinearSolverResult<T> = Result<T, LinearSolverError>;

/// Solves `A x = b` for a square sparse `A`.
pub trait LinearSolver: Send {
    fn name(&self) -> &str;

    /// Called once per solve before [`LinearSolver::solve`] with the system
    /// dimensions. Backends may allocate workspace here.
    fn initialize(&mut self, _size: usize, _nnz: usize) -> LinearSolverResult<()> {
        Ok(())
    }

    fn solve(&mut self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> LinearSolverResult<DVector<f64>>;

    /// Called after every solve attempt, successful or not.
    fn finalize(&mut self) {}
}

fn check_dimensions(a: &CsrMatrix<f64>, b: &DVector<f64>) -> LinearSolverResult<()> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() {
        return Err(LinearSolverError::DimensionMismatch {
            rows: a.nrows(),
            cols: a.ncols(),
            rhs: b.len(),
        });
    }
    Ok(())
}

/// Dense LU with partial pivoting.
#[derive(Debug, Clone)]
pub struct DenseLuSolver {
    /// Largest dimension converted to dense storage
    pub max_size: usize,
    /// Pivots at or below this fraction of the largest pivot are treated as
    /// zero; `None` means `n * f64::EPSILON`
    pub pivot_tolerance: Option<f64>,
}

impl Default for DenseLuSolver {
    fn default() -> Self {
        Self {
            max_size: 4096,
            pivot_tolerance: None,
        }
    }
}

impl DenseLuSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinearSolver for DenseLuSolver {
    fn name(&self) -> &str {
        "dense-lu"
    }

    fn initialize(&mut self, size: usize, _nnz: usize) -> LinearSolverResult<()> {
        if size > self.max_size {
            return Err(LinearSolverError::OutOfMemory {
                requested_bytes: size
                    .saturating_mul(size)
                    .saturating_mul(std::mem::size_of::<f64>()),
            });
        }
        Ok(())
    }

    fn solve(&mut self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> LinearSolverResult<DVector<f64>> {
        check_dimensions(a, b)?;
        let n = b.len();
        if n == 0 {
            return Ok(DVector::zeros(0));
        }
        self.initialize(n, a.nnz())?;

        let lu = convert_csr_dense(a).lu();

        let u = lu.u();
        let (mut min_pivot, mut max_pivot) = (f64::INFINITY, 0.0_f64);
        for i in 0..n {
            let p = u[(i, i)].abs();
            min_pivot = min_pivot.min(p);
            max_pivot = max_pivot.max(p);
        }
        let hint = if max_pivot > 0.0 {
            min_pivot / max_pivot
        } else {
            0.0
        };
        let tolerance = self
            .pivot_tolerance
            .unwrap_or(n as f64 * f64::EPSILON);
        if !min_pivot.is_finite() || !max_pivot.is_finite() || min_pivot <= tolerance * max_pivot {
            return Err(LinearSolverError::Singular {
                detail: format!(
                    "pivot {min_pivot:e} is negligible against {max_pivot:e} (ratio {hint:e})"
                ),
                condition_hint: Some(hint),
            });
        }

        let x = lu.solve(b).ok_or_else(|| LinearSolverError::Singular {
            detail: "LU factorization has a zero pivot".to_string(),
            condition_hint: Some(hint),
        })?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(LinearSolverError::Singular {
                detail: "solution contains non-finite entries".to_string(),
                condition_hint: Some(hint),
            });
        }
        Ok(x)
    }
}

/// Jacobi-preconditioned conjugate gradient for SPD systems.
#[derive(Debug, Clone)]
pub struct ConjugateGradientSolver {
    /// Iteration cap; `None` means `max(10 n, 100)`
    pub max_iterations: Option<usize>,
    /// Relative residual `||r|| / ||b||` at which iteration stops
    pub tolerance: f64,
}

impl Default for ConjugateGradientSolver {
    fn default() -> Self {
        Self {
            max_iterations: None,
            tolerance: 1e-10,
        }
    }
}

impl ConjugateGradientSolver {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }
}

pub(crate) fn spmv(a: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let y: Vec<f64> = (0..a.nrows())
        .into_par_iter()
        .map(|i| {
            let row = a.row(i);
            row.col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, &v)| v * x[j])
                .sum()
        })
        .collect();
    DVector::from_vec(y)
}

fn inverse_diagonal(a: &CsrMatrix<f64>) -> LinearSolverResult<DVector<f64>> {
    let mut inv = DVector::zeros(a.nrows());
    for i in 0..a.nrows() {
        let row = a.row(i);
        let d = row
            .col_indices()
            .binary_search(&i)
            .map(|k| row.values()[k])
            .unwrap_or(0.0);
        if !d.is_finite() || d <= 0.0 {
            return Err(LinearSolverError::Singular {
                detail: format!("non-positive diagonal {d} in row {i}"),
                condition_hint: None,
            });
        }
        inv[i] = 1.0 / d;
    }
    Ok(inv)
}

impl LinearSolver for ConjugateGradientSolver {
    fn name(&self) -> &str {
        "jacobi-cg"
    }

    fn solve(&mut self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> LinearSolverResult<DVector<f64>> {
        check_dimensions(a, b)?;
        let n = b.len();
        let b_norm = b.norm();
        if n == 0 || b_norm == 0.0 {
            return Ok(DVector::zeros(n));
        }

        let m_inv = inverse_diagonal(a)?;
        let max_iterations = self.max_iterations.unwrap_or((10 * n).max(100));

        let mut x = DVector::zeros(n);
        let mut r = b.clone();
        let mut z = r.component_mul(&m_inv);
        let mut p = z.clone();
        let mut rz = r.dot(&z);

        for iteration in 0..max_iterations {
            let ap = spmv(a, &p);
            let pap = p.dot(&ap);
            if !pap.is_finite() || pap <= 0.0 {
                return Err(LinearSolverError::Singular {
                    detail: format!("matrix is not positive definite (iteration {iteration})"),
                    condition_hint: None,
                });
            }
            let alpha = rz / pap;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);

            if r.norm() <= self.tolerance * b_norm {
                return Ok(x);
            }

            z = r.component_mul(&m_inv);
            let rz_next = r.dot(&z);
            let beta = rz_next / rz;
            rz = rz_next;
            p = &z + beta * &p;
        }

        Err(LinearSolverError::NotConverged {
            iterations: max_iterations,
            residual: r.norm() / b_norm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn csr(n: usize, triplets: &[(usize, usize, f64)]) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for &(i, j, v) in triplets {
            coo.push(i, j, v);
        }
        CsrMatrix::from(&coo)
    }

    fn tridiagonal(n: usize) -> CsrMatrix<f64> {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 2.0));
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
                t.push((i + 1, i, -1.0));
            }
        }
        csr(n, &t)
    }

    #[test]
    fn dense_lu_solves_small_system() {
        let a = csr(2, &[(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)]);
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let x = DenseLuSolver::new().solve(&a, &b).unwrap();
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn dense_lu_reports_singular() {
        let a = csr(2, &[(0, 0, 1.0), (0, 1, -1.0), (1, 0, -1.0), (1, 1, 1.0)]);
        let b = DVector::from_vec(vec![1.0, 0.0]);
        let err = DenseLuSolver::new().solve(&a, &b).unwrap_err();
        assert!(matches!(err, LinearSolverError::Singular { .. }));
        assert!(err.condition_hint().unwrap() < 1e-13);
    }

    #[test]
    fn dense_lu_accepts_high_stiffness_contrast() {
        // Springs of 1e14 and 1 in series, far end loaded.
        let a = csr(2, &[(0, 0, 1e14 + 1.0), (0, 1, -1.0), (1, 0, -1.0), (1, 1, 1.0)]);
        let b = DVector::from_vec(vec![0.0, 1.0]);
        let x = DenseLuSolver::new().solve(&a, &b).unwrap();
        assert!((x[0] - 1e-14).abs() < 1e-26);
        assert!((x[1] - (1.0 + 1e-14)).abs() < 1e-12);
    }

    #[test]
    fn dense_lu_custom_pivot_tolerance() {
        let a = csr(2, &[(0, 0, 1e6), (1, 1, 1.0)]);
        let b = DVector::from_vec(vec![1.0, 1.0]);
        let mut solver = DenseLuSolver {
            pivot_tolerance: Some(1e-3),
            ..Default::default()
        };
        let err = solver.solve(&a, &b).unwrap_err();
        assert!((err.condition_hint().unwrap() - 1e-6).abs() < 1e-18);
        assert!(DenseLuSolver::new().solve(&a, &b).is_ok());
    }

    #[test]
    fn dense_lu_size_limit() {
        let mut solver = DenseLuSolver {
            max_size: 2,
            ..Default::default()
        };
        let err = solver
            .solve(&tridiagonal(3), &DVector::from_element(3, 1.0))
            .unwrap_err();
        assert_eq!(
            err,
            LinearSolverError::OutOfMemory {
                requested_bytes: 72
            }
        );
    }

    #[test]
    fn dimension_mismatch() {
        let err = DenseLuSolver::new()
            .solve(&tridiagonal(3), &DVector::zeros(2))
            .unwrap_err();
        assert!(matches!(err, LinearSolverError::DimensionMismatch { rhs: 2, .. }));
    }

    #[test]
    fn cg_matches_lu() {
        let a = tridiagonal(20);
        let b = DVector::from_fn(20, |i, _| (i as f64).sin());
        let x_lu = DenseLuSolver::new().solve(&a, &b).unwrap();
        let x_cg = ConjugateGradientSolver::new(1e-12).solve(&a, &b).unwrap();
        assert!((x_lu - x_cg).norm() < 1e-9);
    }

    #[test]
    fn cg_zero_rhs() {
        let x = ConjugateGradientSolver::default()
            .solve(&tridiagonal(4), &DVector::zeros(4))
            .unwrap();
        assert_eq!(x, DVector::zeros(4));
    }

    #[test]
    fn cg_rejects_indefinite() {
        let a = csr(2, &[(0, 0, 1.0), (1, 1, -1.0)]);
        let err = ConjugateGradientSolver::default()
            .solve(&a, &DVector::from_vec(vec![1.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, LinearSolverError::Singular { .. }));
    }

    #[test]
    fn cg_iteration_cap() {
        let mut solver = ConjugateGradientSolver {
            max_iterations: Some(1),
            tolerance: 1e-14,
        };
        let err = solver
            .solve(&tridiagonal(10), &DVector::from_element(10, 1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            LinearSolverError::NotConverged { iterations: 1, .. }
        ));
    }
}
