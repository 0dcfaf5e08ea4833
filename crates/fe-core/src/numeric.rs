use crate::FeError;

/// Floating point type used throughout the workspace.
pub type Real = f64;

/// Absolute/relative tolerance pair used by comparisons and convergence checks.
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, FeError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(FeError::NonFinite { what, value: v })
    }
}

/// Check every entry of a slice; reports the first offending value.
pub fn ensure_all_finite(values: &[Real], what: &'static str) -> Result<(), FeError> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(&value) => Err(FeError::NonFinite { what, value }),
        None => Ok(()),
    }
}

/// Euclidean norm of `a - b`, divided by `max(|b|, 1)`.
pub fn relative_residual(a: &[Real], b: &[Real]) -> Real {
    let diff: Real = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<Real>()
        .sqrt();
    let scale: Real = b.iter().map(|y| y * y).sum::<Real>().sqrt().max(1.0);
    diff / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        };
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn ensure_all_finite_reports_first_bad_value() {
        assert!(ensure_all_finite(&[1.0, 2.0], "ok").is_ok());
        let err = ensure_all_finite(&[1.0, Real::INFINITY, Real::NAN], "vec").unwrap_err();
        assert!(matches!(err, FeError::NonFinite { what: "vec", value } if value.is_infinite()));
    }

    #[test]
    fn relative_residual_zero_for_equal() {
        assert_eq!(relative_residual(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert!((relative_residual(&[0.0, 0.0], &[3.0, 4.0]) - 1.0).abs() < 1e-15);
    }
}
