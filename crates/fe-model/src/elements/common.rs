//! Common utilities for element calculations.

use crate::error::{ElementError, ElementResult};
use fe_core::numeric::ensure_finite;

/// Ensure a value is finite, returning ElementError if not.
pub(crate) fn check_finite(value: f64, what: &'static str) -> ElementResult<()> {
    ensure_finite(value, what).map_err(|_| ElementError::NonPhysical { what })?;
    Ok(())
}
