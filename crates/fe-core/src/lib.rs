//! fe-core: shared foundation for the finite-element workspace.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers)
//! - ids (compact IDs for nodes and elements)
//! - error (shared error types)
//! - timing (opt-in phase timers)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;

pub use error::{FeError, FeResult};
pub use ids::*;
pub use numeric::*;
