//! Sample element and condition library.
//!
//! Small linear/cubic structural elements used to drive the solver:
//! - `Spring`: two-DOF axial spring with optional cubic hardening
//! - `Truss2D`: small-strain two-node bar in the plane
//! - `PointLoad`: nodal force condition

mod common;
pub mod point_load;
pub mod spring;
pub mod truss;

pub use point_load::PointLoad;
pub use spring::Spring;
pub use truss::Truss2D;
