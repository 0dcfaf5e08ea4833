//! fe-model: model layer consumed by the builder-and-solver.
//!
//! Provides:
//! - DOF identity and per-DOF state (`DofKey`, `DofState`)
//! - The element/condition contract and a few sample elements
//! - Master-slave constraint relations
//! - An in-memory `Model` with an incremental, validating builder
//! - The provider traits the solver is written against
//!
//! # Example
//!
//! ```
//! use fe_model::elements::{PointLoad, Spring};
//! use fe_model::{ModelBuilder, Variable};
//!
//! let mut builder = ModelBuilder::new();
//! let n0 = builder.add_node([0.0, 0.0, 0.0]);
//! let n1 = builder.add_node([1.0, 0.0, 0.0]);
//! let u0 = builder.add_dof(n0, Variable::DisplacementX);
//! let u1 = builder.add_dof(n1, Variable::DisplacementX);
//! builder.add_element(Box::new(Spring::new("spring", u0, u1, 100.0)));
//! builder.add_condition(Box::new(PointLoad::new("load", u1, 5.0)));
//! builder.fix(u0, 0.0);
//! let model = builder.build().unwrap();
//!
//! assert_eq!(model.elements().len(), 1);
//! assert_eq!(model.conditions().len(), 1);
//! assert!(model.dof(u0).unwrap().fixed);
//! ```

pub mod builder;
pub mod constraint;
pub mod dof;
pub mod element;
pub mod elements;
pub mod error;
pub mod model;
pub mod provider;
pub mod revision;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use builder::ModelBuilder;
pub use constraint::{ConstraintProvider, ConstraintSet, MasterSlaveConstraint};
pub use dof::{DofKey, DofState, Variable};
pub use element::{DesignVariable, DofValues, Element, LocalSystem};
pub use error::{ElementError, ElementResult, ModelError, ModelResult};
pub use model::{Model, Node};
pub use provider::ModelProvider;
