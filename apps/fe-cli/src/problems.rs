//! Built-in demo problems.

use crate::error::CliResult;
use clap::ValueEnum;
use fe_core::Real;
use fe_model::elements::{PointLoad, Spring, Truss2D};
use fe_model::{
    ConstraintSet, DesignVariable, DofKey, MasterSlaveConstraint, Model, ModelBuilder, Variable,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Problem {
    /// Clamped chain of linear springs with a tip load
    SpringChain,
    /// Three-bar plane truss with an apex load
    Truss,
    /// Two spring chains whose tips are averaged into a loaded slave
    TiedSprings,
    /// Single clamped spring with cubic hardening
    Hardening,
}

pub struct Demo {
    pub model: Model,
    pub constraints: ConstraintSet,
    /// DOF reported as the response for sensitivity runs
    pub response: DofKey,
    pub design: Vec<DesignVariable>,
}

pub fn build(problem: Problem) -> CliResult<Demo> {
    match problem {
        Problem::SpringChain => spring_chain(),
        Problem::Truss => truss(),
        Problem::TiedSprings => tied_springs(),
        Problem::Hardening => hardening(),
    }
}

fn line_dofs(b: &mut ModelBuilder, n: usize, y: Real) -> Vec<DofKey> {
    (0..n)
        .map(|i| {
            let node = b.add_node([i as Real, y, 0.0]);
            b.add_dof(node, Variable::DisplacementX)
        })
        .collect()
}

fn spring_chain() -> CliResult<Demo> {
    let stiffness = DesignVariable::new("k_root");
    let mut b = ModelBuilder::new();
    let dofs = line_dofs(&mut b, 6, 0.0);
    for (i, w) in dofs.windows(2).enumerate() {
        let mut spring = Spring::new(format!("spring_{i}"), w[0], w[1], 100.0);
        if i == 0 {
            spring = spring.with_design_variable(stiffness.clone());
        }
        b.add_element(Box::new(spring));
    }
    let tip = dofs[dofs.len() - 1];
    b.add_condition(Box::new(PointLoad::new("tip_load", tip, 10.0)));
    b.fix(dofs[0], 0.0);
    Ok(Demo {
        model: b.build()?,
        constraints: ConstraintSet::new(),
        response: tip,
        design: vec![stiffness],
    })
}

fn truss() -> CliResult<Demo> {
    let rigidity = DesignVariable::new("ea_bottom");
    let points: [[Real; 2]; 3] = [[0.0, 0.0], [2.0, 0.0], [1.0, 1.5]];
    let mut b = ModelBuilder::new();
    let nodes: Vec<_> = points.iter().map(|p| b.add_node([p[0], p[1], 0.0])).collect();

    b.add_element(Box::new(
        Truss2D::new("bottom", [nodes[0], nodes[1]], [points[0], points[1]], 1.0e3)?
            .with_design_variable(rigidity.clone()),
    ));
    b.add_element(Box::new(Truss2D::new(
        "right",
        [nodes[1], nodes[2]],
        [points[1], points[2]],
        2.0e3,
    )?));
    b.add_element(Box::new(Truss2D::new(
        "left",
        [nodes[2], nodes[0]],
        [points[2], points[0]],
        1.5e3,
    )?));

    let apex = DofKey::new(nodes[2], Variable::DisplacementY);
    b.add_condition(Box::new(PointLoad::new("apex_load", apex, -10.0)));
    b.fix(DofKey::new(nodes[0], Variable::DisplacementX), 0.0);
    b.fix(DofKey::new(nodes[0], Variable::DisplacementY), 0.0);
    b.fix(DofKey::new(nodes[1], Variable::DisplacementY), 0.0);
    Ok(Demo {
        model: b.build()?,
        constraints: ConstraintSet::new(),
        response: apex,
        design: vec![rigidity],
    })
}

fn tied_springs() -> CliResult<Demo> {
    let load = DesignVariable::new("load");
    let mut b = ModelBuilder::new();
    let upper = line_dofs(&mut b, 3, 1.0);
    let lower = line_dofs(&mut b, 3, -1.0);
    for (name, chain, k) in [("upper", &upper, 50.0), ("lower", &lower, 80.0)] {
        for (i, w) in chain.windows(2).enumerate() {
            b.add_element(Box::new(Spring::new(format!("{name}_{i}"), w[0], w[1], k)));
        }
        b.fix(chain[0], 0.0);
    }
    let hub_node = b.add_node([2.0, 0.0, 0.0]);
    let hub = b.add_dof(hub_node, Variable::DisplacementX);
    b.add_condition(Box::new(
        PointLoad::new("hub_load", hub, 6.0).with_design_variable(load.clone()),
    ));

    let constraints = ConstraintSet::from_relations(vec![MasterSlaveConstraint::new(
        hub,
        vec![(upper[2], 0.5), (lower[2], 0.5)],
        0.0,
    )]);
    Ok(Demo {
        model: b.build()?,
        constraints,
        response: hub,
        design: vec![load],
    })
}

fn hardening() -> CliResult<Demo> {
    let stiffness = DesignVariable::new("k");
    let mut b = ModelBuilder::new();
    let dofs = line_dofs(&mut b, 2, 0.0);
    b.add_element(Box::new(
        Spring::new("hardening", dofs[0], dofs[1], 2.0)
            .with_cubic(5.0)
            .with_design_variable(stiffness.clone()),
    ));
    b.add_condition(Box::new(PointLoad::new("load", dofs[1], 4.0)));
    b.fix(dofs[0], 0.0);
    Ok(Demo {
        model: b.build()?,
        constraints: ConstraintSet::new(),
        response: dofs[1],
        design: vec![stiffness],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_demo_builds() {
        for problem in Problem::value_variants() {
            let demo = build(*problem).unwrap();
            assert!(!demo.model.elements().is_empty());
            assert!(demo.model.dof(demo.response).is_some());
            assert_eq!(demo.design.len(), 1);
        }
    }
}
