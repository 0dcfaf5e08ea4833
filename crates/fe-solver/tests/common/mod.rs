//! Shared model fixtures for the integration tests.
#![allow(dead_code)]

use fe_core::{NodeId, Real, Tolerances, nearly_equal};
use fe_model::elements::{PointLoad, Spring, Truss2D};
use fe_model::{DesignVariable, DofKey, Model, ModelBuilder, Variable};

pub const TRUSS_POINTS: [[Real; 2]; 3] = [[0.0, 0.0], [2.0, 0.0], [1.0, 1.5]];

/// Three-bar truss: node 0 pinned, node 1 on a roller (y fixed), load at the
/// apex node 2. Bar `b01` exposes its axial rigidity as `design`.
pub struct Truss {
    pub model: Model,
    pub nodes: Vec<NodeId>,
    pub apex_y: DofKey,
    pub design: DesignVariable,
}

pub fn truss(ea_bottom: Real, load: Real, reversed: bool) -> Truss {
    let design = DesignVariable::new("ea_bottom");
    let mut b = ModelBuilder::new();
    let nodes: Vec<NodeId> = TRUSS_POINTS
        .iter()
        .map(|p| b.add_node([p[0], p[1], 0.0]))
        .collect();

    let mut bars = vec![
        Truss2D::new("b01", [nodes[0], nodes[1]], [TRUSS_POINTS[0], TRUSS_POINTS[1]], ea_bottom)
            .unwrap()
            .with_design_variable(design.clone()),
        Truss2D::new("b12", [nodes[1], nodes[2]], [TRUSS_POINTS[1], TRUSS_POINTS[2]], 2.0e3).unwrap(),
        Truss2D::new("b20", [nodes[2], nodes[0]], [TRUSS_POINTS[2], TRUSS_POINTS[0]], 1.5e3).unwrap(),
    ];
    if reversed {
        bars.reverse();
    }
    for bar in bars {
        b.add_element(Box::new(bar));
    }

    let apex_y = DofKey::new(nodes[2], Variable::DisplacementY);
    b.add_condition(Box::new(PointLoad::new("apex", apex_y, load)));
    b.add_condition(Box::new(PointLoad::new(
        "side",
        DofKey::new(nodes[2], Variable::DisplacementX),
        0.25 * load,
    )));
    b.fix(DofKey::new(nodes[0], Variable::DisplacementX), 0.0);
    b.fix(DofKey::new(nodes[0], Variable::DisplacementY), 0.0);
    b.fix(DofKey::new(nodes[1], Variable::DisplacementY), 0.0);

    Truss {
        model: b.build().unwrap(),
        nodes,
        apex_y,
        design,
    }
}

/// `n` collinear DOFs joined by springs of stiffness `k`.
pub fn spring_chain(n: usize, k: Real) -> (ModelBuilder, Vec<DofKey>) {
    let mut b = ModelBuilder::new();
    let dofs: Vec<DofKey> = (0..n)
        .map(|i| {
            let node = b.add_node([i as Real, 0.0, 0.0]);
            b.add_dof(node, Variable::DisplacementX)
        })
        .collect();
    for (i, w) in dofs.windows(2).enumerate() {
        b.add_element(Box::new(Spring::new(format!("s{i}"), w[0], w[1], k)));
    }
    (b, dofs)
}

pub fn close(a: Real, b: Real, tol: Real) -> bool {
    nearly_equal(a, b, Tolerances { abs: tol, rel: tol })
}
