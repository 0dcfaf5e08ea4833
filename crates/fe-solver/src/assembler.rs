//! Scatter-add of element and condition contributions into the raw system.

use crate::config::AssemblyStrategy;
use crate::error::{SolverError, SolverResult};
use crate::registry::DofRegistry;
use crate::sparsity::slot;
use fe_core::{Real, ensure_all_finite};
use fe_model::{DofValues, Element, LocalSystem, ModelProvider};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use nalgebra_sparse::pattern::SparsityPattern;
use rayon::prelude::*;

/// Global tangent and residual over every registered DOF, in registry order.
#[derive(Debug, Clone)]
pub struct RawSystem {
    pub lhs: CsrMatrix<Real>,
    pub rhs: DVector<Real>,
}

/// Accumulator for one slice of the element list.
struct Partial {
    values: Vec<Real>,
    rhs: Vec<Real>,
}

impl Partial {
    fn zeros(nnz: usize, n: usize) -> Self {
        Self {
            values: vec![0.0; nnz],
            rhs: vec![0.0; n],
        }
    }

    fn merge(mut self, other: Partial) -> Partial {
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += b;
        }
        for (a, b) in self.rhs.iter_mut().zip(&other.rhs) {
            *a += b;
        }
        self
    }

    fn scatter(
        &mut self,
        pattern: &SparsityPattern,
        element: &dyn Element,
        positions: &[usize],
        local: &LocalSystem,
    ) -> SolverResult<()> {
        for (a, &i) in positions.iter().enumerate() {
            self.rhs[i] += local.rhs[a];
            for (b, &j) in positions.iter().enumerate() {
                let k = slot(pattern, i, j).ok_or_else(|| {
                    SolverError::consistency(format!(
                        "'{}' writes ({i}, {j}) outside the raw sparsity graph",
                        element.name()
                    ))
                })?;
                self.values[k] += local.lhs[(a, b)];
            }
        }
        Ok(())
    }
}

/// Evaluate one element and scatter it.
fn contribute<V: DofValues>(
    acc: &mut Partial,
    pattern: &SparsityPattern,
    registry: &DofRegistry,
    values: &V,
    element: &dyn Element,
) -> SolverResult<()> {
    let positions = registry.element_positions(element)?;
    let local = element
        .local_system(values)
        .map_err(|source| SolverError::Element {
            element: element.name().to_string(),
            source,
        })?;
    local
        .check_shape(positions.len())
        .map_err(|source| SolverError::Element {
            element: element.name().to_string(),
            source,
        })?;
    ensure_all_finite(local.lhs.as_slice(), "local tangent")
        .and_then(|()| ensure_all_finite(local.rhs.as_slice(), "local residual"))
        .map_err(|e| SolverError::Numeric {
            what: format!("'{}': {e}", element.name()),
        })?;
    acc.scatter(pattern, element, &positions, &local)
}

/// Assemble the raw system from all elements and conditions.
///
/// Both strategies produce the same matrix up to rounding; `Serial` visits
/// elements in model order.
pub fn assemble<M>(
    model: &M,
    registry: &DofRegistry,
    pattern: &SparsityPattern,
    strategy: AssemblyStrategy,
) -> SolverResult<RawSystem>
where
    M: ModelProvider,
{
    let n = registry.len();
    if pattern.major_dim() != n {
        return Err(SolverError::consistency(format!(
            "raw pattern has {} rows for {n} registered DOFs",
            pattern.major_dim()
        )));
    }
    let nnz = pattern.nnz();

    let partial = match strategy {
        AssemblyStrategy::Serial => {
            let mut acc = Partial::zeros(nnz, n);
            for element in model.elements().iter().chain(model.conditions()) {
                contribute(&mut acc, pattern, registry, model, &**element)?;
            }
            acc
        }
        AssemblyStrategy::ThreadLocal => model
            .elements()
            .par_iter()
            .chain(model.conditions().par_iter())
            .try_fold(
                || Partial::zeros(nnz, n),
                |mut acc, element| {
                    contribute(&mut acc, pattern, registry, model, &**element)?;
                    Ok::<_, SolverError>(acc)
                },
            )
            .try_reduce(|| Partial::zeros(nnz, n), |a, b| Ok(a.merge(b)))?,
    };

    let lhs = CsrMatrix::try_from_pattern_and_values(pattern.clone(), partial.values)
        .map_err(|e| SolverError::consistency(format!("raw matrix: {e}")))?;
    Ok(RawSystem {
        lhs,
        rhs: DVector::from_vec(partial.rhs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condenser::CondensationMap;
    use crate::constraints::ConstraintTable;
    use crate::error::ErrorKind;
    use crate::sparsity::SparsityGraph;
    use fe_model::elements::{PointLoad, Spring};
    use fe_model::{DofKey, ElementResult, Model, ModelBuilder, Variable};
    use nalgebra::DMatrix;
    use nalgebra_sparse::convert::serial::convert_csr_dense;

    fn build(model: &Model) -> (DofRegistry, SparsityGraph) {
        let table = ConstraintTable::default();
        let reg = DofRegistry::build(model, &table).unwrap();
        let map = CondensationMap::build(&reg, &table).unwrap();
        let graph = SparsityGraph::build(model, &reg, &map).unwrap();
        (reg, graph)
    }

    fn two_springs() -> (Model, [DofKey; 3]) {
        let mut b = ModelBuilder::new();
        let mut dofs = Vec::new();
        for i in 0..3 {
            let n = b.add_node([i as f64, 0.0, 0.0]);
            dofs.push(b.add_dof(n, Variable::DisplacementX));
        }
        b.add_element(Box::new(Spring::new("a", dofs[0], dofs[1], 2.0)));
        b.add_element(Box::new(Spring::new("b", dofs[1], dofs[2], 3.0)));
        b.add_condition(Box::new(PointLoad::new("f", dofs[2], 1.0)));
        (b.build().unwrap(), [dofs[0], dofs[1], dofs[2]])
    }

    #[test]
    fn overlapping_rows_accumulate() {
        let (model, _) = two_springs();
        let (reg, graph) = build(&model);
        let raw = assemble(&model, &reg, graph.raw(), AssemblyStrategy::Serial).unwrap();
        let expected = DMatrix::from_row_slice(3, 3, &[2.0, -2.0, 0.0, -2.0, 5.0, -3.0, 0.0, -3.0, 3.0]);
        assert_eq!(convert_csr_dense(&raw.lhs), expected);
        assert_eq!(raw.rhs.as_slice(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn strategies_agree() {
        let (model, _) = two_springs();
        let (reg, graph) = build(&model);
        let serial = assemble(&model, &reg, graph.raw(), AssemblyStrategy::Serial).unwrap();
        let parallel = assemble(&model, &reg, graph.raw(), AssemblyStrategy::ThreadLocal).unwrap();
        assert_eq!(serial.lhs.pattern(), parallel.lhs.pattern());
        let diff = convert_csr_dense(&serial.lhs) - convert_csr_dense(&parallel.lhs);
        assert!(diff.norm() < 1e-14);
        assert!((serial.rhs - parallel.rhs).norm() < 1e-14);
    }

    struct BadShape {
        dofs: Vec<DofKey>,
    }

    impl Element for BadShape {
        fn name(&self) -> &str {
            "bad"
        }
        fn dofs(&self) -> &[DofKey] {
            &self.dofs
        }
        fn local_system(&self, _values: &dyn DofValues) -> ElementResult<LocalSystem> {
            Ok(LocalSystem::zeros(self.dofs.len() + 1))
        }
    }

    #[test]
    fn wrong_local_shape_is_rejected() {
        let (mut model, dofs) = two_springs();
        model
            .add_element(Box::new(BadShape {
                dofs: vec![dofs[0], dofs[2]],
            }))
            .unwrap();
        let (reg, graph) = build(&model);
        let err = assemble(&model, &reg, graph.raw(), AssemblyStrategy::ThreadLocal).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn write_outside_pattern_is_a_consistency_error() {
        let (model, _) = two_springs();
        let (reg, _) = build(&model);
        // Diagonal-only pattern cannot hold the spring coupling.
        let diag = SparsityPattern::try_from_offsets_and_indices(3, 3, vec![0, 1, 2, 3], vec![0, 1, 2]).unwrap();
        let err = assemble(&model, &reg, &diag, AssemblyStrategy::Serial).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::condenser::CondensationMap;
    use crate::constraints::ConstraintTable;
    use crate::sparsity::SparsityGraph;
    use fe_model::elements::Spring;
    use fe_model::{DofKey, ModelBuilder, Variable};
    use nalgebra_sparse::convert::serial::convert_csr_dense;
    use proptest::prelude::*;

    proptest! {
        /// Random spring networks assemble to the same matrix serially and
        /// in parallel.
        #[test]
        fn parallel_matches_serial(
            springs in prop::collection::vec((0usize..8, 0usize..8, 0.1_f64..10.0), 1..40),
        ) {
            let mut b = ModelBuilder::new();
            let dofs: Vec<DofKey> = (0..8)
                .map(|i| {
                    let n = b.add_node([i as f64, 0.0, 0.0]);
                    b.add_dof(n, Variable::DisplacementX)
                })
                .collect();
            for (e, &(i, j, k)) in springs.iter().enumerate() {
                if i != j {
                    b.add_element(Box::new(Spring::new(format!("s{e}"), dofs[i], dofs[j], k)));
                }
            }
            let model = b.build().unwrap();

            let table = ConstraintTable::default();
            let reg = DofRegistry::build(&model, &table).unwrap();
            let map = CondensationMap::build(&reg, &table).unwrap();
            let graph = SparsityGraph::build(&model, &reg, &map).unwrap();

            let serial = assemble(&model, &reg, graph.raw(), AssemblyStrategy::Serial).unwrap();
            let parallel = assemble(&model, &reg, graph.raw(), AssemblyStrategy::ThreadLocal).unwrap();
            let diff = convert_csr_dense(&serial.lhs) - convert_csr_dense(&parallel.lhs);
            prop_assert!(diff.norm() <= 1e-12 * (1.0 + convert_csr_dense(&serial.lhs).norm()));
        }
    }
}
