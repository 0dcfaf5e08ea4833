//! Constraint condensation.
//!
//! With `x = T y + g` (free and fixed DOFs map to themselves, slaves expand
//! onto their masters, `g` carries slave offsets) the raw system `A x = b`
//! becomes `Tᵀ A T y = Tᵀ (b - A g)`. Matrix entries are redistributed with
//! weight `w_row * w_col`, RHS entries with `w_row`. Slave rows and columns
//! disappear.

use crate::assembler::RawSystem;
use crate::constraints::ConstraintTable;
use crate::error::{SolverError, SolverResult};
use crate::linear::spmv;
use crate::registry::{DofClass, DofRegistry};
use crate::sparsity::rows_mut;
use fe_core::Real;
use fe_model::DofValues;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use nalgebra_sparse::pattern::SparsityPattern;
use rayon::prelude::*;

/// Sparse representation of `T` and its transpose.
#[derive(Debug, Clone, PartialEq)]
pub struct CondensationMap {
    n_condensed: usize,
    // T by raw row: raw position -> (condensed index, weight)
    offsets: Vec<usize>,
    targets: Vec<usize>,
    weights: Vec<Real>,
    // Tᵀ by condensed row: condensed index -> (raw position, weight)
    gather_offsets: Vec<usize>,
    gather_rows: Vec<usize>,
    gather_weights: Vec<Real>,
}

impl CondensationMap {
    pub fn build(registry: &DofRegistry, table: &ConstraintTable) -> SolverResult<Self> {
        let n_raw = registry.len();
        let n_condensed = registry.n_condensed();

        let mut offsets = Vec::with_capacity(n_raw + 1);
        let mut targets = Vec::with_capacity(n_raw);
        let mut weights = Vec::with_capacity(n_raw);
        offsets.push(0);
        for (p, &key) in registry.keys().iter().enumerate() {
            match registry.condensed_index(p) {
                Some(c) => {
                    targets.push(c);
                    weights.push(1.0);
                }
                None => {
                    let rel = table.relation(key).ok_or_else(|| {
                        SolverError::consistency(format!("slave {key} has no relation"))
                    })?;
                    for &(master, w) in &rel.masters {
                        let c = registry
                            .position(master)
                            .and_then(|mp| registry.condensed_index(mp))
                            .ok_or_else(|| {
                                SolverError::consistency(format!(
                                    "master {master} of {key} has no condensed index"
                                ))
                            })?;
                        targets.push(c);
                        weights.push(w);
                    }
                }
            }
            offsets.push(targets.len());
        }

        let mut counts = vec![0usize; n_condensed + 1];
        for &c in &targets {
            counts[c + 1] += 1;
        }
        for c in 0..n_condensed {
            counts[c + 1] += counts[c];
        }
        let gather_offsets = counts.clone();
        let mut cursor = counts;
        let mut gather_rows = vec![0; targets.len()];
        let mut gather_weights = vec![0.0; targets.len()];
        for p in 0..n_raw {
            for k in offsets[p]..offsets[p + 1] {
                let c = targets[k];
                gather_rows[cursor[c]] = p;
                gather_weights[cursor[c]] = weights[k];
                cursor[c] += 1;
            }
        }

        Ok(Self {
            n_condensed,
            offsets,
            targets,
            weights,
            gather_offsets,
            gather_rows,
            gather_weights,
        })
    }

    pub fn n_raw(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn n_condensed(&self) -> usize {
        self.n_condensed
    }

    /// Condensed targets of raw position `p` with their weights.
    pub fn expansion(&self, p: usize) -> (&[usize], &[Real]) {
        let range = self.offsets[p]..self.offsets[p + 1];
        (&self.targets[range.clone()], &self.weights[range])
    }

    /// Raw positions gathered into condensed row `c` with their weights.
    pub fn gather(&self, c: usize) -> (&[usize], &[Real]) {
        let range = self.gather_offsets[c]..self.gather_offsets[c + 1];
        (&self.gather_rows[range.clone()], &self.gather_weights[range])
    }

    /// True when no DOF is a slave.
    pub fn is_identity(&self) -> bool {
        self.n_raw() == self.n_condensed
    }

    /// Sorted, deduplicated condensed indices reached from `positions`.
    pub fn closure(&self, positions: &[usize]) -> Vec<usize> {
        let mut out: Vec<usize> = positions
            .iter()
            .flat_map(|&p| self.expansion(p).0.iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// `x = T y + g` over raw positions.
    pub fn expand(&self, y: &DVector<Real>, offsets: Option<&DVector<Real>>) -> DVector<Real> {
        DVector::from_fn(self.n_raw(), |p, _| {
            let (targets, weights) = self.expansion(p);
            let g = offsets.map_or(0.0, |g| g[p]);
            targets
                .iter()
                .zip(weights)
                .fold(g, |acc, (&c, &w)| acc + w * y[c])
        })
    }
}

/// Raw-size vector of slave increment offsets (zero for other DOFs).
pub fn slave_offsets(
    registry: &DofRegistry,
    table: &ConstraintTable,
    values: &dyn DofValues,
) -> SolverResult<DVector<Real>> {
    let mut g = DVector::zeros(registry.len());
    for (slave, offset) in table.increment_offsets(values)? {
        let p = registry
            .position(slave)
            .filter(|&p| registry.class(p) == DofClass::Slave)
            .ok_or_else(|| SolverError::consistency(format!("slave {slave} is not registered")))?;
        g[p] = offset;
    }
    Ok(g)
}

/// System over free and fixed DOFs after slave elimination.
///
/// Rows `0..n_free` are free equations, the rest belong to fixed DOFs.
#[derive(Debug, Clone)]
pub struct CondensedSystem {
    pub lhs: CsrMatrix<Real>,
    pub rhs: DVector<Real>,
}

/// Apply `Tᵀ (.) T` to the raw system.
///
/// Each condensed row is produced by exactly one task, so rows can be filled
/// in parallel without synchronization.
pub fn condense(
    raw: &RawSystem,
    map: &CondensationMap,
    pattern: &SparsityPattern,
    offsets: Option<&DVector<Real>>,
) -> SolverResult<CondensedSystem> {
    let n = pattern.major_dim();
    if n != map.n_condensed() || raw.rhs.len() != map.n_raw() || raw.lhs.nrows() != map.n_raw() {
        return Err(SolverError::consistency(format!(
            "condensation of a {}-row raw system into {n} rows does not match the map ({} -> {})",
            raw.rhs.len(),
            map.n_raw(),
            map.n_condensed()
        )));
    }

    let b_eff = match offsets {
        Some(g) if g.iter().any(|&v| v != 0.0) => &raw.rhs - spmv(&raw.lhs, g),
        _ => raw.rhs.clone(),
    };

    let mut values = vec![0.0; pattern.nnz()];
    let mut rhs = DVector::zeros(n);
    rows_mut(pattern.major_offsets(), &mut values)
        .into_par_iter()
        .zip(rhs.as_mut_slice().par_iter_mut())
        .enumerate()
        .try_for_each(|(r, (row_values, rhs_r))| -> SolverResult<()> {
            let cols = pattern.lane(r);
            let (raw_rows, row_weights) = map.gather(r);
            for (&i, &w_r) in raw_rows.iter().zip(row_weights) {
                *rhs_r += w_r * b_eff[i];
                let raw_row = raw.lhs.row(i);
                for (&j, &a) in raw_row.col_indices().iter().zip(raw_row.values()) {
                    let (targets, col_weights) = map.expansion(j);
                    for (&c, &w_c) in targets.iter().zip(col_weights) {
                        let k = cols.binary_search(&c).map_err(|_| {
                            SolverError::consistency(format!(
                                "condensed entry ({r}, {c}) is outside the sparsity graph"
                            ))
                        })?;
                        row_values[k] += w_r * w_c * a;
                    }
                }
            }
            Ok(())
        })?;

    let lhs = CsrMatrix::try_from_pattern_and_values(pattern.clone(), values)
        .map_err(|e| SolverError::consistency(format!("condensed matrix: {e}")))?;
    Ok(CondensedSystem { lhs, rhs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::config::AssemblyStrategy;
    use crate::sparsity::SparsityGraph;
    use fe_model::elements::{PointLoad, Spring};
    use fe_model::{DofKey, MasterSlaveConstraint, Model, ModelBuilder, Variable};
    use nalgebra::DMatrix;
    use nalgebra_sparse::convert::serial::convert_csr_dense;

    struct Fixture {
        model: Model,
        dofs: Vec<DofKey>,
    }

    fn fixture(n: usize, k: f64) -> Fixture {
        let mut b = ModelBuilder::new();
        let dofs: Vec<DofKey> = (0..n)
            .map(|i| {
                let node = b.add_node([i as f64, 0.0, 0.0]);
                b.add_dof(node, Variable::DisplacementX)
            })
            .collect();
        for w in dofs.windows(2) {
            b.add_element(Box::new(Spring::new("s", w[0], w[1], k)));
        }
        Fixture {
            model: b.build().unwrap(),
            dofs,
        }
    }

    fn condensed(model: &Model, relations: &[MasterSlaveConstraint]) -> (DofRegistry, RawSystem, CondensedSystem) {
        let table = ConstraintTable::build(relations).unwrap();
        let reg = DofRegistry::build(model, &table).unwrap();
        let map = CondensationMap::build(&reg, &table).unwrap();
        let graph = SparsityGraph::build(model, &reg, &map).unwrap();
        let raw = assemble(model, &reg, graph.raw(), AssemblyStrategy::Serial).unwrap();
        let g = slave_offsets(&reg, &table, model).unwrap();
        let cond = condense(&raw, &map, graph.condensed(), Some(&g)).unwrap();
        (reg, raw, cond)
    }

    #[test]
    fn identity_without_constraints() {
        let f = fixture(3, 2.0);
        let (_, raw, cond) = condensed(&f.model, &[]);
        assert_eq!(convert_csr_dense(&raw.lhs), convert_csr_dense(&cond.lhs));
        assert_eq!(raw.rhs, cond.rhs);
    }

    #[test]
    fn equal_split_distributes_load() {
        // Slave S = 0.5 M1 + 0.5 M2; unit load on S, no stiffness.
        let mut b = ModelBuilder::new();
        let dofs: Vec<DofKey> = (0..3)
            .map(|i| {
                let node = b.add_node([i as f64, 0.0, 0.0]);
                b.add_dof(node, Variable::DisplacementX)
            })
            .collect();
        b.add_condition(Box::new(PointLoad::new("load", dofs[2], 1.0)));
        let model = b.build().unwrap();

        let rel = MasterSlaveConstraint::new(dofs[2], vec![(dofs[0], 0.5), (dofs[1], 0.5)], 0.0);
        let (reg, _, cond) = condensed(&model, &[rel]);
        assert_eq!(reg.n_condensed(), 2);
        assert_eq!(cond.rhs.as_slice(), &[0.5, 0.5]);
    }

    #[test]
    fn matches_dense_transformation() {
        let f = fixture(4, 3.0);
        let rel = MasterSlaveConstraint::new(f.dofs[1], vec![(f.dofs[0], 0.25), (f.dofs[3], 0.75)], 0.0);
        let (reg, raw, cond) = condensed(&f.model, &[rel]);

        // T: raw positions 0..4 -> condensed [u0, u2, u3]
        let mut t = DMatrix::zeros(4, 3);
        t[(0, 0)] = 1.0;
        t[(1, 0)] = 0.25;
        t[(1, 2)] = 0.75;
        t[(2, 1)] = 1.0;
        t[(3, 2)] = 1.0;
        assert_eq!(reg.n_condensed(), 3);

        let a = convert_csr_dense(&raw.lhs);
        let expected = t.transpose() * a * &t;
        let got = convert_csr_dense(&cond.lhs);
        assert!((expected - got).norm() < 1e-12);
    }

    #[test]
    fn expand_applies_weights_and_offsets() {
        let f = fixture(3, 1.0);
        let rel = MasterSlaveConstraint::new(f.dofs[2], vec![(f.dofs[0], 2.0)], 0.0);
        let table = ConstraintTable::build(&[rel]).unwrap();
        let reg = DofRegistry::build(&f.model, &table).unwrap();
        let map = CondensationMap::build(&reg, &table).unwrap();
        assert!(!map.is_identity());

        let y = DVector::from_vec(vec![1.5, -1.0]);
        let g = DVector::from_vec(vec![0.0, 0.0, 0.25]);
        let x = map.expand(&y, Some(&g));
        assert_eq!(x.as_slice(), &[1.5, -1.0, 3.25]);
        assert_eq!(map.gather(0).0, &[0, 2]);
    }
}
