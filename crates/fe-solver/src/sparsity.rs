//! Sparsity builder.
//!
//! Patterns are derived from element connectivity and the condensation map
//! once per topology and reused until a revision changes. Every pattern
//! contains its diagonal.

use crate::condenser::CondensationMap;
use crate::error::{SolverError, SolverResult};
use crate::registry::DofRegistry;
use fe_model::ModelProvider;
use nalgebra_sparse::pattern::SparsityPattern;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Structural nonzeros of the raw, condensed and free-block matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct SparsityGraph {
    raw: SparsityPattern,
    condensed: SparsityPattern,
    free: SparsityPattern,
}

impl SparsityGraph {
    pub fn build<M>(model: &M, registry: &DofRegistry, map: &CondensationMap) -> SolverResult<Self>
    where
        M: ModelProvider + ?Sized,
    {
        let raw_cliques: Vec<Vec<usize>> = model
            .elements()
            .par_iter()
            .chain(model.conditions().par_iter())
            .map(|element| registry.element_positions(&**element))
            .collect::<SolverResult<_>>()?;

        let condensed_cliques: Vec<Vec<usize>> = raw_cliques
            .par_iter()
            .map(|positions| map.closure(positions))
            .collect();

        let n_raw = registry.len();
        let mut raw_rows: Vec<BTreeSet<usize>> = (0..n_raw).map(|i| BTreeSet::from([i])).collect();
        for clique in &raw_cliques {
            insert_clique(&mut raw_rows, clique);
        }

        let n_cond = registry.n_condensed();
        let mut cond_rows: Vec<BTreeSet<usize>> =
            (0..n_cond).map(|i| BTreeSet::from([i])).collect();
        for clique in &condensed_cliques {
            insert_clique(&mut cond_rows, clique);
        }
        // Diagonal raw entries of slaves expand onto their masters.
        for p in 0..n_raw {
            insert_clique(&mut cond_rows, &map.closure(&[p]));
        }

        let n_free = registry.n_free();
        let free_rows: Vec<BTreeSet<usize>> = cond_rows[..n_free]
            .iter()
            .map(|row| row.range(..n_free).copied().collect())
            .collect();

        let graph = Self {
            raw: to_pattern(n_raw, raw_rows)?,
            condensed: to_pattern(n_cond, cond_rows)?,
            free: to_pattern(n_free, free_rows)?,
        };
        tracing::debug!(
            raw_nnz = graph.raw.nnz(),
            condensed_nnz = graph.condensed.nnz(),
            free_nnz = graph.free.nnz(),
            "sparsity graph built"
        );
        Ok(graph)
    }

    /// Pattern over every registered DOF.
    pub fn raw(&self) -> &SparsityPattern {
        &self.raw
    }

    /// Pattern over free and fixed DOFs after slave elimination.
    pub fn condensed(&self) -> &SparsityPattern {
        &self.condensed
    }

    /// Condensed pattern restricted to free rows and columns.
    pub fn free(&self) -> &SparsityPattern {
        &self.free
    }
}

fn insert_clique(rows: &mut [BTreeSet<usize>], clique: &[usize]) {
    for &i in clique {
        rows[i].extend(clique.iter().copied());
    }
}

fn to_pattern(n: usize, rows: Vec<BTreeSet<usize>>) -> SolverResult<SparsityPattern> {
    let mut offsets = Vec::with_capacity(n + 1);
    let mut indices = Vec::new();
    offsets.push(0);
    for row in rows {
        indices.extend(row);
        offsets.push(indices.len());
    }
    SparsityPattern::try_from_offsets_and_indices(n, n, offsets, indices)
        .map_err(|e| SolverError::consistency(format!("invalid sparsity pattern: {e}")))
}

/// Storage slot of `(row, col)` in a CSR layout, if structurally present.
pub(crate) fn slot(pattern: &SparsityPattern, row: usize, col: usize) -> Option<usize> {
    let start = pattern.major_offsets()[row];
    pattern.lane(row).binary_search(&col).ok().map(|k| start + k)
}

/// Split CSR `values` into one mutable slice per row.
pub(crate) fn rows_mut<'a>(offsets: &[usize], values: &'a mut [f64]) -> Vec<&'a mut [f64]> {
    let mut rows = Vec::with_capacity(offsets.len().saturating_sub(1));
    let mut rest = values;
    for w in offsets.windows(2) {
        let (row, tail) = std::mem::take(&mut rest).split_at_mut(w[1] - w[0]);
        rows.push(row);
        rest = tail;
    }
    rows
}
