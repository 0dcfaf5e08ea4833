//! Solve orchestrator.
//!
//! One call to [`BuilderAndSolver::solve_increments`] runs the full pipeline:
//!
//! 1. setup (constraint table, registry, condensation map, sparsity graph),
//!    reused while the model and constraint revisions are unchanged
//! 2. raw assembly over every registered DOF
//! 3. slave condensation
//! 4. Dirichlet enforcement
//! 5. linear solve (skipped when there are no free equations)
//! 6. back-substitution of free, fixed and slave increments, then reactions

use crate::assembler::{RawSystem, assemble};
use crate::condenser::{CondensationMap, condense, slave_offsets};
use crate::config::SolverConfig;
use crate::constraints::ConstraintTable;
use crate::dirichlet::{DirichletSystem, apply_dirichlet, prescribed_increments};
use crate::error::{SolveDiagnostics, SolverError, SolverResult};
use crate::linear::{DenseLuSolver, LinearSolver, spmv};
use crate::registry::{DofClass, DofRegistry};
use crate::sparsity::SparsityGraph;
use fe_core::timing::{Phase, PhaseTimings, Timer};
use fe_core::{Real, relative_residual};
use fe_model::{ConstraintProvider, DofKey, ModelProvider};
use nalgebra::DVector;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Topology-dependent state kept between solves.
#[derive(Debug, Clone)]
pub(crate) struct SetupCache {
    pub(crate) model_revision: u64,
    pub(crate) constraint_revision: u64,
    pub(crate) table: ConstraintTable,
    pub(crate) registry: DofRegistry,
    pub(crate) map: CondensationMap,
    pub(crate) graph: SparsityGraph,
}

/// Result of one linearized solve.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSolution {
    /// Increment of every registered DOF (free, fixed and slave)
    pub increments: BTreeMap<DofKey, Real>,
    /// `(A Δ - b)` at fixed and slave DOFs; empty when reactions are off
    pub reactions: BTreeMap<DofKey, Real>,
    /// Linear solver that produced the free increments
    pub solver: String,
    /// Size of the system handed to the linear solver
    pub system_size: usize,
    /// Stored entries of that system
    pub nnz: usize,
    /// `||A x - b|| / max(||b||, 1)` of the solved system
    pub relative_residual: Real,
    pub timings: PhaseTimings,
}

impl StepSolution {
    pub fn increment(&self, key: DofKey) -> Option<Real> {
        self.increments.get(&key).copied()
    }

    pub fn reaction(&self, key: DofKey) -> Option<Real> {
        self.reactions.get(&key).copied()
    }
}

/// Builds, condenses and solves the global system of a [`ModelProvider`].
pub struct BuilderAndSolver {
    config: SolverConfig,
    linear_solver: Box<dyn LinearSolver>,
    pub(crate) cache: Option<SetupCache>,
    setups: u64,
}

impl BuilderAndSolver {
    pub fn new(config: SolverConfig, linear_solver: Box<dyn LinearSolver>) -> SolverResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            linear_solver,
            cache: None,
            setups: 0,
        })
    }

    /// Default configuration with the dense LU backend.
    pub fn with_defaults() -> Self {
        Self {
            config: SolverConfig::default(),
            linear_solver: Box::new(DenseLuSolver::default()),
            cache: None,
            setups: 0,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn linear_solver_name(&self) -> &str {
        self.linear_solver.name()
    }

    pub(crate) fn linear_solver_mut(&mut self) -> &mut dyn LinearSolver {
        self.linear_solver.as_mut()
    }

    /// Number of times the topology-dependent state has been built.
    pub fn setup_count(&self) -> u64 {
        self.setups
    }

    /// Drop cached setup; the next call rebuilds everything.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn registry(&self) -> Option<&DofRegistry> {
        self.cache.as_ref().map(|c| &c.registry)
    }

    pub fn constraint_table(&self) -> Option<&ConstraintTable> {
        self.cache.as_ref().map(|c| &c.table)
    }

    pub fn sparsity(&self) -> Option<&SparsityGraph> {
        self.cache.as_ref().map(|c| &c.graph)
    }

    /// Build or reuse the topology-dependent state.
    ///
    /// The constraint table is built first, so cyclic or malformed relations
    /// are rejected before any element is evaluated.
    pub fn setup<M, C>(&mut self, model: &M, constraints: &C) -> SolverResult<()>
    where
        M: ModelProvider + ?Sized,
        C: ConstraintProvider + ?Sized,
    {
        let model_revision = model.topology_revision();
        let constraint_revision = constraints.constraint_revision();
        if self.config.reuse_sparsity
            && self.cache.as_ref().is_some_and(|c| {
                c.model_revision == model_revision && c.constraint_revision == constraint_revision
            })
        {
            return Ok(());
        }

        let table = ConstraintTable::from_provider(constraints)?;
        let registry = DofRegistry::build(model, &table)?;
        let map = CondensationMap::build(&registry, &table)?;
        let graph = SparsityGraph::build(model, &registry, &map)?;
        self.setups += 1;
        debug!(
            setups = self.setups,
            dofs = registry.len(),
            free = registry.n_free(),
            fixed = registry.n_fixed(),
            slaves = registry.n_slave(),
            flatten_passes = table.flatten_passes(),
            "builder setup rebuilt"
        );

        self.cache = Some(SetupCache {
            model_revision,
            constraint_revision,
            table,
            registry,
            map,
            graph,
        });
        Ok(())
    }

    pub(crate) fn cached(&self) -> SolverResult<&SetupCache> {
        self.cache
            .as_ref()
            .ok_or_else(|| SolverError::consistency("builder used before setup"))
    }

    /// Assemble the raw system over every registered DOF.
    pub fn build<M, C>(&mut self, model: &M, constraints: &C) -> SolverResult<RawSystem>
    where
        M: ModelProvider,
        C: ConstraintProvider + ?Sized,
    {
        self.setup(model, constraints)?;
        let cache = self.cached()?;
        assemble(model, &cache.registry, cache.graph.raw(), self.config.assembly)
    }

    /// Condensed, Dirichlet-applied system as it would be handed to the
    /// linear solver.
    pub fn build_linear_system<M, C>(
        &mut self,
        model: &M,
        constraints: &C,
    ) -> SolverResult<DirichletSystem>
    where
        M: ModelProvider,
        C: ConstraintProvider + ?Sized,
    {
        self.setup(model, constraints)?;
        let cache = self.cached()?;
        let mut timings = PhaseTimings::default();
        let prepared = prepare(&self.config, cache, model, &mut timings)?;
        Ok(prepared.system)
    }

    /// Solve for the increments of the current state without touching the
    /// model.
    pub fn solve_increments<M, C>(&mut self, model: &M, constraints: &C) -> SolverResult<StepSolution>
    where
        M: ModelProvider,
        C: ConstraintProvider + ?Sized,
    {
        let mut timings = PhaseTimings::default();
        let timer = Timer::start("setup");
        self.setup(model, constraints)?;
        timings.record(Phase::Setup, timer);

        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| SolverError::consistency("builder used before setup"))?;
        let prepared = prepare(&self.config, cache, model, &mut timings)?;
        let system = &prepared.system;

        let timer = Timer::start("solve");
        let (solution, residual) = if system.n_free == 0 {
            debug!("no free equations; linear solve skipped");
            (DVector::zeros(system.rhs.len()), 0.0)
        } else {
            let x = solve_linear(self.linear_solver.as_mut(), system)?;
            let ax = spmv(&system.lhs, &x);
            let residual = relative_residual(ax.as_slice(), system.rhs.as_slice());
            (x, residual)
        };
        timings.record(Phase::Solve, timer);

        let timer = Timer::start("back_substitution");
        let y = system.recover(&solution);
        let delta = cache.map.expand(&y, Some(&prepared.offsets));

        let registry = &cache.registry;
        let increments: BTreeMap<DofKey, Real> = registry
            .keys()
            .iter()
            .copied()
            .zip(delta.iter().copied())
            .collect();

        let mut reactions = BTreeMap::new();
        if self.config.compute_reactions {
            let r = spmv(&prepared.raw.lhs, &delta) - &prepared.raw.rhs;
            for (p, &key) in registry.keys().iter().enumerate() {
                if registry.class(p) != DofClass::Free {
                    reactions.insert(key, r[p]);
                }
            }
        }
        timings.record(Phase::BackSubstitution, timer);

        debug!(
            solver = self.linear_solver.name(),
            size = system.rhs.len(),
            nnz = system.lhs.nnz(),
            residual,
            "step solved"
        );
        Ok(StepSolution {
            increments,
            reactions,
            solver: self.linear_solver.name().to_string(),
            system_size: system.rhs.len(),
            nnz: system.lhs.nnz(),
            relative_residual: residual,
            timings,
        })
    }

    /// Solve and write equation ids, increments and reactions back into the
    /// model. DOFs without a computed reaction have theirs reset to zero.
    pub fn solve_step<M, C>(&mut self, model: &mut M, constraints: &C) -> SolverResult<StepSolution>
    where
        M: ModelProvider,
        C: ConstraintProvider + ?Sized,
    {
        let solution = self.solve_increments(&*model, constraints)?;
        self.cached()?.registry.attach(model)?;
        for (&key, &increment) in &solution.increments {
            let reaction = solution.reaction(key).unwrap_or(0.0);
            model.apply_increment(key, increment, Some(reaction))?;
        }
        Ok(solution)
    }
}

/// Raw system, slave offsets and solver-ready system of one step.
struct Prepared {
    raw: RawSystem,
    offsets: DVector<Real>,
    system: DirichletSystem,
}

fn prepare<M: ModelProvider>(
    config: &SolverConfig,
    cache: &SetupCache,
    model: &M,
    timings: &mut PhaseTimings,
) -> SolverResult<Prepared> {
    let timer = Timer::start("build");
    let raw = assemble(model, &cache.registry, cache.graph.raw(), config.assembly)?;
    timings.record(Phase::Build, timer);

    let timer = Timer::start("condense");
    let offsets = slave_offsets(&cache.registry, &cache.table, model)?;
    let condensed = condense(&raw, &cache.map, cache.graph.condensed(), Some(&offsets))?;
    timings.record(Phase::Condense, timer);

    let timer = Timer::start("dirichlet");
    let prescribed = prescribed_increments(model, &cache.registry)?;
    let system = apply_dirichlet(
        condensed,
        cache.registry.n_free(),
        prescribed,
        cache.graph.free(),
        config.dirichlet,
        config.diagonal_scale,
    )?;
    timings.record(Phase::Dirichlet, timer);

    Ok(Prepared {
        raw,
        offsets,
        system,
    })
}

/// Run the backend and wrap its failure with diagnostics.
pub(crate) fn solve_linear(
    solver: &mut dyn LinearSolver,
    system: &DirichletSystem,
) -> SolverResult<DVector<Real>> {
    let size = system.rhs.len();
    let nnz = system.lhs.nnz();
    let result = solver
        .initialize(size, nnz)
        .and_then(|()| solver.solve(&system.lhs, &system.rhs));
    solver.finalize();

    result.map_err(|source| {
        warn!(solver = solver.name(), size, nnz, error = %source, "linear solve failed");
        SolverError::LinearSolve {
            solver: solver.name().to_string(),
            diagnostics: SolveDiagnostics {
                system_size: size,
                nnz,
                condition_hint: source.condition_hint(),
            },
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirichletPolicy;
    use fe_model::elements::{PointLoad, Spring};
    use fe_model::{ConstraintSet, Model, ModelBuilder, Variable};
    use nalgebra_sparse::convert::serial::convert_csr_dense;

    fn two_node(k: Real, f: Real) -> (Model, DofKey, DofKey) {
        let mut b = ModelBuilder::new();
        let n0 = b.add_node([0.0; 3]);
        let n1 = b.add_node([1.0, 0.0, 0.0]);
        let u0 = b.add_dof(n0, Variable::DisplacementX);
        let u1 = b.add_dof(n1, Variable::DisplacementX);
        b.add_element(Box::new(Spring::new("spring", u0, u1, k)));
        b.add_condition(Box::new(PointLoad::new("load", u1, f)));
        b.fix(u0, 0.0);
        (b.build().unwrap(), u0, u1)
    }

    #[test]
    fn two_node_chain() {
        let (model, u0, u1) = two_node(4.0, 2.0);
        let constraints = ConstraintSet::new();
        let mut bs = BuilderAndSolver::with_defaults();

        let system = bs.build_linear_system(&model, &constraints).unwrap();
        assert_eq!(convert_csr_dense(&system.lhs)[(0, 0)], 4.0);
        assert_eq!(system.rhs.as_slice(), &[2.0]);

        let sol = bs.solve_increments(&model, &constraints).unwrap();
        assert!((sol.increment(u1).unwrap() - 0.5).abs() < 1e-14);
        assert_eq!(sol.increment(u0), Some(0.0));
        // (A x - b) at the support: -k u1 - 0
        assert!((sol.reaction(u0).unwrap() + 2.0).abs() < 1e-12);
        assert_eq!(sol.reaction(u1), None);
        assert_eq!(sol.system_size, 1);
        assert_eq!(sol.solver, "dense-lu");
    }

    #[test]
    fn setup_is_reused_until_revision_changes() {
        let (mut model, _, u1) = two_node(1.0, 1.0);
        let mut constraints = ConstraintSet::new();
        let mut bs = BuilderAndSolver::with_defaults();

        bs.setup(&model, &constraints).unwrap();
        let first = bs.cache.as_ref().unwrap().model_revision;
        bs.setup(&model, &constraints).unwrap();
        assert_eq!(bs.cache.as_ref().unwrap().model_revision, first);

        model.fix(u1, 0.0).unwrap();
        bs.setup(&model, &constraints).unwrap();
        assert_ne!(bs.cache.as_ref().unwrap().model_revision, first);
        assert_eq!(bs.registry().unwrap().n_free(), 0);

        constraints.clear();
        let before = bs.cache.as_ref().unwrap().constraint_revision;
        bs.setup(&model, &constraints).unwrap();
        assert_ne!(bs.cache.as_ref().unwrap().constraint_revision, before);

        bs.invalidate();
        assert!(bs.registry().is_none());
    }

    #[test]
    fn all_fixed_skips_linear_solve() {
        let (mut model, u0, u1) = two_node(2.0, 1.0);
        model.fix(u1, 0.25).unwrap();
        let config = SolverConfig {
            dirichlet: DirichletPolicy::DiagonalScaling,
            ..Default::default()
        };
        let mut bs = BuilderAndSolver::new(config, Box::new(DenseLuSolver::default())).unwrap();
        let sol = bs.solve_step(&mut model, &ConstraintSet::new()).unwrap();
        assert_eq!(sol.increment(u1), Some(0.25));
        assert_eq!(sol.relative_residual, 0.0);
        assert_eq!(model.value(u1), Some(0.25));
        // -k * 0.25 at u0, k * 0.25 - 1 at u1
        assert!((model.reaction(u0).unwrap() + 0.5).abs() < 1e-14);
        assert!((model.reaction(u1).unwrap() + 0.5).abs() < 1e-14);
    }

    #[test]
    fn reactions_can_be_switched_off() {
        let (mut model, u0, u1) = two_node(4.0, 2.0);
        let constraints = ConstraintSet::new();
        let mut bs = BuilderAndSolver::with_defaults();
        bs.solve_step(&mut model, &constraints).unwrap();
        assert!((model.reaction(u0).unwrap() + 2.0).abs() < 1e-12);

        let config = SolverConfig {
            compute_reactions: false,
            ..Default::default()
        };
        let mut bs = BuilderAndSolver::new(config, Box::new(DenseLuSolver::default())).unwrap();
        model.fix(u0, 0.1).unwrap();
        let sol = bs.solve_step(&mut model, &constraints).unwrap();
        assert!(sol.reactions.is_empty());
        assert_eq!(model.value(u0), Some(0.1));
        assert_eq!(model.reaction(u0), Some(0.0));
        assert_eq!(model.reaction(u1), Some(0.0));
    }

    #[test]
    fn setup_rebuilt_every_call_without_reuse() {
        let (model, _, _) = two_node(1.0, 1.0);
        let constraints = ConstraintSet::new();

        let mut reuse = BuilderAndSolver::with_defaults();
        reuse.solve_increments(&model, &constraints).unwrap();
        reuse.solve_increments(&model, &constraints).unwrap();
        assert_eq!(reuse.setup_count(), 1);

        let config = SolverConfig {
            reuse_sparsity: false,
            ..Default::default()
        };
        let mut fresh = BuilderAndSolver::new(config, Box::new(DenseLuSolver::default())).unwrap();
        let first = fresh.solve_increments(&model, &constraints).unwrap();
        let second = fresh.solve_increments(&model, &constraints).unwrap();
        assert_eq!(fresh.setup_count(), 2);
        assert_eq!(first.increments, second.increments);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SolverConfig {
            diagonal_scale: crate::config::DiagonalScale::Explicit(-1.0),
            ..Default::default()
        };
        assert!(BuilderAndSolver::new(config, Box::new(DenseLuSolver::default())).is_err());
    }
}
