mod config;
mod error;
mod problems;

use clap::{Parser, Subcommand};
use error::{CliError, CliResult};
use fe_core::timing;
use fe_model::{Model, ModelProvider};
use fe_solver::{
    AdjointResponse, BuilderAndSolver, ConjugateGradientSolver, DenseLuSolver, LinearSolver,
    NodalDisplacementResponse, SensitivityAccumulator, SolverConfig, StepSolution,
};
use problems::Problem;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fe-cli")]
#[command(about = "Constrained finite-element builder-and-solver driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a demo problem with Newton iterations
    Solve {
        #[arg(value_enum)]
        problem: Problem,
        /// Solver configuration YAML file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Maximum Newton iterations
        #[arg(long, default_value_t = 25)]
        max_iterations: usize,
        /// Convergence threshold on the increment norm
        #[arg(long, default_value_t = 1e-10)]
        tolerance: f64,
        /// Use the conjugate gradient backend instead of dense LU
        #[arg(long)]
        cg: bool,
        /// Print per-phase timings
        #[arg(long)]
        timing: bool,
    },
    /// Solve a demo problem, then compute adjoint design sensitivities
    Sensitivity {
        #[arg(value_enum)]
        problem: Problem,
        /// Solver configuration YAML file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the effective solver configuration as YAML
    Config {
        /// Solver configuration YAML file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            problem,
            config,
            max_iterations,
            tolerance,
            cg,
            timing: show_timing,
        } => {
            if show_timing {
                timing::enable_timing();
            }
            let config = config::load_config(config.as_deref())?;
            cmd_solve(problem, config, max_iterations, tolerance, cg)
        }
        Commands::Sensitivity { problem, config } => {
            let config = config::load_config(config.as_deref())?;
            cmd_sensitivity(problem, config)
        }
        Commands::Config { config } => {
            let config = config::load_config(config.as_deref())?;
            print!("{}", config::render_config(&config)?);
            Ok(())
        }
    }
}

fn backend(cg: bool) -> Box<dyn LinearSolver> {
    if cg {
        Box::new(ConjugateGradientSolver::default())
    } else {
        Box::new(DenseLuSolver::default())
    }
}

/// Newton loop: solve for increments until they vanish.
fn iterate(
    bs: &mut BuilderAndSolver,
    model: &mut Model,
    constraints: &fe_model::ConstraintSet,
    max_iterations: usize,
    tolerance: f64,
) -> CliResult<(usize, StepSolution)> {
    let mut last = f64::INFINITY;
    for iteration in 1..=max_iterations {
        let step = bs.solve_step(model, constraints)?;
        let norm = step
            .increments
            .values()
            .map(|du| du * du)
            .sum::<f64>()
            .sqrt();
        println!(
            "  iteration {iteration:>3}: |du| = {norm:.3e}, linear residual = {:.3e}",
            step.relative_residual
        );
        if norm <= tolerance {
            return Ok((iteration, step));
        }
        last = norm;
    }
    Err(CliError::NotConverged {
        iterations: max_iterations,
        increment: last,
    })
}

fn cmd_solve(
    problem: Problem,
    config: SolverConfig,
    max_iterations: usize,
    tolerance: f64,
    cg: bool,
) -> CliResult<()> {
    let mut demo = problems::build(problem)?;
    let mut bs = BuilderAndSolver::new(config, backend(cg))?;
    println!("Solving {problem:?} with {}", bs.linear_solver_name());

    let (iterations, last) = iterate(
        &mut bs,
        &mut demo.model,
        &demo.constraints,
        max_iterations,
        tolerance,
    )?;
    println!("✓ Converged in {iterations} iterations");

    if let Some(registry) = bs.registry() {
        println!(
            "  DOFs: {} ({} free, {} fixed, {} slave), system size {}, nnz {}",
            registry.len(),
            registry.n_free(),
            registry.n_fixed(),
            registry.n_slave(),
            last.system_size,
            last.nnz
        );
    }

    println!("  {:<16} {:>14} {:>14}", "DOF", "value", "reaction");
    for (key, state) in demo.model.dofs() {
        let reaction = if state.equation_id.is_none() {
            format!("{:>14.6e}", state.reaction)
        } else {
            format!("{:>14}", "-")
        };
        println!("  {:<16} {:>14.6e} {reaction}", key.to_string(), state.value);
    }

    last.timings.print_summary();
    Ok(())
}

fn cmd_sensitivity(problem: Problem, config: SolverConfig) -> CliResult<()> {
    let mut demo = problems::build(problem)?;
    let mut bs = BuilderAndSolver::new(config, backend(false))?;
    iterate(&mut bs, &mut demo.model, &demo.constraints, 50, 1e-12)?;

    let response = NodalDisplacementResponse::new(demo.response);
    let adjoint = bs.solve_adjoint(&demo.model, &demo.constraints, &response)?;
    let mut accumulator = SensitivityAccumulator::default();
    accumulator.accumulate(&demo.model, &response, &adjoint, &demo.design)?;

    let value = response.value(&demo.model).unwrap_or(f64::NAN);
    println!("Response {} at {} = {value:.6e}", response.name(), demo.response);
    for (var, total) in accumulator.totals() {
        println!("  d/d{var} = {total:.6e}");
    }
    tracing::debug!(
        topology = demo.model.topology_revision(),
        "sensitivity run finished"
    );
    Ok(())
}
