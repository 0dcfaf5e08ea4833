use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid solver config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Model error: {0}")]
    Model(#[from] fe_model::ModelError),

    #[error("Element error: {0}")]
    Element(#[from] fe_model::ElementError),

    #[error("Solver error: {0}")]
    Solver(#[from] fe_solver::SolverError),

    #[error("No convergence after {iterations} iterations (last increment {increment:e})")]
    NotConverged { iterations: usize, increment: f64 },
}

pub type CliResult<T> = Result<T, CliError>;
