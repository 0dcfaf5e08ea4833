//! YAML loading for the solver configuration.

use crate::error::CliResult;
use fe_solver::SolverConfig;
use std::path::Path;

pub fn parse_config(text: &str) -> CliResult<SolverConfig> {
    let config: SolverConfig = serde_yaml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: Option<&Path>) -> CliResult<SolverConfig> {
    match path {
        Some(path) => parse_config(&std::fs::read_to_string(path)?),
        None => Ok(SolverConfig::default()),
    }
}

pub fn render_config(config: &SolverConfig) -> CliResult<String> {
    Ok(serde_yaml::to_string(config)?)
}
