//! Lightweight performance timing utilities.
//!
//! Timers only measure when timing is enabled, either programmatically or via
//! the `FE_TIMING` environment variable, so the hot path pays one atomic load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable performance timing globally.
pub fn enable_timing() {
    ENABLED.store(true, Ordering::Relaxed);
}

/// Disable performance timing globally.
pub fn disable_timing() {
    ENABLED.store(false, Ordering::Relaxed);
}

/// Check if timing is enabled.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed) || std::env::var("FE_TIMING").is_ok()
}

/// A simple timer that measures elapsed time.
pub struct Timer {
    label: &'static str,
    start: Instant,
    enabled: bool,
}

impl Timer {
    /// Create and start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
            enabled: is_enabled(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Stop the timer and return elapsed time in seconds.
    /// If timing is disabled, returns None.
    pub fn stop(self) -> Option<f64> {
        if self.enabled {
            Some(self.start.elapsed().as_secs_f64())
        } else {
            None
        }
    }
}

/// Per-phase wall times of one build-and-solve call (seconds, zero when disabled).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhaseTimings {
    pub setup_s: f64,
    pub build_s: f64,
    pub condense_s: f64,
    pub dirichlet_s: f64,
    pub solve_s: f64,
    pub back_substitution_s: f64,
}

/// Build phases recorded in [`PhaseTimings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Build,
    Condense,
    Dirichlet,
    Solve,
    BackSubstitution,
}

impl PhaseTimings {
    /// Stop `timer` and store its elapsed time under `phase`.
    pub fn record(&mut self, phase: Phase, timer: Timer) {
        let Some(elapsed) = timer.stop() else {
            return;
        };
        let slot = match phase {
            Phase::Setup => &mut self.setup_s,
            Phase::Build => &mut self.build_s,
            Phase::Condense => &mut self.condense_s,
            Phase::Dirichlet => &mut self.dirichlet_s,
            Phase::Solve => &mut self.solve_s,
            Phase::BackSubstitution => &mut self.back_substitution_s,
        };
        *slot += elapsed;
    }

    pub fn total(&self) -> f64 {
        self.setup_s
            + self.build_s
            + self.condense_s
            + self.dirichlet_s
            + self.solve_s
            + self.back_substitution_s
    }

    /// Print a formatted summary of the statistics.
    pub fn print_summary(&self) {
        if !is_enabled() {
            return;
        }

        println!("\n=== Build-and-solve timing ===");
        println!("Setup:             {:.4}s", self.setup_s);
        println!("Build:             {:.4}s", self.build_s);
        println!("Condense:          {:.4}s", self.condense_s);
        println!("Dirichlet:         {:.4}s", self.dirichlet_s);
        println!("Linear solve:      {:.4}s", self.solve_s);
        println!("Back-substitution: {:.4}s", self.back_substitution_s);
        println!("Total:             {:.4}s", self.total());
        println!("==============================\n");
    }
}
