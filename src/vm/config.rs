//! Runtime configuration for the Atomizer.
//!
//! Every knob has a default and most can be switched on from the
//! environment. Command line flags are applied on top by the binary.

use std::env;

use crate::particle::GcConfig;

/// Atomizer limits and debugging switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum operand stack depth.
    pub stack_max: usize,
    /// Maximum call frame depth.
    pub frames_max: usize,
    pub gc_initial_threshold: usize,
    pub gc_growth_factor: usize,
    /// Collect at every safe point that follows an allocation (`NUC_GC_STRESS`).
    pub gc_stress: bool,
    /// Log every collection to stderr (`NUC_LOG_GC`).
    pub log_gc: bool,
    /// Print each instruction and the stack as it executes (`NUC_TRACE`).
    pub trace_execution: bool,
    /// Disassemble every script after compiling it (`NUC_PRINT_CODE`).
    pub print_code: bool,
    /// How many frames an uncaught disruption prints.
    pub trace_lookback: usize,
    /// Colored diagnostics; off when `NUC_NO_COLOR` is set.
    pub color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_max: 65536,
            frames_max: 256,
            gc_initial_threshold: 1024 * 1024,
            gc_growth_factor: 2,
            gc_stress: false,
            log_gc: false,
            trace_execution: false,
            print_code: false,
            trace_lookback: 8,
            color: true,
        }
    }
}

impl Config {
    /// Defaults overridden by `NUC_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gc_initial_threshold: env_usize("NUC_GC_THRESHOLD")
                .unwrap_or(defaults.gc_initial_threshold),
            gc_stress: env_flag("NUC_GC_STRESS"),
            log_gc: env_flag("NUC_LOG_GC"),
            trace_execution: env_flag("NUC_TRACE"),
            print_code: env_flag("NUC_PRINT_CODE"),
            color: !env_flag("NUC_NO_COLOR"),
            ..defaults
        }
    }

    /// The collector's share of the configuration.
    pub fn gc(&self) -> GcConfig {
        GcConfig {
            initial_threshold: self.gc_initial_threshold,
            growth_factor: self.gc_growth_factor.max(1),
            stress: self.gc_stress,
            log: self.log_gc,
        }
    }
}

/// True when the variable is set to anything but an empty string, `0` or `false`.
fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => !matches!(value.trim(), "" | "0" | "false"),
        Err(_) => false,
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok()?.trim().parse().ok()
}
