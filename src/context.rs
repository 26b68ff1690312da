//! Per-run analysis context.
//!
//! Passes never touch global state: diagnostics accumulate in pass-local
//! vectors and everything shared (program, oracle, configuration) is
//! threaded through an explicit context, which keeps the passes
//! independently testable and lets bodies be analyzed in parallel.

use crate::tree::Program;
use crate::types::ClassOracle;

/// The one tunable of the core: allocations at or above the threshold are
/// heap-placed even when they do not escape.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub stack_size_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_size_threshold: 4096,
        }
    }
}

pub struct AnalysisContext<'a> {
    pub program: &'a Program,
    pub oracle: &'a dyn ClassOracle,
    pub config: Config,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(program: &'a Program, oracle: &'a dyn ClassOracle, config: Config) -> Self {
        Self {
            program,
            oracle,
            config,
        }
    }
}
