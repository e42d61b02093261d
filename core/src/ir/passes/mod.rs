//! Optimisation passes over scopes.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::ir::{printer, Scope};

mod dead_code;
mod inline;
mod local_opt;
mod specialize;

pub use dead_code::DeadCodePass;
pub use inline::{duplicate_ensure_block, inline_closure, inline_method, InlinePass};
pub use local_opt::LocalOptPass;
pub use specialize::SpecializeCallsPass;

/// A transformation over one scope. The manager handles recursion into
/// nested scopes.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(&mut self, scope: &mut Scope) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Enables the speculative method inliner.
    pub inline: bool,
    /// Largest callee (live instruction count) the inliner accepts.
    pub inline_threshold: usize,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            inline: false,
            inline_threshold: 24,
        }
    }
}

/// Ordered pass pipeline.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    dump_after: Option<String>,
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            dump_after: None,
        }
    }

    /// The standard pipeline for `config`.
    pub fn with_config(config: &PassConfig) -> Self {
        let mut pm = Self::new();
        if config.inline {
            pm.add_pass(InlinePass::new(config.inline_threshold));
        }
        pm.add_pass(LocalOptPass);
        pm.add_pass(DeadCodePass);
        pm.add_pass(SpecializeCallsPass);
        pm
    }

    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Prints the listing to stderr after the named pass.
    pub fn set_dump_after(&mut self, pass_name: impl Into<String>) {
        self.dump_after = Some(pass_name.into());
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs every pass over `scope` and, depth first, every nested scope.
    /// Shared nested scopes are copied on write.
    pub fn run(&mut self, scope: &mut Scope) -> Result<()> {
        for instr in scope.instrs_mut().iter_mut() {
            for nested in instr.nested_scopes_mut() {
                self.run(Arc::make_mut(nested))?;
            }
        }
        for pass in &mut self.passes {
            let before = scope.instrs().len();
            pass.run(scope)
                .map_err(|e| e.context(format!("pass {} failed on {}", pass.name(), scope.name())))?;
            debug!(
                target: "irx::passes",
                pass = pass.name(),
                scope = %scope.name(),
                before,
                after = scope.instrs().len(),
                "pass finished"
            );
            if self.dump_after.as_deref() == Some(pass.name()) {
                eprintln!("--- IR after {} ---\n{}", pass.name(), printer::listing(scope));
            }
        }
        info!(target: "irx::passes", scope = %scope.name(), passes = self.passes.len(), "pipeline done");
        Ok(())
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::with_config(&PassConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipeline_order() {
        let pm = PassManager::default();
        assert_eq!(pm.pass_names(), vec!["local-opt", "dead-code", "specialize-calls"]);
        let pm = PassManager::with_config(&PassConfig {
            inline: true,
            ..PassConfig::default()
        });
        assert_eq!(pm.pass_names()[0], "inline");
    }
}
