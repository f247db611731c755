//! Action execution
//!
//! An [`ActionContext`] is the compiled, immutable form of one declared
//! action. Everything a run computes (rendered args, vars, env) lives on
//! the stack of that run, so the same action can be invoked any number of
//! times, including as a shared dependency.

use crate::config::ActionDeclaration;
use crate::error::{Result, RunfileError};
use crate::runner::{
    evaluate_vars, template, CommandContext, Event, GlobalContext, Inputs, PackageGraph,
    PackageId, SkipContext, VarContext,
};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::time::Instant;

/// Compiled action
#[derive(Debug, Clone)]
pub struct ActionContext {
    package: PackageId,
    name: String,
    qualified_name: String,
    description: Option<String>,
    dependencies: Vec<String>,
    skip: Option<SkipContext>,
    vars: IndexMap<String, VarContext>,
    env: IndexMap<String, String>,
    commands: Vec<CommandContext>,
}

impl ActionContext {
    /// Create from declaration, bound to `package`
    pub fn from_declaration(
        package: PackageId,
        namespace: &str,
        name: String,
        declaration: ActionDeclaration,
    ) -> Self {
        let qualified_name = if namespace.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", namespace, name)
        };

        ActionContext {
            package,
            name,
            qualified_name,
            description: declaration.description,
            dependencies: declaration.deps,
            skip: declaration.skip.map(SkipContext::from_declaration),
            vars: declaration
                .vars
                .into_iter()
                .map(|(k, v)| (k, VarContext::from_declaration(v)))
                .collect(),
            env: declaration.env,
            commands: declaration
                .cmds
                .into_iter()
                .map(CommandContext::from_declaration)
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name including the alias path of the owning package
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn package(&self) -> PackageId {
        self.package
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn commands(&self) -> &[CommandContext] {
        &self.commands
    }

    /// Run the action with the given arguments
    ///
    /// Emits a start event before anything else and a finish event when
    /// done, whether or not the run succeeded.
    pub fn run(
        &self,
        graph: &PackageGraph,
        global: &GlobalContext,
        passed_args: &BTreeMap<String, String>,
    ) -> Result<()> {
        let started = Instant::now();
        global.emit(Event::start(&self.qualified_name));

        let result = self.execute(graph, global, passed_args);

        global.emit(Event::finish(&self.qualified_name, started.elapsed()));
        result.map_err(|e| e.in_action(&self.qualified_name))
    }

    fn execute(
        &self,
        graph: &PackageGraph,
        global: &GlobalContext,
        passed_args: &BTreeMap<String, String>,
    ) -> Result<()> {
        // Dependencies run even when this action ends up skipped
        for dependency in &self.dependencies {
            log::debug!("{}: running dependency {}", self.qualified_name, dependency);
            let action = graph.resolve(self.package, dependency)?;
            action.run(graph, global, passed_args)?;
        }

        let inputs = self.assemble_inputs(graph, global, passed_args)?;

        if let Some(skip) = &self.skip {
            if skip.should_skip(&inputs, global) {
                let message = skip.message.as_deref().unwrap_or("skip rule matched");
                log::info!("skipping {}: {}", self.qualified_name, message);
                global.emit(Event::output(format!(" - skipping - {}\n", message)));
                return Ok(());
            }
        }

        let package = self.package;
        for command in &self.commands {
            command.run(graph, package, global, &inputs)?;
        }

        Ok(())
    }

    /// Build the substitution environment for one run
    fn assemble_inputs(
        &self,
        graph: &PackageGraph,
        global: &GlobalContext,
        passed_args: &BTreeMap<String, String>,
    ) -> Result<Inputs> {
        let scope = graph.package(self.package);
        let fixed = Inputs::fixed(scope.dir());

        // Args see the fixed values only
        let args = template::render_map(passed_args, fixed.data())?;
        let inputs = fixed.with_layer("args", args);

        // Vars see fixed values and args, never each other
        let vars = evaluate_vars(&self.vars, &inputs, global)?;
        let inputs = inputs.with_layer("vars", vars);

        let mut exports = BTreeMap::new();
        for (key, value) in scope.env().iter().chain(self.env.iter()) {
            let value = inputs.render(value).map_err(RunfileError::from)?;
            exports.insert(key.clone(), value);
        }

        Ok(inputs.with_env(exports))
    }
}
