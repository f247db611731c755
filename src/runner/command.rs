//! Command execution
//!
//! Shell primitives shared by commands, variables and skip rules, and the
//! compiled form of a command entry.

use crate::config::CommandDeclaration;
use crate::error::{ExecutionError, ExecutionResult, Result};
use crate::runner::{
    template, GlobalContext, Inputs, PackageGraph, PackageId, Sink, Verbosity,
};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::process::{Command as StdCommand, ExitStatus, Stdio};

/// Compiled command entry
#[derive(Debug, Clone, PartialEq)]
pub enum CommandContext {
    /// Shell template
    Shell(String),

    /// Invocation of another action with raw argument templates
    Action {
        target: String,
        args: IndexMap<String, String>,
    },
}

impl CommandContext {
    /// Create from declaration
    pub fn from_declaration(declaration: CommandDeclaration) -> Self {
        match declaration {
            CommandDeclaration::Shell(shell) => CommandContext::Shell(shell),
            CommandDeclaration::Action { action, args } => CommandContext::Action {
                target: action,
                args,
            },
        }
    }

    /// Execute the command for an action of `package`
    pub fn run(
        &self,
        graph: &PackageGraph,
        package: PackageId,
        global: &GlobalContext,
        inputs: &Inputs,
    ) -> Result<()> {
        match self {
            CommandContext::Shell(shell) => {
                let script = inputs.render(shell)?;
                run_shell(&script, inputs.exports(), global)?;
            }
            CommandContext::Action { target, args } => {
                let passed = template::render_map(args, inputs.data())?;
                let action = graph.resolve(package, target)?;
                action.run(graph, global, &passed)?;
            }
        }
        Ok(())
    }
}

fn prepare(
    script: &str,
    exports: &BTreeMap<String, String>,
    global: &GlobalContext,
) -> ExecutionResult<StdCommand> {
    let mut command = global
        .shell_command(script)
        .ok_or(ExecutionError::NoInterpreter)?;
    command.envs(exports);
    Ok(command)
}

fn spawn_error(script: &str) -> impl FnOnce(io::Error) -> ExecutionError + '_ {
    move |source| ExecutionError::Spawn {
        command: script.to_string(),
        source,
    }
}

fn check_status(script: &str, status: ExitStatus) -> ExecutionResult<()> {
    if !status.success() {
        return Err(ExecutionError::CommandFailed {
            command: script.to_string(),
            code: status.code(),
        });
    }
    Ok(())
}

/// Execute a shell command with the context's standard streams
pub fn run_shell(
    script: &str,
    exports: &BTreeMap<String, String>,
    global: &GlobalContext,
) -> ExecutionResult<()> {
    log::debug!("running shell: {}", script);
    let mut command = prepare(script, exports, global)?;
    command.stdin(global.stdin());

    match global.sink() {
        Sink::Passthrough => {
            command.stdout(if global.verbosity() == Verbosity::Silent {
                Stdio::null()
            } else {
                Stdio::inherit()
            });
            command.stderr(Stdio::inherit());
            let status = command.status().map_err(spawn_error(script))?;
            check_status(script, status)
        }
        Sink::Channel(_) => {
            // stdout and stderr share one pipe so their interleaving survives
            let (mut reader, writer) = io::pipe().map_err(spawn_error(script))?;
            let stderr = writer.try_clone().map_err(spawn_error(script))?;
            command.stdout(writer);
            command.stderr(stderr);

            let mut child = command.spawn().map_err(spawn_error(script))?;
            // Release our copies of the write end, otherwise the read never sees EOF
            drop(command);

            let mut buffer = [0u8; 8192];
            let mut sink = global;
            loop {
                let read = match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(read) => read,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::warn!("failed to read output of `{}`: {}", script, e);
                        break;
                    }
                };
                // Writing to the context cannot fail
                let _ = sink.write_all(&buffer[..read]);
            }

            let status = child.wait().map_err(spawn_error(script))?;
            check_status(script, status)
        }
    }
}

/// Execute a shell command and return its trimmed standard output
pub fn capture_shell(
    script: &str,
    exports: &BTreeMap<String, String>,
    global: &GlobalContext,
) -> ExecutionResult<String> {
    log::debug!("capturing shell: {}", script);
    let mut command = prepare(script, exports, global)?;
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(match global.sink() {
        Sink::Passthrough => Stdio::inherit(),
        Sink::Channel(_) => Stdio::piped(),
    });

    let output = command.output().map_err(spawn_error(script))?;
    if !output.stderr.is_empty() {
        let _ = (&*global).write_all(&output.stderr);
    }
    check_status(script, output.status)?;

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check if a command succeeds
///
/// A process that cannot be launched counts as a failed check.
pub fn check_shell(
    script: &str,
    exports: &BTreeMap<String, String>,
    global: &GlobalContext,
) -> bool {
    log::debug!("checking shell: {}", script);
    let Ok(mut command) = prepare(script, exports, global) else {
        return false;
    };
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    match command.status() {
        Ok(status) => status.success(),
        Err(e) => {
            log::debug!("check `{}` could not be launched: {}", script, e);
            false
        }
    }
}
