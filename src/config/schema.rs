//! Package validation
//!
//! Checks that can be made on a single package before anything runs.
//! References into imported packages are left to run time, where an
//! unknown name is reported at the point of reference.

use crate::config::types::{ActionDeclaration, CommandDeclaration, PackageDeclaration};
use crate::error::{ConfigError, ConfigResult};
use std::collections::HashSet;

/// Validate a complete package declaration
pub fn validate_package(package: &PackageDeclaration) -> ConfigResult<()> {
    for alias in package.imports.keys() {
        if alias.contains('.') {
            return Err(ConfigError::DottedName(alias.clone()));
        }
    }

    for name in package.actions.keys() {
        if name.contains('.') {
            return Err(ConfigError::DottedName(name.clone()));
        }
    }

    detect_circular_references(package)
}

/// Names of local actions an action refers to, in declaration order
///
/// Qualified references point into another package and cannot close a
/// cycle back into this one, so they are not followed.
pub fn local_references(action: &ActionDeclaration) -> Vec<&str> {
    let deps = action.deps.iter().map(String::as_str);
    let cmds = action.cmds.iter().filter_map(|cmd| match cmd {
        CommandDeclaration::Action { action, .. } => Some(action.as_str()),
        CommandDeclaration::Shell(_) => None,
    });
    deps.chain(cmds).filter(|name| !name.contains('.')).collect()
}

/// Detect cycles among local action references
fn detect_circular_references(package: &PackageDeclaration) -> ConfigResult<()> {
    let mut visited = HashSet::new();
    for name in package.actions.keys() {
        let mut stack = Vec::new();
        check_action_cycle(package, name, &mut visited, &mut stack)?;
    }
    Ok(())
}

/// Recursively check for cycles starting at one action
fn check_action_cycle<'a>(
    package: &'a PackageDeclaration,
    name: &'a str,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> ConfigResult<()> {
    if stack.contains(&name) {
        stack.push(name);
        return Err(ConfigError::CircularReference(stack.join(" -> ")));
    }

    if visited.contains(name) {
        return Ok(());
    }

    // Unknown names are reported when they are reached at run time
    let Some(action) = package.actions.get(name) else {
        return Ok(());
    };

    stack.push(name);
    for reference in local_references(action) {
        check_action_cycle(package, reference, visited, stack)?;
    }
    stack.pop();
    visited.insert(name);

    Ok(())
}
