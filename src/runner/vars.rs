//! Computed variables

use crate::config::VarDeclaration;
use crate::error::{Result, RunfileError};
use crate::runner::{capture_shell, GlobalContext, Inputs};
use std::collections::BTreeMap;

/// Compiled variable definition
#[derive(Debug, Clone, PartialEq)]
pub enum VarContext {
    Literal(String),
    Shell(String),
}

impl VarContext {
    pub fn from_declaration(declaration: VarDeclaration) -> Self {
        match declaration {
            VarDeclaration::Literal(value) => VarContext::Literal(value),
            VarDeclaration::Shell(shell) => VarContext::Shell(shell),
        }
    }

    /// Compute the value against `inputs`
    pub fn value(&self, inputs: &Inputs, global: &GlobalContext) -> Result<String> {
        match self {
            VarContext::Literal(value) => Ok(value.clone()),
            VarContext::Shell(shell) => {
                let script = inputs.render(shell)?;
                Ok(capture_shell(&script, inputs.exports(), global)?)
            }
        }
    }
}

/// Evaluate every variable in declaration order
///
/// Every variable sees the same `inputs`; values computed here are not
/// visible to the variables declared after them.
pub fn evaluate_vars<'a, I>(
    vars: I,
    inputs: &Inputs,
    global: &GlobalContext,
) -> Result<BTreeMap<String, String>>
where
    I: IntoIterator<Item = (&'a String, &'a VarContext)>,
{
    let mut values = BTreeMap::new();
    for (name, var) in vars {
        log::trace!("evaluating var {}", name);
        let value = var.value(inputs, global).map_err(|e| RunfileError::Var {
            name: name.clone(),
            source: Box::new(e),
        })?;
        values.insert(name.clone(), value);
    }
    Ok(values)
}
