//! Skip rules

use crate::config::SkipDeclaration;
use crate::runner::{check_shell, GlobalContext, Inputs};

/// Compiled skip rule
#[derive(Debug, Clone, PartialEq)]
pub struct SkipContext {
    pub shell: String,
    pub message: Option<String>,
}

impl SkipContext {
    pub fn from_declaration(declaration: SkipDeclaration) -> Self {
        SkipContext {
            shell: declaration.shell,
            message: declaration.message,
        }
    }

    /// Whether the action should be skipped
    ///
    /// Only a zero exit status skips. A template that does not render, a
    /// non-zero exit and a process that cannot be launched all mean "run".
    pub fn should_skip(&self, inputs: &Inputs, global: &GlobalContext) -> bool {
        let script = match inputs.render(&self.shell) {
            Ok(script) => script,
            Err(e) => {
                log::warn!("skip rule `{}` did not render: {}", self.shell, e);
                return false;
            }
        };
        check_shell(&script, inputs.exports(), global)
    }
}
