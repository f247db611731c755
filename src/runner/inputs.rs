//! Substitution environment of one action invocation
//!
//! Built in layers: fixed values, then `args`, then `vars`, then `env`.
//! Each layer is evaluated against the layers below it only.

use crate::error::TemplateResult;
use crate::runner::template::{self, Value};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Inputs {
    data: Value,
    /// Declared env entries, exported to child processes
    exports: BTreeMap<String, String>,
}

impl Inputs {
    /// Fixed values: `os`, `arch` and the owning package's `dir`
    pub fn fixed(dir: &Path) -> Self {
        let mut data = Value::map();
        let dir = dir.to_string_lossy().into_owned();
        for (names, value) in [
            (["os", "OS"], env::consts::OS.to_string()),
            (["arch", "ARCH"], env::consts::ARCH.to_string()),
            (["dir", "DIR"], dir),
        ] {
            for name in names {
                data.insert(name, value.clone());
            }
        }
        Inputs {
            data,
            exports: BTreeMap::new(),
        }
    }

    /// Add a map layer under both its lower and upper case name
    pub fn with_layer(mut self, name: &str, values: BTreeMap<String, String>) -> Self {
        let layer: Value = values.into_iter().collect();
        self.data.insert(name.to_uppercase(), layer.clone());
        self.data.insert(name, layer);
        self
    }

    /// Add the env layer: process environment overlaid with `exports`
    pub fn with_env(mut self, exports: BTreeMap<String, String>) -> Self {
        let mut visible: BTreeMap<String, String> = env::vars().collect();
        visible.extend(exports.clone());
        self.exports = exports;
        self.with_layer("env", visible)
    }

    /// Substitute this environment into a template
    pub fn render(&self, template: &str) -> TemplateResult<String> {
        template::render(template, &self.data)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn exports(&self) -> &BTreeMap<String, String> {
        &self.exports
    }
}
