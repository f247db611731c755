//! Compiled package scopes
//!
//! Packages live in an arena owned by [`PackageGraph`] and refer to each
//! other by [`PackageId`]. The graph is read-only once built.

use crate::error::{ResolutionError, ResolutionResult, Result};
use crate::runner::{ActionContext, GlobalContext};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Index of a package in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub(crate) usize);

/// A compiled package
#[derive(Debug)]
pub struct PackageScope {
    pub(crate) uri: Option<String>,
    pub(crate) namespace: String,
    pub(crate) dir: PathBuf,
    pub(crate) env: IndexMap<String, String>,
    pub(crate) actions: IndexMap<String, ActionContext>,
    pub(crate) imports: IndexMap<String, PackageId>,
}

impl PackageScope {
    /// Source URI; `None` for the root package
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Alias path this package was first reached through, empty for the root
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn env(&self) -> &IndexMap<String, String> {
        &self.env
    }

    pub fn action(&self, name: &str) -> Option<&ActionContext> {
        self.actions.get(name)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionContext> {
        self.actions.values()
    }

    pub fn import(&self, alias: &str) -> Option<PackageId> {
        self.imports.get(alias).copied()
    }

    pub fn imports(&self) -> impl Iterator<Item = (&str, PackageId)> {
        self.imports.iter().map(|(alias, id)| (alias.as_str(), *id))
    }
}

/// Arena of compiled packages with a distinguished root
#[derive(Debug)]
pub struct PackageGraph {
    pub(crate) packages: Vec<PackageScope>,
    pub(crate) root: PackageId,
}

impl PackageGraph {
    pub fn root_id(&self) -> PackageId {
        self.root
    }

    pub fn root(&self) -> &PackageScope {
        self.package(self.root)
    }

    pub fn package(&self, id: PackageId) -> &PackageScope {
        &self.packages[id.0]
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Resolve an action reference from inside `from`
    ///
    /// `alias.rest` looks `alias` up in the imports of `from` and resolves
    /// `rest` inside that package; a bare name is one of `from`'s actions.
    pub fn resolve(&self, from: PackageId, reference: &str) -> ResolutionResult<&ActionContext> {
        let mut package = self.package(from);
        let mut remaining = reference;

        while let Some((alias, rest)) = remaining.split_once('.') {
            let id = package
                .import(alias)
                .ok_or_else(|| ResolutionError::UnknownImport {
                    alias: alias.to_string(),
                    reference: reference.to_string(),
                })?;
            package = self.package(id);
            remaining = rest;
        }

        package
            .action(remaining)
            .ok_or_else(|| ResolutionError::UnknownAction(reference.to_string()))
    }

    /// Run an action of the root package
    pub fn run(
        &self,
        global: &GlobalContext,
        action: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<()> {
        let action = self.resolve(self.root, action)?;
        action.run(self, global, args)
    }

    /// Every reachable action as (reference from the root, description)
    ///
    /// Imported actions are listed under the first alias path that reaches
    /// their package.
    pub fn list_actions(&self) -> Vec<(String, Option<&str>)> {
        let mut listed = Vec::new();
        let mut seen = vec![false; self.packages.len()];
        self.collect_actions(self.root, "", &mut seen, &mut listed);
        listed
    }

    fn collect_actions<'a>(
        &'a self,
        id: PackageId,
        prefix: &str,
        seen: &mut Vec<bool>,
        listed: &mut Vec<(String, Option<&'a str>)>,
    ) {
        if std::mem::replace(&mut seen[id.0], true) {
            return;
        }
        let package = self.package(id);
        for action in package.actions() {
            listed.push((format!("{}{}", prefix, action.name()), action.description()));
        }
        for (alias, import) in package.imports() {
            self.collect_actions(import, &format!("{}{}.", prefix, alias), seen, listed);
        }
    }
}
