//! Package graph loading
//!
//! Loading happens in two phases. The fetch phase walks the import graph
//! from the root and fetches every distinct URI once, registering each
//! declaration before following its imports so that cyclic imports
//! terminate. The compile phase then turns the fetched declarations into a
//! [`PackageGraph`].

use crate::config::{validate_package, PackageDeclaration};
use crate::error::{ResolutionError, Result};
use crate::loader::Fetcher;
use crate::runner::{ActionContext, PackageGraph, PackageId, PackageScope};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Loads a root declaration and everything it imports
pub struct Loader<F> {
    fetcher: F,
    declarations: HashMap<String, PackageDeclaration>,
}

impl<F: Fetcher> Loader<F> {
    pub fn new(fetcher: F) -> Self {
        Loader {
            fetcher,
            declarations: HashMap::new(),
        }
    }

    /// Whether `uri` has been fetched
    pub fn is_fetched(&self, uri: &str) -> bool {
        self.declarations.contains_key(uri)
    }

    /// Number of distinct packages fetched so far
    pub fn fetched_count(&self) -> usize {
        self.declarations.len()
    }

    /// Fetch every package transitively imported by `root`
    pub fn fetch_all(&mut self, root: &PackageDeclaration) -> Result<()> {
        for (alias, uri) in &root.imports {
            self.load_package(uri)
                .map_err(|e| e.in_import(alias, uri))?;
        }
        Ok(())
    }

    fn load_package(&mut self, uri: &str) -> Result<()> {
        if self.declarations.contains_key(uri) {
            log::trace!("{} already fetched", uri);
            return Ok(());
        }

        let declaration = self.fetcher.fetch(uri)?;
        validate_package(&declaration)?;

        let imports: Vec<(String, String)> = declaration
            .imports
            .iter()
            .map(|(alias, uri)| (alias.clone(), uri.clone()))
            .collect();

        // Registered before recursing
        self.declarations.insert(uri.to_string(), declaration);

        for (alias, import) in imports {
            self.load_package(&import)
                .map_err(|e| e.in_import(&alias, &import))?;
        }
        Ok(())
    }

    /// Fetch and compile the whole graph rooted at `root`
    pub fn load(mut self, root: PackageDeclaration) -> Result<PackageGraph> {
        validate_package(&root)?;
        self.fetch_all(&root)?;

        let mut compiler = Compiler {
            declarations: self.declarations,
            slots: HashMap::new(),
            packages: Vec::new(),
        };
        let root = compiler.compile(None, "", root)?;

        log::debug!("compiled {} package(s)", compiler.packages.len());
        Ok(PackageGraph {
            packages: compiler.packages,
            root,
        })
    }
}

/// Compile state of one URI
#[derive(Debug, Clone, Copy)]
enum Slot {
    Compiling,
    Compiled(PackageId),
}

struct Compiler {
    declarations: HashMap<String, PackageDeclaration>,
    slots: HashMap<String, Slot>,
    packages: Vec<PackageScope>,
}

impl Compiler {
    /// Compile a package, its imports first
    fn compile(
        &mut self,
        uri: Option<&str>,
        namespace: &str,
        declaration: PackageDeclaration,
    ) -> Result<PackageId> {
        let mut imports = IndexMap::new();
        for (alias, import) in &declaration.imports {
            let id = self
                .compile_import(namespace, alias, import)
                .map_err(|e| e.in_import(alias, import))?;
            imports.insert(alias.clone(), id);
        }

        let id = PackageId(self.packages.len());
        let actions = declaration
            .actions
            .into_iter()
            .map(|(name, action)| {
                let context = ActionContext::from_declaration(id, namespace, name.clone(), action);
                (name, context)
            })
            .collect();

        self.packages.push(PackageScope {
            uri: uri.map(str::to_string),
            namespace: namespace.to_string(),
            dir: declaration.dir,
            env: declaration.env,
            actions,
            imports,
        });
        Ok(id)
    }

    fn compile_import(&mut self, parent: &str, alias: &str, uri: &str) -> Result<PackageId> {
        match self.slots.get(uri) {
            Some(Slot::Compiled(id)) => return Ok(*id),
            Some(Slot::Compiling) => {
                return Err(ResolutionError::ImportCycle(uri.to_string()).into());
            }
            None => {}
        }

        let declaration =
            self.declarations
                .remove(uri)
                .ok_or_else(|| ResolutionError::MissingPackage {
                    alias: alias.to_string(),
                    uri: uri.to_string(),
                })?;

        let namespace = if parent.is_empty() {
            alias.to_string()
        } else {
            format!("{}.{}", parent, alias)
        };

        self.slots.insert(uri.to_string(), Slot::Compiling);
        let id = self.compile(Some(uri), &namespace, declaration)?;
        self.slots.insert(uri.to_string(), Slot::Compiled(id));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_declaration;
    use crate::error::{FetchError, RunfileError};
    use std::cell::RefCell;

    /// Serves declarations from memory and records every fetch
    struct MapFetcher {
        packages: HashMap<&'static str, &'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl MapFetcher {
        fn new(packages: &[(&'static str, &'static str)]) -> Self {
            MapFetcher {
                packages: packages.iter().copied().collect(),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls_for(&self, uri: &str) -> usize {
            self.calls.borrow().iter().filter(|c| *c == uri).count()
        }
    }

    impl Fetcher for &MapFetcher {
        fn fetch(&self, uri: &str) -> Result<PackageDeclaration> {
            self.calls.borrow_mut().push(uri.to_string());
            match self.packages.get(uri) {
                Some(yaml) => Ok(parse_declaration(yaml)?),
                None => Err(FetchError::Retrieve {
                    uri: uri.to_string(),
                    reason: "not found".to_string(),
                }
                .into()),
            }
        }
    }

    fn root(yaml: &str) -> PackageDeclaration {
        parse_declaration(yaml).unwrap()
    }

    #[test]
    fn test_shared_import_fetched_once() {
        let fetcher = MapFetcher::new(&[
            ("p2", "imports:\n  p3: p3\n"),
            ("p3", "actions:\n  hello:\n    cmds: echo hello\n"),
        ]);
        let mut loader = Loader::new(&fetcher);
        loader
            .fetch_all(&root("imports:\n  p2: p2\n  p3: p3\n"))
            .unwrap();

        assert_eq!(fetcher.calls_for("p2"), 1);
        assert_eq!(fetcher.calls_for("p3"), 1);
        assert_eq!(loader.fetched_count(), 2);
    }

    #[test]
    fn test_fetch_cycle_terminates() {
        let fetcher = MapFetcher::new(&[
            ("p1", "imports:\n  p2: p2\n"),
            ("p2", "imports:\n  p1: p1\n"),
        ]);
        let mut loader = Loader::new(&fetcher);
        loader.fetch_all(&root("imports:\n  p1: p1\n")).unwrap();

        assert_eq!(fetcher.calls_for("p1"), 1);
        assert_eq!(fetcher.calls_for("p2"), 1);
        assert!(loader.is_fetched("p1"));
        assert!(loader.is_fetched("p2"));
    }

    #[test]
    fn test_compile_cycle_rejected() {
        let fetcher = MapFetcher::new(&[
            ("p1", "imports:\n  p2: p2\n"),
            ("p2", "imports:\n  p1: p1\n"),
        ]);
        let result = Loader::new(&fetcher).load(root("imports:\n  p1: p1\n"));

        let err = result.unwrap_err();
        assert!(matches!(
            err.root_cause(),
            RunfileError::Resolution(ResolutionError::ImportCycle(uri)) if uri == "p1"
        ));
    }

    #[test]
    fn test_fetch_error_names_import() {
        let fetcher = MapFetcher::new(&[]);
        let result = Loader::new(&fetcher).load(root("imports:\n  lib: missing\n"));

        match result {
            Err(RunfileError::Import { alias, uri, source }) => {
                assert_eq!(alias, "lib");
                assert_eq!(uri, "missing");
                assert!(matches!(*source, RunfileError::Fetch(_)));
            }
            other => panic!("expected import error, got {:?}", other),
        }
    }

    #[test]
    fn test_compiled_graph() {
        let fetcher = MapFetcher::new(&[
            ("lib", "imports:\n  util: util\nactions:\n  build:\n    cmds: echo build\n"),
            ("util", "actions:\n  fmt:\n    cmds: echo fmt\n"),
        ]);
        let graph = Loader::new(&fetcher)
            .load(root(
                "imports:\n  lib: lib\n  util: util\nactions:\n  default:\n    deps: [lib.build]\n",
            ))
            .unwrap();

        // util is shared between the root and lib
        assert_eq!(graph.len(), 3);
        let root_id = graph.root_id();
        assert_eq!(graph.root().uri(), None);

        let build = graph.resolve(root_id, "lib.build").unwrap();
        assert_eq!(build.qualified_name(), "lib.build");

        let fmt = graph.resolve(root_id, "lib.util.fmt").unwrap();
        assert_eq!(fmt.qualified_name(), "lib.util.fmt");
        assert_eq!(
            graph.resolve(root_id, "util.fmt").unwrap().package(),
            fmt.package()
        );

        assert!(matches!(
            graph.resolve(root_id, "lib.missing"),
            Err(ResolutionError::UnknownAction(_))
        ));
        assert!(matches!(
            graph.resolve(root_id, "nope.build"),
            Err(ResolutionError::UnknownImport { .. })
        ));
    }

    #[test]
    fn test_dotted_alias_rejected() {
        let fetcher = MapFetcher::new(&[]);
        let result = Loader::new(&fetcher).load(root("imports:\n  a.b: x\n"));
        assert!(matches!(result, Err(RunfileError::Config(_))));
        assert!(fetcher.calls.borrow().is_empty());
    }
}
