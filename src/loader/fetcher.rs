//! Package fetching
//!
//! A [`Fetcher`] turns a package URI into a merged declaration. The
//! [`CacheFetcher`] keeps one directory per URI and only goes to the network
//! when that directory is missing or a refresh is forced.

use crate::config::{load_package_dir, PackageDeclaration};
use crate::error::{FetchError, FetchResult, Result};
use crate::loader::{Retriever, SourceRetriever};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Relative location of the import cache inside a project
pub const CACHE_DIR: &str = ".run/imports";

/// Source of package declarations
pub trait Fetcher {
    fn fetch(&self, uri: &str) -> Result<PackageDeclaration>;
}

/// Fetcher backed by a local cache directory
#[derive(Debug)]
pub struct CacheFetcher<R = SourceRetriever> {
    cache_root: PathBuf,
    retriever: R,
    force: bool,
}

impl CacheFetcher<SourceRetriever> {
    /// Cache under `<project_dir>/.run/imports`, retrieving with [`SourceRetriever`]
    pub fn new(project_dir: &Path) -> Self {
        CacheFetcher::with_retriever(
            project_dir.join(CACHE_DIR),
            SourceRetriever::new(project_dir.to_path_buf()),
        )
    }
}

impl<R: Retriever> CacheFetcher<R> {
    pub fn with_retriever(cache_root: PathBuf, retriever: R) -> Self {
        CacheFetcher {
            cache_root,
            retriever,
            force: false,
        }
    }

    /// Re-retrieve packages even when they are cached
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Cache directory of `uri`
    ///
    /// Derived from the URI text alone: `scheme://` becomes a `scheme/`
    /// directory, characters that are awkward in paths become `_` and `..`
    /// segments become `__` so the result stays under the cache root.
    pub fn cache_path(&self, uri: &str) -> FetchResult<PathBuf> {
        cache_path(&self.cache_root, uri)
    }
}

/// Cache directory of `uri` under `cache_root`
pub fn cache_path(cache_root: &Path, uri: &str) -> FetchResult<PathBuf> {
    let normalized = uri.replace("://", "/");
    let sanitized: String = normalized
        .chars()
        .map(|c| match c {
            ':' | '?' | '*' | '"' | '<' | '>' | '|' | '\\' | '=' | '&' => '_',
            c => c,
        })
        .collect();

    let relative = Path::new(sanitized.trim_start_matches('/'));
    let mut path = cache_root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::ParentDir => path.push("__"),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if path == cache_root {
        return Err(FetchError::InvalidUri(uri.to_string()));
    }
    Ok(path)
}

impl<R: Retriever> Fetcher for CacheFetcher<R> {
    fn fetch(&self, uri: &str) -> Result<PackageDeclaration> {
        let dst = self.cache_path(uri)?;

        if dst.exists() && !self.force {
            log::debug!("using cached {} at {}", uri, dst.display());
        } else {
            if dst.exists() {
                log::debug!("refreshing {}", uri);
                fs::remove_dir_all(&dst)?;
            }
            log::info!("fetching {} into {}", uri, dst.display());
            self.retriever.retrieve(uri, &dst)?;
        }

        load_package_dir(&dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{os_declaration_name, CommandDeclaration};
    use crate::error::{ConfigError, RunfileError};
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Writes a fixed declaration and counts calls
    struct StubRetriever {
        content: &'static str,
        calls: Cell<usize>,
    }

    impl Retriever for StubRetriever {
        fn retrieve(&self, _uri: &str, dst: &Path) -> FetchResult<()> {
            self.calls.set(self.calls.get() + 1);
            fs::create_dir_all(dst).unwrap();
            fs::write(dst.join("run.yaml"), self.content).unwrap();
            Ok(())
        }
    }

    fn stub(content: &'static str) -> StubRetriever {
        StubRetriever {
            content,
            calls: Cell::new(0),
        }
    }

    #[test]
    fn test_cache_path() {
        let root = Path::new("/cache");
        assert_eq!(
            cache_path(root, "github.com/acme/tools").unwrap(),
            PathBuf::from("/cache/github.com/acme/tools")
        );
        assert_eq!(
            cache_path(root, "https://example.com/pkg.tar.gz?ref=v1").unwrap(),
            PathBuf::from("/cache/https/example.com/pkg.tar.gz_ref_v1")
        );
    }

    #[test]
    fn test_cache_path_stays_under_root() {
        let root = Path::new("/cache");
        assert_eq!(
            cache_path(root, "../shared").unwrap(),
            PathBuf::from("/cache/__/shared")
        );
        assert_eq!(
            cache_path(root, "./tools/../../etc").unwrap(),
            PathBuf::from("/cache/tools/__/__/etc")
        );
        assert!(matches!(cache_path(root, ""), Err(FetchError::InvalidUri(_))));
        assert!(matches!(cache_path(root, "./"), Err(FetchError::InvalidUri(_))));
    }

    #[test]
    fn test_fetch_retrieves_once() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = CacheFetcher::with_retriever(
            temp_dir.path().to_path_buf(),
            stub("actions:\n  test:\n    cmds: echo \"hello world\"\n"),
        );

        let package = fetcher.fetch("example.com/simple").unwrap();
        assert_eq!(
            package.actions["test"].cmds,
            vec![CommandDeclaration::Shell("echo \"hello world\"".to_string())]
        );
        assert_eq!(package.dir, temp_dir.path().join("example.com/simple"));

        fetcher.fetch("example.com/simple").unwrap();
        assert_eq!(fetcher.retriever.calls.get(), 1);
    }

    #[test]
    fn test_force_refresh_retrieves_again() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = CacheFetcher::with_retriever(
            temp_dir.path().to_path_buf(),
            stub("actions: {}\n"),
        )
        .force_refresh(true);

        fetcher.fetch("example.com/simple").unwrap();
        fetcher.fetch("example.com/simple").unwrap();
        assert_eq!(fetcher.retriever.calls.get(), 2);
    }

    #[test]
    fn test_fetch_platform_specific_file() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher =
            CacheFetcher::with_retriever(temp_dir.path().to_path_buf(), stub("actions: {}\n"));

        // Already cached, with only an OS file
        let dst = fetcher.cache_path("example.com/simple").unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(
            dst.join(os_declaration_name("yaml")),
            "actions:\n  test:\n    cmds: echo os\n",
        )
        .unwrap();

        let package = fetcher.fetch("example.com/simple").unwrap();
        assert_eq!(
            package.actions["test"].cmds,
            vec![CommandDeclaration::Shell("echo os".to_string())]
        );
        assert_eq!(fetcher.retriever.calls.get(), 0);
    }

    #[test]
    fn test_fetch_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher =
            CacheFetcher::with_retriever(temp_dir.path().to_path_buf(), stub("actions: {}\n"));

        let dst = fetcher.cache_path("example.com/simple").unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join(os_declaration_name("yaml")), "{}}\"").unwrap();

        let result = fetcher.fetch("example.com/simple");
        assert!(matches!(
            result,
            Err(RunfileError::Config(ConfigError::Parse { .. }))
        ));
    }

    #[test]
    fn test_fetch_empty_cached_dir() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher =
            CacheFetcher::with_retriever(temp_dir.path().to_path_buf(), stub("actions: {}\n"));

        let dst = fetcher.cache_path("example.com/empty").unwrap();
        fs::create_dir_all(&dst).unwrap();

        let result = fetcher.fetch("example.com/empty");
        assert!(matches!(
            result,
            Err(RunfileError::Fetch(FetchError::NoDeclaration { .. }))
        ));
    }
}
