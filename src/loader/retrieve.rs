//! Retrieval of package sources into a local directory

use crate::error::{FetchError, FetchResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use walkdir::WalkDir;

/// Materializes a package source at a destination directory
pub trait Retriever {
    fn retrieve(&self, uri: &str, dst: &Path) -> FetchResult<()>;
}

/// Where a URI points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Directory on this machine
    Local(PathBuf),
    /// Git repository, optionally a subdirectory of it at a revision
    Git {
        url: String,
        subdir: Option<String>,
        rev: Option<String>,
    },
}

impl Source {
    /// Classify a URI, resolving relative paths against `base_dir`
    ///
    /// - `file:///abs/path`, `/abs/path`, `./rel`, `../rel`: local directory
    /// - `git::<url>[//subdir][?ref=rev]`: git repository
    /// - `github.com/owner/repo[/subdir][?ref=rev]`: GitHub repository
    /// - anything else containing `://`: git repository
    pub fn parse(uri: &str, base_dir: &Path) -> FetchResult<Self> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Source::Local(PathBuf::from(path)));
        }
        if uri.starts_with('/') || uri.starts_with("./") || uri.starts_with("../") {
            return Ok(Source::Local(base_dir.join(uri)));
        }

        let (location, rev) = match uri.split_once("?ref=") {
            Some((location, rev)) => (location, Some(rev.to_string())),
            None => (uri, None),
        };

        if let Some(rest) = location.strip_prefix("git::") {
            let (url, subdir) = split_subdir(rest);
            return Ok(Source::Git { url, subdir, rev });
        }

        if let Some(rest) = location.strip_prefix("github.com/") {
            let mut parts = rest.splitn(3, '/');
            let (Some(owner), Some(repo)) = (parts.next(), parts.next()) else {
                return Err(FetchError::InvalidUri(uri.to_string()));
            };
            if owner.is_empty() || repo.is_empty() {
                return Err(FetchError::InvalidUri(uri.to_string()));
            }
            let repo = repo.trim_end_matches(".git");
            return Ok(Source::Git {
                url: format!("https://github.com/{}/{}.git", owner, repo),
                subdir: parts.next().filter(|s| !s.is_empty()).map(str::to_string),
                rev,
            });
        }

        if location.contains("://") {
            let (url, subdir) = split_subdir(location);
            return Ok(Source::Git { url, subdir, rev });
        }

        Err(FetchError::InvalidUri(uri.to_string()))
    }
}

/// Split `url//subdir`, ignoring the `//` of the scheme
fn split_subdir(location: &str) -> (String, Option<String>) {
    let scheme_end = location.find("://").map(|i| i + 3).unwrap_or(0);
    match location[scheme_end..].find("//") {
        Some(i) => {
            let split = scheme_end + i;
            (
                location[..split].to_string(),
                Some(location[split + 2..].to_string()).filter(|s| !s.is_empty()),
            )
        }
        None => (location.to_string(), None),
    }
}

/// Default retriever: copies local directories and clones git sources
#[derive(Debug, Clone)]
pub struct SourceRetriever {
    base_dir: PathBuf,
}

impl SourceRetriever {
    /// Relative local URIs are resolved against `base_dir`
    pub fn new(base_dir: PathBuf) -> Self {
        SourceRetriever { base_dir }
    }

    fn clone_repo(
        &self,
        uri: &str,
        url: &str,
        subdir: Option<&str>,
        rev: Option<&str>,
        dst: &Path,
    ) -> FetchResult<()> {
        let failed = |reason: String| FetchError::Retrieve {
            uri: uri.to_string(),
            reason,
        };

        let checkout = tempfile::tempdir().map_err(|e| failed(e.to_string()))?;

        let mut command = Command::new("git");
        command.arg("clone").arg("--quiet");
        if rev.is_none() {
            command.args(["--depth", "1"]);
        }
        command
            .arg(url)
            .arg(checkout.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        run_git(command, uri)?;

        if let Some(rev) = rev {
            let mut command = Command::new("git");
            command
                .arg("-C")
                .arg(checkout.path())
                .args(["checkout", "--quiet", rev])
                .stdin(Stdio::null())
                .stdout(Stdio::null());
            run_git(command, uri)?;
        }

        let src = match subdir {
            Some(subdir) => checkout.path().join(subdir),
            None => checkout.path().to_path_buf(),
        };
        if !src.is_dir() {
            return Err(failed(format!("'{}' is not a directory", src.display())));
        }
        copy_dir(&src, dst).map_err(|e| failed(e.to_string()))
    }
}

fn run_git(mut command: Command, uri: &str) -> FetchResult<()> {
    log::debug!("running {:?}", command);
    let output = command.output().map_err(|e| FetchError::Retrieve {
        uri: uri.to_string(),
        reason: format!("failed to launch git: {}", e),
    })?;
    if !output.status.success() {
        return Err(FetchError::Retrieve {
            uri: uri.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

impl Retriever for SourceRetriever {
    fn retrieve(&self, uri: &str, dst: &Path) -> FetchResult<()> {
        match Source::parse(uri, &self.base_dir)? {
            Source::Local(src) => {
                if !src.is_dir() {
                    return Err(FetchError::Retrieve {
                        uri: uri.to_string(),
                        reason: format!("'{}' is not a directory", src.display()),
                    });
                }
                copy_dir(&src, dst).map_err(|e| FetchError::Retrieve {
                    uri: uri.to_string(),
                    reason: e.to_string(),
                })
            }
            Source::Git { url, subdir, rev } => {
                self.clone_repo(uri, &url, subdir.as_deref(), rev.as_deref(), dst)
            }
        }
    }
}

/// Recursively copy `src` into `dst`, skipping `.git`
pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
