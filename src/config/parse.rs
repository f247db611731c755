//! Declaration file parsing and discovery

use crate::config::types::PackageDeclaration;
use crate::error::{ConfigError, ConfigResult, FetchError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["run.yaml", "run.yml"];

/// File stem shared by every declaration file of a package
const DECLARATION_STEM: &str = "run";

/// Find the configuration file by searching current and parent directories
pub fn find_config_file() -> ConfigResult<PathBuf> {
    find_config_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("failed to get current directory: {}", e))
    })?)
}

/// Find the configuration file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in CONFIG_FILE_NAMES {
            let config_path = current_dir.join(file_name);
            searched_paths.push(config_path.display().to_string());

            if config_path.is_file() {
                return Ok(config_path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a package declaration from a string
pub fn parse_declaration(yaml: &str) -> ConfigResult<PackageDeclaration> {
    // An empty document is an empty package, not an error
    if yaml.trim().is_empty() {
        return Ok(PackageDeclaration::default());
    }
    Ok(serde_yaml::from_str(yaml)?)
}

/// Parse a single declaration file
pub fn parse_declaration_file(path: &Path) -> ConfigResult<PackageDeclaration> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if contents.trim().is_empty() {
        return Ok(PackageDeclaration::default());
    }

    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Name of the override file for the running operating system, e.g. `run_linux.yaml`
pub fn os_declaration_name(extension: &str) -> String {
    format!("{}_{}.{}", DECLARATION_STEM, env::consts::OS, extension)
}

/// List the declaration files of a package directory
///
/// The common file comes first, followed by the override file for the
/// running OS, so merging them in order gives the override precedence.
pub fn declaration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{}/{}*.y*ml", escaped, DECLARATION_STEM);

    let mut common = Vec::new();
    let mut overrides = Vec::new();
    for entry in glob::glob(&pattern).map_err(FetchError::from)? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                log::warn!("skipping unreadable declaration candidate: {}", e);
                continue;
            }
        };
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if CONFIG_FILE_NAMES.contains(&name) {
            common.push(path);
        } else if name == os_declaration_name("yaml") || name == os_declaration_name("yml") {
            overrides.push(path);
        }
    }

    common.sort();
    overrides.sort();
    common.extend(overrides);
    Ok(common)
}

/// Load and merge every declaration file of a package directory
///
/// A directory with no declaration file at all is an error rather than an
/// empty package.
pub fn load_package_dir(dir: &Path) -> Result<PackageDeclaration> {
    let files = declaration_files(dir)?;
    if files.is_empty() {
        return Err(FetchError::NoDeclaration {
            dir: dir.to_path_buf(),
        }
        .into());
    }

    let mut package = PackageDeclaration::default();
    for file in files {
        log::trace!("reading declaration file {}", file.display());
        package = package.merge(parse_declaration_file(&file)?);
    }
    Ok(package.with_dir(dir.to_path_buf()))
}

/// Load the root document, merging a sibling OS override file when present
pub fn load_root(path: &Path) -> Result<PackageDeclaration> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut package = parse_declaration_file(path)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(DECLARATION_STEM);
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("yaml");
    let override_path = dir.join(format!("{}_{}.{}", stem, env::consts::OS, extension));
    if override_path.is_file() {
        log::debug!("merging OS override {}", override_path.display());
        package = package.merge(parse_declaration_file(&override_path)?);
    }

    Ok(package.with_dir(dir))
}
