//! Error types for runfile

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runfile operations
pub type Result<T> = std::result::Result<T, RunfileError>;

/// Main error type for runfile
///
/// The `Action`, `Var` and `Import` variants add one layer of context around
/// an inner error. Walking [`std::error::Error::source`] yields the chain from
/// the outermost action down to the failing command.
#[derive(Error, Debug)]
pub enum RunfileError {
    /// Configuration-related errors
    #[error("configuration error")]
    Config(#[from] ConfigError),

    /// Package retrieval errors
    #[error("fetch error")]
    Fetch(#[from] FetchError),

    /// Unknown action, dependency or import alias
    #[error("resolution error")]
    Resolution(#[from] ResolutionError),

    /// Template substitution errors
    #[error("substitution error")]
    Template(#[from] TemplateError),

    /// Process execution errors
    #[error("execution error")]
    Execution(#[from] ExecutionError),

    /// I/O errors
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// Failure inside a named action
    #[error("action '{action}' failed")]
    Action {
        action: String,
        #[source]
        source: Box<RunfileError>,
    },

    /// Failure while computing a variable
    #[error("variable '{name}' could not be evaluated")]
    Var {
        name: String,
        #[source]
        source: Box<RunfileError>,
    },

    /// Failure while loading an imported package
    #[error("import '{alias}' ({uri}) could not be loaded")]
    Import {
        alias: String,
        uri: String,
        #[source]
        source: Box<RunfileError>,
    },
}

impl RunfileError {
    /// Wrap this error with the name of the action it happened in
    pub fn in_action(self, action: &str) -> Self {
        RunfileError::Action {
            action: action.to_string(),
            source: Box::new(self),
        }
    }

    /// Wrap this error with the import that was being loaded
    pub fn in_import(self, alias: &str, uri: &str) -> Self {
        RunfileError::Import {
            alias: alias.to_string(),
            uri: uri.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error of the context chain
    pub fn root_cause(&self) -> &RunfileError {
        match self {
            RunfileError::Action { source, .. }
            | RunfileError::Var { source, .. }
            | RunfileError::Import { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("YAML parsing error")]
    Yaml(#[from] serde_yaml::Error),

    #[error("name '{0}' must not contain '.'")]
    DottedName(String),

    #[error("circular action reference detected: {0}")]
    CircularReference(String),
}

/// Package retrieval errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid package uri '{0}'")]
    InvalidUri(String),

    #[error("failed to retrieve '{uri}': {reason}")]
    Retrieve { uri: String, reason: String },

    #[error("no declaration file found in '{}'", dir.display())]
    NoDeclaration { dir: PathBuf },

    #[error("invalid declaration file pattern")]
    Pattern(#[from] glob::PatternError),
}

/// Reference resolution errors
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("no action with the name '{0}'")]
    UnknownAction(String),

    #[error("no import with the alias '{alias}' (referenced as '{reference}')")]
    UnknownImport { alias: String, reference: String },

    #[error("import '{alias}' points at '{uri}' which was never fetched")]
    MissingPackage { alias: String, uri: String },

    #[error("import cycle detected at '{0}'")]
    ImportCycle(String),
}

/// Template substitution errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("invalid template syntax in '{template}': {reason}")]
    Syntax { template: String, reason: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{function}' expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("cannot read field of text value at '{0}'")]
    NotAMap(String),

    #[error("'{0}' is a map and cannot be rendered as text")]
    NotText(String),
}

/// Process execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("command `{command}` failed with exit code {code:?}")]
    CommandFailed { command: String, code: Option<i32> },

    #[error("failed to launch `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("shell interpreter is empty")]
    NoInterpreter,
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Specialized result type for resolution
pub type ResolutionResult<T> = std::result::Result<T, ResolutionError>;

/// Specialized result type for template operations
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;
