//! Core declaration types
//!
//! These structures are the raw, post-parse form of a `run.yaml` document.
//! Fields that accept either a bare string or a mapping are decoded
//! explicitly from a [`serde_yaml::Value`] instead of through untagged
//! guessing, so the accepted shapes are exactly the documented ones.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::path::PathBuf;

/// A package of actions, as written in one or more declaration files
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PackageDeclaration {
    /// Imported packages, by local alias
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub imports: IndexMap<String, String>,

    /// Actions declared by this package
    #[serde(default)]
    pub actions: IndexMap<String, ActionDeclaration>,

    /// Environment exported to every action of this package
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "deserialize_scalar_map"
    )]
    pub env: IndexMap<String, String>,

    /// Directory the declaration was loaded from
    #[serde(skip)]
    pub dir: PathBuf,
}

impl PackageDeclaration {
    /// Merge `other` over `self`
    ///
    /// Shallow union keyed by import alias, action name and env key;
    /// entries from `other` replace same-named entries from `self`.
    pub fn merge(mut self, other: PackageDeclaration) -> Self {
        self.imports.extend(other.imports);
        self.actions.extend(other.actions);
        self.env.extend(other.env);
        if !other.dir.as_os_str().is_empty() {
            self.dir = other.dir;
        }
        self
    }

    /// Set the directory this package lives in
    pub fn with_dir(mut self, dir: PathBuf) -> Self {
        self.dir = dir;
        self
    }
}

/// A single action definition
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ActionDeclaration {
    /// Documentation only
    #[serde(default, alias = "desc", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Actions to run first, possibly `alias.name` qualified
    #[serde(default, alias = "dependencies", skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,

    /// Rule that, when it succeeds, skips the commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipDeclaration>,

    /// Computed variables
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub vars: IndexMap<String, VarDeclaration>,

    /// Environment exported to this action's processes
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "deserialize_scalar_map"
    )]
    pub env: IndexMap<String, String>,

    /// Commands to execute
    #[serde(
        default,
        alias = "commands",
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_commands"
    )]
    pub cmds: Vec<CommandDeclaration>,
}

/// A skip rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipDeclaration {
    /// Shell template; exit status 0 means skip
    pub shell: String,

    /// Shown when the action is skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<'de> Deserialize<'de> for SkipDeclaration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Detail {
            shell: String,
            #[serde(default)]
            message: Option<String>,
        }

        match Value::deserialize(deserializer)? {
            // Bare string is the shell check
            Value::String(shell) => Ok(SkipDeclaration {
                shell,
                message: None,
            }),
            value @ Value::Mapping(_) => {
                let detail = Detail::deserialize(value).map_err(D::Error::custom)?;
                Ok(SkipDeclaration {
                    shell: detail.shell,
                    message: detail.message,
                })
            }
            _ => Err(D::Error::custom("skip must be a string or a mapping")),
        }
    }
}

/// A variable definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum VarDeclaration {
    /// Fixed value, used verbatim
    #[serde(rename = "value")]
    Literal(String),

    /// Shell template whose trimmed stdout becomes the value
    #[serde(rename = "shell")]
    Shell(String),
}

impl<'de> Deserialize<'de> for VarDeclaration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Detail {
            #[serde(default, deserialize_with = "deserialize_optional_scalar")]
            value: Option<String>,
            #[serde(default)]
            shell: Option<String>,
        }

        match Value::deserialize(deserializer)? {
            Value::String(shell) => Ok(VarDeclaration::Shell(shell)),
            value @ Value::Mapping(_) => {
                let detail = Detail::deserialize(value).map_err(D::Error::custom)?;
                match (detail.value, detail.shell) {
                    (Some(value), None) => Ok(VarDeclaration::Literal(value)),
                    (None, Some(shell)) => Ok(VarDeclaration::Shell(shell)),
                    (Some(_), Some(_)) => Err(D::Error::custom(
                        "var must set exactly one of 'value' or 'shell', not both",
                    )),
                    (None, None) => Err(D::Error::custom("var must set 'value' or 'shell'")),
                }
            }
            _ => Err(D::Error::custom("var must be a string or a mapping")),
        }
    }
}

/// A command entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandDeclaration {
    /// Shell template to execute
    Shell(String),

    /// Another action to invoke, with raw argument templates
    Action {
        action: String,
        #[serde(skip_serializing_if = "IndexMap::is_empty")]
        args: IndexMap<String, String>,
    },
}

impl<'de> Deserialize<'de> for CommandDeclaration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Detail {
            #[serde(default)]
            shell: Option<String>,
            #[serde(default)]
            action: Option<String>,
            #[serde(default, deserialize_with = "deserialize_scalar_map")]
            args: IndexMap<String, String>,
        }

        match Value::deserialize(deserializer)? {
            Value::String(shell) => Ok(CommandDeclaration::Shell(shell)),
            value @ Value::Mapping(_) => {
                let detail = Detail::deserialize(value).map_err(D::Error::custom)?;
                match (detail.shell, detail.action) {
                    (Some(shell), None) if detail.args.is_empty() => {
                        Ok(CommandDeclaration::Shell(shell))
                    }
                    (Some(_), None) => {
                        Err(D::Error::custom("'args' can only be passed to an action"))
                    }
                    (None, Some(action)) => Ok(CommandDeclaration::Action {
                        action,
                        args: detail.args,
                    }),
                    (Some(_), Some(_)) => Err(D::Error::custom(
                        "command must set exactly one of 'shell' or 'action', not both",
                    )),
                    (None, None) => Err(D::Error::custom("command must set 'shell' or 'action'")),
                }
            }
            _ => Err(D::Error::custom("command must be a string or a mapping")),
        }
    }
}

/// Render a YAML scalar as a string
fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Deserialize an optional scalar, accepting numbers and booleans as text
fn deserialize_optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => scalar_to_string(value)
            .map(Some)
            .ok_or_else(|| D::Error::custom("expected a scalar value")),
    }
}

/// Deserialize a string map whose values may be any YAML scalar
fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(IndexMap::new()),
        Value::Mapping(mapping) => {
            let mut map = IndexMap::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = scalar_to_string(key)
                    .ok_or_else(|| D::Error::custom("map keys must be scalars"))?;
                let value = match value {
                    Value::Null => String::new(),
                    other => scalar_to_string(other).ok_or_else(|| {
                        D::Error::custom(format!("value of '{}' must be a scalar", key))
                    })?,
                };
                map.insert(key, value);
            }
            Ok(map)
        }
        _ => Err(D::Error::custom("expected a mapping")),
    }
}

/// Custom deserializer for commands that handles both single values and arrays
fn deserialize_commands<'de, D>(deserializer: D) -> Result<Vec<CommandDeclaration>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;

    match value {
        // Single shell string
        Value::String(s) => Ok(vec![CommandDeclaration::Shell(s)]),
        Value::Mapping(_) => {
            let cmd = CommandDeclaration::deserialize(value).map_err(D::Error::custom)?;
            Ok(vec![cmd])
        }
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| CommandDeclaration::deserialize(item).map_err(D::Error::custom))
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("cmds must be a string, mapping, or list")),
    }
}
