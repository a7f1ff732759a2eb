//! Configuration types and document matching.

use std::collections::HashMap;
use std::path::Path;

use graphref_types::GraphRef;
use serde::Deserialize;

/// Default include pattern when the config does not specify one.
const DEFAULT_INCLUDE: &str = "**/*.graphql";

/// Errors produced while loading or validating a project configuration.
///
/// Any of these maps to the Unconfigured project state: the server keeps
/// running, skips registry traffic for the project, and reports the error
/// as a single project-level diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {format} config: {message}")]
    Parse { format: String, message: String },

    #[error("config must declare `graphId` (or a combined `graphRef`)")]
    MissingGraphId,

    #[error("invalid graph ref: {0}")]
    InvalidGraphRef(#[from] graphref_types::GraphRefError),

    #[error("`graphRef` cannot be combined with `graphId`/`variantTag`")]
    ConflictingGraphRef,

    #[error("unsupported config file extension: {0}")]
    UnsupportedFormat(String),
}

/// Optional per-project registry connection overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegistryOverrides {
    /// Registry endpoint URL
    pub url: Option<String>,
    /// Extra headers sent with every fetch (e.g. auth)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Raw deserialized shape of a config file, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawConfig {
    /// Combined `id@variant` form
    graph_ref: Option<String>,
    graph_id: Option<String>,
    variant_tag: Option<String>,
    #[serde(default)]
    include: Option<OneOrMany>,
    #[serde(default)]
    exclude: Option<OneOrMany>,
    #[serde(default)]
    registry: Option<RegistryOverrides>,
}

/// A string or list of strings, so configs can write either
/// `include: "src/**/*.graphql"` or a YAML list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(pattern) => vec![pattern],
            Self::Many(patterns) => patterns,
        }
    }
}

/// A validated project configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    graph_ref: GraphRef,
    include: Vec<String>,
    exclude: Vec<String>,
    registry: RegistryOverrides,
}

impl ProjectConfig {
    /// Validate a raw config into a usable project configuration.
    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let graph_ref = match (raw.graph_ref, raw.graph_id) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingGraphRef),
            (Some(combined), None) => {
                if raw.variant_tag.is_some() {
                    return Err(ConfigError::ConflictingGraphRef);
                }
                combined.parse()?
            }
            (None, Some(graph_id)) => {
                let variant = raw
                    .variant_tag
                    .unwrap_or_else(|| graphref_types::DEFAULT_VARIANT.to_string());
                GraphRef::new(graph_id, variant)?
            }
            (None, None) => return Err(ConfigError::MissingGraphId),
        };

        let include = raw
            .include
            .map(OneOrMany::into_vec)
            .filter(|patterns| !patterns.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_INCLUDE.to_string()]);
        let exclude = raw.exclude.map(OneOrMany::into_vec).unwrap_or_default();

        Ok(Self {
            graph_ref,
            include,
            exclude,
            registry: raw.registry.unwrap_or_default(),
        })
    }

    pub(crate) fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            format: "YAML".to_string(),
            message: e.to_string(),
        })?;
        Self::from_raw(raw)
    }

    pub(crate) fn parse_json(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            format: "JSON".to_string(),
            message: e.to_string(),
        })?;
        Self::from_raw(raw)
    }

    /// The registry graph and variant this project tracks.
    #[must_use]
    pub fn graph_ref(&self) -> &GraphRef {
        &self.graph_ref
    }

    /// Include patterns, relative to the config root.
    #[must_use]
    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Exclude patterns, relative to the config root.
    #[must_use]
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Registry connection overrides.
    #[must_use]
    pub fn registry(&self) -> &RegistryOverrides {
        &self.registry
    }

    /// Does `document_path` (relative to the config root) belong to this
    /// project? A document matches when at least one include pattern matches
    /// and no exclude pattern does.
    #[must_use]
    pub fn matches(&self, document_path: &Path) -> bool {
        let path_str = document_path.to_string_lossy();
        let path_str = path_str.strip_prefix("./").unwrap_or(&path_str);

        let matches_any = |patterns: &[String]| {
            patterns.iter().any(|pattern| {
                expand_braces(&normalize_pattern(pattern)).iter().any(|p| {
                    glob::Pattern::new(p).is_ok_and(|compiled| compiled.matches(path_str))
                })
            })
        };

        matches_any(&self.include) && !matches_any(&self.exclude)
    }
}

/// Strip a leading `./` so patterns match paths relative to the config root.
fn normalize_pattern(pattern: &str) -> String {
    pattern.strip_prefix("./").unwrap_or(pattern).to_string()
}

/// Expand a single brace group: `src/**/*.{graphql,gql}` becomes one pattern
/// per alternative. The `glob` crate has no brace support of its own.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close_rel) = pattern[open..].find('}') else {
        return vec![pattern.to_string()];
    };
    let close = open + close_rel;

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    pattern[open + 1..close]
        .split(',')
        .flat_map(|alt| expand_braces(&format!("{prefix}{alt}{suffix}")))
        .collect()
}
