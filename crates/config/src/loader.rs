//! Config file discovery and loading.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{ConfigError, ProjectConfig};

/// Recognized config file names, in precedence order.
pub const CONFIG_FILES: &[&str] = &[
    ".graphrefrc.yml",
    ".graphrefrc.yaml",
    ".graphrefrc.json",
    "graphref.config.yml",
    "graphref.config.yaml",
    "graphref.config.json",
];

/// Config file format, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml" | "yaml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Walk up from `start_dir` looking for the nearest config file.
///
/// Returns the path of the first match, trying names in [`CONFIG_FILES`]
/// order within each directory before moving to the parent.
#[must_use]
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = Some(start_dir);
    while let Some(current) = dir {
        for name in CONFIG_FILES {
            let candidate = current.join(name);
            if candidate.is_file() {
                debug!(path = %candidate.display(), "found config file");
                return Some(candidate);
            }
        }
        dir = current.parent();
    }
    None
}

/// Load and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content, format)
}

/// Parse and validate config content that has already been read.
pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<ProjectConfig, ConfigError> {
    match format {
        ConfigFormat::Yaml => ProjectConfig::parse_yaml(content),
        ConfigFormat::Json => ProjectConfig::parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_config_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".graphrefrc.yml"), "graphId: g").unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, dir.path().join(".graphrefrc.yml"));
    }

    #[test]
    fn test_find_config_prefers_nearest() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sub");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".graphrefrc.yml"), "graphId: outer").unwrap();
        std::fs::write(nested.join(".graphrefrc.json"), r#"{"graphId": "inner"}"#).unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, nested.join(".graphrefrc.json"));
    }

    #[test]
    fn test_find_config_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_config(dir.path()).is_none());
    }

    #[test]
    fn test_load_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".graphrefrc.yaml");
        std::fs::write(&path, "graphId: g\nvariantTag: dev").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.graph_ref().to_string(), "g@dev");
    }

    #[test]
    fn test_load_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphref.config.json");
        std::fs::write(&path, r#"{"graphRef": "g@prod"}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.graph_ref().to_string(), "g@prod");
    }

    #[test]
    fn test_load_malformed_yaml_is_parse_error() {
        let err = load_config_from_str("graphId: [unclosed", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "graphId = 'g'").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
