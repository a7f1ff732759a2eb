//! Mapping from document URIs to configured projects.
//!
//! Each document belongs to the project whose config file is nearest above
//! it on disk. Loaded configs are cached per config path; a watched config
//! change invalidates the cache entry so the next lookup rebuilds the
//! project without a server restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use graphref_config::{find_config, load_config, ProjectConfig, CONFIG_FILES};
use tracing::{debug, warn};

/// Resolved project state for a document.
#[derive(Debug)]
pub enum Project {
    Configured {
        #[allow(dead_code)]
        config_path: PathBuf,
        root: PathBuf,
        config: ProjectConfig,
    },
    /// Config missing or malformed. No registry traffic happens; the reason
    /// is surfaced as a single project-level diagnostic.
    Unconfigured { reason: String },
}

pub struct Workspace {
    /// CLI-provided config applied to every document, bypassing discovery.
    explicit_config: Option<PathBuf>,
    projects: HashMap<PathBuf, Arc<Project>>,
}

impl Workspace {
    pub fn new(explicit_config: Option<PathBuf>) -> Self {
        Self {
            explicit_config,
            projects: HashMap::new(),
        }
    }

    /// The project governing `uri`.
    pub fn project_for_uri(&mut self, uri: &str) -> Arc<Project> {
        let Some(path) = uri_to_path(uri) else {
            return Arc::new(Project::Unconfigured {
                reason: format!("unsupported document URI: {uri}"),
            });
        };

        let config_path = match &self.explicit_config {
            Some(explicit) => Some(explicit.clone()),
            None => path.parent().and_then(find_config),
        };
        let Some(config_path) = config_path else {
            return Arc::new(Project::Unconfigured {
                reason: format!(
                    "no project config found above {}; expected one of: {}",
                    path.display(),
                    CONFIG_FILES.join(", ")
                ),
            });
        };

        if let Some(project) = self.projects.get(&config_path) {
            return Arc::clone(project);
        }

        let project = Arc::new(Self::load(&config_path));
        self.projects.insert(config_path, Arc::clone(&project));
        project
    }

    fn load(config_path: &Path) -> Project {
        match load_config(config_path) {
            Ok(config) => {
                debug!(config = %config_path.display(), graph_ref = %config.graph_ref(), "loaded project config");
                Project::Configured {
                    config_path: config_path.to_path_buf(),
                    root: config_path
                        .parent()
                        .map_or_else(PathBuf::new, Path::to_path_buf),
                    config,
                }
            }
            Err(error) => {
                warn!(config = %config_path.display(), %error, "failed to load project config");
                Project::Unconfigured {
                    reason: format!("invalid config {}: {error}", config_path.display()),
                }
            }
        }
    }

    /// Whether `uri` falls inside the project's include/exclude globs.
    pub fn document_in_scope(project: &Project, uri: &str) -> bool {
        let Project::Configured { root, config, .. } = project else {
            return true;
        };
        let Some(path) = uri_to_path(uri) else {
            return false;
        };
        let relative = path.strip_prefix(root).unwrap_or(&path);
        config.matches(relative)
    }

    /// Drop the cached project for a changed config file.
    ///
    /// Returns the displaced project, if any, so the caller can release
    /// resolver state for a graph ref the rebuilt project no longer uses.
    pub fn invalidate(&mut self, changed: &Path) -> Option<Arc<Project>> {
        self.projects.remove(changed)
    }
}

/// Convert a `file://` URI into a filesystem path.
///
/// URIs with a non-empty host (`file://server/share`) are not supported.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let raw = uri.strip_prefix("file://")?;
    if !raw.starts_with('/') {
        return None;
    }
    Some(PathBuf::from(percent_decode(raw)))
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(byte) = input
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
