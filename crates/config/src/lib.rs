//! Project configuration for the graphref language server.
//!
//! A project is configured by a `.graphrefrc.{yml,yaml,json}` (or
//! `graphref.config.*`) file at or above the workspace documents. The file
//! names the registry graph and variant the project tracks and the glob
//! patterns selecting which files belong to the project.
//!
//! ```yaml
//! graphId: my-service
//! variantTag: staging
//! include:
//!   - "src/**/*.graphql"
//! exclude:
//!   - "**/generated/**"
//! ```

mod config;
mod loader;

pub use config::{ConfigError, ProjectConfig, RegistryOverrides};
pub use loader::{find_config, load_config, load_config_from_str, ConfigFormat, CONFIG_FILES};
