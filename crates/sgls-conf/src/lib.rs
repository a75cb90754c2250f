pub mod diagnostics;

use std::collections::HashMap;
use std::path::Path;

use camino::Utf8PathBuf;
use config::Config;
use config::ConfigError as ExternalConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

pub use crate::diagnostics::DiagnosticSeverity;
pub use crate::diagnostics::DiagnosticsConfig;

pub const DEFAULT_LIMIT: u32 = 100;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

const ENV_PREFIX: &str = "SGLS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
    #[error("default_limit must be greater than zero")]
    ZeroLimit,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Where to load the entity graph from: a file path or an http(s) URL.
    pub schema: Option<String>,
    /// Row limit written into freshly synthesized root queries.
    pub default_limit: u32,
    /// Quiet period before diagnostics are recomputed after an edit.
    pub debounce_ms: u64,
    /// Directory holding the last document per mode. Defaults to the user
    /// data directory when unset.
    pub store_dir: Option<Utf8PathBuf>,
    pub diagnostics: DiagnosticsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema: None,
            default_limit: DEFAULT_LIMIT,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            store_dir: None,
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "sgls", "sgls")
}

impl Settings {
    pub fn new(project_root: &Path) -> Result<Self, ConfigError> {
        let user_config_file = project_dirs().map(|dirs| dirs.config_dir().join("sgls.toml"));

        Self::load_from_paths(project_root, user_config_file.as_deref(), None)
    }

    /// Layer the configuration sources, lowest priority first: user config,
    /// project `.sgls.toml`, project `sgls.toml`, then `SGLS_*` variables.
    ///
    /// `env` replaces the process environment when given.
    fn load_from_paths(
        project_root: &Path,
        user_config_path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(project_root.join(".sgls.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("sgls.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;
        if settings.default_limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        tracing::debug!(schema = ?settings.schema, limit = settings.default_limit, "loaded settings");
        Ok(settings)
    }

    /// The configured store directory, or the per-user data directory.
    #[must_use]
    pub fn resolved_store_dir(&self) -> Option<Utf8PathBuf> {
        if let Some(dir) = &self.store_dir {
            return Some(dir.clone());
        }
        project_dirs()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("documents")).ok())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn load(project_root: &Path) -> Result<Settings, ConfigError> {
        Settings::load_from_paths(project_root, None, Some(HashMap::new()))
    }

    mod defaults {
        use super::*;

        #[test]
        fn test_load_no_files() {
            let dir = tempdir().unwrap();
            let settings = load(dir.path()).unwrap();
            assert_eq!(settings, Settings::default());
            assert_eq!(settings.default_limit, 100);
            assert_eq!(settings.debounce_ms, 300);
        }
    }

    mod project_files {
        use super::*;

        #[test]
        fn test_load_sgls_toml_only() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join("sgls.toml"),
                "schema = \"graph.json\"\ndefault_limit = 25\n",
            )
            .unwrap();
            let settings = load(dir.path()).unwrap();
            assert_eq!(settings.schema.as_deref(), Some("graph.json"));
            assert_eq!(settings.default_limit, 25);
        }

        #[test]
        fn test_load_dot_sgls_toml_only() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(".sgls.toml"), "debounce_ms = 50").unwrap();
            let settings = load(dir.path()).unwrap();
            assert_eq!(settings.debounce_ms, 50);
        }

        #[test]
        fn test_load_diagnostics_table() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join("sgls.toml"),
                "[diagnostics.severity]\nS101 = \"off\"\n",
            )
            .unwrap();
            let settings = load(dir.path()).unwrap();
            assert!(!settings
                .diagnostics
                .is_enabled("S101", DiagnosticSeverity::Warning));
        }
    }

    mod priority {
        use super::*;

        #[test]
        fn test_sgls_overrides_dot_sgls() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(".sgls.toml"), "default_limit = 10").unwrap();
            fs::write(dir.path().join("sgls.toml"), "default_limit = 20").unwrap();
            let settings = load(dir.path()).unwrap();
            assert_eq!(settings.default_limit, 20);
        }

        #[test]
        fn test_project_overrides_user() {
            let user_dir = tempdir().unwrap();
            let project_dir = tempdir().unwrap();
            let user_conf_path = user_dir.path().join("sgls.toml");
            fs::write(&user_conf_path, "default_limit = 10\ndebounce_ms = 5").unwrap();
            fs::write(project_dir.path().join(".sgls.toml"), "default_limit = 20").unwrap();

            let settings = Settings::load_from_paths(
                project_dir.path(),
                Some(&user_conf_path),
                Some(HashMap::new()),
            )
            .unwrap();
            assert_eq!(settings.default_limit, 20);
            assert_eq!(settings.debounce_ms, 5);
        }

        #[test]
        fn test_env_overrides_files() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("sgls.toml"), "default_limit = 20").unwrap();
            let env = HashMap::from([
                ("SGLS_DEFAULT_LIMIT".to_string(), "7".to_string()),
                (
                    "SGLS_SCHEMA".to_string(),
                    "http://localhost:8000/graph".to_string(),
                ),
            ]);

            let settings = Settings::load_from_paths(dir.path(), None, Some(env)).unwrap();
            assert_eq!(settings.default_limit, 7);
            assert_eq!(
                settings.schema.as_deref(),
                Some("http://localhost:8000/graph")
            );
        }
    }

    mod user_config {
        use super::*;

        #[test]
        fn test_missing_user_config_is_ignored() {
            let user_dir = tempdir().unwrap();
            let project_dir = tempdir().unwrap();
            let user_conf_path = user_dir.path().join("sgls.toml");
            fs::write(project_dir.path().join("sgls.toml"), "debounce_ms = 1").unwrap();

            let settings = Settings::load_from_paths(
                project_dir.path(),
                Some(&user_conf_path),
                Some(HashMap::new()),
            )
            .unwrap();
            assert_eq!(settings.debounce_ms, 1);
        }

        #[test]
        fn test_explicit_store_dir_is_used() {
            let settings = Settings {
                store_dir: Some(Utf8PathBuf::from("/tmp/sgls-store")),
                ..Settings::default()
            };
            assert_eq!(
                settings.resolved_store_dir(),
                Some(Utf8PathBuf::from("/tmp/sgls-store"))
            );
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn test_invalid_toml_content() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("sgls.toml"), "default_limit = not_a_number").unwrap();
            let result = load(dir.path());
            assert!(matches!(result.unwrap_err(), ConfigError::Config(_)));
        }

        #[test]
        fn test_zero_limit_rejected() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("sgls.toml"), "default_limit = 0").unwrap();
            let result = load(dir.path());
            assert!(matches!(result.unwrap_err(), ConfigError::ZeroLimit));
        }
    }
}
