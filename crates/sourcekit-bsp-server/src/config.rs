//! `buildServer.json` discovery.
//!
//! sourcekit-lsp launches whatever `buildServer.json` at the workspace root
//! points at; the same file also carries this server's own settings (the
//! top-level labels to index, extra aquery flags, fallback compiler options).

use serde::Deserialize;
use sourcekit_bsp_bazel::Error;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "buildServer.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildServerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub argv: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub bsp_version: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Top-level Bazel labels served by this workspace.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub index_database_path: Option<String>,
    /// Extra flags appended to every `bazel aquery` / `bazel build`.
    #[serde(default)]
    pub aquery_args: Vec<String>,
    /// Legacy fallback compiler options for files no target claims.
    #[serde(default)]
    pub default_settings: Option<Vec<String>>,
}

impl BuildServerConfig {
    pub fn load_from_workspace(workspace_root: &Path) -> Result<Self, Error> {
        let path = workspace_root.join(CONFIG_FILE_NAME);
        let data = std::fs::read_to_string(&path).map_err(|err| {
            Error::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        if data.trim().is_empty() {
            return Err(Error::Custom(format!(
                "configuration {} is empty",
                path.display()
            )));
        }
        serde_json::from_str(&data).map_err(|err| Error::json(data.len(), err))
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("bazel-sourcekit-bsp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn loads_a_full_config() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            serde_json::json!({
                "name": "bazel-sourcekit-bsp",
                "argv": ["/usr/local/bin/bazel-sourcekit-bsp"],
                "version": "0.3.1",
                "bspVersion": "2.0.0",
                "languages": ["swift"],
                "targets": ["//app:Lib"],
                "indexDatabasePath": ".index-db",
                "aqueryArgs": ["--config=indexing"],
                "defaultSettings": ["-sdk", "macosx"]
            })
            .to_string(),
        )
        .unwrap();

        let config = BuildServerConfig::load_from_workspace(dir.path()).unwrap();
        assert_eq!(config.targets, vec!["//app:Lib".to_string()]);
        assert_eq!(config.aquery_args, vec!["--config=indexing".to_string()]);
        assert_eq!(
            config.default_settings,
            Some(vec!["-sdk".to_string(), "macosx".to_string()])
        );
        assert_eq!(config.display_name(), "bazel-sourcekit-bsp");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempdir().unwrap();
        let err = BuildServerConfig::load_from_workspace(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "  \n").unwrap();
        let err = BuildServerConfig::load_from_workspace(dir.path()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"targets": ["//a:a"], "futureKnob": true}"#,
        )
        .unwrap();
        let config = BuildServerConfig::load_from_workspace(dir.path()).unwrap();
        assert_eq!(config.targets, vec!["//a:a".to_string()]);
    }
}
