//! Build configuration.
//!
//! Read from `alcove.toml` in the project base directory when present. Every
//! directory is relative to that base directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BuildError;

pub const CONFIG_FILE: &str = "alcove.toml";

/// Where `new_app` writes the engine when none is configured.
pub const SCAFFOLD_ENGINE: &str = "engine/runtime.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StyleCompilerKind {
    #[default]
    Builtin,
    Lessc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub common_less: PathBuf,
    pub js: PathBuf,
    pub locale: PathBuf,
    pub output: PathBuf,
    pub style: PathBuf,
    #[serde(rename = "static")]
    pub static_dir: PathBuf,
    pub test_output: PathBuf,
    pub widget_tests: PathBuf,
    pub widgets: PathBuf,
    /// Script holding the client runtime engine, placed after library scripts.
    /// Unset means the engine shipped with Alcove.
    pub engine: Option<PathBuf>,
    pub cache: PathBuf,
    pub style_compiler: StyleCompilerKind,
    pub lessc: String,
    /// Global the locale table is assigned to inside each bundle.
    pub text_global: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            common_less: PathBuf::from("style/common"),
            js: PathBuf::from("js"),
            locale: PathBuf::from("locale"),
            output: PathBuf::from("output"),
            style: PathBuf::from("style"),
            static_dir: PathBuf::from("static"),
            test_output: PathBuf::from("output/test"),
            widget_tests: PathBuf::from("test/widgets"),
            widgets: PathBuf::from("widgets"),
            engine: None,
            cache: PathBuf::from(".alcove/cache"),
            style_compiler: StyleCompilerKind::Builtin,
            lessc: "lessc".to_string(),
            text_global: "Alcove.TEXT".to_string(),
        }
    }
}

impl BuildConfig {
    /// Load `alcove.toml` from `base_dir`, falling back to defaults when absent.
    pub fn load(base_dir: &Path) -> Result<Self, BuildError> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let source = fs::read_to_string(&path).map_err(|e| BuildError::io(&path, e))?;
        Self::from_toml(&source).map_err(|message| BuildError::Config { path, message })
    }

    pub fn from_toml(source: &str) -> Result<Self, String> {
        toml::from_str(source).map_err(|e| e.to_string())
    }

    /// Absolute directories, in the order the staleness check walks them.
    pub fn source_dirs(&self, base_dir: &Path) -> Vec<PathBuf> {
        [
            &self.common_less,
            &self.js,
            &self.locale,
            &self.style,
            &self.static_dir,
            &self.widget_tests,
            &self.widgets,
        ]
        .iter()
        .map(|dir| base_dir.join(dir))
        .collect()
    }

    /// Every configured directory, used when scaffolding a new project.
    pub fn all_dirs(&self) -> Vec<&Path> {
        vec![
            self.common_less.as_path(),
            self.js.as_path(),
            self.locale.as_path(),
            self.output.as_path(),
            self.style.as_path(),
            self.static_dir.as_path(),
            self.test_output.as_path(),
            self.widget_tests.as_path(),
            self.widgets.as_path(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = BuildConfig::from_toml("").unwrap();
        assert_eq!(config.widgets, PathBuf::from("widgets"));
        assert_eq!(config.test_output, PathBuf::from("output/test"));
        assert_eq!(config.style_compiler, StyleCompilerKind::Builtin);
        assert_eq!(config.engine, None);
    }

    #[test]
    fn test_overrides() {
        let config = BuildConfig::from_toml(
            r#"
output = "dist"
static = "public"
style_compiler = "lessc"
engine = "vendor/engine.js"
"#,
        )
        .unwrap();
        assert_eq!(config.output, PathBuf::from("dist"));
        assert_eq!(config.static_dir, PathBuf::from("public"));
        assert_eq!(config.style_compiler, StyleCompilerKind::Lessc);
        assert_eq!(config.js, PathBuf::from("js"));
        assert_eq!(config.engine, Some(PathBuf::from("vendor/engine.js")));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(BuildConfig::from_toml("outptu = \"x\"").is_err());
    }
}
