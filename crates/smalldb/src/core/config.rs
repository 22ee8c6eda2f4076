//! Build configuration
//!
//! # Environment Variables
//!
//! - `SMALLDB_BASE_DIR`: directory that relative class directories resolve against
//! - `SMALLDB_STRICT_TRANSITIONS`: when `1`/`true`, an incomplete transition
//!   that nothing completes fails the build instead of being dropped
//! - `SMALLDB_DIAGRAM_FORMAT`: fallback format for includes whose format can
//!   be neither read from the extension nor detected

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::diagram::DiagramFormat;

/// Options shared by every build of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub base_dir: Option<PathBuf>,
    pub drop_incomplete_transitions: bool,
    pub default_diagram_format: Option<DiagramFormat>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            drop_incomplete_transitions: true,
            default_diagram_format: None,
        }
    }
}

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration overridden by `SMALLDB_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("SMALLDB_BASE_DIR").filter(|d| !d.is_empty()) {
            config.base_dir = Some(PathBuf::from(dir));
        }
        if let Some(strict) = lookup("SMALLDB_STRICT_TRANSITIONS") {
            config.drop_incomplete_transitions =
                !matches!(strict.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(format) = lookup("SMALLDB_DIAGRAM_FORMAT") {
            match DiagramFormat::from_str(&format) {
                Ok(format) => config.default_diagram_format = Some(format),
                Err(e) => tracing::warn!("Ignoring SMALLDB_DIAGRAM_FORMAT: {}", e),
            }
        }
        config
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_drop_incomplete_transitions(mut self, drop: bool) -> Self {
        self.drop_incomplete_transitions = drop;
        self
    }

    pub fn with_default_diagram_format(mut self, format: DiagramFormat) -> Self {
        self.default_diagram_format = Some(format);
        self
    }

    /// Directory of a class, resolved against the base directory
    pub fn class_directory(&self, directory: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if directory.is_relative() => base.join(directory),
            _ => directory.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BuildConfig::default();
        assert!(config.drop_incomplete_transitions);
        assert_eq!(config.base_dir, None);
        assert_eq!(config.default_diagram_format, None);
    }

    #[test]
    fn test_from_environment() {
        let config = BuildConfig::from_lookup(lookup(&[
            ("SMALLDB_BASE_DIR", "/srv/app"),
            ("SMALLDB_STRICT_TRANSITIONS", "true"),
            ("SMALLDB_DIAGRAM_FORMAT", "mermaid"),
        ]));
        assert_eq!(config.base_dir, Some(PathBuf::from("/srv/app")));
        assert!(!config.drop_incomplete_transitions);
        assert_eq!(config.default_diagram_format, Some(DiagramFormat::Mermaid));
    }

    #[test]
    fn test_invalid_format_is_ignored() {
        let config = BuildConfig::from_lookup(lookup(&[("SMALLDB_DIAGRAM_FORMAT", "svg")]));
        assert_eq!(config.default_diagram_format, None);
    }

    #[test]
    fn test_class_directory() {
        let config = BuildConfig::new().with_base_dir("/srv/app");
        assert_eq!(config.class_directory(Path::new("src/Article")), PathBuf::from("/srv/app/src/Article"));
        assert_eq!(config.class_directory(Path::new("/abs")), PathBuf::from("/abs"));
        assert_eq!(BuildConfig::new().class_directory(Path::new("rel")), PathBuf::from("rel"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: BuildConfig = serde_json::from_str(r#"{"default_diagram_format": "json"}"#).unwrap();
        assert!(config.drop_incomplete_transitions);
        assert_eq!(config.default_diagram_format, Some(DiagramFormat::Json));
    }
}
