//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::{compile_options, validate_options};

use crate::classify::PatternLibrary;
use crate::error::Result;
use crate::identifier::{NormalizationRule, PatternDetector};
use std::path::Path;

/// Validated options together with their compiled patterns and rules.
///
/// Built once per run and shared read-only by every table worker.
#[derive(Debug, Clone)]
pub struct CompiledOptions {
    pub options: ComparisonOptions,
    pub patterns: PatternLibrary,
    pub detector: PatternDetector,
    pub rules: Vec<NormalizationRule>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Serialize back to YAML (after CLI overrides, for logging).
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl ComparisonOptions {
    /// Validate the options on their own.
    pub fn validate(&self) -> Result<()> {
        validation::validate_options(self)
    }

    /// Validate and compile the options for a run.
    pub fn compile(&self) -> Result<CompiledOptions> {
        validation::compile_options(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckError;
    use std::io::Write;

    const SAMPLE: &str = r#"
source:
  path: before.db
target:
  type: sqlite
  path: after.db
comparison:
  uuid_comparison_mode: include_with_tracking
  explicit_uuid_columns: [id]
  unique_id_normalize_patterns:
    - pattern: '^(report|record)-(\d+)$'
      replacement: 'id-\2'
  max_workers: 2
"#;

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.source.r#type, "sqlite");
        assert_eq!(config.target.path, "after.db");
        assert_eq!(
            config.comparison.uuid_comparison_mode,
            UuidComparisonMode::IncludeWithTracking
        );
        assert_eq!(config.comparison.unique_id_normalize_patterns.len(), 1);
        assert_eq!(config.comparison.max_workers, 2);
        assert_eq!(config.comparison.batch_size, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.source.path, "before.db");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/dbcheck.yaml").unwrap_err();
        assert!(matches!(err, CheckError::Io(_)));
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_invalid_pattern_rejected_on_load() {
        let yaml = "source: {path: a.db}\ntarget: {path: b.db}\ncomparison:\n  excluded_column_patterns: ['([a-z']\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("([a-z"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let again = Config::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(again.comparison.explicit_uuid_columns, vec!["id".to_string()]);
    }
}
