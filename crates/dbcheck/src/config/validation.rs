//! Configuration validation.

use std::collections::HashMap;

use super::{CompiledOptions, ComparisonOptions, Config, DatabaseConfig};
use crate::classify::PatternLibrary;
use crate::error::{CheckError, Result};
use crate::identifier::{NormalizationRule, PatternDetector};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("target", &config.target)?;
    validate_options(&config.comparison)
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.r#type != "sqlite" {
        return Err(CheckError::Config(format!(
            "{}.type must be 'sqlite', got '{}'",
            side, db.r#type
        )));
    }
    if db.path.trim().is_empty() {
        return Err(CheckError::Config(format!("{}.path is required", side)));
    }
    Ok(())
}

/// Validate comparison options.
pub fn validate_options(opts: &ComparisonOptions) -> Result<()> {
    compile_options(opts).map(|_| ())
}

/// Validate comparison options and compile their patterns and rules.
///
/// Runs before any table is touched: numeric limits, every user regex, every
/// normalization replacement, and conflicts between the explicit column lists.
pub fn compile_options(opts: &ComparisonOptions) -> Result<CompiledOptions> {
    if opts.batch_size == 0 {
        return Err(CheckError::Config(
            "comparison.batch_size must be at least 1".into(),
        ));
    }
    if opts.max_workers == 0 {
        return Err(CheckError::Config(
            "comparison.max_workers must be at least 1".into(),
        ));
    }
    if opts.sample_size == 0 {
        return Err(CheckError::Config(
            "comparison.sample_size must be at least 1".into(),
        ));
    }

    let patterns = PatternLibrary::from_options(opts)?;
    let detector = PatternDetector::new(&opts.unique_id_patterns)?;
    let rules = NormalizationRule::compile_all(&opts.unique_id_normalize_patterns)?;

    check_explicit_conflicts(opts)?;

    Ok(CompiledOptions {
        options: opts.clone(),
        patterns,
        detector,
        rules,
    })
}

fn check_explicit_conflicts(opts: &ComparisonOptions) -> Result<()> {
    let lists = [
        ("explicit_uuid_columns", &opts.explicit_uuid_columns),
        ("explicit_timestamp_columns", &opts.explicit_timestamp_columns),
        ("explicit_metadata_columns", &opts.explicit_metadata_columns),
        ("explicit_sequence_columns", &opts.explicit_sequence_columns),
    ];

    let mut seen: HashMap<String, &str> = HashMap::new();
    for (field, columns) in lists {
        for column in columns {
            let key = column.to_lowercase();
            match seen.get(&key) {
                Some(first) if *first != field => {
                    return Err(CheckError::ConflictingColumn {
                        column: column.clone(),
                        first: first.to_string(),
                        second: field.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    seen.insert(key, field);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizeRuleConfig;

    fn valid_config() -> Config {
        Config {
            source: DatabaseConfig::sqlite("a.db"),
            target: DatabaseConfig::sqlite("b.db"),
            comparison: ComparisonOptions::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_unsupported_type() {
        let mut config = valid_config();
        config.target.r#type = "oracle".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("target.type"));
    }

    #[test]
    fn test_empty_path() {
        let mut config = valid_config();
        config.source.path = "  ".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.comparison.batch_size = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_zero_workers() {
        let mut config = valid_config();
        config.comparison.max_workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_malformed_exclusion_pattern() {
        let mut config = valid_config();
        config.comparison.excluded_column_patterns = vec!["([a-z".into()];
        match validate(&config) {
            Err(CheckError::InvalidPattern { field, pattern, .. }) => {
                assert_eq!(field, "excluded_column_patterns");
                assert_eq!(pattern, "([a-z");
            }
            other => panic!("expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_unique_id_pattern() {
        let mut config = valid_config();
        config.comparison.unique_id_patterns = vec!["[".into()];
        assert!(matches!(
            validate(&config),
            Err(CheckError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_bad_replacement_reference() {
        let mut config = valid_config();
        config.comparison.unique_id_normalize_patterns =
            vec![NormalizeRuleConfig::new(r"^(report|record)-(\d+)$", r"id-\3")];
        assert!(matches!(
            validate(&config),
            Err(CheckError::InvalidReplacement { .. })
        ));
    }

    #[test]
    fn test_conflicting_explicit_lists() {
        let mut config = valid_config();
        config.comparison.explicit_uuid_columns = vec!["ref".into()];
        config.comparison.explicit_sequence_columns = vec!["REF".into()];
        match validate(&config) {
            Err(CheckError::ConflictingColumn { first, second, .. }) => {
                assert_eq!(first, "explicit_uuid_columns");
                assert_eq!(second, "explicit_sequence_columns");
            }
            other => panic!("expected ConflictingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_within_one_list_is_fine() {
        let mut config = valid_config();
        config.comparison.explicit_uuid_columns = vec!["ref".into(), "ref".into()];
        assert!(validate(&config).is_ok());
    }
}
