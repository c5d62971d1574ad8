//! Column-name pattern catalogue.
//!
//! Name patterns are matched case-insensitively and anchored at the start of
//! the column name only; a pattern that must cover the whole name ends in `$`.

use regex::{Regex, RegexBuilder};

use super::ExclusionCategory;
use crate::config::ComparisonOptions;
use crate::error::{CheckError, Result};

pub const DEFAULT_UUID_PATTERNS: &[&str] = &[r".*uuid.*", r".*guid.*"];

pub const DEFAULT_TIMESTAMP_PATTERNS: &[&str] = &[
    r".*timestamp.*",
    r".*_at$",
    r".*_time$",
    r".*_date$",
    r"created$",
    r"modified$",
    r"updated$",
    r"deleted$",
];

pub const DEFAULT_METADATA_PATTERNS: &[&str] = &[
    r".*created_by.*",
    r".*modified_by.*",
    r".*updated_by.*",
    r".*session_id.*",
    r".*transaction_id.*",
    r".*row_version.*",
    r".*record_version.*",
    r".*version_number.*",
    r".*etag.*",
    r".*checksum.*",
    r".*hash.*",
    r".*audit_log.*",
    r".*trace_id.*",
    r".*source_system.*",
    r".*external_id.*",
    r".*_user$",
    r".*_by$",
    r".*source.*",
    r".*system.*",
];

pub const DEFAULT_SEQUENCE_PATTERNS: &[&str] = &[
    r"id$",
    r".*_seq$",
    r".*_sequence$",
    r".*_number$",
    r".*rowid.*",
    r".*autoincrement.*",
];

/// A compiled name pattern that remembers its source text.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile a pattern, attributing failures to the option list it came from.
    pub fn compile(field: &str, pattern: &str) -> Result<Self> {
        // Validate the pattern on its own first so that wrapping it cannot
        // turn an unbalanced pattern into a valid one.
        Regex::new(pattern).map_err(|e| CheckError::invalid_pattern(field, pattern, e.to_string()))?;
        let regex = RegexBuilder::new(&format!("^(?:{})", pattern))
            .case_insensitive(true)
            .build()
            .map_err(|e| CheckError::invalid_pattern(field, pattern, e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

fn compile_list<'a>(
    field: &str,
    defaults: &[&str],
    custom: impl IntoIterator<Item = &'a String>,
) -> Result<Vec<NamePattern>> {
    let mut out = Vec::with_capacity(defaults.len());
    for p in defaults {
        out.push(NamePattern::compile(field, p)?);
    }
    for p in custom {
        out.push(NamePattern::compile(field, p)?);
    }
    Ok(out)
}

/// Default and user-supplied name patterns for every exclusion category,
/// plus the user's own exclusion patterns.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    uuid: Vec<NamePattern>,
    timestamp: Vec<NamePattern>,
    metadata: Vec<NamePattern>,
    sequence: Vec<NamePattern>,
    excluded: Vec<NamePattern>,
}

impl PatternLibrary {
    /// Compile defaults merged with the custom patterns from `options`.
    ///
    /// Fails on the first pattern that does not compile, naming its list.
    pub fn from_options(options: &ComparisonOptions) -> Result<Self> {
        Ok(Self {
            uuid: compile_list("uuid_patterns", DEFAULT_UUID_PATTERNS, &options.uuid_patterns)?,
            timestamp: compile_list(
                "timestamp_patterns",
                DEFAULT_TIMESTAMP_PATTERNS,
                &options.timestamp_patterns,
            )?,
            metadata: compile_list(
                "metadata_patterns",
                DEFAULT_METADATA_PATTERNS,
                &options.metadata_patterns,
            )?,
            sequence: compile_list(
                "sequence_patterns",
                DEFAULT_SEQUENCE_PATTERNS,
                &options.sequence_patterns,
            )?,
            excluded: compile_list(
                "excluded_column_patterns",
                &[],
                &options.excluded_column_patterns,
            )?,
        })
    }

    /// Library with only the default patterns.
    pub fn defaults() -> Result<Self> {
        Self::from_options(&ComparisonOptions::default())
    }

    fn patterns_for(&self, category: ExclusionCategory) -> &[NamePattern] {
        match category {
            ExclusionCategory::Uuid => &self.uuid,
            ExclusionCategory::Timestamp => &self.timestamp,
            ExclusionCategory::Metadata => &self.metadata,
            ExclusionCategory::Sequence => &self.sequence,
            ExclusionCategory::None => &[],
        }
    }

    /// First pattern of `category` matching `name`.
    pub fn match_category(&self, category: ExclusionCategory, name: &str) -> Option<&str> {
        self.patterns_for(category)
            .iter()
            .find(|p| p.is_match(name))
            .map(NamePattern::source)
    }

    /// First user exclusion pattern matching `name`.
    pub fn match_excluded(&self, name: &str) -> Option<&str> {
        self.excluded
            .iter()
            .find(|p| p.is_match(name))
            .map(NamePattern::source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timestamp_patterns() {
        let lib = PatternLibrary::defaults().unwrap();
        for name in ["created_at", "Updated_At", "login_time", "birth_date", "created", "last_timestamp_utc"] {
            assert!(
                lib.match_category(ExclusionCategory::Timestamp, name).is_some(),
                "{} should be a timestamp",
                name
            );
        }
        assert!(lib.match_category(ExclusionCategory::Timestamp, "created_count").is_none());
        assert!(lib.match_category(ExclusionCategory::Timestamp, "format").is_none());
    }

    #[test]
    fn test_default_metadata_patterns() {
        let lib = PatternLibrary::defaults().unwrap();
        for name in ["created_by", "approved_by", "last_user", "checksum", "data_source", "SystemFlag"] {
            assert!(lib.match_category(ExclusionCategory::Metadata, name).is_some(), "{}", name);
        }
        assert!(lib.match_category(ExclusionCategory::Metadata, "name").is_none());
        assert!(lib.match_category(ExclusionCategory::Metadata, "city").is_none());
    }

    #[test]
    fn test_metadata_names_match_inside_longer_names() {
        let lib = PatternLibrary::defaults().unwrap();
        for name in [
            "row_checksum",
            "file_hash",
            "user_session_id",
            "parent_transaction_id",
            "legacy_external_id",
            "old_row_version",
            "ETag_value",
        ] {
            assert!(lib.match_category(ExclusionCategory::Metadata, name).is_some(), "{}", name);
        }
    }

    #[test]
    fn test_default_sequence_and_uuid_patterns() {
        let lib = PatternLibrary::defaults().unwrap();
        assert!(lib.match_category(ExclusionCategory::Sequence, "ID").is_some());
        assert!(lib.match_category(ExclusionCategory::Sequence, "order_number").is_some());
        assert!(lib.match_category(ExclusionCategory::Sequence, "user_id").is_none());
        assert!(lib.match_category(ExclusionCategory::Uuid, "row_GUID").is_some());
        assert!(lib.match_category(ExclusionCategory::Uuid, "user_id").is_none());
    }

    #[test]
    fn test_custom_patterns_merge_with_defaults() {
        let opts = ComparisonOptions {
            timestamp_patterns: vec![r".*_ts$".into()],
            ..Default::default()
        };
        let lib = PatternLibrary::from_options(&opts).unwrap();
        assert_eq!(lib.match_category(ExclusionCategory::Timestamp, "load_ts"), Some(r".*_ts$"));
        assert!(lib.match_category(ExclusionCategory::Timestamp, "created_at").is_some());
    }

    #[test]
    fn test_invalid_pattern_names_list() {
        let opts = ComparisonOptions {
            excluded_column_patterns: vec!["([a-z".into()],
            ..Default::default()
        };
        match PatternLibrary::from_options(&opts) {
            Err(CheckError::InvalidPattern { field, pattern, .. }) => {
                assert_eq!(field, "excluded_column_patterns");
                assert_eq!(pattern, "([a-z");
            }
            other => panic!("expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn test_user_exclusion_patterns() {
        let opts = ComparisonOptions {
            excluded_column_patterns: vec![r"tmp_.*".into()],
            ..Default::default()
        };
        let lib = PatternLibrary::from_options(&opts).unwrap();
        assert_eq!(lib.match_excluded("TMP_notes"), Some("tmp_.*"));
        assert!(lib.match_excluded("notes_tmp_x").is_none());
    }
}
