//! Identifier shape detection and normalization.
//!
//! Detection scores a sample of values against named shapes (built-ins first,
//! then user patterns) and reports the best shape accepted by at least 80% of
//! the sample. Normalization rewrites a value with the first rule whose pattern
//! matches, so that identifiers following different naming conventions can be
//! compared. Both operations are pure.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::NormalizeRuleConfig;
use crate::error::{CheckError, Result};

/// Name reported when no shape reaches the confidence threshold.
pub const CUSTOM_PATTERN: &str = "custom";

/// Maximum number of sampled values scored during detection.
pub const DETECTION_SAMPLE_CAP: usize = 100;

/// Built-in identifier shapes, in tie-break order.
pub const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("prefix-number", r"^[A-Za-z]+-\d+$"),
    ("number-suffix", r"^\d+-[A-Za-z]+$"),
    ("prefix_number", r"^[A-Za-z]+_\d+$"),
    ("number_suffix", r"^\d+_[A-Za-z]+$"),
    ("code-number", r"^[A-Z]{2,}\d+$"),
    ("timestamp-serial", r"^\d{8}(?:\d{6})?[-_]\d+$"),
    (
        "standard-uuid",
        r"^(?i:[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}|[0-9a-f]{32})$",
    ),
];

/// A named identifier shape.
#[derive(Debug, Clone)]
pub struct IdentifierPattern {
    name: String,
    regex: Regex,
}

impl IdentifierPattern {
    /// Compile a shape. User shapes are anchored at the start of the value.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map_err(|e| CheckError::invalid_pattern("unique_id_patterns", pattern, e.to_string()))?;
        let regex = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| CheckError::invalid_pattern("unique_id_patterns", pattern, e.to_string()))?;
        Ok(Self {
            name: name.into(),
            regex,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// Result of shape detection over a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    /// Winning shape name, or `custom`.
    pub pattern: String,
    /// Fraction of the sample accepted by the best-scoring shape.
    pub confidence: f64,
}

/// Scores samples against the built-in shapes followed by user shapes.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    patterns: Vec<IdentifierPattern>,
}

impl PatternDetector {
    /// Built-in shapes plus the given user patterns (each named by its source text).
    pub fn new(user_patterns: &[String]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(BUILTIN_PATTERNS.len() + user_patterns.len());
        for (name, pattern) in BUILTIN_PATTERNS {
            patterns.push(IdentifierPattern::new(*name, pattern)?);
        }
        for pattern in user_patterns {
            patterns.push(IdentifierPattern::new(pattern.clone(), pattern)?);
        }
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[IdentifierPattern] {
        &self.patterns
    }

    /// Detect the dominant shape of `sample`.
    ///
    /// At most [`DETECTION_SAMPLE_CAP`] values are scored. The highest score
    /// wins; ties go to the shape declared first. A best score below 0.80
    /// (or an empty sample) yields `custom`.
    pub fn detect_pattern<S: AsRef<str>>(&self, sample: &[S]) -> DetectedPattern {
        let sample = &sample[..sample.len().min(DETECTION_SAMPLE_CAP)];
        if sample.is_empty() {
            return DetectedPattern {
                pattern: CUSTOM_PATTERN.to_string(),
                confidence: 0.0,
            };
        }

        let mut best: Option<(&IdentifierPattern, usize)> = None;
        for pattern in &self.patterns {
            let hits = sample.iter().filter(|v| pattern.matches(v.as_ref())).count();
            if best.map_or(true, |(_, b)| hits > b) {
                best = Some((pattern, hits));
            }
        }

        let total = sample.len();
        match best {
            // hits / total >= 0.8, kept in integers to avoid rounding at the boundary
            Some((pattern, hits)) if hits * 5 >= total * 4 => DetectedPattern {
                pattern: pattern.name().to_string(),
                confidence: hits as f64 / total as f64,
            },
            Some((_, hits)) => DetectedPattern {
                pattern: CUSTOM_PATTERN.to_string(),
                confidence: hits as f64 / total as f64,
            },
            None => DetectedPattern {
                pattern: CUSTOM_PATTERN.to_string(),
                confidence: 0.0,
            },
        }
    }
}

/// A validated rewrite rule.
#[derive(Debug, Clone)]
pub struct NormalizationRule {
    pattern: String,
    regex: Regex,
    /// Replacement in `regex` expansion syntax.
    template: String,
}

impl NormalizationRule {
    /// Compile a rule, translating `\N` and `\g<name>` back-references.
    ///
    /// Fails when the pattern does not compile, a back-reference is
    /// malformed, or it refers to a group the pattern does not define.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            CheckError::invalid_pattern("unique_id_normalize_patterns", pattern, e.to_string())
        })?;
        let template = translate_replacement(&regex, pattern, replacement)?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            template,
        })
    }

    /// Compile an ordered rule list from configuration.
    pub fn compile_all(rules: &[NormalizeRuleConfig]) -> Result<Vec<Self>> {
        rules
            .iter()
            .map(|r| Self::new(&r.pattern, &r.replacement))
            .collect()
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Replace every match of the pattern in `value`.
    pub fn apply(&self, value: &str) -> String {
        self.regex.replace_all(value, self.template.as_str()).into_owned()
    }
}

/// Rewrite `value` with the first rule whose pattern matches it.
///
/// Later rules are never consulted once one has matched, even if the rewritten
/// value would match them. A value no rule matches is returned unchanged.
pub fn normalize(value: &str, rules: &[NormalizationRule]) -> String {
    match rules.iter().find(|r| r.is_match(value)) {
        Some(rule) => rule.apply(value),
        None => value.to_string(),
    }
}

fn translate_replacement(regex: &Regex, pattern: &str, replacement: &str) -> Result<String> {
    let err = |msg: String| CheckError::invalid_replacement(pattern, replacement, msg);
    let group_count = regex.captures_len() - 1;
    let check_index = |n: usize| -> Result<()> {
        if n == 0 || n <= group_count {
            Ok(())
        } else {
            Err(err(format!(
                "group {} referenced but pattern has {} group(s)",
                n, group_count
            )))
        }
    };

    let mut out = String::with_capacity(replacement.len() + 8);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.next() {
                None => return Err(err("trailing backslash".into())),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(d) if d.is_ascii_digit() => {
                    let mut digits = String::from(d);
                    if let Some(next) = chars.peek().copied().filter(|c| c.is_ascii_digit()) {
                        digits.push(next);
                        chars.next();
                    }
                    let n: usize = digits
                        .parse()
                        .map_err(|_| err(format!("bad group reference \\{}", digits)))?;
                    check_index(n)?;
                    out.push_str(&format!("${{{}}}", n));
                }
                Some('g') => {
                    if chars.next() != Some('<') {
                        return Err(err("expected '<' after \\g".into()));
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('>') => break,
                            Some(ch) => name.push(ch),
                            None => return Err(err("unterminated group name".into())),
                        }
                    }
                    if name.is_empty() {
                        return Err(err("empty group name".into()));
                    }
                    if let Ok(n) = name.parse::<usize>() {
                        check_index(n)?;
                    } else if !regex.capture_names().flatten().any(|g| g == name) {
                        return Err(err(format!("unknown group name '{}'", name)));
                    }
                    out.push_str(&format!("${{{}}}", name));
                }
                Some(other) => return Err(err(format!("bad escape \\{}", other))),
            },
            other => out.push(other),
        }
    }
    Ok(out)
}
