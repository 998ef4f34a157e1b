//! Field specifications and extraction results.

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;
use crate::normalize::normalize_key;

/// How a field value should be interpreted after it is found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text.
    #[default]
    Text,
    /// Free text that should also carry a parsed calendar date.
    Date,
}

/// Serializable definition of a field, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Unique field name.
    pub name: String,

    /// Keyword or phrase probes for the table and proximity tiers.
    #[serde(default)]
    pub candidate_keys: Vec<String>,

    /// Optional regular expression probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Value interpretation.
    #[serde(default)]
    pub kind: FieldKind,

    /// Whether the proximity tier may be used for this field.
    #[serde(default = "default_proximity")]
    pub proximity: bool,
}

fn default_proximity() -> bool {
    true
}

impl FieldDef {
    pub fn new<I, S>(name: impl Into<String>, candidate_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            candidate_keys: candidate_keys.into_iter().map(Into::into).collect(),
            pattern: None,
            kind: FieldKind::Text,
            proximity: true,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn without_proximity(mut self) -> Self {
        self.proximity = false;
        self
    }
}

/// A compiled, validated field specification.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    candidate_keys: Vec<String>,
    pattern: Option<Regex>,
    kind: FieldKind,
    proximity: bool,
}

impl FieldSpec {
    /// Validate and compile one definition.
    ///
    /// Candidate keys are lowercased and whitespace-collapsed; blank and
    /// repeated keys are dropped while keeping first-seen order.
    pub fn compile(def: &FieldDef) -> Result<Self, ConfigError> {
        let name = def.name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyFieldName);
        }

        let mut candidate_keys: Vec<String> = Vec::with_capacity(def.candidate_keys.len());
        for key in &def.candidate_keys {
            let key = normalize_key(key);
            if !key.is_empty() && !candidate_keys.contains(&key) {
                candidate_keys.push(key);
            }
        }

        let pattern = match def.pattern.as_deref() {
            Some(source) => Some(
                RegexBuilder::new(source)
                    .case_insensitive(true)
                    .dot_matches_new_line(true)
                    .build()
                    .map_err(|source| ConfigError::InvalidPattern {
                        field: name.to_string(),
                        source,
                    })?,
            ),
            None => None,
        };

        if candidate_keys.is_empty() && pattern.is_none() {
            return Err(ConfigError::NoProbes(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            candidate_keys,
            pattern,
            kind: def.kind,
            proximity: def.proximity,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidate_keys(&self) -> &[String] {
        &self.candidate_keys
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn uses_proximity(&self) -> bool {
        self.proximity
    }
}

/// Ordered, name-unique set of compiled field specifications.
///
/// Loaded once and shared read-only between invocations.
#[derive(Debug, Clone)]
pub struct FieldSpecSet {
    specs: Vec<FieldSpec>,
}

impl FieldSpecSet {
    /// Compile every definition, failing on the first invalid one.
    pub fn compile(defs: &[FieldDef]) -> Result<Self, ConfigError> {
        let mut specs: Vec<FieldSpec> = Vec::with_capacity(defs.len());
        for def in defs {
            let spec = FieldSpec::compile(def)?;
            if specs.iter().any(|s| s.name == spec.name) {
                return Err(ConfigError::DuplicateField(spec.name));
            }
            specs.push(spec);
        }
        Ok(Self { specs })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldSpec> {
        self.specs.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl<'a> IntoIterator for &'a FieldSpecSet {
    type Item = &'a FieldSpec;
    type IntoIter = std::slice::Iter<'a, FieldSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

/// Which tier produced a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchSource {
    TableMatch,
    TextProximityMatch,
    PatternMatch,
    NotFound,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::TableMatch => "TABLE_MATCH",
            MatchSource::TextProximityMatch => "TEXT_PROXIMITY_MATCH",
            MatchSource::PatternMatch => "PATTERN_MATCH",
            MatchSource::NotFound => "NOT_FOUND",
        }
    }
}

/// A field value, or the documented absence of one.
///
/// Serializes as a string or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Found(String),
    NotFound,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Found(value) => Some(value),
            FieldValue::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, FieldValue::Found(_))
    }
}

/// Outcome of extracting a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldResult {
    /// Field name as configured.
    pub name: String,

    /// Extracted value.
    pub value: FieldValue,

    /// Tier that produced the value.
    pub source: MatchSource,

    /// Parsed date for date fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl FieldResult {
    pub fn found(name: impl Into<String>, value: impl Into<String>, source: MatchSource) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Found(value.into()),
            source,
            date: None,
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::NotFound,
            source: MatchSource::NotFound,
            date: None,
        }
    }

    pub fn with_date(mut self, date: Option<NaiveDate>) -> Self {
        self.date = date;
        self
    }
}

/// Field results in configured order, one per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldResults {
    results: Vec<FieldResult>,
}

impl FieldResults {
    pub fn get(&self, name: &str) -> Option<&FieldResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Value of a field, `None` when absent or not found.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|r| r.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn found_count(&self) -> usize {
        self.results.iter().filter(|r| r.value.is_found()).count()
    }
}

impl From<Vec<FieldResult>> for FieldResults {
    fn from(results: Vec<FieldResult>) -> Self {
        Self { results }
    }
}

impl<'a> IntoIterator for &'a FieldResults {
    type Item = &'a FieldResult;
    type IntoIter = std::slice::Iter<'a, FieldResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl Serialize for FieldResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for result in &self.results {
            map.serialize_entry(&result.name, result)?;
        }
        map.end()
    }
}
