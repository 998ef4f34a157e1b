//! Tiered field extraction over a [`NormalizedDocument`].
//!
//! Each field is resolved by the first tier that yields a value:
//! table rows, then the field pattern, then keyword proximity. Fields no tier
//! resolves are reported as [`FieldValue::NotFound`], which is a normal
//! outcome rather than an error.

mod dates;
mod defaults;

pub use dates::parse_date;
pub use defaults::{default_field_defs, DEFAULT_PROXIMITY_WINDOW};

use tracing::{debug, trace};

use crate::models::config::ExtractionConfig;
use crate::models::document::{NormalizedDocument, TableRow};
use crate::models::field::{
    FieldKind, FieldResult, FieldResults, FieldSpec, FieldSpecSet, MatchSource,
};
use crate::normalize::{collapse_whitespace, normalize_key, ProbeText};

#[cfg(doc)]
use crate::models::field::FieldValue;

/// Trait for field extractors.
pub trait FieldExtractor {
    /// Resolve every spec against the document, one result per spec.
    fn extract(&self, document: &NormalizedDocument, specs: &FieldSpecSet) -> FieldResults;
}

/// Table, pattern, proximity: the default extraction strategy.
#[derive(Debug, Clone)]
pub struct TieredExtractor {
    /// Proximity window length in characters.
    window: usize,
    /// Drop the matched label from proximity results.
    strip_label: bool,
}

impl TieredExtractor {
    pub fn new() -> Self {
        Self {
            window: DEFAULT_PROXIMITY_WINDOW,
            strip_label: false,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new()
            .with_window(config.proximity_window)
            .with_strip_label(config.strip_label)
    }

    /// Set the proximity window length (minimum 1).
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Set whether proximity results drop their label.
    pub fn with_strip_label(mut self, strip: bool) -> Self {
        self.strip_label = strip;
        self
    }

    fn extract_field(
        &self,
        rows: &[TableRow],
        probe: &ProbeText,
        spec: &FieldSpec,
    ) -> FieldResult {
        let found = table_tier(rows, spec)
            .map(|v| (v, MatchSource::TableMatch))
            .or_else(|| pattern_tier(probe, spec).map(|v| (v, MatchSource::PatternMatch)))
            .or_else(|| {
                self.proximity_tier(probe, spec)
                    .map(|v| (v, MatchSource::TextProximityMatch))
            });

        match found {
            Some((value, source)) => {
                trace!("Field {:?} resolved by {}", spec.name(), source.as_str());
                let date = match spec.kind() {
                    FieldKind::Date => parse_date(&value),
                    FieldKind::Text => None,
                };
                FieldResult::found(spec.name(), value, source).with_date(date)
            }
            None => {
                trace!("Field {:?} not found", spec.name());
                FieldResult::not_found(spec.name())
            }
        }
    }

    fn proximity_tier(&self, probe: &ProbeText, spec: &FieldSpec) -> Option<String> {
        if !spec.uses_proximity() {
            return None;
        }

        for key in spec.candidate_keys() {
            let Some((start, end)) = probe.find_span(key) else {
                continue;
            };
            let window = probe.window(start, self.window);
            let value = if self.strip_label {
                strip_label(&window, end - start)
            } else {
                window
            };
            if !value.is_empty() {
                return Some(value);
            }
        }
        None
    }
}

impl Default for TieredExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for TieredExtractor {
    fn extract(&self, document: &NormalizedDocument, specs: &FieldSpecSet) -> FieldResults {
        let probe = ProbeText::new(document);
        let results: Vec<FieldResult> = specs
            .iter()
            .map(|spec| self.extract_field(document.table_rows(), &probe, spec))
            .collect();

        let extracted = FieldResults::from(results);
        debug!(
            "Extracted {}/{} fields",
            extracted.found_count(),
            extracted.len()
        );
        extracted
    }
}

/// First row whose key contains any candidate key.
fn table_tier(rows: &[TableRow], spec: &FieldSpec) -> Option<String> {
    if spec.candidate_keys().is_empty() {
        return None;
    }
    rows.iter()
        .filter(|row| !row.value.trim().is_empty())
        .find(|row| {
            let key = normalize_key(&row.key);
            spec.candidate_keys().iter().any(|candidate| key.contains(candidate.as_str()))
        })
        .map(|row| row.value.clone())
}

/// Last non-empty capture group, or the whole match for group-less patterns.
///
/// Matching runs on the lowered text; the value is read back from the raw
/// text so it keeps the document's case.
fn pattern_tier(probe: &ProbeText, spec: &FieldSpec) -> Option<String> {
    let pattern = spec.pattern()?;
    let caps = pattern.captures(probe.lowered())?;

    let found = if caps.len() > 1 {
        (1..caps.len())
            .rev()
            .filter_map(|i| caps.get(i))
            .find(|m| !m.as_str().trim().is_empty())?
    } else {
        caps.get(0)?
    };

    let value = collapse_whitespace(&probe.original(found.range())?);
    if value.is_empty() { None } else { Some(value) }
}

/// Remove the leading label and any separator punctuation after it.
fn strip_label(window: &str, label_chars: usize) -> String {
    window
        .chars()
        .skip(label_chars)
        .collect::<String>()
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—' | '='))
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::{FieldDef, FieldValue};
    use pretty_assertions::assert_eq;

    fn doc(lines: &[&str], rows: &[(&str, &str)]) -> NormalizedDocument {
        NormalizedDocument::new(
            lines.iter().map(|l| l.to_string()).collect(),
            rows.iter().map(|(k, v)| TableRow::new(*k, *v)).collect(),
            Vec::new(),
        )
    }

    fn specs(defs: Vec<FieldDef>) -> FieldSpecSet {
        FieldSpecSet::compile(&defs).unwrap()
    }

    #[test]
    fn test_one_result_per_spec() {
        let specs = FieldSpecSet::compile(&default_field_defs()).unwrap();
        let results = TieredExtractor::new().extract(&NormalizedDocument::default(), &specs);

        assert_eq!(results.len(), specs.len());
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        let expected: Vec<_> = specs.names().collect();
        assert_eq!(names, expected);
        assert!(results.iter().all(|r| r.source == MatchSource::NotFound));
    }

    #[test]
    fn test_table_tier_takes_precedence() {
        let document = doc(
            &["Site Location: Unknown"],
            &[("site location", "P3-12 North Wing")],
        );
        let specs = specs(vec![FieldDef::new("Site location", ["site location"])]);
        let results = TieredExtractor::new().extract(&document, &specs);

        let site = results.get("Site location").unwrap();
        assert_eq!(site.value, FieldValue::Found("P3-12 North Wing".to_string()));
        assert_eq!(site.source, MatchSource::TableMatch);
    }

    #[test]
    fn test_table_value_is_untouched_and_first_row_wins() {
        let document = doc(
            &[],
            &[("work site  location", "  Dock 7\n  Gate B "), ("site location", "second")],
        );
        let specs = specs(vec![FieldDef::new("Site location", ["Site Location"])]);
        let results = TieredExtractor::new().extract(&document, &specs);

        assert_eq!(results.value("Site location"), Some("  Dock 7\n  Gate B "));
    }

    #[test]
    fn test_proximity_fallback_keeps_label() {
        let document = doc(
            &["...Proposed Start Date: 12 March 2025. Proposed Completion Date: 30 April 2025..."],
            &[],
        );
        let specs = specs(vec![
            FieldDef::new("Proposed start date", ["proposed start date"]).with_kind(FieldKind::Date),
        ]);
        let results = TieredExtractor::new().extract(&document, &specs);

        let start = results.get("Proposed start date").unwrap();
        assert_eq!(start.source, MatchSource::TextProximityMatch);
        let value = start.value.as_str().unwrap();
        assert!(value.starts_with("Proposed Start Date"));
        assert!(value.contains("12 March 2025"));
        assert_eq!(start.date, chrono::NaiveDate::from_ymd_opt(2025, 3, 12));
    }

    #[test]
    fn test_proximity_window_spans_lines_and_is_bounded() {
        let document = doc(&["Site", "  Location:", "Wharf   4", "Berth 2"], &[]);
        let specs = specs(vec![FieldDef::new("Site location", ["site location"])]);
        let results = TieredExtractor::new().with_window(22).extract(&document, &specs);

        assert_eq!(results.value("Site location"), Some("Site Location: Wharf 4"));
    }

    #[test]
    fn test_strip_label_option() {
        let document = doc(&["Site Location: - Wharf 4"], &[]);
        let specs = specs(vec![FieldDef::new("Site location", ["site location"])]);
        let results = TieredExtractor::new()
            .with_strip_label(true)
            .extract(&document, &specs);

        assert_eq!(results.value("Site location"), Some("Wharf 4"));
    }

    #[test]
    fn test_strip_label_with_nothing_after_is_not_found() {
        let document = doc(&["Site Location:"], &[]);
        let specs = specs(vec![FieldDef::new("Site location", ["site location"])]);
        let results = TieredExtractor::new()
            .with_strip_label(true)
            .extract(&document, &specs);

        assert_eq!(results.get("Site location").unwrap().source, MatchSource::NotFound);
    }

    #[test]
    fn test_not_found_is_a_result() {
        let document = doc(&["Nothing relevant in this world"], &[("contact", "Jo")]);
        let specs = FieldSpecSet::compile(&default_field_defs()).unwrap();
        let results = TieredExtractor::new().extract(&document, &specs);

        assert_eq!(results.get("LRD"), Some(&FieldResult::not_found("LRD")));
    }

    #[test]
    fn test_pattern_takes_last_non_empty_group() {
        let document = doc(&["RFQ Close", "Date: 14/02/2025 2:00pm"], &[]);
        let specs = specs(vec![
            FieldDef::new("RFQ close", Vec::<String>::new())
                .with_pattern(r"(rfq close|close date)[:\s]*(date:)?\s*(\S+)"),
        ]);
        let results = TieredExtractor::new().extract(&document, &specs);

        let close = results.get("RFQ close").unwrap();
        assert_eq!(close.source, MatchSource::PatternMatch);
        assert_eq!(close.value.as_str(), Some("14/02/2025"));
    }

    #[test]
    fn test_pattern_without_groups_uses_whole_match() {
        let document = doc(&["Ref INC-0042 raised"], &[]);
        let specs = specs(vec![FieldDef::new("Inc", Vec::<String>::new()).with_pattern(r"inc-\d+")]);
        let results = TieredExtractor::new().extract(&document, &specs);

        assert_eq!(results.value("Inc"), Some("INC-0042"));
    }

    #[test]
    fn test_empty_capture_falls_through() {
        let document = doc(&["Practical Work:"], &[]);
        let specs = specs(vec![
            FieldDef::new("Practical work", ["practical work"])
                .with_pattern(r"practical work:\s*(\w*)"),
        ]);
        let results = TieredExtractor::new().extract(&document, &specs);

        let practical = results.get("Practical work").unwrap();
        assert_eq!(practical.source, MatchSource::TextProximityMatch);
        assert_eq!(practical.value.as_str(), Some("Practical Work:"));
    }

    #[test]
    fn test_code_fields_do_not_match_inside_words() {
        let document = doc(&["Includes tasks for the world stage"], &[]);
        let specs = FieldSpecSet::compile(&default_field_defs()).unwrap();
        let results = TieredExtractor::new().extract(&document, &specs);

        for name in ["LRD", "Inc", "Tas"] {
            assert_eq!(results.get(name).unwrap().source, MatchSource::NotFound);
        }
    }

    #[test]
    fn test_default_code_field_pattern() {
        let document = doc(&["LRD: 4471-B  INC #INC00918 TAS 12"], &[]);
        let specs = FieldSpecSet::compile(&default_field_defs()).unwrap();
        let results = TieredExtractor::new().extract(&document, &specs);

        assert_eq!(results.value("LRD"), Some("4471-B"));
        assert_eq!(results.value("Inc"), Some("INC00918"));
        assert_eq!(results.value("Tas"), Some("12"));
    }

    #[test]
    fn test_description_pattern_stops_at_date_created() {
        let document = doc(
            &[
                "Brief Description of Works: Replace damaged",
                "gutter   along east wall",
                "Date Created: 01/02/2025",
            ],
            &[],
        );
        let specs = FieldSpecSet::compile(&default_field_defs()).unwrap();
        let results = TieredExtractor::new().extract(&document, &specs);

        let description = results.get("Description of work").unwrap();
        assert_eq!(description.source, MatchSource::PatternMatch);
        assert_eq!(
            description.value.as_str(),
            Some("Replace damaged gutter along east wall")
        );
    }

    #[test]
    fn test_extract_is_idempotent() {
        let document = doc(
            &["Project Title: Roof works", "Site Location: Depot", "LRD 77"],
            &[("rfq close", "3 March 2025"), ("site location", "Depot A")],
        );
        let specs = FieldSpecSet::compile(&default_field_defs()).unwrap();
        let extractor = TieredExtractor::new();

        let first = serde_json::to_string(&extractor.extract(&document, &specs)).unwrap();
        let second = serde_json::to_string(&extractor.extract(&document, &specs)).unwrap();
        assert_eq!(first, second);
    }
}
