//! Built-in field table for RFQ documents.
//!
//! Patterns run against lowercased, whitespace-collapsed text, so they are
//! written in lowercase and never need to match line breaks.

use crate::models::field::{FieldDef, FieldKind};

/// Characters captured by the proximity tier when not configured.
pub const DEFAULT_PROXIMITY_WINDOW: usize = 300;

/// Short reference codes: one token after the label.
const CODE_VALUE: &str = r"[:\s#]*([a-z0-9][a-z0-9_\-/.]*)";

/// Field definitions used when no configuration file provides its own.
pub fn default_field_defs() -> Vec<FieldDef> {
    vec![
        FieldDef::new(
            "Project title",
            ["project title", "emergency maintenance fault repair"],
        ),
        FieldDef::new(
            "Description of work",
            ["brief description of works", "description of works", "description of work"],
        )
        .with_pattern(r"brief description of works?\s*:?\s*(.+?)\s*(?:date created:|$)"),
        FieldDef::new("RFQ close", ["rfq close", "close date", "closing date"])
            .with_kind(FieldKind::Date),
        FieldDef::new("Proposed start date", ["proposed start date"]).with_kind(FieldKind::Date),
        FieldDef::new("Proposed completion date", ["proposed completion date"])
            .with_kind(FieldKind::Date),
        FieldDef::new("Site location", ["site location"]),
        FieldDef::new("LRD", ["lrd"])
            .with_pattern(format!(r"\blrd\b{}", CODE_VALUE))
            .without_proximity(),
        FieldDef::new("Inc", ["inc"])
            .with_pattern(format!(r"\binc\b{}", CODE_VALUE))
            .without_proximity(),
        FieldDef::new("Tas", ["tas"])
            .with_pattern(format!(r"\btas\b{}", CODE_VALUE))
            .without_proximity(),
        FieldDef::new("Practical work", ["practical work"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::FieldSpecSet;

    #[test]
    fn test_default_table_compiles() {
        let specs = FieldSpecSet::compile(&default_field_defs()).unwrap();
        let names: Vec<_> = specs.names().collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "Project title");
        assert_eq!(names[9], "Practical work");
    }

    #[test]
    fn test_code_fields_skip_proximity() {
        let specs = FieldSpecSet::compile(&default_field_defs()).unwrap();
        for spec in specs.iter().filter(|s| ["LRD", "Inc", "Tas"].contains(&s.name())) {
            assert!(!spec.uses_proximity());
            assert!(spec.pattern().is_some());
        }
    }
}
