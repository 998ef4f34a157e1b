//! Calendar date recognition for date-kind fields.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})\b"
    ).unwrap();

    static ref DATE_YMD: Regex = Regex::new(
        r"\b(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})\b"
    ).unwrap();

    static ref DATE_DAY_MONTH_YEAR: Regex = Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(?:of\s+)?([a-z]{3,9})\.?,?\s+(\d{4})\b"
    ).unwrap();

    static ref DATE_MONTH_DAY_YEAR: Regex = Regex::new(
        r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b"
    ).unwrap();
}

/// Find the earliest date written in `text`.
///
/// Numeric dates are read day-first, as RFQs from this document family are.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let mut candidates: Vec<(usize, NaiveDate)> = Vec::new();

    for caps in DATE_DMY.captures_iter(text) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let year = parse_year(&caps[3]);
        if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
            candidates.push((m.start(), date));
        }
    }

    for caps in DATE_YMD.captures_iter(text) {
        let year: i32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let day: u32 = caps[3].parse().unwrap_or(0);
        if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
            candidates.push((m.start(), date));
        }
    }

    for caps in DATE_DAY_MONTH_YEAR.captures_iter(text) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month = month_to_number(&caps[2]);
        let year: i32 = caps[3].parse().unwrap_or(0);
        if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
            candidates.push((m.start(), date));
        }
    }

    for caps in DATE_MONTH_DAY_YEAR.captures_iter(text) {
        let month = month_to_number(&caps[1]);
        let day: u32 = caps[2].parse().unwrap_or(0);
        let year: i32 = caps[3].parse().unwrap_or(0);
        if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
            candidates.push((m.start(), date));
        }
    }

    candidates.into_iter().min_by_key(|(start, _)| *start).map(|(_, date)| date)
}

fn parse_year(s: &str) -> i32 {
    let year: i32 = s.parse().unwrap_or(0);
    if year < 100 {
        // Two-digit year: 00-50 -> 2000s, 51-99 -> 1900s
        if year <= 50 { 2000 + year } else { 1900 + year }
    } else {
        year
    }
}

fn month_to_number(month: &str) -> u32 {
    let month = month.to_lowercase();
    let month = month.trim_end_matches('.');
    match month {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_day_first_numeric() {
        assert_eq!(parse_date("Close: 05/03/2025 2pm"), ymd(2025, 3, 5));
        assert_eq!(parse_date("15.01.24"), ymd(2024, 1, 15));
    }

    #[test]
    fn test_iso_date() {
        assert_eq!(parse_date("2025-04-30"), ymd(2025, 4, 30));
    }

    #[test]
    fn test_long_forms() {
        assert_eq!(parse_date("Proposed Start Date: 12 March 2025."), ymd(2025, 3, 12));
        assert_eq!(parse_date("on the 1st of Sept 2025"), ymd(2025, 9, 1));
        assert_eq!(parse_date("April 30, 2025"), ymd(2025, 4, 30));
    }

    #[test]
    fn test_earliest_date_wins() {
        let text = "Proposed Start Date: 12 March 2025. Proposed Completion Date: 30 April 2025";
        assert_eq!(parse_date(text), ymd(2025, 3, 12));
    }

    #[test]
    fn test_no_date() {
        assert_eq!(parse_date("to be advised"), None);
        assert_eq!(parse_date("31/02/2025"), None);
    }
}
