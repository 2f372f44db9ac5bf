//! Text formatting for report values. Missing data always renders as `N/A`.

use chrono::NaiveDate;

use crate::metrics::Average;

pub const NOT_AVAILABLE: &str = "N/A";

/// `1234567` → `1,234,567`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_opt_count(n: Option<u64>) -> String {
    n.map(format_count).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// A measured value with its unit, two decimals.
pub fn format_rate(value: Option<f64>, unit: Option<&str>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => match unit {
            Some(u) if !u.is_empty() => format!("{v:.2} {u}"),
            _ => format!("{v:.2}"),
        },
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_average(avg: &Average) -> String {
    avg.to_string()
}

pub fn format_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
    match (start, end) {
        (Some(s), Some(e)) => format!("{s} to {e}"),
        _ => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_list(items: &[String]) -> String {
    if items.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        items.join(", ")
    }
}

pub fn validation_badge(status: Option<&str>) -> &'static str {
    if status == Some("PASS") {
        "All Quality Gates Passed"
    } else {
        "Validation Issues"
    }
}

/// Qualitative band for a 0-100 AI probability score.
pub fn ai_score_band(score: f64) -> &'static str {
    if score < 20.0 {
        "low"
    } else if score < 40.0 {
        "moderate"
    } else if score < 60.0 {
        "notable"
    } else if score < 80.0 {
        "high"
    } else {
        "very high"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
        assert_eq!(format_opt_count(None), "N/A");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(Some(1.5), Some("commits/day")), "1.50 commits/day");
        assert_eq!(format_rate(Some(2.0), None), "2.00");
        assert_eq!(format_rate(None, Some("hours")), "N/A");
        assert_eq!(format_rate(Some(f64::NAN), None), "N/A");
    }

    #[test]
    fn test_format_average_and_range() {
        assert_eq!(format_average(&Average::Value(2.0)), "2.00");
        assert_eq!(format_average(&Average::NotAvailable), "N/A");

        let d = |m, day| NaiveDate::from_ymd_opt(2026, m, day);
        assert_eq!(format_range(d(1, 1), d(1, 31)), "2026-01-01 to 2026-01-31");
        assert_eq!(format_range(d(1, 1), None), "N/A");
    }

    #[test]
    fn test_format_list() {
        assert_eq!(format_list(&[]), "N/A");
        assert_eq!(format_list(&["pytest".into(), "jest".into()]), "pytest, jest");
    }

    #[test]
    fn test_validation_badge() {
        assert_eq!(validation_badge(Some("PASS")), "All Quality Gates Passed");
        assert_eq!(validation_badge(Some("FAIL")), "Validation Issues");
        assert_eq!(validation_badge(None), "Validation Issues");
    }

    #[test]
    fn test_ai_score_band() {
        assert_eq!(ai_score_band(0.0), "low");
        assert_eq!(ai_score_band(19.9), "low");
        assert_eq!(ai_score_band(20.0), "moderate");
        assert_eq!(ai_score_band(45.0), "notable");
        assert_eq!(ai_score_band(60.0), "high");
        assert_eq!(ai_score_band(95.0), "very high");
    }
}
