use anyhow::{anyhow, Result};
use cadence_core::models::RecurrenceRule;
use chrono::{DateTime, NaiveDate};
use chrono_english::{parse_date_string, Dialect};
use chrono_tz::Tz;

/// Parses `YYYY-MM-DD` or a natural-language date relative to `now`.
pub fn parse_date(input: &str, now: DateTime<Tz>) -> Result<NaiveDate> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }
    parse_date_string(input, now, Dialect::Us)
        .map(|dt| dt.date_naive())
        .map_err(|e| anyhow!("Failed to parse date '{}': {}", input, e))
}

pub fn parse_rule(input: &str) -> Result<RecurrenceRule> {
    Ok(input.parse::<RecurrenceRule>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::models::RecurrencePattern;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Tz> {
        // Wednesday
        Tz::UTC.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case("2024-02-29", date(2024, 2, 29))]
    #[case(" 2025-12-31 ", date(2025, 12, 31))]
    #[case("tomorrow", date(2024, 1, 11))]
    #[case("today", date(2024, 1, 10))]
    fn test_parse_date(#[case] input: &str, #[case] expected: NaiveDate) {
        assert_eq!(parse_date(input, now()).unwrap(), expected);
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("not a date", now()).is_err());
    }

    #[test]
    fn test_parse_rule() {
        assert_eq!(
            parse_rule("monthly:last").unwrap().pattern,
            RecurrencePattern::MonthlyLastDay
        );
        assert!(parse_rule("every other tuesday").is_err());
    }
}
