use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::CoreError;
use crate::models::{RecurrencePattern, RecurrenceRule};

/// Upper bound for `preview` so a caller cannot ask for an unbounded walk.
pub const MAX_PREVIEW: usize = 366;

/// Converts an instant to the calendar date it falls on in `tz`.
///
/// All recurrence arithmetic runs on these dates, never on timestamps, so a
/// DST shift cannot move an occurrence to a neighbouring day.
pub fn normalize_to_local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .map_or(31, |last| last.day())
}

fn first_of_following_month(date: NaiveDate) -> Result<NaiveDate, CoreError> {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .ok_or_else(|| out_of_range(date))
}

fn out_of_range(date: NaiveDate) -> CoreError {
    CoreError::Configuration(format!("no representable occurrence after {}", date))
}

/// RecurrenceEvaluator: the pure calendar arithmetic behind every series.
///
/// Deterministic in `(after, rule)`; there is no dependency on the current
/// time anywhere in this type.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecurrenceEvaluator;

impl RecurrenceEvaluator {
    /// Computes the first occurrence strictly after `after`.
    ///
    /// # Behavior
    /// - `Daily`/`Weekly`/`Biweekly` add 1, 7 or 14 days.
    /// - `SpecificWeekdays` picks the nearest later member weekday, wrapping
    ///   into the following week.
    /// - `MonthlyByDay(d)` lands on day `d` of the following month, clamped to
    ///   that month's length; `MonthlyLastDay` on its last day.
    /// - `Quarterly`, `Semiannually` and `Yearly` add 3, 6 or 12 months to
    ///   `after`, clamping the day of month (Feb 29 becomes Feb 28).
    ///
    /// # Errors
    /// `CoreError::Configuration` for an invalid rule (empty weekday set,
    /// month day outside 1-31, pattern `None`).
    pub fn next_occurrence(after: NaiveDate, rule: &RecurrenceRule) -> Result<NaiveDate, CoreError> {
        rule.validate()?;

        let next = match rule.pattern {
            RecurrencePattern::None => None,
            RecurrencePattern::Daily => after.checked_add_days(Days::new(1)),
            RecurrencePattern::Weekly => after.checked_add_days(Days::new(7)),
            RecurrencePattern::Biweekly => after.checked_add_days(Days::new(14)),
            RecurrencePattern::SpecificWeekdays(days) => (1..=7u64)
                .filter_map(|offset| after.checked_add_days(Days::new(offset)))
                .find(|candidate| days.contains(candidate.weekday())),
            RecurrencePattern::MonthlyByDay(day) => {
                let first = first_of_following_month(after)?;
                let last = days_in_month(first.year(), first.month());
                first.with_day(u32::from(day).min(last))
            }
            RecurrencePattern::MonthlyLastDay => {
                let first = first_of_following_month(after)?;
                first.with_day(days_in_month(first.year(), first.month()))
            }
            // chrono clamps the day of month when adding months.
            RecurrencePattern::Quarterly => after.checked_add_months(Months::new(3)),
            RecurrencePattern::Semiannually => after.checked_add_months(Months::new(6)),
            RecurrencePattern::Yearly => after.checked_add_months(Months::new(12)),
        };

        let next = next.ok_or_else(|| out_of_range(after))?;
        debug!(%after, rule = %rule, %next, "computed next occurrence");
        Ok(next)
    }

    /// Lists the next `count` occurrences after `after`, each computed from
    /// the previous one exactly as successive generations would.
    pub fn preview(
        after: NaiveDate,
        rule: &RecurrenceRule,
        count: usize,
    ) -> Result<Vec<NaiveDate>, CoreError> {
        let count = count.min(MAX_PREVIEW);
        let mut occurrences = Vec::with_capacity(count);
        let mut cursor = after;
        for _ in 0..count {
            cursor = Self::next_occurrence(cursor, rule)?;
            occurrences.push(cursor);
        }
        Ok(occurrences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeekdaySet;
    use chrono::{TimeZone, Weekday};
    use proptest::prelude::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn next(after: NaiveDate, pattern: RecurrencePattern) -> NaiveDate {
        RecurrenceEvaluator::next_occurrence(after, &RecurrenceRule::new(pattern)).unwrap()
    }

    mod interval_patterns {
        use super::*;

        #[test]
        fn test_daily_crosses_year_boundary() {
            assert_eq!(next(date(2023, 12, 31), RecurrencePattern::Daily), date(2024, 1, 1));
        }

        #[test]
        fn test_weekly_from_monday() {
            assert_eq!(next(date(2024, 1, 1), RecurrencePattern::Weekly), date(2024, 1, 8));
            assert_eq!(next(date(2024, 1, 8), RecurrencePattern::Weekly), date(2024, 1, 15));
        }

        #[test]
        fn test_biweekly_over_leap_day() {
            assert_eq!(next(date(2024, 2, 20), RecurrencePattern::Biweekly), date(2024, 3, 5));
        }
    }

    mod weekday_patterns {
        use super::*;

        #[test]
        fn test_mon_wed_fri_from_tuesday() {
            let rule = RecurrenceRule::weekdays([Weekday::Mon, Weekday::Wed, Weekday::Fri]);
            let result = RecurrenceEvaluator::next_occurrence(date(2024, 1, 2), &rule).unwrap();
            assert_eq!(result, date(2024, 1, 3));
        }

        #[test]
        fn test_wraps_to_next_week() {
            let rule = RecurrenceRule::weekdays([Weekday::Mon, Weekday::Wed, Weekday::Fri]);
            // Friday 2024-01-05 -> Monday 2024-01-08
            let result = RecurrenceEvaluator::next_occurrence(date(2024, 1, 5), &rule).unwrap();
            assert_eq!(result, date(2024, 1, 8));
        }

        #[test]
        fn test_singleton_set_is_one_week_later_on_same_weekday() {
            let rule = RecurrenceRule::weekdays([Weekday::Tue]);
            let result = RecurrenceEvaluator::next_occurrence(date(2024, 1, 2), &rule).unwrap();
            assert_eq!(result, date(2024, 1, 9));
        }

        #[test]
        fn test_full_set_degenerates_to_daily() {
            let pattern = RecurrencePattern::SpecificWeekdays(WeekdaySet::all());
            for offset in 0..14 {
                let start = date(2024, 2, 20) + Days::new(offset);
                assert_eq!(next(start, pattern), next(start, RecurrencePattern::Daily));
            }
        }

        #[test]
        fn test_weekends_from_saturday() {
            let pattern = RecurrencePattern::SpecificWeekdays(WeekdaySet::weekends());
            assert_eq!(next(date(2024, 1, 6), pattern), date(2024, 1, 7));
            assert_eq!(next(date(2024, 1, 7), pattern), date(2024, 1, 13));
        }

        #[test]
        fn test_empty_set_is_configuration_error() {
            let rule = RecurrenceRule::new(RecurrencePattern::SpecificWeekdays(WeekdaySet::empty()));
            let result = RecurrenceEvaluator::next_occurrence(date(2024, 1, 2), &rule);
            assert!(matches!(result, Err(CoreError::Configuration(_))));
        }
    }

    mod month_patterns {
        use super::*;

        #[rstest]
        #[case(date(2024, 1, 31), 31, date(2024, 2, 29))]
        #[case(date(2023, 1, 31), 31, date(2023, 2, 28))]
        #[case(date(2024, 3, 31), 31, date(2024, 4, 30))]
        #[case(date(2024, 4, 30), 31, date(2024, 5, 31))]
        #[case(date(2024, 12, 15), 15, date(2025, 1, 15))]
        #[case(date(2024, 1, 5), 30, date(2024, 2, 29))]
        fn test_monthly_by_day_clamps(
            #[case] after: NaiveDate,
            #[case] day: u8,
            #[case] expected: NaiveDate,
        ) {
            assert_eq!(next(after, RecurrencePattern::MonthlyByDay(day)), expected);
        }

        #[test]
        fn test_monthly_last_day() {
            assert_eq!(next(date(2024, 1, 10), RecurrencePattern::MonthlyLastDay), date(2024, 2, 29));
            assert_eq!(next(date(2024, 2, 29), RecurrencePattern::MonthlyLastDay), date(2024, 3, 31));
        }

        #[rstest]
        #[case(date(2024, 1, 15), date(2024, 4, 15))]
        #[case(date(2023, 11, 30), date(2024, 2, 29))]
        #[case(date(2024, 5, 31), date(2024, 8, 31))]
        #[case(date(2024, 8, 31), date(2024, 11, 30))]
        fn test_quarterly(#[case] after: NaiveDate, #[case] expected: NaiveDate) {
            assert_eq!(next(after, RecurrencePattern::Quarterly), expected);
        }

        #[test]
        fn test_semiannually() {
            assert_eq!(next(date(2024, 8, 31), RecurrencePattern::Semiannually), date(2025, 2, 28));
        }

        #[test]
        fn test_yearly_leap_day_clamps() {
            assert_eq!(next(date(2024, 2, 29), RecurrencePattern::Yearly), date(2025, 2, 28));
            assert_eq!(next(date(2025, 3, 1), RecurrencePattern::Yearly), date(2026, 3, 1));
        }

        #[test]
        fn test_days_in_month() {
            assert_eq!(days_in_month(2024, 2), 29);
            assert_eq!(days_in_month(2100, 2), 28);
            assert_eq!(days_in_month(2000, 2), 29);
            assert_eq!(days_in_month(2024, 12), 31);
            assert_eq!(days_in_month(2024, 4), 30);
        }
    }

    mod preview_tests {
        use super::*;

        #[test]
        fn test_preview_chains_occurrences() {
            let rule = RecurrenceRule::monthly_on(31);
            let dates = RecurrenceEvaluator::preview(date(2024, 1, 31), &rule, 3).unwrap();
            assert_eq!(dates, vec![date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]);
        }

        #[test]
        fn test_preview_is_capped() {
            let rule = RecurrenceRule::new(RecurrencePattern::Daily);
            let dates = RecurrenceEvaluator::preview(date(2024, 1, 1), &rule, 10_000).unwrap();
            assert_eq!(dates.len(), MAX_PREVIEW);
        }

        #[test]
        fn test_preview_of_invalid_rule_fails() {
            let rule = RecurrenceRule::new(RecurrencePattern::None);
            assert!(RecurrenceEvaluator::preview(date(2024, 1, 1), &rule, 2).is_err());
        }
    }

    mod normalization_tests {
        use super::*;

        #[test]
        fn test_late_evening_utc_is_next_day_in_tokyo() {
            let instant = Utc.with_ymd_and_hms(2024, 3, 9, 22, 30, 0).unwrap();
            assert_eq!(normalize_to_local_date(instant, chrono_tz::Asia::Tokyo), date(2024, 3, 10));
            assert_eq!(normalize_to_local_date(instant, Tz::UTC), date(2024, 3, 9));
        }

        #[test]
        fn test_dst_transition_day_keeps_calendar_date() {
            // 2024-03-10 is the spring-forward day in New York.
            let instant = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
            let local = normalize_to_local_date(instant, chrono_tz::America::New_York);
            assert_eq!(local, date(2024, 3, 10));
            assert_eq!(next(local, RecurrencePattern::Daily), date(2024, 3, 11));
        }
    }

    const WEEK: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    fn any_pattern() -> impl Strategy<Value = RecurrencePattern> {
        prop_oneof![
            Just(RecurrencePattern::Daily),
            Just(RecurrencePattern::Weekly),
            Just(RecurrencePattern::Biweekly),
            (1u8..=127).prop_map(|bits| {
                RecurrencePattern::SpecificWeekdays(
                    (0..7)
                        .filter(|i| bits & (1 << i) != 0)
                        .map(|i| WEEK[i])
                        .collect(),
                )
            }),
            (1u8..=31).prop_map(RecurrencePattern::MonthlyByDay),
            Just(RecurrencePattern::MonthlyLastDay),
            Just(RecurrencePattern::Quarterly),
            Just(RecurrencePattern::Semiannually),
            Just(RecurrencePattern::Yearly),
        ]
    }

    proptest! {
        #[test]
        fn prop_next_occurrence_is_strictly_later(
            days in 0i64..(365 * 200),
            pattern in any_pattern(),
        ) {
            let after = date(1950, 1, 1) + chrono::Duration::days(days);
            let result = RecurrenceEvaluator::next_occurrence(after, &RecurrenceRule::new(pattern)).unwrap();
            prop_assert!(result > after);
        }

        #[test]
        fn prop_weekday_result_is_member_within_a_week(
            days in 0i64..3650,
            bits in 1u8..=127,
        ) {
            let set: WeekdaySet = (0..7)
                .filter(|i| bits & (1 << i) != 0)
                .map(|i| WEEK[i])
                .collect();
            let after = date(2020, 1, 1) + chrono::Duration::days(days);
            let result = next(after, RecurrencePattern::SpecificWeekdays(set));
            prop_assert!(set.contains(result.weekday()));
            prop_assert!((result - after).num_days() <= 7);
        }
    }
}
