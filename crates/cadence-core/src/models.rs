use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

// ============================================================================
// Recurrence rules
// ============================================================================

/// Compact set of weekdays, one bit per day starting at Monday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdaySet(u8);

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl WeekdaySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0b111_1111)
    }

    /// Monday through Friday.
    pub const fn workdays() -> Self {
        Self(0b001_1111)
    }

    /// Saturday and Sunday.
    pub const fn weekends() -> Self {
        Self(0b110_0000)
    }

    #[inline]
    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !Self::bit(day);
    }

    #[inline]
    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 & Self::all().0 == 0
    }

    pub fn len(&self) -> usize {
        (self.0 & Self::all().0).count_ones() as usize
    }

    /// Days in the set, Monday first.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_WEEKDAYS.into_iter().filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

/// The closed set of supported recurrence patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pattern", content = "value", rename_all = "snake_case")]
pub enum RecurrencePattern {
    None,
    Daily,
    Weekly,
    Biweekly,
    SpecificWeekdays(WeekdaySet),
    /// Day of month, 1-31. Clamped to the length of shorter months.
    MonthlyByDay(u8),
    MonthlyLastDay,
    Quarterly,
    Semiannually,
    Yearly,
}

/// Immutable description of how a series repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub pattern: RecurrencePattern,
}

impl RecurrenceRule {
    pub const fn new(pattern: RecurrencePattern) -> Self {
        Self { pattern }
    }

    pub fn weekdays<I: IntoIterator<Item = Weekday>>(days: I) -> Self {
        Self::new(RecurrencePattern::SpecificWeekdays(days.into_iter().collect()))
    }

    pub const fn monthly_on(day: u8) -> Self {
        Self::new(RecurrencePattern::MonthlyByDay(day))
    }

    /// Whether the rule produces occurrences at all.
    pub fn is_recurring(&self) -> bool {
        self.pattern != RecurrencePattern::None
    }

    /// Checks the rule can drive a template.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self.pattern {
            RecurrencePattern::None => Err(CoreError::Configuration(
                "pattern 'none' does not recur".to_string(),
            )),
            RecurrencePattern::SpecificWeekdays(days) if days.is_empty() => Err(
                CoreError::Configuration("weekday set must not be empty".to_string()),
            ),
            RecurrencePattern::MonthlyByDay(day) if !(1..=31).contains(&day) => Err(
                CoreError::Configuration(format!("day of month out of range: {}", day)),
            ),
            _ => Ok(()),
        }
    }
}

impl From<RecurrencePattern> for RecurrenceRule {
    fn from(pattern: RecurrencePattern) -> Self {
        Self::new(pattern)
    }
}

fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn parse_weekday(s: &str) -> Result<Weekday, CoreError> {
    match s.trim() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(CoreError::Configuration(format!("unknown weekday: {}", other))),
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pattern {
            RecurrencePattern::None => write!(f, "none"),
            RecurrencePattern::Daily => write!(f, "daily"),
            RecurrencePattern::Weekly => write!(f, "weekly"),
            RecurrencePattern::Biweekly => write!(f, "biweekly"),
            RecurrencePattern::SpecificWeekdays(days) if days == WeekdaySet::workdays() => {
                write!(f, "workdays")
            }
            RecurrencePattern::SpecificWeekdays(days) if days == WeekdaySet::weekends() => {
                write!(f, "weekends")
            }
            RecurrencePattern::SpecificWeekdays(days) => {
                let names: Vec<&str> = days.iter().map(weekday_label).collect();
                write!(f, "weekdays:{}", names.join(","))
            }
            RecurrencePattern::MonthlyByDay(day) => write!(f, "monthly:{}", day),
            RecurrencePattern::MonthlyLastDay => write!(f, "monthly:last"),
            RecurrencePattern::Quarterly => write!(f, "quarterly"),
            RecurrencePattern::Semiannually => write!(f, "semiannually"),
            RecurrencePattern::Yearly => write!(f, "yearly"),
        }
    }
}

impl FromStr for RecurrenceRule {
    type Err = CoreError;

    /// Parses the labels produced by `Display`, e.g. `weekdays:mon,wed,fri`
    /// or `monthly:31`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let pattern = match lower.as_str() {
            "none" => RecurrencePattern::None,
            "daily" => RecurrencePattern::Daily,
            "weekly" => RecurrencePattern::Weekly,
            "biweekly" => RecurrencePattern::Biweekly,
            "workdays" => RecurrencePattern::SpecificWeekdays(WeekdaySet::workdays()),
            "weekends" => RecurrencePattern::SpecificWeekdays(WeekdaySet::weekends()),
            "quarterly" => RecurrencePattern::Quarterly,
            "semiannually" => RecurrencePattern::Semiannually,
            "yearly" => RecurrencePattern::Yearly,
            "monthly:last" => RecurrencePattern::MonthlyLastDay,
            other => {
                if let Some(rest) = other.strip_prefix("weekdays:") {
                    let days = rest
                        .split(',')
                        .filter(|d| !d.trim().is_empty())
                        .map(parse_weekday)
                        .collect::<Result<WeekdaySet, _>>()?;
                    RecurrencePattern::SpecificWeekdays(days)
                } else if let Some(rest) = other.strip_prefix("monthly:") {
                    let day: u8 = rest.trim().parse().map_err(|_| {
                        CoreError::Configuration(format!("invalid day of month: {}", rest))
                    })?;
                    RecurrencePattern::MonthlyByDay(day)
                } else {
                    return Err(CoreError::Configuration(format!(
                        "unrecognized recurrence pattern: {}",
                        s
                    )));
                }
            }
        };

        let rule = RecurrenceRule::new(pattern);
        if rule.is_recurring() {
            rule.validate()?;
        }
        Ok(rule)
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// A task as seen by the recurrence engine.
///
/// Templates (`is_template == true`) define a series and are never actionable.
/// Instances share the template's `recurrence_group_id` and carry a due date.
/// Ordinary tasks have no group id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub recurrence_group_id: Option<Uuid>,
    pub is_template: bool,
    /// Owned by templates; copied onto instances for reference.
    pub rule: Option<RecurrenceRule>,
    /// Templates only: the date the first occurrence is computed from.
    pub anchor_date: Option<NaiveDate>,
    /// Templates only: due date of the most recently generated instance.
    pub last_generated_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub is_completed: bool,
    /// Templates only: `false` once the series has been terminated.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            title: "".to_string(),
            description: None,
            recurrence_group_id: None,
            is_template: false,
            rule: None,
            anchor_date: None,
            last_generated_date: None,
            due_date: None,
            is_completed: false,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }
}

impl Task {
    /// An instance that has not been completed yet.
    #[inline]
    pub fn is_open_instance(&self) -> bool {
        !self.is_template && !self.is_completed && self.recurrence_group_id.is_some()
    }

    /// Key of the series this task belongs to. Legacy templates without a
    /// group id are keyed by their own id, which also becomes their group id
    /// on first generation.
    pub fn series_key(&self) -> Uuid {
        self.recurrence_group_id.unwrap_or(self.id)
    }

    /// The date the next occurrence of a template is computed from.
    pub fn generation_base(&self) -> Option<NaiveDate> {
        self.last_generated_date.or(self.anchor_date)
    }

    /// Trailing eight hex digits of the id. UUIDv7 ids share their leading
    /// timestamp bits, so the random tail is what tells tasks apart.
    pub fn short_id(&self) -> String {
        let simple = self.id.simple().to_string();
        simple[simple.len() - 8..].to_string()
    }

    /// Whether `prefix` starts either the full id or the short id.
    pub fn matches_id_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.to_lowercase();
        self.id.to_string().starts_with(&prefix) || self.short_id().starts_with(&prefix)
    }
}

/// Data for an ordinary, non-recurring task.
#[derive(Debug, Clone, Default)]
pub struct NewTaskData {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

/// Data for a new series definition.
#[derive(Debug, Clone)]
pub struct NewTemplateData {
    pub title: String,
    pub description: Option<String>,
    pub rule: RecurrenceRule,
    /// Defaults to the clock's today.
    pub anchor_date: Option<NaiveDate>,
}

// ============================================================================
// Series mutation models
// ============================================================================

/// Which part of a series a delete applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    /// Exactly one instance, open or completed.
    OnlyThisInstance(Uuid),
    /// Every open instance; completed history is kept.
    AllOpenInstances,
}

impl fmt::Display for DeleteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteScope::OnlyThisInstance(id) => write!(f, "instance {}", id),
            DeleteScope::AllOpenInstances => write!(f, "all open instances"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub removed: usize,
    pub template_deactivated: bool,
}

/// Engine behaviour that callers decide explicitly instead of through
/// global settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deactivate the template when all open instances of a series are
    /// deleted, so the series stops generating.
    pub deactivate_on_series_delete: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deactivate_on_series_delete: true,
        }
    }
}

// ============================================================================
// Query predicates
// ============================================================================

/// Conjunctive predicate handed to the task store. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub group_id: Option<Uuid>,
    pub is_template: Option<bool>,
    pub is_completed: Option<bool>,
    /// Only tasks that carry a recurrence rule.
    pub has_rule: Option<bool>,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn templates() -> Self {
        Self {
            is_template: Some(true),
            ..Default::default()
        }
    }

    pub fn template_of(group_id: Uuid) -> Self {
        Self {
            group_id: Some(group_id),
            is_template: Some(true),
            ..Default::default()
        }
    }

    pub fn open_instances(group_id: Uuid) -> Self {
        Self {
            group_id: Some(group_id),
            is_template: Some(false),
            is_completed: Some(false),
            ..Default::default()
        }
    }

    pub fn completed_instances(group_id: Uuid) -> Self {
        Self {
            group_id: Some(group_id),
            is_template: Some(false),
            is_completed: Some(true),
            ..Default::default()
        }
    }

    pub fn instances(group_id: Uuid) -> Self {
        Self {
            group_id: Some(group_id),
            is_template: Some(false),
            ..Default::default()
        }
    }

    /// Candidate rows for normal task lists, before the date check.
    pub fn incomplete_non_templates() -> Self {
        Self {
            is_template: Some(false),
            is_completed: Some(false),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.group_id.map_or(true, |g| task.recurrence_group_id == Some(g))
            && self.is_template.map_or(true, |t| task.is_template == t)
            && self.is_completed.map_or(true, |c| task.is_completed == c)
            && self.has_rule.map_or(true, |r| task.rule.is_some() == r)
    }
}
