use cadence_core::models::{RecurrencePattern, RecurrenceRule, Task, WeekdaySet};
use cadence_core::recurrence::RecurrenceEvaluator;
use cadence_core::visibility::VisibilityFilter;
use chrono::{Duration, NaiveDate, Weekday};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

fn anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
}

fn bench_next_occurrence(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_occurrence");
    let rules = [
        ("daily", RecurrenceRule::new(RecurrencePattern::Daily)),
        ("workdays", RecurrenceRule::new(RecurrencePattern::SpecificWeekdays(WeekdaySet::workdays()))),
        ("single_weekday", RecurrenceRule::weekdays([Weekday::Sun])),
        ("monthly_31", RecurrenceRule::monthly_on(31)),
        ("monthly_last", RecurrenceRule::new(RecurrencePattern::MonthlyLastDay)),
        ("yearly", RecurrenceRule::new(RecurrencePattern::Yearly)),
    ];

    for (name, rule) in rules {
        group.bench_with_input(BenchmarkId::from_parameter(name), &rule, |b, rule| {
            b.iter(|| RecurrenceEvaluator::next_occurrence(black_box(anchor()), black_box(rule)).unwrap())
        });
    }
    group.finish();
}

fn bench_preview(c: &mut Criterion) {
    let rule = RecurrenceRule::weekdays([Weekday::Mon, Weekday::Wed, Weekday::Fri]);
    c.bench_function("preview_one_year_mwf", |b| {
        b.iter(|| RecurrenceEvaluator::preview(black_box(anchor()), black_box(&rule), 156).unwrap())
    });
}

fn bench_backlog_filter(c: &mut Criterion) {
    let today = anchor();
    let group = Uuid::now_v7();
    let tasks: Vec<Task> = (0..1_000)
        .map(|i| Task {
            title: format!("Task {}", i),
            recurrence_group_id: (i % 3 == 0).then_some(group),
            is_template: i % 10 == 0,
            due_date: Some(today + Duration::days(i % 60 - 30)),
            is_completed: i % 7 == 0,
            ..Default::default()
        })
        .collect();

    c.bench_function("backlog_1000_tasks", |b| {
        b.iter(|| VisibilityFilter::backlog(black_box(&tasks), today))
    });
}

criterion_group!(benches, bench_next_occurrence, bench_preview, bench_backlog_filter);
criterion_main!(benches);
