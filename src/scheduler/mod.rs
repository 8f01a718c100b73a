//! Scheduler Core (C3): the wake loop that tracks the next bell event and
//! dispatches it to the Audio Player.

pub mod service;

use crate::holiday::HolidayResolver;
use crate::model::Exception;
use crate::schedule::{self, DayType, ScheduledEvent};
use crate::model::WeeklyPlan;
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use std::collections::BTreeMap;

pub const DEFAULT_LOOKAHEAD_LIMIT_DAYS: u32 = 60;

/// A consistent snapshot of everything the scheduler needs to classify dates
/// and expand schedules, taken under the Config Store's lock.
#[derive(Clone)]
pub struct ConfigSnapshot {
    pub day_types: BTreeMap<String, DayType>,
    pub weekly_plan: WeeklyPlan,
    pub exceptions: BTreeMap<chrono::NaiveDate, Exception>,
    pub holiday_resolver: HolidayResolver,
    pub lookahead_limit_days: u32,
}

/// Absolute next-event search: starting at `now`'s date, scan forward up to
/// `lookahead_limit_days` days. The first day only considers events at or
/// after `now`; subsequent days consider every event in the day (their
/// threshold is midnight). Must not terminate early on an empty day — it
/// keeps advancing until it finds an event or exhausts the lookahead window.
pub fn next_event_from(now: NaiveDateTime, snapshot: &ConfigSnapshot) -> Option<ScheduledEvent> {
    let today = now.date();

    for offset in 0..snapshot.lookahead_limit_days {
        let date = today + ChronoDuration::days(offset as i64);
        let classification =
            snapshot
                .holiday_resolver
                .classify(date, &snapshot.weekly_plan, &snapshot.exceptions);

        let events = match classification.day_type_name() {
            Some(name) => schedule::expand(date, name, &snapshot.day_types),
            None => Vec::new(),
        };

        let threshold = if offset == 0 {
            now
        } else {
            date.and_hms_opt(0, 0, 0).expect("midnight is always valid")
        };

        if let Some(event) = events.into_iter().find(|e| e.instant >= threshold) {
            return Some(event);
        }
    }

    tracing::info!(lookahead_limit_days = snapshot.lookahead_limit_days, "no upcoming event found within lookahead window");
    None
}

/// Schedule for a single date, for the `ScheduleForDate` observable — not
/// restricted to events at or after "now".
pub fn schedule_for_date(date: chrono::NaiveDate, snapshot: &ConfigSnapshot) -> Vec<ScheduledEvent> {
    let classification =
        snapshot
            .holiday_resolver
            .classify(date, &snapshot.weekly_plan, &snapshot.exceptions);
    match classification.day_type_name() {
        Some(name) => schedule::expand(date, name, &snapshot.day_types),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Holiday, VacationPeriod};
    use crate::schedule::Period;
    use chrono::NaiveDate;

    fn day_types() -> BTreeMap<String, DayType> {
        let mut map = BTreeMap::new();
        map.insert(
            "Standard".to_string(),
            DayType {
                name: "Standard".to_string(),
                periods: vec![Period {
                    name: "P1".into(),
                    start_hms: "08:00:00".into(),
                    end_hms: "09:00:00".into(),
                    sound_start: Some("bell.mp3".into()),
                    sound_end: None,
                }],
            },
        );
        map
    }

    fn weekly_plan_weekdays_only() -> WeeklyPlan {
        use chrono::Weekday;
        let mut plan = WeeklyPlan::new();
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            plan.insert(day, Some("Standard".to_string()));
        }
        plan.insert(chrono::Weekday::Sat, None);
        plan.insert(chrono::Weekday::Sun, None);
        plan
    }

    #[test]
    fn finds_remaining_event_today() {
        let snapshot = ConfigSnapshot {
            day_types: day_types(),
            weekly_plan: weekly_plan_weekdays_only(),
            exceptions: BTreeMap::new(),
            holiday_resolver: HolidayResolver::default(),
            lookahead_limit_days: DEFAULT_LOOKAHEAD_LIMIT_DAYS,
        };
        // Monday 2025-06-16 at 07:00, before the 08:00 start event.
        let now = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap().and_hms_opt(7, 0, 0).unwrap();
        let event = next_event_from(now, &snapshot).unwrap();
        assert_eq!(event.label, "Start P1");
    }

    #[test]
    fn skips_empty_weekend_days_without_stopping() {
        let snapshot = ConfigSnapshot {
            day_types: day_types(),
            weekly_plan: weekly_plan_weekdays_only(),
            exceptions: BTreeMap::new(),
            holiday_resolver: HolidayResolver::default(),
            lookahead_limit_days: DEFAULT_LOOKAHEAD_LIMIT_DAYS,
        };
        // Friday 2025-06-20 at 23:00, after today's only event: must skip
        // Saturday and Sunday (both empty) and land on Monday.
        let now = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap().and_hms_opt(23, 0, 0).unwrap();
        let event = next_event_from(now, &snapshot).unwrap();
        assert_eq!(event.instant.date(), NaiveDate::from_ymd_opt(2025, 6, 23).unwrap());
    }

    #[test]
    fn skips_vacation_spanning_many_days() {
        let resolver = HolidayResolver::new(
            vec![],
            vec![VacationPeriod {
                start_date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
                end_date_inclusive: NaiveDate::from_ymd_opt(2025, 6, 27).unwrap(),
                description: "Break".into(),
            }],
        );
        let snapshot = ConfigSnapshot {
            day_types: day_types(),
            weekly_plan: weekly_plan_weekdays_only(),
            exceptions: BTreeMap::new(),
            holiday_resolver: resolver,
            lookahead_limit_days: DEFAULT_LOOKAHEAD_LIMIT_DAYS,
        };
        let now = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let event = next_event_from(now, &snapshot).unwrap();
        assert_eq!(event.instant.date(), NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
    }

    #[test]
    fn returns_none_when_nothing_within_lookahead() {
        let snapshot = ConfigSnapshot {
            day_types: BTreeMap::new(),
            weekly_plan: WeeklyPlan::new(),
            exceptions: BTreeMap::new(),
            holiday_resolver: HolidayResolver::default(),
            lookahead_limit_days: 5,
        };
        let now = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert!(next_event_from(now, &snapshot).is_none());
    }

    #[test]
    fn holiday_description_available_via_resolver_getter() {
        let resolver = HolidayResolver::new(
            vec![Holiday {
                date: NaiveDate::from_ymd_opt(2025, 7, 14).unwrap(),
                description: "Bastille Day".into(),
            }],
            vec![],
        );
        assert!(resolver.is_holiday(NaiveDate::from_ymd_opt(2025, 7, 14).unwrap()));
    }
}
