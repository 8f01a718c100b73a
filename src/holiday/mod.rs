//! Holiday/vacation resolution and day classification (C1).
//!
//! Holds the current set of known public holidays (refreshed from a remote
//! JSON feed, cached to disk) and school-vacation periods (parsed from a
//! downloaded or local iCalendar file), and classifies a calendar date
//! against them plus a weekly plan and per-date exceptions.

pub mod api;
pub mod ics;

use crate::model::{DayClassification, Exception, Holiday, VacationPeriod, WeeklyPlan};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// In-memory snapshot of holiday/vacation data, swapped atomically on reload.
#[derive(Debug, Clone, Default)]
pub struct HolidayResolver {
    holidays: BTreeMap<NaiveDate, String>,
    vacations: Vec<VacationPeriod>,
}

impl HolidayResolver {
    pub fn new(holidays: Vec<Holiday>, vacations: Vec<VacationPeriod>) -> Self {
        Self {
            holidays: holidays.into_iter().map(|h| (h.date, h.description)).collect(),
            vacations,
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains_key(&date)
    }

    pub fn is_vacation(&self, date: NaiveDate) -> bool {
        self.vacations.iter().any(|v| v.contains(date))
    }

    pub fn vacation_info(&self, date: NaiveDate) -> Option<&VacationPeriod> {
        self.vacations.iter().find(|v| v.contains(date))
    }

    pub fn holidays(&self) -> impl Iterator<Item = (&NaiveDate, &String)> {
        self.holidays.iter()
    }

    pub fn vacation_periods(&self) -> &[VacationPeriod] {
        &self.vacations
    }

    /// Classify a single date in precedence order:
    /// Exception > Holiday > Vacation > WeeklyPlan > Weekend.
    pub fn classify(
        &self,
        date: NaiveDate,
        weekly_plan: &WeeklyPlan,
        exceptions: &BTreeMap<NaiveDate, Exception>,
    ) -> DayClassification {
        if let Some(exception) = exceptions.get(&date) {
            return match exception {
                Exception::Silence { description } => DayClassification::ExceptionSilence {
                    description: description.clone(),
                },
                Exception::UseDayType {
                    day_type_name,
                    description,
                } => DayClassification::ExceptionDayType {
                    day_type_name: day_type_name.clone(),
                    description: description.clone(),
                },
            };
        }

        if let Some(description) = self.holidays.get(&date) {
            return DayClassification::Holiday {
                description: description.clone(),
            };
        }

        if let Some(period) = self.vacation_info(date) {
            return DayClassification::Vacation {
                description: period.description.clone(),
            };
        }

        match weekly_plan.get(&date.weekday()).and_then(|v| v.clone()) {
            Some(day_type_name) => DayClassification::WeekdayDayType { day_type_name },
            None => DayClassification::Weekend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn resolver() -> HolidayResolver {
        HolidayResolver::new(
            vec![Holiday {
                date: NaiveDate::from_ymd_opt(2025, 12, 25).unwrap(),
                description: "Christmas".into(),
            }],
            vec![VacationPeriod {
                start_date: NaiveDate::from_ymd_opt(2025, 12, 20).unwrap(),
                end_date_inclusive: NaiveDate::from_ymd_opt(2026, 1, 4).unwrap(),
                description: "Winter break".into(),
            }],
        )
    }

    fn weekly_plan() -> WeeklyPlan {
        let mut plan = WeeklyPlan::new();
        plan.insert(Weekday::Mon, Some("Standard".to_string()));
        plan.insert(Weekday::Sat, None);
        plan.insert(Weekday::Sun, None);
        plan
    }

    #[test]
    fn exception_beats_everything() {
        let resolver = resolver();
        let mut exceptions = BTreeMap::new();
        let christmas = NaiveDate::from_ymd_opt(2025, 12, 25).unwrap();
        exceptions.insert(
            christmas,
            Exception::UseDayType {
                day_type_name: "Special".into(),
                description: "override".into(),
            },
        );
        let classification = resolver.classify(christmas, &weekly_plan(), &exceptions);
        assert_eq!(
            classification,
            DayClassification::ExceptionDayType {
                day_type_name: "Special".into(),
                description: "override".into()
            }
        );
    }

    #[test]
    fn holiday_beats_vacation_and_weekly_plan() {
        let resolver = resolver();
        let christmas = NaiveDate::from_ymd_opt(2025, 12, 25).unwrap();
        let classification = resolver.classify(christmas, &weekly_plan(), &BTreeMap::new());
        assert_eq!(
            classification,
            DayClassification::Holiday {
                description: "Christmas".into()
            }
        );
    }

    #[test]
    fn vacation_beats_weekly_plan() {
        let resolver = resolver();
        let date = NaiveDate::from_ymd_opt(2025, 12, 22).unwrap();
        assert_eq!(date.weekday(), Weekday::Mon);
        let classification = resolver.classify(date, &weekly_plan(), &BTreeMap::new());
        assert_eq!(
            classification,
            DayClassification::Vacation {
                description: "Winter break".into()
            }
        );
    }

    #[test]
    fn weekly_plan_applies_outside_vacation() {
        let resolver = resolver();
        let date = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        assert_eq!(date.weekday(), Weekday::Mon);
        let classification = resolver.classify(date, &weekly_plan(), &BTreeMap::new());
        assert_eq!(
            classification,
            DayClassification::WeekdayDayType {
                day_type_name: "Standard".into()
            }
        );
    }

    #[test]
    fn weekend_with_no_day_type_falls_through() {
        let resolver = resolver();
        let date = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        assert_eq!(date.weekday(), Weekday::Sat);
        let classification = resolver.classify(date, &weekly_plan(), &BTreeMap::new());
        assert_eq!(classification, DayClassification::Weekend);
    }
}
