//! Shared domain types used across the holiday resolver, day-type expander,
//! and config store.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A per-date override. Takes precedence over holidays and vacations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Exception {
    Silence { description: String },
    #[serde(rename = "utiliser_jt")]
    UseDayType {
        #[serde(rename = "journee_type")]
        day_type_name: String,
        description: String,
    },
}

/// Monday..Sunday -> day-type name, or `None` for the "Aucune" sentinel.
/// `Weekday` has no natural total order, so this is a `HashMap` rather than
/// a `BTreeMap`; callers that need a stable display order sort by weekday
/// name explicitly.
pub type WeeklyPlan = HashMap<Weekday, Option<String>>;

/// A single day publicly known as a holiday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub description: String,
}

/// An inclusive range of school-vacation days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VacationPeriod {
    pub start_date: NaiveDate,
    pub end_date_inclusive: NaiveDate,
    pub description: String,
}

impl VacationPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date_inclusive
    }
}

/// The result of classifying a single calendar date, in precedence order
/// Exception > Holiday > Vacation > WeeklyPlan > Weekend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DayClassification {
    ExceptionSilence { description: String },
    ExceptionDayType { day_type_name: String, description: String },
    Holiday { description: String },
    Vacation { description: String },
    WeekdayDayType { day_type_name: String },
    Weekend,
}

impl DayClassification {
    /// The day-type name to expand for this classification, if any.
    pub fn day_type_name(&self) -> Option<&str> {
        match self {
            DayClassification::ExceptionDayType { day_type_name, .. } => Some(day_type_name),
            DayClassification::WeekdayDayType { day_type_name } => Some(day_type_name),
            _ => None,
        }
    }
}

/// French school-vacation zone designation, selecting which iCalendar feed
/// to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Zone {
    A,
    B,
    C,
    Corse,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::A => "A",
            Zone::B => "B",
            Zone::C => "C",
            Zone::Corse => "Corse",
        }
    }

    pub fn parse(s: &str) -> Option<Zone> {
        match s {
            "A" => Some(Zone::A),
            "B" => Some(Zone::B),
            "C" => Some(Zone::C),
            "Corse" => Some(Zone::Corse),
            _ => None,
        }
    }
}

/// The academic year `[Sept 1 start_year, Aug 31 start_year+1]` containing `date`.
pub fn academic_year_start(date: NaiveDate) -> i32 {
    use chrono::Datelike;
    if date.month() >= 9 {
        date.year()
    } else {
        date.year() - 1
    }
}
