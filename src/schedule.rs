//! Day-type expansion (C2): turns a named day-type into an ordered list of
//! timed bell events for a specific calendar date.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A single bell-relevant time window within a day-type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub name: String,
    /// `HH:MM:SS`, parsed on demand rather than eagerly so a malformed
    /// string only drops its own event instead of the whole day-type.
    pub start_hms: String,
    pub end_hms: String,
    /// Filename resolved against the MP3 directory; absent means silent.
    pub sound_start: Option<String>,
    pub sound_end: Option<String>,
}

impl Period {
    /// A period list is valid if every period ends after it starts and no
    /// two periods share an identical `(name, start, end)` triple.
    pub fn validate_list(periods: &[Period]) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for period in periods {
            let start = parse_hms(&period.start_hms);
            let end = parse_hms(&period.end_hms);
            match (start, end) {
                (Some(start), Some(end)) if end <= start => {
                    return Err(format!(
                        "period '{}' has end {} <= start {}",
                        period.name, period.end_hms, period.start_hms
                    ));
                }
                _ => {}
            }
            let key = (
                period.name.clone(),
                period.start_hms.clone(),
                period.end_hms.clone(),
            );
            if !seen.insert(key) {
                return Err(format!(
                    "duplicate period (name, start, end) for '{}'",
                    period.name
                ));
            }
        }
        Ok(())
    }
}

/// A named, ordered template of periods applicable to a calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayType {
    pub name: String,
    pub periods: Vec<Period>,
}

/// A single bell ring, already bound to a concrete date/time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub instant: NaiveDateTime,
    pub label: String,
    pub kind: EventKind,
    pub sound: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    End,
}

fn parse_hms(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S").ok()
}

/// Expand `day_type_name` for `date` into its ordered list of scheduled
/// events. An unknown day-type name yields an empty list (logged as an
/// error); a period whose time string fails to parse drops only that one
/// event (logged as a warning), per spec.
pub fn expand(date: NaiveDate, day_type_name: &str, day_types: &BTreeMap<String, DayType>) -> Vec<ScheduledEvent> {
    let Some(day_type) = day_types.get(day_type_name) else {
        tracing::error!(day_type = day_type_name, "unknown day-type requested for expansion");
        return Vec::new();
    };

    let mut events = Vec::new();
    for period in &day_type.periods {
        if let Some(start) = parse_hms(&period.start_hms) {
            events.push(ScheduledEvent {
                instant: date.and_time(start),
                label: format!("Start {}", period.name),
                kind: EventKind::Start,
                sound: period.sound_start.clone(),
            });
        } else {
            warn!(day_type = day_type_name, period = period.name, time = period.start_hms, "dropping event with unparseable start time");
        }

        if let Some(end) = parse_hms(&period.end_hms) {
            events.push(ScheduledEvent {
                instant: date.and_time(end),
                label: format!("End {}", period.name),
                kind: EventKind::End,
                sound: period.sound_end.clone(),
            });
        } else {
            warn!(day_type = day_type_name, period = period.name, time = period.end_hms, "dropping event with unparseable end time");
        }
    }

    events.sort_by_key(|event| event.instant);
    debug!(day_type = day_type_name, date = %date, event_count = events.len(), "expanded day-type");
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day_types_with(periods: Vec<Period>) -> BTreeMap<String, DayType> {
        let mut map = BTreeMap::new();
        map.insert(
            "Standard".to_string(),
            DayType {
                name: "Standard".to_string(),
                periods,
            },
        );
        map
    }

    #[test]
    fn expand_is_sorted_ascending() {
        let day_types = day_types_with(vec![
            Period {
                name: "P2".into(),
                start_hms: "10:00:00".into(),
                end_hms: "11:00:00".into(),
                sound_start: None,
                sound_end: None,
            },
            Period {
                name: "P1".into(),
                start_hms: "08:00:00".into(),
                end_hms: "09:00:00".into(),
                sound_start: Some("bell.mp3".into()),
                sound_end: None,
            },
        ]);

        let events = expand(NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(), "Standard", &day_types);
        let instants: Vec<_> = events.iter().map(|e| e.instant).collect();
        let mut sorted = instants.clone();
        sorted.sort();
        assert_eq!(instants, sorted);
        assert_eq!(events[0].label, "Start P1");
        assert_eq!(events[0].sound.as_deref(), Some("bell.mp3"));
    }

    #[test]
    fn unknown_day_type_yields_empty() {
        let day_types = day_types_with(vec![]);
        let events = expand(NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(), "Nonexistent", &day_types);
        assert!(events.is_empty());
    }

    #[test]
    fn unparseable_time_drops_only_that_event() {
        let day_types = day_types_with(vec![Period {
            name: "P1".into(),
            start_hms: "not-a-time".into(),
            end_hms: "09:00:00".into(),
            sound_start: None,
            sound_end: None,
        }]);
        let events = expand(NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(), "Standard", &day_types);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, "End P1");
    }

    #[test]
    fn silent_event_is_still_an_event() {
        let day_types = day_types_with(vec![Period {
            name: "P1".into(),
            start_hms: "08:00:00".into(),
            end_hms: "09:00:00".into(),
            sound_start: None,
            sound_end: None,
        }]);
        let events = expand(NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(), "Standard", &day_types);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.sound.is_none()));
    }

    #[test]
    fn validate_rejects_end_before_start() {
        let periods = vec![Period {
            name: "P1".into(),
            start_hms: "09:00:00".into(),
            end_hms: "08:00:00".into(),
            sound_start: None,
            sound_end: None,
        }];
        assert!(Period::validate_list(&periods).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_triples() {
        let period = Period {
            name: "P1".into(),
            start_hms: "08:00:00".into(),
            end_hms: "09:00:00".into(),
            sound_start: None,
            sound_end: None,
        };
        let periods = vec![period.clone(), period];
        assert!(Period::validate_list(&periods).is_err());
    }
}
