//! iCalendar (ICS) parsing for school-vacation periods.
//!
//! `DTSTART`/`DTEND` in these feeds are whole-day values (`VALUE=DATE`,
//! `YYYYMMDD`) rather than timestamps. `DTEND` is half-open per the
//! iCalendar spec, so the inclusive last day is `DTEND - 1 day`.

use crate::error::{Error, Result};
use crate::model::{VacationPeriod, Zone};
use chrono::{Duration as ChronoDuration, NaiveDate};
use ical::parser::ical::component::IcalEvent;
use ical::property::Property;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn property_value<'a>(event: &'a IcalEvent, name: &str) -> Option<&'a Property> {
    event.properties.iter().find(|p| p.name == name)
}

fn parse_ics_date(value: &str) -> Option<NaiveDate> {
    let digits = &value[..8.min(value.len())];
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

fn event_to_period(event: &IcalEvent) -> Option<VacationPeriod> {
    let start = property_value(event, "DTSTART").and_then(|p| p.value.as_deref())?;
    let end = property_value(event, "DTEND").and_then(|p| p.value.as_deref())?;
    let description = property_value(event, "SUMMARY")
        .and_then(|p| p.value.clone())
        .unwrap_or_default();

    let start_date = parse_ics_date(start)?;
    let end_date_exclusive = parse_ics_date(end)?;
    let end_date_inclusive = end_date_exclusive - ChronoDuration::days(1);

    Some(VacationPeriod {
        start_date,
        end_date_inclusive,
        description,
    })
}

/// Parse every `VEVENT` in an ICS document into vacation periods.
/// Events that fail to parse are dropped individually and logged.
pub fn parse_ics(contents: &str) -> Vec<VacationPeriod> {
    let reader = ical::IcalParser::new(BufReader::new(contents.as_bytes()));
    let mut periods = Vec::new();

    for calendar in reader.flatten() {
        for event in calendar.events {
            match event_to_period(&event) {
                Some(period) => periods.push(period),
                None => warn!("dropping unparseable VEVENT in vacation calendar"),
            }
        }
    }

    periods
}

fn cache_file_name(zone: Zone, academic_year_start: i32) -> String {
    format!(
        "Zone{}-{}-{}.ics",
        zone.as_str(),
        academic_year_start,
        academic_year_start + 1
    )
}

/// Load vacation periods for one academic year, trying in order:
/// an explicit local path, a freshly downloaded feed, or a previously
/// cached download. Returns an empty vector (logged) if none succeed.
pub async fn load_academic_year(
    http: &reqwest::Client,
    cache_dir: &Path,
    zone: Zone,
    academic_year_start: i32,
    local_path: Option<&Path>,
    manual_base_url: Option<&str>,
) -> Vec<VacationPeriod> {
    if let Some(path) = local_path {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                debug!(path = %path.display(), "loaded vacation calendar from local path");
                return parse_ics(&contents);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read local vacation calendar"),
        }
    }

    let cache_path: PathBuf = cache_dir.join(cache_file_name(zone, academic_year_start));

    if let Some(base_url) = manual_base_url {
        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            cache_file_name(zone, academic_year_start)
        );
        match download_ics(http, &url).await {
            Ok(contents) => {
                if let Err(e) = tokio::fs::write(&cache_path, &contents).await {
                    warn!(error = %e, "failed to cache downloaded vacation calendar");
                }
                return parse_ics(&contents);
            }
            Err(e) => warn!(url, error = %e, "failed to download vacation calendar, trying cache"),
        }
    }

    match tokio::fs::read_to_string(&cache_path).await {
        Ok(contents) => {
            debug!(path = %cache_path.display(), "reusing previously downloaded vacation calendar");
            parse_ics(&contents)
        }
        Err(e) => {
            warn!(path = %cache_path.display(), error = %e, "no vacation calendar available for academic year");
            Vec::new()
        }
    }
}

async fn download_ics(http: &reqwest::Client, url: &str) -> Result<String> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Ics(format!("request to {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Ics(format!(
            "request to {url} returned {}",
            response.status()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| Error::Ics(format!("failed to read response body from {url}: {e}")))
}
