//! Public-holiday loading from an external JSON API, with a disk cache.

use crate::model::Holiday;
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, warn};

/// Default freshness window before the disk cache is considered stale.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Deserialize)]
struct ApiHolidayEntry {
    date: NaiveDate,
    #[serde(rename = "localName")]
    local_name: Option<String>,
    name: Option<String>,
}

fn cache_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("holiday_cache.json")
}

fn is_fresh(path: &Path, freshness: Duration) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age < freshness)
        .unwrap_or(false)
}

/// Load the on-disk holiday cache, returning an empty set if absent or unreadable.
pub fn load_cached(cache_dir: &Path) -> Vec<Holiday> {
    let path = cache_path(cache_dir);
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<BTreeMap<NaiveDate, String>>(&contents) {
            Ok(cache) => cache
                .into_iter()
                .map(|(date, description)| Holiday { date, description })
                .collect(),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "holiday cache is corrupt, ignoring");
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

/// Fetch holidays for years `[current_year - 1, current_year + 2]` from
/// `{api_base_url}/{year}/{country_code}`, merge them, and persist to disk.
///
/// On any network or parse failure the previously-loaded set (`existing`) is
/// retained and returned unchanged; the refresh is a soft failure. Skipped
/// entirely (returning `existing`) if the disk cache is still fresh and
/// `force_refresh` is false.
pub async fn load_holidays(
    http: &reqwest::Client,
    cache_dir: &Path,
    api_base_url: &str,
    country_code: &str,
    force_refresh: bool,
    freshness: Duration,
    existing: Vec<Holiday>,
) -> Vec<Holiday> {
    let path = cache_path(cache_dir);
    if !force_refresh && is_fresh(&path, freshness) {
        debug!(path = %path.display(), "holiday cache still fresh, skipping refresh");
        return existing;
    }

    let current_year = Utc::now().date_naive().year_ce().1 as i32;
    let mut fetched: BTreeMap<NaiveDate, String> = BTreeMap::new();
    let mut any_success = false;

    for year in years_to_fetch(current_year) {
        let url = format!("{}/{}/{}", api_base_url.trim_end_matches('/'), year, country_code);
        match fetch_year(http, &url).await {
            Ok(entries) => {
                any_success = true;
                for entry in entries {
                    let description = entry
                        .local_name
                        .or(entry.name)
                        .unwrap_or_else(|| "Holiday".to_string());
                    fetched.insert(entry.date, description);
                }
            }
            Err(e) => {
                error!(url, error = %e, "failed to fetch holidays for year");
            }
        }
    }

    if !any_success {
        warn!("holiday refresh failed entirely, serving previously-loaded set");
        return existing;
    }

    if let Ok(json) = serde_json::to_string_pretty(&fetched)
        && let Err(e) = std::fs::write(&path, json)
    {
        warn!(error = %e, path = %path.display(), "failed to persist holiday cache");
    }

    fetched
        .into_iter()
        .map(|(date, description)| Holiday { date, description })
        .collect()
}

/// The four academic years the holiday feed is fetched for: the year
/// before, the current year, and the two years ahead.
fn years_to_fetch(current_year: i32) -> std::ops::RangeInclusive<i32> {
    (current_year - 1)..=(current_year + 2)
}

async fn fetch_year(http: &reqwest::Client, url: &str) -> anyhow::Result<Vec<ApiHolidayEntry>> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("status {}", response.status());
    }
    Ok(response.json::<Vec<ApiHolidayEntry>>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_cached_returns_empty_when_absent() {
        let dir = tempdir().unwrap();
        assert!(load_cached(dir.path()).is_empty());
    }

    #[test]
    fn load_cached_round_trips_written_cache() {
        let dir = tempdir().unwrap();
        let mut holidays = BTreeMap::new();
        holidays.insert(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), "New Year".to_string());
        std::fs::write(cache_path(dir.path()), serde_json::to_string(&holidays).unwrap()).unwrap();

        let loaded = load_cached(dir.path());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].description, "New Year");
    }

    #[test]
    fn corrupt_cache_is_ignored_not_fatal() {
        let dir = tempdir().unwrap();
        std::fs::write(cache_path(dir.path()), "not json").unwrap();
        assert!(load_cached(dir.path()).is_empty());
    }

    #[test]
    fn years_to_fetch_covers_four_years_through_current_plus_two() {
        let years: Vec<i32> = years_to_fetch(2025).collect();
        assert_eq!(years, vec![2024, 2025, 2026, 2027]);
    }
}
