//! Config Store (C7): the in-memory, file-backed snapshot of users, roles,
//! general parameters, day-types, weekly planning, and exceptions. A single
//! read/write lock guards every file so consumers always see a consistent
//! view, and all writes are whole-file rewrites serialized by that lock.

use crate::error::{Error, Result};
use crate::model::{Exception, WeeklyPlan};
use crate::permissions::PermissionNode;
use crate::schedule::{DayType, Period};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

const USERS_FILE: &str = "users.json";
const ROLES_FILE: &str = "roles_config.json";
const GENERAL_FILE: &str = "parametres_college.json";
const SONNERIES_FILE: &str = "donnees_sonneries.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub hash: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub custom_permissions: Option<PermissionNode>,
}

fn default_role() -> String {
    "reader".to_string()
}

/// A `users.json` value is either a structured [`User`] or, for legacy
/// records, a bare password-hash string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserRecord {
    Structured(User),
    LegacyHash(String),
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        match record {
            UserRecord::Structured(user) => user,
            UserRecord::LegacyHash(hash) => User {
                hash,
                full_name: String::new(),
                role: default_role(),
            custom_permissions: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub permissions: PermissionNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertClickMode {
    Single,
    Double,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralParams {
    pub departement: String,
    pub zone: String,
    pub api_holidays_url: String,
    pub country_code_holidays: String,
    #[serde(default)]
    pub vacances_ics_base_url_manuel: Option<String>,
    #[serde(default)]
    pub sonnerie_ppms: Option<String>,
    #[serde(default)]
    pub sonnerie_attentat: Option<String>,
    #[serde(default)]
    pub sonnerie_fin_alerte: Option<String>,
    #[serde(default)]
    pub nom_peripherique_audio_sonneries: Option<String>,
    #[serde(default = "default_click_mode")]
    pub alert_click_mode: AlertClickMode,
    #[serde(default = "default_refresh_interval")]
    pub status_refresh_interval_seconds: u32,
}

fn default_click_mode() -> AlertClickMode {
    AlertClickMode::Single
}

fn default_refresh_interval() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPeriod {
    nom: String,
    debut: String,
    fin: String,
    #[serde(default)]
    son_debut: Option<String>,
    #[serde(default)]
    son_fin: Option<String>,
}

impl From<RawPeriod> for Period {
    fn from(raw: RawPeriod) -> Self {
        Period {
            name: raw.nom,
            start_hms: raw.debut,
            end_hms: raw.fin,
            sound_start: raw.son_debut,
            sound_end: raw.son_fin,
        }
    }
}

impl From<&Period> for RawPeriod {
    fn from(period: &Period) -> Self {
        RawPeriod {
            nom: period.name.clone(),
            debut: period.start_hms.clone(),
            fin: period.end_hms.clone(),
            son_debut: period.sound_start.clone(),
            son_fin: period.sound_end.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDayType {
    nom: String,
    periodes: Vec<RawPeriod>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VacancesConfig {
    #[serde(default)]
    ics_file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SonneriesFile {
    #[serde(default)]
    sonneries: BTreeMap<String, String>,
    #[serde(default)]
    journees_types: BTreeMap<String, RawDayType>,
    #[serde(default)]
    planning_hebdomadaire: BTreeMap<String, String>,
    #[serde(default)]
    exceptions_planning: BTreeMap<NaiveDate, Exception>,
    #[serde(default)]
    vacances: VacancesConfig,
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "monday" | "lundi" => Some(Weekday::Mon),
        "tuesday" | "mardi" => Some(Weekday::Tue),
        "wednesday" | "mercredi" => Some(Weekday::Wed),
        "thursday" | "jeudi" => Some(Weekday::Thu),
        "friday" | "vendredi" => Some(Weekday::Fri),
        "saturday" | "samedi" => Some(Weekday::Sat),
        "sunday" | "dimanche" => Some(Weekday::Sun),
        _ => None,
    }
}

fn weekday_to_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

const NONE_SENTINEL: &str = "Aucune";

/// The full in-memory snapshot, mirroring the four on-disk config files.
#[derive(Debug, Clone, Default)]
pub struct ConfigData {
    pub users: BTreeMap<String, User>,
    pub roles: BTreeMap<String, Role>,
    pub general: Option<GeneralParams>,
    pub sound_files: BTreeMap<String, String>,
    pub day_types: BTreeMap<String, DayType>,
    pub weekly_plan: WeeklyPlan,
    pub exceptions: BTreeMap<NaiveDate, Exception>,
    pub vacances_ics_path: Option<PathBuf>,
}

/// Per-file outcome of a [`ConfigStore::reload_all`] call.
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub users: std::result::Result<(), String>,
    pub roles: std::result::Result<(), String>,
    pub general: std::result::Result<(), String>,
    pub sonneries: std::result::Result<(), String>,
}

impl ReloadReport {
    pub fn all_ok(&self) -> bool {
        self.users.is_ok() && self.roles.is_ok() && self.general.is_ok() && self.sonneries.is_ok()
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    data: RwLock<ConfigData>,
}

impl ConfigStore {
    /// Verify the directory exists and is writable. Intended to be called
    /// once at startup; failure here is fatal per the component contract.
    pub fn ensure_writable(config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)?;
        let probe = config_dir.join(".write_test");
        std::fs::write(&probe, b"")?;
        std::fs::remove_file(&probe)?;
        Ok(())
    }

    /// Load all four config files, migrating legacy user records and
    /// normalizing role casing as it goes.
    pub async fn load(config_dir: PathBuf) -> Result<Self> {
        let mut data = ConfigData::default();
        load_users(&config_dir, &mut data)?;
        load_roles(&config_dir, &mut data)?;
        load_general(&config_dir, &mut data)?;
        load_sonneries(&config_dir, &mut data)?;
        normalize_role_casing(&mut data);

        let store = Self {
            config_dir,
            data: RwLock::new(data),
        };
        store.save_users().await?;
        Ok(store)
    }

    pub async fn snapshot(&self) -> ConfigData {
        self.data.read().await.clone()
    }

    /// Re-read all four files. A file that fails to parse keeps its
    /// previous in-memory value; the per-file outcome is reported.
    pub async fn reload_all(&self) -> ReloadReport {
        let mut fresh = ConfigData::default();
        let users = load_users(&self.config_dir, &mut fresh).map_err(|e| e.to_string());
        let roles = load_roles(&self.config_dir, &mut fresh).map_err(|e| e.to_string());
        let general = load_general(&self.config_dir, &mut fresh).map_err(|e| e.to_string());
        let sonneries = load_sonneries(&self.config_dir, &mut fresh).map_err(|e| e.to_string());

        let mut guard = self.data.write().await;
        if users.is_ok() {
            guard.users = fresh.users;
        }
        if roles.is_ok() {
            guard.roles = fresh.roles;
        }
        if general.is_ok() {
            guard.general = fresh.general;
        }
        if sonneries.is_ok() {
            guard.sound_files = fresh.sound_files;
            guard.day_types = fresh.day_types;
            guard.weekly_plan = fresh.weekly_plan;
            guard.exceptions = fresh.exceptions;
            guard.vacances_ics_path = fresh.vacances_ics_path;
        }
        normalize_role_casing(&mut guard);

        info!("config store reloaded");
        ReloadReport {
            users,
            roles,
            general,
            sonneries,
        }
    }

    pub async fn authenticate(&self, username: &str) -> Option<User> {
        self.data.read().await.users.get(username).cloned()
    }

    pub async fn effective_permissions(&self, username: &str) -> Option<PermissionNode> {
        let data = self.data.read().await;
        let user = data.users.get(username)?;
        let role = data.roles.get(&user.role)?;
        Some(crate::permissions::effective_permissions(
            &role.permissions,
            user.custom_permissions.as_ref(),
        ))
    }

    pub async fn upsert_user(&self, username: String, user: User) -> Result<()> {
        self.data.write().await.users.insert(username, user);
        self.save_users_or_rollback().await
    }

    pub async fn delete_user(&self, username: &str) -> Result<bool> {
        let removed = self.data.write().await.users.remove(username).is_some();
        if removed {
            self.save_users_or_rollback().await?;
        }
        Ok(removed)
    }

    /// Insert or replace a day-type. `None` for `weekly_plan`/`exception`
    /// validation happens at the HTTP layer; this only persists.
    pub async fn upsert_day_type(&self, day_type: DayType) -> Result<()> {
        Period::validate_list(&day_type.periods).map_err(Error::Config)?;
        self.data
            .write()
            .await
            .day_types
            .insert(day_type.name.clone(), day_type);
        self.save_sonneries_or_rollback().await
    }

    /// Remove a day-type. References from the weekly plan are cascade-null
    /// (reset to the "Aucune" sentinel); references from exceptions are
    /// rejected, since an exception naming a gone day-type is a config bug
    /// the operator should be forced to resolve explicitly.
    pub async fn delete_day_type(&self, name: &str) -> Result<()> {
        let mut guard = self.data.write().await;

        let referenced_by_exception = guard
            .exceptions
            .values()
            .any(|e| matches!(e, Exception::UseDayType { day_type_name, .. } if day_type_name == name));
        if referenced_by_exception {
            return Err(Error::Config(format!(
                "day-type '{name}' is referenced by an exception; remove the exception first"
            )));
        }

        guard.day_types.remove(name);
        for slot in guard.weekly_plan.values_mut() {
            if slot.as_deref() == Some(name) {
                *slot = None;
            }
        }
        drop(guard);
        self.save_sonneries_or_rollback().await
    }

    pub async fn set_weekly_plan_entry(&self, day: Weekday, day_type_name: Option<String>) -> Result<()> {
        if let Some(name) = &day_type_name {
            let exists = self.data.read().await.day_types.contains_key(name);
            if !exists {
                return Err(Error::Config(format!("unknown day-type '{name}'")));
            }
        }
        self.data.write().await.weekly_plan.insert(day, day_type_name);
        self.save_sonneries_or_rollback().await
    }

    pub async fn set_exception(&self, date: NaiveDate, exception: Exception) -> Result<()> {
        if let Exception::UseDayType { day_type_name, .. } = &exception {
            let exists = self.data.read().await.day_types.contains_key(day_type_name);
            if !exists {
                return Err(Error::Config(format!("unknown day-type '{day_type_name}'")));
            }
        }
        self.data.write().await.exceptions.insert(date, exception);
        self.save_sonneries_or_rollback().await
    }

    pub async fn remove_exception(&self, date: NaiveDate) -> Result<bool> {
        let removed = self.data.write().await.exceptions.remove(&date).is_some();
        if removed {
            self.save_sonneries_or_rollback().await?;
        }
        Ok(removed)
    }

    pub async fn upsert_role(&self, name: String, role: Role) -> Result<()> {
        self.data.write().await.roles.insert(name, role);
        self.save_roles_or_rollback().await
    }

    pub async fn update_general(&self, general: GeneralParams) -> Result<()> {
        self.data.write().await.general = Some(general);
        self.save_general_or_rollback().await
    }

    /// Reload a section from disk after a failed write, so memory never
    /// stays ahead of what's actually on disk. Logged, not propagated: the
    /// original write error is what the caller sees.
    async fn rollback(&self, loader: fn(&Path, &mut ConfigData) -> Result<()>, what: &str) {
        let mut guard = self.data.write().await;
        if let Err(e) = loader(&self.config_dir, &mut guard) {
            warn!(error = %e, what, "failed to reload from disk after a failed write");
        }
        normalize_role_casing(&mut guard);
    }

    async fn save_users_or_rollback(&self) -> Result<()> {
        if let Err(e) = self.save_users().await {
            self.rollback(load_users, "users").await;
            return Err(e);
        }
        Ok(())
    }

    async fn save_roles_or_rollback(&self) -> Result<()> {
        if let Err(e) = self.save_roles().await {
            self.rollback(load_roles, "roles").await;
            return Err(e);
        }
        Ok(())
    }

    async fn save_general_or_rollback(&self) -> Result<()> {
        if let Err(e) = self.save_general().await {
            self.rollback(load_general, "general").await;
            return Err(e);
        }
        Ok(())
    }

    async fn save_sonneries_or_rollback(&self) -> Result<()> {
        if let Err(e) = self.save_sonneries().await {
            self.rollback(load_sonneries, "sonneries").await;
            return Err(e);
        }
        Ok(())
    }

    async fn save_users(&self) -> Result<()> {
        let data = self.data.read().await;
        write_json(&self.config_dir.join(USERS_FILE), &data.users)
    }

    async fn save_roles(&self) -> Result<()> {
        let data = self.data.read().await;
        #[derive(Serialize)]
        struct Wrapper<'a> {
            roles: &'a BTreeMap<String, Role>,
        }
        write_json(&self.config_dir.join(ROLES_FILE), &Wrapper { roles: &data.roles })
    }

    async fn save_general(&self) -> Result<()> {
        let data = self.data.read().await;
        write_json(&self.config_dir.join(GENERAL_FILE), &data.general)
    }

    async fn save_sonneries(&self) -> Result<()> {
        let data = self.data.read().await;
        let file = SonneriesFile {
            sonneries: data.sound_files.clone(),
            journees_types: data
                .day_types
                .values()
                .map(|dt| {
                    (
                        dt.name.clone(),
                        RawDayType {
                            nom: dt.name.clone(),
                            periodes: dt.periods.iter().map(RawPeriod::from).collect(),
                        },
                    )
                })
                .collect(),
            planning_hebdomadaire: data
                .weekly_plan
                .iter()
                .map(|(day, name)| {
                    (
                        weekday_to_name(*day).to_string(),
                        name.clone().unwrap_or_else(|| NONE_SENTINEL.to_string()),
                    )
                })
                .collect(),
            exceptions_planning: data.exceptions.clone(),
            vacances: VacancesConfig {
                ics_file_path: data.vacances_ics_path.clone(),
            },
        };
        write_json(&self.config_dir.join(SONNERIES_FILE), &file)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn load_users(config_dir: &Path, data: &mut ConfigData) -> Result<()> {
    let path = config_dir.join(USERS_FILE);
    let records: Option<BTreeMap<String, UserRecord>> = read_json(&path)?;
    data.users = records
        .unwrap_or_default()
        .into_iter()
        .map(|(name, record)| (name, User::from(record)))
        .collect();
    Ok(())
}

fn load_roles(config_dir: &Path, data: &mut ConfigData) -> Result<()> {
    #[derive(Deserialize)]
    struct Wrapper {
        roles: BTreeMap<String, Role>,
    }
    let path = config_dir.join(ROLES_FILE);
    let wrapper: Option<Wrapper> = read_json(&path)?;
    data.roles = wrapper.map(|w| w.roles).unwrap_or_default();
    Ok(())
}

fn load_general(config_dir: &Path, data: &mut ConfigData) -> Result<()> {
    let path = config_dir.join(GENERAL_FILE);
    data.general = read_json(&path)?;
    Ok(())
}

fn load_sonneries(config_dir: &Path, data: &mut ConfigData) -> Result<()> {
    let path = config_dir.join(SONNERIES_FILE);
    let file: SonneriesFile = read_json(&path)?.unwrap_or_else(|| SonneriesFile {
        sonneries: BTreeMap::new(),
        journees_types: BTreeMap::new(),
        planning_hebdomadaire: BTreeMap::new(),
        exceptions_planning: BTreeMap::new(),
        vacances: VacancesConfig { ics_file_path: None },
    });

    data.sound_files = file.sonneries;
    data.day_types = file
        .journees_types
        .into_iter()
        .map(|(name, raw)| {
            (
                name,
                DayType {
                    name: raw.nom,
                    periods: raw.periodes.into_iter().map(Period::from).collect(),
                },
            )
        })
        .collect();

    data.weekly_plan = WeeklyPlan::new();
    for (day_name, value) in file.planning_hebdomadaire {
        let Some(day) = weekday_from_name(&day_name) else {
            warn!(day_name, "ignoring planning entry for unknown weekday name");
            continue;
        };
        let day_type = if value == NONE_SENTINEL { None } else { Some(value) };
        data.weekly_plan.insert(day, day_type);
    }

    data.exceptions = file.exceptions_planning;
    data.vacances_ics_path = file.vacances.ics_file_path;
    Ok(())
}

fn normalize_role_casing(data: &mut ConfigData) {
    let known: BTreeMap<String, String> = data
        .roles
        .keys()
        .map(|name| (name.to_ascii_lowercase(), name.clone()))
        .collect();

    for user in data.users.values_mut() {
        if data.roles.contains_key(&user.role) {
            continue;
        }
        if let Some(canonical) = known.get(&user.role.to_ascii_lowercase()) {
            user.role = canonical.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn legacy_bare_hash_migrates_to_structured_user() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(USERS_FILE),
            r#"{"alice": "$argon2id$hash"}"#,
        )
        .unwrap();

        let store = ConfigStore::load(dir.path().to_path_buf()).await.unwrap();
        let data = store.snapshot().await;
        let alice = data.users.get("alice").unwrap();
        assert_eq!(alice.hash, "$argon2id$hash");
        assert_eq!(alice.role, "reader");
        assert_eq!(alice.full_name, "");
    }

    #[tokio::test]
    async fn migration_is_idempotent_on_reload() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(USERS_FILE), r#"{"alice": "hash1"}"#).unwrap();

        let store = ConfigStore::load(dir.path().to_path_buf()).await.unwrap();
        let first = store.snapshot().await;
        store.reload_all().await;
        let second = store.snapshot().await;

        assert_eq!(first.users.get("alice").unwrap().role, second.users.get("alice").unwrap().role);
    }

    #[tokio::test]
    async fn delete_day_type_cascades_null_in_weekly_plan() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::load(dir.path().to_path_buf()).await.unwrap();
        store
            .upsert_day_type(DayType {
                name: "Standard".into(),
                periods: vec![],
            })
            .await
            .unwrap();
        store
            .set_weekly_plan_entry(Weekday::Mon, Some("Standard".into()))
            .await
            .unwrap();

        store.delete_day_type("Standard").await.unwrap();

        let data = store.snapshot().await;
        assert!(!data.day_types.contains_key("Standard"));
        assert_eq!(data.weekly_plan.get(&Weekday::Mon).cloned().flatten(), None);
    }

    #[tokio::test]
    async fn delete_day_type_rejected_when_referenced_by_exception() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::load(dir.path().to_path_buf()).await.unwrap();
        store
            .upsert_day_type(DayType {
                name: "Special".into(),
                periods: vec![],
            })
            .await
            .unwrap();
        store
            .set_exception(
                NaiveDate::from_ymd_opt(2025, 11, 11).unwrap(),
                Exception::UseDayType {
                    day_type_name: "Special".into(),
                    description: "Armistice duty".into(),
                },
            )
            .await
            .unwrap();

        assert!(store.delete_day_type("Special").await.is_err());
    }

    #[tokio::test]
    async fn set_weekly_plan_entry_rejects_unknown_day_type() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::load(dir.path().to_path_buf()).await.unwrap();
        let result = store.set_weekly_plan_entry(Weekday::Mon, Some("Nonexistent".into())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn upsert_user_rolls_back_in_memory_state_on_write_failure() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::load(dir.path().to_path_buf()).await.unwrap();

        // Replace users.json with a symlink to a path whose parent directory
        // doesn't exist: reads resolve to NotFound (treated as "absent", so
        // the rollback reload succeeds with an empty map) while writes fail
        // (no such directory to create the file in).
        let users_path = dir.path().join(USERS_FILE);
        std::fs::remove_file(&users_path).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing_dir").join("users.json"), &users_path).unwrap();

        let user = User {
            hash: "hash".into(),
            full_name: String::new(),
            role: "reader".into(),
            custom_permissions: None,
        };
        let result = store.upsert_user("mallory".into(), user).await;
        assert!(result.is_err());

        let data = store.snapshot().await;
        assert!(!data.users.contains_key("mallory"));
    }
}
