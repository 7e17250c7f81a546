use crate::analysis::calendar::DEFAULT_BUSINESS_DAYS_PER_WEEK;
use crate::commands::coordinator::MetricsCoordinator;
use crate::error::{PlannerError, Result};
use crate::models::activity::{default_activity_severities, ActivitySeverity};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: i64 = 2;

/// Slack limit older settings files used to mean "no limit".
const LEGACY_UNBOUNDED_SLACK_LIMIT: i64 = i32::MAX as i64;

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveMetricsSettings {
    pub activity_severities: Vec<ActivitySeverity>,
    pub business_days_per_week: u32,
}

pub async fn get_settings(workspace_path: String) -> std::result::Result<Value, String> {
    load_settings_from_disk(&workspace_path).map_err(|e| e.to_string())
}

pub async fn save_settings(workspace_path: String, settings: Value) -> std::result::Result<Value, String> {
    save_settings_to_disk(&workspace_path, settings).map_err(|e| e.to_string())
}

/// Push the workspace settings into a running coordinator and its calendar.
/// They take effect on the next recompute.
pub async fn apply_workspace_settings(
    workspace_path: String,
    coordinator: &MetricsCoordinator,
) -> std::result::Result<EffectiveMetricsSettings, String> {
    let effective = load_effective_metrics_settings(&workspace_path).map_err(|e| e.to_string())?;
    coordinator.set_activity_severities(Some(effective.activity_severities.clone()));
    coordinator.set_business_days_per_week(effective.business_days_per_week);
    log::info!(
        "applied settings from {workspace_path}: {} severity bands, {}-day business week",
        effective.activity_severities.len(),
        effective.business_days_per_week
    );
    Ok(effective)
}

pub fn load_effective_metrics_settings(workspace_path: &str) -> Result<EffectiveMetricsSettings> {
    let settings = load_settings_from_disk(workspace_path)?;
    effective_settings(&settings)
}

fn effective_settings(settings: &Value) -> Result<EffectiveMetricsSettings> {
    let business_days_per_week = settings
        .get("businessDaysPerWeek")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_BUSINESS_DAYS_PER_WEEK as u64)
        .clamp(1, 7) as u32;

    let activity_severities: Vec<ActivitySeverity> = match settings.get("activitySeverities") {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| PlannerError::Settings(format!("invalid activitySeverities: {e}")))?,
        None => default_activity_severities(),
    };

    Ok(EffectiveMetricsSettings {
        activity_severities: if activity_severities.is_empty() {
            default_activity_severities()
        } else {
            activity_severities
        },
        business_days_per_week,
    })
}

pub fn load_settings_from_disk(workspace_path: &str) -> Result<Value> {
    let path = settings_path(workspace_path);
    ensure_planlens_dir(workspace_path)?;

    // A file that does not parse is left untouched for the user to fix.
    let original = if path.exists() {
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str::<Value>(&raw).map_err(|e| {
            PlannerError::Settings(format!("could not parse {}: {e}", path.display()))
        })?
    } else {
        json!({})
    };

    let migrated = migrate_settings(original.clone());
    if migrated != original || !path.exists() {
        write_settings_file(&path, &migrated)?;
    }

    Ok(migrated)
}

pub fn save_settings_to_disk(workspace_path: &str, settings: Value) -> Result<Value> {
    let path = settings_path(workspace_path);
    ensure_planlens_dir(workspace_path)?;

    let mut merged = load_settings_from_disk(workspace_path)?;
    merge_settings(&mut merged, &settings);

    let migrated = migrate_settings(merged);
    write_settings_file(&path, &migrated)?;
    Ok(migrated)
}

fn settings_path(workspace_path: &str) -> PathBuf {
    Path::new(workspace_path).join(".planlens").join("settings.json")
}

fn ensure_planlens_dir(workspace_path: &str) -> Result<()> {
    fs::create_dir_all(Path::new(workspace_path).join(".planlens"))?;
    Ok(())
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<()> {
    let raw = serde_json::to_string_pretty(settings)?;
    fs::write(path, raw)?;
    Ok(())
}

fn migrate_settings(input: Value) -> Value {
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    // Read before defaults are merged in, or every file would look current.
    let version = out
        .get("schema_version")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if version > SETTINGS_SCHEMA_VERSION {
        log::warn!(
            "settings schema v{version} is newer than supported v{SETTINGS_SCHEMA_VERSION}; leaving it as is"
        );
        return out;
    }

    if version < 1 {
        migrate_legacy_slack_limits(&mut out);
    }

    if version < 2 {
        ensure_key(&mut out, "businessDaysPerWeek", json!(DEFAULT_BUSINESS_DAYS_PER_WEEK));
    }

    if version != SETTINGS_SCHEMA_VERSION {
        log::info!("migrated settings from schema v{version} to v{SETTINGS_SCHEMA_VERSION}");
    }

    deep_merge_defaults(&mut out, &default_settings());
    sanitize_settings(&mut out);
    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    }

    out
}

fn default_settings() -> Value {
    json!({
        "schema_version": SETTINGS_SCHEMA_VERSION,
        "activitySeverities": default_activity_severities(),
        "businessDaysPerWeek": DEFAULT_BUSINESS_DAYS_PER_WEEK
    })
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn ensure_key(target: &mut Value, key: &str, value: Value) {
    if let Some(obj) = target.as_object_mut() {
        obj.entry(key.to_string()).or_insert(value);
    }
}

fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}

fn migrate_legacy_slack_limits(settings: &mut Value) {
    let Some(bands) = settings
        .get_mut("activitySeverities")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for band in bands.iter_mut().filter_map(Value::as_object_mut) {
        if band.get("slackLimit").and_then(Value::as_i64) == Some(LEGACY_UNBOUNDED_SLACK_LIMIT) {
            band.insert("slackLimit".to_string(), Value::Null);
        }
    }
}

fn sanitize_settings(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    clamp_u64(obj, "businessDaysPerWeek", 1, 7, DEFAULT_BUSINESS_DAYS_PER_WEEK as u64);

    let mut bands: Vec<ActivitySeverity> = obj
        .get("activitySeverities")
        .and_then(Value::as_array)
        .map(|raw| raw.iter().filter_map(sanitize_severity).collect())
        .unwrap_or_default();
    if bands.is_empty() {
        bands = default_activity_severities();
    }
    // Unbounded band last.
    bands.sort_by_key(|band| band.slack_limit.unwrap_or(i32::MAX));
    obj.insert("activitySeverities".to_string(), json!(bands));
}

fn sanitize_severity(raw: &Value) -> Option<ActivitySeverity> {
    let band = raw.as_object()?;
    let slack_limit = match band.get("slackLimit") {
        None | Some(Value::Null) => None,
        Some(limit) => Some(i32::try_from(limit.as_i64()?).ok()?),
    };
    let weight = |key: &str| band.get(key).and_then(Value::as_f64).map(|w| w.max(0.0));

    Some(ActivitySeverity::new(
        slack_limit,
        weight("criticalityWeight")?,
        weight("fibonacciWeight")?,
    ))
}

fn clamp_u64(map: &mut Map<String, Value>, key: &str, min: u64, max: u64, default: u64) {
    let raw = map.get(key).and_then(Value::as_u64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}
