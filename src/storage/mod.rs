//! Persistence layer.
//!
//! Saves and loads the grid settings to/from a JSON file tagged with the
//! build version. A file written by a different version is rejected so the
//! caller falls back to `config.toml` and re-saves.
//! Session state is never persisted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::GridSettings;

/// Default settings file path.
const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Version tag written alongside the settings.
pub const CONFIG_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    config_version: String,
    #[serde(flatten)]
    settings: GridSettings,
}

/// Save grid settings to a JSON file.
pub fn save_settings(settings: &GridSettings, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SETTINGS_FILE);
    let file = SettingsFile {
        config_version: CONFIG_VERSION.to_string(),
        settings: settings.clone(),
    };
    let json = serde_json::to_string_pretty(&file).context("Failed to serialise settings")?;

    std::fs::write(path, &json).context(format!("Failed to write settings to {path}"))?;

    debug!(path, version = CONFIG_VERSION, "Settings saved");
    Ok(())
}

/// Load grid settings from a JSON file.
/// Returns None if the file doesn't exist or was written by another version.
pub fn load_settings(path: Option<&str>) -> Result<Option<GridSettings>> {
    let path = path.unwrap_or(DEFAULT_SETTINGS_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved settings found");
        return Ok(None);
    }

    let json =
        std::fs::read_to_string(path).context(format!("Failed to read settings from {path}"))?;

    // Peek at the version first so a schema change doesn't surface as a parse error.
    let raw: serde_json::Value =
        serde_json::from_str(&json).context(format!("Failed to parse settings from {path}"))?;
    let version = raw
        .get("config_version")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    if version != CONFIG_VERSION {
        warn!(
            path,
            found = version,
            expected = CONFIG_VERSION,
            "Saved settings are from another version, ignoring"
        );
        return Ok(None);
    }

    let file: SettingsFile =
        serde_json::from_value(raw).context(format!("Failed to parse settings from {path}"))?;
    file.settings
        .validate()
        .context(format!("Saved settings in {path} are invalid"))?;

    info!(
        path,
        pair = %file.settings.pair(),
        spread_pct = file.settings.spread_pct,
        target_usd = file.settings.target_value_usd,
        "Settings loaded from disk"
    );
    Ok(Some(file.settings))
}

/// Saved settings if usable, otherwise `fallback` (which is then saved).
pub fn load_or_init(fallback: &GridSettings, path: Option<&str>) -> Result<GridSettings> {
    match load_settings(path) {
        Ok(Some(saved)) => Ok(saved),
        Ok(None) => {
            save_settings(fallback, path)?;
            Ok(fallback.clone())
        }
        Err(e) => {
            warn!(error = %e, "Saved settings unusable, re-saving from config");
            save_settings(fallback, path)?;
            Ok(fallback.clone())
        }
    }
}

/// Delete the settings file (for testing or reset).
pub fn delete_settings(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SETTINGS_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete settings file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
