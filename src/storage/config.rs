use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tubegrab_core::fs_paths::{AppPaths, DesktopPaths};
use tubegrab_core::models::settings::{AppSettings, SCHEMA_VERSION};

const SETTINGS_FILE: &str = "settings.json";

pub fn settings_path() -> PathBuf {
    DesktopPaths.config_dir().join(SETTINGS_FILE)
}

/// Reads settings from `path`. A missing file is not an error; an unreadable,
/// malformed or foreign-schema file is, and callers fall back to defaults.
pub fn load_settings(path: &Path) -> anyhow::Result<AppSettings> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AppSettings::default()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };

    let settings: AppSettings = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    if settings.schema_version != SCHEMA_VERSION {
        bail!(
            "{} has schema version {}, expected {}",
            path.display(),
            settings.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
