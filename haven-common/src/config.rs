//! Configuration loading and content directory resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Content directory resolution following the CFG-INIT-005 priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
///
/// The content directory holds the versioned term table and clinical
/// pattern library artifacts.
pub fn resolve_content_dir(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(content_dir) = config.get("content_dir").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(content_dir));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_content_dir())
}

/// Apply any `[params]` overrides from the deployment config file
///
/// Missing config file or missing section is not an error (defaults apply);
/// an out-of-range or unknown key is, so deployment typos surface at
/// startup rather than silently running with defaults.
pub fn apply_param_overrides() -> Result<()> {
    let config_path = match find_config_file() {
        Ok(path) => path,
        Err(_) => return Ok(()),
    };

    let toml_content = std::fs::read_to_string(&config_path)?;
    let config: toml::Value = toml::from_str(&toml_content)
        .map_err(|e| Error::Config(format!("invalid config file {:?}: {}", config_path, e)))?;

    let Some(params) = config.get("params").and_then(|v| v.as_table()) else {
        return Ok(());
    };

    for (key, value) in params {
        let value_str = match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        crate::params::PARAMS
            .set_by_key(key, &value_str)
            .map_err(Error::Config)?;
    }

    Ok(())
}

/// Get deployment configuration file path for the platform
fn find_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/haven/config.toml first, then /etc/haven/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("haven").join("config.toml"));
        let system_config = PathBuf::from("/etc/haven/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("haven").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// Get OS-dependent default content directory
fn default_content_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/haven/content (or /var/lib/haven/content system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("haven").join("content"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/haven/content"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("haven").join("content"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/haven/content"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("haven").join("content"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\haven\\content"))
    } else {
        PathBuf::from("./haven_content")
    }
}
