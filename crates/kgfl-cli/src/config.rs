use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kgfl_session::SessionConfig;
use kgfl_session::config::loader;
use serde::{Deserialize, Serialize};

use crate::cli::OutputFormat;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub server: Option<String>,
    pub format: Option<String>,
}

pub type ConfigFile = BTreeMap<String, ProfileConfig>;

/// `~/.kgfl`, created on first use.
pub fn home() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".kgfl");
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}

pub fn credentials_path(profile: &str) -> Result<PathBuf> {
    Ok(home()?.join(format!("credentials.{profile}.json")))
}

fn profiles_path() -> Result<PathBuf> {
    Ok(home()?.join("config.toml"))
}

pub fn load_all_from(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid profile file {}", path.display()))
}

pub fn save_all_to(path: &Path, all: &ConfigFile) -> Result<()> {
    let content = toml::to_string_pretty(all)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_profile(profile: &str) -> Result<ProfileConfig> {
    let mut all = load_all_from(&profiles_path()?)?;
    Ok(all.remove(profile).unwrap_or_default())
}

pub fn save_profile(profile: &str, config: &ProfileConfig) -> Result<()> {
    let path = profiles_path()?;
    let mut all = load_all_from(&path)?;
    all.insert(profile.to_string(), config.clone());
    save_all_to(&path, &all)
}

/// Apply `key = value` to a profile, rejecting unknown keys and bad values.
pub fn set_key(cfg: &mut ProfileConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "server" => cfg.server = Some(value.to_string()),
        "format" => {
            value
                .parse::<OutputFormat>()
                .map_err(|e| anyhow::anyhow!("Invalid format {value:?}: {e}"))?;
            cfg.format = Some(value.to_ascii_lowercase());
        }
        other => anyhow::bail!("Unknown config key: {other}. Valid keys: server, format"),
    }
    Ok(())
}

/// Layered library settings with the API base URL resolved from, in order:
/// `--server` / `KGFL_URL`, the profile, then the settings file and `KGFL__*`.
pub fn resolve_settings(
    settings_file: Option<&str>,
    cli_server: Option<&str>,
    profile: &ProfileConfig,
) -> Result<SessionConfig> {
    let mut settings = loader::load_config(settings_file)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to load settings")?;
    if let Some(server) = cli_server.or(profile.server.as_deref()) {
        settings.api.base_url = server.to_string();
    }
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Invalid settings")?;
    Ok(settings)
}

pub fn resolve_format(cli_format: Option<OutputFormat>, profile: &ProfileConfig) -> OutputFormat {
    cli_format
        .or_else(|| profile.format.as_deref().and_then(|f| f.parse().ok()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_round_trip_through_toml() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");

        let mut all = ConfigFile::new();
        all.insert(
            "staging".into(),
            ProfileConfig {
                server: Some("https://staging.kgfl.kg/api".into()),
                format: Some("table".into()),
            },
        );
        save_all_to(&path, &all).expect("save");

        let loaded = load_all_from(&path).expect("load");
        assert_eq!(loaded, all);
        assert!(load_all_from(&dir.path().join("missing.toml")).expect("load").is_empty());
    }

    #[test]
    fn test_set_key_validates() {
        let mut cfg = ProfileConfig::default();
        set_key(&mut cfg, "format", "TABLE").expect("valid format");
        assert_eq!(cfg.format.as_deref(), Some("table"));
        assert!(set_key(&mut cfg, "format", "yaml").is_err());
        assert!(set_key(&mut cfg, "colour", "red").is_err());
    }

    #[test]
    fn test_server_precedence() {
        let profile = ProfileConfig {
            server: Some("http://profile.example/api".into()),
            format: None,
        };
        let missing = Some("/nonexistent/kgfl.toml");

        let from_flag =
            resolve_settings(missing, Some("http://flag.example/api"), &profile).expect("settings");
        assert_eq!(from_flag.api.base_url, "http://flag.example/api");

        let from_profile = resolve_settings(missing, None, &profile).expect("settings");
        assert_eq!(from_profile.api.base_url, "http://profile.example/api");

        assert!(resolve_settings(missing, Some("ftp://nope"), &profile).is_err());
    }

    #[test]
    fn test_format_precedence() {
        let profile = ProfileConfig {
            server: None,
            format: Some("table".into()),
        };
        assert_eq!(resolve_format(None, &profile), OutputFormat::Table);
        assert_eq!(resolve_format(Some(OutputFormat::Json), &profile), OutputFormat::Json);
        assert_eq!(resolve_format(None, &ProfileConfig::default()), OutputFormat::Json);
    }
}
