//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, FfmixConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local). Only returns files
/// that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/ffmix/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("ffmix/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
        }
        return files;
    }

    let local = PathBuf::from("ffmix.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load one TOML file over a base config; missing sections keep base values.
pub fn load_from_file(path: &Path, base: FfmixConfig) -> Result<FfmixConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_toml(&contents, path, base)
}

fn parse_toml(contents: &str, path: &Path, mut base: FfmixConfig) -> Result<FfmixConfig, ConfigError> {
    let overlay: FfmixConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // Per-section merge: a section present in the file replaces the base
    // section wholesale. Detect presence by re-parsing the raw table.
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if table.contains_key("paths") {
        base.paths = overlay.paths;
        base.paths.state_dir = expand_path(&base.paths.state_dir.to_string_lossy());
    }
    if table.contains_key("gui") {
        base.gui = overlay.gui;
    }
    if table.contains_key("hardware") {
        base.hardware = overlay.hardware;
    }
    if table.contains_key("state") {
        base.state = overlay.state;
    }

    Ok(base)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut FfmixConfig) {
    if let Ok(v) = env::var("FFMIX_STATE_DIR") {
        config.paths.state_dir = expand_path(&v);
    }
    if let Ok(v) = env::var("FFMIX_GUI_PORT") {
        if let Ok(port) = v.parse() {
            config.gui.listen_port = port;
        }
    }
    if let Ok(v) = env::var("FFMIX_AMIXER") {
        config.hardware.amixer = v;
    }
    if let Ok(v) = env::var("FFMIX_PROC_ROOT") {
        config.hardware.proc_root = expand_path(&v);
    }
    if let Ok(v) = env::var("FFMIX_AUTOLOAD") {
        config.state.autoload = matches!(v.as_str(), "1" | "true" | "yes");
    }
}

/// Expand ~ and a leading $VAR in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }
    if let Some(stripped) = path.strip_prefix('$') {
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                return PathBuf::from(var_value).join(&stripped[slash_pos + 1..]);
            }
        } else if let Ok(var_value) = env::var(stripped) {
            return PathBuf::from(var_value);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_parse_partial_toml_keeps_other_sections() {
        let toml = r#"
[gui]
listen_port = 9000
"#;
        let config = parse_toml(toml, Path::new("test.toml"), FfmixConfig::default()).unwrap();
        assert_eq!(config.gui.listen_port, 9000);
        assert_eq!(config.hardware.poll_interval_ms, 1000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[paths]
state_dir = "/data/ffmix"

[gui]
listen_port = 7100

[hardware]
amixer = "/usr/local/bin/amixer"
ctl_service = "snd-fireface-ctl-service"
proc_root = "/proc/asound"
poll_interval_ms = 500
meter_interval_ms = 25
presence_interval_ms = 2000
query_timeout_ms = 1000

[state]
autoload = true
"#;
        let config = parse_toml(toml, Path::new("test.toml"), FfmixConfig::default()).unwrap();
        assert_eq!(config.paths.state_dir, PathBuf::from("/data/ffmix"));
        assert_eq!(config.gui.listen_port, 7100);
        assert_eq!(config.hardware.meter_interval_ms, 25);
        assert!(config.state.autoload);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(parse_toml("not [valid", Path::new("x.toml"), FfmixConfig::default()).is_err());
    }
}
