use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub theme: String,
    pub show_sidebar: bool,
    pub sidebar_width: u16,
    pub api_url: Option<String>,
    pub require_auth: bool,
    pub message_timeout_ms: u64,
    pub chord_timeout_ms: u64,
    pub tab_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "wombat".to_string(),
            show_sidebar: false,
            sidebar_width: 28,
            api_url: None,
            require_auth: true,
            message_timeout_ms: 2000,
            chord_timeout_ms: 1000,
            tab_width: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PartialConfig {
    theme: Option<String>,
    show_sidebar: Option<bool>,
    sidebar_width: Option<u16>,
    api_url: Option<String>,
    require_auth: Option<bool>,
    message_timeout_ms: Option<u64>,
    chord_timeout_ms: Option<u64>,
    tab_width: Option<usize>,
}

impl PartialConfig {
    fn apply_defaults(self) -> (Config, bool) {
        let defaults = Config::default();
        let mut changed = false;

        let theme = match self.theme {
            Some(v) => v,
            None => {
                changed = true;
                defaults.theme
            }
        };
        let show_sidebar = match self.show_sidebar {
            Some(v) => v,
            None => {
                changed = true;
                defaults.show_sidebar
            }
        };
        let sidebar_width = match self.sidebar_width {
            Some(v) => v,
            None => {
                changed = true;
                defaults.sidebar_width
            }
        };
        let require_auth = match self.require_auth {
            Some(v) => v,
            None => {
                changed = true;
                defaults.require_auth
            }
        };
        let message_timeout_ms = match self.message_timeout_ms {
            Some(v) => v,
            None => {
                changed = true;
                defaults.message_timeout_ms
            }
        };
        let chord_timeout_ms = match self.chord_timeout_ms {
            Some(v) => v,
            None => {
                changed = true;
                defaults.chord_timeout_ms
            }
        };
        let tab_width = match self.tab_width {
            Some(v) => v,
            None => {
                changed = true;
                defaults.tab_width
            }
        };

        (
            Config {
                theme,
                show_sidebar,
                sidebar_width,
                // Optional: absence is a valid setting, not a missing key.
                api_url: self.api_url,
                require_auth,
                message_timeout_ms,
                chord_timeout_ms,
                tab_width,
            },
            changed,
        )
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join("mxsite").join("config.toml"))
}

pub fn ensure_config_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = Config::default();
        write_config(&cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let (cfg, changed) = parse_config(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    if changed {
        write_config(&cfg)?;
    }
    Ok(cfg)
}

pub fn parse_config(raw: &str) -> Result<(Config, bool)> {
    let partial: PartialConfig = toml::from_str(raw)?;
    Ok(partial.apply_defaults())
}

pub fn write_config(cfg: &Config) -> Result<()> {
    let path = config_path()?;
    ensure_config_dir(&path)?;
    let text = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn open_config_in_editor() -> Result<()> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = Config::default();
        write_config(&cfg)?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "nvim".to_string());
    let mut parts = match shell_words::split(&editor) {
        Ok(p) if !p.is_empty() => p,
        _ => vec![editor],
    };
    let cmd = parts.remove(0);
    let status = Command::new(cmd)
        .args(parts)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to launch editor for {}", path.display()))?;
    if !status.success() {
        anyhow::bail!("Editor exited with status {}", status);
    }
    Ok(())
}
