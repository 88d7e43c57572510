use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

use crate::scanner::{SortOrder, default_extensions};

const CONFIG_FILE_NAME: &str = "tagedit.conf";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScanConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_sort")]
    pub sort: String,
}

fn default_sort() -> String {
    "name".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { extensions: default_extensions(), sort: default_sort() }
    }
}

impl ScanConfig {
    pub fn sort_order(&self) -> SortOrder {
        SortOrder::parse(&self.sort).unwrap_or_else(|| {
            log::warn!("[config] unknown sort {:?}, using name", self.sort);
            SortOrder::Name
        })
    }
}

// --- GUI Config ---
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GuiConfig {
    pub font_monospace: Option<String>,
    pub font_ui: Option<String>,
    pub font_scale: Option<f32>,
    pub preload_count: Option<usize>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_list_width: Option<f32>,
    pub max_image_dimension: Option<u32>,
    pub last_folder: Option<PathBuf>,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            font_monospace: None,
            font_ui: None,
            font_scale: Some(1.0),
            preload_count: Some(4),
            width: Some(1024),
            height: Some(720),
            file_list_width: Some(200.0),
            max_image_dimension: Some(1024),
            last_folder: None,
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Config {
    #[serde(default)]
    scan: ScanConfig,
    #[serde(default)]
    gui: GuiConfig,
}

pub struct AppContext {
    /// `None` when no config directory could be determined; nothing is persisted then.
    pub config_path: Option<PathBuf>,
    pub scan_config: ScanConfig,
    pub gui_config: GuiConfig,
}

impl AppContext {
    pub fn new() -> anyhow::Result<Self> {
        match dirs::config_dir() {
            Some(config_dir) => {
                fs::create_dir_all(&config_dir)
                    .with_context(|| format!("Failed to create config dir {:?}", config_dir))?;
                Self::load_from(&config_dir.join(CONFIG_FILE_NAME))
            }
            None => {
                log::warn!("[config] no config dir found, using defaults");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn in_memory() -> Self {
        Self { config_path: None, scan_config: ScanConfig::default(), gui_config: GuiConfig::default() }
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        let config = if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config {:?}", config_path))?;
            log::debug!("[config] loading {:?}", config_path);
            let cfg: Config = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse config {:?}: {}", config_path, e))?;

            // Write back defaults if new sections missing
            let raw_value: toml::Value = toml::from_str(&content).unwrap_or(toml::Value::Integer(0));
            let missing_scan = raw_value.get("scan").is_none();
            let missing_gui = raw_value.get("gui").is_none();
            if missing_scan || missing_gui {
                log::debug!("[config] writing back defaults (missing_scan={}, missing_gui={})", missing_scan, missing_gui);
                write_config(config_path, &cfg)?;
            }
            cfg
        } else {
            log::info!("Creating default config at {:?}", config_path);
            let cfg = Config::default();
            write_config(config_path, &cfg)?;
            cfg
        };

        Ok(Self {
            config_path: Some(config_path.to_path_buf()),
            scan_config: config.scan,
            gui_config: config.gui,
        })
    }

    /// Save updated gui config (window size, last folder) back to the config file
    pub fn save_gui_config(&self, gui_config: &GuiConfig) -> anyhow::Result<()> {
        let Some(config_path) = &self.config_path else { return Ok(()) };
        log::debug!("[config] saving gui config: {:?}", gui_config);

        // Re-read so edits made to other sections while running are kept
        let mut cfg: Config = if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            match toml::from_str(&content) {
                Ok(cfg) => cfg,
                Err(e) => {
                    // Hand edits in progress; writing now would throw them away
                    log::warn!("[config] {:?} no longer parses, not saving: {}", config_path, e);
                    return Ok(());
                }
            }
        } else {
            Config { scan: self.scan_config.clone(), gui: GuiConfig::default() }
        };
        cfg.gui = gui_config.clone();
        write_config(config_path, &cfg)
    }
}

fn write_config(path: &Path, cfg: &Config) -> anyhow::Result<()> {
    let toml_str = toml::to_string_pretty(cfg)?;
    crate::fileops::write_atomic(path, toml_str.as_bytes())
        .with_context(|| format!("Failed to write config {:?}", path))
}
