use anyhow::{anyhow, Result};
use chatfeed::models::{DEFAULT_SENDER_NAME, MAX_MESSAGES_PER_CHAT, MESSAGES_PER_PAGE};
use chatfeed::pagination::EngineConfig;
use chatfeed::seed::MOCK_MESSAGES_PER_CHAT;
use chatfeed::store::StoreConfig;
use chatfeed::transport::WorkerConfig;
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR_NAME: &str = "chatfeed";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Settings {
    /// Where chats and messages are persisted; defaults to `<config_dir>/data`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub page_size: usize,
    pub max_messages_per_chat: usize,
    pub worker_delay_ms: u64,
    pub reply_delay_min_ms: u64,
    pub reply_delay_max_ms: u64,
    pub sender_name: String,
    pub seed_messages_per_chat: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: None,
            page_size: MESSAGES_PER_PAGE,
            max_messages_per_chat: MAX_MESSAGES_PER_CHAT,
            worker_delay_ms: 100,
            reply_delay_min_ms: 1000,
            reply_delay_max_ms: 3000,
            sender_name: DEFAULT_SENDER_NAME.to_string(),
            seed_messages_per_chat: MOCK_MESSAGES_PER_CHAT,
        }
    }
}

impl Settings {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_messages_per_chat: self.max_messages_per_chat,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            processing_delay: Duration::from_millis(self.worker_delay_ms),
            reply_delay_min: Duration::from_millis(self.reply_delay_min_ms),
            reply_delay_max: Duration::from_millis(self.reply_delay_max_ms),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            // A zero page size would never advance
            page_size: self.page_size.max(1),
            sender_name: self.sender_name.clone(),
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_config_dir()?.join("data")),
        }
    }
}

static CONFIG_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Use `dir` instead of the platform config directory. Only the first call wins.
pub fn set_config_dir_override(dir: PathBuf) {
    if CONFIG_DIR_OVERRIDE.set(dir).is_err() {
        log::warn!("Config directory override already set, ignoring");
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = match CONFIG_DIR_OVERRIDE.get() {
        Some(dir) => dir.clone(),
        None => dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join(APP_DIR_NAME),
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

fn get_settings_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(SETTINGS_FILE_NAME))
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let path = get_settings_path()?;
    let file = File::create(&path)?;
    serde_json::to_writer_pretty(file, settings)?;

    info!("Settings saved to {}", path.display());
    Ok(())
}

/// Load settings, writing the defaults out on first run
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;

    if !path.exists() {
        let settings = Settings::default();
        save_settings(&settings)?;
        return Ok(settings);
    }

    let mut file = File::open(&path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let settings: Settings = serde_json::from_str(&contents)?;
    info!("Loaded settings from {}", path.display());

    Ok(settings)
}
