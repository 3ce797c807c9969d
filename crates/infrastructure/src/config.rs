use config::{Config, ConfigError, Environment, File};
use domain::DeviceConfig;
use serde::{Deserialize, Serialize};

use crate::emulator::DEFAULT_REGISTER_WORDS;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmulatorConfig {
    #[serde(default = "default_emulator_bind")]
    pub bind: String,
    #[serde(default = "default_register_words")]
    pub register_words: usize,
}

fn default_emulator_bind() -> String {
    "127.0.0.1:9094".to_string()
}
fn default_register_words() -> usize {
    DEFAULT_REGISTER_WORDS
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            bind: default_emulator_bind(),
            register_words: default_register_words(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Local Mewtocol emulator, started before the devices when present
    #[serde(default)]
    pub emulator: Option<EmulatorConfig>,
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

fn default_status_interval() -> u64 {
    30
}

impl AgentConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("agent_id", "device-agent")?
            // Required so we never start with a silently empty device list
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(true))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Environment variables (e.g. DEVLINK__STATUS_INTERVAL_SECS=10)
            .add_source(Environment::with_prefix("DEVLINK").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Devices that should be started
    pub fn enabled_devices(&self) -> impl Iterator<Item = &DeviceConfig> {
        self.devices.iter().filter(|device| device.enabled)
    }
}
