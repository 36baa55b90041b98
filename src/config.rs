//! Configuration for the request pipeline and the navigation reconciler
//!
//! Settings are plain serde structs with defaults. They can be built in code,
//! deserialized by the embedder, or loaded from an INI file whose location is
//! taken from an environment variable with a fallback default path.

use crate::error::ConfigError;
use ini::Ini;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default settings file path
pub const DEFAULT_CONFIG_PATH: &str = "~/.waypost/config";

/// Environment variable name for overriding the settings file path
pub const CONFIG_PATH_ENV_VAR: &str = "WAYPOST_CONFIG_PATH";

/// Get the settings file path, checking environment variable first, then falling back to default
pub fn get_config_path() -> String {
    std::env::var_os(CONFIG_PATH_ENV_VAR)
        .and_then(|val| val.into_string().ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Request pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How many times a post-hook `Retry` may restart one logical request
    pub max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// Navigation reconciler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Number of pages the host keeps alive at once
    pub max_level: usize,
    /// Swap the second-to-last page for a blank curtain before opening the last one
    pub enable_curtain: bool,
    pub curtain_page: String,
    /// Restore data of pages whose instance was overwritten by a same-path page
    pub enable_tainted_restore: bool,
    /// Busy window kept after a host navigation reports success
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    /// Busy window after a host back; hosts with slow back animations need more
    #[serde(with = "millis")]
    pub back_settle_delay: Duration,
    /// Upper bound of the doubling retry delay after a false "limit exceeded"
    #[serde(with = "millis")]
    pub open_retry_timeout: Duration,
    /// Query parameter appended to force a page to re-initialize
    pub forced_refresh_param: String,
    /// Mutual-exclusion key shared by open, back, relaunch and tab switch
    pub lock_key: String,
}

impl NavigatorConfig {
    /// Depth up to which the logical stack must mirror the host stack
    pub fn correct_level(&self) -> usize {
        self.max_level.saturating_sub(2)
    }
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            max_level: 10,
            enable_curtain: true,
            curtain_page: "/pages/curtain/curtain".to_string(),
            enable_tainted_restore: true,
            settle_delay: Duration::from_millis(300),
            back_settle_delay: Duration::from_millis(300),
            open_retry_timeout: Duration::from_millis(2000),
            forced_refresh_param: "_forcedRefresh".to_string(),
            lock_key: "navigate".to_string(),
        }
    }
}

/// All settings, as stored in the `[pipeline]` and `[navigator]` INI sections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub navigator: NavigatorConfig,
}

impl Settings {
    /// Load settings from the configured path; a missing file yields defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = shellexpand::tilde(&get_config_path()).into_owned();
        if !Path::new(&path).exists() {
            tracing::debug!("No settings file at {path}, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let settings = Self::from_ini(&ini)?;
        tracing::info!("Loaded settings from {path}");
        Ok(settings)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(section) = ini.section(Some("pipeline")) {
            let reader = SectionReader::new("pipeline", section);
            reader.parse("max_retries", &mut settings.pipeline.max_retries)?;
        }

        if let Some(section) = ini.section(Some("navigator")) {
            let nav = &mut settings.navigator;
            let reader = SectionReader::new("navigator", section);
            reader.parse("max_level", &mut nav.max_level)?;
            reader.parse("enable_curtain", &mut nav.enable_curtain)?;
            reader.parse("curtain_page", &mut nav.curtain_page)?;
            reader.parse("enable_tainted_restore", &mut nav.enable_tainted_restore)?;
            reader.millis("settle_delay_ms", &mut nav.settle_delay)?;
            reader.millis("back_settle_delay_ms", &mut nav.back_settle_delay)?;
            reader.millis("open_retry_timeout_ms", &mut nav.open_retry_timeout)?;
            reader.parse("forced_refresh_param", &mut nav.forced_refresh_param)?;
            reader.parse("lock_key", &mut nav.lock_key)?;
        }

        Ok(settings)
    }
}

struct SectionReader<'a> {
    name: &'static str,
    section: &'a ini::Properties,
}

impl<'a> SectionReader<'a> {
    fn new(name: &'static str, section: &'a ini::Properties) -> Self {
        Self { name, section }
    }

    fn parse<T: FromStr>(&self, key: &str, target: &mut T) -> Result<(), ConfigError> {
        let Some(raw) = self.section.get(key) else {
            return Ok(());
        };
        *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
        })?;
        Ok(())
    }

    fn millis(&self, key: &str, target: &mut Duration) -> Result<(), ConfigError> {
        let mut ms = target.as_millis() as u64;
        self.parse(key, &mut ms)?;
        *target = Duration::from_millis(ms);
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
