//! On-disk configuration
//!
//! A single TOML file, by default `<config_dir>/robolink/config.toml`. Every
//! section and every key may be left out and falls back to its default, so a
//! file holding only `[connection] url = "..."` is complete.

use crate::controller::ControllerSettings;
use crate::input::{AnimationSettings, Surface};
use crate::link::ChannelSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_DIR: &str = "robolink";
pub const CONFIG_FILE: &str = "config.toml";

pub const URL_ENV: &str = "ROBOLINK_URL";
pub const BIND_ENV: &str = "ROBOLINK_BIND";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub throttle: ThrottleConfig,
    pub speed: SpeedConfig,
    pub direction: DirectionConfig,
    pub animation: AnimationConfig,
    pub surface: SurfaceConfig,
    pub actuator: ActuatorConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub url: String,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let channel = ChannelSettings::default();
        Self {
            url: "ws://localhost:8765".to_string(),
            reconnect_delay_ms: channel.reconnect_delay_ms,
            max_reconnect_attempts: channel.max_reconnect_attempts,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ThrottleConfig {
    pub window_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self { window_ms: 50 }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SpeedConfig {
    pub dead_zone_percent: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            dead_zone_percent: 5.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DirectionConfig {
    pub dead_zone_percent: f64,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            dead_zone_percent: 2.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AnimationConfig {
    pub frame_interval_ms: u64,
    pub decay_factor: f64,
    pub snap_epsilon: f64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        let animation = AnimationSettings::default();
        Self {
            frame_interval_ms: 16,
            decay_factor: animation.decay_factor,
            snap_epsilon: animation.snap_epsilon,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: f64,
    pub height: f64,
    pub knob_diameter: f64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 200.0,
            height: 200.0,
            knob_diameter: 60.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ActuatorConfig {
    pub bind: String,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8765".to_string(),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads and validates the file at `path`
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the defaults to `path` unless a file already exists there
    pub async fn ensure_default(path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if tokio::fs::try_exists(path).await.map_err(io_error)? {
            return Ok(());
        }

        info!("Creating default configuration at {}", path.display());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(path, Self::default().to_toml()?)
            .await
            .map_err(io_error)?;
        Ok(())
    }

    /// Applies `ROBOLINK_URL` / `ROBOLINK_BIND` style overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(URL_ENV) {
            debug!("{} overrides connection url", URL_ENV);
            self.connection.url = url;
        }
        if let Some(bind) = lookup(BIND_ENV) {
            debug!("{} overrides actuator bind address", BIND_ENV);
            self.actuator.bind = bind;
        }
    }

    /// Command line values, applied last
    pub fn apply_cli_overrides(&mut self, url: Option<String>, bind: Option<String>) {
        if let Some(url) = url {
            debug!("--url overrides connection url");
            self.connection.url = url;
        }
        if let Some(bind) = bind {
            debug!("--bind overrides actuator bind address");
            self.actuator.bind = bind;
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, dead_zone) in [
            ("speed", self.speed.dead_zone_percent),
            ("direction", self.direction.dead_zone_percent),
        ] {
            if !(0.0..100.0).contains(&dead_zone) {
                return Err(ConfigError::Invalid(format!(
                    "{name}.dead_zone_percent must be within [0, 100), got {dead_zone}"
                )));
            }
        }

        let animation = &self.animation;
        if !(animation.decay_factor > 0.0 && animation.decay_factor < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "animation.decay_factor must be within (0, 1), got {}",
                animation.decay_factor
            )));
        }
        if animation.snap_epsilon.is_nan() || animation.snap_epsilon <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "animation.snap_epsilon must be positive, got {}",
                animation.snap_epsilon
            )));
        }
        if animation.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "animation.frame_interval_ms must be positive".to_string(),
            ));
        }
        if self.throttle.window_ms == 0 {
            return Err(ConfigError::Invalid(
                "throttle.window_ms must be positive".to_string(),
            ));
        }

        let surface = &self.surface;
        if [surface.width, surface.height, surface.knob_diameter]
            .iter()
            .any(|v| v.is_nan() || *v < 0.0)
        {
            return Err(ConfigError::Invalid(
                "surface sizes must not be negative".to_string(),
            ));
        }

        if self.connection.url.trim().is_empty() {
            return Err(ConfigError::Invalid("connection.url is empty".to_string()));
        }
        if self.actuator.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("actuator.bind is empty".to_string()));
        }
        Ok(())
    }

    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            reconnect_delay_ms: self.connection.reconnect_delay_ms,
            max_reconnect_attempts: self.connection.max_reconnect_attempts,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            speed_dead_zone_percent: self.speed.dead_zone_percent,
            direction_dead_zone_percent: self.direction.dead_zone_percent,
            throttle_window_ms: self.throttle.window_ms,
            frame_interval_ms: self.animation.frame_interval_ms,
            animation: AnimationSettings {
                decay_factor: self.animation.decay_factor,
                snap_epsilon: self.animation.snap_epsilon,
            },
            initial_surface: Some(Surface::new(
                self.surface.width,
                self.surface.height,
                self.surface.knob_diameter,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.connection.url, "ws://localhost:8765");
        assert_eq!(config.speed.dead_zone_percent, 5.0);
        assert_eq!(config.direction.dead_zone_percent, 2.0);
        assert_eq!(config.actuator.bind, "0.0.0.0:8765");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [connection]
            url = "ws://10.0.0.7:9000"

            [direction]
            dead_zone_percent = 8.0
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.url, "ws://10.0.0.7:9000");
        assert_eq!(config.connection.reconnect_delay_ms, 3000);
        assert_eq!(config.connection.max_reconnect_attempts, 5);
        assert_eq!(config.direction.dead_zone_percent, 8.0);
        assert_eq!(config.speed.dead_zone_percent, 5.0);
        assert_eq!(config.animation, AnimationConfig::default());
    }

    #[test]
    fn written_defaults_read_back_unchanged() {
        let text = AppConfig::default().to_toml().unwrap();
        assert_eq!(AppConfig::from_toml(&text).unwrap(), AppConfig::default());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = AppConfig::from_toml("[connection\nurl = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = AppConfig::default();
        config.speed.dead_zone_percent = 100.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.animation.decay_factor = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.throttle.window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.surface.knob_diameter = -1.0;
        assert!(config.validate().is_err());

        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn overrides_replace_url_and_bind() {
        let vars = HashMap::from([
            (URL_ENV, "ws://robot.local:8765".to_string()),
            (BIND_ENV, "127.0.0.1:9999".to_string()),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).cloned());

        assert_eq!(config.connection.url, "ws://robot.local:8765");
        assert_eq!(config.actuator.bind, "127.0.0.1:9999");
    }

    #[test]
    fn overridden_values_are_validated_again() {
        let mut config = AppConfig::default();
        config.apply_cli_overrides(Some(String::new()), None);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let vars = HashMap::from([(BIND_ENV, "  ".to_string())]);
        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).cloned());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.apply_cli_overrides(Some("ws://10.0.0.7:9000".into()), Some("127.0.0.1:0".into()));
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.url, "ws://10.0.0.7:9000");
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.connection.reconnect_delay_ms = 500;
        config.surface.width = 300.0;

        assert_eq!(config.channel_settings().reconnect_delay_ms, 500);
        let controller = config.controller_settings();
        assert_eq!(controller.direction_dead_zone_percent, 2.0);
        assert_eq!(
            controller.initial_surface,
            Some(Surface::new(300.0, 200.0, 60.0))
        );
    }

    #[tokio::test]
    async fn ensure_default_creates_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_DIR).join(CONFIG_FILE);

        AppConfig::ensure_default(&path).await.unwrap();
        assert_eq!(AppConfig::load(&path).await.unwrap(), AppConfig::default());

        tokio::fs::write(&path, "[throttle]\nwindow_ms = 80\n")
            .await
            .unwrap();
        AppConfig::ensure_default(&path).await.unwrap();
        assert_eq!(AppConfig::load(&path).await.unwrap().throttle.window_ms, 80);
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(&dir.path().join("absent.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[tokio::test]
    async fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "[speed]\ndead_zone_percent = 150.0\n")
            .await
            .unwrap();
        assert!(matches!(
            AppConfig::load(&path).await,
            Err(ConfigError::Invalid(_))
        ));
    }
}
