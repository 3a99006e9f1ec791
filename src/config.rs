//! Configuration for the recorder and the packet listener.

use crate::collector::types::JointType;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory that holds one subdirectory per session
    pub recordings_path: PathBuf,

    /// Upper bound on recorder loop iterations per second
    pub frame_rate_hz: u32,

    /// Trigger symbols that place tires
    pub tire_keys: String,

    /// Trigger symbols that place fields
    pub field_keys: String,

    /// Joint measured against every point of interest
    pub tracked_joint: JointType,

    /// Joint whose position is used when a point of interest is placed
    pub hand_tip_joint: JointType,

    /// Address of the sensor packet publisher
    pub listener_address: String,

    /// Receive timeout of the listener; also bounds how long `close` waits
    #[serde(with = "duration_millis")]
    pub poll_timeout: Duration,

    /// Write session artifacts at shutdown
    pub write_csv: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recordings_path: PathBuf::from("recordings"),
            frame_rate_hz: 60,
            tire_keys: "12".to_string(),
            field_keys: "345".to_string(),
            tracked_joint: JointType::WristRight,
            hand_tip_joint: JointType::HandTipRight,
            listener_address: "127.0.0.1:5555".to_string(),
            poll_timeout: Duration::from_millis(600),
            write_csv: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motion-session-recorder")
            .join("config.json")
    }

    /// Ensure the recordings root exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.recordings_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Parse the configured trigger keys.
    pub fn triggers(&self) -> Result<TriggerConfig, ConfigError> {
        TriggerConfig::from_keys(&self.tire_keys, &self.field_keys)
    }

    /// Minimum wall time of one recorder loop iteration.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

/// Trigger symbols for the two point-of-interest families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub tires: Vec<char>,
    pub fields: Vec<char>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            tires: vec!['1', '2'],
            fields: vec!['3', '4', '5'],
        }
    }
}

impl TriggerConfig {
    /// Parse trigger sets from key strings such as `"12"` and `"345"`.
    ///
    /// Whitespace and commas are ignored; duplicates collapse.
    pub fn from_keys(tires: &str, fields: &str) -> Result<Self, ConfigError> {
        let parse = |s: &str| {
            let mut keys: Vec<char> = Vec::new();
            for c in s.chars().filter(|c| !c.is_whitespace() && *c != ',') {
                if !keys.contains(&c) {
                    keys.push(c);
                }
            }
            keys
        };
        let tires = parse(tires);
        let fields = parse(fields);

        if tires.is_empty() || fields.is_empty() {
            return Err(ConfigError::InvalidTriggers(
                "both tire and field trigger sets need at least one key".to_string(),
            ));
        }
        if let Some(c) = tires.iter().find(|c| fields.contains(c)) {
            return Err(ConfigError::InvalidTriggers(format!(
                "key '{c}' is both a tire and a field trigger"
            )));
        }

        Ok(Self { tires, fields })
    }
}

/// Session-scoped settings handed to the exporter.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root directory shared across sessions
    pub recordings_root: PathBuf,
    /// Name of this session's directory, e.g. `sample-20240122-101500`
    pub dir_name: String,
    /// Target labels documented alongside the measured data
    pub targets: Vec<String>,
}

/// Motion labels the subject performs, in order, documented per session.
pub const DEFAULT_TARGETS: [&str; 21] = [
    "050", "020", "110", "121", "010", "030", "020", "130", "111", "010", "040", "020", "210",
    "220", "230", "240", "310", "320", "330", "340", "410",
];

impl SessionConfig {
    /// Create a session configuration whose directory name embeds `started`.
    pub fn new(recordings_root: impl Into<PathBuf>, started: DateTime<Local>) -> Self {
        Self {
            recordings_root: recordings_root.into(),
            dir_name: format!("sample-{}", started.format("%Y%m%d-%H%M%S")),
            targets: DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Directory holding this session's artifacts.
    pub fn session_dir(&self) -> PathBuf {
        self.recordings_root.join(&self.dir_name)
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.session_dir().join("plots")
    }

    /// Global index of session directory names.
    pub fn session_index_path(&self) -> PathBuf {
        self.recordings_root.join("session_names.csv")
    }

    /// Global free-text notes file.
    pub fn notes_path(&self) -> PathBuf {
        self.recordings_root.join("notes.csv")
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidTriggers(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidTriggers(e) => write!(f, "Invalid trigger keys: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trigger_parsing() {
        let triggers = TriggerConfig::from_keys("1, 2", "345").unwrap();
        assert_eq!(triggers.tires, vec!['1', '2']);
        assert_eq!(triggers.fields, vec!['3', '4', '5']);

        assert!(TriggerConfig::from_keys("12", "23").is_err());
        assert!(TriggerConfig::from_keys("", "3").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.frame_rate_hz, 60);
        assert_eq!(config.poll_timeout, Duration::from_millis(600));
        assert_eq!(config.tracked_joint, JointType::WristRight);
        assert_eq!(config.triggers().unwrap(), TriggerConfig::default());
    }

    #[test]
    fn test_config_json_round_trip_keeps_millis() {
        let config = Config {
            poll_timeout: Duration::from_millis(250),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"poll_timeout\":250"));
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.poll_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_session_dir_name_embeds_timestamp() {
        let started = Local.with_ymd_and_hms(2024, 1, 22, 10, 15, 0).unwrap();
        let session = SessionConfig::new("recordings", started);
        assert_eq!(session.dir_name, "sample-20240122-101500");
        assert_eq!(
            session.session_dir(),
            PathBuf::from("recordings").join("sample-20240122-101500")
        );
        assert_eq!(session.targets.len(), 21);
    }
}
