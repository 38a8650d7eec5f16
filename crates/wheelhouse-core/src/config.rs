//! Engine configuration.
//!
//! Configuration is read from a TOML file. Every field has a default, so an
//! empty file (or no file at all) yields a working setup:
//!
//! ```toml
//! tick_ms = 100
//! scan_interval_secs = 3
//! sync_length = 10
//! baud_rate = 9600
//! port_filter = "/dev/ttyACM"
//!
//! [wheel]
//! radius_cm = 8.0
//! sensor_count = 4
//!
//! [[tags]]
//! id = "3A00112233"
//! lock_distance = 500.0
//!
//! [[tags]]
//! id = "3A00445566"
//! schedule = { distance = 250.0, time = "18:00:00" }
//! ```

use crate::{
    Result, TagId, TimeOfDay,
    constants::{
        DEFAULT_ADC_VREF, DEFAULT_BAUD_RATE, DEFAULT_DISPLAY_WINDOW, DEFAULT_SCAN_INTERVAL_SECS,
        DEFAULT_SCHEDULE_GRACE_SCANS, DEFAULT_SENSOR_COUNT, DEFAULT_SYNC_LENGTH, DEFAULT_TICK_MS,
        DEFAULT_WHEEL_RADIUS_CM,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Physical geometry of the running wheel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelGeometry {
    /// Wheel radius in centimetres.
    pub radius_cm: f64,

    /// Hall-sensor transitions per revolution.
    pub sensor_count: u32,
}

impl Default for WheelGeometry {
    fn default() -> Self {
        Self {
            radius_cm: DEFAULT_WHEEL_RADIUS_CM,
            sensor_count: DEFAULT_SENSOR_COUNT,
        }
    }
}

impl WheelGeometry {
    /// Distance in centimetres covered by one step: `2π·radius / sensor_count`.
    #[must_use]
    pub fn arc_length(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.radius_cm / f64::from(self.sensor_count)
    }
}

/// Scheduled lock preset for a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePreset {
    /// Distance added to the current distance when the schedule fires.
    pub distance: f64,

    /// Time of day at which the schedule fires.
    pub time: TimeOfDay,
}

/// Tag registered at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPreset {
    pub id: TagId,

    /// Absolute lock distance; the tag never locks if omitted.
    #[serde(default)]
    pub lock_distance: Option<f64>,

    #[serde(default)]
    pub schedule: Option<SchedulePreset>,
}

/// Configuration shared by the engine and the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fast tick period in milliseconds.
    pub tick_ms: u64,

    /// Slow scan interval in seconds. Also the handshake deadline and
    /// the inactivity timeout.
    pub scan_interval_secs: u64,

    /// Consecutive sync bytes required to accept a handshake.
    pub sync_length: usize,

    /// Serial line speed.
    pub baud_rate: u32,

    /// Length of the scheduled lock firing window, in scan intervals.
    pub schedule_grace_scans: u32,

    /// Samples kept in each display trail.
    pub display_window: usize,

    /// ADC reference voltage used for temperature conversion.
    pub adc_vref: f64,

    /// Only ports whose name starts with this prefix are considered.
    pub port_filter: Option<String>,

    pub wheel: WheelGeometry,

    pub tags: Vec<TagPreset>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            sync_length: DEFAULT_SYNC_LENGTH,
            baud_rate: DEFAULT_BAUD_RATE,
            schedule_grace_scans: DEFAULT_SCHEDULE_GRACE_SCANS,
            display_window: DEFAULT_DISPLAY_WINDOW,
            adc_vref: DEFAULT_ADC_VREF,
            port_filter: None,
            wheel: WheelGeometry::default(),
            tags: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// Returns `Error::ConfigParse` on malformed TOML and `Error::Config`
    /// when a value fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(Error::Config("tick_ms must be greater than 0".into()));
        }
        if self.scan_interval_secs == 0 {
            return Err(Error::Config(
                "scan_interval_secs must be greater than 0".into(),
            ));
        }
        if self.tick() > self.scan_interval() {
            return Err(Error::Config(format!(
                "tick ({}ms) must not exceed the scan interval ({}s)",
                self.tick_ms, self.scan_interval_secs
            )));
        }
        if self.sync_length == 0 {
            return Err(Error::Config("sync_length must be greater than 0".into()));
        }
        if self.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be greater than 0".into()));
        }
        if self.display_window == 0 {
            return Err(Error::Config("display_window must be greater than 0".into()));
        }
        if !(self.adc_vref.is_finite() && self.adc_vref > 0.0) {
            return Err(Error::Config(format!(
                "adc_vref must be positive, got {}",
                self.adc_vref
            )));
        }
        if !(self.wheel.radius_cm.is_finite() && self.wheel.radius_cm > 0.0) {
            return Err(Error::Config(format!(
                "wheel.radius_cm must be positive, got {}",
                self.wheel.radius_cm
            )));
        }
        if self.wheel.sensor_count == 0 {
            return Err(Error::Config(
                "wheel.sensor_count must be greater than 0".into(),
            ));
        }
        for preset in &self.tags {
            if let Some(lock) = preset.lock_distance
                && (lock.is_nan() || lock < 0.0)
            {
                return Err(Error::Config(format!(
                    "tag {} has invalid lock_distance {lock}",
                    preset.id
                )));
            }
            if let Some(schedule) = &preset.schedule
                && !schedule.distance.is_finite()
            {
                return Err(Error::Config(format!(
                    "tag {} has invalid schedule distance {}",
                    preset.id, schedule.distance
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Scheduled lock firing window in seconds.
    #[must_use]
    pub fn grace_window_secs(&self) -> u32 {
        let secs = self.scan_interval_secs.saturating_mul(u64::from(self.schedule_grace_scans));
        u32::try_from(secs).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn arc_length(&self) -> f64 {
        self.wheel.arc_length()
    }

    /// Whether a port name passes the configured prefix filter.
    #[must_use]
    pub fn accepts_port(&self, name: &str) -> bool {
        self.port_filter
            .as_deref()
            .is_none_or(|prefix| name.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scan_interval(), Duration::from_secs(3));
        assert_eq!(config.grace_window_secs(), 15);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_parse_full_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            scan_interval_secs = 2
            sync_length = 6
            port_filter = "/dev/ttyACM"

            [wheel]
            radius_cm = 10.0
            sensor_count = 2

            [[tags]]
            id = "3a00112233"
            lock_distance = 500.0

            [[tags]]
            id = "3A00445566"
            schedule = { distance = 250.0, time = "18:00:00" }
            "#,
        )
        .unwrap();

        assert_eq!(config.sync_length, 6);
        assert_eq!(config.grace_window_secs(), 10);
        assert!((config.arc_length() - 10.0 * std::f64::consts::PI).abs() < 1e-9);
        assert_eq!(config.tags.len(), 2);
        assert_eq!(config.tags[0].id.as_str(), "3A00112233");
        assert_eq!(config.tags[0].lock_distance, Some(500.0));

        let schedule = config.tags[1].schedule.as_ref().unwrap();
        assert_eq!(schedule.time.hhmmss(), 180000);
    }

    #[rstest]
    #[case("tick_ms = 0")]
    #[case("scan_interval_secs = 0")]
    #[case("sync_length = 0")]
    #[case("tick_ms = 5000")]
    #[case("[wheel]\nsensor_count = 0")]
    #[case("[wheel]\nradius_cm = -1.0")]
    #[case("[[tags]]\nid = \"3A00112233\"\nlock_distance = -5.0")]
    fn test_invalid_values_rejected(#[case] document: &str) {
        let result = EngineConfig::from_toml_str(document);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_tag_is_parse_error() {
        let result = EngineConfig::from_toml_str("[[tags]]\nid = \"nothex\"");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_port_filter() {
        let mut config = EngineConfig::default();
        assert!(config.accepts_port("COM3"));

        config.port_filter = Some("/dev/ttyACM".into());
        assert!(config.accepts_port("/dev/ttyACM0"));
        assert!(!config.accepts_port("/dev/ttyS0"));
    }
}
