//! Simulator configuration loading and validation.
//!
//! The whole process is driven by a single TOML file. Every section and field
//! has a default so a partial file (or no file at all) yields the deployed
//! ground-station setup: five nodes, 915 MHz SF7/BW125, 60 s base interval.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::radio::signal_calculations::{LoraParameters, PathLossParameters};
use crate::radio::{PayloadFormat, RadioPins};
use crate::simulation::types::{NODE_COUNT, SensorRanges};

/// Error type for configuration loading failures.
#[derive(Debug)]
pub enum ConfigError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileReadError(msg) => write!(f, "Failed to read config file: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config file: {}", msg),
            ConfigError::ValidationError(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Root of the configuration file.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SimulatorConfig {
    pub simulation: SimulationConfig,
    pub fleet: FleetConfig,
    pub ranges: SensorRanges,
    pub schedule: ScheduleConfig,
    pub radio: RadioConfig,
    pub clock: ClockConfig,
    pub probe: ProbeConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for every pseudo-random source in the process.
    pub seed: u64,
    /// Sensor state advances at most once per this interval (ms).
    pub update_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_A6A0,
            update_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Node ids are `base_node_id + index`.
    pub base_node_id: u16,
    /// Per-node soil moisture seed values (%).
    pub base_moistures: [f32; NODE_COUNT],
    /// Per-node ambient temperature seed values (°C).
    pub base_temperatures: [f32; NODE_COUNT],
    /// Chance (per thousand) that a node's irrigation system faults on an update.
    pub irrigation_fault_per_mille: u32,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            base_node_id: 1000,
            base_moistures: [45.0, 55.0, 65.0, 40.0, 50.0],
            base_temperatures: [24.0, 26.0, 22.0, 28.0, 25.0],
            irrigation_fault_per_mille: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub tx_interval_base_ms: u64,
    /// Spread across the fleet; node `i` gets `i * (jitter / N)` extra.
    pub tx_jitter_ms: u64,
    /// Regulatory duty-cycle floor.
    pub min_tx_interval_ms: u64,
    pub team_id: u16,
    /// Bounds of the simulated ground RSSI placed in each packet, `[min, max)`.
    pub rssi_min_dbm: i16,
    pub rssi_max_dbm: i16,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tx_interval_base_ms: 60_000,
            tx_jitter_ms: 30_000,
            min_tx_interval_ms: 20_000,
            team_id: 666,
            rssi_min_dbm: -80,
            rssi_max_dbm: -50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub frequency_hz: u32,
    pub pins: RadioPins,
    pub lora: LoraParameters,
    pub payload_format: PayloadFormat,
    pub simulation: RadioSimulationConfig,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 915_000_000,
            pins: RadioPins::default(),
            lora: LoraParameters::default(),
            payload_format: PayloadFormat::Binary,
            simulation: RadioSimulationConfig::default(),
        }
    }
}

/// Behaviour of the host-side transceiver model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioSimulationConfig {
    /// When false the chip never answers `begin`.
    pub responding: bool,
    pub channel_busy_probability: f64,
    pub send_failure_probability: f64,
    /// Distance to the receiving station used for the reported RSSI (m).
    pub link_distance_m: f32,
    pub path_loss: PathLossParameters,
}

impl Default for RadioSimulationConfig {
    fn default() -> Self {
        Self {
            responding: true,
            channel_busy_probability: 0.05,
            send_failure_probability: 0.02,
            link_distance_m: 2_000.0,
            path_loss: PathLossParameters::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Whether a synchronized wall clock is available.
    pub time_sync: bool,
    /// Simulation speed, 100 = real time.
    pub speed_percent: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            time_sync: true,
            speed_percent: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,
    pub read_interval_ms: u64,
    /// Remote logging endpoint. Readings are only logged locally when absent.
    pub sink_url: Option<String>,
    /// Mean temperature reported by the simulated probe (°C).
    pub simulated_mean_c: f32,
    /// Chance that a read returns the disconnected sentinel.
    pub disconnect_probability: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            read_interval_ms: 5_000,
            sink_url: None,
            simulated_mean_c: 24.0,
            disconnect_probability: 0.02,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stop after this many ticks; 0 runs forever.
    pub max_ticks: u64,
    pub stats_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_ticks: 0,
            stats_interval_ms: 60_000,
        }
    }
}

impl SimulatorConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::FileReadError(format!("{}: {}", config_path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SimulatorConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break simulator or scheduler invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ranges.validate().map_err(ConfigError::ValidationError)?;

        if self.simulation.update_interval_ms == 0 {
            return Err(ConfigError::ValidationError("simulation.update_interval_ms must be positive".to_string()));
        }
        if self.fleet.irrigation_fault_per_mille > 1000 {
            return Err(ConfigError::ValidationError(format!(
                "fleet.irrigation_fault_per_mille {} exceeds 1000",
                self.fleet.irrigation_fault_per_mille
            )));
        }
        if (self.fleet.base_node_id as usize) + NODE_COUNT > u16::MAX as usize + 1 {
            return Err(ConfigError::ValidationError(format!("fleet.base_node_id {} leaves no room for {} nodes", self.fleet.base_node_id, NODE_COUNT)));
        }
        if self.schedule.min_tx_interval_ms == 0 {
            return Err(ConfigError::ValidationError("schedule.min_tx_interval_ms must be positive".to_string()));
        }
        if self.schedule.rssi_min_dbm >= self.schedule.rssi_max_dbm {
            return Err(ConfigError::ValidationError(format!(
                "schedule.rssi_min_dbm {} must be below rssi_max_dbm {}",
                self.schedule.rssi_min_dbm, self.schedule.rssi_max_dbm
            )));
        }
        if self.schedule.rssi_min_dbm < -128 || self.schedule.rssi_max_dbm > 128 {
            return Err(ConfigError::ValidationError("schedule rssi bounds must fit -128..=128 dBm".to_string()));
        }

        let sim = &self.radio.simulation;
        for (name, p) in [
            ("radio.simulation.channel_busy_probability", sim.channel_busy_probability),
            ("radio.simulation.send_failure_probability", sim.send_failure_probability),
            ("probe.disconnect_probability", self.probe.disconnect_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::ValidationError(format!("{} {} outside 0..=1", name, p)));
            }
        }
        if !(5..=12).contains(&self.radio.lora.spreading_factor) {
            return Err(ConfigError::ValidationError(format!("radio.lora.spreading_factor {} outside 5..=12", self.radio.lora.spreading_factor)));
        }
        if self.radio.lora.bandwidth == 0 {
            return Err(ConfigError::ValidationError("radio.lora.bandwidth must be positive".to_string()));
        }
        if !(5..=8).contains(&self.radio.lora.coding_rate) {
            return Err(ConfigError::ValidationError(format!("radio.lora.coding_rate 4/{} outside 4/5..4/8", self.radio.lora.coding_rate)));
        }
        if !(1..=1000).contains(&self.clock.speed_percent) {
            return Err(ConfigError::ValidationError(format!("clock.speed_percent {} outside 1..=1000", self.clock.speed_percent)));
        }
        if self.probe.enabled && self.probe.read_interval_ms == 0 {
            return Err(ConfigError::ValidationError("probe.read_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = SimulatorConfig::from_toml_str("").unwrap();
        assert_eq!(config.fleet.base_node_id, 1000);
        assert_eq!(config.schedule.team_id, 666);
        assert_eq!(config.schedule.tx_interval_base_ms, 60_000);
        assert_eq!(config.radio.frequency_hz, 915_000_000);
        assert_eq!(config.radio.lora.spreading_factor, 7);
        assert_eq!(config.radio.payload_format, PayloadFormat::Binary);
        assert!(config.probe.sink_url.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = SimulatorConfig::from_toml_str(
            r#"
            [schedule]
            team_id = 42
            tx_jitter_ms = 10000

            [radio]
            payload_format = "hex"

            [radio.lora]
            spreading_factor = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.schedule.team_id, 42);
        assert_eq!(config.schedule.tx_jitter_ms, 10_000);
        assert_eq!(config.schedule.min_tx_interval_ms, 20_000);
        assert_eq!(config.radio.payload_format, PayloadFormat::Hex);
        assert_eq!(config.radio.lora.spreading_factor, 9);
        assert_eq!(config.radio.lora.bandwidth, 125_000);
    }

    #[test]
    fn inverted_sensor_range_is_rejected() {
        let err = SimulatorConfig::from_toml_str(
            r#"
            [ranges]
            soil_moisture_min = 50.0
            soil_moisture_critical = 30.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn inverted_rssi_range_is_rejected() {
        let err = SimulatorConfig::from_toml_str(
            r#"
            [schedule]
            rssi_min_dbm = -40
            rssi_max_dbm = -60
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = SimulatorConfig::from_toml_str("[schedule\nteam_id = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn example_file_matches_defaults() {
        let config = SimulatorConfig::from_toml_str(include_str!("../agrinode.example.toml")).unwrap();
        let defaults = SimulatorConfig::default();
        assert_eq!(config.simulation.seed, defaults.simulation.seed);
        assert_eq!(config.fleet.base_moistures, defaults.fleet.base_moistures);
        assert_eq!(config.radio.lora, defaults.radio.lora);
        assert_eq!(config.radio.pins.rst, defaults.radio.pins.rst);
        assert_eq!(config.schedule.rssi_max_dbm, defaults.schedule.rssi_max_dbm);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = SimulatorConfig::load(Path::new("/nonexistent/agrinode.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError(_)));
    }
}
