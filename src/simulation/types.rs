//! Type definitions for the node simulation.
//!
//! Contains the per-node record mutated by the simulator and the transmitter,
//! the crop and irrigation enums, and the process-wide sensor bounds.

use serde::Deserialize;

/// Number of simulated nodes. The fleet never grows or shrinks at runtime.
pub const NODE_COUNT: usize = 5;

/// Soil moisture (%) at which an active irrigation cycle stops.
pub const IRRIGATION_STOP_MOISTURE: f32 = 70.0;

/// Crop planted around a node, assigned by fleet position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropType {
    Soy,
    Corn,
    Coffee,
    Sugarcane,
    Cotton,
}

impl CropType {
    /// Fleet order; node `i` grows `FLEET_ORDER[i % len]`.
    pub const FLEET_ORDER: [CropType; 5] = [CropType::Soy, CropType::Corn, CropType::Coffee, CropType::Sugarcane, CropType::Cotton];

    pub fn for_index(index: usize) -> Self {
        Self::FLEET_ORDER[index % Self::FLEET_ORDER.len()]
    }
}

impl std::fmt::Display for CropType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CropType::Soy => f.pad("Soy"),
            CropType::Corn => f.pad("Corn"),
            CropType::Coffee => f.pad("Coffee"),
            CropType::Sugarcane => f.pad("Sugarcane"),
            CropType::Cotton => f.pad("Cotton"),
        }
    }
}

/// Irrigation controller state.
///
/// Discriminants are the wire ordinals understood by the receiving station.
/// `Auto` is reserved and never entered by the simulator. `Error` is absorbing:
/// no automatic transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IrrigationStatus {
    Off = 0,
    On = 1,
    Error = 2,
    Auto = 3,
}

impl IrrigationStatus {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            0 => Some(IrrigationStatus::Off),
            1 => Some(IrrigationStatus::On),
            2 => Some(IrrigationStatus::Error),
            3 => Some(IrrigationStatus::Auto),
            _ => None,
        }
    }
}

impl std::fmt::Display for IrrigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrrigationStatus::Off => f.pad("OFF"),
            IrrigationStatus::On => f.pad("ON"),
            IrrigationStatus::Auto => f.pad("AUTO"),
            IrrigationStatus::Error => f.pad("ERROR"),
        }
    }
}

/// Configured bounds for every simulated sensor dimension.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorRanges {
    pub soil_moisture_min: f32,
    pub soil_moisture_max: f32,
    /// Below this the irrigation controller switches on.
    pub soil_moisture_critical: f32,
    pub humidity_min: f32,
    pub humidity_max: f32,
    pub humidity_avg: f32,
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub temperature_avg: f32,
}

impl Default for SensorRanges {
    fn default() -> Self {
        Self {
            soil_moisture_min: 10.0,
            soil_moisture_max: 90.0,
            soil_moisture_critical: 30.0,
            humidity_min: 30.0,
            humidity_max: 90.0,
            humidity_avg: 60.0,
            temperature_min: 10.0,
            temperature_max: 40.0,
            temperature_avg: 25.0,
        }
    }
}

impl SensorRanges {
    /// Check `min <= avg/critical <= max` for each dimension.
    pub fn validate(&self) -> Result<(), String> {
        let dims = [
            ("soil_moisture", self.soil_moisture_min, self.soil_moisture_critical, self.soil_moisture_max),
            ("humidity", self.humidity_min, self.humidity_avg, self.humidity_max),
            ("temperature", self.temperature_min, self.temperature_avg, self.temperature_max),
        ];
        for (name, min, mid, max) in dims {
            if !(min.is_finite() && mid.is_finite() && max.is_finite()) {
                return Err(format!("{} bounds must be finite", name));
            }
            if !(min <= mid && mid <= max) {
                return Err(format!("{} bounds out of order: min {} / mid {} / max {}", name, min, mid, max));
            }
        }
        if self.soil_moisture_min < 0.0 || self.soil_moisture_max > 100.0 {
            return Err(format!(
                "soil_moisture bounds {}..{} exceed 0..100 %",
                self.soil_moisture_min, self.soil_moisture_max
            ));
        }
        Ok(())
    }
}

/// State of one simulated field node.
#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: u16,
    pub crop: CropType,
    /// Soil moisture (%).
    pub soil_moisture: f32,
    /// Ambient temperature (°C).
    pub ambient_temp: f32,
    /// Air humidity (%).
    pub humidity: f32,
    pub irrigation: IrrigationStatus,
    pub needs_irrigation: bool,
    /// Incremented once per successful transmission, wrapping.
    pub sequence_number: u32,
    /// Uptime (ms) of the last sensor update.
    pub last_update_ms: u64,
    /// Uptime (ms) of the last successful transmission, 0 before the first.
    pub last_tx_ms: u64,
    pub tx_count: u32,
    /// Signal strength reported by the radio after the last successful send.
    pub last_rssi: i16,
    /// Unix time (s) of the last collection, 0 if the clock was unsynchronized.
    pub collected_at: u32,
}

impl Node {
    pub fn new(node_id: u16, crop: CropType) -> Self {
        Self {
            node_id,
            crop,
            soil_moisture: 0.0,
            ambient_temp: 0.0,
            humidity: 0.0,
            irrigation: IrrigationStatus::Off,
            needs_irrigation: false,
            sequence_number: 0,
            last_update_ms: 0,
            last_tx_ms: 0,
            tx_count: 0,
            last_rssi: 0,
            collected_at: 0,
        }
    }
}
