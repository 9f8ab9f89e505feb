//! Node state simulator.
//!
//! Evolves every node's sensors once per update interval:
//! - ambient temperature follows a 24 h sinusoid peaking at noon,
//!   exponentially smoothed, with multiplicative noise
//! - humidity moves opposite to the temperature swing
//! - soil moisture dries by evapotranspiration (faster above 30 °C) and
//!   recovers while irrigation is on
//!
//! The irrigation controller runs after the sensors: Off → On below the
//! critical moisture, On → Off at 70 %, and a rare fault to the absorbing
//! `Error` state.

use core::f32::consts::PI;
use log::{debug, info, warn};
use rand::Rng;

use super::types::{CropType, IRRIGATION_STOP_MOISTURE, IrrigationStatus, NODE_COUNT, Node, SensorRanges};
use crate::config::{FleetConfig, SimulationConfig};
use crate::time_driver::Clock;

const MS_PER_HOUR: u64 = 3_600_000;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Amplitude of the diurnal temperature swing (°C).
const DIURNAL_AMPLITUDE: f32 = 8.0;
/// Temperature above which evaporation speeds up (°C).
const HOT_DAY_THRESHOLD: f32 = 30.0;
const HOT_DAY_EVAPORATION_FACTOR: f32 = 1.5;

/// Temperature relative swing around its configured average: `8 * sin((h - 6) * π/12)`.
pub fn diurnal_variation(hour_of_day: f32) -> f32 {
    DIURNAL_AMPLITUDE * ((hour_of_day - 6.0) * PI / 12.0).sin()
}

/// `value + U(-1,1) * value * pct/100`.
pub fn add_noise<R: Rng>(rng: &mut R, value: f32, noise_percent: f32) -> f32 {
    let factor: f32 = rng.gen_range(-1.0..1.0);
    value + factor * (value * noise_percent / 100.0)
}

pub struct NodeSimulator<R: Rng> {
    nodes: [Node; NODE_COUNT],
    ranges: SensorRanges,
    fleet: FleetConfig,
    update_interval_ms: u64,
    last_global_update: u64,
    rng: R,
}

impl<R: Rng> NodeSimulator<R> {
    pub fn new(simulation: &SimulationConfig, fleet: FleetConfig, ranges: SensorRanges, rng: R) -> Self {
        let base = fleet.base_node_id;
        Self {
            nodes: core::array::from_fn(|i| Node::new(base.wrapping_add(i as u16), CropType::for_index(i))),
            ranges,
            fleet,
            update_interval_ms: simulation.update_interval_ms,
            last_global_update: 0,
            rng,
        }
    }

    /// Seed every node and start the update interval.
    pub fn begin(&mut self, clock: &dyn Clock) {
        self.initialize_nodes(clock.millis());
        self.last_global_update = clock.millis();
        info!("{} agricultural nodes created", NODE_COUNT);
        self.print_all_nodes();
    }

    fn initialize_nodes(&mut self, now_ms: u64) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            *node = Node::new(self.fleet.base_node_id.wrapping_add(i as u16), CropType::for_index(i));

            let moisture = add_noise(&mut self.rng, self.fleet.base_moistures[i], 10.0);
            let temperature = add_noise(&mut self.rng, self.fleet.base_temperatures[i], 5.0);
            let humidity = add_noise(&mut self.rng, self.ranges.humidity_avg, 15.0);

            node.soil_moisture = moisture.clamp(self.ranges.soil_moisture_min, self.ranges.soil_moisture_max);
            node.ambient_temp = temperature.clamp(self.ranges.temperature_min, self.ranges.temperature_max);
            node.humidity = humidity.clamp(self.ranges.humidity_min, self.ranges.humidity_max);
            node.last_update_ms = now_ms;
        }
    }

    /// Advance all nodes if the update interval elapsed. Returns whether it did.
    pub fn update(&mut self, clock: &dyn Clock) -> bool {
        let now = clock.millis();
        if now.saturating_sub(self.last_global_update) < self.update_interval_ms {
            return false;
        }
        self.last_global_update = now;

        let hour = hour_of_day(clock);
        let collected_at = clock.unix_seconds();
        for i in 0..NODE_COUNT {
            self.update_node_sensors(i, hour);
            self.check_irrigation_needs(i);
            let node = &mut self.nodes[i];
            node.collected_at = collected_at;
            node.last_update_ms = now;
        }
        debug!("Sensors updated (hour of day {:.2})", hour);
        true
    }

    fn update_node_sensors(&mut self, index: usize, hour_of_day: f32) {
        let ranges = &self.ranges;
        let rng = &mut self.rng;
        let node = &mut self.nodes[index];
        let variation = diurnal_variation(hour_of_day);

        let target_temp = ranges.temperature_avg + variation;
        let smoothed = node.ambient_temp * 0.9 + target_temp * 0.1;
        node.ambient_temp = add_noise(rng, smoothed, 2.0).clamp(ranges.temperature_min, ranges.temperature_max);

        let target_humidity = ranges.humidity_avg - variation * 2.0;
        let smoothed = node.humidity * 0.85 + target_humidity * 0.15;
        node.humidity = add_noise(rng, smoothed, 3.0).clamp(ranges.humidity_min, ranges.humidity_max);

        if node.irrigation == IrrigationStatus::On {
            let gain: f32 = rng.gen_range(3.0..5.0);
            node.soil_moisture = (node.soil_moisture + gain).clamp(0.0, ranges.soil_moisture_max);
            if node.soil_moisture >= IRRIGATION_STOP_MOISTURE {
                node.irrigation = IrrigationStatus::Off;
                info!("[{}] Irrigation stopped (soil moisture {:.1}%)", node.node_id, node.soil_moisture);
            }
        } else {
            let mut evaporation: f32 = rng.gen_range(0.5..1.5);
            if node.ambient_temp > HOT_DAY_THRESHOLD {
                evaporation *= HOT_DAY_EVAPORATION_FACTOR;
            }
            node.soil_moisture = (node.soil_moisture - evaporation).clamp(ranges.soil_moisture_min, ranges.soil_moisture_max);
        }
    }

    fn check_irrigation_needs(&mut self, index: usize) {
        let critical = self.ranges.soil_moisture_critical;
        let node = &mut self.nodes[index];

        if node.soil_moisture < critical {
            if node.irrigation == IrrigationStatus::Off {
                node.irrigation = IrrigationStatus::On;
                node.needs_irrigation = true;
                warn!("[{}] Irrigation started (soil moisture {:.1}%)", node.node_id, node.soil_moisture);
            }
        } else {
            node.needs_irrigation = false;
        }

        if self.fleet.irrigation_fault_per_mille > 0 && self.rng.gen_range(0..1000) < self.fleet.irrigation_fault_per_mille {
            node.irrigation = IrrigationStatus::Error;
            warn!("[{}] Irrigation system fault", node.node_id);
        }
    }

    #[cfg(test)]
    pub fn nodes(&self) -> &[Node; NODE_COUNT] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    #[cfg(test)]
    pub fn ranges(&self) -> &SensorRanges {
        &self.ranges
    }

    pub fn print_node_status(&self, index: usize) {
        let Some(node) = self.nodes.get(index) else {
            return;
        };
        info!(
            "[{}] {:<9} soil {:5.1}% | temp {:5.1}°C | hum {:5.1}% | irrigation {:<5} | seq {} | tx {} | rssi {} dBm",
            node.node_id,
            node.crop,
            node.soil_moisture,
            node.ambient_temp,
            node.humidity,
            node.irrigation,
            node.sequence_number,
            node.tx_count,
            node.last_rssi
        );
    }

    pub fn print_all_nodes(&self) {
        info!("======== Agricultural node status ========");
        for i in 0..NODE_COUNT {
            self.print_node_status(i);
        }
    }
}

/// Hour of day from the wall clock, or from uptime when it is unsynchronized.
fn hour_of_day(clock: &dyn Clock) -> f32 {
    clock
        .local_hour()
        .unwrap_or_else(|| (clock.millis() % MS_PER_DAY) as f32 / MS_PER_HOUR as f32)
}
