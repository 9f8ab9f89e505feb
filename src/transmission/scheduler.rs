//! Transmission scheduler.
//!
//! Decides when each node is due, performs listen-before-talk, encodes and
//! sends the packet, and maintains the fleet-wide counters. Node `i` uses the
//! fixed interval `max(base + i * (jitter / N), min)` so the fleet never
//! transmits in lockstep.

use log::{Level, debug, error, info, log_enabled, warn};
use rand::Rng;

use super::payload::{ActiveLayout, PayloadLayout, decode_packet, encode_packet, packet_size};
use crate::config::{RadioConfig, ScheduleConfig};
use crate::radio::signal_calculations::duty_cycle_percent;
use crate::radio::{PayloadFormat, RadioDevice, RadioError, to_hex_string};
use crate::simulation::simulator::NodeSimulator;
use crate::simulation::types::{NODE_COUNT, Node};
use crate::time_driver::Clock;

/// Channel readings above this mean someone else is on air (dBm).
pub const CHANNEL_BUSY_THRESHOLD_DBM: i16 = -90;
const CHANNEL_SAMPLES: usize = 3;
const CHANNEL_SAMPLE_PAUSE_MS: u64 = 10;

/// Wait after sensing a busy channel (ms, half-open).
const SENSE_BACKOFF_MS: (u64, u64) = (50, 200);
/// Additional wait before moving past a deferred node (ms, half-open).
const DEFER_BACKOFF_MS: (u64, u64) = (100, 500);
/// Pause after every attempted transmission (ms).
const INTER_NODE_PAUSE_MS: u64 = 100;

/// Frame sent once after the radio comes up.
pub const BOOT_FRAME: &[u8] = b"AGRINODE_BOOT";

/// Interval between transmissions of the node at fleet position `index`.
pub fn transmit_interval_ms(schedule: &ScheduleConfig, index: usize) -> u64 {
    let step = schedule.tx_jitter_ms / NODE_COUNT as u64;
    schedule
        .tx_interval_base_ms
        .saturating_add((index as u64).saturating_mul(step))
        .max(schedule.min_tx_interval_ms)
}

/// Fleet-wide transmission counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStatistics {
    pub sent: u32,
    pub failed: u32,
    /// Attempts skipped because the channel was busy.
    pub deferred: u32,
}

impl TxStatistics {
    /// `sent / (sent + failed)` in percent, `None` before any attempt.
    pub fn success_rate(&self) -> Option<f32> {
        let attempts = self.sent as u64 + self.failed as u64;
        if attempts == 0 {
            None
        } else {
            Some(self.sent as f32 * 100.0 / attempts as f32)
        }
    }
}

/// The success rate is only shown once something was actually sent.
impl std::fmt::Display for TxStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sent {}, failed {}, deferred {}", self.sent, self.failed, self.deferred)?;
        match self.success_rate() {
            Some(rate) if self.sent > 0 => write!(f, ", success {:.1} %", rate),
            _ => Ok(()),
        }
    }
}

pub struct LoRaTransmitter<D: RadioDevice, R: Rng> {
    radio: D,
    radio_config: RadioConfig,
    schedule: ScheduleConfig,
    initialized: bool,
    stats: TxStatistics,
    rng: R,
}

impl<D: RadioDevice, R: Rng> LoRaTransmitter<D, R> {
    pub fn new(radio: D, radio_config: RadioConfig, schedule: ScheduleConfig, rng: R) -> Self {
        Self {
            radio,
            radio_config,
            schedule,
            initialized: false,
            stats: TxStatistics::default(),
            rng,
        }
    }

    /// Bring up and configure the radio, then send the boot frame.
    ///
    /// A failed boot frame is only logged; the transmitter stays usable.
    pub fn begin(&mut self) -> Result<(), RadioError> {
        self.radio.begin(self.radio_config.frequency_hz, &self.radio_config.pins)?;
        self.radio.configure(&self.radio_config.lora);
        self.initialized = true;

        let lora = &self.radio_config.lora;
        info!(
            "LoRa radio ready: {:.1} MHz, SF{}, BW {:.1} kHz, CR 4/{}, {} dBm, sync 0x{:02X}",
            self.radio_config.frequency_hz as f64 / 1e6,
            lora.spreading_factor,
            lora.bandwidth as f64 / 1e3,
            lora.coding_rate,
            lora.tx_power_dbm,
            lora.sync_word
        );
        info!(
            "Payload: {} layout, {} bytes, {:?} framing",
            ActiveLayout::NAME,
            packet_size::<ActiveLayout>(),
            self.radio_config.payload_format
        );
        for i in 0..NODE_COUNT {
            let interval = transmit_interval_ms(&self.schedule, i);
            debug!(
                "Slot {}: every {} ms ({:.3} % duty cycle)",
                i,
                interval,
                duty_cycle_percent(lora, packet_size::<ActiveLayout>(), interval)
            );
        }

        self.radio.begin_send();
        self.radio.write_bytes(BOOT_FRAME);
        if self.radio.end_send(true) {
            info!("Boot test transmission sent");
        } else {
            warn!("Boot test transmission failed");
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Attempt one transmission for every node whose interval elapsed.
    pub fn update<S: Rng>(&mut self, simulator: &mut NodeSimulator<S>, clock: &dyn Clock) {
        if !self.initialized {
            return;
        }
        let now = clock.millis();

        for index in 0..NODE_COUNT {
            let interval = transmit_interval_ms(&self.schedule, index);
            let due = match simulator.node(index) {
                Some(node) => now.saturating_sub(node.last_tx_ms) >= interval,
                None => false,
            };
            if !due {
                continue;
            }

            if !self.is_channel_free(clock) {
                self.stats.deferred = self.stats.deferred.saturating_add(1);
                let backoff = self.rng.gen_range(DEFER_BACKOFF_MS.0..DEFER_BACKOFF_MS.1);
                debug!("Slot {} deferred, backing off {} ms", index, backoff);
                clock.delay(backoff);
                continue;
            }

            let Some(node) = simulator.node_mut(index) else {
                continue;
            };
            if self.transmit_node(node) {
                node.last_tx_ms = now;
                node.sequence_number = node.sequence_number.wrapping_add(1);
                node.tx_count = node.tx_count.saturating_add(1);
                self.stats.sent = self.stats.sent.saturating_add(1);
                info!(
                    "[{}] TX ok (seq {}, rssi {} dBm)",
                    node.node_id, node.sequence_number, node.last_rssi
                );
            } else {
                self.stats.failed = self.stats.failed.saturating_add(1);
                warn!("[{}] TX failed", node.node_id);
            }
            clock.delay(INTER_NODE_PAUSE_MS);
        }
    }

    /// Listen-before-talk: the channel is free when every sample is at or
    /// below [`CHANNEL_BUSY_THRESHOLD_DBM`].
    pub fn is_channel_free(&mut self, clock: &dyn Clock) -> bool {
        for _ in 0..CHANNEL_SAMPLES {
            let rssi = self.radio.sense_channel();
            if rssi > CHANNEL_BUSY_THRESHOLD_DBM {
                let backoff = self.rng.gen_range(SENSE_BACKOFF_MS.0..SENSE_BACKOFF_MS.1);
                debug!("Channel busy ({} dBm), waiting {} ms", rssi, backoff);
                clock.delay(backoff);
                return false;
            }
            clock.delay(CHANNEL_SAMPLE_PAUSE_MS);
        }
        true
    }

    /// Encode `node` and send it. Only `last_rssi` is touched here; the
    /// remaining bookkeeping belongs to [`Self::update`].
    pub fn transmit_node(&mut self, node: &mut Node) -> bool {
        let rssi_dbm = self.rng.gen_range(self.schedule.rssi_min_dbm..self.schedule.rssi_max_dbm);
        let packet = match encode_packet::<ActiveLayout>(node, self.schedule.team_id, rssi_dbm) {
            Ok(packet) => packet,
            Err(e) => {
                error!("[{}] {}", node.node_id, e);
                return false;
            }
        };
        let hex = to_hex_string(&packet);
        if log_enabled!(Level::Debug) {
            match decode_packet::<ActiveLayout>(&packet) {
                Ok(p) => debug!(
                    "[{}] payload {} (soil {}%, temp {:.1}°C, hum {}%, irrigation {}, rssi {} dBm)",
                    node.node_id, hex, p.soil_moisture, p.temperature_c, p.humidity, p.irrigation, p.rssi_dbm
                ),
                Err(e) => debug!("[{}] payload {} ({})", node.node_id, hex, e),
            }
        }

        let frame = match self.radio_config.payload_format {
            PayloadFormat::Binary => packet.as_slice(),
            PayloadFormat::Hex => hex.as_bytes(),
        };
        self.radio.begin_send();
        self.radio.write_bytes(frame);
        if !self.radio.end_send(true) {
            return false;
        }
        node.last_rssi = self.radio.last_rssi();
        true
    }

    pub fn statistics(&self) -> TxStatistics {
        self.stats
    }

    #[cfg(test)]
    pub fn radio(&self) -> &D {
        &self.radio
    }

    #[cfg(test)]
    pub fn radio_mut(&mut self) -> &mut D {
        &mut self.radio
    }
}
