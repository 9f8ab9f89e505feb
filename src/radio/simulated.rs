//! Host-side transceiver model.
//!
//! Stands in for an SX127x module so the whole fleet runs without hardware:
//! - `begin` fails when the chip is configured as unresponsive or the carrier
//!   frequency is outside the tunable band
//! - carrier sense reads the noise floor, or a foreign transmission with the
//!   configured probability
//! - a send blocks for the LoRa time on air and fails at random
//! - the RSSI reported after a send follows the log-distance path loss model

use log::{debug, info, warn};
use rand::Rng;
use std::rc::Rc;

use super::signal_calculations::{LoraParameters, air_time_ms, calculate_rssi};
use super::{MAX_FRAME_SIZE, RadioDevice, RadioError, RadioPins};
use crate::config::RadioSimulationConfig;
use crate::time_driver::Clock;

/// Tunable carrier range of the modelled chip (Hz).
const MIN_FREQUENCY_HZ: u32 = 137_000_000;
const MAX_FREQUENCY_HZ: u32 = 1_020_000_000;

/// Reset pulse and settle times used during `begin` (ms).
const RESET_PULSE_MS: u64 = 10;
const RESET_SETTLE_MS: u64 = 100;

/// Signal strength range of a foreign transmission seen by carrier sense (dBm).
const FOREIGN_CARRIER_MIN_DBM: i16 = -85;
const FOREIGN_CARRIER_MAX_DBM: i16 = -60;

pub struct SimulatedRadio<R: Rng> {
    clock: Rc<dyn Clock>,
    settings: RadioSimulationConfig,
    params: LoraParameters,
    initialized: bool,
    frame: Option<Vec<u8>>,
    last_rssi: i16,
    rng: R,
}

impl<R: Rng> SimulatedRadio<R> {
    pub fn new(clock: Rc<dyn Clock>, settings: RadioSimulationConfig, rng: R) -> Self {
        Self {
            clock,
            settings,
            params: LoraParameters::default(),
            initialized: false,
            frame: None,
            last_rssi: 0,
            rng,
        }
    }
}

impl<R: Rng> RadioDevice for SimulatedRadio<R> {
    fn begin(&mut self, frequency_hz: u32, pins: &RadioPins) -> Result<(), RadioError> {
        debug!(
            "SPI pins: SCK={} MISO={} MOSI={} CS={} RST={} DIO0={}",
            pins.sck, pins.miso, pins.mosi, pins.cs, pins.rst, pins.dio0
        );
        self.clock.delay(RESET_PULSE_MS);
        self.clock.delay(RESET_SETTLE_MS);

        if !self.settings.responding {
            return Err(RadioError::NotResponding);
        }
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency_hz) {
            return Err(RadioError::UnsupportedFrequency(frequency_hz));
        }
        self.initialized = true;
        info!("Radio tuned to {:.1} MHz", frequency_hz as f64 / 1e6);
        Ok(())
    }

    fn configure(&mut self, params: &LoraParameters) {
        if !self.initialized {
            warn!("Radio configure ignored: device not initialized");
            return;
        }
        self.params = params.clone();
    }

    fn sense_channel(&mut self) -> i16 {
        let noise_floor = self.settings.path_loss.noise_floor.round() as i16;
        if self.initialized && self.rng.gen_bool(self.settings.channel_busy_probability) {
            self.rng.gen_range(FOREIGN_CARRIER_MIN_DBM..=FOREIGN_CARRIER_MAX_DBM)
        } else {
            noise_floor + self.rng.gen_range(-3..=3)
        }
    }

    fn begin_send(&mut self) {
        self.frame = Some(Vec::with_capacity(MAX_FRAME_SIZE));
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        match self.frame.as_mut() {
            Some(frame) => frame.extend_from_slice(bytes),
            None => warn!("Radio write ignored: no packet started"),
        }
    }

    fn end_send(&mut self, wait_for_completion: bool) -> bool {
        let Some(frame) = self.frame.take() else {
            warn!("Radio send ignored: no packet started");
            return false;
        };
        if !self.initialized {
            return false;
        }
        if frame.is_empty() || frame.len() > MAX_FRAME_SIZE {
            warn!("Radio send rejected: frame length {} outside 1..={}", frame.len(), MAX_FRAME_SIZE);
            return false;
        }

        let airtime = air_time_ms(&self.params, frame.len());
        if wait_for_completion {
            self.clock.delay(airtime);
        }
        if self.rng.gen_bool(self.settings.send_failure_probability) {
            return false;
        }

        let rssi = calculate_rssi(
            self.settings.link_distance_m,
            self.params.tx_power_dbm as f32,
            &self.settings.path_loss,
            &mut self.rng,
        );
        self.last_rssi = rssi.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        debug!("Radio sent {} bytes in {} ms (rssi {} dBm)", frame.len(), airtime, self.last_rssi);
        true
    }

    fn last_rssi(&self) -> i16 {
        self.last_rssi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::signal_calculations::PathLossParameters;
    use crate::time_driver::ManualClock;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn quiet_settings() -> RadioSimulationConfig {
        RadioSimulationConfig {
            responding: true,
            channel_busy_probability: 0.0,
            send_failure_probability: 0.0,
            link_distance_m: 100.0,
            path_loss: PathLossParameters {
                path_loss_exponent: 2.0,
                shadowing_sigma: 0.0,
                path_loss_at_reference_distance: 40.0,
                noise_floor: -120.0,
            },
        }
    }

    fn radio(clock: &Rc<ManualClock>, settings: RadioSimulationConfig) -> SimulatedRadio<StdRng> {
        let clock: Rc<dyn Clock> = clock.clone();
        SimulatedRadio::new(clock, settings, StdRng::seed_from_u64(3))
    }

    #[test]
    fn unresponsive_chip_fails_begin() {
        let clock = Rc::new(ManualClock::new());
        let mut radio = radio(
            &clock,
            RadioSimulationConfig {
                responding: false,
                ..quiet_settings()
            },
        );
        assert_eq!(radio.begin(915_000_000, &RadioPins::default()), Err(RadioError::NotResponding));
    }

    #[test]
    fn out_of_band_frequency_fails_begin() {
        let clock = Rc::new(ManualClock::new());
        let mut radio = radio(&clock, quiet_settings());
        assert_eq!(
            radio.begin(2_400_000_000, &RadioPins::default()),
            Err(RadioError::UnsupportedFrequency(2_400_000_000))
        );
    }

    #[test]
    fn send_blocks_for_airtime_and_reports_path_loss_rssi() {
        let clock = Rc::new(ManualClock::new());
        let mut radio = radio(&clock, quiet_settings());
        radio.begin(915_000_000, &RadioPins::default()).unwrap();
        radio.configure(&LoraParameters::default());
        let before = clock.millis();

        radio.begin_send();
        radio.write_bytes(&[0u8; 12]);
        assert!(radio.end_send(true));
        assert_eq!(clock.millis() - before, 42);
        // 20 dBm - (40 + 20 * log10(100))
        assert_eq!(radio.last_rssi(), -60);
    }

    #[test]
    fn send_without_begin_send_fails() {
        let clock = Rc::new(ManualClock::new());
        let mut radio = radio(&clock, quiet_settings());
        radio.begin(915_000_000, &RadioPins::default()).unwrap();
        assert!(!radio.end_send(true));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let clock = Rc::new(ManualClock::new());
        let mut radio = radio(&clock, quiet_settings());
        radio.begin(915_000_000, &RadioPins::default()).unwrap();
        radio.begin_send();
        radio.write_bytes(&[0u8; MAX_FRAME_SIZE + 1]);
        assert!(!radio.end_send(true));
    }

    #[test]
    fn certain_failure_keeps_previous_rssi() {
        let clock = Rc::new(ManualClock::new());
        let mut radio = radio(
            &clock,
            RadioSimulationConfig {
                send_failure_probability: 1.0,
                ..quiet_settings()
            },
        );
        radio.begin(915_000_000, &RadioPins::default()).unwrap();
        radio.begin_send();
        radio.write_bytes(b"AGRINODE_BOOT");
        assert!(!radio.end_send(true));
        assert_eq!(radio.last_rssi(), 0);
    }

    #[test]
    fn channel_sense_reflects_busy_probability() {
        let clock = Rc::new(ManualClock::new());
        let mut idle = radio(&clock, quiet_settings());
        idle.begin(915_000_000, &RadioPins::default()).unwrap();
        for _ in 0..100 {
            assert!((-123..=-117).contains(&idle.sense_channel()));
        }

        let mut busy = radio(
            &clock,
            RadioSimulationConfig {
                channel_busy_probability: 1.0,
                ..quiet_settings()
            },
        );
        busy.begin(915_000_000, &RadioPins::default()).unwrap();
        for _ in 0..100 {
            assert!((FOREIGN_CARRIER_MIN_DBM..=FOREIGN_CARRIER_MAX_DBM).contains(&busy.sense_channel()));
        }
    }
}
