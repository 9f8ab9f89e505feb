//! Station temperature probe and its periodic upload.
//!
//! The probe is read with one blocking call per interval. Readings are
//! checked against the DS18B20 limits before anything is posted, and nothing
//! is posted while the wall clock is unsynchronized.

use log::{debug, warn};
use rand::Rng;
use rand_distr::{Distribution, Normal};

pub mod sink;

pub use sink::DataSink;

use crate::config::ProbeConfig;
use crate::time_driver::Clock;

/// Value a DS18B20 reports when it drops off the bus (°C).
pub const DISCONNECTED_C: f32 = -127.0;
/// Measurable range of the probe (°C).
pub const MIN_VALID_C: f32 = -55.0;
pub const MAX_VALID_C: f32 = 125.0;

/// Standard deviation of simulated readings around the configured mean (°C).
const SIMULATED_SIGMA_C: f32 = 0.4;

#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    Disconnected,
    NotFinite,
    OutOfRange(f32),
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorError::Disconnected => write!(f, "Probe disconnected"),
            SensorError::NotFinite => write!(f, "Probe returned a non-finite value"),
            SensorError::OutOfRange(c) => write!(f, "Probe reading {:.2} °C outside {}..{} °C", c, MIN_VALID_C, MAX_VALID_C),
        }
    }
}

impl std::error::Error for SensorError {}

/// Blocking single-value temperature read (°C), sentinel values included.
pub trait TemperatureProbe {
    fn read_celsius(&mut self) -> f32;
}

/// Reject the disconnect sentinel and anything the probe cannot measure.
pub fn validate_reading(celsius: f32) -> Result<f32, SensorError> {
    if !celsius.is_finite() {
        return Err(SensorError::NotFinite);
    }
    if celsius == DISCONNECTED_C {
        return Err(SensorError::Disconnected);
    }
    if !(MIN_VALID_C..=MAX_VALID_C).contains(&celsius) {
        return Err(SensorError::OutOfRange(celsius));
    }
    Ok(celsius)
}

/// DS18B20 stand-in: normally distributed readings, occasional dropout.
pub struct SimulatedDs18b20<R: Rng> {
    mean_c: f32,
    disconnect_probability: f64,
    rng: R,
}

impl<R: Rng> SimulatedDs18b20<R> {
    pub fn new(config: &ProbeConfig, rng: R) -> Self {
        Self {
            mean_c: config.simulated_mean_c,
            disconnect_probability: config.disconnect_probability,
            rng,
        }
    }
}

impl<R: Rng> TemperatureProbe for SimulatedDs18b20<R> {
    fn read_celsius(&mut self) -> f32 {
        if self.rng.gen_bool(self.disconnect_probability) {
            return DISCONNECTED_C;
        }
        match Normal::new(self.mean_c, SIMULATED_SIGMA_C) {
            Ok(normal) => normal.sample(&mut self.rng),
            Err(_) => self.mean_c,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStatistics {
    pub readings: u32,
    pub invalid: u32,
    pub uploaded: u32,
    pub upload_failures: u32,
    /// Valid readings dropped because the wall clock was unsynchronized.
    pub skipped_unsynced: u32,
}

pub struct ProbeMonitor<P: TemperatureProbe, S: DataSink> {
    probe: P,
    sink: S,
    read_interval_ms: u64,
    last_read_ms: u64,
    stats: ProbeStatistics,
}

impl<P: TemperatureProbe, S: DataSink> ProbeMonitor<P, S> {
    pub fn new(probe: P, sink: S, read_interval_ms: u64) -> Self {
        Self {
            probe,
            sink,
            read_interval_ms,
            last_read_ms: 0,
            stats: ProbeStatistics::default(),
        }
    }

    /// Read and upload once per interval. Returns the reading when it was valid.
    pub fn update(&mut self, clock: &dyn Clock) -> Option<f32> {
        let now = clock.millis();
        if now.saturating_sub(self.last_read_ms) < self.read_interval_ms {
            return None;
        }
        self.last_read_ms = now;
        self.stats.readings = self.stats.readings.saturating_add(1);

        let celsius = match validate_reading(self.probe.read_celsius()) {
            Ok(c) => c,
            Err(e) => {
                self.stats.invalid = self.stats.invalid.saturating_add(1);
                warn!("{}", e);
                return None;
            }
        };

        let Some(timestamp) = clock.timestamp_string() else {
            self.stats.skipped_unsynced = self.stats.skipped_unsynced.saturating_add(1);
            debug!("Probe reading {:.2} °C not uploaded: clock unsynchronized", celsius);
            return Some(celsius);
        };

        match self.sink.post(celsius, &timestamp) {
            Ok(()) => {
                self.stats.uploaded = self.stats.uploaded.saturating_add(1);
                debug!("Probe reading {:.2} °C uploaded ({})", celsius, timestamp);
            }
            Err(e) => {
                self.stats.upload_failures = self.stats.upload_failures.saturating_add(1);
                warn!("Probe upload failed: {}", e);
            }
        }
        Some(celsius)
    }

    pub fn statistics(&self) -> ProbeStatistics {
        self.stats
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::sink::SinkError;
    use crate::time_driver::ManualClock;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::VecDeque;

    struct QueuedProbe(VecDeque<f32>);

    impl TemperatureProbe for QueuedProbe {
        fn read_celsius(&mut self) -> f32 {
            self.0.pop_front().unwrap_or(20.0)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        posted: Vec<(f32, String)>,
        fail: bool,
    }

    impl DataSink for RecordingSink {
        fn post(&mut self, value: f32, timestamp: &str) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Status(503, "busy".to_string()));
            }
            self.posted.push((value, timestamp.to_string()));
            Ok(())
        }
    }

    fn synced_clock() -> ManualClock {
        let clock = ManualClock::new();
        clock.set_wall(NaiveDate::from_ymd_opt(2025, 3, 1).and_then(|d| d.and_hms_opt(12, 0, 0)));
        clock
    }

    fn monitor(readings: &[f32], sink: RecordingSink) -> ProbeMonitor<QueuedProbe, RecordingSink> {
        ProbeMonitor::new(QueuedProbe(readings.iter().copied().collect()), sink, 5_000)
    }

    #[test]
    fn validation_rejects_sentinel_and_out_of_range() {
        assert_eq!(validate_reading(DISCONNECTED_C), Err(SensorError::Disconnected));
        assert_eq!(validate_reading(f32::NAN), Err(SensorError::NotFinite));
        assert_eq!(validate_reading(126.0), Err(SensorError::OutOfRange(126.0)));
        assert_eq!(validate_reading(-55.0), Ok(-55.0));
        assert_eq!(validate_reading(125.0), Ok(125.0));
    }

    #[test]
    fn valid_reading_is_posted_with_wall_clock_timestamp() {
        let clock = synced_clock();
        let mut monitor = monitor(&[21.5], RecordingSink::default());

        clock.advance(5_000);
        assert_eq!(monitor.update(&clock), Some(21.5));
        assert_eq!(monitor.sink().posted, vec![(21.5, "2025-03-01 12:00:05".to_string())]);
        assert_eq!(monitor.statistics().uploaded, 1);
    }

    #[test]
    fn reads_only_once_per_interval() {
        let clock = synced_clock();
        let mut monitor = monitor(&[21.0, 22.0], RecordingSink::default());

        clock.advance(5_000);
        monitor.update(&clock);
        clock.advance(4_999);
        assert_eq!(monitor.update(&clock), None);
        clock.advance(1);
        assert_eq!(monitor.update(&clock), Some(22.0));
        assert_eq!(monitor.statistics().readings, 2);
    }

    #[test]
    fn disconnected_probe_posts_nothing() {
        let clock = synced_clock();
        let mut monitor = monitor(&[DISCONNECTED_C], RecordingSink::default());

        clock.advance(5_000);
        assert_eq!(monitor.update(&clock), None);
        assert!(monitor.sink().posted.is_empty());
        assert_eq!(monitor.statistics().invalid, 1);
    }

    #[test]
    fn unsynchronized_clock_skips_upload() {
        let clock = ManualClock::new();
        let mut monitor = monitor(&[21.5], RecordingSink::default());

        clock.advance(5_000);
        assert_eq!(monitor.update(&clock), Some(21.5));
        assert!(monitor.sink().posted.is_empty());
        assert_eq!(monitor.statistics().skipped_unsynced, 1);
    }

    #[test]
    fn sink_failure_is_counted() {
        let clock = synced_clock();
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let mut monitor = monitor(&[21.5], sink);

        clock.advance(5_000);
        assert_eq!(monitor.update(&clock), Some(21.5));
        assert_eq!(monitor.statistics().upload_failures, 1);
    }

    #[test]
    fn simulated_probe_reads_near_mean() {
        let config = ProbeConfig {
            simulated_mean_c: 18.0,
            disconnect_probability: 0.0,
            ..ProbeConfig::default()
        };
        let mut probe = SimulatedDs18b20::new(&config, StdRng::seed_from_u64(9));
        for _ in 0..200 {
            let c = probe.read_celsius();
            assert!((c - 18.0).abs() < 3.0, "{}", c);
        }
    }

    #[test]
    fn simulated_probe_can_drop_off_the_bus() {
        let config = ProbeConfig {
            disconnect_probability: 1.0,
            ..ProbeConfig::default()
        };
        let mut probe = SimulatedDs18b20::new(&config, StdRng::seed_from_u64(9));
        assert_eq!(probe.read_celsius(), DISCONNECTED_C);
    }
}
