//! Time sources for the simulation.
//!
//! Everything that reads time or sleeps goes through [`Clock`]. The host
//! implementation maps real time onto a virtual uptime that can run faster or
//! slower than real time; the wall clock is only trusted when time sync is
//! enabled and reports a plausible year.

use chrono::{Datelike, Local, NaiveDateTime, Timelike, Utc};
use std::time::{Duration, Instant};

/// Wall-clock readings from before this year mean the clock was never set.
pub const MIN_PLAUSIBLE_YEAR: i32 = 2020;

// Fixed-point Q32.32 for speed scaling. 1.0 == 1<<32
const ONE_Q32: u64 = 1u64 << 32;

pub trait Clock {
    /// Monotonic uptime in milliseconds.
    fn millis(&self) -> u64;

    /// Block the whole process for `ms` milliseconds of uptime.
    fn delay(&self, ms: u64);

    /// Local wall-clock time, `None` when unsynchronized.
    fn local_time(&self) -> Option<NaiveDateTime>;

    /// Unix time in seconds, 0 when unsynchronized.
    fn unix_seconds(&self) -> u32;

    /// Local hour of day in `[0, 24)`, `None` unless the wall clock is plausible.
    fn local_hour(&self) -> Option<f32> {
        plausible(self.local_time()).map(|t| t.hour() as f32 + t.minute() as f32 / 60.0 + t.second() as f32 / 3600.0)
    }

    /// Local time formatted as `YYYY-MM-DD HH:MM:SS`.
    fn timestamp_string(&self) -> Option<String> {
        plausible(self.local_time()).map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

fn plausible(time: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    time.filter(|t| t.year() >= MIN_PLAUSIBLE_YEAR)
}

/// Host clock: scaled `Instant` uptime plus the system wall clock.
#[derive(Debug)]
pub struct SystemClock {
    origin_real: Instant,
    scale_q32: u64,
    time_sync: bool,
}

impl SystemClock {
    /// `speed_percent` of 100 runs in real time; 1000 runs ten times faster.
    pub fn new(speed_percent: u32, time_sync: bool) -> Self {
        let percent = speed_percent.clamp(1, 1000);
        Self {
            origin_real: Instant::now(),
            scale_q32: ((percent as u128) * (ONE_Q32 as u128) / 100u128) as u64,
            time_sync,
        }
    }

    fn real_to_virtual(&self, real: Duration) -> Duration {
        let scaled_ns = real.as_nanos() * (self.scale_q32 as u128) / (ONE_Q32 as u128);
        Duration::from_nanos(scaled_ns.min(u64::MAX as u128) as u64)
    }

    fn virtual_to_real(&self, virt: Duration) -> Duration {
        let real_ns = virt.as_nanos() * (ONE_Q32 as u128) / (self.scale_q32 as u128);
        Duration::from_nanos(real_ns.min(u64::MAX as u128) as u64)
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        self.real_to_virtual(self.origin_real.elapsed()).as_millis() as u64
    }

    fn delay(&self, ms: u64) {
        std::thread::sleep(self.virtual_to_real(Duration::from_millis(ms)));
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        self.time_sync.then(|| Local::now().naive_local())
    }

    fn unix_seconds(&self) -> u32 {
        if !self.time_sync {
            return 0;
        }
        let now = Utc::now();
        if now.year() < MIN_PLAUSIBLE_YEAR {
            return 0;
        }
        u32::try_from(now.timestamp()).unwrap_or(0)
    }
}

#[cfg(test)]
pub use manual::ManualClock;
