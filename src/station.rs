//! Ground-station driver loop.
//!
//! One tick advances the simulator, runs the transmission scheduler, services
//! the probe monitor and periodically logs statistics, then pauses for a
//! fixed tick period. Everything runs on the calling thread.

use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::SimulatorConfig;
use crate::probe::{DataSink, ProbeMonitor, TemperatureProbe};
use crate::radio::{RadioDevice, RadioError};
use crate::simulation::NodeSimulator;
use crate::time_driver::Clock;
use crate::transmission::LoRaTransmitter;

/// Pause at the end of every tick (ms).
pub const TICK_MS: u64 = 50;
/// Period of the fatal-error report while halted (ms).
const HALT_REPORT_MS: u64 = 2_000;

/// Offsets applied to the configured seed so each random source gets its own stream.
const SIMULATOR_SEED_OFFSET: u64 = 0;
const SCHEDULER_SEED_OFFSET: u64 = 1;

pub fn seeded_rng(seed: u64, offset: u64) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(offset))
}

pub struct GroundStation<D: RadioDevice, P: TemperatureProbe, S: DataSink> {
    simulator: NodeSimulator<StdRng>,
    transmitter: LoRaTransmitter<D, StdRng>,
    probe: Option<ProbeMonitor<P, S>>,
    stats_interval_ms: u64,
    last_stats_ms: u64,
    ticks: u64,
}

impl<D: RadioDevice, P: TemperatureProbe, S: DataSink> GroundStation<D, P, S> {
    pub fn new(config: &SimulatorConfig, radio: D, probe: Option<ProbeMonitor<P, S>>) -> Self {
        let seed = config.simulation.seed;
        Self {
            simulator: NodeSimulator::new(
                &config.simulation,
                config.fleet.clone(),
                config.ranges.clone(),
                seeded_rng(seed, SIMULATOR_SEED_OFFSET),
            ),
            transmitter: LoRaTransmitter::new(
                radio,
                config.radio.clone(),
                config.schedule.clone(),
                seeded_rng(seed, SCHEDULER_SEED_OFFSET),
            ),
            probe,
            stats_interval_ms: config.run.stats_interval_ms,
            last_stats_ms: 0,
            ticks: 0,
        }
    }

    /// Seed the fleet and bring up the radio.
    pub fn begin(&mut self, clock: &dyn Clock) -> Result<(), RadioError> {
        self.simulator.begin(clock);
        self.transmitter.begin()?;
        self.last_stats_ms = clock.millis();
        Ok(())
    }

    pub fn tick(&mut self, clock: &dyn Clock) {
        self.simulator.update(clock);
        self.transmitter.update(&mut self.simulator, clock);
        if let Some(probe) = self.probe.as_mut() {
            probe.update(clock);
        }

        let now = clock.millis();
        if self.stats_interval_ms > 0 && now.saturating_sub(self.last_stats_ms) >= self.stats_interval_ms {
            self.last_stats_ms = now;
            self.print_statistics(clock);
        }

        self.ticks += 1;
        clock.delay(TICK_MS);
    }

    /// Tick until `max_ticks` ticks ran; 0 runs forever.
    pub fn run(&mut self, clock: &dyn Clock, max_ticks: u64) {
        while max_ticks == 0 || self.ticks < max_ticks {
            self.tick(clock);
        }
        info!("Stopping after {} ticks", self.ticks);
        self.print_statistics(clock);
    }

    pub fn print_statistics(&self, clock: &dyn Clock) {
        info!("======== Statistics ========");
        info!("Uptime: {} min", clock.millis() / 60_000);
        info!("TX statistics: {}", self.transmitter.statistics());
        if let Some(probe) = self.probe.as_ref() {
            let stats = probe.statistics();
            info!(
                "Probe: {} readings, {} invalid, {} uploaded, {} upload failures, {} skipped (clock unsynchronized)",
                stats.readings, stats.invalid, stats.uploaded, stats.upload_failures, stats.skipped_unsynced
            );
        }
        self.simulator.print_all_nodes();
    }

    #[cfg(test)]
    pub fn simulator(&self) -> &NodeSimulator<StdRng> {
        &self.simulator
    }

    #[cfg(test)]
    pub fn transmitter(&self) -> &LoRaTransmitter<D, StdRng> {
        &self.transmitter
    }

    #[cfg(test)]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

/// Radio bring-up failure is fatal: report it forever, never retry.
pub fn halt(clock: &dyn Clock, err: &RadioError) -> ! {
    loop {
        error!("Radio initialization failed: {}. System halted.", err);
        clock.delay(HALT_REPORT_MS);
    }
}
