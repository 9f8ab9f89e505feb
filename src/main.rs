use anyhow::Context;
use env_logger::Builder;
use log::{LevelFilter, info};
use std::path::{Path, PathBuf};
use std::rc::Rc;

mod config;
mod probe;
mod radio;
mod simulation;
mod station;
mod time_driver;
mod transmission;

use config::SimulatorConfig;
use probe::{ProbeMonitor, SimulatedDs18b20, sink};
use radio::SimulatedRadio;
use radio::signal_calculations::{air_time_ms, duty_cycle_percent};
use simulation::NODE_COUNT;
use station::{GroundStation, halt, seeded_rng};
use time_driver::{Clock, SystemClock};
use transmission::payload::{ActiveLayout, PayloadLayout, packet_size};

const DEFAULT_CONFIG_PATH: &str = "agrinode.toml";

/// Seed offsets for the host-only random sources.
const RADIO_SEED_OFFSET: u64 = 2;
const PROBE_SEED_OFFSET: u64 = 3;

/// First CLI argument, else `agrinode.toml` when present, else built-in defaults.
fn load_config() -> anyhow::Result<SimulatorConfig> {
    match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => SimulatorConfig::load(&path).with_context(|| format!("Loading {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            SimulatorConfig::load(Path::new(DEFAULT_CONFIG_PATH)).with_context(|| format!("Loading {}", DEFAULT_CONFIG_PATH))
        }
        None => {
            info!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
            Ok(SimulatorConfig::default())
        }
    }
}

fn print_banner(config: &SimulatorConfig) {
    let lora = &config.radio.lora;
    let size = packet_size::<ActiveLayout>();
    let base_interval = config.schedule.tx_interval_base_ms.max(config.schedule.min_tx_interval_ms);
    info!("==========================================");
    info!(" AgriNode ground station simulator v{}", env!("CARGO_PKG_VERSION"));
    info!("==========================================");
    info!("Team id: {}", config.schedule.team_id);
    info!("Nodes: {} (ids {}..)", NODE_COUNT, config.fleet.base_node_id);
    info!("Payload: {} layout, {} bytes", ActiveLayout::NAME, size);
    info!(
        "Radio: {:.1} MHz, SF{}, BW {:.1} kHz, {} dBm",
        config.radio.frequency_hz as f64 / 1e6,
        lora.spreading_factor,
        lora.bandwidth as f64 / 1e3,
        lora.tx_power_dbm
    );
    info!(
        "Airtime {} ms per packet, duty cycle {:.3} % at {} ms",
        air_time_ms(lora, size),
        duty_cycle_percent(lora, size, base_interval),
        base_interval
    );
    info!("Simulation speed: {} %", config.clock.speed_percent);
}

fn main() -> anyhow::Result<()> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("agrinode_radio_simulator"), LevelFilter::Debug)
        .parse_env("RUST_LOG")
        .init();

    let config = load_config()?;
    print_banner(&config);

    let clock = Rc::new(SystemClock::new(config.clock.speed_percent, config.clock.time_sync));
    let seed = config.simulation.seed;

    let radio_clock: Rc<dyn Clock> = clock.clone();
    let radio = SimulatedRadio::new(radio_clock, config.radio.simulation.clone(), seeded_rng(seed, RADIO_SEED_OFFSET));

    let probe = config.probe.enabled.then(|| {
        ProbeMonitor::new(
            SimulatedDs18b20::new(&config.probe, seeded_rng(seed, PROBE_SEED_OFFSET)),
            sink::sink_for(config.probe.sink_url.as_deref()),
            config.probe.read_interval_ms,
        )
    });

    let mut station = GroundStation::new(&config, radio, probe);
    if let Err(e) = station.begin(&*clock) {
        halt(&*clock, &e);
    }

    station.run(&*clock, config.run.max_ticks);
    Ok(())
}
