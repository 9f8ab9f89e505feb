//! Radio signal and timing calculations.
//!
//! Contains helpers for:
//! - Log-distance path loss with optional log-normal shadowing
//! - LoRa airtime (SX127x formula, explicit header)
//! - Duty-cycle estimates for a given transmit interval
//!
//! Units:
//! - Power: dBm
//! - Time: seconds (f32) for mathematical expressions, milliseconds (u64) at the API edge
//! - Distance: meters

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

/// Parameters defining the radio channel propagation model.
///
/// Constants of the log-distance path loss model with log-normal shadowing.
/// They determine how the signal strength reported after a send decays with
/// the distance to the receiving station.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathLossParameters {
    /// Path loss exponent (n).
    ///
    /// - n = 2.0: Free space (vacuum)
    /// - n = 2.7 to 3.5: Urban areas
    /// - n = 3.0 to 5.0: Indoor obstructed environments
    pub path_loss_exponent: f32,

    /// Standard deviation for log-normal shadowing (σ) in dB. 0.0 disables shadowing.
    pub shadowing_sigma: f32,

    /// Path loss at the reference distance d₀ (1 meter) in dB.
    pub path_loss_at_reference_distance: f32,

    /// The thermal noise floor of the receiver in dBm.
    ///
    /// Also what an idle channel reads during carrier sense.
    pub noise_floor: f32,
}

impl Default for PathLossParameters {
    fn default() -> Self {
        Self {
            path_loss_exponent: 2.7,
            shadowing_sigma: 4.0,
            path_loss_at_reference_distance: 40.0,
            noise_floor: -120.0,
        }
    }
}

/// LoRa modem settings applied by `RadioDevice::configure`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoraParameters {
    pub tx_power_dbm: i8,
    /// Signal bandwidth in Hz.
    pub bandwidth: u32,
    pub spreading_factor: u8,
    /// Number of preamble symbols (typically 8 for LoRa)
    pub preamble_length: u16,
    pub sync_word: u8,
    /// Coding rate denominator, 5..=8 for 4/5..4/8.
    pub coding_rate: u8,
    pub crc_enabled: bool,
    // Low Data Rate Optimization (DE) flag; typically enabled when T_sym >= 16ms
    pub low_data_rate_optimization: bool,
}

impl Default for LoraParameters {
    fn default() -> Self {
        Self {
            tx_power_dbm: 20,
            bandwidth: 125_000,
            spreading_factor: 7,
            preamble_length: 8,
            sync_word: 0x12,
            coding_rate: 5,
            crc_enabled: true,
            low_data_rate_optimization: false,
        }
    }
}

/// Calculate the path loss (in dB) at a given distance using a log-distance
/// path loss model with log-normal shadowing.
///
/// # Formula
///
/// ```text
/// PL(d) = PL(d₀) + 10 × n × log₁₀(d/d₀) + X_σ
/// where d₀ = 1 meter (reference distance)
/// ```
///
/// `X_σ` is sampled from Normal(0, σ) using the supplied generator, so repeated
/// calls with the same distance yield different results unless σ is 0.
///
/// Distances below 1 meter return the reference path loss.
pub fn calculate_path_loss<R: Rng>(distance: f32, params: &PathLossParameters, rng: &mut R) -> f32 {
    if distance < 1.0 {
        return params.path_loss_at_reference_distance;
    }
    let path_loss = params.path_loss_at_reference_distance + 10.0 * params.path_loss_exponent * distance.log10();
    // Sample log-normal shadowing as a Normal(0, sigma) in dB
    let shadowing = match Normal::new(0.0_f32, params.shadowing_sigma) {
        Ok(normal) if params.shadowing_sigma > 0.0 => normal.sample(rng),
        _ => 0.0,
    };
    path_loss + shadowing
}

/// Instantaneous RSSI (in dBm) at a given distance: `P_tx(dBm) - PL(dB)`.
///
/// Stochastic whenever shadowing is enabled.
pub fn calculate_rssi<R: Rng>(distance: f32, tx_power_dbm: f32, params: &PathLossParameters, rng: &mut R) -> f32 {
    tx_power_dbm - calculate_path_loss(distance, params, rng)
}

/// LoRa time on air in seconds for a payload of `payload_size` bytes.
pub fn calculate_air_time(lora_parameters: &LoraParameters, payload_size: usize) -> f32 {
    // LoRa symbol time in seconds: T_sym = 2^SF / BW
    let symbol_time = 2.0_f32.powi(lora_parameters.spreading_factor as i32) / lora_parameters.bandwidth as f32;

    // Effective preamble duration: (N_preamble + 4.25) * T_sym
    let preamble_time = (lora_parameters.preamble_length as f32 + 4.25) * symbol_time;

    // Payload symbol count, SX127x datasheet formula
    // N_payload = 8 + max( ceil((8*PL - 4*SF + 28 + 16*CRC - 20*IH) / (4 * (SF - 2*DE))) * (CR + 4), 0 )
    let sf = lora_parameters.spreading_factor as f32;
    let pl = payload_size as f32;
    let crc = if lora_parameters.crc_enabled { 1.0 } else { 0.0 };
    let de = if lora_parameters.low_data_rate_optimization { 1.0 } else { 0.0 };
    let ih = 0.0_f32; // explicit header
    let cr = lora_parameters.coding_rate.saturating_sub(4) as f32; // 1..4 representing 4/5..4/8

    let denom = 4.0 * (sf - 2.0 * de);
    let numerator = 8.0 * pl - 4.0 * sf + 28.0 + 16.0 * crc - 20.0 * ih;
    let base = (numerator / denom).ceil();
    let payload_symbols = 8.0 + (base * (cr + 4.0)).max(0.0);

    preamble_time + payload_symbols * symbol_time
}

/// Time on air rounded up to whole milliseconds.
pub fn air_time_ms(lora_parameters: &LoraParameters, payload_size: usize) -> u64 {
    (calculate_air_time(lora_parameters, payload_size) * 1000.0).ceil() as u64
}

/// Share of time (%) the channel is occupied when one packet of
/// `payload_size` bytes is sent every `interval_ms`.
pub fn duty_cycle_percent(lora_parameters: &LoraParameters, payload_size: usize, interval_ms: u64) -> f32 {
    if interval_ms == 0 {
        return 100.0;
    }
    (calculate_air_time(lora_parameters, payload_size) * 1000.0 / interval_ms as f32 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn params_sf_bw(sf: u8, bw: u32) -> LoraParameters {
        LoraParameters {
            spreading_factor: sf,
            bandwidth: bw,
            ..LoraParameters::default()
        }
    }

    fn no_shadowing() -> PathLossParameters {
        PathLossParameters {
            path_loss_exponent: 2.0,
            shadowing_sigma: 0.0,
            path_loss_at_reference_distance: 40.0,
            noise_floor: -120.0,
        }
    }

    #[test]
    fn airtime_increases_with_payload_and_sf() {
        let mut lp = params_sf_bw(7, 125_000);
        let t_small = calculate_air_time(&lp, 12);
        let t_big = calculate_air_time(&lp, 100);
        assert!(t_big > t_small);

        lp.spreading_factor = 9;
        let t_sf9 = calculate_air_time(&lp, 12);
        assert!(t_sf9 > t_small);
    }

    #[test]
    fn sf7_twelve_byte_packet_matches_reference_airtime() {
        // Semtech calculator: SF7, BW125, CR4/5, 8 preamble, CRC on, 12 bytes ≈ 41.2 ms
        let lp = params_sf_bw(7, 125_000);
        let t = calculate_air_time(&lp, 12) * 1000.0;
        assert!((t - 41.216).abs() < 0.5, "{}", t);
        assert_eq!(air_time_ms(&lp, 12), 42);
    }

    #[test]
    fn duty_cycle_scales_inverse_with_interval() {
        let lp = params_sf_bw(7, 125_000);
        let d_short = duty_cycle_percent(&lp, 16, 20_000);
        let d_long = duty_cycle_percent(&lp, 16, 60_000);
        assert!(d_short > d_long);
        assert!(d_short < 1.0);
        assert_eq!(duty_cycle_percent(&lp, 16, 0), 100.0);
    }

    #[test]
    fn path_loss_follows_log_distance_without_shadowing() {
        let mut rng = StdRng::seed_from_u64(1);
        let pl = no_shadowing();
        assert_eq!(calculate_path_loss(0.5, &pl, &mut rng), 40.0);
        assert!((calculate_path_loss(10.0, &pl, &mut rng) - 60.0).abs() < 1e-4);
        assert!((calculate_path_loss(1000.0, &pl, &mut rng) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn rssi_drops_with_distance() {
        let mut rng = StdRng::seed_from_u64(2);
        let pl = no_shadowing();
        let near = calculate_rssi(100.0, 20.0, &pl, &mut rng);
        let far = calculate_rssi(2000.0, 20.0, &pl, &mut rng);
        assert!(near > far);
        assert!((near - (-60.0)).abs() < 1e-3);
    }
}
