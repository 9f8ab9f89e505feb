//! Radio transceiver abstraction.
//!
//! The transmitter only talks to the radio through [`RadioDevice`], which
//! mirrors the primitives of an SX127x driver: begin, configure, carrier sense,
//! and a blocking packet send. Implementations:
//!
//! - `simulated`: host-side transceiver model (airtime, path loss, channel noise)
//! - `scripted`: canned-response test double (tests only)

use serde::Deserialize;

pub mod signal_calculations;
pub mod simulated;

#[cfg(test)]
pub mod scripted;

pub use signal_calculations::LoraParameters;
pub use simulated::SimulatedRadio;

/// Largest frame the modem accepts in one packet.
pub const MAX_FRAME_SIZE: usize = 255;

/// Error type for radio bring-up failures.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioError {
    /// The chip did not answer on the bus.
    NotResponding,
    /// Requested carrier frequency is outside what the chip can tune.
    UnsupportedFrequency(u32),
}

impl std::fmt::Display for RadioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadioError::NotResponding => write!(f, "Radio chip not responding"),
            RadioError::UnsupportedFrequency(hz) => write!(f, "Unsupported frequency: {:.1} MHz", *hz as f64 / 1e6),
        }
    }
}

impl std::error::Error for RadioError {}

/// SPI and control wiring of the transceiver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioPins {
    pub sck: u8,
    pub miso: u8,
    pub mosi: u8,
    pub cs: u8,
    pub rst: u8,
    pub dio0: u8,
}

impl Default for RadioPins {
    fn default() -> Self {
        Self {
            sck: 4,
            miso: 5,
            mosi: 6,
            cs: 7,
            rst: 10,
            dio0: 2,
        }
    }
}

/// How an encoded packet is framed on air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Raw packet bytes.
    #[default]
    Binary,
    /// Upper-case ASCII hex of the packet bytes.
    Hex,
}

/// Blocking transceiver primitives used by the transmitter.
pub trait RadioDevice {
    /// Reset the chip and tune it to `frequency_hz`.
    fn begin(&mut self, frequency_hz: u32, pins: &RadioPins) -> Result<(), RadioError>;

    /// Apply modem settings. Only valid after a successful `begin`.
    fn configure(&mut self, params: &LoraParameters);

    /// Current signal strength on the channel (dBm).
    fn sense_channel(&mut self) -> i16;

    /// Start assembling a new outgoing packet.
    fn begin_send(&mut self);

    /// Append bytes to the packet being assembled.
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Transmit the assembled packet. With `wait_for_completion` the call
    /// blocks until the modem reports TX done or times out.
    fn end_send(&mut self, wait_for_completion: bool) -> bool;

    /// Signal strength reported for the last completed packet (dBm).
    fn last_rssi(&self) -> i16;
}

/// Upper-case hex rendering of a packet.
pub fn to_hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
