//! Binary packet codec for the ground-to-satellite link.
//!
//! Every packet is a 4-byte header followed by one node block, big-endian,
//! without padding:
//!
//! ```text
//! offset  size  field
//!  0      1     magic 0xAB
//!  1      1     magic 0xCD
//!  2      2     team id
//!  4      2     node id
//!  6      1     soil moisture, integer %, clamped to 0..=100
//!  7      2     temperature, round((t + 50.0) * 10) as i16
//!  9      1     humidity, integer %, clamped to 0..=100
//! 10      1     irrigation status ordinal
//! 11      1     rssi_dbm + 128
//! 12      4     collection timestamp, Unix seconds (timestamped layout only)
//! ```
//!
//! The two node-block layouts are separate types. Which one the binary
//! transmits is fixed at build time by the `node-timestamp` feature; sender
//! and receiver must agree on it.

use crate::simulation::types::{IrrigationStatus, Node};

pub const MAGIC_BYTE_1: u8 = 0xAB;
pub const MAGIC_BYTE_2: u8 = 0xCD;
pub const HEADER_SIZE: usize = 4;

/// Encodable temperature range (°C); values outside are clamped first.
pub const TEMPERATURE_MIN_C: f32 = -50.0;
pub const TEMPERATURE_MAX_C: f32 = 163.8;
const TEMPERATURE_OFFSET_C: f64 = 50.0;
const TEMPERATURE_SCALE: f64 = 10.0;

/// Offset applied to RSSI so it fits an unsigned byte.
const RSSI_OFFSET: i32 = 128;

/// Fixed layout of the node block.
pub trait PayloadLayout {
    /// Size of the node block in bytes.
    const NODE_SIZE: usize;
    const NAME: &'static str;

    /// Append layout-specific trailing fields.
    fn write_extension(node: &Node, payload: &mut Vec<u8>);

    /// Read layout-specific trailing fields from a complete node block.
    fn read_extension(node_block: &[u8]) -> Option<u32>;
}

/// Node block without timestamp (8 bytes).
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "node-timestamp", allow(dead_code))]
pub struct CompactLayout;

/// Node block with the trailing 4-byte collection timestamp (12 bytes).
#[derive(Debug, Clone, Copy)]
pub struct TimestampedLayout;

impl PayloadLayout for CompactLayout {
    const NODE_SIZE: usize = 8;
    const NAME: &'static str = "compact";

    fn write_extension(_node: &Node, _payload: &mut Vec<u8>) {}

    fn read_extension(_node_block: &[u8]) -> Option<u32> {
        None
    }
}

impl PayloadLayout for TimestampedLayout {
    const NODE_SIZE: usize = 12;
    const NAME: &'static str = "timestamped";

    fn write_extension(node: &Node, payload: &mut Vec<u8>) {
        payload.extend_from_slice(&node.collected_at.to_be_bytes());
    }

    fn read_extension(node_block: &[u8]) -> Option<u32> {
        let bytes: [u8; 4] = node_block.get(8..12)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }
}

/// Layout transmitted by this build.
#[cfg(feature = "node-timestamp")]
pub type ActiveLayout = TimestampedLayout;
#[cfg(not(feature = "node-timestamp"))]
pub type ActiveLayout = CompactLayout;

/// Total packet size for a layout.
pub fn packet_size<L: PayloadLayout>() -> usize {
    HEADER_SIZE + L::NODE_SIZE
}

#[derive(Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// The packet buffer could not be allocated.
    AllocationFailed(usize),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::AllocationFailed(size) => write!(f, "Failed to allocate {} byte packet buffer", size),
        }
    }
}

impl std::error::Error for EncodeError {}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    WrongLength { expected: usize, actual: usize },
    BadMagic([u8; 2]),
    UnknownIrrigationStatus(u8),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::WrongLength { expected, actual } => write!(f, "Wrong packet length: expected {}, got {}", expected, actual),
            DecodeError::BadMagic(magic) => write!(f, "Bad magic bytes: {:02X} {:02X}", magic[0], magic[1]),
            DecodeError::UnknownIrrigationStatus(value) => write!(f, "Unknown irrigation status: {}", value),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Fields recovered from a received packet.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub team_id: u16,
    pub node_id: u16,
    pub soil_moisture: u8,
    pub temperature_c: f32,
    pub humidity: u8,
    pub irrigation: IrrigationStatus,
    pub rssi_dbm: i16,
    /// Present only in the timestamped layout.
    pub collected_at: Option<u32>,
}

/// `round((t + 50.0) * 10)` after clamping `t` to the encodable range.
pub fn encode_temperature(temperature_c: f32) -> i16 {
    let clamped = if temperature_c.is_nan() {
        0.0
    } else {
        temperature_c.clamp(TEMPERATURE_MIN_C, TEMPERATURE_MAX_C)
    };
    ((clamped as f64 + TEMPERATURE_OFFSET_C) * TEMPERATURE_SCALE).round() as i16
}

pub fn decode_temperature(raw: i16) -> f32 {
    (raw as f64 / TEMPERATURE_SCALE - TEMPERATURE_OFFSET_C) as f32
}

/// Integer part of a percentage clamped to `0..=100`.
pub fn encode_percent(value: f32) -> u8 {
    value.clamp(0.0, 100.0) as u8
}

pub fn encode_rssi(rssi_dbm: i16) -> u8 {
    (rssi_dbm as i32 + RSSI_OFFSET).clamp(0, 255) as u8
}

pub fn decode_rssi(value: u8) -> i16 {
    (value as i32 - RSSI_OFFSET) as i16
}

/// Serialize one node into a packet.
///
/// Out-of-range sensor values are clamped, never rejected; the only failure
/// is running out of memory for the buffer.
pub fn encode_packet<L: PayloadLayout>(node: &Node, team_id: u16, rssi_dbm: i16) -> Result<Vec<u8>, EncodeError> {
    let size = packet_size::<L>();
    let mut payload = Vec::new();
    payload.try_reserve_exact(size).map_err(|_| EncodeError::AllocationFailed(size))?;

    payload.push(MAGIC_BYTE_1);
    payload.push(MAGIC_BYTE_2);
    payload.extend_from_slice(&team_id.to_be_bytes());

    payload.extend_from_slice(&node.node_id.to_be_bytes());
    payload.push(encode_percent(node.soil_moisture));
    payload.extend_from_slice(&encode_temperature(node.ambient_temp).to_be_bytes());
    payload.push(encode_percent(node.humidity));
    payload.push(node.irrigation.ordinal());
    payload.push(encode_rssi(rssi_dbm));
    L::write_extension(node, &mut payload);

    debug_assert_eq!(payload.len(), size);
    Ok(payload)
}

/// Parse a packet produced with layout `L`.
pub fn decode_packet<L: PayloadLayout>(bytes: &[u8]) -> Result<DecodedPacket, DecodeError> {
    let expected = packet_size::<L>();
    if bytes.len() != expected {
        return Err(DecodeError::WrongLength {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes[0] != MAGIC_BYTE_1 || bytes[1] != MAGIC_BYTE_2 {
        return Err(DecodeError::BadMagic([bytes[0], bytes[1]]));
    }

    let node_block = &bytes[HEADER_SIZE..];
    let irrigation = IrrigationStatus::from_ordinal(node_block[6]).ok_or(DecodeError::UnknownIrrigationStatus(node_block[6]))?;

    Ok(DecodedPacket {
        team_id: u16::from_be_bytes([bytes[2], bytes[3]]),
        node_id: u16::from_be_bytes([node_block[0], node_block[1]]),
        soil_moisture: node_block[2],
        temperature_c: decode_temperature(i16::from_be_bytes([node_block[3], node_block[4]])),
        humidity: node_block[5],
        irrigation,
        rssi_dbm: decode_rssi(node_block[7]),
        collected_at: L::read_extension(node_block),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::CropType;

    fn field_node() -> Node {
        let mut node = Node::new(1000, CropType::Soy);
        node.soil_moisture = 42.7;
        node.ambient_temp = 25.3;
        node.humidity = 60.1;
        node.irrigation = IrrigationStatus::Off;
        node
    }

    #[test]
    fn compact_packet_matches_reference_bytes() {
        let packet = encode_packet::<CompactLayout>(&field_node(), 666, -65).unwrap();
        assert_eq!(packet.len(), 12);
        assert_eq!(
            packet,
            vec![0xAB, 0xCD, 0x02, 0x9A, 0x03, 0xE8, 42, 0x02, 0xF1, 60, 0x00, 63]
        );
    }

    #[test]
    fn timestamped_packet_appends_collection_time() {
        let mut node = field_node();
        node.collected_at = 1_735_689_600;
        let packet = encode_packet::<TimestampedLayout>(&node, 666, -65).unwrap();
        assert_eq!(packet.len(), 16);
        assert_eq!(&packet[..12], &encode_packet::<CompactLayout>(&node, 666, -65).unwrap()[..]);
        assert_eq!(&packet[12..], &1_735_689_600u32.to_be_bytes());
    }

    #[test]
    fn temperature_round_trips_at_tenth_degree() {
        for tenths in -500..=1638 {
            let t = tenths as f32 / 10.0;
            let decoded = decode_temperature(encode_temperature(t));
            assert!((decoded - t).abs() < 1e-3, "{} decoded as {}", t, decoded);
        }
    }

    #[test]
    fn temperature_rounds_to_nearest_tenth() {
        assert_eq!(encode_temperature(25.3), 753);
        assert!((decode_temperature(encode_temperature(25.34)) - 25.3).abs() < 1e-4);
        assert!((decode_temperature(encode_temperature(25.36)) - 25.4).abs() < 1e-4);
        assert!((decode_temperature(encode_temperature(-12.04)) - (-12.0)).abs() < 1e-4);
    }

    #[test]
    fn temperature_outside_range_is_clamped() {
        assert_eq!(encode_temperature(-80.0), 0);
        assert_eq!(encode_temperature(500.0), 2138);
        assert_eq!(encode_temperature(f32::NAN), 500);
    }

    #[test]
    fn percentages_are_clamped_and_truncated() {
        assert_eq!(encode_percent(42.7), 42);
        assert_eq!(encode_percent(99.99), 99);
        assert_eq!(encode_percent(-3.0), 0);
        assert_eq!(encode_percent(130.5), 100);
        assert_eq!(encode_percent(f32::NAN), 0);
    }

    #[test]
    fn rssi_is_offset_into_a_byte() {
        assert_eq!(encode_rssi(-80), 48);
        assert_eq!(encode_rssi(-128), 0);
        assert_eq!(encode_rssi(-200), 0);
        assert_eq!(encode_rssi(127), 255);
        assert_eq!(decode_rssi(encode_rssi(-51)), -51);
    }

    #[test]
    fn decode_recovers_node_fields() {
        let mut node = field_node();
        node.irrigation = IrrigationStatus::Error;
        node.collected_at = 42;
        let packet = encode_packet::<TimestampedLayout>(&node, 666, -72).unwrap();
        let decoded = decode_packet::<TimestampedLayout>(&packet).unwrap();
        assert_eq!(decoded.team_id, 666);
        assert_eq!(decoded.node_id, 1000);
        assert_eq!(decoded.soil_moisture, 42);
        assert!((decoded.temperature_c - 25.3).abs() < 1e-4);
        assert_eq!(decoded.humidity, 60);
        assert_eq!(decoded.irrigation, IrrigationStatus::Error);
        assert_eq!(decoded.rssi_dbm, -72);
        assert_eq!(decoded.collected_at, Some(42));
    }

    #[test]
    fn decode_rejects_layout_mismatch_and_bad_magic() {
        let packet = encode_packet::<CompactLayout>(&field_node(), 666, -65).unwrap();
        assert_eq!(
            decode_packet::<TimestampedLayout>(&packet),
            Err(DecodeError::WrongLength { expected: 16, actual: 12 })
        );

        let mut corrupted = packet.clone();
        corrupted[1] = 0x00;
        assert_eq!(decode_packet::<CompactLayout>(&corrupted), Err(DecodeError::BadMagic([0xAB, 0x00])));

        let mut unknown = packet;
        unknown[10] = 9;
        assert_eq!(decode_packet::<CompactLayout>(&unknown), Err(DecodeError::UnknownIrrigationStatus(9)));
    }

    #[test]
    fn active_layout_follows_build_feature() {
        let expected = if cfg!(feature = "node-timestamp") { 16 } else { 12 };
        assert_eq!(packet_size::<ActiveLayout>(), expected);
    }
}
