//! Canned-response radio used by transmitter tests.

use std::collections::VecDeque;

use super::{LoraParameters, RadioDevice, RadioError, RadioPins};

/// Replays queued channel readings and send outcomes, records every frame.
///
/// When a queue runs dry the defaults apply: an idle channel at -120 dBm and
/// successful sends.
#[derive(Debug, Default)]
pub struct ScriptedRadio {
    pub fail_begin: bool,
    pub channel_samples: VecDeque<i16>,
    pub send_outcomes: VecDeque<bool>,
    pub reported_rssi: i16,
    pub configured: Option<LoraParameters>,
    pub sent_frames: Vec<Vec<u8>>,
    pub failed_frames: Vec<Vec<u8>>,
    pub sense_calls: usize,
    current: Option<Vec<u8>>,
    last_rssi: i16,
}

impl ScriptedRadio {
    pub fn new() -> Self {
        Self {
            reported_rssi: -97,
            ..Self::default()
        }
    }
}

impl RadioDevice for ScriptedRadio {
    fn begin(&mut self, _frequency_hz: u32, _pins: &RadioPins) -> Result<(), RadioError> {
        if self.fail_begin { Err(RadioError::NotResponding) } else { Ok(()) }
    }

    fn configure(&mut self, params: &LoraParameters) {
        self.configured = Some(params.clone());
    }

    fn sense_channel(&mut self) -> i16 {
        self.sense_calls += 1;
        self.channel_samples.pop_front().unwrap_or(-120)
    }

    fn begin_send(&mut self) {
        self.current = Some(Vec::new());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        if let Some(frame) = self.current.as_mut() {
            frame.extend_from_slice(bytes);
        }
    }

    fn end_send(&mut self, _wait_for_completion: bool) -> bool {
        let frame = self.current.take().unwrap_or_default();
        if self.send_outcomes.pop_front().unwrap_or(true) {
            self.last_rssi = self.reported_rssi;
            self.sent_frames.push(frame);
            true
        } else {
            self.failed_frames.push(frame);
            false
        }
    }

    fn last_rssi(&self) -> i16 {
        self.last_rssi
    }
}
