use crate::bay::{BayId, BayStatus};
use crate::error::FrameError;
use crate::peripherals::RadioLink;
use arrayvec::ArrayString;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Longest frame: "Space 255: available".
pub const MAX_FRAME_LEN: usize = 32;
const TELEMETRY_HISTORY_SIZE: usize = 16;

pub type FrameBuffer = ArrayString<MAX_FRAME_LEN>;

/// One status frame as carried over the radio link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub bay: BayId,
    pub status: BayStatus,
}

impl TelemetryFrame {
    pub fn new(bay: BayId, status: BayStatus) -> Self {
        Self { bay, status }
    }

    pub fn encode(&self) -> FrameBuffer {
        let mut buffer = FrameBuffer::new();
        // bounded: the widest bay id and status fit MAX_FRAME_LEN
        let _ = core::fmt::Write::write_fmt(&mut buffer, format_args!("{}", self));
        buffer
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLong { max: MAX_FRAME_LEN });
        }
        let text = core::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)?;
        text.parse()
    }
}

impl core::fmt::Display for TelemetryFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Space {}: {}", self.bay, self.status)
    }
}

impl core::str::FromStr for TelemetryFrame {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.trim().strip_prefix("Space ").ok_or(FrameError::MissingPrefix)?;
        let (bay, status) = rest.split_once(':').ok_or(FrameError::MissingSeparator)?;
        let bay = bay.trim().parse::<u8>().map_err(|_| FrameError::InvalidBay)?;
        let status = status.parse::<BayStatus>().map_err(|_| FrameError::UnknownStatus)?;
        Ok(Self::new(BayId(bay), status))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    /// Handed to the radio. Nothing is known about reception.
    Sent,
    /// The radio reported a transmit error.
    Failed,
    /// No radio available.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub sequence: u32,
    pub frame: TelemetryFrame,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub frames_sent: u32,
    pub frames_failed: u32,
    pub frames_dropped: u32,
}

/// At-most-once status reporting. Never retries and never surfaces an error
/// to the caller.
pub struct TelemetrySender {
    radio: Option<Box<dyn RadioLink + Send>>,
    buffer: FrameBuffer,
    sequence: u32,
    history: Vec<TelemetryRecord, TELEMETRY_HISTORY_SIZE>,
    stats: TelemetryStats,
}

impl TelemetrySender {
    pub fn new(radio: Option<Box<dyn RadioLink + Send>>) -> Self {
        if radio.is_none() {
            warn!("telemetry sender has no radio; frames will be dropped");
        }
        Self {
            radio,
            buffer: FrameBuffer::new(),
            sequence: 0,
            history: Vec::new(),
            stats: TelemetryStats::default(),
        }
    }

    pub fn send(&mut self, bay: BayId, status: BayStatus) -> Delivery {
        let frame = TelemetryFrame::new(bay, status);
        self.buffer = frame.encode();
        self.sequence = self.sequence.wrapping_add(1);

        let delivery = match self.radio.as_mut() {
            Some(radio) => match radio.transmit(self.buffer.as_bytes()) {
                Ok(()) => {
                    info!(frame = %self.buffer, "telemetry frame sent");
                    self.stats.frames_sent = self.stats.frames_sent.saturating_add(1);
                    Delivery::Sent
                }
                Err(e) => {
                    warn!(frame = %self.buffer, error = %e, "telemetry frame lost");
                    self.stats.frames_failed = self.stats.frames_failed.saturating_add(1);
                    Delivery::Failed
                }
            },
            None => {
                debug!(frame = %self.buffer, "telemetry frame dropped, no radio");
                self.stats.frames_dropped = self.stats.frames_dropped.saturating_add(1);
                Delivery::Dropped
            }
        };

        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(TelemetryRecord {
            sequence: self.sequence,
            frame,
            delivery,
        });

        delivery
    }

    /// Announce every bay's status, as done once at power-up.
    pub fn send_initial(&mut self, bays: impl IntoIterator<Item = (BayId, BayStatus)>) {
        for (bay, status) in bays {
            self.send(bay, status);
        }
    }

    pub fn has_radio(&self) -> bool {
        self.radio.is_some()
    }

    /// The most recently encoded frame.
    pub fn last_frame(&self) -> &str {
        &self.buffer
    }

    pub fn history(&self) -> &[TelemetryRecord] {
        &self.history
    }

    pub fn stats(&self) -> &TelemetryStats {
        &self.stats
    }
}

impl core::fmt::Debug for TelemetrySender {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TelemetrySender")
            .field("has_radio", &self.radio.is_some())
            .field("sequence", &self.sequence)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
