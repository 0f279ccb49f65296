//! Contracts for the hardware adapters around the bay controller.
//!
//! Each trait is the narrow interface one physical peripheral exposes to the
//! core. Debouncing, bus timing and wire formats stay behind these traits;
//! [`sim`] provides in-memory implementations for the simulator and tests.

pub mod sim;

use crate::bay::BayId;
use crate::credentials::CredentialId;
use crate::error::PeripheralError;
use serde::{Deserialize, Serialize};

/// One of the four drive lines of an actuator pair (two actuators, two
/// directions each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveLine {
    AForward,
    BForward,
    AReverse,
    BReverse,
}

impl DriveLine {
    pub const ALL: [DriveLine; 4] = [
        DriveLine::AForward,
        DriveLine::BForward,
        DriveLine::AReverse,
        DriveLine::BReverse,
    ];

    pub fn is_forward(self) -> bool {
        matches!(self, DriveLine::AForward | DriveLine::BForward)
    }

    pub fn is_actuator_a(self) -> bool {
        matches!(self, DriveLine::AForward | DriveLine::AReverse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicatorColor {
    Off,
    Green,
    Red,
    Orange,
}

/// Two raw presence bits per bay, read once per poll.
pub trait OccupancySensors {
    fn read(&mut self, bay: BayId) -> Result<(bool, bool), PeripheralError>;
}

/// Card reader. Yields each physical presentation once;
/// `nb::Error::WouldBlock` means nothing new this cycle.
pub trait CredentialReader {
    fn poll(&mut self) -> nb::Result<CredentialId, PeripheralError>;
}

/// The four drive outputs of one bay's actuator pair.
pub trait DriveLines {
    fn write(&mut self, line: DriveLine, asserted: bool) -> Result<(), PeripheralError>;
}

/// Blocking delay used between de-asserting and re-asserting drive lines.
pub trait SettleDelay {
    fn delay_ms(&mut self, ms: u32);
}

/// Shared buzzer plus the per-bay colour indicators.
pub trait AlertOutputs {
    fn set_alarm(&mut self, on: bool) -> Result<(), PeripheralError>;
    fn set_indicator(&mut self, bay: BayId, color: IndicatorColor) -> Result<(), PeripheralError>;
}

/// Low-power radio. Fire-and-forget: no acknowledgement is awaited.
pub trait RadioLink {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), PeripheralError>;
}

pub trait StatusDisplay {
    fn show(&mut self, lines: &[&str]) -> Result<(), PeripheralError>;
}

/// Blocking delay backed by the OS scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl SettleDelay for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
