use crate::bay::{BayId, MAX_BAYS};
use crate::error::PeripheralError;
use crate::peripherals::{DriveLine, DriveLines, SettleDelay};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Settle interval used by the bay firmware between releasing and asserting
/// drive lines.
pub const DEFAULT_SETTLE_MS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActuatorDirection {
    /// Extend the retention mechanism.
    Forward,
    /// Retract it.
    Reverse,
    Off,
}

impl ActuatorDirection {
    fn lines(self) -> &'static [DriveLine] {
        match self {
            ActuatorDirection::Forward => &[DriveLine::AForward, DriveLine::BForward],
            ActuatorDirection::Reverse => &[DriveLine::AReverse, DriveLine::BReverse],
            ActuatorDirection::Off => &[],
        }
    }
}

impl core::fmt::Display for ActuatorDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ActuatorDirection::Forward => write!(f, "forward"),
            ActuatorDirection::Reverse => write!(f, "reverse"),
            ActuatorDirection::Off => write!(f, "off"),
        }
    }
}

/// The two linear actuators of one bay. They are only ever commanded
/// together, through [`ActuatorPair::command`].
pub struct ActuatorPair {
    lines: Box<dyn DriveLines + Send>,
    settle_ms: u32,
    asserted: [bool; 4],
    last_command: ActuatorDirection,
    last_travel: Option<ActuatorDirection>,
    commands_issued: u32,
}

impl ActuatorPair {
    pub fn new(lines: Box<dyn DriveLines + Send>, settle_ms: u32) -> Self {
        Self {
            lines,
            settle_ms,
            asserted: [false; 4],
            last_command: ActuatorDirection::Off,
            last_travel: None,
            commands_issued: 0,
        }
    }

    /// Release all four lines, then (for a travel direction) wait the settle
    /// interval and assert that direction on both actuators.
    ///
    /// Release happens unconditionally, so back-to-back opposite commands
    /// never overlap on an actuator. If any write fails the pair is released
    /// again and the first error is returned, so one actuator is never left
    /// driven without the other.
    pub fn command(
        &mut self,
        direction: ActuatorDirection,
        delay: &mut dyn SettleDelay,
    ) -> Result<(), PeripheralError> {
        if let Err(e) = self.drive(direction, delay) {
            self.release_all();
            self.last_command = ActuatorDirection::Off;
            return Err(e);
        }
        self.commands_issued = self.commands_issued.saturating_add(1);
        Ok(())
    }

    fn drive(
        &mut self,
        direction: ActuatorDirection,
        delay: &mut dyn SettleDelay,
    ) -> Result<(), PeripheralError> {
        for (index, line) in DriveLine::ALL.iter().enumerate() {
            self.lines.write(*line, false)?;
            self.asserted[index] = false;
        }
        self.last_command = ActuatorDirection::Off;

        if direction == ActuatorDirection::Off {
            return Ok(());
        }

        delay.delay_ms(self.settle_ms);

        for line in direction.lines() {
            self.lines.write(*line, true)?;
            self.mark_asserted(*line);
        }

        debug_assert!(!self.has_conflict(), "forward and reverse asserted together on one actuator");

        self.last_command = direction;
        self.last_travel = Some(direction);
        Ok(())
    }

    // Secondary failures are ignored; the caller already has an error to report.
    fn release_all(&mut self) {
        for (index, line) in DriveLine::ALL.iter().enumerate() {
            match self.lines.write(*line, false) {
                Ok(()) => self.asserted[index] = false,
                Err(e) => warn!(?line, error = %e, "release after failed command also failed"),
            }
        }
    }

    /// True when one actuator has both its forward and reverse line asserted.
    fn has_conflict(&self) -> bool {
        let driven = |actuator_a: bool, forward: bool| {
            DriveLine::ALL
                .iter()
                .zip(self.asserted.iter())
                .any(|(line, on)| *on && line.is_actuator_a() == actuator_a && line.is_forward() == forward)
        };
        (driven(true, true) && driven(true, false)) || (driven(false, true) && driven(false, false))
    }

    /// Lines this pair believes it is currently driving.
    pub fn asserted_lines(&self) -> impl Iterator<Item = DriveLine> + '_ {
        DriveLine::ALL
            .iter()
            .zip(self.asserted.iter())
            .filter(|(_, on)| **on)
            .map(|(line, _)| *line)
    }

    fn mark_asserted(&mut self, line: DriveLine) {
        if let Some(index) = DriveLine::ALL.iter().position(|l| *l == line) {
            self.asserted[index] = true;
        }
    }

    pub fn last_command(&self) -> ActuatorDirection {
        self.last_command
    }

    /// Direction of the most recent travel; `Forward` means the mechanism is
    /// (or is heading) extended.
    pub fn last_travel(&self) -> Option<ActuatorDirection> {
        self.last_travel
    }

    pub fn commands_issued(&self) -> u32 {
        self.commands_issued
    }

    pub fn settle_ms(&self) -> u32 {
        self.settle_ms
    }
}

impl core::fmt::Debug for ActuatorPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActuatorPair")
            .field("settle_ms", &self.settle_ms)
            .field("last_command", &self.last_command)
            .field("last_travel", &self.last_travel)
            .field("commands_issued", &self.commands_issued)
            .finish_non_exhaustive()
    }
}

/// What the bay controller needs from the actuator side.
pub trait ActuatorControl {
    fn command(&mut self, bay: BayId, direction: ActuatorDirection) -> Result<(), PeripheralError>;
    fn last_command(&self, bay: BayId) -> Option<ActuatorDirection>;
    fn last_travel(&self, bay: BayId) -> Option<ActuatorDirection>;
}

/// Every bay's actuator pair plus the shared settle delay.
pub struct ActuatorBank {
    pairs: Vec<(BayId, ActuatorPair), MAX_BAYS>,
    delay: Box<dyn SettleDelay + Send>,
}

impl ActuatorBank {
    pub fn new(delay: Box<dyn SettleDelay + Send>) -> Self {
        Self {
            pairs: Vec::new(),
            delay,
        }
    }

    pub fn add_pair(&mut self, bay: BayId, pair: ActuatorPair) -> Result<(), &'static str> {
        if self.pairs.iter().any(|(id, _)| *id == bay) {
            return Err("Actuator pair already registered for bay");
        }
        self.pairs.push((bay, pair)).map_err(|_| "Actuator bank full")
    }

    pub fn pair(&self, bay: BayId) -> Option<&ActuatorPair> {
        self.pairs.iter().find(|(id, _)| *id == bay).map(|(_, pair)| pair)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl ActuatorControl for ActuatorBank {
    fn command(&mut self, bay: BayId, direction: ActuatorDirection) -> Result<(), PeripheralError> {
        let pair = self
            .pairs
            .iter_mut()
            .find(|(id, _)| *id == bay)
            .map(|(_, pair)| pair)
            .ok_or(PeripheralError::UnknownBay(bay))?;

        debug!(bay = bay.get(), %direction, "actuator command");
        pair.command(direction, self.delay.as_mut()).map_err(|e| {
            warn!(bay = bay.get(), %direction, error = %e, "actuator command failed");
            e
        })
    }

    fn last_command(&self, bay: BayId) -> Option<ActuatorDirection> {
        self.pair(bay).map(ActuatorPair::last_command)
    }

    fn last_travel(&self, bay: BayId) -> Option<ActuatorDirection> {
        self.pair(bay).and_then(ActuatorPair::last_travel)
    }
}

impl core::fmt::Debug for ActuatorBank {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActuatorBank")
            .field("pairs", &self.pairs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::sim::SimulatedDriveLines;

    #[test]
    fn test_conflict_is_per_actuator() {
        let mut pair = ActuatorPair::new(Box::new(SimulatedDriveLines::new()), DEFAULT_SETTLE_MS);
        assert!(!pair.has_conflict());

        // A forward with B reverse drives each actuator one way only
        pair.asserted = [true, false, false, true];
        assert!(!pair.has_conflict());

        pair.asserted = [true, false, true, false];
        assert!(pair.has_conflict());

        pair.asserted = [false, true, false, true];
        assert!(pair.has_conflict());
    }
}
