use crate::credentials::CredentialId;
use crate::error::UnknownStatus;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Widest deployment the controller supports (one 8-space rack).
pub const MAX_BAYS: usize = 8;

const_assert!(MAX_BAYS > 0);
const_assert!(MAX_BAYS <= u8::MAX as usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BayId(pub u8);

impl BayId {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl core::fmt::Display for BayId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    Available,
    Locking,
    Locked,
    Unlocking,
    Stolen,
}

impl LockState {
    /// States in which the retention mechanism is extended (or travelling out).
    pub fn holds_mechanism(self) -> bool {
        matches!(self, LockState::Locking | LockState::Locked | LockState::Stolen | LockState::Unlocking)
    }

    pub fn in_transition(self) -> bool {
        matches!(self, LockState::Locking | LockState::Unlocking)
    }
}

/// Status reported to the remote monitor. Only ever turned into text at the
/// telemetry and protocol boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BayStatus {
    Available,
    Occupied,
    Stolen,
}

impl BayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BayStatus::Available => "available",
            BayStatus::Occupied => "occupied",
            BayStatus::Stolen => "stolen",
        }
    }
}

impl core::fmt::Display for BayStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for BayStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(BayStatus::Available),
            "occupied" => Ok(BayStatus::Occupied),
            "stolen" => Ok(BayStatus::Stolen),
            _ => Err(UnknownStatus),
        }
    }
}

/// Presence derived from the two independent sensors of a bay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupancy {
    Empty,
    /// Exactly one sensor sees the bike: misaligned, not occupied.
    Partial,
    Present,
}

impl Occupancy {
    pub fn from_sensors(sensor_a: bool, sensor_b: bool) -> Self {
        match (sensor_a, sensor_b) {
            (true, true) => Occupancy::Present,
            (false, false) => Occupancy::Empty,
            _ => Occupancy::Partial,
        }
    }

    pub fn is_occupied(self) -> bool {
        self == Occupancy::Present
    }
}

/// Latched peripheral fault keeping a bay in its last known safe state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BayFault {
    SensorFault,
    ActuatorFault,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bay {
    pub(crate) id: BayId,
    pub(crate) occupancy: Occupancy,
    pub(crate) lock_state: LockState,
    pub(crate) status: BayStatus,
    pub(crate) held_credential: Option<CredentialId>,
    pub(crate) transition_deadline: Option<u64>,
    pub(crate) theft_alert_raised: bool,
    pub(crate) fault: Option<BayFault>,
    /// Set while the mechanism retracts after a reset; the bay is Available
    /// but cannot lock again until the deadline passes.
    pub(crate) retract_deadline: Option<u64>,
}

impl Bay {
    pub fn new(id: BayId) -> Self {
        Self {
            id,
            occupancy: Occupancy::Empty,
            lock_state: LockState::Available,
            status: BayStatus::Available,
            held_credential: None,
            transition_deadline: None,
            theft_alert_raised: false,
            fault: None,
            retract_deadline: None,
        }
    }

    pub fn id(&self) -> BayId {
        self.id
    }

    pub fn occupancy(&self) -> Occupancy {
        self.occupancy
    }

    pub fn is_occupied(&self) -> bool {
        self.occupancy.is_occupied()
    }

    pub fn lock_state(&self) -> LockState {
        self.lock_state
    }

    pub fn status(&self) -> BayStatus {
        self.status
    }

    pub fn held_credential(&self) -> Option<&CredentialId> {
        self.held_credential.as_ref()
    }

    pub fn transition_deadline(&self) -> Option<u64> {
        self.transition_deadline
    }

    pub fn theft_alert_raised(&self) -> bool {
        self.theft_alert_raised
    }

    pub fn fault(&self) -> Option<BayFault> {
        self.fault
    }

    pub fn is_retracting(&self) -> bool {
        self.retract_deadline.is_some()
    }

    pub(crate) fn deadline_elapsed(&self, now_ms: u64) -> bool {
        self.transition_deadline.map_or(false, |deadline| now_ms >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(" Stolen ".parse::<BayStatus>(), Ok(BayStatus::Stolen));
        assert_eq!("occupied".parse::<BayStatus>(), Ok(BayStatus::Occupied));
        assert_eq!("parked".parse::<BayStatus>(), Err(UnknownStatus));
        assert_eq!(UnknownStatus.to_string(), "unknown bay status");
    }
}
