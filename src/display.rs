use crate::bay::{Bay, BayFault, BayId, BayStatus, LockState, Occupancy};
use serde::{Deserialize, Serialize};

pub const DISPLAY_HEADER: &str = "Bike Tracker";
pub const READY_MESSAGE: &str = "System Ready";

/// Read-only view of one bay for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaySnapshot {
    pub bay_id: BayId,
    pub lock_state: LockState,
    pub occupancy: Occupancy,
    pub status: BayStatus,
    pub fault: Option<BayFault>,
    /// Message last shown for the station when this snapshot was taken.
    pub last_message: String,
}

impl BaySnapshot {
    pub fn from_bay(bay: &Bay, last_message: &str) -> Self {
        Self {
            bay_id: bay.id(),
            lock_state: bay.lock_state(),
            occupancy: bay.occupancy(),
            status: bay.status(),
            fault: bay.fault(),
            last_message: last_message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub bays: Vec<BaySnapshot>,
    pub available_spaces: usize,
    pub message: String,
}

impl StationSnapshot {
    pub fn new(bays: Vec<BaySnapshot>, message: &str) -> Self {
        let available_spaces = bays
            .iter()
            .filter(|b| !b.lock_state.holds_mechanism())
            .count();
        Self {
            bays,
            available_spaces,
            message: message.to_string(),
        }
    }

    pub fn bay(&self, id: BayId) -> Option<&BaySnapshot> {
        self.bays.iter().find(|b| b.bay_id == id)
    }
}

/// Lay the snapshot out the way the station's OLED shows it.
pub fn render_lines(snapshot: &StationSnapshot) -> Vec<String> {
    let mut lines = Vec::with_capacity(snapshot.bays.len() + 3);
    lines.push(DISPLAY_HEADER.to_string());
    lines.push(format!("Available spaces: {}", snapshot.available_spaces));

    for bay in &snapshot.bays {
        if bay.lock_state == LockState::Stolen {
            lines.push(format!("SPACE {} STOLEN!", bay.bay_id));
        }
        if bay.fault == Some(BayFault::ActuatorFault) {
            lines.push(format!("SPACE {} OUT OF SERVICE", bay.bay_id));
        }
    }

    if !snapshot.message.is_empty() {
        lines.push(snapshot.message.clone());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bay(id: u8, lock_state: LockState) -> BaySnapshot {
        BaySnapshot {
            bay_id: BayId(id),
            lock_state,
            occupancy: Occupancy::Empty,
            status: BayStatus::Available,
            fault: None,
            last_message: String::new(),
        }
    }

    #[test]
    fn test_render_idle_station() {
        let snapshot = StationSnapshot::new(
            vec![bay(1, LockState::Available), bay(2, LockState::Available)],
            READY_MESSAGE,
        );
        assert_eq!(
            render_lines(&snapshot),
            vec!["Bike Tracker", "Available spaces: 2", "System Ready"]
        );
    }

    #[test]
    fn test_render_stolen_bay() {
        let snapshot = StationSnapshot::new(
            vec![bay(1, LockState::Locked), bay(2, LockState::Stolen)],
            "Bike stolen in Space 2",
        );
        assert_eq!(snapshot.available_spaces, 0);
        assert_eq!(
            render_lines(&snapshot),
            vec![
                "Bike Tracker",
                "Available spaces: 0",
                "SPACE 2 STOLEN!",
                "Bike stolen in Space 2",
            ]
        );
    }
}
