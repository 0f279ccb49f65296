//! The per-bay lock/unlock/theft state machine.
//!
//! [`BayController::poll`] runs one decide step of the station cycle:
//!
//! 1. sample both presence sensors of every bay,
//! 2. complete `Locking`/`Unlocking` transitions whose deadline has passed,
//! 3. run the level-triggered theft check on `Locked` bays,
//! 4. act on at most one presented credential.
//!
//! Actuator travel is never waited on: transitions carry a deadline that is
//! compared against the caller's monotonic clock on later polls. The only
//! blocking happens inside the actuator driver's settle interval.

use crate::actuator::{ActuatorControl, ActuatorDirection};
use crate::alert::AlertKind;
use crate::bay::{Bay, BayFault, BayId, BayStatus, LockState, Occupancy, MAX_BAYS};
use crate::credentials::{CredentialAllowList, CredentialId, CredentialRole};
use crate::display::{BaySnapshot, StationSnapshot, READY_MESSAGE};
use crate::error::MaintenanceError;
use crate::peripherals::OccupancySensors;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

// A bay can complete a transition and be reset in the same cycle.
const STATUS_CHANGE_CAPACITY: usize = MAX_BAYS * 2;
const ALERT_CAPACITY: usize = MAX_BAYS + 1;

/// User-facing message produced by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advisory {
    Locking(BayId),
    Unlocking(BayId),
    Ready,
    TheftDetected(BayId),
    ResetApplied,
    NoStolenBays,
    ReadjustBike,
    NoBikeDetected,
    UnknownCard,
    BayBusy(BayId),
    BayFaulted(BayId),
    NoAction,
}

impl Advisory {
    /// Feedback for a credential that produced no state change.
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            Advisory::ReadjustBike
                | Advisory::NoBikeDetected
                | Advisory::UnknownCard
                | Advisory::BayBusy(_)
                | Advisory::BayFaulted(_)
                | Advisory::NoAction
                | Advisory::NoStolenBays
        )
    }
}

impl core::fmt::Display for Advisory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Advisory::Locking(_) => write!(f, "Locking Bike Please wait"),
            Advisory::Unlocking(_) => write!(f, "Unlocking Bike Please wait"),
            Advisory::Ready => write!(f, "{}", READY_MESSAGE),
            Advisory::TheftDetected(bay) => write!(f, "Bike stolen in Space {}", bay),
            Advisory::ResetApplied => write!(f, "Reset card used"),
            Advisory::NoStolenBays => write!(f, "No stolen spaces"),
            Advisory::ReadjustBike => write!(f, "Please readjust bike"),
            Advisory::NoBikeDetected => write!(f, "No bike detected"),
            Advisory::UnknownCard => write!(f, "The RFID card is unknown"),
            Advisory::BayBusy(_) => write!(f, "Bay busy, please wait"),
            Advisory::BayFaulted(bay) => write!(f, "Space {} out of service", bay),
            Advisory::NoAction => write!(f, "No action for this card"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub bay: BayId,
    pub status: BayStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub bay: BayId,
    pub kind: AlertKind,
}

/// Everything one poll asks the rest of the station to do, in order.
#[derive(Debug, Clone, Default)]
pub struct ControllerOutput {
    pub status_changes: Vec<StatusChange, STATUS_CHANGE_CAPACITY>,
    pub alerts: Vec<AlertRequest, ALERT_CAPACITY>,
    pub advisory: Option<Advisory>,
    /// Bay that acted on this cycle's credential, if any.
    pub acting_bay: Option<BayId>,
}

impl ControllerOutput {
    pub fn has_actions(&self) -> bool {
        !self.status_changes.is_empty() || !self.alerts.is_empty() || self.advisory.is_some()
    }

    fn report(&mut self, bay: BayId, status: BayStatus) {
        let _ = self.status_changes.push(StatusChange { bay, status });
    }

    fn alert(&mut self, bay: BayId, kind: AlertKind) {
        let _ = self.alerts.push(AlertRequest { bay, kind });
    }
}

pub struct BayController {
    bays: Vec<Bay, MAX_BAYS>,
    allow_list: CredentialAllowList,
    lock_duration_ms: u64,
}

impl BayController {
    /// Bays are evaluated in ascending id order.
    pub fn new(
        bay_ids: impl IntoIterator<Item = BayId>,
        allow_list: CredentialAllowList,
        lock_duration_ms: u64,
    ) -> Self {
        let mut bays: Vec<Bay, MAX_BAYS> = Vec::new();
        for id in bay_ids {
            if bays.iter().any(|b| b.id == id) {
                warn!(bay = id.get(), "duplicate bay ignored");
                continue;
            }
            if bays.push(Bay::new(id)).is_err() {
                warn!(bay = id.get(), max = MAX_BAYS, "bay limit reached, bay ignored");
            }
        }
        bays.sort_unstable_by_key(|b| b.id);

        Self {
            bays,
            allow_list,
            lock_duration_ms,
        }
    }

    pub fn poll(
        &mut self,
        now: u64,
        sensors: &mut dyn OccupancySensors,
        credential: Option<&CredentialId>,
        actuators: &mut dyn ActuatorControl,
    ) -> ControllerOutput {
        let mut out = ControllerOutput::default();
        let mut readable = [false; MAX_BAYS];

        self.sample_occupancy(sensors, &mut readable);
        self.complete_deadlines(now, &readable, actuators, &mut out);
        self.detect_theft(&readable, &mut out);

        if let Some(id) = credential {
            self.handle_credential(now, id, &readable, actuators, &mut out);
        }

        out
    }

    fn sample_occupancy(&mut self, sensors: &mut dyn OccupancySensors, readable: &mut [bool; MAX_BAYS]) {
        for (index, bay) in self.bays.iter_mut().enumerate() {
            match sensors.read(bay.id) {
                Ok((sensor_a, sensor_b)) => {
                    readable[index] = true;
                    let occupancy = Occupancy::from_sensors(sensor_a, sensor_b);
                    if occupancy != bay.occupancy {
                        debug!(bay = bay.id.get(), ?occupancy, "occupancy changed");
                        bay.occupancy = occupancy;
                    }
                    if bay.fault == Some(BayFault::SensorFault) {
                        info!(bay = bay.id.get(), "occupancy sensors recovered");
                        bay.fault = None;
                    }
                }
                Err(e) => {
                    if bay.fault.is_none() {
                        error!(bay = bay.id.get(), error = %e, "occupancy sensors failed, bay held in last state");
                        bay.fault = Some(BayFault::SensorFault);
                    }
                }
            }
        }
    }

    fn complete_deadlines(
        &mut self,
        now: u64,
        readable: &[bool; MAX_BAYS],
        actuators: &mut dyn ActuatorControl,
        out: &mut ControllerOutput,
    ) {
        for (index, bay) in self.bays.iter_mut().enumerate() {
            if bay.retract_deadline.map_or(false, |deadline| now >= deadline) {
                bay.retract_deadline = None;
                stop_actuators(bay, actuators);
                debug!(bay = bay.id.get(), "mechanism retracted after reset");
            }

            if !bay.deadline_elapsed(now) {
                continue;
            }

            match bay.lock_state {
                LockState::Locking => {
                    // Travel ends on time even if the outcome must wait for a
                    // valid sensor reading.
                    if actuators.last_command(bay.id) != Some(ActuatorDirection::Off)
                        && bay.fault != Some(BayFault::ActuatorFault)
                    {
                        stop_actuators(bay, actuators);
                    }
                    if !readable[index] {
                        continue;
                    }
                    bay.transition_deadline = None;

                    if bay.occupancy.is_occupied() {
                        bay.lock_state = LockState::Locked;
                        bay.status = BayStatus::Occupied;
                        info!(bay = bay.id.get(), "bike locked");
                        out.report(bay.id, BayStatus::Occupied);
                        out.advisory = Some(Advisory::Ready);
                    } else {
                        bay.lock_state = LockState::Stolen;
                        bay.status = BayStatus::Stolen;
                        bay.theft_alert_raised = true;
                        warn!(bay = bay.id.get(), "bay emptied while locking, treating as theft");
                        out.report(bay.id, BayStatus::Stolen);
                        out.alert(bay.id, AlertKind::TheftAlarm);
                        out.advisory = Some(Advisory::TheftDetected(bay.id));
                    }
                }
                LockState::Unlocking => {
                    bay.transition_deadline = None;
                    stop_actuators(bay, actuators);
                    bay.lock_state = LockState::Available;
                    bay.status = BayStatus::Available;
                    bay.held_credential = None;
                    bay.theft_alert_raised = false;
                    info!(bay = bay.id.get(), "bike released");
                    out.report(bay.id, BayStatus::Available);
                    out.advisory = Some(Advisory::Ready);
                }
                _ => bay.transition_deadline = None,
            }
        }
    }

    fn detect_theft(&mut self, readable: &[bool; MAX_BAYS], out: &mut ControllerOutput) {
        for (index, bay) in self.bays.iter_mut().enumerate() {
            if !readable[index]
                || bay.lock_state != LockState::Locked
                || bay.occupancy.is_occupied()
                || bay.theft_alert_raised
            {
                continue;
            }

            bay.lock_state = LockState::Stolen;
            bay.status = BayStatus::Stolen;
            bay.theft_alert_raised = true;
            warn!(bay = bay.id.get(), occupancy = ?bay.occupancy, "bike stolen from locked bay");
            out.report(bay.id, BayStatus::Stolen);
            out.alert(bay.id, AlertKind::TheftAlarm);
            out.advisory = Some(Advisory::TheftDetected(bay.id));
        }
    }

    fn handle_credential(
        &mut self,
        now: u64,
        id: &CredentialId,
        readable: &[bool; MAX_BAYS],
        actuators: &mut dyn ActuatorControl,
        out: &mut ControllerOutput,
    ) {
        let role = self.allow_list.resolve(id);
        info!(credential = %id, ?role, "credential presented");

        let acting = match role {
            CredentialRole::ResetAuthority => self.reset_stolen(now, actuators, out),
            CredentialRole::Unknown => None,
            CredentialRole::BayOwner(_) | CredentialRole::MasterOverride => {
                match self.unlock_pass(now, id, role, readable, actuators, out) {
                    Some(bay) => Some(bay),
                    None => self.lock_pass(now, id, role, readable, actuators, out),
                }
            }
        };

        if acting.is_none() && role != CredentialRole::ResetAuthority {
            let advisory = self.feedback(role, readable);
            warn!(credential = %id, %advisory, "credential rejected");
            out.advisory = Some(advisory);
        }

        out.acting_bay = acting;
        if let Some(target) = acting.or_else(|| self.bays.first().map(|b| b.id)) {
            out.alert(target, AlertKind::Ack);
        }
    }

    /// First `Locked` or `Stolen` bay, in id order, that this credential may
    /// open.
    fn unlock_pass(
        &mut self,
        now: u64,
        id: &CredentialId,
        role: CredentialRole,
        readable: &[bool; MAX_BAYS],
        actuators: &mut dyn ActuatorControl,
        out: &mut ControllerOutput,
    ) -> Option<BayId> {
        let lock_duration = self.lock_duration_ms;

        for (index, bay) in self.bays.iter_mut().enumerate() {
            if !matches!(bay.lock_state, LockState::Locked | LockState::Stolen)
                || !readable[index]
                || bay.fault.is_some()
            {
                continue;
            }
            let authorised = role == CredentialRole::MasterOverride
                || bay.held_credential.as_ref() == Some(id);
            if !authorised {
                continue;
            }

            match actuators.command(bay.id, ActuatorDirection::Reverse) {
                Ok(()) => {
                    info!(bay = bay.id.get(), from = ?bay.lock_state, "unlocking");
                    bay.lock_state = LockState::Unlocking;
                    bay.transition_deadline = Some(now.saturating_add(lock_duration));
                    out.advisory = Some(Advisory::Unlocking(bay.id));
                }
                Err(e) => {
                    error!(bay = bay.id.get(), error = %e, "unlock refused, actuator fault latched");
                    bay.fault = Some(BayFault::ActuatorFault);
                    out.advisory = Some(Advisory::BayFaulted(bay.id));
                }
            }
            return Some(bay.id);
        }
        None
    }

    /// Owner cards lock their own bay when a bike is parked squarely in it.
    fn lock_pass(
        &mut self,
        now: u64,
        id: &CredentialId,
        role: CredentialRole,
        readable: &[bool; MAX_BAYS],
        actuators: &mut dyn ActuatorControl,
        out: &mut ControllerOutput,
    ) -> Option<BayId> {
        let CredentialRole::BayOwner(owner_bay) = role else {
            return None;
        };
        let lock_duration = self.lock_duration_ms;
        let index = self.bays.iter().position(|b| b.id == owner_bay)?;
        let bay = &mut self.bays[index];

        if !readable[index]
            || bay.fault.is_some()
            || bay.lock_state != LockState::Available
            || bay.retract_deadline.is_some()
            || bay.held_credential.is_some()
            || !bay.occupancy.is_occupied()
        {
            return None;
        }

        match actuators.command(bay.id, ActuatorDirection::Forward) {
            Ok(()) => {
                info!(bay = bay.id.get(), credential = %id, "locking");
                bay.lock_state = LockState::Locking;
                bay.held_credential = Some(id.clone());
                bay.transition_deadline = Some(now.saturating_add(lock_duration));
                out.advisory = Some(Advisory::Locking(bay.id));
            }
            Err(e) => {
                error!(bay = bay.id.get(), error = %e, "lock refused, actuator fault latched");
                bay.fault = Some(BayFault::ActuatorFault);
                out.advisory = Some(Advisory::BayFaulted(bay.id));
            }
        }
        Some(bay.id)
    }

    /// Return every `Stolen` bay to `Available` and clear latched actuator
    /// faults.
    fn reset_stolen(
        &mut self,
        now: u64,
        actuators: &mut dyn ActuatorControl,
        out: &mut ControllerOutput,
    ) -> Option<BayId> {
        let lock_duration = self.lock_duration_ms;
        let mut first = None;

        for bay in &mut self.bays {
            if bay.fault == Some(BayFault::ActuatorFault) {
                match actuators.command(bay.id, ActuatorDirection::Off) {
                    Ok(()) => {
                        info!(bay = bay.id.get(), "actuator fault cleared");
                        bay.fault = None;
                        first.get_or_insert(bay.id);
                    }
                    Err(e) => {
                        error!(bay = bay.id.get(), error = %e, "actuator still not responding");
                        continue;
                    }
                }
            }

            if bay.lock_state != LockState::Stolen {
                continue;
            }

            match actuators.command(bay.id, ActuatorDirection::Reverse) {
                Ok(()) => {
                    info!(bay = bay.id.get(), "stolen bay reset");
                    bay.lock_state = LockState::Available;
                    bay.status = BayStatus::Available;
                    bay.held_credential = None;
                    bay.theft_alert_raised = false;
                    bay.transition_deadline = None;
                    bay.retract_deadline = Some(now.saturating_add(lock_duration));
                    out.report(bay.id, BayStatus::Available);
                    first.get_or_insert(bay.id);
                }
                Err(e) => {
                    error!(bay = bay.id.get(), error = %e, "reset failed, actuator fault latched");
                    bay.fault = Some(BayFault::ActuatorFault);
                }
            }
        }

        out.advisory = Some(if first.is_some() {
            Advisory::ResetApplied
        } else {
            Advisory::NoStolenBays
        });
        first
    }

    fn feedback(&self, role: CredentialRole, readable: &[bool; MAX_BAYS]) -> Advisory {
        let misaligned = self.bays.iter().enumerate().any(|(index, bay)| {
            readable[index]
                && bay.lock_state == LockState::Available
                && bay.occupancy == Occupancy::Partial
        });
        if misaligned {
            return Advisory::ReadjustBike;
        }
        if !self.bays.iter().any(Bay::is_occupied) {
            return Advisory::NoBikeDetected;
        }

        match role {
            CredentialRole::Unknown => Advisory::UnknownCard,
            CredentialRole::BayOwner(owner_bay) => match self.bay(owner_bay) {
                Some(bay) if bay.fault.is_some() => Advisory::BayFaulted(owner_bay),
                Some(bay) if bay.lock_state.in_transition() || bay.is_retracting() => {
                    Advisory::BayBusy(owner_bay)
                }
                _ => Advisory::NoAction,
            },
            _ => Advisory::NoAction,
        }
    }

    /// Maintenance override of one bay's actuators. Travel commands are only
    /// accepted on an idle, empty, available bay; `Off` is always accepted.
    pub fn run_maintenance(
        &mut self,
        bay_id: BayId,
        direction: ActuatorDirection,
        actuators: &mut dyn ActuatorControl,
    ) -> Result<(), MaintenanceError> {
        let bay = self
            .bays
            .iter_mut()
            .find(|b| b.id == bay_id)
            .ok_or(MaintenanceError::UnknownBay(bay_id))?;

        if direction != ActuatorDirection::Off {
            if bay.lock_state != LockState::Available {
                return Err(MaintenanceError::NotAvailable(bay_id));
            }
            if bay.is_retracting() {
                return Err(MaintenanceError::Retracting(bay_id));
            }
            if bay.occupancy != Occupancy::Empty {
                return Err(MaintenanceError::Occupied(bay_id));
            }
            if bay.fault.is_some() {
                return Err(MaintenanceError::Faulted(bay_id));
            }
        }

        info!(bay = bay_id.get(), %direction, "maintenance actuator command");
        actuators.command(bay_id, direction).map_err(|e| {
            error!(bay = bay_id.get(), error = %e, "maintenance command failed, actuator fault latched");
            bay.fault = Some(BayFault::ActuatorFault);
            MaintenanceError::Actuator(e)
        })
    }

    pub fn bay(&self, id: BayId) -> Option<&Bay> {
        self.bays.iter().find(|b| b.id == id)
    }

    pub fn bays(&self) -> &[Bay] {
        &self.bays
    }

    pub fn statuses(&self) -> Vec<(BayId, BayStatus), MAX_BAYS> {
        self.bays.iter().map(|b| (b.id, b.status)).collect()
    }

    pub fn allow_list(&self) -> &CredentialAllowList {
        &self.allow_list
    }

    pub fn lock_duration_ms(&self) -> u64 {
        self.lock_duration_ms
    }

    pub fn snapshot(&self, last_message: &str) -> StationSnapshot {
        let bays = self
            .bays
            .iter()
            .map(|bay| BaySnapshot::from_bay(bay, last_message))
            .collect();
        StationSnapshot::new(bays, last_message)
    }
}

impl core::fmt::Debug for BayController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BayController")
            .field("bays", &self.bays)
            .field("credentials", &self.allow_list.len())
            .field("lock_duration_ms", &self.lock_duration_ms)
            .finish()
    }
}

/// Command `Off`; latch an actuator fault if the driver does not respond.
fn stop_actuators(bay: &mut Bay, actuators: &mut dyn ActuatorControl) {
    if let Err(e) = actuators.command(bay.id, ActuatorDirection::Off) {
        error!(bay = bay.id.get(), error = %e, "failed to stop actuators, fault latched");
        bay.fault = Some(BayFault::ActuatorFault);
    }
}
