use bikebay::actuator::{ActuatorBank, ActuatorControl, ActuatorDirection, ActuatorPair, DEFAULT_SETTLE_MS};
use bikebay::bay::BayId;
use bikebay::error::PeripheralError;
use bikebay::peripherals::sim::{RecordingDelay, SimulatedDriveLines};
use bikebay::peripherals::{DriveLine, DriveLines};
use std::sync::{Arc, Mutex};

fn pair_with_lines() -> (ActuatorPair, SimulatedDriveLines) {
    let lines = SimulatedDriveLines::new();
    let pair = ActuatorPair::new(Box::new(lines.clone()), DEFAULT_SETTLE_MS);
    (pair, lines)
}

#[test]
fn test_forward_asserts_both_actuators() {
    let (mut pair, lines) = pair_with_lines();
    let mut delay = RecordingDelay::new();

    pair.command(ActuatorDirection::Forward, &mut delay).unwrap();

    assert_eq!(lines.asserted_lines(), vec![DriveLine::AForward, DriveLine::BForward]);
    assert_eq!(pair.last_command(), ActuatorDirection::Forward);
    assert_eq!(pair.last_travel(), Some(ActuatorDirection::Forward));
    assert_eq!(delay.calls(), 1);
    assert_eq!(delay.total_ms(), u64::from(DEFAULT_SETTLE_MS));
}

#[test]
fn test_release_precedes_assert() {
    let (mut pair, lines) = pair_with_lines();
    let mut delay = RecordingDelay::new();

    pair.command(ActuatorDirection::Forward, &mut delay).unwrap();
    lines.clear_log();
    pair.command(ActuatorDirection::Reverse, &mut delay).unwrap();

    let log = lines.write_log();
    assert_eq!(log.len(), 6);
    // Every line is released before anything is asserted
    assert!(log[..4].iter().all(|(_, asserted)| !asserted));
    assert_eq!(
        &log[4..],
        &[(DriveLine::AReverse, true), (DriveLine::BReverse, true)]
    );
    assert_eq!(lines.asserted_lines(), vec![DriveLine::AReverse, DriveLine::BReverse]);
}

#[test]
fn test_direction_flips_never_overlap() {
    let (mut pair, lines) = pair_with_lines();
    let mut delay = RecordingDelay::new();

    let sequence = [
        ActuatorDirection::Forward,
        ActuatorDirection::Reverse,
        ActuatorDirection::Forward,
        ActuatorDirection::Off,
        ActuatorDirection::Reverse,
        ActuatorDirection::Reverse,
        ActuatorDirection::Forward,
    ];
    for direction in sequence {
        pair.command(direction, &mut delay).unwrap();
    }

    assert_eq!(lines.conflicts(), 0);
    assert_eq!(pair.commands_issued(), sequence.len() as u32);
    // No settle wait is needed to stop
    assert_eq!(delay.calls(), 6);
}

#[test]
fn test_off_releases_everything_without_delay() {
    let (mut pair, lines) = pair_with_lines();
    let mut delay = RecordingDelay::new();

    pair.command(ActuatorDirection::Reverse, &mut delay).unwrap();
    pair.command(ActuatorDirection::Off, &mut delay).unwrap();

    assert!(lines.asserted_lines().is_empty());
    assert_eq!(pair.last_command(), ActuatorDirection::Off);
    assert_eq!(pair.last_travel(), Some(ActuatorDirection::Reverse));
    assert_eq!(delay.calls(), 1);
}

#[test]
fn test_failed_write_reports_error() {
    let (mut pair, lines) = pair_with_lines();
    let mut delay = RecordingDelay::new();
    lines.set_failing(true);

    let result = pair.command(ActuatorDirection::Forward, &mut delay);
    assert_eq!(result, Err(PeripheralError::NotResponding("actuator driver")));
    assert_eq!(pair.last_travel(), None);
    assert!(lines.asserted_lines().is_empty());
}

/// Drive lines whose B-side forward driver rejects asserts; every other
/// write lands.
struct BrokenBForward {
    state: Arc<Mutex<[bool; 4]>>,
}

impl DriveLines for BrokenBForward {
    fn write(&mut self, line: DriveLine, asserted: bool) -> Result<(), PeripheralError> {
        if line == DriveLine::BForward && asserted {
            return Err(PeripheralError::Bus("B driver"));
        }
        if let Some(index) = DriveLine::ALL.iter().position(|l| *l == line) {
            self.state.lock().unwrap()[index] = asserted;
        }
        Ok(())
    }
}

#[test]
fn test_partial_assert_failure_releases_both_actuators() {
    let state = Arc::new(Mutex::new([false; 4]));
    let mut pair = ActuatorPair::new(
        Box::new(BrokenBForward { state: state.clone() }),
        DEFAULT_SETTLE_MS,
    );
    let mut delay = RecordingDelay::new();

    let result = pair.command(ActuatorDirection::Forward, &mut delay);
    assert_eq!(result, Err(PeripheralError::Bus("B driver")));
    assert_eq!(*state.lock().unwrap(), [false; 4]);
    assert_eq!(pair.last_command(), ActuatorDirection::Off);
    assert_eq!(pair.asserted_lines().count(), 0);
    assert_eq!(pair.commands_issued(), 0);

    // Reverse does not touch the broken driver
    pair.command(ActuatorDirection::Reverse, &mut delay).unwrap();
    assert_eq!(*state.lock().unwrap(), [false, false, true, true]);
    assert_eq!(
        pair.asserted_lines().collect::<Vec<_>>(),
        vec![DriveLine::AReverse, DriveLine::BReverse]
    );
}

#[test]
fn test_bank_routes_commands_per_bay() {
    let delay = RecordingDelay::new();
    let mut bank = ActuatorBank::new(Box::new(delay.clone()));
    let bay_1 = SimulatedDriveLines::new();
    let bay_2 = SimulatedDriveLines::new();
    bank.add_pair(BayId(1), ActuatorPair::new(Box::new(bay_1.clone()), 25)).unwrap();
    bank.add_pair(BayId(2), ActuatorPair::new(Box::new(bay_2.clone()), 25)).unwrap();
    assert!(bank.add_pair(BayId(2), ActuatorPair::new(Box::new(SimulatedDriveLines::new()), 25)).is_err());
    assert_eq!(bank.len(), 2);

    bank.command(BayId(2), ActuatorDirection::Forward).unwrap();
    assert!(bay_1.asserted_lines().is_empty());
    assert_eq!(bay_2.asserted_lines(), vec![DriveLine::AForward, DriveLine::BForward]);
    assert_eq!(bank.last_command(BayId(1)), Some(ActuatorDirection::Off));
    assert_eq!(bank.last_travel(BayId(2)), Some(ActuatorDirection::Forward));
    assert_eq!(delay.total_ms(), 25);

    assert_eq!(
        bank.command(BayId(3), ActuatorDirection::Off),
        Err(PeripheralError::UnknownBay(BayId(3)))
    );
    assert_eq!(bank.last_command(BayId(3)), None);
}
