//! In-memory peripherals for the simulator binary and tests.
//!
//! Every simulated device is a cheap cloneable handle over shared state: one
//! clone is boxed into the agent, the other stays with the caller to drive
//! inputs and inspect outputs. Each device can be switched into a failing
//! mode to exercise the degraded paths.

use super::{
    AlertOutputs, CredentialReader, DriveLine, DriveLines, IndicatorColor, OccupancySensors,
    RadioLink, SettleDelay, StatusDisplay,
};
use crate::agent::Peripherals;
use crate::bay::{BayId, MAX_BAYS};
use crate::config::StationConfig;
use crate::credentials::CredentialId;
use crate::error::PeripheralError;
use heapless::{Deque, Vec};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const MAX_PENDING_CARDS: usize = 8;
const MAX_DRIVE_LOG: usize = 64;
const MAX_RADIO_FRAMES: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SensorBoard {
    bits: Vec<(BayId, bool, bool), MAX_BAYS>,
    failing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedSensors {
    board: Arc<Mutex<SensorBoard>>,
}

impl SimulatedSensors {
    pub fn new(bays: &[BayId]) -> Self {
        let mut board = SensorBoard::default();
        for &bay in bays.iter().take(MAX_BAYS) {
            let _ = board.bits.push((bay, false, false));
        }
        Self { board: Arc::new(Mutex::new(board)) }
    }

    pub fn set(&self, bay: BayId, sensor_a: bool, sensor_b: bool) -> Result<(), PeripheralError> {
        let mut board = lock(&self.board);
        let entry = board
            .bits
            .iter_mut()
            .find(|(id, _, _)| *id == bay)
            .ok_or(PeripheralError::UnknownBay(bay))?;
        entry.1 = sensor_a;
        entry.2 = sensor_b;
        Ok(())
    }

    /// Park a bike squarely (both sensors) or remove it.
    pub fn set_occupied(&self, bay: BayId, occupied: bool) -> Result<(), PeripheralError> {
        self.set(bay, occupied, occupied)
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.board).failing = failing;
    }
}

impl OccupancySensors for SimulatedSensors {
    fn read(&mut self, bay: BayId) -> Result<(bool, bool), PeripheralError> {
        let board = lock(&self.board);
        if board.failing {
            return Err(PeripheralError::NotResponding("occupancy sensors"));
        }
        board
            .bits
            .iter()
            .find(|(id, _, _)| *id == bay)
            .map(|&(_, a, b)| (a, b))
            .ok_or(PeripheralError::UnknownBay(bay))
    }
}

#[derive(Debug, Default)]
struct CardQueue {
    pending: Deque<CredentialId, MAX_PENDING_CARDS>,
    failing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedReader {
    queue: Arc<Mutex<CardQueue>>,
}

impl SimulatedReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tap a card on the reader. Returns the card back if the queue is full.
    pub fn present(&self, id: CredentialId) -> Result<(), CredentialId> {
        lock(&self.queue).pending.push_back(id)
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).pending.len()
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.queue).failing = failing;
    }
}

impl CredentialReader for SimulatedReader {
    fn poll(&mut self) -> nb::Result<CredentialId, PeripheralError> {
        let mut queue = lock(&self.queue);
        if queue.failing {
            return Err(nb::Error::Other(PeripheralError::NotResponding("card reader")));
        }
        queue.pending.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

#[derive(Debug, Default)]
struct DriveState {
    asserted: [bool; 4],
    log: Vec<(DriveLine, bool), MAX_DRIVE_LOG>,
    conflicts: u32,
    failing: bool,
}

fn line_index(line: DriveLine) -> usize {
    match line {
        DriveLine::AForward => 0,
        DriveLine::BForward => 1,
        DriveLine::AReverse => 2,
        DriveLine::BReverse => 3,
    }
}

fn opposing(line: DriveLine) -> DriveLine {
    match line {
        DriveLine::AForward => DriveLine::AReverse,
        DriveLine::AReverse => DriveLine::AForward,
        DriveLine::BForward => DriveLine::BReverse,
        DriveLine::BReverse => DriveLine::BForward,
    }
}

/// Drive lines of one bay. Counts every moment in which forward and reverse
/// were asserted together on the same actuator.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDriveLines {
    state: Arc<Mutex<DriveState>>,
}

impl SimulatedDriveLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_asserted(&self, line: DriveLine) -> bool {
        lock(&self.state).asserted[line_index(line)]
    }

    pub fn asserted_lines(&self) -> std::vec::Vec<DriveLine> {
        let state = lock(&self.state);
        DriveLine::ALL
            .iter()
            .copied()
            .filter(|line| state.asserted[line_index(*line)])
            .collect()
    }

    /// Most recent writes, oldest first.
    pub fn write_log(&self) -> std::vec::Vec<(DriveLine, bool)> {
        lock(&self.state).log.iter().copied().collect()
    }

    pub fn clear_log(&self) {
        lock(&self.state).log.clear();
    }

    pub fn conflicts(&self) -> u32 {
        lock(&self.state).conflicts
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }
}

impl DriveLines for SimulatedDriveLines {
    fn write(&mut self, line: DriveLine, asserted: bool) -> Result<(), PeripheralError> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(PeripheralError::NotResponding("actuator driver"));
        }
        state.asserted[line_index(line)] = asserted;
        if asserted && state.asserted[line_index(opposing(line))] {
            state.conflicts = state.conflicts.saturating_add(1);
        }
        if state.log.is_full() {
            state.log.remove(0);
        }
        let _ = state.log.push((line, asserted));
        Ok(())
    }
}

/// Records settle delays instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    total_ms: Arc<AtomicU64>,
    calls: Arc<AtomicU32>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl SettleDelay for RecordingDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms.fetch_add(u64::from(ms), Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct AlertBoard {
    alarm_on: bool,
    alarm_rising_edges: u32,
    indicators: Vec<(BayId, IndicatorColor), MAX_BAYS>,
    failing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedAlertOutputs {
    board: Arc<Mutex<AlertBoard>>,
}

impl SimulatedAlertOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alarm_on(&self) -> bool {
        lock(&self.board).alarm_on
    }

    /// Number of off→on transitions of the shared buzzer.
    pub fn alarm_rising_edges(&self) -> u32 {
        lock(&self.board).alarm_rising_edges
    }

    pub fn indicator(&self, bay: BayId) -> IndicatorColor {
        lock(&self.board)
            .indicators
            .iter()
            .find(|(id, _)| *id == bay)
            .map_or(IndicatorColor::Off, |(_, color)| *color)
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.board).failing = failing;
    }
}

impl AlertOutputs for SimulatedAlertOutputs {
    fn set_alarm(&mut self, on: bool) -> Result<(), PeripheralError> {
        let mut board = lock(&self.board);
        if board.failing {
            return Err(PeripheralError::NotResponding("buzzer"));
        }
        if on && !board.alarm_on {
            board.alarm_rising_edges = board.alarm_rising_edges.saturating_add(1);
        }
        board.alarm_on = on;
        Ok(())
    }

    fn set_indicator(&mut self, bay: BayId, color: IndicatorColor) -> Result<(), PeripheralError> {
        let mut board = lock(&self.board);
        if board.failing {
            return Err(PeripheralError::NotResponding("indicator"));
        }
        if let Some(entry) = board.indicators.iter_mut().find(|(id, _)| *id == bay) {
            entry.1 = color;
            return Ok(());
        }
        board
            .indicators
            .push((bay, color))
            .map_err(|_| PeripheralError::UnknownBay(bay))
    }
}

#[derive(Debug, Default)]
struct Airwaves {
    frames: Deque<String, MAX_RADIO_FRAMES>,
    failing: bool,
}

/// Radio whose transmissions land in a local buffer, standing in for the
/// remote monitor's receiver.
#[derive(Debug, Clone, Default)]
pub struct LoopbackRadio {
    air: Arc<Mutex<Airwaves>>,
}

impl LoopbackRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every frame received since the last call.
    pub fn drain(&self) -> std::vec::Vec<String> {
        let mut air = lock(&self.air);
        let mut frames = std::vec::Vec::with_capacity(air.frames.len());
        while let Some(frame) = air.frames.pop_front() {
            frames.push(frame);
        }
        frames
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.air).failing = failing;
    }
}

impl RadioLink for LoopbackRadio {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), PeripheralError> {
        let mut air = lock(&self.air);
        if air.failing {
            return Err(PeripheralError::NotResponding("radio"));
        }
        let text = String::from_utf8_lossy(frame).into_owned();
        if air.frames.is_full() {
            air.frames.pop_front();
        }
        let _ = air.frames.push_back(text);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Screen {
    lines: std::vec::Vec<String>,
    renders: u32,
    failing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TextDisplay {
    screen: Arc<Mutex<Screen>>,
}

impl TextDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> std::vec::Vec<String> {
        lock(&self.screen).lines.clone()
    }

    pub fn renders(&self) -> u32 {
        lock(&self.screen).renders
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.screen).failing = failing;
    }
}

impl StatusDisplay for TextDisplay {
    fn show(&mut self, lines: &[&str]) -> Result<(), PeripheralError> {
        let mut screen = lock(&self.screen);
        if screen.failing {
            return Err(PeripheralError::NotResponding("display"));
        }
        screen.lines = lines.iter().map(|line| (*line).to_string()).collect();
        screen.renders = screen.renders.saturating_add(1);
        Ok(())
    }
}

/// Caller-side handles to a simulated station's peripherals.
#[derive(Debug, Clone)]
pub struct SimHandles {
    pub sensors: SimulatedSensors,
    pub reader: SimulatedReader,
    pub drive_lines: std::vec::Vec<(BayId, SimulatedDriveLines)>,
    pub delay: RecordingDelay,
    pub alerts: SimulatedAlertOutputs,
    pub radio: LoopbackRadio,
    pub display: TextDisplay,
}

impl SimHandles {
    pub fn drive_lines_for(&self, bay: BayId) -> Option<&SimulatedDriveLines> {
        self.drive_lines.iter().find(|(id, _)| *id == bay).map(|(_, lines)| lines)
    }
}

/// Build a full set of simulated peripherals for `config`.
pub fn simulated_station(config: &StationConfig) -> (Peripherals, SimHandles) {
    let bay_ids: std::vec::Vec<BayId> = config.bay_ids().collect();

    let sensors = SimulatedSensors::new(&bay_ids);
    let reader = SimulatedReader::new();
    let delay = RecordingDelay::new();
    let alerts = SimulatedAlertOutputs::new();
    let radio = LoopbackRadio::new();
    let display = TextDisplay::new();
    let drive_lines: std::vec::Vec<(BayId, SimulatedDriveLines)> = bay_ids
        .iter()
        .map(|&bay| (bay, SimulatedDriveLines::new()))
        .collect();

    let peripherals = Peripherals {
        sensors: Box::new(sensors.clone()),
        reader: Some(Box::new(reader.clone())),
        drive_lines: drive_lines
            .iter()
            .map(|(bay, lines)| (*bay, Box::new(lines.clone()) as Box<dyn DriveLines + Send>))
            .collect(),
        delay: Box::new(delay.clone()),
        alert_outputs: Box::new(alerts.clone()),
        radio: Some(Box::new(radio.clone())),
        display: Some(Box::new(display.clone())),
    };

    let handles = SimHandles {
        sensors,
        reader,
        drive_lines,
        delay,
        alerts,
        radio,
        display,
    };

    (peripherals, handles)
}
