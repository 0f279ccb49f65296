use crate::actuator::{ActuatorBank, ActuatorPair};
use crate::alert::AlertEngine;
use crate::bay::{BayId, BayStatus};
use crate::config::StationConfig;
use crate::controller::{Advisory, BayController};
use crate::credentials::CredentialId;
use crate::display::{render_lines, StationSnapshot, READY_MESSAGE};
use crate::error::{AgentError, PeripheralError};
use crate::peripherals::{
    AlertOutputs, CredentialReader, DriveLines, OccupancySensors, RadioLink, SettleDelay,
    StatusDisplay,
};
use crate::protocol::{Command, CommandResponse, CommandType, ProtocolHandler, ResponseStatus};
use crate::telemetry::{Delivery, TelemetryFrame, TelemetrySender, TelemetryStats};
use heapless::{spsc::Queue, Deque, Vec};
use serde::{Deserialize, Serialize};
use static_assertions::assert_impl_all;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MAX_COMMAND_QUEUE_SIZE: usize = 32;
const MAX_PENDING_CREDENTIALS: usize = 4;
const MAX_RESPONSES: usize = 16;
/// Frames produced between two `update` calls (status changes plus manual sends).
pub const MAX_CYCLE_FRAMES: usize = 32;

type CommandQueue = Queue<Command, MAX_COMMAND_QUEUE_SIZE>;

/// Hardware adapters handed to the agent at construction. A `None` reader,
/// radio or display means that peripheral failed to initialise; the station
/// keeps running without it.
pub struct Peripherals {
    pub sensors: Box<dyn OccupancySensors + Send>,
    pub reader: Option<Box<dyn CredentialReader + Send>>,
    pub drive_lines: std::vec::Vec<(BayId, Box<dyn DriveLines + Send>)>,
    pub delay: Box<dyn SettleDelay + Send>,
    pub alert_outputs: Box<dyn AlertOutputs + Send>,
    pub radio: Option<Box<dyn RadioLink + Send>>,
    pub display: Option<Box<dyn StatusDisplay + Send>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub running: bool,
    pub uptime_ms: u64,
    pub cycle_count: u64,
    pub command_count: u32,
    pub telemetry_count: u32,
    pub last_error: Option<String>,
    pub last_message: String,
    pub performance_stats: PerformanceStats,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PerformanceStats {
    pub loop_time_us: u32,
    pub max_loop_time_us: u32,
    pub controller_time_us: u32,
    pub command_processing_time_us: u32,
}

pub struct ParkingAgent {
    controller: BayController,
    actuators: ActuatorBank,
    alerts: AlertEngine,
    telemetry: TelemetrySender,
    sensors: Box<dyn OccupancySensors + Send>,
    reader: Option<Box<dyn CredentialReader + Send>>,
    display: Option<Box<dyn StatusDisplay + Send>>,
    protocol_handler: ProtocolHandler,

    state: AgentState,
    start_time: Instant,
    now_ms: u64,
    reader_faulted: bool,

    command_queue: CommandQueue,
    pending_credentials: Deque<CredentialId, MAX_PENDING_CREDENTIALS>,
    response_buffer: Vec<CommandResponse, MAX_RESPONSES>,
    cycle_frames: Vec<TelemetryFrame, MAX_CYCLE_FRAMES>,
    rendered: std::vec::Vec<String>,
}

assert_impl_all!(ParkingAgent: Send);

impl ParkingAgent {
    /// Wire the station together.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or a configured bay has no drive
    /// lines.
    pub fn new(config: &StationConfig, peripherals: Peripherals) -> Result<Self, AgentError> {
        config.validate()?;
        let allow_list = config.allow_list()?;

        let Peripherals {
            sensors,
            reader,
            mut drive_lines,
            delay,
            alert_outputs,
            radio,
            display,
        } = peripherals;

        let mut actuators = ActuatorBank::new(delay);
        for bay in config.bay_ids() {
            let index = drive_lines
                .iter()
                .position(|(id, _)| *id == bay)
                .ok_or(AgentError::MissingDriveLines(bay))?;
            let (_, lines) = drive_lines.swap_remove(index);
            actuators
                .add_pair(bay, ActuatorPair::new(lines, config.timing.settle_ms))
                .map_err(|_| AgentError::MissingDriveLines(bay))?;
        }

        if reader.is_none() {
            warn!("card reader not available, only maintenance-channel taps accepted");
        }
        if display.is_none() {
            warn!("status display not available");
        }

        let controller = BayController::new(
            config.bay_ids(),
            allow_list,
            config.timing.lock_duration_ms,
        );
        let alerts = AlertEngine::new(config.timing.alert_timing(), alert_outputs, config.bay_ids());

        Ok(Self {
            controller,
            actuators,
            alerts,
            telemetry: TelemetrySender::new(radio),
            sensors,
            reader,
            display,
            protocol_handler: ProtocolHandler::new(),
            state: AgentState {
                running: false,
                uptime_ms: 0,
                cycle_count: 0,
                command_count: 0,
                telemetry_count: 0,
                last_error: None,
                last_message: READY_MESSAGE.to_string(),
                performance_stats: PerformanceStats::default(),
            },
            start_time: Instant::now(),
            now_ms: 0,
            reader_faulted: false,
            command_queue: Queue::new(),
            pending_credentials: Deque::new(),
            response_buffer: Vec::new(),
            cycle_frames: Vec::new(),
            rendered: std::vec::Vec::new(),
        })
    }

    /// Announce every bay's initial status and light the indicators.
    ///
    /// The station clock keeps running across `stop`/`start`, so deadlines
    /// armed before a stop still fall due at their original time.
    pub fn start(&mut self) {
        self.state.running = true;
        self.start_time = Instant::now()
            .checked_sub(Duration::from_millis(self.now_ms))
            .unwrap_or_else(Instant::now);

        info!(
            now_ms = self.now_ms,
            bays = self.controller.bays().len(),
            credentials = self.controller.allow_list().len(),
            radio = self.telemetry.has_radio(),
            "bike parking station starting"
        );

        for (bay, status) in self.controller.statuses() {
            self.send_status(bay, status);
        }
        self.alerts.tick(self.now_ms, &self.controller.statuses());
        self.refresh_display();
    }

    pub fn stop(&mut self) {
        self.state.running = false;
        info!("bike parking station stopping");
    }

    /// Run one cycle on the monotonic clock.
    pub fn update(&mut self) -> Result<Vec<TelemetryFrame, MAX_CYCLE_FRAMES>, AgentError> {
        let now = u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.update_at(now)
    }

    /// Run one sense → decide → act → report cycle at `now_ms`. Returns the
    /// telemetry frames emitted since the previous cycle.
    pub fn update_at(&mut self, now_ms: u64) -> Result<Vec<TelemetryFrame, MAX_CYCLE_FRAMES>, AgentError> {
        if !self.state.running {
            return Ok(Vec::new());
        }

        let loop_start = Instant::now();
        self.now_ms = self.now_ms.max(now_ms);
        let now = self.now_ms;
        self.state.uptime_ms = now;

        self.process_commands()?;

        let credential = self.next_credential();

        let controller_start = Instant::now();
        let output = self.controller.poll(
            now,
            self.sensors.as_mut(),
            credential.as_ref(),
            &mut self.actuators,
        );
        self.state.performance_stats.controller_time_us = elapsed_us(controller_start);

        for change in &output.status_changes {
            self.send_status(change.bay, change.status);
        }
        for request in &output.alerts {
            self.alerts.trigger(request.bay, request.kind, now);
        }
        self.alerts.tick(now, &self.controller.statuses());

        if let Some(advisory) = output.advisory {
            self.show_advisory(advisory);
        }
        self.refresh_display();

        self.state.cycle_count = self.state.cycle_count.saturating_add(1);
        self.update_performance_stats(loop_start);

        Ok(core::mem::take(&mut self.cycle_frames))
    }

    fn next_credential(&mut self) -> Option<CredentialId> {
        if let Some(id) = self.pending_credentials.pop_front() {
            return Some(id);
        }

        let reader = self.reader.as_mut()?;
        match reader.poll() {
            Ok(id) => {
                self.reader_faulted = false;
                Some(id)
            }
            Err(nb::Error::WouldBlock) => {
                self.reader_faulted = false;
                None
            }
            Err(nb::Error::Other(e)) => {
                if !self.reader_faulted {
                    warn!(error = %e, "card reader failed");
                    self.state.last_error = Some(format!("Card reader: {}", e));
                    self.reader_faulted = true;
                }
                None
            }
        }
    }

    fn show_advisory(&mut self, advisory: Advisory) {
        let message = advisory.to_string();
        if message != self.state.last_message {
            debug!(%message, "display message");
            self.state.last_message = message;
        }
    }

    fn send_status(&mut self, bay: BayId, status: BayStatus) -> Delivery {
        let delivery = self.telemetry.send(bay, status);
        if delivery == Delivery::Sent {
            self.state.telemetry_count = self.state.telemetry_count.saturating_add(1);
        }
        if self.cycle_frames.is_full() {
            self.cycle_frames.remove(0);
        }
        let _ = self.cycle_frames.push(TelemetryFrame::new(bay, status));
        delivery
    }

    fn refresh_display(&mut self) {
        let Some(display) = self.display.as_mut() else {
            return;
        };

        let lines = render_lines(&self.controller.snapshot(&self.state.last_message));
        if lines == self.rendered {
            return;
        }

        let refs: std::vec::Vec<&str> = lines.iter().map(String::as_str).collect();
        if let Err(e) = display.show(&refs) {
            warn!(error = %e, "display update failed");
            self.state.last_error = Some(format!("Display: {}", e));
        }
        self.rendered = lines;
    }

    fn update_performance_stats(&mut self, loop_start: Instant) {
        let stats = &mut self.state.performance_stats;
        stats.loop_time_us = elapsed_us(loop_start);
        stats.max_loop_time_us = stats.max_loop_time_us.max(stats.loop_time_us);
    }

    pub fn queue_command(&mut self, command: Command) -> Result<(), AgentError> {
        self.command_queue
            .enqueue(command)
            .map_err(|_| AgentError::CommandQueueFull)
    }

    /// Parse a JSON command line and queue it.
    pub fn queue_command_json(&mut self, json: &str) -> Result<u32, AgentError> {
        let command = self.protocol_handler.parse_command(json)?;
        let id = command.id;
        self.queue_command(command)?;
        Ok(id)
    }

    /// Queue a card tap as if it had been read by the reader.
    pub fn present_credential(&mut self, id: CredentialId) -> Result<(), AgentError> {
        self.pending_credentials
            .push_back(id)
            .map_err(|_| AgentError::CredentialQueueFull)
    }

    pub fn process_commands(&mut self) -> Result<(), AgentError> {
        let start = Instant::now();

        while let Some(command) = self.command_queue.dequeue() {
            let response = self.execute_command(command);
            if self.response_buffer.is_full() {
                self.response_buffer.remove(0);
            }
            let _ = self.response_buffer.push(response);
            self.state.command_count = self.state.command_count.saturating_add(1);
        }

        self.state.performance_stats.command_processing_time_us = elapsed_us(start);
        Ok(())
    }

    fn execute_command(&mut self, command: Command) -> CommandResponse {
        let now = self.now_ms;
        let handler = &self.protocol_handler;

        if let Err(e) = handler.validate_command(&command) {
            return handler.create_nack_response(
                command.id,
                now,
                &format!("Command validation failed: {}", e),
            );
        }

        debug!(id = command.id, command = ?command.command_type, "executing command");

        match command.command_type {
            CommandType::Ping => {
                handler.create_response(command.id, now, ResponseStatus::Success, Some("pong"))
            }

            CommandType::SystemStatus => match serde_json::to_string(&self.snapshot()) {
                Ok(json) => handler.create_response(command.id, now, ResponseStatus::Success, Some(&json)),
                Err(e) => handler.create_response(
                    command.id,
                    now,
                    ResponseStatus::ExecutionFailed,
                    Some(&format!("Snapshot serialization failed: {}", e)),
                ),
            },

            CommandType::PresentCredential { uid } => match CredentialId::new(&uid) {
                Ok(id) => match self.pending_credentials.push_back(id) {
                    Ok(()) => handler.create_ack_response(command.id, now, Some("Credential queued")),
                    Err(_) => handler.create_nack_response(command.id, now, "Credential queue full"),
                },
                Err(e) => handler.create_nack_response(command.id, now, &e.to_string()),
            },

            CommandType::SetSensors { .. } => handler.create_nack_response(
                command.id,
                now,
                "Sensor override is only available in the simulator",
            ),

            CommandType::RunActuator { bay, direction } => {
                match self.controller.run_maintenance(bay, direction, &mut self.actuators) {
                    Ok(()) => handler.create_response(
                        command.id,
                        now,
                        ResponseStatus::Success,
                        Some(&format!("Space {} actuators {}", bay, direction)),
                    ),
                    Err(e @ crate::error::MaintenanceError::Actuator(_)) => {
                        self.state.last_error = Some(e.to_string());
                        handler.create_response(
                            command.id,
                            now,
                            ResponseStatus::ExecutionFailed,
                            Some(&e.to_string()),
                        )
                    }
                    Err(e) => handler.create_nack_response(command.id, now, &e.to_string()),
                }
            }

            CommandType::SendStatus { bay, status } => {
                let Some(current) = self.controller.bay(bay).map(|b| b.status()) else {
                    return handler.create_nack_response(
                        command.id,
                        now,
                        &PeripheralError::UnknownBay(bay).to_string(),
                    );
                };
                let frame = TelemetryFrame::new(bay, status.unwrap_or(current));
                let delivery = self.send_status(frame.bay, frame.status);
                let status = match delivery {
                    Delivery::Sent => ResponseStatus::Success,
                    Delivery::Failed | Delivery::Dropped => ResponseStatus::ExecutionFailed,
                };
                self.protocol_handler.create_response(
                    command.id,
                    now,
                    status,
                    Some(&format!("{} ({:?})", frame, delivery)),
                )
            }
        }
    }

    pub fn get_responses(&mut self) -> Vec<CommandResponse, MAX_RESPONSES> {
        core::mem::take(&mut self.response_buffer)
    }

    pub fn snapshot(&self) -> StationSnapshot {
        self.controller.snapshot(&self.state.last_message)
    }

    pub fn get_state(&self) -> &AgentState {
        &self.state
    }

    pub fn controller(&self) -> &BayController {
        &self.controller
    }

    pub fn actuators(&self) -> &ActuatorBank {
        &self.actuators
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn telemetry_stats(&self) -> &TelemetryStats {
        self.telemetry.stats()
    }

    pub fn telemetry(&self) -> &TelemetrySender {
        &self.telemetry
    }

    /// Milliseconds on the agent's clock as of the last cycle.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

impl core::fmt::Debug for ParkingAgent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParkingAgent")
            .field("controller", &self.controller)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn elapsed_us(since: Instant) -> u32 {
    u32::try_from(since.elapsed().as_micros()).unwrap_or(u32::MAX)
}
