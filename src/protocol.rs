use crate::actuator::ActuatorDirection;
use crate::bay::{BayId, BayStatus};
use crate::credentials::CredentialId;
use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_COMMAND_SIZE: usize = 512;
pub const MAX_RESPONSE_SIZE: usize = 4096;

pub type CommandBuffer = ArrayString<MAX_COMMAND_SIZE>;
pub type ResponseBuffer = ArrayString<MAX_RESPONSE_SIZE>;

/// One maintenance-channel request, sent as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: u32,
    pub timestamp: u64,
    pub command_type: CommandType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandType {
    Ping,
    SystemStatus,
    /// Simulated card tap; consumed as the next cycle's credential.
    PresentCredential { uid: String },
    /// Simulator only: set a bay's raw sensor bits.
    SetSensors { bay: BayId, sensor_a: bool, sensor_b: bool },
    RunActuator { bay: BayId, direction: ActuatorDirection },
    /// Transmit a status frame now. `status` overrides the bay's own.
    SendStatus { bay: BayId, status: Option<BayStatus> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: u32,
    pub timestamp: u64,
    pub status: ResponseStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    /// Accepted; takes effect on a later poll cycle.
    Acknowledged,
    /// Rejected before execution (invalid or not allowed now).
    NegativeAck,
    ExecutionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON format")]
    InvalidJson,
    #[error("Message exceeds buffer size")]
    MessageTooLarge,
    #[error("Serialization failed")]
    SerializationError,
    #[error("Invalid command")]
    InvalidCommand,
    #[error("Invalid parameter")]
    InvalidParameter,
}

#[derive(Debug)]
pub struct ProtocolHandler {
    command_counter: u32,
    command_buffer: CommandBuffer,
    response_buffer: ResponseBuffer,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self {
            command_counter: 0,
            command_buffer: ArrayString::new(),
            response_buffer: ArrayString::new(),
        }
    }

    pub fn parse_command(&mut self, json_str: &str) -> Result<Command, ProtocolError> {
        self.command_buffer.clear();
        if json_str.len() > MAX_COMMAND_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        self.command_buffer.push_str(json_str);

        serde_json::from_str::<Command>(&self.command_buffer).map_err(|_| ProtocolError::InvalidJson)
    }

    pub fn serialize_command(&mut self, command: &Command) -> Result<String, ProtocolError> {
        let json_str = serde_json::to_string(command).map_err(|_| ProtocolError::SerializationError)?;
        if json_str.len() > MAX_COMMAND_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        Ok(json_str)
    }

    pub fn serialize_response(&mut self, response: &CommandResponse) -> Result<&str, ProtocolError> {
        self.response_buffer.clear();

        let json_str = serde_json::to_string(response).map_err(|_| ProtocolError::SerializationError)?;
        if json_str.len() > MAX_RESPONSE_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        self.response_buffer.push_str(&json_str);

        Ok(&self.response_buffer)
    }

    pub fn create_response(
        &self,
        command_id: u32,
        timestamp: u64,
        status: ResponseStatus,
        message: Option<&str>,
    ) -> CommandResponse {
        CommandResponse {
            id: command_id,
            timestamp,
            status,
            message: message.map(ToString::to_string),
        }
    }

    pub fn create_ack_response(&self, command_id: u32, timestamp: u64, message: Option<&str>) -> CommandResponse {
        self.create_response(command_id, timestamp, ResponseStatus::Acknowledged, message)
    }

    pub fn create_nack_response(&self, command_id: u32, timestamp: u64, reason: &str) -> CommandResponse {
        self.create_response(command_id, timestamp, ResponseStatus::NegativeAck, Some(reason))
    }

    pub fn next_command_id(&mut self) -> u32 {
        self.command_counter = self.command_counter.wrapping_add(1);
        if self.command_counter == 0 {
            self.command_counter = 1;
        }
        self.command_counter
    }

    pub fn validate_command(&self, command: &Command) -> Result<(), ProtocolError> {
        if command.id == 0 {
            return Err(ProtocolError::InvalidCommand);
        }

        match &command.command_type {
            CommandType::PresentCredential { uid } => {
                CredentialId::new(uid).map_err(|_| ProtocolError::InvalidParameter)?;
            }
            CommandType::SetSensors { bay, .. }
            | CommandType::RunActuator { bay, .. }
            | CommandType::SendStatus { bay, .. } => {
                if bay.get() == 0 {
                    return Err(ProtocolError::InvalidParameter);
                }
            }
            CommandType::Ping | CommandType::SystemStatus => {}
        }

        Ok(())
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}
