//! # Bike Bay Controller
//!
//! An embedded-style controller for automated bicycle-parking bays: two
//! presence sensors per bay, a card reader, an interlocked pair of linear
//! actuators that extend a retention mechanism, a shared alarm with per-bay
//! colour indicators, and a low-power radio that reports bay status to a
//! remote monitor.
//!
//! ## Features
//!
//! - **Per-bay state machine**: lock, unlock, theft detection and manual reset
//! - **Actuator interlock**: all drive lines released and settled before any
//!   direction is asserted
//! - **Alert cadences**: acknowledge beep and a five-cycle theft alarm driven
//!   from deadlines, never from sleeps
//! - **Best-effort telemetry**: `"Space {id}: {status}"` frames, at most once
//! - **Bounded memory**: fixed-capacity collections for bays, queues and history
//!
//! ## Quick Start
//!
//! ```rust
//! use bikebay::config::StationConfig;
//! use bikebay::credentials::CredentialId;
//! use bikebay::peripherals::sim::simulated_station;
//! use bikebay::{BayId, ParkingAgent};
//!
//! let config = StationConfig::default();
//! let (peripherals, sim) = simulated_station(&config);
//! let mut agent = ParkingAgent::new(&config, peripherals).unwrap();
//! agent.start();
//!
//! // Park a bike in bay 1 and tap its owner's card
//! sim.sensors.set_occupied(BayId(1), true).unwrap();
//! agent.present_credential(CredentialId::new("3CA0FFE2").unwrap()).unwrap();
//! agent.update_at(50).unwrap();
//!
//! // The mechanism finishes travelling after the lock duration
//! let frames = agent.update_at(50 + config.timing.lock_duration_ms).unwrap();
//! assert_eq!(frames[0].to_string(), "Space 1: occupied");
//! ```
//!
//! ## Architecture
//!
//! - [`agent`] - Poll cycle orchestration and the maintenance command channel
//! - [`controller`] - Bay lock/unlock/theft state machine
//! - [`actuator`] - Interlocked actuator pair driver
//! - [`alert`] - Buzzer and indicator cadences
//! - [`telemetry`] - Status frames over the radio link
//! - [`display`] - Presentation snapshot and OLED layout
//! - [`peripherals`] - Hardware adapter traits and simulated implementations
//! - [`protocol`] - JSON command/response protocol

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::new_without_default)]

pub mod actuator;
pub mod agent;
pub mod alert;
pub mod bay;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod display;
pub mod error;
pub mod peripherals;
pub mod protocol;
pub mod telemetry;

// Re-export main public types for convenience
pub use agent::{ParkingAgent, Peripherals};
pub use bay::{BayId, BayStatus, LockState};
pub use controller::{Advisory, BayController};
pub use protocol::{Command, CommandResponse};
