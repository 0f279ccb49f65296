use bikebay::actuator::ActuatorDirection;
use bikebay::bay::{BayId, BayStatus};
use bikebay::protocol::*;

#[test]
fn test_command_parsing_valid() {
    let mut handler = ProtocolHandler::new();

    let ping_json = r#"{"id":123,"timestamp":1000,"command_type":"Ping"}"#;
    let command = handler.parse_command(ping_json).unwrap();
    assert_eq!(command.id, 123);
    assert_eq!(command.timestamp, 1000);
    assert!(matches!(command.command_type, CommandType::Ping));
}

#[test]
fn test_command_parsing_with_parameters() {
    let mut handler = ProtocolHandler::new();

    let card_json = r#"{"id":1,"timestamp":0,"command_type":{"PresentCredential":{"uid":"3CA0FFE2"}}}"#;
    match handler.parse_command(card_json).unwrap().command_type {
        CommandType::PresentCredential { uid } => assert_eq!(uid, "3CA0FFE2"),
        other => panic!("Expected PresentCredential, got {:?}", other),
    }

    let sensors_json = r#"{"id":2,"timestamp":0,"command_type":{"SetSensors":{"bay":2,"sensor_a":true,"sensor_b":false}}}"#;
    match handler.parse_command(sensors_json).unwrap().command_type {
        CommandType::SetSensors { bay, sensor_a, sensor_b } => {
            assert_eq!(bay, BayId(2));
            assert!(sensor_a);
            assert!(!sensor_b);
        }
        other => panic!("Expected SetSensors, got {:?}", other),
    }

    let actuator_json = r#"{"id":3,"timestamp":0,"command_type":{"RunActuator":{"bay":1,"direction":"Reverse"}}}"#;
    match handler.parse_command(actuator_json).unwrap().command_type {
        CommandType::RunActuator { bay, direction } => {
            assert_eq!(bay, BayId(1));
            assert_eq!(direction, ActuatorDirection::Reverse);
        }
        other => panic!("Expected RunActuator, got {:?}", other),
    }

    let send_json = r#"{"id":4,"timestamp":0,"command_type":{"SendStatus":{"bay":1,"status":null}}}"#;
    match handler.parse_command(send_json).unwrap().command_type {
        CommandType::SendStatus { bay, status } => {
            assert_eq!(bay, BayId(1));
            assert!(status.is_none());
        }
        other => panic!("Expected SendStatus, got {:?}", other),
    }
}

#[test]
fn test_command_parsing_invalid() {
    let mut handler = ProtocolHandler::new();

    assert_eq!(handler.parse_command("not json").unwrap_err(), ProtocolError::InvalidJson);
    assert_eq!(
        handler
            .parse_command(r#"{"id":1,"timestamp":0,"command_type":"OpenAllBays"}"#)
            .unwrap_err(),
        ProtocolError::InvalidJson
    );
    assert_eq!(
        handler
            .parse_command(r#"{"id":1,"timestamp":0,"command_type":{"SendStatus":{"bay":1,"status":"parked"}}}"#)
            .unwrap_err(),
        ProtocolError::InvalidJson
    );
}

#[test]
fn test_command_too_large() {
    let mut handler = ProtocolHandler::new();
    let uid = "A".repeat(MAX_COMMAND_SIZE);
    let json = format!(
        r#"{{"id":1,"timestamp":0,"command_type":{{"PresentCredential":{{"uid":"{}"}}}}}}"#,
        uid
    );
    assert_eq!(handler.parse_command(&json).unwrap_err(), ProtocolError::MessageTooLarge);
}

#[test]
fn test_serialize_command_matches_wire_format() {
    let mut handler = ProtocolHandler::new();
    let command = Command {
        id: 9,
        timestamp: 5,
        command_type: CommandType::SendStatus {
            bay: BayId(2),
            status: Some(BayStatus::Stolen),
        },
    };

    let json = handler.serialize_command(&command).unwrap();
    assert_eq!(
        json,
        r#"{"id":9,"timestamp":5,"command_type":{"SendStatus":{"bay":2,"status":"stolen"}}}"#
    );
}

#[test]
fn test_response_creation() {
    let mut handler = ProtocolHandler::new();

    let ok = handler.create_response(7, 100, ResponseStatus::Success, Some("pong"));
    assert_eq!(ok.id, 7);
    assert_eq!(ok.timestamp, 100);
    assert_eq!(ok.message.as_deref(), Some("pong"));

    let ack = handler.create_ack_response(8, 100, None);
    assert_eq!(ack.status, ResponseStatus::Acknowledged);
    assert!(ack.message.is_none());

    let nack = handler.create_nack_response(9, 100, "bay 1 is not available");
    assert_eq!(nack.status, ResponseStatus::NegativeAck);
    assert_eq!(nack.message.as_deref(), Some("bay 1 is not available"));

    let json = handler.serialize_response(&nack).unwrap();
    assert!(json.contains(r#""status":"NegativeAck""#));
    let back: CommandResponse = serde_json::from_str(json).unwrap();
    assert_eq!(back.id, 9);
}

#[test]
fn test_validate_command() {
    let handler = ProtocolHandler::new();
    let make = |id, command_type| Command {
        id,
        timestamp: 0,
        command_type,
    };

    assert!(handler.validate_command(&make(1, CommandType::Ping)).is_ok());
    assert_eq!(
        handler.validate_command(&make(0, CommandType::Ping)),
        Err(ProtocolError::InvalidCommand)
    );
    assert_eq!(
        handler.validate_command(&make(
            1,
            CommandType::RunActuator {
                bay: BayId(0),
                direction: ActuatorDirection::Off
            }
        )),
        Err(ProtocolError::InvalidParameter)
    );
    assert_eq!(
        handler.validate_command(&make(
            1,
            CommandType::PresentCredential {
                uid: String::new()
            }
        )),
        Err(ProtocolError::InvalidParameter)
    );
    assert!(handler
        .validate_command(&make(
            1,
            CommandType::PresentCredential {
                uid: "aa2b0c7d".to_string()
            }
        ))
        .is_ok());
}

#[test]
fn test_command_ids_skip_zero() {
    let mut handler = ProtocolHandler::new();
    let first = handler.next_command_id();
    let second = handler.next_command_id();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
}
