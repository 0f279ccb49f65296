use bikebay::actuator::ActuatorDirection;
use bikebay::bay::{BayFault, BayId, BayStatus, LockState};
use bikebay::display::StationSnapshot;
use bikebay::protocol::{Command, CommandResponse, CommandType, ResponseStatus};
use bikebay::telemetry::TelemetryFrame;
use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const COMMAND_TIMEOUT_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("bikebay")
        .version("0.1.0")
        .author("Bike Parking Systems Team")
        .about("🚲 Bike parking bay controller - maintenance client")
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Station host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Station port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("ping")
                .about("🏓 Test connection to the station")
        )
        .subcommand(
            SubCommand::with_name("status")
                .about("📊 Show every bay's state")
                .long_about("Retrieves the presentation snapshot: lock state, occupancy, reported status and latched faults per bay")
        )
        .subcommand(
            SubCommand::with_name("card")
                .about("💳 Present a card to the reader")
                .arg(
                    Arg::with_name("uid")
                        .help("Card UID in hex, e.g. 3CA0FFE2")
                        .required(true)
                )
        )
        .subcommand(
            SubCommand::with_name("sensors")
                .about("🔦 Set a bay's presence sensors (simulator only)")
                .arg(bay_arg())
                .arg(
                    Arg::with_name("sensor_a")
                        .help("First presence sensor")
                        .required(true)
                        .possible_values(&["on", "off"])
                )
                .arg(
                    Arg::with_name("sensor_b")
                        .help("Second presence sensor")
                        .required(true)
                        .possible_values(&["on", "off"])
                )
        )
        .subcommand(
            SubCommand::with_name("actuator")
                .about("🔧 Run a bay's actuators (maintenance)")
                .long_about("Drives both actuators of an idle, empty bay through the interlocked driver. 'off' is always accepted.")
                .arg(bay_arg())
                .arg(
                    Arg::with_name("direction")
                        .help("Travel direction")
                        .required(true)
                        .possible_values(&["forward", "reverse", "off"])
                )
        )
        .subcommand(
            SubCommand::with_name("send")
                .about("📡 Transmit a bay's status frame now")
                .arg(bay_arg())
                .arg(
                    Arg::with_name("status")
                        .help("Status to report instead of the bay's own")
                        .required(false)
                        .possible_values(&["available", "occupied", "stolen"])
                )
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📈 Watch status frames as the remote monitor sees them")
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Monitor duration in seconds (default: infinite)")
                        .takes_value(true)
                )
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");

    if verbose {
        println!("{}", "🚲 BikeBay - Parking Bay Controller".bright_blue().bold());
        println!("{} {}:{}", "Connecting to".dimmed(), host, port);
    }

    match matches.subcommand() {
        ("ping", _) => handle_ping(host, port, format).await?,
        ("status", _) => handle_status(host, port, format).await?,
        ("card", Some(sub)) => {
            let uid = sub.value_of("uid").unwrap_or_default().to_string();
            let response = send_command(host, port, CommandType::PresentCredential { uid: uid.clone() }).await?;
            print_command_result("Card", &uid, &response, format);
        }
        ("sensors", Some(sub)) => {
            let bay = parse_bay(sub)?;
            let sensor_a = sub.value_of("sensor_a") == Some("on");
            let sensor_b = sub.value_of("sensor_b") == Some("on");
            let response = send_command(host, port, CommandType::SetSensors { bay, sensor_a, sensor_b }).await?;
            print_command_result(
                &format!("Space {} sensors", bay),
                &format!("{}/{}", on_off(sensor_a), on_off(sensor_b)),
                &response,
                format,
            );
        }
        ("actuator", Some(sub)) => {
            let bay = parse_bay(sub)?;
            let direction = match sub.value_of("direction") {
                Some("forward") => ActuatorDirection::Forward,
                Some("reverse") => ActuatorDirection::Reverse,
                _ => ActuatorDirection::Off,
            };
            let response = send_command(host, port, CommandType::RunActuator { bay, direction }).await?;
            print_command_result(&format!("Space {} actuators", bay), &direction.to_string(), &response, format);
        }
        ("send", Some(sub)) => {
            let bay = parse_bay(sub)?;
            let status = match sub.value_of("status") {
                Some(text) => Some(text.parse::<BayStatus>()?),
                None => None,
            };
            let response = send_command(host, port, CommandType::SendStatus { bay, status }).await?;
            print_command_result(&format!("Space {} status frame", bay), "sent", &response, format);
        }
        ("monitor", Some(sub)) => {
            let duration = match sub.value_of("duration") {
                Some(secs) => Some(secs.parse::<u64>()?),
                None => None,
            };
            handle_monitor(host, port, format, duration).await?;
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Start the station simulator", "bikebay-simulator".bright_cyan());
            println!("  {} Park a bike in space 1", "bikebay sensors 1 on on".bright_cyan());
            println!("  {} Lock it with the owner's card", "bikebay card 3CA0FFE2".bright_cyan());
            println!("  {} Watch status frames", "bikebay monitor".bright_cyan());
        }
    }

    Ok(())
}

fn bay_arg() -> Arg<'static, 'static> {
    Arg::with_name("bay")
        .help("Bay (space) number")
        .required(true)
        .validator(|v| match v.parse::<u8>() {
            Ok(n) if n > 0 => Ok(()),
            _ => Err("Bay must be a number between 1 and 255".into()),
        })
}

fn parse_bay(matches: &ArgMatches<'_>) -> Result<BayId, Box<dyn std::error::Error>> {
    let bay = matches.value_of("bay").ok_or("missing bay")?.parse::<u8>()?;
    Ok(BayId(bay))
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

async fn handle_ping(host: &str, port: u16, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let response = send_command(host, port, CommandType::Ping).await?;

    match format {
        "json" => println!("{}", serde_json::to_string(&response)?),
        "compact" => println!("{}", "PONG".bright_green()),
        _ => {
            if response.status == ResponseStatus::Success {
                println!("{} {}", "✅".green(), "Station is responsive".bright_green());
            } else {
                println!("{} {}", "❌".red(), "Ping failed".bright_red());
            }
        }
    }

    Ok(())
}

async fn handle_status(host: &str, port: u16, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let response = send_command(host, port, CommandType::SystemStatus).await?;
    let message = response.message.unwrap_or_default();

    if format == "json" {
        println!("{}", message);
        return Ok(());
    }

    let snapshot: StationSnapshot = serde_json::from_str(&message)?;

    if format == "compact" {
        let bays: Vec<String> = snapshot
            .bays
            .iter()
            .map(|b| format!("{}:{}", b.bay_id, b.status))
            .collect();
        println!("{} free | {}", snapshot.available_spaces, bays.join(" "));
        return Ok(());
    }

    println!("{}", "🚲 Bike Tracker".bright_blue().bold());
    println!("{} {}", "Available spaces:".bright_white(), snapshot.available_spaces.to_string().bright_cyan());
    println!();
    println!("{:<7} {:<11} {:<9} {:<10} {}", "SPACE", "STATE", "BIKE", "STATUS", "FAULT");
    for bay in &snapshot.bays {
        let state = format!("{:?}", bay.lock_state);
        let state = match bay.lock_state {
            LockState::Stolen => state.bright_red().bold(),
            LockState::Locking | LockState::Unlocking => state.yellow(),
            _ => state.normal(),
        };
        let fault = match bay.fault {
            Some(BayFault::SensorFault) => "sensor".yellow(),
            Some(BayFault::ActuatorFault) => "actuator".bright_red(),
            None => "-".dimmed(),
        };
        println!(
            "{:<7} {:<11} {:<9} {:<10} {}",
            bay.bay_id,
            state,
            format!("{:?}", bay.occupancy),
            colored_status(bay.status),
            fault
        );
    }
    println!();
    println!("{} {}", "💬".blue(), snapshot.message.bright_white());

    Ok(())
}

async fn handle_monitor(
    host: &str,
    port: u16,
    format: &str,
    duration: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "📡 Monitoring status frames (Press Ctrl+C to stop)...".bright_blue().bold());

    let watch = monitor_frames(host, port, format);
    match duration {
        Some(secs) => {
            match tokio::time::timeout(std::time::Duration::from_secs(secs), watch).await {
                Ok(result) => result?,
                Err(_) => println!("{}", "Monitoring finished".dimmed()),
            }
        }
        None => watch.await?,
    }

    Ok(())
}

async fn monitor_frames(host: &str, port: u16, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let stream = TcpStream::connect((host, port)).await?;
    let mut lines = BufReader::new(stream).lines();

    while let Some(line) = lines.next_line().await? {
        let Ok(frame) = line.parse::<TelemetryFrame>() else {
            continue;
        };
        match format {
            "json" => println!("{}", serde_json::to_string(&frame)?),
            "compact" => println!("{}", frame),
            _ => println!("[{}] Space {}: {}", current_timestamp() / 1000, frame.bay, colored_status(frame.status)),
        }
    }

    Ok(())
}

fn colored_status(status: BayStatus) -> ColoredString {
    match status {
        BayStatus::Available => status.as_str().bright_green(),
        BayStatus::Occupied => status.as_str().bright_red(),
        BayStatus::Stolen => status.as_str().truecolor(255, 165, 0).bold().blink(),
    }
}

fn print_command_result(action: &str, value: &str, response: &CommandResponse, format: &str) {
    match format {
        "json" => match serde_json::to_string(response) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{} {}", "❌".red(), e),
        },
        "compact" => println!("{:?}", response.status),
        _ => {
            let message = response.message.as_deref().unwrap_or("");
            match response.status {
                ResponseStatus::Success => {
                    println!("{} {} {}", "✅".green(), action.bright_white(), value.bright_cyan());
                    if !message.is_empty() {
                        println!("   {}", message.dimmed());
                    }
                }
                ResponseStatus::Acknowledged => {
                    println!("{} {} {} accepted", "📨".green(), action.bright_white(), value.bright_cyan());
                }
                ResponseStatus::NegativeAck => {
                    println!("{} {} rejected: {}", "❌".red(), action.bright_white(), message.bright_red());
                    if message.contains("simulator") {
                        println!("{} Start the station with: {}", "💡".yellow(), "bikebay-simulator".bright_cyan());
                    }
                }
                ResponseStatus::ExecutionFailed => {
                    println!("{} {} failed: {}", "⚠️".yellow(), action.bright_white(), message.bright_red());
                }
            }
        }
    }
}

async fn send_command(
    host: &str,
    port: u16,
    command_type: CommandType,
) -> Result<CommandResponse, Box<dyn std::error::Error>> {
    let timestamp = current_timestamp();
    let command = Command {
        id: (timestamp as u32).max(1),
        timestamp,
        command_type,
    };
    let payload = serde_json::to_string(&command)?;

    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} Failed to connect to station at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Station is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin bikebay-simulator".bright_cyan());
            } else {
                eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
            }
            return Err(e.into());
        }
    };

    let reply = exchange(stream, &payload, command.id);
    match tokio::time::timeout(std::time::Duration::from_secs(COMMAND_TIMEOUT_SECS), reply).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            eprintln!("{} Command timed out after {} seconds", "⏰".yellow(), COMMAND_TIMEOUT_SECS);
            Err("Command timeout".into())
        }
    }
}

async fn exchange(stream: TcpStream, payload: &str, id: u32) -> std::io::Result<CommandResponse> {
    let (reader, mut writer) = stream.into_split();
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    // Status frames are broadcast on the same connection; skip them
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if let Ok(response) = serde_json::from_str::<CommandResponse>(&line) {
            if response.id == id || response.id == 0 {
                return Ok(response);
            }
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "Station closed connection",
    ))
}

fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
