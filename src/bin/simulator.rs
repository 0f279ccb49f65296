use bikebay::agent::ParkingAgent;
use bikebay::config::StationConfig;
use bikebay::peripherals::sim::{simulated_station, SimHandles};
use bikebay::protocol::{Command, CommandResponse, CommandType, ProtocolHandler, ResponseStatus};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{error, info, warn};

const TCP_PORT: u16 = 8080;
const TELEMETRY_BROADCAST_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("🚲 Bike Parking Bay Simulator");
    println!("=============================");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            StationConfig::load(Path::new(&path))?
        }
        None => StationConfig::default(),
    };

    let (peripherals, sim) = simulated_station(&config);
    let agent = Arc::new(Mutex::new(ParkingAgent::new(&config, peripherals)?));
    {
        let mut agent_guard = agent.lock().await;
        agent_guard.start();
    }
    println!("   Bays: {}", config.bays.len());
    println!(
        "   Radio: {:.1} MHz, sync word 0x{:02X}",
        f64::from(config.radio.frequency_hz) / 1_000_000.0,
        config.radio.sync_word
    );
    println!("📡 Ready for commands on TCP port {}", TCP_PORT);

    // Telemetry frames as the remote monitor would receive them
    let (telemetry_tx, _) = broadcast::channel(TELEMETRY_BROADCAST_BUFFER_SIZE);

    let tcp_agent = Arc::clone(&agent);
    let tcp_sim = sim.clone();
    let tcp_telemetry_tx = telemetry_tx.clone();
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = start_tcp_server(tcp_agent, tcp_sim, tcp_telemetry_tx).await {
            error!("TCP server error: {}", e);
        }
    });

    let mut interval = time::interval(Duration::from_millis(config.timing.poll_period_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }

        let result = {
            let mut agent_guard = agent.lock().await;
            agent_guard.update()
        };

        match result {
            Ok(frames) => {
                for frame in &frames {
                    info!("📡 STATUS: {}", frame);
                }
            }
            Err(e) => {
                error!("❌ Agent error: {}", e);
                break;
            }
        }

        for frame in sim.radio.drain() {
            // No subscribers is fine
            let _ = telemetry_tx.send(frame);
        }
    }

    {
        let mut agent_guard = agent.lock().await;
        agent_guard.stop();
    }

    tcp_server.abort();
    println!("🚲 Bike Parking Bay Simulator stopped");

    Ok(())
}

async fn start_tcp_server(
    agent: Arc<Mutex<ParkingAgent>>,
    sim: SimHandles,
    telemetry_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", TCP_PORT)).await?;
    info!("🌐 TCP server listening on port {}", TCP_PORT);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 New client connected: {}", addr);
                let client_agent = Arc::clone(&agent);
                let client_sim = sim.clone();
                let client_telemetry_rx = telemetry_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_agent, client_sim, client_telemetry_rx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    agent: Arc<Mutex<ParkingAgent>>,
    sim: SimHandles,
    mut telemetry_rx: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    let telemetry_writer = Arc::clone(&writer);
    let telemetry_task = tokio::spawn(async move {
        while let Ok(frame) = telemetry_rx.recv().await {
            let mut writer_guard = telemetry_writer.lock().await;
            if let Err(e) = writer_guard.write_all(frame.as_bytes()).await {
                warn!("Failed to send telemetry: {}", e);
                break;
            }
            if let Err(e) = writer_guard.write_all(b"\n").await {
                warn!("Failed to send telemetry newline: {}", e);
                break;
            }
        }
    });

    let mut protocol = ProtocolHandler::new();
    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = match protocol.parse_command(trimmed) {
                    Ok(command) => {
                        info!("📨 Received command: {:?}", command.command_type);
                        execute(&agent, &sim, &protocol, command).await
                    }
                    Err(e) => {
                        error!("Failed to parse command: {}", e);
                        let now = agent.lock().await.now_ms();
                        protocol.create_nack_response(0, now, &format!("Invalid command format: {}", e))
                    }
                };

                let response_json = protocol.serialize_response(&response)?.to_string();
                {
                    let mut writer_guard = writer.lock().await;
                    writer_guard.write_all(response_json.as_bytes()).await?;
                    writer_guard.write_all(b"\n").await?;
                }
                info!("📤 Sent response: {:?} for command {}", response.status, response.id);
            }
            Err(e) => {
                error!("Error reading from client: {}", e);
                break;
            }
        }
    }

    telemetry_task.abort();
    Ok(())
}

async fn execute(
    agent: &Arc<Mutex<ParkingAgent>>,
    sim: &SimHandles,
    protocol: &ProtocolHandler,
    command: Command,
) -> CommandResponse {
    let mut agent_guard = agent.lock().await;
    let now = agent_guard.now_ms();

    // Sensor bits live on the simulated board, outside the agent
    if let CommandType::SetSensors { bay, sensor_a, sensor_b } = command.command_type {
        return match sim.sensors.set(bay, sensor_a, sensor_b) {
            Ok(()) => protocol.create_response(
                command.id,
                now,
                ResponseStatus::Success,
                Some(&format!("Space {} sensors set to ({}, {})", bay, sensor_a, sensor_b)),
            ),
            Err(e) => protocol.create_nack_response(command.id, now, &e.to_string()),
        };
    }

    let id = command.id;
    if let Err(e) = agent_guard.queue_command(command) {
        return protocol.create_nack_response(id, now, &format!("Queue error: {}", e));
    }
    if let Err(e) = agent_guard.process_commands() {
        return protocol.create_response(
            id,
            now,
            ResponseStatus::ExecutionFailed,
            Some(&format!("Processing error: {}", e)),
        );
    }

    agent_guard
        .get_responses()
        .into_iter()
        .find(|r| r.id == id)
        .unwrap_or_else(|| protocol.create_response(id, now, ResponseStatus::Success, None))
}
