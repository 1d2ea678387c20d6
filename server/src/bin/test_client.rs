use clap::Parser;
use shared::{
    decode_packet, encode_packet, ClientAction, ConnectionToken, Packet, ServerEvent,
    MAX_PACKET_SIZE,
};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, Duration, Instant};

/// Joins (or rejoins) a running server and prints everything it sends.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:4000")]
    server: SocketAddr,

    /// Display name used when joining
    #[arg(short, long, default_value = "tester")]
    name: String,

    /// Token from an earlier session; reconnects instead of joining
    #[arg(short, long)]
    token: Option<String>,

    /// Admin secret; when given the client also logs in as admin
    #[arg(long)]
    admin_secret: Option<String>,

    /// How long to listen before disconnecting
    #[arg(long, default_value = "30")]
    seconds: u64,
}

async fn send(
    socket: &UdpSocket,
    server: SocketAddr,
    packet: &Packet,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = encode_packet(packet)?;
    socket.send_to(&data, server).await?;
    Ok(())
}

fn describe(event: &ServerEvent) -> String {
    match event {
        ServerEvent::Joined { player_id, token } => {
            format!("joined as {} (token {})", player_id, token.as_str())
        }
        ServerEvent::RoleAssigned {
            faction,
            fellow_traitors,
        } if !fellow_traitors.is_empty() => {
            format!("role: {} alongside {}", faction, fellow_traitors.join(", "))
        }
        ServerEvent::RoleAssigned { faction, .. } => format!("role: {}", faction),
        ServerEvent::PhaseChanged { phase } => format!("phase is now {}", phase),
        ServerEvent::DayAdvanced { day } => format!("day {}", day),
        ServerEvent::ChatRelayed { from, message, .. } => format!("<{}> {}", from, message),
        ServerEvent::Rejected { kind, reason } => format!("rejected ({:?}): {}", kind, reason),
        other => format!("{:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let hello = match args.token {
        Some(token) => ClientAction::Reconnect {
            token: ConnectionToken(token),
        },
        None => ClientAction::Join {
            display_name: args.name.clone(),
            avatar: String::new(),
        },
    };
    println!("Sending {:?} to {}", hello, args.server);
    send(&socket, args.server, &Packet::Action(hello)).await?;

    if let Some(secret) = args.admin_secret {
        send(
            &socket,
            args.server,
            &Packet::Action(ClientAction::AdminLogin { secret }),
        )
        .await?;
    }

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut heartbeat = interval(Duration::from_secs(5));
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    loop {
        tokio::select! {
            _ = sleep(deadline.saturating_duration_since(Instant::now())) => break,
            _ = heartbeat.tick() => {
                send(&socket, args.server, &Packet::Heartbeat).await?;
            }
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match decode_packet(&buf[..len]) {
                    Ok(Packet::Event(event)) => println!("{}", describe(&event)),
                    Ok(Packet::Heartbeat) => {}
                    Ok(other) => println!("Unexpected packet: {:?}", other),
                    Err(e) => println!("Failed to decode packet: {}", e),
                }
            }
        }
    }

    println!("Sending disconnect");
    send(&socket, args.server, &Packet::Disconnect).await?;
    println!("Test client finished");
    Ok(())
}
