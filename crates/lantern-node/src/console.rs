//! The interactive station console
//!
//! Plain input is broadcast as chat; slash commands cover the things an
//! operator at a station needs without a browser: position shares,
//! distress messages, the peer roster, and the invite ticket.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lantern_bridge::{OutboundRequest, SendOutcome};
use lantern_core::{GeoPoint, LocationReport, MessageKind, Role};
use lantern_mesh::{PresenceBook, RoomTicket};

/// Accuracy assumed when the operator gives coordinates without one
const DEFAULT_ACCURACY_M: f64 = 50.0;

/// How long to wait for the sender task's verdict before giving up on
/// printing it
const OUTCOME_WAIT: Duration = Duration::from_secs(5);

/// Everything the console needs from the running station
pub struct Console {
    pub outbound: mpsc::Sender<OutboundRequest>,
    pub presence: std::sync::Arc<PresenceBook>,
    pub ticket: RoomTicket,
    pub role: Role,
    pub nick: String,
}

/// What a line of input asks for
#[derive(Debug, PartialEq)]
enum Command {
    Send { content: String, kind: MessageKind },
    Peers,
    Ticket,
    Help,
    Quit,
    Nothing,
    Error(String),
}

/// Read stdin until `/quit`, Ctrl+C, or shutdown
pub async fn run(console: Console, shutdown: CancellationToken) {
    println!("Lantern station '{}' ready. Type /help for commands.", console.nick);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = tokio::signal::ctrl_c() => {
                if result.is_err() {
                    debug!("Ctrl+C handler unavailable, relying on /quit");
                    shutdown.cancelled().await;
                }
                break;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match parse(&line) {
                    Command::Quit => break,
                    command => handle(&console, command).await,
                }
            }
        }
    }
}

async fn handle(console: &Console, command: Command) {
    match command {
        Command::Send { content, kind } => send(console, content, kind).await,
        Command::Peers => print_roster(console),
        Command::Ticket => println!("{}", console.ticket),
        Command::Help => print_help(),
        Command::Error(message) => println!("{}", message),
        Command::Nothing | Command::Quit => {}
    }
}

async fn send(console: &Console, content: String, kind: MessageKind) {
    let (request, outcome) = OutboundRequest::new(content, console.role, kind);
    if console.outbound.send(request).await.is_err() {
        println!("station is shutting down, message not sent");
        return;
    }
    match tokio::time::timeout(OUTCOME_WAIT, outcome).await {
        Ok(Ok(SendOutcome::Sent)) => {}
        Ok(Ok(SendOutcome::Queued)) => {
            println!("(no stations reachable, message queued for delivery)");
        }
        Ok(Err(_)) | Err(_) => debug!("No verdict from the sender task"),
    }
}

fn print_roster(console: &Console) {
    let roster = console.presence.roster();
    if roster.is_empty() {
        println!("no stations heard from recently");
        return;
    }
    println!("{} station(s) on the room:", roster.len());
    for station in roster {
        let unit = station
            .unit
            .map(|unit| format!(" [{}]", unit))
            .unwrap_or_default();
        println!(
            "  {} ({}, {}{})",
            station.display_name(),
            station.id.short(),
            station.role,
            unit
        );
    }
}

fn print_help() {
    println!("  <text>                   broadcast a chat message");
    println!("  /loc <lat> <lon> [acc]   share your position");
    println!("  /emergency <text>        send a distress message (confirmed delivery)");
    println!("  /peers                   list stations on the room");
    println!("  /ticket                  print the invite ticket for this room");
    println!("  /quit                    stop the station");
}

fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Nothing;
    }
    if !line.starts_with('/') {
        return Command::Send {
            content: line.to_string(),
            kind: MessageKind::Text,
        };
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match command {
        "/loc" | "/location" => parse_location(rest),
        "/emergency" | "/sos" => {
            if rest.is_empty() {
                Command::Error("usage: /emergency <text>".to_string())
            } else {
                Command::Send {
                    content: rest.to_string(),
                    kind: MessageKind::Emergency,
                }
            }
        }
        "/peers" | "/who" => Command::Peers,
        "/ticket" => Command::Ticket,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Error(format!("unknown command {other}; try /help")),
    }
}

fn parse_location(args: &str) -> Command {
    let usage = || Command::Error("usage: /loc <lat> <lon> [accuracy_m]".to_string());

    let mut parts = args.split_whitespace();
    let (Some(lat), Some(lon)) = (parts.next(), parts.next()) else {
        return usage();
    };
    let (Ok(lat), Ok(lon)) = (lat.parse::<f64>(), lon.parse::<f64>()) else {
        return usage();
    };
    let accuracy = match parts.next() {
        Some(raw) => match raw.parse::<f64>() {
            Ok(accuracy) if accuracy > 0.0 => accuracy,
            _ => return usage(),
        },
        None => DEFAULT_ACCURACY_M,
    };

    let point = match GeoPoint::new(lat, lon) {
        Ok(point) => point,
        Err(e) => return Command::Error(format!("{e}")),
    };
    Command::Send {
        content: LocationReport::new(point, accuracy).format_quick(),
        kind: MessageKind::Location,
    }
}
