//! Headless client - drives a `SyncClient` from the terminal.
//!
//! Connects to a push server, prints settled transcript entries and notices,
//! and reads commands from stdin:
//!
//! - `say <text>` chats with the room
//! - `challenge <name|id>`, `accept`, `decline`, `move <choice>`, `cancel` duel
//! - `who` lists the roster, `quit` exits
//! - anything else is submitted as an action

use clap::Parser;
use sync_client::{ClientConfig, ClientError, Notice, SyncClient, TranscriptCursor, Transports};
use sync_core::{Message, MessageKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::TryRecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "headless-client")]
#[command(about = "Terminal client for the live room protocol")]
struct Args {
    /// Base URL of the push server
    #[arg(long, default_value = "ws://127.0.0.1:8080")]
    push_url: String,

    /// Base URL of the HTTP API
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    api_url: String,

    /// Player id to connect as
    #[arg(long, default_value = "player_1")]
    player: String,

    /// Room to join first
    #[arg(long, default_value = "room_0_0")]
    room: String,

    /// Heartbeat interval in seconds
    #[arg(long, default_value = "25")]
    heartbeat_secs: u64,

    /// Treat the link as lost when no pong arrives within this many seconds
    #[arg(long)]
    pong_timeout_secs: Option<u64>,
}

enum Input {
    Line(String),
    Eof,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = ClientConfig {
        push_url: args.push_url,
        api_url: args.api_url,
        heartbeat_interval: std::time::Duration::from_secs(args.heartbeat_secs.max(1)),
        pong_timeout: args.pong_timeout_secs.map(std::time::Duration::from_secs),
        ..ClientConfig::default()
    };
    let transports = Transports::network(&config);
    let mut client = SyncClient::new(config, args.player.clone(), transports);
    let mut notices = client.subscribe();
    let mut cursor = TranscriptCursor::default();

    tracing::info!(player = %args.player, room = %args.room, "connecting");
    client.connect(args.room);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            _ = client.step() => None,
            line = lines.next_line() => Some(match line? {
                Some(line) => Input::Line(line),
                None => Input::Eof,
            }),
        };

        match input {
            Some(Input::Line(line)) => {
                if line.trim() == "quit" {
                    break;
                }
                if let Err(error) = run_command(&mut client, &line) {
                    println!("! {error}");
                }
            }
            Some(Input::Eof) => break,
            None => {}
        }

        client.process_pending();
        loop {
            match notices.try_recv() {
                Ok(notice) => print_notice(&notice),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notice stream lagged");
                }
                Err(_) => break,
            }
        }
        cursor = print_settled(&client, cursor);
    }

    client.disconnect();
    Ok(())
}

fn run_command(client: &mut SyncClient, line: &str) -> Result<(), ClientError> {
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match verb {
        "" => Ok(()),
        "say" => client.say(rest),
        "challenge" => {
            let target = resolve_target(client, rest);
            client.challenge(&target)
        }
        "accept" => client.accept_duel(),
        "decline" => client.decline_duel(),
        "move" => client.submit_move(rest),
        "cancel" => client.cancel_duel(),
        "who" => {
            print_roster(client);
            Ok(())
        }
        _ => client.submit_action(line).map(|id| {
            tracing::debug!(action_id = id, "action submitted");
        }),
    }
}

/// Roster names map to ids; anything else is taken as an id.
fn resolve_target(client: &SyncClient, wanted: &str) -> String {
    client
        .store()
        .roster()
        .find(|actor| actor.name.eq_ignore_ascii_case(wanted))
        .map(|actor| actor.id.clone())
        .unwrap_or_else(|| wanted.to_string())
}

fn print_roster(client: &SyncClient) {
    let store = client.store();
    match store.current_room_id() {
        Some(room) => println!("In {room}:"),
        None => println!("Not in a room."),
    }
    for actor in store.roster() {
        println!("  {} ({:?})", actor.name, actor.kind);
    }
}

/// Prints entries up to the first one still streaming and returns the new
/// cursor.
fn print_settled(client: &SyncClient, cursor: TranscriptCursor) -> TranscriptCursor {
    let (entries, _) = client.store().transcript().since(cursor);
    let mut next = cursor;
    for message in entries {
        if !message.is_settled() {
            break;
        }
        println!("{}", render(message));
        next = TranscriptCursor(message.id + 1);
    }
    next
}

fn render(message: &Message) -> String {
    match &message.kind {
        MessageKind::Narration { .. } | MessageKind::RoomDescription => message.text.clone(),
        MessageKind::Chat { actor_name } => format!("{actor_name}: {}", message.text),
        MessageKind::System => format!("* {}", message.text),
        MessageKind::Quest => format!("[quest] {}", message.text),
        MessageKind::DuelRound { round } => format!("[round {round}] {}", message.text),
        MessageKind::ActionFailed { .. } => format!("! {}", message.text),
        MessageKind::Diagnostic { close_code } => match close_code {
            Some(code) => format!("! {} (code {code})", message.text),
            None => format!("! {}", message.text),
        },
    }
}

fn print_notice(notice: &Notice) {
    match notice {
        Notice::Connected { room_id } => println!("-- connected to {room_id}"),
        Notice::Disconnected { diagnosis } => {
            println!("-- disconnected: {}", diagnosis.message);
        }
        Notice::DuelChanged { state } => println!("-- duel: {state:?}"),
        Notice::ActionCompleted {
            next_room: Some(room),
            ..
        } => println!("-- moving to {room}"),
        other => tracing::debug!(notice = ?other, "notice"),
    }
}
