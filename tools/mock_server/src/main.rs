//! Mock server - a small stand-in for the game backend.
//!
//! - `GET /ws/{room_id}/{player_id}`: per-room push channel (WebSocket)
//! - `POST /api/action`: newline-delimited action results
//! - `GET /api/actors/{actor_id}`: actor lookups

mod duel;
mod world;

use axum::{
    body::Body,
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use std::{collections::HashMap, convert::Infallible, sync::Arc, time::Duration};
use sync_core::{
    ActionRequest, ActorId, ClientMessage, DuelMove, PresenceStatus, PushMessage, RoomId,
};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, Mutex, RwLock},
};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, ReceiverStream};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use world::World;

#[derive(Parser, Debug)]
#[command(name = "mock-server")]
#[command(about = "Mock push/action server for local testing")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Delay between streamed action lines, in milliseconds
    #[arg(long, default_value = "60")]
    chunk_delay_ms: u64,

    /// Interval between server pings, in seconds
    #[arg(long, default_value = "20")]
    ping_secs: u64,
}

struct AppState {
    world: Mutex<World>,
    /// Per-room fan-out of encoded push frames.
    rooms: RwLock<HashMap<RoomId, broadcast::Sender<String>>>,
    chunk_delay: Duration,
    ping_every: Duration,
}

impl AppState {
    async fn channel(&self, room_id: &str) -> broadcast::Sender<String> {
        if let Some(tx) = self.rooms.read().await.get(room_id) {
            return tx.clone();
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    async fn broadcast(&self, room_id: &str, message: &PushMessage) {
        let text = match message.encode() {
            Ok(text) => text,
            Err(error) => {
                tracing::error!(%error, "failed to encode push");
                return;
            }
        };
        // No subscribers is fine; the room is simply empty.
        let _ = self.channel(room_id).await.send(text);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let state = Arc::new(AppState {
        world: Mutex::new(World::seeded()),
        rooms: RwLock::new(HashMap::new()),
        chunk_delay: Duration::from_millis(args.chunk_delay_ms),
        ping_every: Duration::from_secs(args.ping_secs.max(1)),
    });

    let app = Router::new()
        .route("/ws/{room_id}/{player_id}", get(push_socket))
        .route("/api/action", post(run_action))
        .route("/api/actors/{actor_id}", get(get_actor))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!("Mock server: http://0.0.0.0:{}", args.port);
    axum::serve(listener, app).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Push channel
// ---------------------------------------------------------------------------

async fn push_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((room_id, player_id)): Path<(RoomId, ActorId)>,
) -> Response {
    if world::coordinates_of(&room_id).is_none() || player_id.trim().is_empty() {
        return (StatusCode::NOT_FOUND, "unknown room").into_response();
    }
    ws.on_upgrade(move |socket| run_socket(socket, state, room_id, player_id))
}

async fn run_socket(socket: WebSocket, state: Arc<AppState>, room_id: RoomId, player_id: ActorId) {
    // Subscribe before joining so the joiner sees its own presence.
    let mut pushes = BroadcastStream::new(state.channel(&room_id).await.subscribe());
    let Some(joined) = state.world.lock().await.join(&player_id, &room_id) else {
        return;
    };
    tracing::info!(player = %player_id, room = %room_id, session = joined.session, "joined");

    state
        .broadcast(
            &room_id,
            &PushMessage::Presence {
                actor_id: player_id.clone(),
                status: PresenceStatus::Joined,
                actor_data: Some(joined.actor),
            },
        )
        .await;
    state
        .broadcast(&room_id, &PushMessage::RoomUpdate { room: joined.room })
        .await;

    let (mut writer, mut reader) = socket.split();
    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + state.ping_every,
        state.ping_every,
    );

    loop {
        let outgoing = tokio::select! {
            incoming = reader.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    on_client_frame(&state, &room_id, &player_id, text.as_str()).await
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => None,
                Some(Err(error)) => {
                    tracing::debug!(player = %player_id, %error, "socket read failed");
                    break;
                }
            },
            pushed = pushes.next() => match pushed {
                Some(Ok(text)) => Some(text),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(player = %player_id, skipped, "push subscriber lagged");
                    None
                }
                None => break,
            },
            _ = ping.tick() => PushMessage::Ping.encode().ok(),
        };
        if let Some(text) = outgoing {
            if writer.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    }

    let left = state
        .world
        .lock()
        .await
        .leave(&player_id, &room_id, joined.session);
    tracing::info!(player = %player_id, room = %room_id, "left");
    if let Some(room) = left {
        state
            .broadcast(
                &room_id,
                &PushMessage::Presence {
                    actor_id: player_id.clone(),
                    status: PresenceStatus::Left,
                    actor_data: None,
                },
            )
            .await;
        state
            .broadcast(&room_id, &PushMessage::RoomUpdate { room })
            .await;
    }
}

/// Handles one client frame. Returns a reply for this socket only.
async fn on_client_frame(
    state: &AppState,
    room_id: &str,
    player_id: &str,
    text: &str,
) -> Option<String> {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(error) => {
            tracing::warn!(player = %player_id, %error, "dropping client frame");
            return None;
        }
    };

    match message {
        ClientMessage::Ping => return PushMessage::Pong.encode().ok(),
        ClientMessage::Pong => {}
        ClientMessage::Chat { text } => {
            let actor_name = state.world.lock().await.actor(player_id).map(|a| a.name.clone());
            let chat = PushMessage::Chat {
                actor_id: player_id.to_string(),
                actor_name,
                text,
            };
            state.broadcast(room_id, &chat).await;
        }
        ClientMessage::DuelChallenge(challenge) => {
            if challenge.challenger_id == player_id {
                state
                    .broadcast(room_id, &PushMessage::DuelChallenge(challenge))
                    .await;
            }
        }
        ClientMessage::DuelResponse(response) => {
            if response.responder_id == player_id {
                if response.accepted {
                    state.world.lock().await.start_duel(&response);
                }
                state
                    .broadcast(room_id, &PushMessage::DuelResponse(response))
                    .await;
            }
        }
        ClientMessage::DuelMove(duel_move) => {
            let result = state
                .world
                .lock()
                .await
                .duel_move(player_id, &duel_move.choice);
            // The choice stays server-side until the round resolves.
            let hidden = DuelMove {
                player_id: player_id.to_string(),
                choice: "?".to_string(),
                is_monster_move: duel_move.is_monster_move,
            };
            state.broadcast(room_id, &PushMessage::DuelMove(hidden)).await;
            if let Some(result) = result {
                state
                    .broadcast(room_id, &PushMessage::DuelRoundResult(result))
                    .await;
            }
        }
        ClientMessage::DuelCancel(mut cancel) => {
            if let Some(opponent) = state.world.lock().await.cancel_duel(player_id) {
                cancel.opponent_id = opponent;
            }
            cancel.player_id = player_id.to_string();
            state.broadcast(room_id, &PushMessage::DuelCancel(cancel)).await;
        }
    }
    None
}

// ---------------------------------------------------------------------------
// HTTP API
// ---------------------------------------------------------------------------

async fn run_action(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ActionRequest>,
) -> Response {
    if request.action.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "empty action").into_response();
    }
    tracing::info!(player = %request.player_id, action = %request.action, "action");
    let script = state.world.lock().await.perform(&request);

    let (tx, rx) = mpsc::channel::<String>(16);
    let delay = state.chunk_delay;
    let lines = script.lines;
    tokio::spawn(async move {
        for line in lines {
            tokio::time::sleep(delay).await;
            if tx.send(format!("{line}\n")).await.is_err() {
                break;
            }
        }
    });

    let room_pushes = script.room_pushes;
    if !room_pushes.is_empty() {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            for (room_id, push) in room_pushes {
                tokio::time::sleep(delay).await;
                state.broadcast(&room_id, &push).await;
            }
        });
    }

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

async fn get_actor(
    State(state): State<Arc<AppState>>,
    Path(actor_id): Path<ActorId>,
) -> Response {
    match state.world.lock().await.actor(&actor_id) {
        Some(actor) => Json(actor.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown actor").into_response(),
    }
}
