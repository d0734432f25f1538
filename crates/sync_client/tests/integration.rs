use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_client::action_stream::ACTION_FAILED_TEXT;
use sync_client::{
    ActionTransport, ActorDirectory, ClientConfig, DuelState, Endpoint, LineStream, LinkSink,
    LookupError, Notice, PushLink, PushTransport, SyncClient, TransportError, Transports,
};
use sync_core::{ActionRequest, Actor, ClientMessage, CloseCategory, MessageKind};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::timeout;

/// Push transport that records every link and lets tests hold a room's open
/// until released.
#[derive(Clone, Default)]
struct MockPush {
    links: Arc<Mutex<Vec<(Endpoint, LinkSink)>>>,
    gates: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockPush {
    fn hold(&self, room_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(room_id.to_string(), gate.clone());
        gate
    }

    fn sink_at(&self, index: usize) -> LinkSink {
        self.links.lock().unwrap()[index].1.clone()
    }

    fn latest_sink(&self, room_id: &str) -> LinkSink {
        self.links
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(endpoint, _)| endpoint.room_id == room_id)
            .map(|(_, sink)| sink.clone())
            .expect("no link for room")
    }

    fn push(&self, room_id: &str, frame: Value) {
        assert!(self.latest_sink(room_id).frame(frame.to_string()));
    }

    fn opened(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    fn sent(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| ClientMessage::parse(text).unwrap())
            .collect()
    }
}

struct MockLink {
    sent: Arc<Mutex<Vec<String>>>,
}

impl PushLink for MockLink {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&mut self) {}
}

#[async_trait]
impl PushTransport for MockPush {
    async fn open(
        &self,
        endpoint: &Endpoint,
        sink: LinkSink,
    ) -> Result<Box<dyn PushLink>, TransportError> {
        let gate = {
            self.links.lock().unwrap().push((endpoint.clone(), sink));
            self.gates.lock().unwrap().get(&endpoint.room_id).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(Box::new(MockLink {
            sent: self.sent.clone(),
        }))
    }
}

type LineSender = mpsc::UnboundedSender<Result<String, TransportError>>;

/// Action transport whose response lines are fed by the test.
#[derive(Clone, Default)]
struct MockActions {
    exchanges: Arc<Mutex<Vec<(ActionRequest, LineSender)>>>,
}

impl MockActions {
    fn feed(&self, index: usize, frame: Value) {
        let exchanges = self.exchanges.lock().unwrap();
        exchanges[index].1.send(Ok(frame.to_string())).unwrap();
    }

    fn request(&self, index: usize) -> ActionRequest {
        self.exchanges.lock().unwrap()[index].0.clone()
    }
}

#[async_trait]
impl ActionTransport for MockActions {
    async fn open(&self, request: &ActionRequest) -> Result<LineStream, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.exchanges.lock().unwrap().push((request.clone(), tx));
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|line| (line, rx)) }).boxed())
    }
}

struct MockDirectory {
    actors: HashMap<String, Actor>,
}

#[async_trait]
impl ActorDirectory for MockDirectory {
    async fn lookup(&self, actor_id: &str) -> Result<Actor, LookupError> {
        self.actors
            .get(actor_id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(actor_id.to_string()))
    }
}

struct Harness {
    client: SyncClient,
    push: MockPush,
    actions: MockActions,
    notices: broadcast::Receiver<Notice>,
}

fn harness_with(player_id: &str, config: ClientConfig, directory: &[Actor]) -> Harness {
    let push = MockPush::default();
    let actions = MockActions::default();
    let directory = MockDirectory {
        actors: directory
            .iter()
            .map(|actor| (actor.id.clone(), actor.clone()))
            .collect(),
    };
    let client = SyncClient::new(
        config,
        player_id,
        Transports {
            push: Arc::new(push.clone()),
            actions: Arc::new(actions.clone()),
            directory: Arc::new(directory),
        },
    );
    let notices = client.subscribe();
    Harness {
        client,
        push,
        actions,
        notices,
    }
}

fn duel_config() -> ClientConfig {
    ClientConfig {
        duel_max_health: 5,
        ..Default::default()
    }
}

/// Handle events until nothing happens for a short while.
async fn settle(client: &mut SyncClient) {
    settle_for(client, Duration::from_millis(10)).await;
}

async fn settle_for(client: &mut SyncClient, quiet: Duration) {
    while timeout(quiet, client.step()).await.is_ok() {}
}

fn drain(notices: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        out.push(notice);
    }
    out
}

fn room(room_id: &str, x: i32, y: i32, text: &str, occupants: &[&str]) -> Value {
    json!({
        "roomId": room_id,
        "coordinates": { "x": x, "y": y },
        "biome": "forest",
        "narrativeText": text,
        "occupantIds": occupants,
        "generationStatus": "complete",
    })
}

fn room_update(room_id: &str, text: &str, occupants: &[&str]) -> Value {
    json!({ "type": "room_update", "room": room(room_id, 0, 0, text, occupants) })
}

fn joined(actor_id: &str, name: &str) -> Value {
    json!({
        "type": "presence",
        "actorId": actor_id,
        "status": "joined",
        "actorData": { "id": actor_id, "name": name },
    })
}

/// Player connected to room A and shown its snapshot, with `others` listed
/// as occupants.
async fn in_room_a(player_id: &str, config: ClientConfig, others: &[&str]) -> Harness {
    let mut h = harness_with(player_id, config, &[]);
    h.client.connect("A");
    settle(&mut h.client).await;
    assert!(h.client.is_connected());
    let mut occupants = vec![player_id];
    occupants.extend_from_slice(others);
    h.push.push("A", room_update("A", "A mossy clearing.", &occupants));
    settle(&mut h.client).await;
    assert_eq!(h.client.store().current_room_id(), Some("A"));
    h
}

fn round_result(round: u32, p1_health: i32, p2_health: i32, combat_ends: bool) -> Value {
    json!({
        "type": "duel_round_result",
        "round": round,
        "p1Id": "p1",
        "p2Id": "p2",
        "p1Move": "feint",
        "p2Move": "strike",
        "p1Health": p1_health,
        "p2Health": p2_health,
        "p1Advantage": 0,
        "p2Advantage": 1,
        "description": "Steel rings out.",
        "combatEnds": combat_ends,
    })
}

fn texts(client: &SyncClient) -> Vec<String> {
    client
        .store()
        .transcript()
        .iter()
        .map(|m| m.text.clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_opponent_move_hidden_until_round_result() {
    let mut h = in_room_a("p2", duel_config(), &["p1"]).await;
    h.push.push("A", joined("p1", "Ash"));
    h.push.push(
        "A",
        json!({ "type": "duel_challenge", "challengerId": "p1", "targetId": "p2" }),
    );
    settle(&mut h.client).await;
    assert_eq!(h.client.store().duel().state(), DuelState::ChallengePending);

    h.client.accept_duel().unwrap();
    assert!(h.push.sent().iter().any(|m| matches!(
        m,
        ClientMessage::DuelResponse(r) if r.accepted && r.p1_max_health == 5 && r.p2_max_health == 5
    )));

    let before = texts(&h.client);
    h.push.push(
        "A",
        json!({ "type": "duel_move", "playerId": "p1", "move": "feint" }),
    );
    settle(&mut h.client).await;
    let duel = h.client.store().duel();
    assert!(duel.has_opponent_move());
    assert!(!duel.both_submitted());
    assert_eq!(texts(&h.client), before);

    h.client.submit_move("strike").unwrap();
    assert!(h.client.store().duel().both_submitted());
    assert_eq!(texts(&h.client), before);

    h.push.push("A", round_result(1, 4, 5, false));
    settle(&mut h.client).await;

    let rounds: Vec<_> = h
        .client
        .store()
        .transcript()
        .iter()
        .filter(|m| matches!(m.kind, MessageKind::DuelRound { .. }))
        .collect();
    assert_eq!(rounds.len(), 1);
    assert!(rounds[0].text.contains("feint"));
    assert!(rounds[0].text.contains("strike"));

    let duel = h.client.store().duel();
    assert_eq!(duel.state(), DuelState::Active);
    assert_eq!(duel.round(), 2);
    assert!(!duel.has_opponent_move());
    assert_eq!(duel.my_clock().health, 5);
    assert_eq!(duel.my_clock().advantage, 1);
    assert_eq!(duel.opponent_clock().health, 4);
}

#[tokio::test(start_paused = true)]
async fn test_duel_to_ended_resets_clocks() {
    let mut h = in_room_a("p1", duel_config(), &["p2"]).await;
    h.push.push("A", joined("p2", "Briar"));
    settle(&mut h.client).await;

    h.client.challenge("p2").unwrap();
    h.push.push(
        "A",
        json!({
            "type": "duel_response",
            "challengerId": "p1",
            "responderId": "p2",
            "accepted": true,
            "p1MaxHealth": 5,
            "p2MaxHealth": 5,
        }),
    );
    settle(&mut h.client).await;
    assert_eq!(h.client.store().duel().state(), DuelState::Active);

    for (round, health) in [(1, 3), (2, 1)] {
        h.client.submit_move("feint").unwrap();
        h.push.push("A", round_result(round, health, 5, false));
        settle(&mut h.client).await;
        let duel = h.client.store().duel();
        assert_eq!(duel.state(), DuelState::Active);
        assert_eq!(duel.round(), round + 1);
        assert_eq!(duel.my_clock().health, health);
    }

    h.client.submit_move("feint").unwrap();
    h.push.push("A", round_result(3, 0, 5, true));
    settle(&mut h.client).await;

    let duel = h.client.store().duel();
    assert_eq!(duel.state(), DuelState::Ended);
    assert!(duel.opponent().is_none());
    assert_eq!((duel.my_clock().health, duel.opponent_clock().health), (5, 5));
    assert_eq!(duel.my_clock().advantage, 0);

    h.client.challenge("p2").unwrap();
    assert_eq!(h.client.store().duel().state(), DuelState::ChallengePending);
}

#[tokio::test(start_paused = true)]
async fn test_same_room_update_twice_is_idempotent() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    let before = h.client.store().transcript().len();

    h.push.push("A", room_update("A", "A mossy clearing.", &["p1"]));
    h.push.push("A", room_update("A", "A mossy clearing.", &["p1"]));
    settle(&mut h.client).await;

    assert_eq!(h.client.store().transcript().len(), before);
    assert_eq!(h.client.store().room_entries(), 1);
}

fn final_frame(content: &str, next_room: &str, snapshot: Option<Value>) -> Value {
    let mut updates = json!({ "actor": { "id": "p1", "currentRoom": next_room } });
    if let Some(snapshot) = snapshot {
        updates["room"] = snapshot;
    }
    json!({ "type": "final", "content": content, "updates": updates })
}

fn descriptions_of(client: &SyncClient, room_id: &str) -> usize {
    client
        .store()
        .transcript()
        .iter()
        .filter(|m| m.kind == MessageKind::RoomDescription && m.room_id.as_deref() == Some(room_id))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_pending_consumed_once_snapshot_then_open() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.client.submit_action("north").unwrap();
    settle(&mut h.client).await;

    let b = room("B", 0, 1, "A windswept ridge.", &["p1"]);
    h.actions
        .feed(0, final_frame("You climb north.", "B", Some(b.clone())));
    settle(&mut h.client).await;

    assert_eq!(h.client.connected_room(), Some("B"));
    assert_eq!(h.client.store().current_room_id(), Some("B"));
    assert!(h.client.store().pending().is_none());

    h.push.push("B", json!({ "type": "room_update", "room": b }));
    settle(&mut h.client).await;

    assert_eq!(h.client.store().room_entries(), 2);
    assert_eq!(descriptions_of(&h.client, "B"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pending_consumed_once_push_then_open() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    let gate = h.push.hold("B");
    h.client.submit_action("north").unwrap();
    settle(&mut h.client).await;

    let b = room("B", 0, 1, "A windswept ridge.", &["p1"]);
    h.actions
        .feed(0, final_frame("You climb north.", "B", Some(b.clone())));
    settle(&mut h.client).await;
    assert!(!h.client.is_connected());
    assert_eq!(h.client.store().pending_target(), Some("B"));

    // The new link's reader delivers before its open completes.
    h.push.push("B", json!({ "type": "room_update", "room": b }));
    settle(&mut h.client).await;
    assert_eq!(h.client.store().current_room_id(), Some("B"));
    assert!(h.client.store().pending().is_none());

    gate.notify_one();
    settle(&mut h.client).await;

    assert_eq!(h.client.connected_room(), Some("B"));
    assert_eq!(h.client.store().room_entries(), 2);
    assert_eq!(descriptions_of(&h.client, "B"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_room_change_arms_pending_before_completion() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    let _gate = h.push.hold("B");
    h.client.submit_action("north").unwrap();
    settle(&mut h.client).await;
    assert_eq!(h.actions.request(0).room_id, "A");
    drain(&mut h.notices);

    h.actions.feed(0, json!({ "type": "chunk", "content": "You head " }));
    h.actions.feed(0, final_frame("You head north.", "B", None));
    settle(&mut h.client).await;

    let notices = drain(&mut h.notices);
    assert!(notices.contains(&Notice::ActionCompleted {
        action_id: 1,
        next_room: Some("B".to_string()),
    }));
    assert_eq!(h.client.store().pending_target(), Some("B"));
    assert_eq!(h.client.store().current_room_id(), Some("A"));

    // The A link was superseded; nothing it delivers is applied.
    let before = texts(&h.client);
    assert!(h
        .push
        .sink_at(0)
        .frame(room_update("A", "The clearing darkens.", &["p1"]).to_string()));
    // An unrelated room is refused by the room guard.
    h.push.push("B", room_update("C", "Somewhere else.", &["p1"]));
    settle(&mut h.client).await;
    assert_eq!(texts(&h.client), before);

    h.push.push("B", room_update("B", "A windswept ridge.", &["p1"]));
    settle(&mut h.client).await;
    assert_eq!(h.client.store().current_room_id(), Some("B"));
    assert!(h.client.store().pending().is_none());
    assert_eq!(
        h.client.store().transcript().last().unwrap().text,
        "A windswept ridge."
    );
}

#[tokio::test(start_paused = true)]
async fn test_final_after_move_push_keeps_the_new_link() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.client.submit_action("north").unwrap();
    settle(&mut h.client).await;

    h.push.push(
        "A",
        json!({ "type": "actor_update", "actor": { "id": "p1", "name": "p1", "currentRoom": "B" } }),
    );
    settle(&mut h.client).await;
    assert_eq!(h.push.opened(), 2);
    assert_eq!(h.client.connected_room(), Some("B"));

    h.actions.feed(0, final_frame("You climb north.", "B", None));
    settle(&mut h.client).await;
    assert_eq!(h.push.opened(), 2);
    assert_eq!(h.client.connected_room(), Some("B"));
    assert_eq!(h.client.store().pending_target(), Some("B"));

    h.push.push("B", room_update("B", "A windswept ridge.", &["p1"]));
    settle(&mut h.client).await;
    assert_eq!(h.client.store().current_room_id(), Some("B"));
    assert_eq!(descriptions_of(&h.client, "B"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_lookup_is_omitted_from_roster() {
    let directory = [Actor::new("a", "Ada"), Actor::new("b", "Bo")];
    let mut h = harness_with("p1", ClientConfig::default(), &directory);
    h.client.connect("A");
    settle(&mut h.client).await;

    h.push
        .push("A", room_update("A", "A mossy clearing.", &["p1", "a", "ghost", "b"]));
    settle_for(&mut h.client, Duration::from_secs(1)).await;

    let ids: Vec<_> = h
        .client
        .store()
        .roster()
        .map(|actor| actor.id.as_str())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_roster_bursts_are_debounced() {
    let directory = [Actor::new("a", "Ada"), Actor::new("b", "Bo")];
    let mut h = harness_with("p1", ClientConfig::default(), &directory);
    h.client.connect("A");
    settle(&mut h.client).await;

    h.push.push("A", room_update("A", "A mossy clearing.", &["p1", "a"]));
    h.push.push("A", room_update("A", "A mossy clearing.", &["p1", "a", "b"]));
    settle(&mut h.client).await;
    assert_eq!(h.client.store().roster_len(), 0);

    settle_for(&mut h.client, Duration::from_secs(1)).await;
    assert_eq!(h.client.store().roster_len(), 2);

    h.push.push("A", room_update("A", "A mossy clearing.", &["p1", "b"]));
    settle_for(&mut h.client, Duration::from_secs(1)).await;
    let ids: Vec<_> = h.client.store().roster().map(|a| a.id.clone()).collect();
    assert_eq!(ids, vec!["b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_joined_inside_debounce_window_survives_flush() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;

    // The snapshot's occupant list is still waiting out its window.
    h.push.push("A", joined("p2", "Pell"));
    settle(&mut h.client).await;
    assert_eq!(h.client.store().roster_len(), 1);

    settle_for(&mut h.client, Duration::from_secs(1)).await;
    let ids: Vec<_> = h.client.store().roster().map(|a| a.id.clone()).collect();
    assert_eq!(ids, vec!["p2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_reports_without_retry() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    drain(&mut h.notices);

    h.push.latest_sink("A").closed(Some(1011), "internal error");
    settle(&mut h.client).await;

    assert!(!h.client.is_connected());
    assert_eq!(h.push.opened(), 1);
    let disconnected = drain(&mut h.notices).into_iter().find_map(|n| match n {
        Notice::Disconnected { diagnosis } => Some(diagnosis),
        _ => None,
    });
    assert_eq!(disconnected.unwrap().category, CloseCategory::ServerError);
    assert_eq!(
        h.client.store().transcript().last().unwrap().kind,
        MessageKind::Diagnostic {
            close_code: Some(1011)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_superseded_link_close_is_ignored() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.client.change_room("B");
    settle(&mut h.client).await;
    drain(&mut h.notices);

    h.push.sink_at(0).closed(Some(1006), "");
    settle(&mut h.client).await;

    assert_eq!(h.client.connected_room(), Some("B"));
    assert!(!drain(&mut h.notices)
        .iter()
        .any(|n| matches!(n, Notice::Disconnected { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_pong_timeout_drops_silent_link() {
    let config = ClientConfig {
        heartbeat_interval: Duration::from_secs(1),
        pong_timeout: Some(Duration::from_secs(1)),
        ..Default::default()
    };
    let mut h = in_room_a("p1", config, &[]).await;
    // Let the initial roster flush pass so the next step is the heartbeat.
    settle_for(&mut h.client, Duration::from_millis(300)).await;

    h.client.step().await;
    assert_eq!(h.push.sent(), vec![ClientMessage::Ping]);
    assert!(h.client.is_connected());

    h.client.step().await;
    assert!(!h.client.is_connected());
    assert!(drain(&mut h.notices).iter().any(|n| matches!(
        n,
        Notice::Disconnected { diagnosis } if diagnosis.category == CloseCategory::NetworkLost
    )));
}

#[tokio::test(start_paused = true)]
async fn test_pong_keeps_link_alive() {
    let config = ClientConfig {
        heartbeat_interval: Duration::from_secs(1),
        pong_timeout: Some(Duration::from_secs(1)),
        ..Default::default()
    };
    let mut h = in_room_a("p1", config, &[]).await;
    // Let the initial roster flush pass so the next step is the heartbeat.
    settle_for(&mut h.client, Duration::from_millis(300)).await;

    for _ in 0..3 {
        h.client.step().await;
        h.push.push("A", json!({ "type": "pong" }));
        h.client.step().await;
    }
    assert!(h.client.is_connected());
    assert_eq!(h.push.sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_server_ping_is_answered() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.push.push("A", json!({ "type": "ping" }));
    settle(&mut h.client).await;
    assert_eq!(h.push.sent(), vec![ClientMessage::Pong]);
}

#[tokio::test(start_paused = true)]
async fn test_chunks_grow_entry_and_final_replaces_it() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.client.submit_action("look").unwrap();
    settle(&mut h.client).await;
    let entry = h.client.store().transcript().last().unwrap().id;
    assert_eq!(h.client.store().transcript().get(entry).unwrap().text, "");

    h.actions.feed(0, json!({ "type": "chunk", "content": "Ferns " }));
    h.actions.feed(0, json!({ "type": "chunk", "content": "sway" }));
    settle(&mut h.client).await;
    let message = h.client.store().transcript().get(entry).unwrap();
    assert_eq!(message.text, "Ferns sway");
    assert!(!message.is_settled());

    h.actions.feed(
        0,
        json!({ "type": "final", "content": "Ferns sway in the breeze.", "updates": {} }),
    );
    settle(&mut h.client).await;
    let message = h.client.store().transcript().get(entry).unwrap();
    assert_eq!(message.text, "Ferns sway in the breeze.");
    assert!(message.is_settled());
    assert_eq!(h.client.actions_in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_error_frame_yields_single_failure_entry() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.client.submit_action("dance").unwrap();
    settle(&mut h.client).await;
    let len = h.client.store().transcript().len();

    h.actions.feed(0, json!({ "type": "chunk", "content": "You twirl" }));
    h.actions.feed(0, json!({ "error": "generation failed" }));
    settle(&mut h.client).await;

    assert_eq!(h.client.store().transcript().len(), len);
    let last = h.client.store().transcript().last().unwrap();
    assert_eq!(last.text, ACTION_FAILED_TEXT);
    assert_eq!(last.kind, MessageKind::ActionFailed { action_id: 1 });
    assert_eq!(h.client.actions_in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_local_health_survives_partial_updates() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.client.submit_action("eat berries").unwrap();
    settle(&mut h.client).await;
    h.actions.feed(
        0,
        json!({
            "type": "final",
            "content": "You feel better.",
            "updates": { "actor": { "id": "p1", "health": 9, "inventory": ["berries"], "revision": 4 } },
        }),
    );
    settle(&mut h.client).await;

    // A later push that omits health and inventory.
    h.push.push(
        "A",
        json!({ "type": "actor_update", "actor": { "id": "p1", "name": "Ash", "currentRoom": "A" } }),
    );
    settle(&mut h.client).await;

    let local = h.client.store().local_player();
    assert_eq!(local.health, Some(9));
    assert_eq!(local.inventory, Some(vec!["berries".to_string()]));
    assert_eq!(local.name.as_deref(), Some("Ash"));
    assert_eq!(h.client.store().roster_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_relocation_moves_local_player() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.push.push(
        "A",
        json!({ "type": "actor_removed", "actorId": "p1", "reason": "death", "relocation": "spawn" }),
    );
    settle(&mut h.client).await;

    assert_eq!(h.client.connected_room(), Some("spawn"));
    assert_eq!(h.client.store().pending_target(), Some("spawn"));
    assert!(texts(&h.client).iter().any(|t| t == "You have fallen."));

    h.push.push("spawn", room_update("spawn", "A quiet shrine.", &["p1"]));
    settle(&mut h.client).await;
    assert_eq!(h.client.store().current_room_id(), Some("spawn"));
}

#[tokio::test(start_paused = true)]
async fn test_quest_chunks_coalesce() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.push.push("A", json!({ "type": "quest_chunk", "text": "Find the " }));
    h.push.push("A", json!({ "type": "quest_chunk", "text": "drowned bell." }));
    settle_for(&mut h.client, Duration::from_secs(1)).await;

    let quests: Vec<_> = h
        .client
        .store()
        .transcript()
        .iter()
        .filter(|m| m.kind == MessageKind::Quest)
        .map(|m| m.text.clone())
        .collect();
    assert_eq!(quests, vec!["Find the drowned bell.".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_bad_frames_are_dropped() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    let before = texts(&h.client);
    h.push.push("A", json!({ "type": "weather", "sky": "grey" }));
    h.push.push("A", json!({ "type": "duel_move", "playerId": "p2" }));
    h.push.push(
        "A",
        json!({ "type": "presence", "actorId": "x", "status": "joined", "actorData": { "id": "x", "name": "" } }),
    );
    settle(&mut h.client).await;

    assert_eq!(h.client.store().roster_len(), 0);
    let after = texts(&h.client);
    assert_eq!(after.len(), before.len() + 1);
    assert!(after.last().unwrap().starts_with("Ignored an invalid update"));
}

#[tokio::test(start_paused = true)]
async fn test_chat_lands_in_transcript() {
    let mut h = in_room_a("p1", ClientConfig::default(), &[]).await;
    h.push.push("A", joined("p2", "Briar"));
    h.push.push(
        "A",
        json!({ "type": "chat", "actorId": "p2", "text": "well met" }),
    );
    settle(&mut h.client).await;
    let last = h.client.store().transcript().last().unwrap();
    assert_eq!(
        last.kind,
        MessageKind::Chat {
            actor_name: "Briar".to_string()
        }
    );

    h.client.say("hello").unwrap();
    assert_eq!(
        h.push.sent(),
        vec![ClientMessage::Chat {
            text: "hello".to_string()
        }]
    );
}
