//! Turns pushed occupant-id lists into resolved actor records.

use crate::errors::LookupError;
use crate::events::{ClientEvent, EventSender};
use crate::store::Store;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{Actor, ActorId, RoomId};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Source of full actor records.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn lookup(&self, actor_id: &str) -> Result<Actor, LookupError>;
}

/// The latest occupant list for one room, once its debounce window closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterBatch {
    pub room_id: RoomId,
    pub occupant_ids: Vec<ActorId>,
    /// Store roster mark when the list arrived.
    pub mark: u64,
}

struct Queued {
    batch: RosterBatch,
    deadline: Instant,
}

/// Debounces occupant lists. The window opens with the first list and is not
/// extended by later ones; the newest list wins. A list for another room
/// starts a new window.
pub struct RosterReconciler {
    window: Duration,
    lookup_timeout: Duration,
    queued: Option<Queued>,
}

impl RosterReconciler {
    /// A reconciler with a fixed debounce `window` and a per-lookup timeout.
    pub fn new(window: Duration, lookup_timeout: Duration) -> Self {
        Self {
            window,
            lookup_timeout,
            queued: None,
        }
    }

    /// Queue the occupant list of `room_id`, taken at roster `mark`.
    pub fn queue(&mut self, room_id: &str, occupant_ids: Vec<ActorId>, mark: u64, now: Instant) {
        match self.queued.as_mut() {
            Some(queued) if queued.batch.room_id == room_id => {
                queued.batch.occupant_ids = occupant_ids;
                queued.batch.mark = mark;
            }
            _ => {
                self.queued = Some(Queued {
                    batch: RosterBatch {
                        room_id: room_id.to_string(),
                        occupant_ids,
                        mark,
                    },
                    deadline: now + self.window,
                });
            }
        }
    }

    /// When the queued list is due, if one is queued.
    pub fn deadline(&self) -> Option<Instant> {
        self.queued.as_ref().map(|q| q.deadline)
    }

    /// Take the queued list once its window has closed.
    pub fn take_due(&mut self, now: Instant) -> Option<RosterBatch> {
        if self.deadline()? > now {
            return None;
        }
        self.queued.take().map(|q| q.batch)
    }

    /// Drop departed actors now and start lookups for the ids the roster does
    /// not know yet. Results come back as [`ClientEvent::RosterResolved`].
    ///
    /// Only entries written before the list arrived can be dropped; a
    /// presence delta applied during the window outranks the older list.
    pub fn reconcile(
        &self,
        store: &mut Store,
        batch: RosterBatch,
        directory: Arc<dyn ActorDirectory>,
        events: EventSender,
    ) -> bool {
        if store.current_room_id() != Some(batch.room_id.as_str()) {
            debug!(room_id = %batch.room_id, "roster batch for a room we left");
            return false;
        }
        let removed = store.retain_roster(&batch.occupant_ids, batch.mark);

        let unresolved: Vec<ActorId> = batch
            .occupant_ids
            .iter()
            .filter(|id| !store.is_me(id) && store.roster_actor(id).is_none())
            .cloned()
            .collect();
        if unresolved.is_empty() {
            return removed > 0;
        }

        debug!(room_id = %batch.room_id, count = unresolved.len(), "resolving occupants");
        let timeout = self.lookup_timeout;
        let room_id = batch.room_id;
        tokio::spawn(async move {
            let actors = resolve_ids(directory.as_ref(), &unresolved, timeout).await;
            let _ = events.send(ClientEvent::RosterResolved { room_id, actors });
        });
        removed > 0
    }
}

/// Look up every id concurrently, each bounded by `timeout`. Failed lookups
/// are logged and left out.
pub async fn resolve_ids(
    directory: &dyn ActorDirectory,
    ids: &[ActorId],
    timeout: Duration,
) -> Vec<Actor> {
    let lookups = ids.iter().map(|id| async move {
        let result = match tokio::time::timeout(timeout, directory.lookup(id)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(id.clone())),
        };
        result.and_then(|actor| {
            if actor.id != *id {
                return Err(LookupError::Invalid {
                    id: id.clone(),
                    reason: format!("record is for {}", actor.id),
                });
            }
            actor.validate().map_err(|e| LookupError::Invalid {
                id: id.clone(),
                reason: e.to_string(),
            })?;
            Ok(actor)
        })
    });

    join_all(lookups)
        .await
        .into_iter()
        .filter_map(|result| match result {
            Ok(actor) => Some(actor),
            Err(error) => {
                warn!(%error, "occupant lookup failed");
                None
            }
        })
        .collect()
}

/// Merge lookup results. Results for a room we left, or for ids no longer
/// present, have no effect.
pub fn apply_resolved(store: &mut Store, room_id: &str, actors: Vec<Actor>) -> usize {
    if store.current_room_id() != Some(room_id) {
        debug!(room_id, "discarding lookups for a room we left");
        return 0;
    }
    let mut merged = 0;
    for actor in actors {
        if !store.occupant_ids().contains(&actor.id) {
            continue;
        }
        if store.upsert_actor(actor) {
            merged += 1;
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Directory(HashMap<String, Actor>);

    #[async_trait]
    impl ActorDirectory for Directory {
        async fn lookup(&self, actor_id: &str) -> Result<Actor, LookupError> {
            if actor_id == "slow" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.0
                .get(actor_id)
                .cloned()
                .ok_or_else(|| LookupError::NotFound(actor_id.to_string()))
        }
    }

    #[test]
    fn window_is_not_extended_by_later_lists() {
        let start = Instant::now();
        let mut reconciler = RosterReconciler::new(Duration::from_millis(200), Duration::from_secs(1));
        reconciler.queue("A", vec!["x".into()], 0, start);
        reconciler.queue("A", vec!["x".into(), "y".into()], 0, start + Duration::from_millis(150));
        assert_eq!(reconciler.deadline(), Some(start + Duration::from_millis(200)));

        assert!(reconciler.take_due(start + Duration::from_millis(199)).is_none());
        let batch = reconciler.take_due(start + Duration::from_millis(200)).unwrap();
        assert_eq!(batch.occupant_ids, vec!["x".to_string(), "y".to_string()]);
        assert!(reconciler.deadline().is_none());
    }

    #[test]
    fn new_room_restarts_window() {
        let start = Instant::now();
        let mut reconciler = RosterReconciler::new(Duration::from_millis(200), Duration::from_secs(1));
        reconciler.queue("A", vec!["x".into()], 0, start);
        reconciler.queue("B", vec!["y".into()], 0, start + Duration::from_millis(100));
        let batch = reconciler.take_due(start + Duration::from_millis(300)).unwrap();
        assert_eq!(batch.room_id, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_and_slow_lookups_are_omitted() {
        let mut known = HashMap::new();
        known.insert("a".to_string(), Actor::new("a", "Ada"));
        known.insert("b".to_string(), Actor::new("b", "Bo"));
        known.insert("bad".to_string(), Actor::new("bad", ""));
        let directory = Directory(known);

        let ids: Vec<ActorId> = ["a", "missing", "b", "slow", "bad"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let actors = resolve_ids(&directory, &ids, Duration::from_secs(5)).await;
        let names: Vec<_> = actors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Bo"]);
    }
}
