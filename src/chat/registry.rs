use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use super::events::ServerEvent;

/// Process-wide directory of live socket connections per room.
///
/// Membership is ephemeral: it is lost on restart and a reconnecting
/// client is a brand-new connection that must join again. Delivery is
/// best-effort with no acknowledgment; a receiver that has gone away
/// simply misses the event.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<Mutex<HashMap<String, HashMap<Uuid, UnboundedSender<ServerEvent>>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the connection to `room`. Joining a room the connection is
    /// already a member of is a no-op.
    pub fn join(&self, conn_id: Uuid, tx: UnboundedSender<ServerEvent>, room: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms.entry(room.to_string()).or_default().insert(conn_id, tx);
    }

    /// Removes the connection from `room`. Leaving a room the connection
    /// never joined is a no-op.
    pub fn leave(&self, conn_id: Uuid, room: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Delivers `event` to every current member of `room`. Send failures
    /// (receiver dropped but not yet pruned) are ignored.
    pub fn broadcast(&self, room: &str, event: ServerEvent) {
        let members: Vec<UnboundedSender<ServerEvent>> = {
            let rooms = self.rooms.lock().unwrap();
            match rooms.get(room) {
                Some(members) => members.values().cloned().collect(),
                None => return,
            }
        };
        for tx in members {
            let _ = tx.send(event.clone());
        }
    }

    /// Removes the connection from every room it belonged to. Called on
    /// transport close, graceful or not.
    pub fn disconnect(&self, conn_id: Uuid) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    pub fn member_count(&self, room: &str) -> usize {
        let rooms = self.rooms.lock().unwrap();
        rooms.get(room).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn event() -> ServerEvent {
        ServerEvent::Error {
            message: "ping".to_string(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_only_the_named_room() {
        let registry = RoomRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.join(Uuid::now_v7(), tx_a, "A");
        registry.join(Uuid::now_v7(), tx_b, "B");

        registry.broadcast("A", event());

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn double_join_delivers_once() {
        let registry = RoomRegistry::new();
        let conn = Uuid::now_v7();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.join(conn, tx.clone(), "A");
        registry.join(conn, tx, "A");
        assert_eq!(registry.member_count("A"), 1);

        registry.broadcast("A", event());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let registry = RoomRegistry::new();
        let conn = Uuid::now_v7();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.join(conn, tx, "A");

        registry.leave(conn, "A");
        registry.leave(conn, "A");
        registry.leave(conn, "never-joined");

        registry.broadcast("A", event());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_prunes_every_membership() {
        let registry = RoomRegistry::new();
        let conn = Uuid::now_v7();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.join(conn, tx.clone(), "A");
        registry.join(conn, tx, "B");

        registry.disconnect(conn);

        registry.broadcast("A", event());
        registry.broadcast("B", event());
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.member_count("A"), 0);
        assert_eq!(registry.member_count("B"), 0);
    }

    #[tokio::test]
    async fn stale_receiver_does_not_fail_broadcast() {
        let registry = RoomRegistry::new();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let (tx_stale, rx_stale) = mpsc::unbounded_channel();
        drop(rx_stale);
        registry.join(Uuid::now_v7(), tx_live, "A");
        registry.join(Uuid::now_v7(), tx_stale, "A");

        registry.broadcast("A", event());

        assert!(rx_live.try_recv().is_ok());
    }
}
