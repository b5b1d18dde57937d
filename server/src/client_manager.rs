//! Player slot table for the block-world server
//!
//! This module tracks the players that completed identification:
//! - Slot allocation, always handing out the lowest free id
//! - Per-player state (name, operator flag, last known pose)
//! - Ownership of each player's [`SessionWriter`]
//! - Fan-out of packets to every registered player
//!
//! The registry itself is plain data; the world keeps it behind a single
//! mutex, so every broadcast issued while a player is registered reaches it.
//! A player that is still receiving the level holds broadcasts in a backlog
//! instead, which is replayed in order once the level is complete.

use crate::writer::{SessionWriter, WriterError};
use log::{debug, info};
use shared::{Pose, ServerPacket, MAX_PLAYERS};

/// A registered player and the writer feeding their connection
#[derive(Debug)]
pub struct Player {
    /// Slot index, also the id used on the wire
    pub id: u8,
    pub username: String,
    pub operator: bool,
    /// Last pose reported by the client or set by the server
    pub pose: Pose,
    pub writer: SessionWriter,
    /// Packets held back while the level is being transferred
    backlog: Option<Vec<ServerPacket>>,
}

impl Player {
    pub fn new(id: u8, username: String, operator: bool, pose: Pose, writer: SessionWriter) -> Self {
        Self {
            id,
            username,
            operator,
            pose,
            writer,
            backlog: None,
        }
    }

    /// Queues packets on this player's connection, or in the backlog while
    /// the player is loading.
    pub fn send(&mut self, packets: &[ServerPacket]) -> Result<(), WriterError> {
        match &mut self.backlog {
            Some(backlog) => {
                backlog.extend_from_slice(packets);
                Ok(())
            }
            None => self.writer.submit(packets),
        }
    }

    /// Holds back everything sent to this player until [`finish_loading`].
    ///
    /// [`finish_loading`]: Player::finish_loading
    pub fn begin_loading(&mut self) {
        self.backlog.get_or_insert_with(Vec::new);
    }

    /// Submits the backlog in arrival order and resumes direct delivery.
    pub fn finish_loading(&mut self) -> Result<(), WriterError> {
        match self.backlog.take() {
            Some(backlog) if !backlog.is_empty() => {
                debug!("Replaying {} packets to player {}", backlog.len(), self.id);
                self.writer.submit(&backlog)
            }
            _ => Ok(()),
        }
    }

    /// The packet that makes this player appear on another client.
    pub fn spawn_packet(&self) -> ServerPacket {
        ServerPacket::SpawnPlayer {
            player_id: self.id,
            name: self.username.clone(),
            pose: self.pose,
        }
    }
}

/// Fixed-capacity table of player slots
///
/// Ids are slot indices. A freed slot is reused by the next join, and the
/// lowest free slot always wins so ids stay small on a quiet server.
#[derive(Debug)]
pub struct PlayerRegistry {
    slots: Vec<Option<Player>>,
}

impl PlayerRegistry {
    /// Creates an empty registry; capacity is capped at [`MAX_PLAYERS`]
    /// because id 255 is reserved on the wire.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_PLAYERS);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Registers a player in the lowest free slot.
    ///
    /// Returns the assigned id, or None when every slot is taken.
    pub fn add_player(
        &mut self,
        username: String,
        operator: bool,
        pose: Pose,
        writer: SessionWriter,
    ) -> Option<u8> {
        let slot = self.slots.iter().position(Option::is_none)?;
        let id = u8::try_from(slot).ok()?;

        info!("Player {} joined as id {}", username, id);
        self.slots[slot] = Some(Player::new(id, username, operator, pose, writer));
        Some(id)
    }

    /// Frees a slot, handing back the player that held it.
    pub fn remove_player(&mut self, id: u8) -> Option<Player> {
        let player = self.slots.get_mut(usize::from(id))?.take()?;
        info!("Player {} (id {}) left", player.username, id);
        Some(player)
    }

    pub fn get(&self, id: u8) -> Option<&Player> {
        self.slots.get(usize::from(id))?.as_ref()
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Player> {
        self.slots.get_mut(usize::from(id))?.as_mut()
    }

    /// Looks a player up by name, ignoring ASCII case.
    pub fn find_by_name(&self, username: &str) -> Option<&Player> {
        self.iter()
            .find(|player| player.username.eq_ignore_ascii_case(username))
    }

    /// Registered players in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.slots.iter_mut().flatten()
    }

    /// Sends packets to every registered player.
    pub fn broadcast(&mut self, packets: &[ServerPacket]) {
        for player in self.iter_mut() {
            deliver(player, packets);
        }
    }

    /// Sends packets to every registered player except `skip`.
    pub fn broadcast_except(&mut self, skip: u8, packets: &[ServerPacket]) {
        for player in self.iter_mut().filter(|player| player.id != skip) {
            deliver(player, packets);
        }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

// A failed writer is torn down by its own connection task.
fn deliver(player: &mut Player, packets: &[ServerPacket]) {
    if let Err(e) = player.send(packets) {
        debug!("Dropping packets for player {}: {}", player.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;

    fn test_writer() -> SessionWriter {
        SessionWriter::spawn(tokio::io::sink(), Duration::from_secs(3600))
    }

    fn add(registry: &mut PlayerRegistry, name: &str) -> Option<u8> {
        registry.add_player(name.to_string(), false, Pose::default(), test_writer())
    }

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = PlayerRegistry::new(5);
        assert_eq!(registry.capacity(), 5);
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_capacity_is_capped() {
        let registry = PlayerRegistry::new(1000);
        assert_eq!(registry.capacity(), MAX_PLAYERS);
    }

    #[tokio::test]
    async fn test_add_player() {
        let mut registry = PlayerRegistry::new(2);

        let id = add(&mut registry, "alice").unwrap();
        assert_eq!(id, 0);
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
        assert_eq!(registry.get(id).unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_add_player_max_capacity() {
        let mut registry = PlayerRegistry::new(1);

        assert!(add(&mut registry, "alice").is_some());
        assert!(add(&mut registry, "bob").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_freed_id_is_reused() {
        let mut registry = PlayerRegistry::new(3);
        assert_eq!(add(&mut registry, "a"), Some(0));
        assert_eq!(add(&mut registry, "b"), Some(1));
        assert_eq!(add(&mut registry, "c"), Some(2));

        let removed = registry.remove_player(1).unwrap();
        assert_eq!(removed.username, "b");
        assert!(registry.get(1).is_none());

        assert_eq!(add(&mut registry, "d"), Some(1));
        assert_eq!(registry.get(1).unwrap().username, "d");
    }

    #[tokio::test]
    async fn test_remove_missing_player() {
        let mut registry = PlayerRegistry::new(2);
        assert!(registry.remove_player(0).is_none());
        assert!(registry.remove_player(200).is_none());
    }

    #[tokio::test]
    async fn test_full_table_has_unique_ids() {
        let mut registry = PlayerRegistry::new(MAX_PLAYERS);
        let mut ids: Vec<u8> = (0..MAX_PLAYERS)
            .map(|i| add(&mut registry, &format!("p{}", i)).unwrap())
            .collect();
        assert!(add(&mut registry, "overflow").is_none());

        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), MAX_PLAYERS);
        assert!(!ids.contains(&shared::SELF_ID));
    }

    #[tokio::test]
    async fn test_find_by_name_ignores_case() {
        let mut registry = PlayerRegistry::new(2);
        add(&mut registry, "Alice");
        assert_eq!(registry.find_by_name("alice").unwrap().id, 0);
        assert!(registry.find_by_name("bob").is_none());
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_sender() {
        let mut registry = PlayerRegistry::new(2);
        let (a_server, mut a_client) = tokio::io::duplex(256);
        let (b_server, mut b_client) = tokio::io::duplex(256);
        let a = SessionWriter::spawn(a_server, Duration::from_millis(5));
        let b = SessionWriter::spawn(b_server, Duration::from_millis(5));
        let a_id = registry
            .add_player("a".into(), false, Pose::default(), a.clone())
            .unwrap();
        registry.add_player("b".into(), false, Pose::default(), b.clone());

        registry.broadcast_except(a_id, &[ServerPacket::DespawnPlayer { player_id: 9 }]);
        registry.broadcast(&[ServerPacket::DespawnPlayer { player_id: 8 }]);
        a.close();
        b.close();

        let mut a_bytes = Vec::new();
        let mut b_bytes = Vec::new();
        timeout(Duration::from_secs(2), a_client.read_to_end(&mut a_bytes))
            .await
            .unwrap()
            .unwrap();
        timeout(Duration::from_secs(2), b_client.read_to_end(&mut b_bytes))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(a_bytes, vec![shared::packets::DESPAWN_PLAYER, 8]);
        assert_eq!(
            b_bytes,
            vec![
                shared::packets::DESPAWN_PLAYER,
                9,
                shared::packets::DESPAWN_PLAYER,
                8
            ]
        );
    }

    #[tokio::test]
    async fn test_loading_player_gets_backlog_in_order() {
        let mut registry = PlayerRegistry::new(2);
        let (server, mut client) = tokio::io::duplex(256);
        let writer = SessionWriter::spawn(server, Duration::from_millis(5));
        let id = registry
            .add_player("a".into(), false, Pose::default(), writer.clone())
            .unwrap();

        let player = registry.get_mut(id).unwrap();
        player.begin_loading();

        registry.broadcast(&[ServerPacket::DespawnPlayer { player_id: 1 }]);
        registry.broadcast(&[ServerPacket::DespawnPlayer { player_id: 2 }]);
        // the level itself bypasses the backlog
        writer.submit(&[ServerPacket::LevelInitialize]).unwrap();

        let player = registry.get_mut(id).unwrap();
        player.finish_loading().unwrap();
        registry.broadcast(&[ServerPacket::DespawnPlayer { player_id: 3 }]);
        writer.close();

        let mut bytes = Vec::new();
        timeout(Duration::from_secs(2), client.read_to_end(&mut bytes))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            bytes,
            vec![
                shared::packets::LEVEL_INITIALIZE,
                shared::packets::DESPAWN_PLAYER,
                1,
                shared::packets::DESPAWN_PLAYER,
                2,
                shared::packets::DESPAWN_PLAYER,
                3
            ]
        );
    }

    #[tokio::test]
    async fn test_broadcast_survives_closed_writer() {
        let mut registry = PlayerRegistry::new(2);
        let dead = test_writer();
        dead.close();
        registry.add_player("dead".into(), false, Pose::default(), dead);
        let live_id = add(&mut registry, "live").unwrap();

        registry.broadcast(&[ServerPacket::LevelInitialize]);
        assert!(registry.get(live_id).unwrap().writer.error().is_none());
    }
}
