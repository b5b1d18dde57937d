//! Shared world state: the block grid and the players standing in it
//!
//! A [`World`] owns two independently locked structures:
//! - the block grid, behind a read/write lock
//! - the [`PlayerRegistry`], behind a mutex
//!
//! No method holds both locks at once. Mutations update the grid first,
//! release it, and only then take the registry lock to broadcast, so a slow
//! broadcast never blocks snapshots or other edits.
//!
//! Broadcast order is therefore not tied to grid order: two edits racing on
//! the same cell can reach clients in the opposite order from the one in
//! which they were applied, leaving those clients with the losing value
//! until the cell is edited again or the level is reloaded.
//!
//! Newcomers are registered in a loading state. Broadcasts to them are held
//! back until [`World::finish_loading`], so nothing lands between
//! LevelInitialize and LevelFinalize on their connection.
//!
//! The world is created once by the caller and shared through `Arc` between
//! the accept loop, every connection task and the autosave task.

use crate::client_manager::PlayerRegistry;
use crate::error::{Result, ServerError};
use crate::persistence::{self, WorldPaths};
use crate::writer::SessionWriter;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use shared::chat::message_packets;
use shared::packets::CHUNK_LENGTH;
use shared::{BlockMode, Pose, ServerPacket, AIR, SELF_ID};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex, RwLock};

/// Compressed pieces buffered between the level compressor and the chunker.
const LEVEL_CHANNEL_DEPTH: usize = 16;

/// Uncompressed bytes fed to the compressor between progress updates.
const COMPRESS_STEP: usize = 16 * 1024;

/// Size of the block grid along each axis; Y points up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

impl Dimensions {
    pub fn new(x: u16, y: u16, z: u16) -> Self {
        Self { x, y, z }
    }

    pub fn volume(&self) -> usize {
        usize::from(self.x) * usize::from(self.y) * usize::from(self.z)
    }

    pub fn contains(&self, x: u16, y: u16, z: u16) -> bool {
        x < self.x && y < self.y && z < self.z
    }

    /// Index of a block in the grid, or None outside the world.
    pub fn position(&self, x: u16, y: u16, z: u16) -> Option<usize> {
        if !self.contains(x, y, z) {
            return None;
        }
        let (sx, sz) = (usize::from(self.x), usize::from(self.z));
        Some(usize::from(y) * sx * sz + usize::from(z) * sx + usize::from(x))
    }
}

/// Descriptive data loaded with the world, fixed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldMetadata {
    pub name: String,
    pub uuid: [u8; 16],
    pub size: Dimensions,
    pub spawn: Pose,
}

pub struct World {
    metadata: WorldMetadata,
    blocks: RwLock<Vec<u8>>,
    players: Mutex<PlayerRegistry>,
    dirty: AtomicBool,
    save_lock: Mutex<()>,
}

impl World {
    /// Builds a world from loaded or generated blocks.
    ///
    /// `blocks` must hold exactly one byte per cell of `metadata.size`.
    pub fn new(metadata: WorldMetadata, blocks: Vec<u8>, max_players: usize) -> Result<Self> {
        let volume = metadata.size.volume();
        if blocks.len() != volume {
            return Err(ServerError::WorldFormat(format!(
                "block array holds {} bytes, world needs {}",
                blocks.len(),
                volume
            )));
        }

        Ok(Self {
            metadata,
            blocks: RwLock::new(blocks),
            players: Mutex::new(PlayerRegistry::new(max_players)),
            dirty: AtomicBool::new(false),
            save_lock: Mutex::new(()),
        })
    }

    pub fn metadata(&self) -> &WorldMetadata {
        &self.metadata
    }

    pub fn size(&self) -> Dimensions {
        self.metadata.size
    }

    /// Registers a loading player at the spawn pose and returns their id.
    ///
    /// Broadcasts to the player are queued until [`World::finish_loading`].
    pub async fn add_player(
        &self,
        username: String,
        operator: bool,
        writer: SessionWriter,
    ) -> Result<u8> {
        let mut players = self.players.lock().await;
        let id = players
            .add_player(username, operator, self.metadata.spawn, writer)
            .ok_or_else(|| ServerError::CapacityExceeded(players.capacity()))?;
        if let Some(player) = players.get_mut(id) {
            player.begin_loading();
        }
        Ok(id)
    }

    /// Replays what was broadcast while the player was loading and switches
    /// them to direct delivery.
    pub async fn finish_loading(&self, id: u8) -> Result<()> {
        let mut players = self.players.lock().await;
        match players.get_mut(id) {
            Some(player) => Ok(player.finish_loading()?),
            None => Ok(()),
        }
    }

    /// Frees a player's slot and tells everyone left that they are gone.
    ///
    /// Returns the player's name, or None if the id was not registered.
    pub async fn remove_player(&self, id: u8) -> Option<String> {
        let mut players = self.players.lock().await;
        let player = players.remove_player(id)?;
        players.broadcast(&[ServerPacket::DespawnPlayer { player_id: id }]);
        Some(player.username)
    }

    /// Applies a block edit and broadcasts the result to every player.
    ///
    /// Coordinates outside the world are ignored; returns whether the edit
    /// was applied.
    pub async fn set_block(&self, x: u16, y: u16, z: u16, mode: BlockMode, block_type: u8) -> bool {
        let Some(index) = self.metadata.size.position(x, y, z) else {
            debug!("Ignoring block edit outside the world at {},{},{}", x, y, z);
            return false;
        };
        let block_type = match mode {
            BlockMode::Destroy => AIR,
            BlockMode::Place => block_type,
        };

        {
            let mut blocks = self.blocks.write().await;
            blocks[index] = block_type;
        }
        self.dirty.store(true, Ordering::SeqCst);

        let mut players = self.players.lock().await;
        players.broadcast(&[ServerPacket::SetBlock {
            x,
            y,
            z,
            block_type,
        }]);
        true
    }

    pub async fn block(&self, x: u16, y: u16, z: u16) -> Option<u8> {
        let index = self.metadata.size.position(x, y, z)?;
        Some(self.blocks.read().await[index])
    }

    /// Records a player's new pose and broadcasts it.
    pub async fn move_player(&self, id: u8, pose: Pose) {
        let mut players = self.players.lock().await;
        let Some(player) = players.get_mut(id) else {
            return;
        };
        player.pose = pose;
        players.broadcast(&[ServerPacket::Move { player_id: id, pose }]);
    }

    /// Introduces a newcomer and the players already present to each other.
    pub async fn spawn_existing(&self, id: u8) {
        let mut players = self.players.lock().await;
        let Some(newcomer) = players.get(id) else {
            return;
        };
        let newcomer_spawn = [newcomer.spawn_packet()];
        let others: Vec<ServerPacket> = players
            .iter()
            .filter(|player| player.id != id)
            .map(|player| player.spawn_packet())
            .collect();

        if let Some(newcomer) = players.get_mut(id) {
            if let Err(e) = newcomer.send(&others) {
                debug!("Could not introduce others to player {}: {}", id, e);
                return;
            }
        }
        players.broadcast_except(id, &newcomer_spawn);
    }

    /// Moves a player onto another player, found by name.
    ///
    /// The mover gets its new pose addressed to itself; everyone else sees
    /// the mover's id move. Returns the target's name, or None if nobody
    /// by that name is online.
    pub async fn teleport(&self, id: u8, target: &str) -> Option<String> {
        let mut players = self.players.lock().await;
        let (target_name, pose) = {
            let target = players.find_by_name(target)?;
            (target.username.clone(), target.pose)
        };

        let player = players.get_mut(id)?;
        player.pose = pose;
        if let Err(e) = player.send(&[ServerPacket::Move {
            player_id: SELF_ID,
            pose,
        }]) {
            debug!("Could not teleport player {}: {}", id, e);
        }
        players.broadcast_except(id, &[ServerPacket::Move { player_id: id, pose }]);
        Some(target_name)
    }

    pub async fn player_count(&self) -> usize {
        self.players.lock().await.len()
    }

    /// Sends chat text to one player, split into as many messages as needed.
    pub async fn send_message(&self, id: u8, text: &str) {
        let mut players = self.players.lock().await;
        if let Some(player) = players.get_mut(id) {
            if let Err(e) = player.send(&message_packets(text)) {
                debug!("Could not message player {}: {}", id, e);
            }
        }
    }

    pub async fn broadcast_message(&self, text: &str) {
        let packets = message_packets(text);
        let mut players = self.players.lock().await;
        players.broadcast(&packets);
    }

    /// Copy of the whole grid, taken under the read lock.
    pub async fn snapshot(&self) -> Vec<u8> {
        self.blocks.read().await.clone()
    }

    /// Streams the level to a client: initialize, gzip chunks, finalize.
    ///
    /// Writes straight to `writer`, past any loading backlog.
    ///
    /// Compression runs on a blocking thread and hands compressed bytes over
    /// a bounded channel, so a large world is sent while it is still being
    /// compressed.
    pub async fn send_world(&self, writer: &SessionWriter) -> Result<()> {
        writer.submit(&[ServerPacket::LevelInitialize])?;

        let blocks = self.snapshot().await;
        let (tx, mut rx) = mpsc::channel(LEVEL_CHANNEL_DEPTH);
        let producer = tokio::task::spawn_blocking(move || compress_level(&blocks, tx));

        let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_LENGTH * 2);
        let mut sent = 0usize;
        while let Some((bytes, percent)) = rx.recv().await {
            pending.extend_from_slice(&bytes);
            while pending.len() >= CHUNK_LENGTH {
                let data: Vec<u8> = pending.drain(..CHUNK_LENGTH).collect();
                writer.submit(&[ServerPacket::LevelDataChunk {
                    data,
                    percent_complete: percent,
                }])?;
                sent += 1;
            }
        }

        producer
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        if !pending.is_empty() {
            writer.submit(&[ServerPacket::LevelDataChunk {
                data: pending,
                percent_complete: 100,
            }])?;
            sent += 1;
        }

        let size = self.metadata.size;
        writer.submit(&[ServerPacket::LevelFinalize {
            x: size.x,
            y: size.y,
            z: size.z,
        }])?;
        writer.flush();
        debug!("Sent level in {} chunks", sent);
        Ok(())
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Writes the world to disk through the scratch and temp files.
    ///
    /// Only one save runs at a time. On failure the world stays dirty so the
    /// next autosave tries again.
    pub async fn save(&self, paths: &WorldPaths) -> Result<()> {
        let _guard = self.save_lock.lock().await;

        // edits made while the file is written mark the world dirty again
        self.dirty.store(false, Ordering::SeqCst);
        let blocks = self.snapshot().await;
        let metadata = self.metadata.clone();
        let target = paths.clone();

        let result = tokio::task::spawn_blocking(move || {
            persistence::write_world(&target, &metadata, &blocks)
        })
        .await
        .map_err(|e| ServerError::Io(io::Error::new(io::ErrorKind::Other, e)))
        .and_then(|result| result);

        match &result {
            Ok(()) => info!("Saved world to {}", paths.world.display()),
            Err(_) => self.mark_dirty(),
        }
        result
    }

    /// Saves only if a block changed since the last successful save.
    pub async fn save_if_dirty(&self, paths: &WorldPaths) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.save(paths).await?;
        Ok(true)
    }
}

/// Compressed output sink that forwards every write over the level channel.
struct ChannelWriter {
    tx: mpsc::Sender<(Vec<u8>, u8)>,
    percent: u8,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send((buf.to_vec(), self.percent))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Gzips the level payload (a big-endian block count, then the blocks).
fn compress_level(blocks: &[u8], tx: mpsc::Sender<(Vec<u8>, u8)>) -> io::Result<()> {
    let count = u32::try_from(blocks.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "level too large"))?;
    let mut encoder = GzEncoder::new(ChannelWriter { tx, percent: 0 }, Compression::default());
    encoder.write_all(&count.to_be_bytes())?;

    let total = blocks.len().max(1);
    let mut done = 0;
    for step in blocks.chunks(COMPRESS_STEP) {
        encoder.write_all(step)?;
        done += step.len();
        encoder.get_mut().percent = (done * 100 / total) as u8;
    }

    encoder.get_mut().percent = 100;
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{join, next_packet, small_world, test_root};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::Arc;

    #[test]
    fn test_position_formula() {
        let size = Dimensions::new(4, 3, 5);
        assert_eq!(size.volume(), 60);
        assert_eq!(size.position(0, 0, 0), Some(0));
        assert_eq!(size.position(1, 0, 0), Some(1));
        assert_eq!(size.position(0, 0, 1), Some(4));
        assert_eq!(size.position(0, 1, 0), Some(20));
        assert_eq!(size.position(3, 2, 4), Some(2 * 20 + 4 * 4 + 3));
    }

    #[test]
    fn test_position_is_unique_and_bounded() {
        let size = Dimensions::new(4, 3, 5);
        let mut seen = vec![false; size.volume()];
        for y in 0..size.y {
            for z in 0..size.z {
                for x in 0..size.x {
                    let index = size.position(x, y, z).unwrap();
                    assert!(!seen[index]);
                    seen[index] = true;
                }
            }
        }
        assert!(seen.iter().all(|s| *s));

        assert_eq!(size.position(4, 0, 0), None);
        assert_eq!(size.position(0, 3, 0), None);
        assert_eq!(size.position(0, 0, 5), None);
        assert_eq!(size.position(u16::MAX, u16::MAX, u16::MAX), None);
    }

    #[test]
    fn test_new_rejects_wrong_block_count() {
        let metadata = WorldMetadata {
            name: "bad".to_string(),
            uuid: [0; 16],
            size: Dimensions::new(2, 2, 2),
            spawn: Pose::default(),
        };
        let result = World::new(metadata, vec![0; 7], 4);
        assert!(matches!(result, Err(ServerError::WorldFormat(_))));
    }

    #[tokio::test]
    async fn test_set_block_broadcasts_to_everyone() {
        let world = small_world(4);
        let (_a, _a_writer, mut a) = join(&world, "alice").await;
        let (_b, _b_writer, mut b) = join(&world, "bob").await;

        assert!(world.set_block(1, 2, 3, BlockMode::Place, 7).await);
        assert_eq!(world.block(1, 2, 3).await, Some(7));
        assert!(world.is_dirty());

        let expected = ServerPacket::SetBlock {
            x: 1,
            y: 2,
            z: 3,
            block_type: 7,
        };
        assert_eq!(next_packet(&mut a).await, expected);
        assert_eq!(next_packet(&mut b).await, expected);
    }

    #[tokio::test]
    async fn test_destroy_stores_air() {
        let world = small_world(1);
        world.set_block(0, 0, 0, BlockMode::Place, 5).await;
        world.set_block(0, 0, 0, BlockMode::Destroy, 9).await;
        assert_eq!(world.block(0, 0, 0).await, Some(AIR));
    }

    #[tokio::test]
    async fn test_out_of_bounds_edit_is_ignored() {
        let world = small_world(1);
        let before = world.snapshot().await;
        let size = world.size();

        assert!(!world.set_block(size.x, 0, 0, BlockMode::Place, 1).await);
        assert!(!world.set_block(0, size.y, 0, BlockMode::Place, 1).await);
        assert!(!world.set_block(0, 0, size.z, BlockMode::Place, 1).await);

        assert_eq!(world.snapshot().await, before);
        assert!(!world.is_dirty());
    }

    #[tokio::test]
    async fn test_capacity_exceeded() {
        let world = small_world(1);
        let (_id, _writer, _client) = join(&world, "alice").await;

        let writer = SessionWriter::spawn(tokio::io::sink(), std::time::Duration::from_secs(60));
        let result = world.add_player("bob".to_string(), false, writer).await;
        assert!(matches!(result, Err(ServerError::CapacityExceeded(1))));
    }

    #[tokio::test]
    async fn test_remove_player_broadcasts_despawn() {
        let world = small_world(2);
        let (a, _a_writer, _a_client) = join(&world, "alice").await;
        let (_b, _b_writer, mut b) = join(&world, "bob").await;

        assert_eq!(world.remove_player(a).await.as_deref(), Some("alice"));
        assert_eq!(
            next_packet(&mut b).await,
            ServerPacket::DespawnPlayer { player_id: a }
        );
        assert_eq!(world.player_count().await, 1);
        assert!(world.remove_player(a).await.is_none());

        let (reused, _writer, _client) = join(&world, "carol").await;
        assert_eq!(reused, a);
    }

    #[tokio::test]
    async fn test_move_player_broadcasts_pose() {
        let world = small_world(2);
        let (a, _a_writer, _a_client) = join(&world, "alice").await;
        let (_b, _b_writer, mut b) = join(&world, "bob").await;

        let pose = Pose::new(100, 200, 300, 10, 20);
        world.move_player(a, pose).await;
        assert_eq!(
            next_packet(&mut b).await,
            ServerPacket::Move { player_id: a, pose }
        );
    }

    #[tokio::test]
    async fn test_spawn_existing_introduces_both_ways() {
        let world = small_world(3);
        let (a, _a_writer, mut a_client) = join(&world, "alice").await;
        let (b, _b_writer, mut b_client) = join(&world, "bob").await;

        world.spawn_existing(b).await;

        match next_packet(&mut b_client).await {
            ServerPacket::SpawnPlayer {
                player_id, name, ..
            } => {
                assert_eq!(player_id, a);
                assert_eq!(name, "alice");
            }
            other => panic!("expected spawn, got {:?}", other),
        }
        match next_packet(&mut a_client).await {
            ServerPacket::SpawnPlayer {
                player_id, name, ..
            } => {
                assert_eq!(player_id, b);
                assert_eq!(name, "bob");
            }
            other => panic!("expected spawn, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_teleport_moves_onto_target() {
        let world = small_world(2);
        let (a, _a_writer, mut a_client) = join(&world, "alice").await;
        let (b, _b_writer, mut b_client) = join(&world, "Bob").await;

        let target = Pose::new(500, 600, 700, 1, 2);
        world.move_player(b, target).await;
        // both clients see bob's move first
        next_packet(&mut a_client).await;
        next_packet(&mut b_client).await;

        assert_eq!(world.teleport(a, "bob").await.as_deref(), Some("Bob"));
        assert_eq!(
            next_packet(&mut a_client).await,
            ServerPacket::Move {
                player_id: SELF_ID,
                pose: target
            }
        );
        assert_eq!(
            next_packet(&mut b_client).await,
            ServerPacket::Move {
                player_id: a,
                pose: target
            }
        );

        assert!(world.teleport(a, "nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_send_world_streams_gzip_level() {
        let world = small_world(1);
        world.set_block(3, 1, 2, BlockMode::Place, 42).await;
        let (_id, writer, mut client) = join(&world, "alice").await;

        world.send_world(&writer).await.unwrap();

        assert_eq!(next_packet(&mut client).await, ServerPacket::LevelInitialize);
        let mut compressed = Vec::new();
        let mut last_percent = 0;
        let finalize = loop {
            match next_packet(&mut client).await {
                ServerPacket::LevelDataChunk {
                    data,
                    percent_complete,
                } => {
                    assert!(percent_complete >= last_percent);
                    last_percent = percent_complete;
                    compressed.extend_from_slice(&data);
                }
                other => break other,
            }
        };
        assert_eq!(last_percent, 100);

        let size = world.size();
        assert_eq!(
            finalize,
            ServerPacket::LevelFinalize {
                x: size.x,
                y: size.y,
                z: size.z
            }
        );

        let mut level = Vec::new();
        GzDecoder::new(&compressed[..])
            .read_to_end(&mut level)
            .unwrap();
        let count = u32::from_be_bytes([level[0], level[1], level[2], level[3]]) as usize;
        assert_eq!(count, size.volume());
        assert_eq!(&level[4..], &world.snapshot().await[..]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_edits_during_level_transfer_arrive_after_finalize() {
        use rand::{Rng, SeedableRng};
        use std::sync::atomic::AtomicUsize;

        // random blocks so the level spans many chunks
        let size = Dimensions::new(64, 64, 64);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let blocks: Vec<u8> = (0..size.volume()).map(|_| rng.gen()).collect();
        let metadata = WorldMetadata {
            name: "noise".to_string(),
            uuid: [1; 16],
            size,
            spawn: Pose::at_block(1, 1, 1),
        };
        let world = Arc::new(World::new(metadata, blocks, 2).unwrap());

        let (server, mut client) = tokio::io::duplex(64 * 1024);
        let writer = SessionWriter::spawn(server, std::time::Duration::from_millis(5));
        let id = world
            .add_player("alice".to_string(), false, writer.clone())
            .await
            .unwrap();
        world.set_block(0, 0, 0, BlockMode::Place, 1).await;

        let running = Arc::new(AtomicBool::new(true));
        let edits = Arc::new(AtomicUsize::new(1));
        let editor = {
            let (world, running, edits) =
                (Arc::clone(&world), Arc::clone(&running), Arc::clone(&edits));
            tokio::spawn(async move {
                let mut x = 0u16;
                while running.load(Ordering::SeqCst) {
                    world.set_block(x % 64, 1, 0, BlockMode::Place, 2).await;
                    edits.fetch_add(1, Ordering::SeqCst);
                    x = x.wrapping_add(1);
                    tokio::task::yield_now().await;
                }
            })
        };

        world.send_world(&writer).await.unwrap();
        running.store(false, Ordering::SeqCst);
        editor.await.unwrap();
        world.finish_loading(id).await.unwrap();
        writer.flush();

        assert_eq!(next_packet(&mut client).await, ServerPacket::LevelInitialize);
        let mut chunks = 0;
        loop {
            match next_packet(&mut client).await {
                ServerPacket::LevelDataChunk { .. } => chunks += 1,
                ServerPacket::LevelFinalize { .. } => break,
                other => panic!("unexpected packet inside the level: {:?}", other),
            }
        }
        assert!(chunks > 1);

        for _ in 0..edits.load(Ordering::SeqCst) {
            assert!(matches!(
                next_packet(&mut client).await,
                ServerPacket::SetBlock { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_save_clears_dirty_flag() {
        let root = test_root("world-save");
        let paths = WorldPaths::new(root.join("world.cw"));
        let world = small_world(1);

        assert!(!world.save_if_dirty(&paths).await.unwrap());
        assert!(!paths.world.exists());

        world.set_block(1, 1, 1, BlockMode::Place, 9).await;
        assert!(world.save_if_dirty(&paths).await.unwrap());
        assert!(!world.is_dirty());
        assert!(paths.world.exists());

        let loaded = persistence::read_world(&paths.world, 1).unwrap();
        assert_eq!(loaded.block(1, 1, 1).await, Some(9));
        assert_eq!(loaded.metadata(), world.metadata());
    }

    #[tokio::test]
    async fn test_failed_save_stays_dirty() {
        let root = test_root("world-save-fail");
        // a directory where the scratch file should go
        let paths = WorldPaths::new(root.join("world.cw"));
        std::fs::create_dir_all(&paths.scratch).unwrap();

        let world = small_world(1);
        world.mark_dirty();
        let result = world.save(&paths).await;
        assert!(matches!(result, Err(ServerError::Persistence { .. })));
        assert!(world.is_dirty());
    }

    #[tokio::test]
    async fn test_concurrent_edits_from_many_tasks() {
        let world = small_world(1);
        let size = world.size();
        let mut handles = Vec::new();
        for x in 0..size.x {
            let world = Arc::clone(&world);
            handles.push(tokio::spawn(async move {
                for z in 0..size.z {
                    world.set_block(x, 0, z, BlockMode::Place, (x + z) as u8).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        for x in 0..size.x {
            for z in 0..size.z {
                assert_eq!(world.block(x, 0, z).await, Some((x + z) as u8));
            }
        }
    }
}
