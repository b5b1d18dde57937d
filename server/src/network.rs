//! Server network layer: TCP accept loop, per-connection sessions and autosave

use crate::commands;
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::persistence::WorldPaths;
use crate::world::World;
use crate::writer::{SessionWriter, WriterError};
use log::{debug, error, info, warn};
use shared::packets::{read_identification, read_packet, IDENTIFICATION};
use shared::{ClientPacket, ServerPacket, PROTOCOL_VERSION, SELF_ID};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Listening server sharing one world between all connections
pub struct Server {
    listener: TcpListener,
    world: Arc<World>,
    config: Arc<Config>,
}

impl Server {
    pub async fn bind(config: Config, world: Arc<World>) -> Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            world,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the task is dropped, with autosave running
    /// alongside.
    pub async fn run(self) {
        let _autosave = spawn_autosave(
            Arc::clone(&self.world),
            self.config.paths.clone(),
            self.config.save_interval,
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let world = Arc::clone(&self.world);
                    let config = Arc::clone(&self.config);
                    tokio::spawn(async move {
                        handle_connection(stream, addr, world, config).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Saves the world every `period` if it changed; failures are retried on the
/// next tick.
pub fn spawn_autosave(world: Arc<World>, paths: WorldPaths, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        timer.tick().await;

        loop {
            timer.tick().await;
            match world.save_if_dirty(&paths).await {
                Ok(true) => {}
                Ok(false) => debug!("World unchanged, skipping autosave"),
                Err(e) => error!("Autosave failed: {}", e),
            }
        }
    })
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, world: Arc<World>, config: Arc<Config>) {
    info!("Connection from {}", addr);
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }

    let (read_half, write_half) = stream.into_split();
    match serve(read_half, write_half, &world, &config).await {
        Ok(()) => info!("Connection from {} closed", addr),
        Err(e) if e.is_disconnect() => info!("Connection from {} closed by peer", addr),
        Err(e) => warn!("Connection from {} dropped: {}", addr, e),
    }
}

/// Runs one session from identification to disconnect.
///
/// The player is always unregistered and their writer closed on the way
/// out, whatever ended the session.
pub async fn serve<R, W>(read_half: R, write_half: W, world: &World, config: &Config) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(read_half);
    let identification = read_identification(&mut reader).await?;
    let writer = SessionWriter::spawn(write_half, config.flush_interval);
    let username = identification.username;

    if identification.protocol_version != PROTOCOL_VERSION {
        warn!(
            "{} uses protocol version {}, expected {}",
            username, identification.protocol_version, PROTOCOL_VERSION
        );
        kick(
            &writer,
            &format!("Unsupported protocol version {}", identification.protocol_version),
        )
        .await;
        return Ok(());
    }
    if username.is_empty() {
        kick(&writer, "Missing username").await;
        return Ok(());
    }

    let operator = config.is_operator(&username);
    writer.submit(&[ServerPacket::Identification {
        server_name: config.server_name.clone(),
        motd: config.motd.clone(),
        operator,
    }])?;

    let id = match world.add_player(username.clone(), operator, writer.clone()).await {
        Ok(id) => id,
        Err(ServerError::CapacityExceeded(capacity)) => {
            info!("Turning away {}: all {} slots taken", username, capacity);
            kick(&writer, "Server is full").await;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let result = play(&mut reader, &writer, world, config, id, &username).await;

    if world.remove_player(id).await.is_some() {
        world
            .broadcast_message(&format!("{} left the game", username))
            .await;
    }
    writer.close();
    result
}

/// Sends a disconnect reason and waits until it has been written.
async fn kick(writer: &SessionWriter, reason: &str) {
    let _ = writer.submit(&[ServerPacket::Disconnect {
        reason: reason.to_string(),
    }]);
    writer.close();
    writer.stopped().await;
}

async fn play<R>(
    reader: &mut BufReader<R>,
    writer: &SessionWriter,
    world: &World,
    config: &Config,
    id: u8,
    username: &str,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    world.send_world(writer).await?;
    writer.submit(&[ServerPacket::SpawnPlayer {
        player_id: SELF_ID,
        name: username.to_string(),
        pose: world.metadata().spawn,
    }])?;
    world.finish_loading(id).await?;
    world.spawn_existing(id).await;
    if !config.welcome.is_empty() {
        world.send_message(id, &config.welcome).await;
    }
    world
        .broadcast_message(&format!("{} joined the game", username))
        .await;
    writer.flush();

    loop {
        let packet = tokio::select! {
            packet = read_packet(reader) => packet?,
            _ = writer.stopped() => {
                return Err(writer.error().unwrap_or(WriterError::Closed).into());
            }
        };

        match packet {
            ClientPacket::SetBlock {
                x,
                y,
                z,
                mode,
                block_type,
            } => {
                world.set_block(x, y, z, mode, block_type).await;
            }
            ClientPacket::Move { pose } => world.move_player(id, pose).await,
            ClientPacket::Message { text } => {
                handle_message(world, config, id, username, &text).await
            }
            ClientPacket::Identification(_) => {
                return Err(ServerError::UnexpectedPacket(IDENTIFICATION));
            }
        }
    }
}

async fn handle_message(world: &World, config: &Config, id: u8, username: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    match text.strip_prefix(config.command_prefix.as_str()) {
        Some(command) if !config.command_prefix.is_empty() => {
            debug!("{} ran command {:?}", username, command);
            commands::handle_command(world, id, command).await;
        }
        _ => {
            info!("<{}> {}", username, text);
            world
                .broadcast_message(&format!("<{}> {}", username, text))
                .await;
        }
    }
}
