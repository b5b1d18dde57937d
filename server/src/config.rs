//! Command-line and environment configuration.

use crate::persistence::WorldPaths;
use crate::world::Dimensions;
use clap::Parser;
use shared::{Pose, MAX_PLAYERS};
use std::path::PathBuf;
use std::time::Duration;

/// Block-world classic server
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// Address to listen on
    #[clap(long, env = "BW_ADDR", default_value = "127.0.0.1:25565")]
    pub address: String,

    /// Server name shown to connecting clients
    #[clap(long, env = "BW_NAME", default_value = "Block World")]
    pub name: String,

    /// Message of the day shown under the server name
    #[clap(long, env = "BW_MOTD", default_value = "Welcome!")]
    pub motd: String,

    /// How often buffered packets are written to each connection
    #[clap(long, env = "BW_FLUSH_MS", default_value = "50")]
    pub flush_interval_ms: u64,

    /// World size along X, used when no world file exists
    #[clap(long, env = "BW_WIDTH", default_value = "128")]
    pub width: u16,

    /// World size along Y (up)
    #[clap(long, env = "BW_HEIGHT", default_value = "64")]
    pub height: u16,

    /// World size along Z
    #[clap(long, env = "BW_LENGTH", default_value = "128")]
    pub length: u16,

    /// Spawn block X for a new world (defaults to the centre)
    #[clap(long)]
    pub spawn_x: Option<u16>,

    /// Spawn block Y for a new world (defaults to just above the surface)
    #[clap(long)]
    pub spawn_y: Option<u16>,

    /// Spawn block Z for a new world (defaults to the centre)
    #[clap(long)]
    pub spawn_z: Option<u16>,

    #[clap(long, default_value = "0")]
    pub spawn_yaw: u8,

    #[clap(long, default_value = "0")]
    pub spawn_pitch: u8,

    /// Seconds between autosaves of a modified world
    #[clap(long, env = "BW_SAVE_SECS", default_value = "300")]
    pub save_interval_secs: u64,

    /// World file to load and save
    #[clap(long, env = "BW_WORLD", default_value = "world.cw")]
    pub world: PathBuf,

    /// Chat messages starting with this are run as commands
    #[clap(long, env = "BW_CMD_PREFIX", default_value = "/")]
    pub command_prefix: String,

    /// Message sent to each player after joining
    #[clap(long, env = "BW_WELCOME", default_value = "Welcome to the server!")]
    pub welcome: String,

    /// Usernames granted operator status
    #[clap(long = "op", env = "BW_OPS", value_delimiter = ',')]
    pub ops: Vec<String>,

    /// Player slots, at most 255
    #[clap(long, env = "BW_MAX_PLAYERS", default_value = "255")]
    pub max_players: usize,
}

/// Settings the server runs with, fixed at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub address: String,
    pub server_name: String,
    pub motd: String,
    pub flush_interval: Duration,
    /// Size of a freshly created world
    pub size: Dimensions,
    /// Spawn pose of a freshly created world
    pub spawn: Pose,
    pub save_interval: Duration,
    pub paths: WorldPaths,
    pub command_prefix: String,
    pub welcome: String,
    pub operators: Vec<String>,
    pub max_players: usize,
}

impl Config {
    pub fn is_operator(&self, username: &str) -> bool {
        self.operators
            .iter()
            .any(|op| op.eq_ignore_ascii_case(username))
    }
}

/// Standing on the grass in the middle of a flat world.
pub fn default_spawn(size: Dimensions) -> Pose {
    Pose::at_block(size.x / 2, size.y / 2 + 1, size.z / 2)
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let size = Dimensions::new(args.width, args.height, args.length);
        let spawn = Pose {
            yaw: args.spawn_yaw,
            pitch: args.spawn_pitch,
            ..Pose::at_block(
                args.spawn_x.unwrap_or(size.x / 2),
                args.spawn_y.unwrap_or(size.y / 2 + 1),
                args.spawn_z.unwrap_or(size.z / 2),
            )
        };

        Self {
            address: args.address,
            server_name: args.name,
            motd: args.motd,
            flush_interval: Duration::from_millis(args.flush_interval_ms.max(1)),
            size,
            spawn,
            save_interval: Duration::from_secs(args.save_interval_secs.max(1)),
            paths: WorldPaths::new(args.world),
            command_prefix: args.command_prefix,
            welcome: args.welcome,
            operators: args.ops.into_iter().filter(|op| !op.is_empty()).collect(),
            max_players: args.max_players.clamp(1, MAX_PLAYERS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let size = Dimensions::new(128, 64, 128);
        Self {
            address: "127.0.0.1:25565".to_string(),
            server_name: "Block World".to_string(),
            motd: "Welcome!".to_string(),
            flush_interval: Duration::from_millis(50),
            size,
            spawn: default_spawn(size),
            save_interval: Duration::from_secs(300),
            paths: WorldPaths::new(PathBuf::from("world.cw")),
            command_prefix: "/".to_string(),
            welcome: "Welcome to the server!".to_string(),
            operators: Vec::new(),
            max_players: MAX_PLAYERS,
        }
    }
}
