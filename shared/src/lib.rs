//! Wire and storage formats shared by the block-world server and its clients.
//!
//! - [`packets`]: the fixed-layout protocol packets exchanged over TCP
//! - [`chat`]: splitting long chat text into protocol-sized messages
//! - [`nbt`]: the tagged compound-tree format used for world files

pub mod chat;
pub mod nbt;
pub mod packets;

pub use packets::{BlockMode, ClientPacket, Identification, PacketError, ServerPacket};

/// The only protocol revision this server speaks.
pub const PROTOCOL_VERSION: u8 = 0x07;

/// Player id used on the wire to address the receiving client itself.
pub const SELF_ID: u8 = 255;

/// Number of usable player slots; ids run from 0 to `MAX_PLAYERS - 1`.
pub const MAX_PLAYERS: usize = 255;

/// User type byte sent to operators in the server identification.
pub const OPERATOR_FLAG: u8 = 64;

pub const AIR: u8 = 0;
pub const STONE: u8 = 1;
pub const GRASS: u8 = 2;
pub const DIRT: u8 = 3;

/// Position and orientation of a player.
///
/// Coordinates are in protocol units (1/32 of a block), yaw and pitch in
/// 1/256 of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pose {
    pub x: u16,
    pub y: u16,
    pub z: u16,
    pub yaw: u8,
    pub pitch: u8,
}

impl Pose {
    pub fn new(x: u16, y: u16, z: u16, yaw: u8, pitch: u8) -> Self {
        Self {
            x,
            y,
            z,
            yaw,
            pitch,
        }
    }

    /// Pose standing at the centre of the given block column.
    pub fn at_block(x: u16, y: u16, z: u16) -> Self {
        Self::new(
            x.saturating_mul(32).saturating_add(16),
            y.saturating_mul(32).saturating_add(51),
            z.saturating_mul(32).saturating_add(16),
            0,
            0,
        )
    }
}
