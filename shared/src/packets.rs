//! Fixed-layout protocol packets.
//!
//! Every packet starts with its id byte followed by a statically known list of
//! fields: single bytes, big-endian shorts and 64-byte strings padded with
//! spaces. Readers work on any tokio [`AsyncRead`]; writers append to a byte
//! buffer so a session can batch many packets into one socket write.

use crate::Pose;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

pub const STRING_LENGTH: usize = 64;
pub const CHUNK_LENGTH: usize = 1024;

pub const IDENTIFICATION: u8 = 0x00;
pub const LEVEL_INITIALIZE: u8 = 0x02;
pub const LEVEL_DATA_CHUNK: u8 = 0x03;
pub const LEVEL_FINALIZE: u8 = 0x04;
pub const SET_BLOCK_CLIENT: u8 = 0x05;
pub const SET_BLOCK_SERVER: u8 = 0x06;
pub const SPAWN_PLAYER: u8 = 0x07;
pub const MOVE: u8 = 0x08;
pub const DESPAWN_PLAYER: u8 = 0x0c;
pub const MESSAGE: u8 = 0x0d;
pub const DISCONNECT: u8 = 0x0e;

// Unused byte of the message layout, written as-is.
const MESSAGE_PAD: u8 = 0x00;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("wrong packet id: expected {expected:#04x}, got {actual:#04x}")]
    WrongPacketId { expected: u8, actual: u8 },

    #[error("unknown packet id {0:#04x}")]
    UnknownPacketId(u8),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PacketError {
    /// True when the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            PacketError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Block edit mode sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Destroy,
    Place,
}

impl From<u8> for BlockMode {
    fn from(mode: u8) -> Self {
        if mode == 0 {
            BlockMode::Destroy
        } else {
            BlockMode::Place
        }
    }
}

impl From<BlockMode> for u8 {
    fn from(mode: BlockMode) -> Self {
        match mode {
            BlockMode::Destroy => 0,
            BlockMode::Place => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub protocol_version: u8,
    pub username: String,
    pub verification_key: String,
}

/// Packets sent by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    Identification(Identification),
    SetBlock {
        x: u16,
        y: u16,
        z: u16,
        mode: BlockMode,
        block_type: u8,
    },
    Move {
        pose: Pose,
    },
    Message {
        text: String,
    },
}

/// Packets sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    Identification {
        server_name: String,
        motd: String,
        operator: bool,
    },
    LevelInitialize,
    LevelDataChunk {
        data: Vec<u8>,
        percent_complete: u8,
    },
    LevelFinalize {
        x: u16,
        y: u16,
        z: u16,
    },
    SetBlock {
        x: u16,
        y: u16,
        z: u16,
        block_type: u8,
    },
    SpawnPlayer {
        player_id: u8,
        name: String,
        pose: Pose,
    },
    Move {
        player_id: u8,
        pose: Pose,
    },
    DespawnPlayer {
        player_id: u8,
    },
    Message {
        text: String,
    },
    Disconnect {
        reason: String,
    },
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Pads with spaces, truncating to exactly [`STRING_LENGTH`] bytes.
fn put_string(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let used = bytes.len().min(STRING_LENGTH);
    out.extend_from_slice(&bytes[..used]);
    out.resize(out.len() + STRING_LENGTH - used, b' ');
}

fn put_pose(out: &mut Vec<u8>, pose: &Pose) {
    put_u16(out, pose.x);
    put_u16(out, pose.y);
    put_u16(out, pose.z);
    out.push(pose.yaw);
    out.push(pose.pitch);
}

async fn expect_id<R: AsyncRead + Unpin>(reader: &mut R, expected: u8) -> Result<(), PacketError> {
    let actual = reader.read_u8().await?;
    if actual != expected {
        return Err(PacketError::WrongPacketId { expected, actual });
    }
    Ok(())
}

async fn read_string<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, PacketError> {
    let mut raw = [0u8; STRING_LENGTH];
    reader.read_exact(&mut raw).await?;
    Ok(String::from_utf8_lossy(&raw).trim().to_string())
}

async fn read_pose<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Pose, PacketError> {
    Ok(Pose {
        x: reader.read_u16().await?,
        y: reader.read_u16().await?,
        z: reader.read_u16().await?,
        yaw: reader.read_u8().await?,
        pitch: reader.read_u8().await?,
    })
}

pub async fn read_identification<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Identification, PacketError> {
    expect_id(reader, IDENTIFICATION).await?;
    let protocol_version = reader.read_u8().await?;
    let username = read_string(reader).await?;
    let verification_key = read_string(reader).await?;
    reader.read_u8().await?;
    Ok(Identification {
        protocol_version,
        username,
        verification_key,
    })
}

pub async fn read_set_block<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ClientPacket, PacketError> {
    expect_id(reader, SET_BLOCK_CLIENT).await?;
    Ok(ClientPacket::SetBlock {
        x: reader.read_u16().await?,
        y: reader.read_u16().await?,
        z: reader.read_u16().await?,
        mode: BlockMode::from(reader.read_u8().await?),
        block_type: reader.read_u8().await?,
    })
}

pub async fn read_move<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ClientPacket, PacketError> {
    expect_id(reader, MOVE).await?;
    // player id, always the self id
    reader.read_u8().await?;
    Ok(ClientPacket::Move {
        pose: read_pose(reader).await?,
    })
}

pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ClientPacket, PacketError> {
    expect_id(reader, MESSAGE).await?;
    reader.read_u8().await?;
    Ok(ClientPacket::Message {
        text: read_string(reader).await?,
    })
}

/// Reads the next client packet, choosing the decoder from the id byte.
pub async fn read_packet<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<ClientPacket, PacketError> {
    let id = reader.fill_buf().await?.first().copied();
    match id {
        None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
        Some(IDENTIFICATION) => Ok(ClientPacket::Identification(
            read_identification(reader).await?,
        )),
        Some(SET_BLOCK_CLIENT) => read_set_block(reader).await,
        Some(MOVE) => read_move(reader).await,
        Some(MESSAGE) => read_message(reader).await,
        Some(other) => Err(PacketError::UnknownPacketId(other)),
    }
}

impl ClientPacket {
    pub fn id(&self) -> u8 {
        match self {
            ClientPacket::Identification(_) => IDENTIFICATION,
            ClientPacket::SetBlock { .. } => SET_BLOCK_CLIENT,
            ClientPacket::Move { .. } => MOVE,
            ClientPacket::Message { .. } => MESSAGE,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.id());
        match self {
            ClientPacket::Identification(ident) => {
                out.push(ident.protocol_version);
                put_string(out, &ident.username);
                put_string(out, &ident.verification_key);
                out.push(0x00);
            }
            ClientPacket::SetBlock {
                x,
                y,
                z,
                mode,
                block_type,
            } => {
                put_u16(out, *x);
                put_u16(out, *y);
                put_u16(out, *z);
                out.push(u8::from(*mode));
                out.push(*block_type);
            }
            ClientPacket::Move { pose } => {
                out.push(crate::SELF_ID);
                put_pose(out, pose);
            }
            ClientPacket::Message { text } => {
                out.push(crate::SELF_ID);
                put_string(out, text);
            }
        }
    }
}

impl ServerPacket {
    pub fn id(&self) -> u8 {
        match self {
            ServerPacket::Identification { .. } => IDENTIFICATION,
            ServerPacket::LevelInitialize => LEVEL_INITIALIZE,
            ServerPacket::LevelDataChunk { .. } => LEVEL_DATA_CHUNK,
            ServerPacket::LevelFinalize { .. } => LEVEL_FINALIZE,
            ServerPacket::SetBlock { .. } => SET_BLOCK_SERVER,
            ServerPacket::SpawnPlayer { .. } => SPAWN_PLAYER,
            ServerPacket::Move { .. } => MOVE,
            ServerPacket::DespawnPlayer { .. } => DESPAWN_PLAYER,
            ServerPacket::Message { .. } => MESSAGE,
            ServerPacket::Disconnect { .. } => DISCONNECT,
        }
    }

    /// Size of the packet on the wire, id included.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            ServerPacket::Identification { .. } => 1 + 2 * STRING_LENGTH + 1,
            ServerPacket::LevelInitialize => 0,
            ServerPacket::LevelDataChunk { .. } => 2 + CHUNK_LENGTH + 1,
            ServerPacket::LevelFinalize { .. } => 6,
            ServerPacket::SetBlock { .. } => 7,
            ServerPacket::SpawnPlayer { .. } => 1 + STRING_LENGTH + 8,
            ServerPacket::Move { .. } => 9,
            ServerPacket::DespawnPlayer { .. } => 1,
            ServerPacket::Message { .. } => 1 + STRING_LENGTH,
            ServerPacket::Disconnect { .. } => STRING_LENGTH,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.id());
        match self {
            ServerPacket::Identification {
                server_name,
                motd,
                operator,
            } => {
                out.push(crate::PROTOCOL_VERSION);
                put_string(out, server_name);
                put_string(out, motd);
                out.push(if *operator { crate::OPERATOR_FLAG } else { 0 });
            }
            ServerPacket::LevelInitialize => {}
            ServerPacket::LevelDataChunk {
                data,
                percent_complete,
            } => {
                let used = data.len().min(CHUNK_LENGTH);
                put_u16(out, used as u16);
                out.extend_from_slice(&data[..used]);
                out.resize(out.len() + CHUNK_LENGTH - used, 0x00);
                out.push(*percent_complete);
            }
            ServerPacket::LevelFinalize { x, y, z } => {
                put_u16(out, *x);
                put_u16(out, *y);
                put_u16(out, *z);
            }
            ServerPacket::SetBlock {
                x,
                y,
                z,
                block_type,
            } => {
                put_u16(out, *x);
                put_u16(out, *y);
                put_u16(out, *z);
                out.push(*block_type);
            }
            ServerPacket::SpawnPlayer {
                player_id,
                name,
                pose,
            } => {
                out.push(*player_id);
                put_string(out, name);
                put_pose(out, pose);
            }
            ServerPacket::Move { player_id, pose } => {
                out.push(*player_id);
                put_pose(out, pose);
            }
            ServerPacket::DespawnPlayer { player_id } => out.push(*player_id),
            ServerPacket::Message { text } => {
                out.push(MESSAGE_PAD);
                put_string(out, text);
            }
            ServerPacket::Disconnect { reason } => put_string(out, reason),
        }
    }

    /// Reads one server packet; used by clients and tests.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ServerPacket, PacketError> {
        let id = reader.read_u8().await?;
        let packet = match id {
            IDENTIFICATION => {
                // version byte; there is only one
                reader.read_u8().await?;
                ServerPacket::Identification {
                    server_name: read_string(reader).await?,
                    motd: read_string(reader).await?,
                    operator: reader.read_u8().await? == crate::OPERATOR_FLAG,
                }
            }
            LEVEL_INITIALIZE => ServerPacket::LevelInitialize,
            LEVEL_DATA_CHUNK => {
                let length = (reader.read_u16().await? as usize).min(CHUNK_LENGTH);
                let mut chunk = vec![0u8; CHUNK_LENGTH];
                reader.read_exact(&mut chunk).await?;
                chunk.truncate(length);
                ServerPacket::LevelDataChunk {
                    data: chunk,
                    percent_complete: reader.read_u8().await?,
                }
            }
            LEVEL_FINALIZE => ServerPacket::LevelFinalize {
                x: reader.read_u16().await?,
                y: reader.read_u16().await?,
                z: reader.read_u16().await?,
            },
            SET_BLOCK_SERVER => ServerPacket::SetBlock {
                x: reader.read_u16().await?,
                y: reader.read_u16().await?,
                z: reader.read_u16().await?,
                block_type: reader.read_u8().await?,
            },
            SPAWN_PLAYER => ServerPacket::SpawnPlayer {
                player_id: reader.read_u8().await?,
                name: read_string(reader).await?,
                pose: read_pose(reader).await?,
            },
            MOVE => ServerPacket::Move {
                player_id: reader.read_u8().await?,
                pose: read_pose(reader).await?,
            },
            DESPAWN_PLAYER => ServerPacket::DespawnPlayer {
                player_id: reader.read_u8().await?,
            },
            MESSAGE => {
                reader.read_u8().await?;
                ServerPacket::Message {
                    text: read_string(reader).await?,
                }
            }
            DISCONNECT => ServerPacket::Disconnect {
                reason: read_string(reader).await?,
            },
            other => return Err(PacketError::UnknownPacketId(other)),
        };
        Ok(packet)
    }
}
