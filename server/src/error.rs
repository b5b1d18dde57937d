//! Error types for the server crate.

use crate::writer::WriterError;
use shared::nbt::NbtError;
use shared::PacketError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] PacketError),

    #[error("unexpected packet {0:#04x} after identification")]
    UnexpectedPacket(u8),

    #[error("world tree error: {0}")]
    Tree(#[from] NbtError),

    #[error("malformed world: {0}")]
    WorldFormat(String),

    #[error("server is full ({0} players)")]
    CapacityExceeded(usize),

    #[error("world file {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("session writer failed: {0}")]
    Writer(#[from] WriterError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServerError {
    /// True when the error only means the peer went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ServerError::Protocol(e) => e.is_disconnect(),
            ServerError::Writer(WriterError::Closed) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
