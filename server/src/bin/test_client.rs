//! Scripted client for poking at a running server: joins, downloads the
//! level, then wanders around placing blocks and chatting.

use clap::Parser;
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use rand::Rng;
use shared::packets::STRING_LENGTH;
use shared::{BlockMode, ClientPacket, Identification, Pose, ServerPacket, PROTOCOL_VERSION};
use std::io::Read;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(long, default_value = "127.0.0.1:25565")]
    address: String,
    /// Username to join with
    #[clap(short, long, default_value = "tester")]
    name: String,
    /// Number of random steps to take
    #[clap(short, long, default_value = "20")]
    steps: u32,
    /// Delay between steps in milliseconds
    #[clap(short, long, default_value = "250")]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.address).await?;
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    info!("Connected to {}", args.address);

    let mut hello = Vec::new();
    ClientPacket::Identification(Identification {
        protocol_version: PROTOCOL_VERSION,
        username: args.name.chars().take(STRING_LENGTH).collect(),
        verification_key: String::new(),
    })
    .encode(&mut hello);
    write_half.write_all(&hello).await?;

    let (size, spawn) = receive_level(&mut reader).await?;
    info!("Level is {}x{}x{}", size.0, size.1, size.2);

    // print whatever the server sends from here on
    tokio::spawn(async move {
        loop {
            match ServerPacket::read(&mut reader).await {
                Ok(ServerPacket::Message { text }) => info!("Chat: {}", text),
                Ok(ServerPacket::Disconnect { reason }) => {
                    warn!("Disconnected: {}", reason);
                    break;
                }
                Ok(packet) => debug!("Received {:?}", packet),
                Err(e) => {
                    warn!("Connection closed: {}", e);
                    break;
                }
            }
        }
    });

    let mut rng = rand::thread_rng();
    let mut pose = spawn;
    for step in 0..args.steps {
        pose.x = pose.x.saturating_add_signed(rng.gen_range(-32..=32));
        pose.z = pose.z.saturating_add_signed(rng.gen_range(-32..=32));
        pose.yaw = rng.gen();

        let block = (
            rng.gen_range(0..size.0),
            rng.gen_range(0..size.1),
            rng.gen_range(0..size.2),
        );
        let packets = [
            ClientPacket::Move { pose },
            ClientPacket::SetBlock {
                x: block.0,
                y: block.1,
                z: block.2,
                mode: BlockMode::Place,
                block_type: rng.gen_range(1..50),
            },
            ClientPacket::Message {
                text: format!("step {} at {},{},{}", step, block.0, block.1, block.2),
            },
        ];

        let mut bytes = Vec::new();
        for packet in &packets {
            packet.encode(&mut bytes);
        }
        write_half.write_all(&bytes).await?;
        sleep(Duration::from_millis(args.delay_ms)).await;
    }

    write_half.shutdown().await?;
    info!("Done after {} steps", args.steps);
    Ok(())
}

/// Reads the handshake and level; returns the world size and spawn pose.
async fn receive_level(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> Result<((u16, u16, u16), Pose), Box<dyn std::error::Error>> {
    let mut compressed = Vec::new();
    let mut size = None;

    loop {
        match ServerPacket::read(reader).await? {
            ServerPacket::Identification {
                server_name, motd, ..
            } => info!("Server: {} ({})", server_name, motd),
            ServerPacket::Disconnect { reason } => return Err(reason.into()),
            ServerPacket::LevelDataChunk {
                data,
                percent_complete,
            } => {
                compressed.extend_from_slice(&data);
                debug!("Level {}%", percent_complete);
            }
            ServerPacket::LevelFinalize { x, y, z } => size = Some((x, y, z)),
            ServerPacket::SpawnPlayer { player_id, pose, .. } if player_id == shared::SELF_ID => {
                let size = size.ok_or("spawned before the level finished")?;
                if size.0 == 0 || size.1 == 0 || size.2 == 0 {
                    return Err("server sent an empty level".into());
                }

                let mut level = Vec::new();
                GzDecoder::new(&compressed[..]).read_to_end(&mut level)?;
                info!("Decompressed {} level bytes", level.len());
                return Ok((size, pose));
            }
            _ => {}
        }
    }
}
