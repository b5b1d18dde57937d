//! Chat commands
//!
//! Text after the command prefix is split on whitespace; the first word
//! names the command. Replies, errors included, go back to the caller as
//! chat messages.

use crate::world::World;
use shared::BlockMode;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    WrongArgumentCount(&'static str),

    #[error("Not a number: {0}")]
    InvalidArgument(String),

    #[error("No player named {0}")]
    PlayerNotFound(String),
}

const TELEPORT_USAGE: &str = "tp <username>";
const FILL_USAGE: &str = "fill <block> <x1> <y1> <z1> <x2> <y2> <z2>";

/// Runs one command for `player_id` and sends them the reply.
pub async fn handle_command(world: &World, player_id: u8, text: &str) {
    let reply = match run(world, player_id, text).await {
        Ok(reply) => reply,
        Err(e) => e.to_string(),
    };
    world.send_message(player_id, &reply).await;
}

async fn run(world: &World, player_id: u8, text: &str) -> Result<String, CommandError> {
    let mut words = text.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    match name.to_ascii_lowercase().as_str() {
        "ping" => Ok("Pong!".to_string()),
        "tp" | "teleport" => teleport(world, player_id, &args).await,
        "fill" => fill(world, &args).await,
        _ => Err(CommandError::UnknownCommand(name.to_string())),
    }
}

async fn teleport(world: &World, player_id: u8, args: &[&str]) -> Result<String, CommandError> {
    let [target] = args else {
        return Err(CommandError::WrongArgumentCount(TELEPORT_USAGE));
    };
    match world.teleport(player_id, target).await {
        Some(name) => Ok(format!("Teleported to {}", name)),
        None => Err(CommandError::PlayerNotFound(target.to_string())),
    }
}

async fn fill(world: &World, args: &[&str]) -> Result<String, CommandError> {
    let [block, x1, y1, z1, x2, y2, z2] = args else {
        return Err(CommandError::WrongArgumentCount(FILL_USAGE));
    };
    let block: u8 = parse(block)?;
    let (x1, y1, z1): (i32, i32, i32) = (parse(x1)?, parse(y1)?, parse(z1)?);
    let (x2, y2, z2): (i32, i32, i32) = (parse(x2)?, parse(y2)?, parse(z2)?);

    let size = world.size();
    let (Some(xs), Some(ys), Some(zs)) = (
        clamp(x1, x2, size.x),
        clamp(y1, y2, size.y),
        clamp(z1, z2, size.z),
    ) else {
        return Ok("Done.".to_string());
    };

    for y in ys {
        for z in zs.clone() {
            for x in xs.clone() {
                world.set_block(x, y, z, BlockMode::Place, block).await;
            }
        }
    }
    Ok("Done.".to_string())
}

fn parse<T: FromStr>(word: &str) -> Result<T, CommandError> {
    word.parse()
        .map_err(|_| CommandError::InvalidArgument(word.to_string()))
}

/// Orders two corners and clips them to `0..len`; None when nothing is left.
fn clamp(a: i32, b: i32, len: u16) -> Option<RangeInclusive<u16>> {
    let (low, high) = (a.min(b).max(0), a.max(b).min(i32::from(len) - 1));
    if low > high {
        return None;
    }
    Some(u16::try_from(low).ok()?..=u16::try_from(high).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{join, next_packet, small_world};
    use shared::{Pose, ServerPacket, SELF_ID};

    #[test]
    fn test_clamp_orders_and_clips() {
        assert_eq!(clamp(5, 2, 10), Some(2..=5));
        assert_eq!(clamp(-4, 3, 10), Some(0..=3));
        assert_eq!(clamp(8, 40, 10), Some(8..=9));
        assert_eq!(clamp(12, 40, 10), None);
        assert_eq!(clamp(-9, -1, 10), None);
    }

    #[tokio::test]
    async fn test_ping() {
        let world = small_world(1);
        let (id, _writer, mut client) = join(&world, "alice").await;

        handle_command(&world, id, "ping").await;
        assert_eq!(
            next_packet(&mut client).await,
            ServerPacket::Message {
                text: "Pong!".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let world = small_world(1);
        assert_eq!(
            run(&world, 0, "dance now").await,
            Err(CommandError::UnknownCommand("dance".to_string()))
        );
        assert!(matches!(
            run(&world, 0, "").await,
            Err(CommandError::UnknownCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_teleport_to_player() {
        let world = small_world(2);
        let (a, _a_writer, mut a_client) = join(&world, "alice").await;
        let (b, _b_writer, _b_client) = join(&world, "bob").await;
        let pose = Pose::new(64, 96, 128, 0, 0);
        world.move_player(b, pose).await;
        next_packet(&mut a_client).await;

        handle_command(&world, a, "teleport BOB").await;
        assert_eq!(
            next_packet(&mut a_client).await,
            ServerPacket::Move {
                player_id: SELF_ID,
                pose
            }
        );
        assert_eq!(
            next_packet(&mut a_client).await,
            ServerPacket::Message {
                text: "Teleported to bob".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_teleport_errors() {
        let world = small_world(1);
        let (a, _writer, _client) = join(&world, "alice").await;

        assert_eq!(
            run(&world, a, "tp").await,
            Err(CommandError::WrongArgumentCount(TELEPORT_USAGE))
        );
        assert_eq!(
            run(&world, a, "tp ghost").await,
            Err(CommandError::PlayerNotFound("ghost".to_string()))
        );
    }

    #[tokio::test]
    async fn test_fill_places_cuboid() {
        let world = small_world(1);
        assert_eq!(run(&world, 0, "fill 9 3 2 1 1 0 2").await, Ok("Done.".to_string()));

        let size = world.size();
        for y in 0..size.y {
            for z in 0..size.z {
                for x in 0..size.x {
                    let inside = (1..=3).contains(&x) && y <= 2 && (1..=2).contains(&z);
                    let block = world.block(x, y, z).await.unwrap();
                    assert_eq!(block == 9, inside, "at {},{},{}", x, y, z);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_fill_clamps_to_world() {
        let world = small_world(1);
        let size = world.size();
        run(&world, 0, "fill 7 -5 -5 -5 100 0 100").await.unwrap();

        assert_eq!(world.block(0, 0, 0).await, Some(7));
        assert_eq!(world.block(size.x - 1, 0, size.z - 1).await, Some(7));
        assert_ne!(world.block(0, 1, 0).await, Some(7));
    }

    #[tokio::test]
    async fn test_fill_argument_errors() {
        let world = small_world(1);
        assert_eq!(
            run(&world, 0, "fill 1 2 3").await,
            Err(CommandError::WrongArgumentCount(FILL_USAGE))
        );
        assert_eq!(
            run(&world, 0, "fill 1 2 3 x 4 5 6").await,
            Err(CommandError::InvalidArgument("x".to_string()))
        );
        assert_eq!(
            run(&world, 0, "fill 300 0 0 0 1 1 1").await,
            Err(CommandError::InvalidArgument("300".to_string()))
        );
    }

    #[tokio::test]
    async fn test_error_is_sent_to_caller() {
        let world = small_world(1);
        let (id, _writer, mut client) = join(&world, "alice").await;

        handle_command(&world, id, "fill").await;
        assert_eq!(
            next_packet(&mut client).await,
            ServerPacket::Message {
                text: format!("Usage: {}", FILL_USAGE)
            }
        );
    }
}
