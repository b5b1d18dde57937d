//! Loading and saving the world file
//!
//! Worlds are stored as a gzip-compressed `ClassicWorld` compound tree. Saves
//! never overwrite the live file in place:
//!
//! 1. the new tree is written and synced to the scratch file (`<world>.new`)
//! 2. the live file is renamed to the temp file (`<world>.old`)
//! 3. the scratch file is renamed to the live file
//! 4. the temp file is removed
//!
//! [`recover`] runs before every load and repairs whatever an interruption
//! at any of these steps left behind, so the file on disk always decodes to
//! either the previous or the new world.

use crate::config::{default_spawn, Config};
use crate::error::{Result, ServerError};
use crate::world::{Dimensions, World, WorldMetadata};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{info, warn};
use rand::Rng;
use shared::nbt::{self, Compound, Emit, Tag};
use shared::{Pose, DIRT, GRASS, STONE};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const ROOT_NAME: &str = "ClassicWorld";
const FORMAT_VERSION: u8 = 1;
const SERVICE_NAME: &str = "blockworld";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The live world file and the two files a save passes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldPaths {
    pub world: PathBuf,
    pub scratch: PathBuf,
    pub temp: PathBuf,
}

impl WorldPaths {
    pub fn new(world: PathBuf) -> Self {
        Self {
            scratch: with_suffix(&world, ".new"),
            temp: with_suffix(&world, ".old"),
            world,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn at(path: &Path) -> impl FnOnce(io::Error) -> ServerError + '_ {
    move |source| ServerError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

/// Loads the configured world, or creates a flat one if there is none.
pub fn load_or_create(config: &Config) -> Result<World> {
    let paths = &config.paths;
    recover(paths).map_err(at(&paths.world))?;

    if paths.world.exists() {
        let world = read_world(&paths.world, config.max_players)?;
        let size = world.size();
        info!(
            "Loaded world {:?} ({}x{}x{}) from {}",
            world.metadata().name,
            size.x,
            size.y,
            size.z,
            paths.world.display()
        );
        return Ok(world);
    }

    let metadata = WorldMetadata {
        name: config.server_name.clone(),
        uuid: random_uuid(),
        size: config.size,
        spawn: config.spawn,
    };
    let world = World::new(metadata, flat_blocks(config.size), config.max_players)?;
    world.mark_dirty();
    info!(
        "Created flat world {}x{}x{}; it will be saved to {}",
        config.size.x,
        config.size.y,
        config.size.z,
        paths.world.display()
    );
    Ok(world)
}

/// Random version 4 UUID bytes.
pub fn random_uuid() -> [u8; 16] {
    let mut uuid = [0u8; 16];
    rand::thread_rng().fill(&mut uuid[..]);
    uuid[6] = (uuid[6] & 0x0f) | 0x40;
    uuid[8] = (uuid[8] & 0x3f) | 0x80;
    uuid
}

/// Stone up to three blocks under the surface, then dirt, then one layer of
/// grass at half height, air above.
pub fn flat_blocks(size: Dimensions) -> Vec<u8> {
    let layer = usize::from(size.x) * usize::from(size.z);
    let surface = size.y / 2;
    let mut blocks = Vec::with_capacity(size.volume());

    for y in 0..size.y {
        let block = if y < surface.saturating_sub(3) {
            STONE
        } else if y < surface {
            DIRT
        } else if y == surface {
            GRASS
        } else {
            shared::AIR
        };
        blocks.resize(blocks.len() + layer, block);
    }
    blocks
}

pub fn read_world(path: &Path, max_players: usize) -> Result<World> {
    let (metadata, blocks) = read_world_parts(path)?;
    World::new(metadata, blocks, max_players)
}

/// Reads metadata and blocks from a world file, gzipped or not.
pub fn read_world_parts(path: &Path) -> Result<(WorldMetadata, Vec<u8>)> {
    let file = File::open(path).map_err(at(path))?;
    let mut reader = BufReader::new(file);
    let gzipped = reader.fill_buf().map_err(at(path))?.starts_with(&GZIP_MAGIC);

    let (root, name) = if gzipped {
        nbt::decode(&mut GzDecoder::new(reader))?
    } else {
        nbt::decode(&mut reader)?
    };
    decode_world(root, &name)
}

/// Extracts the world from a decoded `ClassicWorld` tree.
///
/// Size and blocks are required. A missing spawn falls back to the middle of
/// the world, a missing name or UUID to fresh values.
pub fn decode_world(mut root: Compound, root_name: &str) -> Result<(WorldMetadata, Vec<u8>)> {
    if root_name != ROOT_NAME {
        warn!("World root is named {:?}, expected {:?}", root_name, ROOT_NAME);
    }

    let size = Dimensions::new(
        required_short(&root, "X")?,
        required_short(&root, "Y")?,
        required_short(&root, "Z")?,
    );

    let blocks = root
        .remove("BlockArray")
        .and_then(Tag::into_byte_array)
        .ok_or_else(|| ServerError::WorldFormat("missing BlockArray".to_string()))?;
    if blocks.len() != size.volume() {
        return Err(ServerError::WorldFormat(format!(
            "BlockArray holds {} bytes, {}x{}x{} needs {}",
            blocks.len(),
            size.x,
            size.y,
            size.z,
            size.volume()
        )));
    }

    let spawn = match root.get("Spawn").and_then(Tag::as_compound) {
        Some(spawn) => Pose::new(
            spawn.get("X").and_then(Tag::as_short).unwrap_or_default(),
            spawn.get("Y").and_then(Tag::as_short).unwrap_or_default(),
            spawn.get("Z").and_then(Tag::as_short).unwrap_or_default(),
            spawn.get("H").and_then(Tag::as_byte).unwrap_or_default(),
            spawn.get("P").and_then(Tag::as_byte).unwrap_or_default(),
        ),
        None => default_spawn(size),
    };

    let name = root
        .get("Name")
        .and_then(Tag::as_str)
        .unwrap_or("world")
        .to_string();

    let uuid = match root.get("UUID").and_then(Tag::as_byte_array) {
        Some(bytes) => <[u8; 16]>::try_from(bytes).map_err(|_| {
            ServerError::WorldFormat(format!("UUID is {} bytes, expected 16", bytes.len()))
        })?,
        None => random_uuid(),
    };

    Ok((
        WorldMetadata {
            name,
            uuid,
            size,
            spawn,
        },
        blocks,
    ))
}

fn required_short(root: &Compound, name: &str) -> Result<u16> {
    root.get(name)
        .and_then(Tag::as_short)
        .ok_or_else(|| ServerError::WorldFormat(format!("missing or malformed {}", name)))
}

/// Writes the `ClassicWorld` tree, uncompressed.
pub fn encode_world<W: Write>(
    writer: &mut W,
    metadata: &WorldMetadata,
    blocks: &[u8],
) -> nbt::Result<()> {
    let size = metadata.size;
    let spawn = metadata.spawn;
    nbt::encode(
        writer,
        &[
            Emit::Compound(ROOT_NAME),
            Emit::Byte("FormatVersion", FORMAT_VERSION),
            Emit::String("Name", &metadata.name),
            Emit::ByteArray("UUID", &metadata.uuid),
            Emit::Short("X", size.x),
            Emit::Short("Y", size.y),
            Emit::Short("Z", size.z),
            Emit::Compound("Spawn"),
            Emit::Short("X", spawn.x),
            Emit::Short("Y", spawn.y),
            Emit::Short("Z", spawn.z),
            Emit::Byte("H", spawn.yaw),
            Emit::Byte("P", spawn.pitch),
            Emit::End,
            Emit::ByteArray("BlockArray", blocks),
            Emit::Compound("CreatedBy"),
            Emit::String("Service", SERVICE_NAME),
            Emit::String("Username", ""),
            Emit::End,
            Emit::Compound("Metadata"),
            Emit::End,
            Emit::End,
        ],
    )
}

/// Runs one full save cycle; blocking.
pub fn write_world(paths: &WorldPaths, metadata: &WorldMetadata, blocks: &[u8]) -> Result<()> {
    write_scratch(&paths.scratch, metadata, blocks)?;

    match fs::rename(&paths.world, &paths.temp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(at(&paths.world)(e)),
    }
    fs::rename(&paths.scratch, &paths.world).map_err(at(&paths.world))?;

    match fs::remove_file(&paths.temp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", paths.temp.display(), e),
    }
    Ok(())
}

fn write_scratch(path: &Path, metadata: &WorldMetadata, blocks: &[u8]) -> Result<()> {
    let file = File::create(path).map_err(at(path))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    encode_world(&mut encoder, metadata, blocks)?;

    let file = encoder
        .finish()
        .map_err(at(path))?
        .into_inner()
        .map_err(|e| at(path)(e.into_error()))?;
    file.sync_all().map_err(at(path))
}

/// Cleans up after a save that was interrupted part way.
pub fn recover(paths: &WorldPaths) -> io::Result<()> {
    if !paths.world.exists() && paths.temp.exists() {
        warn!(
            "Restoring {} from {} after an interrupted save",
            paths.world.display(),
            paths.temp.display()
        );
        fs::rename(&paths.temp, &paths.world)?;
    }

    if paths.scratch.exists() {
        warn!("Removing unfinished save {}", paths.scratch.display());
        fs::remove_file(&paths.scratch)?;
    }

    if paths.world.exists() && paths.temp.exists() {
        fs::remove_file(&paths.temp)?;
    }
    Ok(())
}

/// True if `path` starts with the gzip magic bytes.
pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
