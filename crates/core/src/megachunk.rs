//! Mega-chunks: square groups of chunks used to partition a world.

use crate::config::MegaChunkConfig;
use rand::Rng;

/// Blocks per chunk edge.
pub const CHUNK_SIZE: i64 = 16;

/// Size and offsets shared by all mega-chunks of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MegaChunkSettings {
    /// Edge length in chunks, always positive.
    pub size: i32,
    pub offset_x: i32,
    pub offset_z: i32,
}

impl Default for MegaChunkSettings {
    fn default() -> Self {
        Self {
            size: 8,
            offset_x: 0,
            offset_z: 0,
        }
    }
}

impl MegaChunkSettings {
    /// Builds the settings from config, drawing random offsets where requested.
    pub fn from_config(config: &MegaChunkConfig) -> Self {
        Self::from_config_with(config, &mut rand::thread_rng())
    }

    pub fn from_config_with<R: Rng + ?Sized>(config: &MegaChunkConfig, rng: &mut R) -> Self {
        let size = config.size.max(1);
        // Offsets only matter modulo the size.
        let offset_x = if config.random_offset_x {
            rng.gen_range(0..size)
        } else {
            config.offset_x
        };
        let offset_z = if config.random_offset_z {
            rng.gen_range(0..size)
        } else {
            config.offset_z
        };

        Self {
            size,
            offset_x,
            offset_z,
        }
    }

    /// Saturates at the `i32` range when the offset pushes a chunk past it.
    fn index(&self, chunk: i32, offset: i32) -> i32 {
        let index = (i64::from(chunk) + i64::from(offset)).div_euclid(i64::from(self.size));
        i32::try_from(index).unwrap_or(if index < 0 { i32::MIN } else { i32::MAX })
    }
}

/// A mega-chunk, optionally bound to a world.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MegaChunk {
    pub x: i32,
    pub z: i32,
    pub world: Option<String>,
    settings: MegaChunkSettings,
}

impl MegaChunk {
    pub fn new(x: i32, z: i32, world: Option<String>, settings: MegaChunkSettings) -> Self {
        Self { x, z, world, settings }
    }

    /// The mega-chunk holding chunk (`chunk_x`, `chunk_z`).
    pub fn from_chunk(chunk_x: i32, chunk_z: i32, world: Option<String>, settings: MegaChunkSettings) -> Self {
        Self::new(
            settings.index(chunk_x, settings.offset_x),
            settings.index(chunk_z, settings.offset_z),
            world,
            settings,
        )
    }

    /// The mega-chunk holding block (`block_x`, `block_z`).
    pub fn from_block(block_x: i32, block_z: i32, world: Option<String>, settings: MegaChunkSettings) -> Self {
        Self::from_chunk(block_x.div_euclid(16), block_z.div_euclid(16), world, settings)
    }

    pub fn settings(&self) -> MegaChunkSettings {
        self.settings
    }

    fn min_block(&self, index: i32, offset: i32) -> i64 {
        (i64::from(index) * i64::from(self.settings.size) - i64::from(offset)) * CHUNK_SIZE
    }

    pub fn min_x(&self) -> i64 {
        self.min_block(self.x, self.settings.offset_x)
    }

    pub fn max_x(&self) -> i64 {
        self.min_x() + self.block_width() - 1
    }

    pub fn min_z(&self) -> i64 {
        self.min_block(self.z, self.settings.offset_z)
    }

    pub fn max_z(&self) -> i64 {
        self.min_z() + self.block_width() - 1
    }

    /// Edge length in blocks.
    pub fn block_width(&self) -> i64 {
        i64::from(self.settings.size) * CHUNK_SIZE
    }

    /// Whether block (`block_x`, `block_z`) lies in this mega-chunk, ignoring worlds.
    pub fn contains_block(&self, block_x: i32, block_z: i32) -> bool {
        let other = Self::from_block(block_x, block_z, None, self.settings);
        other.x == self.x && other.z == self.z
    }

    /// Like [`contains_block`](Self::contains_block), but a location in another world never matches.
    pub fn contains(&self, world: Option<&str>, block_x: i32, block_z: i32) -> bool {
        let same_world = match (self.world.as_deref(), world) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        };
        same_world && self.contains_block(block_x, block_z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_from_chunk_floors_negative_coordinates() {
        let settings = MegaChunkSettings::default();

        let origin = MegaChunk::from_chunk(0, 7, None, settings);
        assert_eq!((origin.x, origin.z), (0, 0));

        let negative = MegaChunk::from_chunk(-1, -8, None, settings);
        assert_eq!((negative.x, negative.z), (-1, -1));

        let further = MegaChunk::from_chunk(-9, 8, None, settings);
        assert_eq!((further.x, further.z), (-2, 1));
    }

    #[test]
    fn test_from_block() {
        let settings = MegaChunkSettings::default();
        let chunk = MegaChunk::from_block(127, -1, Some("world".to_string()), settings);
        assert_eq!((chunk.x, chunk.z), (0, -1));

        let next = MegaChunk::from_block(128, -128, None, settings);
        assert_eq!((next.x, next.z), (1, -1));
    }

    #[test]
    fn test_bounds_cover_whole_blocks() {
        let settings = MegaChunkSettings {
            size: 4,
            offset_x: 1,
            offset_z: 0,
        };
        let chunk = MegaChunk::new(0, -1, None, settings);

        assert_eq!(chunk.min_x(), -16);
        assert_eq!(chunk.max_x(), 47);
        assert_eq!(chunk.min_z(), -64);
        assert_eq!(chunk.max_z(), -1);

        for (x, z) in [(chunk.min_x(), chunk.min_z()), (chunk.max_x(), chunk.max_z())] {
            assert!(chunk.contains_block(x as i32, z as i32));
        }
        assert!(!chunk.contains_block(chunk.max_x() as i32 + 1, chunk.max_z() as i32));
        assert!(!chunk.contains_block(chunk.min_x() as i32 - 1, chunk.min_z() as i32));
    }

    #[test]
    fn test_contains_checks_world() {
        let chunk = MegaChunk::from_block(10, 10, Some("world".to_string()), MegaChunkSettings::default());

        assert!(chunk.contains(Some("world"), 20, 20));
        assert!(chunk.contains(None, 20, 20));
        assert!(!chunk.contains(Some("world_nether"), 20, 20));
        assert!(!chunk.contains(Some("world"), 200, 20));
    }

    #[test]
    fn test_random_offsets_stay_within_size() {
        let config = MegaChunkConfig {
            size: 8,
            offset_x: 3,
            offset_z: 5,
            random_offset_x: true,
            random_offset_z: false,
        };
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let settings = MegaChunkSettings::from_config_with(&config, &mut rng);
            assert!((0..8).contains(&settings.offset_x));
            assert_eq!(settings.offset_z, 5);
        }
    }

    #[test]
    fn test_extreme_coordinates_do_not_overflow() {
        let settings = MegaChunkSettings {
            size: 8,
            offset_x: i32::MAX,
            offset_z: i32::MIN,
        };
        let chunk = MegaChunk::from_chunk(i32::MAX, i32::MIN, None, settings);
        assert!(chunk.min_x() <= chunk.max_x());
        assert!(chunk.min_z() <= chunk.max_z());
    }

    #[test]
    fn test_single_chunk_index_saturates() {
        let settings = MegaChunkSettings {
            size: 1,
            offset_x: i32::MAX,
            offset_z: i32::MIN,
        };

        let far = MegaChunk::from_chunk(i32::MAX, i32::MIN, None, settings);
        assert_eq!((far.x, far.z), (i32::MAX, i32::MIN));

        let near = MegaChunk::from_chunk(-1, 1, None, settings);
        assert_eq!((near.x, near.z), (i32::MAX - 1, i32::MIN + 1));
        assert!(far.min_x() <= far.max_x());
    }
}
