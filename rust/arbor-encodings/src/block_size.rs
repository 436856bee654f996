use arbor_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

/// Capacity of a postings block, recorded per field at index-creation time.
///
/// Only the enumerated sizes are accepted. Any other value is rejected with an
/// `UnsupportedConfiguration` error rather than rounded to a neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BlockSize(u16);

impl BlockSize {
    /// All supported block sizes in increasing order.
    pub const SUPPORTED: [u32; 9] = [1, 2, 16, 32, 64, 128, 256, 512, 1024];

    pub const DEFAULT: BlockSize = BlockSize(128);

    pub fn new(size: u32) -> Result<BlockSize> {
        if Self::SUPPORTED.contains(&size) {
            Ok(BlockSize(size as u16))
        } else {
            Err(Error::unsupported_configuration(
                "block_size",
                format!("{size} is not one of {:?}", Self::SUPPORTED),
            ))
        }
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// Iterates over every supported block size.
    pub fn all() -> impl Iterator<Item = BlockSize> {
        Self::SUPPORTED.iter().map(|&size| BlockSize(size as u16))
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for BlockSize {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        BlockSize::new(value)
    }
}

impl From<BlockSize> for u32 {
    fn from(size: BlockSize) -> u32 {
        size.0 as u32
    }
}

impl std::fmt::Display for BlockSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
