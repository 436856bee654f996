//! Integer block codecs for node-address postings.
//!
//! Postings are decomposed into streams of `u32` values (document gaps, path
//! prefix lengths, node ordinals, position gaps). Every stream is cut into
//! fixed-capacity blocks and every block is encoded independently with one of
//! the [`BlockEncodingKind`] strategies. The kind is recorded in front of each
//! block, so blocks written with different strategies can be mixed freely
//! inside one segment.

pub mod block;
pub mod block_size;
pub mod bytes;
pub mod stream;

mod frame_of_reference;
mod variable_byte;

pub use block::{BlockCodec, BlockEncoding, BlockEncodingKind, CompressionStrategy};
pub use block_size::BlockSize;
pub use bytes::{ByteReader, write_u16, write_varint};
pub use stream::{BlockStreamReader, BlockStreamWriter, EncodingStats};
