//! The compression tag, the dispatch table that maps it to a block decoder,
//! and the byte-level predictor/interleave helpers shared by several codecs.

mod predictor;
mod none;
mod rle;
mod zip;
mod pxr24;
pub(crate) mod piz;
mod b44;
mod dwa;

pub use predictor::*;

use crate::error::{Error, ErrorCode, Result};
use crate::meta::{ChannelList, Window};

/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];

/// The compression tag stored in a part's `compression` attribute (a single byte on disk).
///
/// `DWAA`/`DWAB` carry an optional custom DC quantization level analogous to the
/// reference codec's `dwaCompressionLevel` attribute; `None` means the codec default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compression {
    None,
    Rle,
    Zip1,
    Zip16,
    Piz,
    Pxr24,
    B44,
    B44A,
    Dwaa(Option<f32>),
    Dwab(Option<f32>),
}

impl Compression {
    /// Decodes the single-byte on-disk tag. Unknown tags are rejected by the caller,
    /// not here, so that the error can carry the offending byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Compression::None,
            1 => Compression::Rle,
            2 => Compression::Zip1,
            3 => Compression::Zip16,
            4 => Compression::Piz,
            5 => Compression::Pxr24,
            6 => Compression::B44,
            7 => Compression::B44A,
            8 => Compression::Dwaa(None),
            9 => Compression::Dwab(None),
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "NONE",
            Compression::Rle => "RLE",
            Compression::Zip1 => "ZIPS",
            Compression::Zip16 => "ZIP",
            Compression::Piz => "PIZ",
            Compression::Pxr24 => "PXR24",
            Compression::B44 => "B44",
            Compression::B44A => "B44A",
            Compression::Dwaa(_) => "DWAA",
            Compression::Dwab(_) => "DWAB",
        }
    }

    /// Number of scanlines packed into a single chunk for this codec.
    pub fn lines_per_block(&self) -> usize {
        match self {
            Compression::None => 1,
            Compression::Rle => 1,
            Compression::Zip1 => 1,
            Compression::Zip16 => 16,
            Compression::Piz => 32,
            Compression::Pxr24 => 16,
            Compression::B44 => 32,
            Compression::B44A => 32,
            Compression::Dwaa(_) => 32,
            Compression::Dwab(_) => 256,
        }
    }

    /// Every codec this decoder supports, in tag order — used to compose
    /// the message for [`ErrorCode::UnsupportedCompression`].
    pub fn supported_names() -> &'static [&'static str] {
        &["NONE", "RLE", "ZIPS", "ZIP", "PIZ", "PXR24", "B44", "B44A", "DWAA", "DWAB"]
    }

    /// Runs the codec-specific decoder. `compressed` is the chunk payload exactly as stored
    /// on disk (the raw-passthrough shortcut is handled by the caller, not here).
    pub fn decompress(
        &self,
        channels: &ChannelList,
        compressed: Bytes<'_>,
        rectangle: Window,
        expected_byte_size: usize,
        pedantic: bool,
    ) -> Result<ByteVec> {
        let result = match self {
            Compression::None => none::decompress_bytes(compressed, expected_byte_size),
            Compression::Rle => rle::decompress_bytes(channels, compressed, rectangle, expected_byte_size, pedantic),
            Compression::Zip1 | Compression::Zip16 => zip::decompress_bytes(channels, compressed, rectangle, expected_byte_size, pedantic),
            Compression::Pxr24 => pxr24::decompress_bytes(channels, compressed, rectangle, expected_byte_size),
            Compression::Piz => piz::decompress(channels, compressed, rectangle, expected_byte_size, pedantic),
            Compression::B44 | Compression::B44A => b44::decompress_bytes(channels, compressed, rectangle, expected_byte_size, matches!(self, Compression::B44A)),
            Compression::Dwaa(_) | Compression::Dwab(_) => dwa::decompress_bytes(channels, compressed, rectangle, expected_byte_size),
        };

        result.map_err(|error| {
            if error.code == ErrorCode::MalformedHeader {
                Error::new(ErrorCode::DecompressionFailed, error.message).with("codec", self.name())
            } else {
                error
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lines_per_block_matches_spec_table() {
        assert_eq!(Compression::None.lines_per_block(), 1);
        assert_eq!(Compression::Rle.lines_per_block(), 1);
        assert_eq!(Compression::Zip1.lines_per_block(), 1);
        assert_eq!(Compression::Zip16.lines_per_block(), 16);
        assert_eq!(Compression::Piz.lines_per_block(), 32);
        assert_eq!(Compression::Pxr24.lines_per_block(), 16);
        assert_eq!(Compression::B44.lines_per_block(), 32);
        assert_eq!(Compression::B44A.lines_per_block(), 32);
        assert_eq!(Compression::Dwaa(None).lines_per_block(), 32);
        assert_eq!(Compression::Dwab(None).lines_per_block(), 256);
    }

    #[test]
    fn unknown_tag_is_none() {
        assert!(Compression::from_byte(200).is_none());
    }
}
