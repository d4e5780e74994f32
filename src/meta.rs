//! The header parser (C2) and the typed structure model it produces (C3),
//! plus the per-channel sampling helpers (C6) shared by the block decoders
//! and the channel-layout expansion pass.
// header layout ported from https://www.openexr.com/documentation/openexrfilelayout.pdf

use std::collections::HashMap;
use std::convert::TryFrom;

use crate::compression::Compression;
use crate::error::{Error, ErrorCode, Event, Level, Phase, Result};
use crate::io::{Data, PeekRead};

pub const MAGIC: u32 = 20_000_630;
const MULTIPART_FLAG: u32 = 0x1000;

/// Inclusive pixel rectangle `(xMin, yMin, xMax, yMax)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl Window {
    pub fn width(&self) -> usize { (self.x_max - self.x_min + 1).max(0) as usize }
    pub fn height(&self) -> usize { (self.y_max - self.y_min + 1).max(0) as usize }

    fn read(read: &mut impl std::io::Read) -> Result<Self> {
        let x_min = i32::read(read)?;
        let y_min = i32::read(read)?;
        let x_max = i32::read(read)?;
        let y_max = i32::read(read)?;

        if x_max < x_min || y_max < y_min {
            return Err(Error::invalid("box2i has a negative width or height"));
        }

        Ok(Window { x_min, y_min, x_max, y_max })
    }
}

/// The three sample types a channel may hold on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType { Uint, Half, Float }

impl SampleType {
    fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(SampleType::Uint),
            1 => Some(SampleType::Half),
            2 => Some(SampleType::Float),
            _ => None,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::Half => 2,
            SampleType::Uint | SampleType::Float => 4,
        }
    }
}

/// One entry of a part's `chlist` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub name: String,
    pub pixel_type: SampleType,
    /// Informational flag consulted by B44's logarithmic remap; not otherwise used by this core.
    pub p_linear: bool,
    pub x_sampling: i32,
    pub y_sampling: i32,
}

trait ReadArray: Sized {
    fn read(read: &mut impl std::io::Read) -> Result<Self>;
}

impl ReadArray for [u8; 3] {
    fn read(read: &mut impl std::io::Read) -> Result<Self> {
        let mut buffer = [0_u8; 3];
        std::io::Read::read_exact(read, &mut buffer)?;
        Ok(buffer)
    }
}

/// A part's ordered channel list, preserved in file order (on-disk order is alphabetical,
/// but nothing in this core depends on that, so it is not re-sorted).
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelList {
    pub list: Vec<ChannelInfo>,
}

impl ChannelList {
    pub fn new(list: Vec<ChannelInfo>) -> Self { ChannelList { list } }

    pub fn bytes_per_pixel(&self) -> usize {
        self.list.iter().map(|c| c.pixel_type.bytes_per_sample()).sum()
    }

    pub fn find(&self, name: &str) -> Option<&ChannelInfo> {
        self.list.iter().find(|c| c.name == name)
    }

    fn read(read: &mut impl std::io::Read, size: i32) -> Result<Self> {
        let mut remaining = size;
        let mut list = Vec::new();

        loop {
            let mut peek = [0_u8; 1];
            std::io::Read::read_exact(read, &mut peek)?;
            remaining -= 1;

            if peek[0] == 0 {
                break;
            }

            // ChannelInfo::read already consumed the first name byte via peek; undo by prepending it.
            let name = read_c_string_with_first_byte(read, peek[0], 256)?;
            let pixel_type = i32::read(read)?;
            let pixel_type = SampleType::from_i32(pixel_type)
                .ok_or_else(|| Error::invalid("unknown channel pixel type"))?;
            let p_linear = u8::read(read)?;
            let _reserved = <[u8; 3]>::read(read)?;
            let x_sampling = i32::read(read)?;
            let y_sampling = i32::read(read)?;

            if x_sampling < 1 || y_sampling < 1 {
                return Err(Error::invalid("channel sampling must be at least 1"));
            }

            remaining -= (name.len() + 1) as i32 + 4 + 1 + 3 + 4 + 4;
            list.push(ChannelInfo { name, pixel_type, p_linear: p_linear != 0, x_sampling, y_sampling });
        }

        if remaining != 0 {
            return Err(Error::invalid("chlist attribute has trailing or missing bytes"));
        }

        Ok(ChannelList { list })
    }
}

/// An attribute value this core understands; anything else is kept as an opaque blob.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Channels(ChannelList),
    Compression(u8),
    Box2I(Window),
    Int(i32),
    Float(f32),
    Text(String),
    Unknown(Vec<u8>),
}

/// One image part (a single-part file always has exactly one).
#[derive(Debug, Clone)]
pub struct Part {
    pub id: usize,
    pub attributes: HashMap<String, AttributeValue>,
    pub channels: ChannelList,
    pub data_window: Window,
    pub display_window: Option<Window>,
    pub compression: Compression,
    pub part_type: Option<String>,
}

impl Part {
    fn from_attributes(id: usize, attributes: HashMap<String, AttributeValue>) -> Result<Self> {
        let channels = match attributes.get("channels") {
            Some(AttributeValue::Channels(list)) => list.clone(),
            _ => return Err(Error::invalid("part is missing the 'channels' attribute")),
        };

        let data_window = match attributes.get("dataWindow") {
            Some(AttributeValue::Box2I(window)) => *window,
            _ => return Err(Error::new(ErrorCode::MissingDataWindow, "part is missing the 'dataWindow' attribute")),
        };

        let display_window = match attributes.get("displayWindow") {
            Some(AttributeValue::Box2I(window)) => Some(*window),
            _ => None,
        };

        let compression = match attributes.get("compression") {
            Some(AttributeValue::Compression(tag)) => Compression::from_byte(*tag)
                .ok_or_else(|| Error::new(ErrorCode::UnsupportedCompression,
                    format!("compression tag {} is not one of the supported codecs: {:?}", tag, Compression::supported_names())
                ))?,
            _ => return Err(Error::invalid("part is missing the 'compression' attribute")),
        };

        let part_type = match attributes.get("type") {
            Some(AttributeValue::Text(text)) => Some(text.clone()),
            _ => None,
        };

        Ok(Part { id, attributes, channels, data_window, display_window, compression, part_type })
    }

    /// `true` for `tiledimage`/`deepscanline`/`deeptile` parts, which this core rejects.
    pub fn is_unsupported_type(&self) -> bool {
        matches!(self.part_type.as_deref(), Some("tiledimage") | Some("deepscanline") | Some("deeptile"))
    }
}

/// The fully parsed description of one EXR byte buffer.
#[derive(Debug, Clone)]
pub struct Structure {
    pub magic: u32,
    pub version: u8,
    pub flags: u32,
    pub is_multipart: bool,
    pub parts: Vec<Part>,
    /// Byte offset immediately after all headers: the start of the first part's offset table.
    pub header_end_offset: u64,
}

impl Structure {
    pub fn part(&self, id: usize) -> Result<&Part> {
        self.parts.get(id).ok_or_else(|| Error::new(ErrorCode::PartNotFound, format!("no part with id {}", id)).with("part_id", id))
    }
}

/// Parses the magic number, version word and every part's attribute records.
/// Does not touch the offset tables or chunk payloads; see [`crate::decode`].
pub fn parse_structure(buffer: &[u8]) -> Result<Structure> {
    if buffer.len() < 8 {
        return Err(Error::new(ErrorCode::BufferTooSmall, "buffer is smaller than the 8-byte magic+version header"));
    }

    let mut cursor = PeekRead::new(buffer);

    let magic = u32::read(&mut cursor)?;
    if magic != MAGIC {
        return Err(Error::new(ErrorCode::InvalidMagic, format!("expected magic {}, found {}", MAGIC, magic)).with("found", magic as i64));
    }
    Event::new(Phase::Parse, Level::Info, "parse.magic.ok", "magic number validated").emit();

    let version_flags = u32::read(&mut cursor)?;
    let version = (version_flags & 0xFF) as u8;
    let flags = version_flags & !0xFF;
    let is_multipart = flags & MULTIPART_FLAG != 0;
    Event::new(Phase::Parse, Level::Info, "parse.version.ok", "version word validated")
        .with("version", version as i64).with("multipart", is_multipart as i64).emit();

    let mut parts = Vec::new();

    loop {
        let attributes = read_attribute_records(&mut cursor)?;

        if !attributes.is_empty() || parts.is_empty() {
            let id = parts.len();
            let part = Part::from_attributes(id, attributes)?;
            Event::new(Phase::Parse, Level::Info, "parse.part.ok", "part header parsed").with("part_id", id).emit();
            parts.push(part);
        }

        if !is_multipart {
            break;
        }

        // multipart files terminate the header list with one extra zero byte
        if cursor.skip_if_eq(0)? {
            break;
        }
    }

    if parts.is_empty() {
        return Err(Error::invalid("file declares zero parts"));
    }

    let header_end_offset = cursor.position();

    Event::new(Phase::Parse, Level::Info, "parse.complete", "header parsing complete")
        .with("part_count", parts.len()).with("header_end_offset", header_end_offset).emit();

    Ok(Structure { magic, version, flags, is_multipart, parts, header_end_offset })
}

/// Reads attribute records until a single `0x00` terminates the part.
/// Returns an empty map exactly when the very first byte was the terminator
/// (used by the caller to detect "no more parts" in a multipart file).
fn read_attribute_records(read: &mut PeekRead<&[u8]>) -> Result<HashMap<String, AttributeValue>> {
    let mut attributes = HashMap::new();

    loop {
        if read.skip_if_eq(0)? {
            return Ok(attributes);
        }

        let name = read_c_string(read, 256)?;
        let kind = read_c_string(read, 256)?;
        let size = i32::read(read)?;

        if size < 0 {
            return Err(Error::invalid("attribute has a negative size"));
        }

        let value_start = read.position();
        let value = parse_attribute_value(read, &kind, size)?;
        let consumed = read.position() - value_start;

        // tolerate both under- and over-consumption within known types
        if consumed < size as u64 {
            read.skip(size as u64 - consumed)?;
        } else if consumed > size as u64 {
            return Err(Error::invalid("attribute payload overran its declared size").with("name", name.clone()));
        }

        attributes.insert(name, value);
    }
}

fn parse_attribute_value(read: &mut PeekRead<&[u8]>, kind: &str, size: i32) -> Result<AttributeValue> {
    match kind {
        "chlist" => Ok(AttributeValue::Channels(ChannelList::read(read, size)?)),

        "compression" => {
            if size != 1 {
                return Err(Error::invalid("compression attribute must be exactly 1 byte"));
            }
            Ok(AttributeValue::Compression(u8::read(read)?))
        }

        "box2i" => {
            if size != 16 {
                return Err(Error::invalid("box2i attribute must be exactly 16 bytes"));
            }
            Ok(AttributeValue::Box2I(Window::read(read)?))
        }

        "int" => {
            if size != 4 {
                return Err(Error::invalid("int attribute must be exactly 4 bytes"));
            }
            Ok(AttributeValue::Int(i32::read(read)?))
        }

        "float" => {
            if size != 4 {
                return Err(Error::invalid("float attribute must be exactly 4 bytes"));
            }
            Ok(AttributeValue::Float(f32::read(read)?))
        }

        "string" => {
            let bytes = read_n_bytes(read, size as usize)?;
            let nul = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Ok(AttributeValue::Text(String::from_utf8_lossy(&bytes[..nul]).into_owned()))
        }

        _ => {
            Event::new(Phase::Parse, Level::Warn, "parse.attribute.unknown", format!("unrecognised attribute type '{}'", kind)).emit();
            Ok(AttributeValue::Unknown(read_n_bytes(read, size as usize)?))
        }
    }
}

fn read_n_bytes(read: &mut impl std::io::Read, count: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0_u8; count];
    std::io::Read::read_exact(read, &mut buffer).map_err(|_| Error::truncated("not enough bytes for attribute payload"))?;
    Ok(buffer)
}

fn read_c_string(read: &mut impl std::io::Read, max_len: usize) -> Result<String> {
    let mut bytes = Vec::new();

    loop {
        if bytes.len() >= max_len {
            return Err(Error::invalid("name exceeds the maximum allowed length"));
        }

        let mut byte = [0_u8; 1];
        std::io::Read::read_exact(read, &mut byte).map_err(|_| Error::truncated("unterminated name"))?;

        if byte[0] == 0 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }

        bytes.push(byte[0]);
    }
}

fn read_c_string_with_first_byte(read: &mut impl std::io::Read, first: u8, max_len: usize) -> Result<String> {
    let mut bytes = vec![first];

    loop {
        if bytes.len() >= max_len {
            return Err(Error::invalid("name exceeds the maximum allowed length"));
        }

        let mut byte = [0_u8; 1];
        std::io::Read::read_exact(read, &mut byte).map_err(|_| Error::truncated("unterminated name"))?;

        if byte[0] == 0 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }

        bytes.push(byte[0]);
    }
}

// --- C6 sampling helpers -----------------------------------------------------------------

/// First world coordinate `>= min` that is a sample of a channel with the given stride.
pub fn first_sample(min: i32, sampling: i32) -> i32 {
    min + crate::math::mod_p(-min, sampling)
}

/// Number of samples a channel contributes between `min` and `max` inclusive.
pub fn count_samples(min: i32, max: i32, sampling: i32) -> usize {
    if max < min { return 0; }
    let first = first_sample(min, sampling);
    if first > max { return 0; }
    ((max - first) / sampling) as usize + 1
}

/// Whether scanline `y` is sampled for a channel whose first sampled row is `origin`.
pub fn is_sampled(y: i32, origin: i32, sampling: i32) -> bool {
    y >= origin && crate::math::mod_p(y - origin, sampling) == 0
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_structure() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&2_u32.to_le_bytes());

        // minimal chlist with one HALF channel named "H"
        bytes.extend_from_slice(b"channels\0chlist\0");
        let mut chlist = Vec::new();
        chlist.extend_from_slice(b"H\0");
        chlist.extend_from_slice(&1_i32.to_le_bytes()); // HALF
        chlist.push(0); // pLinear
        chlist.extend_from_slice(&[0, 0, 0]); // reserved
        chlist.extend_from_slice(&1_i32.to_le_bytes()); // xSampling
        chlist.extend_from_slice(&1_i32.to_le_bytes()); // ySampling
        chlist.push(0); // chlist terminator
        bytes.extend_from_slice(&(chlist.len() as i32).to_le_bytes());
        bytes.extend_from_slice(&chlist);

        bytes.extend_from_slice(b"compression\0compression\0");
        bytes.extend_from_slice(&1_i32.to_le_bytes());
        bytes.push(0); // NONE

        bytes.extend_from_slice(b"dataWindow\0box2i\0");
        bytes.extend_from_slice(&16_i32.to_le_bytes());
        for value in [0_i32, 0, 1, 1] { bytes.extend_from_slice(&value.to_le_bytes()); }

        bytes.push(0); // terminates the single part
        bytes
    }

    #[test]
    fn parses_magic_and_version() {
        let structure = parse_structure(&sample_structure()).unwrap();
        assert_eq!(structure.magic, MAGIC);
        assert_eq!(structure.version, 2);
        assert!(!structure.is_multipart);
        assert_eq!(structure.parts.len(), 1);
        assert_eq!(structure.parts[0].channels.list[0].name, "H");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_structure();
        bytes[0] = 0x31;
        let error = parse_structure(&bytes).unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidMagic);
    }

    #[test]
    fn sampling_helpers_match_subsample_example() {
        // 4x4 window, sampling 2, value(x,y) = x + 10y -> decoded plane [0, 2, 20, 22]
        assert_eq!(count_samples(0, 3, 2), 2);
        assert_eq!(first_sample(0, 2), 0);
        assert!(is_sampled(0, 0, 2));
        assert!(!is_sampled(1, 0, 2));
        assert!(is_sampled(2, 0, 2));
    }

    #[test]
    fn parse_structure_never_panics_on_random_bytes() {
        use rand::Rng;
        let mut rng = rand::rng();

        for _ in 0..500 {
            let length = rng.random_range(0..256);
            let bytes: Vec<u8> = (0..length).map(|_| rng.random()).collect();
            let _ = parse_structure(&bytes);
        }
    }

    #[test]
    fn parse_structure_never_panics_on_truncated_valid_header() {
        let valid = sample_structure();

        for cut in 0..valid.len() {
            let _ = parse_structure(&valid[..cut]);
        }
    }
}
