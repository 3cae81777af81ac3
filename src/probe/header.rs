//! Pixel dimension detection from leading image bytes

use image::{ImageError, ImageReader};
use std::io::Cursor;

/// Below this many bytes an unrecognised prefix may still grow into a known signature
const FORMAT_SNIFF_BYTES: usize = 32;

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Outcome of inspecting a (possibly partial) image prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderScan {
    /// The header was complete enough to read the size
    Found(Dimensions),
    /// More bytes are needed before a decision can be made
    NeedMore,
    /// The bytes do not start with a supported image format
    Unsupported,
}

/// Inspects the leading bytes of an image
pub(crate) fn scan_header(bytes: &[u8]) -> HeaderScan {
    let format = match image::guess_format(bytes) {
        Ok(format) => format,
        Err(_) if bytes.len() < FORMAT_SNIFF_BYTES => return HeaderScan::NeedMore,
        Err(_) => return HeaderScan::Unsupported,
    };

    match ImageReader::with_format(Cursor::new(bytes), format).into_dimensions() {
        Ok((width, height)) => HeaderScan::Found(Dimensions { width, height }),
        // Recognised signature whose decoder is not compiled in
        Err(ImageError::Unsupported(_)) => HeaderScan::Unsupported,
        Err(_) => HeaderScan::NeedMore,
    }
}

const TIFF_IMAGE_WIDTH: u16 = 256;
const TIFF_IMAGE_LENGTH: u16 = 257;
const TIFF_SHORT: u16 = 3;
const TIFF_LONG: u16 = 4;
const TIFF_ENTRY_LEN: usize = 12;

/// Location of the first image directory of a TIFF file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TiffDirectory {
    pub offset: u64,
    pub little_endian: bool,
}

/// Reads the first directory offset from a TIFF header
///
/// Returns `None` unless `bytes` starts with a classic (non-BigTIFF) header.
pub(crate) fn tiff_directory(bytes: &[u8]) -> Option<TiffDirectory> {
    let header = bytes.get(..8)?;
    let little_endian = match &header[..4] {
        b"II*\0" => true,
        b"MM\0*" => false,
        _ => return None,
    };
    Some(TiffDirectory {
        offset: u64::from(read_u32(&header[4..8], little_endian)),
        little_endian,
    })
}

/// Reads the image width and length tags from an image directory
///
/// `bytes` starts at the directory itself. Returns `None` while the entries
/// holding both tags have not arrived yet.
pub(crate) fn tiff_directory_dimensions(bytes: &[u8], little_endian: bool) -> Option<Dimensions> {
    let count = usize::from(read_u16(bytes.get(..2)?, little_endian));
    let (mut width, mut height) = (None, None);

    for entry in bytes[2..]
        .chunks_exact(TIFF_ENTRY_LEN)
        .take(count)
    {
        let tag = read_u16(&entry[0..2], little_endian);
        let value = match read_u16(&entry[2..4], little_endian) {
            TIFF_SHORT => u32::from(read_u16(&entry[8..10], little_endian)),
            TIFF_LONG => read_u32(&entry[8..12], little_endian),
            _ => continue,
        };
        match tag {
            TIFF_IMAGE_WIDTH => width = Some(value),
            TIFF_IMAGE_LENGTH => height = Some(value),
            _ => {}
        }
        if let (Some(width), Some(height)) = (width, height) {
            return Some(Dimensions { width, height });
        }
    }
    None
}

fn read_u16(bytes: &[u8], little_endian: bool) -> u16 {
    let raw = [bytes[0], bytes[1]];
    if little_endian {
        u16::from_le_bytes(raw)
    } else {
        u16::from_be_bytes(raw)
    }
}

fn read_u32(bytes: &[u8], little_endian: bool) -> u32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if little_endian {
        u32::from_le_bytes(raw)
    } else {
        u32::from_be_bytes(raw)
    }
}

/// Reads the pixel dimensions of a complete or partial image
///
/// Returns `None` if the format is unsupported or the bytes end before the
/// size is known.
pub fn read_dimensions(bytes: &[u8]) -> Option<Dimensions> {
    match scan_header(bytes) {
        HeaderScan::Found(dimensions) => Some(dimensions),
        HeaderScan::NeedMore | HeaderScan::Unsupported => None,
    }
}
