//! `MFM_DISK` image parser.
//!
//! # Format
//!
//! A 256-byte header followed by raw MFM track data:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 8    | Signature `"MFM_DISK"` |
//! | 8      | 4    | Side count (LE) |
//! | 12     | 4    | Tracks per side (LE) |
//! | 16     | 4    | Geometry code (LE) |
//!
//! Each track occupies 6400 bytes at `256 + (side * tracks + track) * 6400`.
//! Sectors are found once at load time by scanning for the ID address mark
//! ($FE) and the data mark that follows it ($FB normal, $F8 deleted).

use thiserror::Error;

/// Image signature at offset 0.
pub const SIGNATURE: &[u8; 8] = b"MFM_DISK";
/// Header length; track data starts here.
pub const HEADER_LEN: usize = 256;
/// Bytes per track, padded from 6250 to a multiple of 256.
pub const TRACK_LEN: usize = 6400;

const ID_MARK: u8 = 0xFE;
const DATA_MARK: u8 = 0xFB;
const DELETED_DATA_MARK: u8 = 0xF8;

/// Sector number some images leave unformatted at the end of each track.
const LAST_SECTOR: u8 = 17;
/// Fallback ID field and data mark positions past the final scan window.
const FALLBACK_ID_OFFSET: usize = 55;
const FALLBACK_MARK_OFFSET: usize = 99;

/// Reasons an image cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MfmError {
    #[error("image is {len} bytes, shorter than the {HEADER_LEN}-byte header")]
    TooShort { len: usize },
    #[error("missing MFM_DISK signature")]
    BadSignature,
}

/// Location and identity of one sector in the raw image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorDescriptor {
    /// Track number from the ID field.
    pub track: u8,
    /// Side number from the ID field.
    pub side: u8,
    /// Sector number from the ID field.
    pub id: u8,
    /// Payload size in bytes (`1 << (code + 7)`).
    pub size: usize,
    /// Size code from the ID field.
    pub size_code: u8,
    /// Offset of the $FE ID address mark.
    pub id_offset: usize,
    /// Offset of the first payload byte; the data mark sits just before it.
    pub data_offset: usize,
    /// Data mark was $F8 when the image was loaded.
    pub deleted: bool,
}

/// A parsed `MFM_DISK` image. The raw bytes stay owned here so sector
/// writes can patch them in place.
#[derive(Debug, Clone)]
pub struct MfmDisk {
    name: String,
    sides: usize,
    tracks: usize,
    geometry: u32,
    raw: Vec<u8>,
    /// Indexed by `side * tracks + track`.
    sectors: Vec<Vec<SectorDescriptor>>,
}

impl MfmDisk {
    /// Parse an image, building every track's sector table.
    pub fn parse(name: &str, raw: Vec<u8>) -> Result<Self, MfmError> {
        if raw.len() < HEADER_LEN {
            return Err(MfmError::TooShort { len: raw.len() });
        }
        if &raw[..SIGNATURE.len()] != SIGNATURE {
            return Err(MfmError::BadSignature);
        }

        // Track and side registers are 8 bits wide
        let sides = (read_u32(&raw, 8) as usize).min(0xFF);
        let tracks = (read_u32(&raw, 12) as usize).min(0xFF);
        let geometry = read_u32(&raw, 16);

        let mut sectors = Vec::with_capacity(sides * tracks);
        for side in 0..sides {
            for track in 0..tracks {
                let start = HEADER_LEN + (side * tracks + track) * TRACK_LEN;
                sectors.push(scan_track(&raw, start, side as u8, track as u8));
            }
        }

        Ok(Self {
            name: name.to_string(),
            sides,
            tracks,
            geometry,
            raw,
            sectors,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn sides(&self) -> usize {
        self.sides
    }

    #[must_use]
    pub fn tracks(&self) -> usize {
        self.tracks
    }

    #[must_use]
    pub fn geometry(&self) -> u32 {
        self.geometry
    }

    /// Raw image bytes, including any sector writes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Sectors on one side of one track, in on-disk order.
    #[must_use]
    pub fn sectors(&self, side: usize, track: usize) -> &[SectorDescriptor] {
        if side >= self.sides || track >= self.tracks {
            return &[];
        }
        &self.sectors[side * self.tracks + track]
    }

    /// Byte at an absolute image offset; off the end reads as $FF.
    #[must_use]
    pub fn byte(&self, offset: usize) -> u8 {
        self.raw.get(offset).copied().unwrap_or(0xFF)
    }

    /// Patch a byte at an absolute image offset. Writes off the end are dropped.
    pub fn set_byte(&mut self, offset: usize, value: u8) {
        if let Some(cell) = self.raw.get_mut(offset) {
            *cell = value;
        }
    }
}

fn read_u32(raw: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        raw[offset],
        raw[offset + 1],
        raw[offset + 2],
        raw[offset + 3],
    ])
}

fn scan_track(raw: &[u8], start: usize, side: u8, track: u8) -> Vec<SectorDescriptor> {
    let end = (start + TRACK_LEN).min(raw.len());
    let mut sectors = Vec::new();
    let mut offset = start;
    let mut window = start;

    while offset < end {
        window = offset;

        let Some(id_offset) = find_mark(raw, offset, end, |b| b == ID_MARK) else {
            break;
        };
        if id_offset + 4 >= end {
            break;
        }
        let size_code = raw[id_offset + 4];
        let size = 1usize << (u32::from(size_code & 0x07) + 7);

        let Some(mark) = find_mark(raw, id_offset + 7, end, |b| {
            b == DATA_MARK || b == DELETED_DATA_MARK
        }) else {
            break;
        };

        let data_offset = mark + 1;
        if data_offset + size + 2 <= raw.len() {
            sectors.push(SectorDescriptor {
                track: raw[id_offset + 1],
                side: raw[id_offset + 2],
                id: raw[id_offset + 3],
                size,
                size_code,
                id_offset,
                data_offset,
                deleted: raw[mark] == DELETED_DATA_MARK,
            });
        }
        offset = mark + size + 3;
    }

    if !sectors.is_empty() && !sectors.iter().any(|s| s.id == LAST_SECTOR) {
        let data_offset = window + FALLBACK_MARK_OFFSET + 1;
        if data_offset + 256 + 2 <= raw.len() {
            sectors.push(SectorDescriptor {
                track,
                side,
                id: LAST_SECTOR,
                size: 256,
                size_code: 1,
                id_offset: window + FALLBACK_ID_OFFSET,
                data_offset,
                deleted: false,
            });
        }
    }

    sectors
}

fn find_mark(raw: &[u8], from: usize, end: usize, is_mark: impl Fn(u8) -> bool) -> Option<usize> {
    (from..end).find(|&i| is_mark(raw[i]))
}

/// Builds images for tests: formats every track with `sectors_per_track`
/// 256-byte sectors numbered from 1, payload bytes derived from position.
#[cfg(test)]
pub(crate) fn build_image(sides: u32, tracks: u32, sectors_per_track: u8) -> Vec<u8> {
    let mut raw = vec![0u8; HEADER_LEN + (sides * tracks) as usize * TRACK_LEN];
    raw[..8].copy_from_slice(SIGNATURE);
    raw[8..12].copy_from_slice(&sides.to_le_bytes());
    raw[12..16].copy_from_slice(&tracks.to_le_bytes());
    raw[16..20].copy_from_slice(&1u32.to_le_bytes());

    for side in 0..sides {
        for track in 0..tracks {
            let mut pos = HEADER_LEN + ((side * tracks + track) as usize) * TRACK_LEN;
            for sector in 1..=sectors_per_track {
                // Gap, then ID field
                raw[pos..pos + 12].fill(0x4E);
                pos += 12;
                raw[pos..pos + 5].copy_from_slice(&[ID_MARK, track as u8, side as u8, sector, 1]);
                pos += 7;
                raw[pos..pos + 22].fill(0x4E);
                pos += 22;
                raw[pos] = DATA_MARK;
                pos += 1;
                for i in 0..256 {
                    raw[pos + i] = (i as u8) ^ sector ^ ((track as u8) << 1) ^ (side as u8);
                }
                pos += 258;
            }
        }
    }
    raw
}
