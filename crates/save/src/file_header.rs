// ---------------------------------------------------------------------------
// file_header – container around every bundle file
// ---------------------------------------------------------------------------
//
// Header format (20 bytes, fixed-size, little-endian):
//   [0..4]   Magic bytes: "SCNS"
//   [4..8]   Header format version (u32)
//   [8..12]  Flags (u32: bit 0 = LZ4 compressed)
//   [12..16] Uncompressed payload size (u32)
//   [16..20] xxHash32 checksum of the stored payload (everything after the
//            header, compressed or not)
//
// On write: encode -> optionally compress -> prepend header
// On read:  check magic -> validate checksum -> decompress -> check size

use xxhash_rust::xxh32::xxh32;

use crate::save_error::SaveError;

pub const MAGIC: [u8; 4] = *b"SCNS";

pub const HEADER_SIZE: usize = 20;

/// Version of the header layout itself, not of the records inside.
pub const HEADER_FORMAT_VERSION: u32 = 1;

pub const FLAG_LZ4: u32 = 1;

const XXHASH_SEED: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub format_version: u32,
    pub flags: u32,
    pub uncompressed_size: u32,
    pub checksum: u32,
}

impl FileHeader {
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_LZ4 != 0
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.format_version.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&self.checksum.to_le_bytes());
    }

    fn parse(bytes: &[u8]) -> Result<Self, SaveError> {
        if bytes.len() < 4 || bytes[..4] != MAGIC {
            return Err(SaveError::Corrupted(
                "missing SCNS magic bytes".to_string(),
            ));
        }
        if bytes.len() < HEADER_SIZE {
            return Err(SaveError::Corrupted(format!(
                "file is too short ({} bytes, need at least {HEADER_SIZE} for header)",
                bytes.len()
            )));
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        Ok(Self {
            format_version: word(4),
            flags: word(8),
            uncompressed_size: word(12),
            checksum: word(16),
        })
    }
}

/// The header stores sizes as u32; larger payloads cannot be described.
fn payload_size(len: usize) -> Result<u32, SaveError> {
    u32::try_from(len).map_err(|_| {
        SaveError::Encode(format!(
            "payload of {len} bytes exceeds the {} byte limit of the file header",
            u32::MAX
        ))
    })
}

/// Prepend a header to `data`, compressing the payload first if asked.
pub fn wrap_payload(data: &[u8], compress: bool) -> Result<Vec<u8>, SaveError> {
    let uncompressed_size = payload_size(data.len())?;
    let stored = if compress {
        lz4_flex::compress_prepend_size(data)
    } else {
        data.to_vec()
    };
    let header = FileHeader {
        format_version: HEADER_FORMAT_VERSION,
        flags: if compress { FLAG_LZ4 } else { 0 },
        uncompressed_size,
        checksum: xxh32(&stored, XXHASH_SEED),
    };
    let mut out = Vec::with_capacity(HEADER_SIZE + stored.len());
    header.write_to(&mut out);
    out.extend_from_slice(&stored);
    Ok(out)
}

/// Validate the header and return the original payload.
pub fn unwrap_payload(bytes: &[u8]) -> Result<Vec<u8>, SaveError> {
    let header = FileHeader::parse(bytes)?;
    if header.format_version > HEADER_FORMAT_VERSION {
        return Err(SaveError::Corrupted(format!(
            "header format version {} is newer than supported version {HEADER_FORMAT_VERSION}",
            header.format_version
        )));
    }

    let stored = &bytes[HEADER_SIZE..];
    let computed = xxh32(stored, XXHASH_SEED);
    if computed != header.checksum {
        return Err(SaveError::Corrupted(format!(
            "checksum mismatch (expected {:#010X}, got {computed:#010X})",
            header.checksum
        )));
    }

    let payload = if header.is_compressed() {
        lz4_flex::decompress_size_prepended(stored)
            .map_err(|e| SaveError::Corrupted(format!("LZ4 decompression failed: {e}")))?
    } else {
        stored.to_vec()
    };
    if payload.len() != header.uncompressed_size as usize {
        return Err(SaveError::Corrupted(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            header.uncompressed_size
        )));
    }
    Ok(payload)
}
