// ---------------------------------------------------------------------------
// save_metadata – load-screen listing file for one save
// ---------------------------------------------------------------------------
//
// Stored next to (not inside) the bundle so the load screen can list saves
// without touching any bundle. File layout:
//
//   [u16 LE N]
//   [N bytes UTF-16LE JSON: {"jsonMetadataByteSize": M}]
//   [M bytes UTF-16LE JSON: SaveMetadata]
//   [remaining bytes: PNG screenshot]
//
// Reading is strictly sequential. Truncation anywhere is a hard error.

use std::io::Cursor;
use std::path::Path;

use bevy::prelude::*;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic_write::write_file;
use crate::save_error::SaveError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMetadata {
    pub save_filename: String,
    pub display_name: String,
    /// Unix seconds.
    pub save_timestamp: i64,
    /// Unix seconds; 0 if never loaded.
    pub last_loaded_timestamp: i64,
    /// Local date, `YYYY-MM-DD`.
    pub save_date: String,
    /// Local time, `HH:MM`.
    pub save_time: String,
    pub level_name: String,
    pub version: String,
}

impl SaveMetadata {
    pub fn new(save_filename: &str, display_name: &str, level_name: &str, version: &str) -> Self {
        Self::at(Utc::now(), save_filename, display_name, level_name, version)
    }

    pub fn at(
        when: DateTime<Utc>,
        save_filename: &str,
        display_name: &str,
        level_name: &str,
        version: &str,
    ) -> Self {
        let local = when.with_timezone(&Local);
        Self {
            save_filename: save_filename.to_string(),
            display_name: display_name.to_string(),
            save_timestamp: when.timestamp(),
            last_loaded_timestamp: 0,
            save_date: local.format("%Y-%m-%d").to_string(),
            save_time: local.format("%H:%M").to_string(),
            level_name: level_name.to_string(),
            version: version.to_string(),
        }
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.save_timestamp, 0).single()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MetadataHeader {
    #[serde(rename = "jsonMetadataByteSize")]
    json_metadata_byte_size: u32,
}

/// Raw RGBA8 pixels captured for the load screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Screenshot {
    pub fn encode_png(&self) -> Result<Vec<u8>, SaveError> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| {
                SaveError::Screenshot(format!(
                    "{} bytes is not a {}x{} RGBA image",
                    self.rgba.len(),
                    self.width,
                    self.height
                ))
            })?;
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    pub fn decode_png(bytes: &[u8]) -> Result<Self, SaveError> {
        let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?.to_rgba8();
        Ok(Self {
            width: image.width(),
            height: image.height(),
            rgba: image.into_raw(),
        })
    }
}

/// Contents of one `.metadata` file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFile {
    pub metadata: SaveMetadata,
    /// PNG bytes; may be empty.
    pub screenshot_png: Vec<u8>,
}

impl MetadataFile {
    pub fn screenshot(&self) -> Result<Option<Screenshot>, SaveError> {
        if self.screenshot_png.is_empty() {
            return Ok(None);
        }
        Screenshot::decode_png(&self.screenshot_png).map(Some)
    }
}

fn utf16_le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn from_utf16_le(bytes: &[u8], what: &str) -> Result<String, SaveError> {
    if bytes.len() % 2 != 0 {
        return Err(SaveError::Corrupted(format!(
            "{what} has odd byte length {}",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|e| SaveError::Corrupted(format!("{what} is not valid UTF-16: {e}")))
}

pub fn encode_metadata(file: &MetadataFile) -> Result<Vec<u8>, SaveError> {
    let json = utf16_le(
        &serde_json::to_string(&file.metadata).map_err(|e| SaveError::Encode(e.to_string()))?,
    );
    let header = utf16_le(
        &serde_json::to_string(&MetadataHeader {
            json_metadata_byte_size: json.len() as u32,
        })
        .map_err(|e| SaveError::Encode(e.to_string()))?,
    );
    let header_len = u16::try_from(header.len())
        .map_err(|_| SaveError::Encode(format!("metadata header is {} bytes", header.len())))?;

    let mut out = Vec::with_capacity(2 + header.len() + json.len() + file.screenshot_png.len());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&json);
    out.extend_from_slice(&file.screenshot_png);
    Ok(out)
}

pub fn decode_metadata(bytes: &[u8]) -> Result<MetadataFile, SaveError> {
    let Some((len_bytes, rest)) = bytes.split_first_chunk::<2>() else {
        return Err(SaveError::Corrupted(
            "truncated before header length".to_string(),
        ));
    };
    let header_len = u16::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(SaveError::Corrupted(format!(
            "header needs {header_len} bytes, only {} remain",
            rest.len()
        )));
    }
    let (header_bytes, rest) = rest.split_at(header_len);
    let header: Option<MetadataHeader> =
        serde_json::from_str(&from_utf16_le(header_bytes, "metadata header")?)?;
    let Some(header) = header else {
        return Err(SaveError::Corrupted("metadata header is null".to_string()));
    };

    let json_len = header.json_metadata_byte_size as usize;
    if json_len > rest.len() {
        warn!(
            "Metadata declares {json_len} bytes of JSON but only {} remain",
            rest.len()
        );
        return Err(SaveError::Corrupted(format!(
            "metadata truncated ({json_len} bytes declared, {} present)",
            rest.len()
        )));
    }
    let (json_bytes, png) = rest.split_at(json_len);
    let metadata: Option<SaveMetadata> =
        serde_json::from_str(&from_utf16_le(json_bytes, "metadata")?)?;
    let Some(metadata) = metadata else {
        return Err(SaveError::Corrupted("metadata is null".to_string()));
    };

    Ok(MetadataFile {
        metadata,
        screenshot_png: png.to_vec(),
    })
}

pub fn write_metadata_file(path: &Path, file: &MetadataFile, atomic: bool) -> Result<(), SaveError> {
    let bytes = encode_metadata(file)?;
    write_file(path, &bytes, atomic)?;
    Ok(())
}

pub fn read_metadata_file(path: &Path) -> Result<MetadataFile, SaveError> {
    decode_metadata(&std::fs::read(path)?)
}
