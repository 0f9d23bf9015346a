//! Low-level RIFF container walking and chunk write helpers.
//!
//! The walker yields chunk descriptors without loading payloads; payload
//! reads and stream copies are explicit, bounded operations.

use nomen_common::{Error, Result};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const FOURCC_RIFF: [u8; 4] = *b"RIFF";
pub const FOURCC_WAVE: [u8; 4] = *b"WAVE";
pub const FOURCC_FMT: [u8; 4] = *b"fmt ";
pub const FOURCC_DATA: [u8; 4] = *b"data";
pub const FOURCC_BEXT: [u8; 4] = *b"bext";
/// Chunk ID is case-sensitive: literally `i X M L`.
pub const FOURCC_IXML: [u8; 4] = *b"iXML";
pub const FOURCC_LIST: [u8; 4] = *b"LIST";
pub const LIST_TYPE_INFO: [u8; 4] = *b"INFO";

/// Stream-copy buffer bound.
pub const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Descriptor for one chunk in a RIFF container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDesc {
    pub fourcc: [u8; 4],
    /// Offset of the payload (not the 8-byte chunk header).
    pub payload_offset: u64,
    pub payload_size: u32,
}

impl ChunkDesc {
    /// Payload size including the odd-size pad byte.
    pub fn padded_size(&self) -> u64 {
        let size = self.payload_size as u64;
        size + (size & 1)
    }
}

/// Validate the 12-byte RIFF/WAVE header.
///
/// Rejects RIFX (big-endian) and RF64 containers, and any file whose
/// declared outer size plus the 8-byte header exceeds the physical size.
/// Returns the physical file size; leaves the reader positioned at the
/// first chunk header.
pub fn validate_header<R: Read + Seek>(src: &mut R, path: &Path) -> Result<u64> {
    let file_size = src.seek(SeekFrom::End(0))?;
    src.seek(SeekFrom::Start(0))?;

    let mut header = [0u8; 12];
    if file_size < 12 || src.read_exact(&mut header).is_err() {
        return Err(Error::InvalidWav(format!(
            "File too small to be a WAV file: {}",
            path.display()
        )));
    }

    let magic = &header[0..4];
    if magic == b"RIFX" {
        return Err(Error::InvalidWav(format!(
            "Big-endian RIFX files are not supported: {}",
            path.display()
        )));
    }
    if magic == b"RF64" {
        return Err(Error::InvalidWav(format!(
            "RF64 files are not supported: {}",
            path.display()
        )));
    }
    if magic != FOURCC_RIFF {
        return Err(Error::InvalidWav(format!(
            "Missing RIFF header: {}",
            path.display()
        )));
    }
    if header[8..12] != FOURCC_WAVE {
        return Err(Error::InvalidWav(format!(
            "Missing WAVE identifier: {}",
            path.display()
        )));
    }

    let declared = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
    if declared + 8 > file_size {
        return Err(Error::InvalidWav(format!(
            "Declared RIFF size {} exceeds physical size {}: {}",
            declared + 8,
            file_size,
            path.display()
        )));
    }

    Ok(file_size)
}

/// Iterator over the chunks of an open RIFF container.
///
/// Tolerates unknown chunks; a final truncated chunk has its size clamped
/// to the physical end of file.
pub struct RiffWalker<'a, R: Read + Seek> {
    src: &'a mut R,
    file_size: u64,
}

impl<'a, R: Read + Seek> RiffWalker<'a, R> {
    /// Start walking. The reader must be positioned at the first chunk
    /// header (directly after [`validate_header`]).
    pub fn new(src: &'a mut R, file_size: u64) -> Self {
        Self { src, file_size }
    }

    /// Descriptor of the next chunk, or `None` at end of container.
    /// Leaves the reader positioned at the chunk payload.
    pub fn next_chunk(&mut self) -> Result<Option<ChunkDesc>> {
        let pos = self.src.stream_position()?;
        if pos + 8 > self.file_size {
            return Ok(None);
        }

        let mut header = [0u8; 8];
        self.src.read_exact(&mut header)?;
        let fourcc = [header[0], header[1], header[2], header[3]];
        let mut payload_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let payload_offset = pos + 8;
        if payload_offset + payload_size as u64 > self.file_size {
            payload_size = (self.file_size - payload_offset) as u32;
        }

        Ok(Some(ChunkDesc {
            fourcc,
            payload_offset,
            payload_size,
        }))
    }

    /// Skip over the current chunk's payload and pad byte.
    pub fn skip_payload(&mut self, desc: &ChunkDesc) -> Result<()> {
        self.src
            .seek(SeekFrom::Start(desc.payload_offset + desc.padded_size()))?;
        Ok(())
    }

    /// Read the current chunk's payload into memory and consume the pad
    /// byte. Only used for the metadata chunks the writer owns.
    pub fn read_payload(&mut self, desc: &ChunkDesc) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; desc.payload_size as usize];
        self.src.read_exact(&mut payload)?;
        self.skip_pad(desc)?;
        Ok(payload)
    }

    fn skip_pad(&mut self, desc: &ChunkDesc) -> Result<()> {
        if desc.payload_size % 2 != 0
            && desc.payload_offset + desc.padded_size() <= self.file_size
        {
            self.src.seek(SeekFrom::Current(1))?;
        }
        Ok(())
    }

    pub fn inner(&mut self) -> &mut R {
        self.src
    }
}

/// Write a complete chunk: header + payload + pad byte if the size is odd.
/// Pad bytes are not counted in the size field.
pub fn write_chunk<W: Write>(dst: &mut W, fourcc: [u8; 4], payload: &[u8]) -> Result<()> {
    dst.write_all(&fourcc)?;
    dst.write_all(&(payload.len() as u32).to_le_bytes())?;
    dst.write_all(payload)?;
    if payload.len() % 2 != 0 {
        dst.write_all(&[0u8])?;
    }
    Ok(())
}

/// Stream-copy a chunk (header + payload + pad) from `src` to `dst` in
/// bounded buffers. `src` must be positioned at the chunk payload.
pub fn stream_copy_chunk<R: Read + Seek, W: Write>(
    src: &mut R,
    dst: &mut W,
    desc: &ChunkDesc,
) -> Result<()> {
    dst.write_all(&desc.fourcc)?;
    dst.write_all(&desc.payload_size.to_le_bytes())?;

    let mut remaining = desc.padded_size();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    while remaining > 0 {
        let want = remaining.min(COPY_BUFFER_SIZE as u64) as usize;
        let got = src.read(&mut buffer[..want])?;
        if got == 0 {
            // Truncated source pad byte: synthesize it so the output stays
            // well-formed.
            if remaining == 1 && desc.payload_size % 2 != 0 {
                dst.write_all(&[0u8])?;
                break;
            }
            return Err(Error::InvalidWav(format!(
                "Unexpected end of file: expected {} more bytes",
                remaining
            )));
        }
        dst.write_all(&buffer[..got])?;
        remaining -= got as u64;
    }
    Ok(())
}

/// Parsed `fmt ` chunk fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmtChunk {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FmtChunk {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 16 {
            return Err(Error::InvalidWav(format!(
                "fmt chunk too small: {} bytes",
                payload.len()
            )));
        }
        Ok(Self {
            audio_format: u16::from_le_bytes([payload[0], payload[1]]),
            channels: u16::from_le_bytes([payload[2], payload[3]]),
            sample_rate: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
            byte_rate: u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]),
            block_align: u16::from_le_bytes([payload[12], payload[13]]),
            bits_per_sample: u16::from_le_bytes([payload[14], payload[15]]),
        })
    }
}
