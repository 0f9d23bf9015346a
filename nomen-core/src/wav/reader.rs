//! WAV metadata reader — walks the chunk list once and extracts the
//! technical info, BEXT/INFO snapshots, and the iXML working set.

use nomen_common::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::models::{BextInfo, MetadataFields, RiffInfo, TechnicalInfo};
use crate::wav::bext::BextFields;
use crate::wav::info::InfoList;
use crate::wav::riff::{
    validate_header, FmtChunk, RiffWalker, FOURCC_BEXT, FOURCC_DATA, FOURCC_FMT, FOURCC_IXML,
    FOURCC_LIST, LIST_TYPE_INFO,
};
use crate::wav::{ixml, riff};

/// Bytes hashed from the head of the file.
const HASH_READ_SIZE: usize = 4096;

/// Everything the reader extracts from one WAV file.
#[derive(Debug, Clone)]
pub struct WavMetadata {
    pub technical: TechnicalInfo,
    pub bext: Option<BextInfo>,
    pub info: Option<RiffInfo>,
    pub fields: MetadataFields,
    pub custom_fields: Option<BTreeMap<String, String>>,
}

/// Read all metadata from a WAV file.
///
/// The first `bext`/`iXML`/`LIST-INFO` chunk wins; duplicates are ignored.
/// Unknown chunks are skipped without loading their payloads.
pub fn read_metadata(path: &Path) -> Result<WavMetadata> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
        _ => Error::Io(e),
    })?;
    let file_size_bytes = file.metadata()?.len();
    let mut src = BufReader::with_capacity(riff::COPY_BUFFER_SIZE, file);

    let physical_size = validate_header(&mut src, path)?;
    let mut walker = RiffWalker::new(&mut src, physical_size);

    let mut fmt: Option<FmtChunk> = None;
    let mut data_size: Option<u64> = None;
    let mut bext: Option<BextInfo> = None;
    let mut ixml_fields: Option<(BTreeMap<String, String>, BTreeMap<String, String>)> = None;
    let mut info: Option<RiffInfo> = None;

    while let Some(desc) = walker.next_chunk()? {
        match desc.fourcc {
            FOURCC_FMT if fmt.is_none() => {
                let payload = walker.read_payload(&desc)?;
                fmt = Some(FmtChunk::parse(&payload)?);
            }
            FOURCC_DATA if data_size.is_none() => {
                data_size = Some(desc.payload_size as u64);
                walker.skip_payload(&desc)?;
            }
            FOURCC_BEXT if bext.is_none() => {
                let payload = walker.read_payload(&desc)?;
                bext = Some(BextFields::unpack(&payload).to_info());
            }
            FOURCC_IXML if ixml_fields.is_none() => {
                let payload = walker.read_payload(&desc)?;
                ixml_fields = ixml::parse_ixml(&payload).map(|root| ixml::extract_fields(&root));
            }
            FOURCC_LIST if info.is_none() => {
                let payload = walker.read_payload(&desc)?;
                if payload.len() >= 4 && payload[0..4] == LIST_TYPE_INFO {
                    let list = InfoList::parse(&payload[4..]);
                    let snapshot = list.to_riff_info();
                    if !snapshot.is_empty() {
                        info = Some(snapshot);
                    }
                }
            }
            _ => walker.skip_payload(&desc)?,
        }
    }

    let fmt = fmt.ok_or_else(|| {
        Error::InvalidWav(format!("Missing fmt chunk: {}", path.display()))
    })?;

    let mut fields = MetadataFields::default();
    let mut custom_fields = None;
    if let Some((extracted, custom)) = ixml_fields {
        for (name, value) in extracted {
            fields.set(&name, Some(value));
        }
        if !custom.is_empty() {
            custom_fields = Some(custom);
        }
    }

    Ok(WavMetadata {
        technical: technical_info(&fmt, data_size.unwrap_or(0), file_size_bytes),
        bext,
        info,
        fields,
        custom_fields,
    })
}

fn technical_info(fmt: &FmtChunk, data_size: u64, file_size_bytes: u64) -> TechnicalInfo {
    let frame_count = if fmt.block_align > 0 {
        data_size / fmt.block_align as u64
    } else {
        0
    };
    let duration_seconds = if fmt.sample_rate > 0 {
        frame_count as f64 / fmt.sample_rate as f64
    } else {
        0.0
    };
    let audio_format = if fmt.audio_format == 1 {
        "PCM".to_string()
    } else {
        format!("0x{:04X}", fmt.audio_format)
    };

    TechnicalInfo {
        sample_rate: fmt.sample_rate,
        bit_depth: fmt.bits_per_sample,
        channels: fmt.channels,
        duration_seconds,
        frame_count,
        audio_format,
        file_size_bytes,
    }
}

/// Cheap stable fingerprint for change detection:
/// `SHA-256(first 4 KiB ∥ size as u64 LE ∥ mtime-seconds as u64 LE)`,
/// lowercase hex. A cache key, not a content digest.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
        _ => Error::Io(e),
    })?;

    let mut hasher = Sha256::new();

    let mut file = File::open(path)?;
    let mut head = vec![0u8; HASH_READ_SIZE];
    let mut filled = 0usize;
    while filled < head.len() {
        let got = file.read(&mut head[filled..])?;
        if got == 0 {
            break;
        }
        filled += got;
    }
    hasher.update(&head[..filled]);

    hasher.update(metadata.len().to_le_bytes());

    let mtime_secs = metadata
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    hasher.update(mtime_secs.to_le_bytes());

    Ok(format!("{:x}", hasher.finalize()))
}

/// Merge BEXT/INFO values into empty iXML fields (read direction of the
/// fallback rules). BEXT takes precedence over INFO.
pub fn apply_import_fallbacks(meta: &mut WavMetadata) {
    let bext = meta.bext.clone().unwrap_or_default();
    let info = meta.info.clone().unwrap_or_default();

    if meta.fields.description.is_none() {
        meta.fields.description = bext.description.clone();
    }
    if meta.fields.designer.is_none() {
        meta.fields.designer = bext.originator.clone().or_else(|| info.artist.clone());
    }
    if meta.fields.fx_name.is_none() {
        meta.fields.fx_name = info.title.clone();
    }
    if meta.fields.category.is_none() {
        meta.fields.category = info.genre.clone();
    }
    if meta.fields.notes.is_none() {
        meta.fields.notes = info.comment.clone();
    }
    if meta.fields.library.is_none() {
        meta.fields.library = info.product.clone();
    }
    if meta.fields.keywords.is_none() {
        meta.fields.keywords = info.keywords.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build a minimal WAV on disk: fmt + data plus optional extra chunks.
    fn write_wav(path: &Path, extra: &[([u8; 4], Vec<u8>)]) {
        let mut body: Vec<u8> = Vec::new();

        let mut fmt = Vec::new();
        fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
        fmt.extend_from_slice(&1u16.to_le_bytes()); // mono
        fmt.extend_from_slice(&48_000u32.to_le_bytes());
        fmt.extend_from_slice(&96_000u32.to_le_bytes());
        fmt.extend_from_slice(&2u16.to_le_bytes()); // block align
        fmt.extend_from_slice(&16u16.to_le_bytes());
        riff::write_chunk(&mut body, FOURCC_FMT, &fmt).unwrap();

        for (fourcc, payload) in extra {
            riff::write_chunk(&mut body, *fourcc, payload).unwrap();
        }

        riff::write_chunk(&mut body, FOURCC_DATA, &[0u8; 9600]).unwrap();

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn reads_technical_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, &[]);

        let meta = read_metadata(&path).unwrap();
        assert_eq!(meta.technical.sample_rate, 48_000);
        assert_eq!(meta.technical.channels, 1);
        assert_eq!(meta.technical.bit_depth, 16);
        assert_eq!(meta.technical.frame_count, 4800);
        assert!((meta.technical.duration_seconds - 0.1).abs() < 1e-9);
        assert_eq!(meta.technical.audio_format, "PCM");
        assert!(meta.bext.is_none());
        assert!(meta.info.is_none());
    }

    #[test]
    fn reads_ixml_and_info_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagged.wav");

        let ixml = b"<BWFXML><USER><CATID>DOORWood</CATID><FXNAME>Slam</FXNAME></USER></BWFXML>"
            .to_vec();
        let mut list = Vec::new();
        list.extend_from_slice(b"INFO");
        list.extend_from_slice(b"IART");
        list.extend_from_slice(&5u32.to_le_bytes());
        list.extend_from_slice(b"JDOE\0");
        list.push(0);

        write_wav(&path, &[(FOURCC_IXML, ixml), (FOURCC_LIST, list)]);

        let meta = read_metadata(&path).unwrap();
        assert_eq!(meta.fields.cat_id.as_deref(), Some("DOORWood"));
        assert_eq!(meta.fields.fx_name.as_deref(), Some("Slam"));
        assert_eq!(meta.info.as_ref().unwrap().artist.as_deref(), Some("JDOE"));
    }

    #[test]
    fn missing_fmt_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nofmt.wav");
        let mut out = Vec::new();
        let mut body = Vec::new();
        riff::write_chunk(&mut body, FOURCC_DATA, &[0u8; 4]).unwrap();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);
        std::fs::write(&path, out).unwrap();

        assert_eq!(read_metadata(&path).unwrap_err().code(), "INVALID_WAV");
    }

    #[test]
    fn hash_is_stable_and_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.wav");
        write_wav(&path, &[]);

        let h1 = compute_file_hash(&path).unwrap();
        let h2 = compute_file_hash(&path).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        // Flip one byte inside the first 4 KiB
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[100] ^= 0xFF;
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&bytes).unwrap();
        drop(f);
        assert_ne!(compute_file_hash(&path).unwrap(), h1);
    }

    #[test]
    fn hash_changes_with_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.wav");
        write_wav(&path, &[]);
        let h1 = compute_file_hash(&path).unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[0u8; 2]).unwrap();
        drop(f);
        assert_ne!(compute_file_hash(&path).unwrap(), h1);
    }

    #[test]
    fn fallbacks_fill_empty_fields_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.wav");
        write_wav(&path, &[]);

        let mut meta = read_metadata(&path).unwrap();
        meta.bext = Some(BextInfo {
            description: Some("From bext".into()),
            originator: Some("BEXT GUY".into()),
            ..Default::default()
        });
        meta.info = Some(RiffInfo {
            title: Some("Info Title".into()),
            artist: Some("INFO GUY".into()),
            genre: Some("DOORS".into()),
            ..Default::default()
        });
        meta.fields.description = Some("Already set".into());

        apply_import_fallbacks(&mut meta);
        assert_eq!(meta.fields.description.as_deref(), Some("Already set"));
        // BEXT originator beats INFO artist
        assert_eq!(meta.fields.designer.as_deref(), Some("BEXT GUY"));
        assert_eq!(meta.fields.fx_name.as_deref(), Some("Info Title"));
        assert_eq!(meta.fields.category.as_deref(), Some("DOORS"));
    }

    #[test]
    fn missing_file_maps_to_file_not_found() {
        let err = read_metadata(Path::new("/nonexistent/nope.wav")).unwrap_err();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
        let err = compute_file_hash(Path::new("/nonexistent/nope.wav")).unwrap_err();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
    }
}
