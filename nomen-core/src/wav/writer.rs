//! Atomic WAV metadata writer.
//!
//! Rewrites the RIFF container into a temp file in the same directory,
//! merging edits into `bext`/`iXML`/`LIST-INFO` and stream-copying every
//! other chunk, then atomically replaces the original. On any failure
//! before the final rename the original file is untouched.

use chrono::{DateTime, Utc};
use nomen_common::{Error, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::wav::bext::{self, BextFields};
use crate::wav::info::{has_info_fields, InfoList};
use crate::wav::ixml::{self, ASWG_FIELD_MAP, USER_FIELD_MAP};
use crate::wav::reader::read_metadata;
use crate::wav::riff::{
    stream_copy_chunk, validate_header, write_chunk, RiffWalker, COPY_BUFFER_SIZE, FOURCC_BEXT,
    FOURCC_IXML, FOURCC_LIST, FOURCC_RIFF, FOURCC_WAVE, LIST_TYPE_INFO,
};

/// The merged metadata to embed: non-empty built-in fields by canonical
/// name, plus validated custom USER tags.
#[derive(Debug, Clone, Default)]
pub struct MetadataWriteSet {
    pub fields: BTreeMap<String, String>,
    pub custom_fields: BTreeMap<String, String>,
}

impl MetadataWriteSet {
    fn has_ixml_fields(&self) -> bool {
        if !self.custom_fields.is_empty() {
            return true;
        }
        self.fields.keys().any(|field| {
            USER_FIELD_MAP.iter().any(|(f, _)| f == field)
                || ASWG_FIELD_MAP.iter().any(|(f, _)| f == field)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.custom_fields.is_empty()
    }
}

/// INFO sub-chunk tags that held a value before the rewrite. Verification
/// only checks gap-filled tags: existing values are allowed to differ
/// from the write set (fill-only policy).
struct PreWriteState {
    info_tags: Vec<[u8; 4]>,
}

/// Write metadata to a WAV file via the atomic rewrite protocol, then
/// re-read and verify every written field.
pub fn write_metadata(path: &Path, write_set: &MetadataWriteSet, now: DateTime<Utc>) -> Result<()> {
    if !path.is_file() {
        return Err(Error::FileNotFound(path.display().to_string()));
    }
    if std::fs::metadata(path)?.permissions().readonly() {
        return Err(Error::FileReadOnly(path.display().to_string()));
    }
    for tag in write_set.custom_fields.keys() {
        ixml::validate_custom_tag(tag)?;
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let result = (|| -> Result<PreWriteState> {
        let mut temp = tempfile::Builder::new()
            .prefix(".nomen-")
            .suffix(".wav.tmp")
            .tempfile_in(dir)?;

        let pre = rewrite_wav(path, temp.as_file_mut(), write_set, now)?;

        // Atomic replace; the temp file lives on the same filesystem.
        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(pre)
    })()
    .map_err(|e| match e {
        Error::Io(io) => Error::from_write_io(io, path),
        other => other,
    })?;

    tracing::debug!(path = %path.display(), "WAV rewrite committed, verifying");
    verify_write(path, write_set, &result)
}

/// Rewrite the whole container from `src_path` into `dst`, patch the
/// outer RIFF size, and fsync.
fn rewrite_wav(
    src_path: &Path,
    dst: &mut File,
    write_set: &MetadataWriteSet,
    now: DateTime<Utc>,
) -> Result<PreWriteState> {
    let src_file = File::open(src_path)?;
    let mut src = BufReader::with_capacity(COPY_BUFFER_SIZE, src_file);
    let physical_size = validate_header(&mut src, src_path)?;

    let mut pre = PreWriteState { info_tags: Vec::new() };
    let mut bext_done = false;
    let mut ixml_done = false;
    let mut info_done = false;

    {
        let mut out = BufWriter::with_capacity(COPY_BUFFER_SIZE, &mut *dst);
        out.write_all(&FOURCC_RIFF)?;
        out.write_all(&[0u8; 4])?;
        out.write_all(&FOURCC_WAVE)?;

        let mut walker = RiffWalker::new(&mut src, physical_size);
        while let Some(desc) = walker.next_chunk()? {
            match desc.fourcc {
                FOURCC_BEXT => {
                    if bext_done {
                        walker.skip_payload(&desc)?;
                        continue;
                    }
                    let payload = walker.read_payload(&desc)?;
                    let mut fields = BextFields::unpack(&payload);
                    fields.patch(
                        write_set.fields.get("description").map(|s| s.as_str()),
                        write_set.fields.get("designer").map(|s| s.as_str()),
                    );
                    write_chunk(&mut out, FOURCC_BEXT, &fields.pack())?;
                    bext_done = true;
                }
                FOURCC_IXML => {
                    if ixml_done {
                        walker.skip_payload(&desc)?;
                        continue;
                    }
                    let payload = walker.read_payload(&desc)?;
                    let merged = ixml::merge_document(
                        Some(&payload),
                        &write_set.fields,
                        &write_set.custom_fields,
                    )?;
                    write_chunk(&mut out, FOURCC_IXML, &merged)?;
                    ixml_done = true;
                }
                FOURCC_LIST => {
                    let payload = walker.read_payload(&desc)?;
                    if payload.len() >= 4 && payload[0..4] == LIST_TYPE_INFO {
                        if info_done {
                            continue;
                        }
                        let mut list = InfoList::parse(&payload[4..]);
                        pre.info_tags = list
                            .entries
                            .iter()
                            .filter(|(tag, _)| list.get_str(tag).is_some())
                            .map(|(tag, _)| *tag)
                            .collect();
                        list.fill_gaps(&write_set.fields);
                        write_chunk(&mut out, FOURCC_LIST, &list.serialize())?;
                        info_done = true;
                    } else {
                        // Non-INFO LIST (e.g. adtl) passes through verbatim.
                        write_chunk(&mut out, FOURCC_LIST, &payload)?;
                    }
                }
                _ => {
                    stream_copy_chunk(walker.inner(), &mut out, &desc)?;
                }
            }
        }

        // Source had no owned chunks but the write set needs them: append
        // after the last existing chunk. Any metadata write stamps a BEXT
        // (Description/Originator empty unless provided).
        if !bext_done && !write_set.is_empty() {
            let fields = BextFields::new_default(
                write_set.fields.get("description").map(|s| s.as_str()),
                write_set.fields.get("designer").map(|s| s.as_str()),
                now,
            );
            write_chunk(&mut out, FOURCC_BEXT, &fields.pack())?;
        }
        if !ixml_done && write_set.has_ixml_fields() {
            let built = ixml::merge_document(None, &write_set.fields, &write_set.custom_fields)?;
            write_chunk(&mut out, FOURCC_IXML, &built)?;
        }
        if !info_done && has_info_fields(&write_set.fields) {
            let mut list = InfoList::default();
            list.fill_gaps(&write_set.fields);
            write_chunk(&mut out, FOURCC_LIST, &list.serialize())?;
        }

        out.flush()?;
    }

    let total_size = dst.seek(SeekFrom::End(0))?;
    dst.seek(SeekFrom::Start(4))?;
    dst.write_all(&((total_size - 8) as u32).to_le_bytes())?;
    dst.sync_all()?;

    Ok(pre)
}

/// Re-read the written file and compare every written field against the
/// write set. Any mismatch is `WRITE_FAILED`.
fn verify_write(path: &Path, write_set: &MetadataWriteSet, pre: &PreWriteState) -> Result<()> {
    let meta = read_metadata(path)
        .map_err(|e| Error::WriteFailed(format!("Re-read after write failed: {}", e)))?;

    let mut errors: Vec<String> = Vec::new();

    // iXML round-trip (USER authoritative on read)
    for (field, expected) in &write_set.fields {
        let mapped = USER_FIELD_MAP.iter().any(|(f, _)| f == field)
            || ASWG_FIELD_MAP.iter().any(|(f, _)| f == field);
        if !mapped {
            continue;
        }
        let actual = meta.fields.get(field);
        if actual != Some(expected.as_str()) {
            errors.push(format!(
                "iXML field {}: expected '{}', got '{}'",
                field,
                expected,
                actual.unwrap_or("")
            ));
        }
    }

    for (tag, expected) in &write_set.custom_fields {
        let actual = meta
            .custom_fields
            .as_ref()
            .and_then(|m| m.get(tag))
            .map(|s| s.as_str());
        if actual != Some(expected.as_str()) {
            errors.push(format!(
                "Custom field {}: expected '{}', got '{}'",
                tag,
                expected,
                actual.unwrap_or("")
            ));
        }
    }

    // BEXT fields are fixed-width ASCII; compare what the codec can store.
    if let Some(expected) = write_set.fields.get("description") {
        let actual = meta.bext.as_ref().and_then(|b| b.description.clone());
        if actual != ascii_expectation(expected, bext::DESCRIPTION_SIZE) {
            errors.push(format!(
                "BEXT description mismatch: expected '{}', got '{}'",
                expected,
                actual.unwrap_or_default()
            ));
        }
    }
    if let Some(expected) = write_set.fields.get("designer") {
        let actual = meta.bext.as_ref().and_then(|b| b.originator.clone());
        if actual != ascii_expectation(expected, bext::ORIGINATOR_SIZE) {
            errors.push(format!(
                "BEXT originator mismatch: expected '{}', got '{}'",
                expected,
                actual.unwrap_or_default()
            ));
        }
    }

    // INFO is fill-only: verify only the tags that were gaps.
    for (field, tag) in crate::wav::info::INFO_FIELD_MAP {
        let Some(expected) = write_set.fields.get(*field) else {
            continue;
        };
        if pre.info_tags.contains(tag) {
            continue;
        }
        let actual = info_value(&meta, tag);
        if actual.as_deref() != ascii_expectation(expected, usize::MAX).as_deref() {
            errors.push(format!(
                "INFO {} mismatch: expected '{}', got '{}'",
                String::from_utf8_lossy(tag),
                expected,
                actual.unwrap_or_default()
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::WriteFailed(errors.join("; ")))
    }
}

/// What a string becomes after fixed-width ASCII encoding and trimmed
/// read-back: non-ASCII replaced, truncated, whitespace-trimmed.
fn ascii_expectation(value: &str, max_len: usize) -> Option<String> {
    let encoded: String = value
        .chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .take(max_len)
        .collect();
    let trimmed = encoded.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn info_value(meta: &crate::wav::reader::WavMetadata, tag: &[u8; 4]) -> Option<String> {
    let info = meta.info.as_ref()?;
    match tag {
        b"INAM" => info.title.clone(),
        b"IART" => info.artist.clone(),
        b"IGNR" => info.genre.clone(),
        b"ICMT" => info.comment.clone(),
        b"IPRD" => info.product.clone(),
        b"IKEY" => info.keywords.clone(),
        _ => None,
    }
}
