//! LIST-INFO chunk codec.
//!
//! An INFO list holds sub-chunks (`INAM`, `IART`, ...) whose payloads are
//! NUL-terminated strings. Update policy is fill-gaps-only: existing
//! values are never overwritten, unknown sub-chunks pass through in their
//! original order.

use crate::models::RiffInfo;
use std::collections::BTreeMap;

/// Metadata field → INFO sub-chunk tag, fill-only.
pub const INFO_FIELD_MAP: &[(&str, [u8; 4])] = &[
    ("fx_name", *b"INAM"),
    ("designer", *b"IART"),
    ("category", *b"IGNR"),
    ("notes", *b"ICMT"),
    ("library", *b"IPRD"),
    ("keywords", *b"IKEY"),
];

/// Ordered INFO sub-chunks as read from disk (raw payload bytes,
/// including the NUL terminator).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoList {
    pub entries: Vec<([u8; 4], Vec<u8>)>,
}

impl InfoList {
    /// Parse LIST payload data *after* the 4-byte `INFO` type word.
    /// Tolerant of trailing garbage: parsing stops at the first header
    /// that no longer fits.
    pub fn parse(data: &[u8]) -> Self {
        let mut entries = Vec::new();
        let mut pos = 0usize;
        while pos + 8 <= data.len() {
            let tag = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
            let size =
                u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
                    as usize;
            let end = (pos + 8 + size).min(data.len());
            entries.push((tag, data[pos + 8..end].to_vec()));
            pos += 8 + size;
            if size % 2 != 0 {
                pos += 1;
            }
        }
        Self { entries }
    }

    pub fn get(&self, tag: &[u8; 4]) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_slice())
    }

    /// Decoded string value for a tag, trimmed of NULs and whitespace.
    pub fn get_str(&self, tag: &[u8; 4]) -> Option<String> {
        let raw = self.get(tag)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let s = String::from_utf8_lossy(&raw[..end]).trim().to_string();
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    /// Fill gaps from the write set: a mapped sub-chunk is appended only
    /// when absent or empty. Existing entries keep their exact bytes and
    /// order.
    pub fn fill_gaps(&mut self, fields: &BTreeMap<String, String>) {
        for (field, tag) in INFO_FIELD_MAP {
            let Some(value) = fields.get(*field).filter(|v| !v.is_empty()) else {
                continue;
            };
            if self.get_str(tag).is_some() {
                continue;
            }
            // An existing-but-empty entry is replaced in place.
            self.entries.retain(|(t, _)| t != tag);
            let mut payload: Vec<u8> = value
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect();
            payload.push(0);
            self.entries.push((*tag, payload));
        }
    }

    /// Serialize to LIST payload data: `INFO` type word followed by the
    /// sub-chunks, each padded to even length.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"INFO");
        for (tag, payload) in &self.entries {
            out.extend_from_slice(tag);
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload);
            if payload.len() % 2 != 0 {
                out.push(0);
            }
        }
        out
    }

    /// Read-only snapshot of the commonly mapped tags.
    pub fn to_riff_info(&self) -> RiffInfo {
        RiffInfo {
            title: self.get_str(b"INAM"),
            artist: self.get_str(b"IART"),
            genre: self.get_str(b"IGNR"),
            comment: self.get_str(b"ICMT"),
            created_date: self.get_str(b"ICRD"),
            software: self.get_str(b"ISFT"),
            copyright: self.get_str(b"ICOP"),
            product: self.get_str(b"IPRD"),
            keywords: self.get_str(b"IKEY"),
        }
    }
}

/// True when the write set has any field that maps to an INFO sub-chunk.
pub fn has_info_fields(fields: &BTreeMap<String, String>) -> bool {
    INFO_FIELD_MAP
        .iter()
        .any(|(field, _)| fields.get(*field).map(|v| !v.is_empty()).unwrap_or(false))
}
