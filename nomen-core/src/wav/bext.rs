//! BEXT chunk codec (EBU Tech 3285).
//!
//! Fixed binary layout: 602 bytes of fixed fields followed by a
//! variable-length CodingHistory. Updates patch only Description and
//! Originator; every other byte round-trips verbatim.

use crate::models::BextInfo;
use chrono::{DateTime, Utc};

pub const DESCRIPTION_SIZE: usize = 256;
pub const ORIGINATOR_SIZE: usize = 32;
pub const ORIGINATOR_REF_SIZE: usize = 32;
pub const DATE_SIZE: usize = 10;
pub const TIME_SIZE: usize = 8;
pub const UMID_SIZE: usize = 64;
pub const RESERVED_SIZE: usize = 180;
/// Everything before CodingHistory.
pub const FIXED_SIZE: usize = 602;

/// Decoded BEXT fields. String fields keep their raw fixed-width bytes so
/// an unpatched field re-packs identically.
#[derive(Debug, Clone, PartialEq)]
pub struct BextFields {
    pub description: Vec<u8>,
    pub originator: Vec<u8>,
    pub originator_ref: Vec<u8>,
    pub origination_date: Vec<u8>,
    pub origination_time: Vec<u8>,
    pub time_reference: u64,
    pub version: u16,
    pub umid: Vec<u8>,
    pub loudness_value: i16,
    pub loudness_range: i16,
    pub max_true_peak: i16,
    pub max_momentary: i16,
    pub max_shortterm: i16,
    pub reserved: Vec<u8>,
    pub coding_history: Vec<u8>,
}

impl BextFields {
    /// Unpack raw chunk data. Short payloads (some writers truncate the
    /// reserved area) are zero-extended to the fixed layout first.
    pub fn unpack(data: &[u8]) -> Self {
        let mut buf = data.to_vec();
        if buf.len() < FIXED_SIZE {
            buf.resize(FIXED_SIZE, 0);
        }

        Self {
            description: buf[0..256].to_vec(),
            originator: buf[256..288].to_vec(),
            originator_ref: buf[288..320].to_vec(),
            origination_date: buf[320..330].to_vec(),
            origination_time: buf[330..338].to_vec(),
            time_reference: u64::from_le_bytes(buf[338..346].try_into().unwrap()),
            version: u16::from_le_bytes(buf[346..348].try_into().unwrap()),
            umid: buf[348..412].to_vec(),
            loudness_value: i16::from_le_bytes(buf[412..414].try_into().unwrap()),
            loudness_range: i16::from_le_bytes(buf[414..416].try_into().unwrap()),
            max_true_peak: i16::from_le_bytes(buf[416..418].try_into().unwrap()),
            max_momentary: i16::from_le_bytes(buf[418..420].try_into().unwrap()),
            max_shortterm: i16::from_le_bytes(buf[420..422].try_into().unwrap()),
            reserved: buf[422..602].to_vec(),
            coding_history: buf[602..].to_vec(),
        }
    }

    /// Pack back into raw chunk data.
    pub fn pack(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(FIXED_SIZE + self.coding_history.len());
        data.extend_from_slice(&pad_bytes(&self.description, DESCRIPTION_SIZE));
        data.extend_from_slice(&pad_bytes(&self.originator, ORIGINATOR_SIZE));
        data.extend_from_slice(&pad_bytes(&self.originator_ref, ORIGINATOR_REF_SIZE));
        data.extend_from_slice(&pad_bytes(&self.origination_date, DATE_SIZE));
        data.extend_from_slice(&pad_bytes(&self.origination_time, TIME_SIZE));
        data.extend_from_slice(&self.time_reference.to_le_bytes());
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&pad_bytes(&self.umid, UMID_SIZE));
        data.extend_from_slice(&self.loudness_value.to_le_bytes());
        data.extend_from_slice(&self.loudness_range.to_le_bytes());
        data.extend_from_slice(&self.max_true_peak.to_le_bytes());
        data.extend_from_slice(&self.max_momentary.to_le_bytes());
        data.extend_from_slice(&self.max_shortterm.to_le_bytes());
        data.extend_from_slice(&pad_bytes(&self.reserved, RESERVED_SIZE));
        data.extend_from_slice(&self.coding_history);
        data
    }

    /// Fresh Version=1 BEXT with zeroed UMID/loudness/reserved, stamped
    /// with the given origination time.
    pub fn new_default(
        description: Option<&str>,
        originator: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            description: ascii_field(description.unwrap_or(""), DESCRIPTION_SIZE),
            originator: ascii_field(originator.unwrap_or(""), ORIGINATOR_SIZE),
            originator_ref: vec![0; ORIGINATOR_REF_SIZE],
            origination_date: ascii_field(&now.format("%Y-%m-%d").to_string(), DATE_SIZE),
            origination_time: ascii_field(&now.format("%H:%M:%S").to_string(), TIME_SIZE),
            time_reference: 0,
            version: 1,
            umid: vec![0; UMID_SIZE],
            loudness_value: 0,
            loudness_range: 0,
            max_true_peak: 0,
            max_momentary: 0,
            max_shortterm: 0,
            reserved: vec![0; RESERVED_SIZE],
            coding_history: Vec::new(),
        }
    }

    /// Patch Description/Originator from the write set; all other fields
    /// keep their on-disk bytes.
    pub fn patch(&mut self, description: Option<&str>, originator: Option<&str>) {
        if let Some(desc) = description {
            self.description = ascii_field(desc, DESCRIPTION_SIZE);
        }
        if let Some(orig) = originator {
            self.originator = ascii_field(orig, ORIGINATOR_SIZE);
        }
    }

    /// Read-only snapshot with strings trimmed at the first NUL.
    pub fn to_info(&self) -> BextInfo {
        BextInfo {
            description: trimmed_string(&self.description),
            originator: trimmed_string(&self.originator),
            originator_ref: trimmed_string(&self.originator_ref),
            origination_date: trimmed_string(&self.origination_date),
            origination_time: trimmed_string(&self.origination_time),
            time_reference: Some(self.time_reference),
            coding_history: trimmed_string(&self.coding_history),
        }
    }
}

/// Truncate or zero-pad to the exact field width.
fn pad_bytes(value: &[u8], len: usize) -> Vec<u8> {
    let mut out = value.to_vec();
    out.truncate(len);
    out.resize(len, 0);
    out
}

/// Encode a string as ASCII (non-ASCII replaced) in a fixed-width field.
fn ascii_field(value: &str, len: usize) -> Vec<u8> {
    let raw: Vec<u8> = value
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect();
    pad_bytes(&raw, len)
}

/// Decode a fixed-width field, trimming at the first NUL and surrounding
/// whitespace. Empty fields become `None`.
fn trimmed_string(raw: &[u8]) -> Option<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let s = String::from_utf8_lossy(&raw[..end]).trim().to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unpack_pack_round_trips() {
        let mut data = vec![0u8; FIXED_SIZE];
        data[0..4].copy_from_slice(b"Desc");
        data[256..260].copy_from_slice(b"JDOE");
        data[346..348].copy_from_slice(&2u16.to_le_bytes());
        data[348] = 0xAB; // first UMID byte
        data.extend_from_slice(b"A=PCM,F=48000");

        let fields = BextFields::unpack(&data);
        assert_eq!(fields.version, 2);
        assert_eq!(fields.umid[0], 0xAB);
        assert_eq!(fields.pack(), data);
    }

    #[test]
    fn short_payload_zero_extended() {
        let data = b"Short description".to_vec();
        let fields = BextFields::unpack(&data);
        assert_eq!(fields.to_info().description.as_deref(), Some("Short description"));
        assert_eq!(fields.pack().len(), FIXED_SIZE);
    }

    #[test]
    fn patch_touches_only_description_and_originator() {
        let mut data = vec![0u8; FIXED_SIZE];
        data[320..330].copy_from_slice(b"2020-01-02");
        data[338..346].copy_from_slice(&12345u64.to_le_bytes());
        let mut fields = BextFields::unpack(&data);

        fields.patch(Some("New description"), Some("ACME"));
        let packed = fields.pack();
        assert!(packed[0..15].eq(b"New description"));
        assert!(packed[256..260].eq(b"ACME"));
        // Untouched fields keep their bytes
        assert_eq!(&packed[320..330], b"2020-01-02");
        assert_eq!(u64::from_le_bytes(packed[338..346].try_into().unwrap()), 12345);
    }

    #[test]
    fn default_bext_is_version_1_with_stamp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let fields = BextFields::new_default(Some("Door"), None, now);
        assert_eq!(fields.version, 1);
        assert_eq!(&fields.origination_date, b"2026-03-14");
        assert_eq!(&fields.origination_time, b"09:26:53");
        assert_eq!(fields.pack().len(), FIXED_SIZE);
        let info = fields.to_info();
        assert_eq!(info.description.as_deref(), Some("Door"));
        assert_eq!(info.originator, None);
    }

    #[test]
    fn oversize_values_truncate_to_field_width() {
        let long = "x".repeat(300);
        let fields = BextFields::new_default(Some(&long), Some(&long), Utc::now());
        assert_eq!(fields.description.len(), DESCRIPTION_SIZE);
        assert_eq!(fields.originator.len(), ORIGINATOR_SIZE);
    }
}
