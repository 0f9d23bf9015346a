//! iXML chunk codec — round-trip-safe merge of the `<USER>` and `<ASWG>`
//! blocks inside a `<BWFXML>` document.
//!
//! USER tags (ALL CAPS, Soundminer/BaseHead convention) are authoritative;
//! ASWG tags (camelCase) are secondary. Top-level elements outside the two
//! managed blocks pass through the tree untouched.

use nomen_common::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;

pub const IXML_VERSION: &str = "1.61";
pub const EMBEDDER_NAME: &str = "NomenAudio";
pub const ROOT_TAG: &str = "BWFXML";

/// Metadata field → USER tag (ALL CAPS).
pub const USER_FIELD_MAP: &[(&str, &str)] = &[
    ("category", "CATEGORY"),
    ("subcategory", "SUBCATEGORY"),
    ("cat_id", "CATID"),
    ("category_full", "CATEGORYFULL"),
    ("fx_name", "FXNAME"),
    ("description", "DESCRIPTION"),
    ("keywords", "KEYWORDS"),
    ("notes", "NOTES"),
    ("designer", "DESIGNER"),
    ("library", "LIBRARY"),
    ("user_category", "USERCATEGORY"),
    ("microphone", "MICROPHONE"),
    ("mic_perspective", "MICPERSPECTIVE"),
    ("rec_medium", "RECMEDIUM"),
    ("release_date", "RELEASEDATE"),
    ("rating", "RATING"),
    ("manufacturer", "MANUFACTURER"),
    ("rec_type", "RECTYPE"),
    ("creator_id", "CREATORID"),
    ("source_id", "SOURCEID"),
];

/// Metadata field → ASWG tag (camelCase).
pub const ASWG_FIELD_MAP: &[(&str, &str)] = &[
    ("category", "category"),
    ("subcategory", "subCategory"),
    ("cat_id", "catId"),
    ("user_category", "userCategory"),
    ("fx_name", "fxName"),
    ("library", "library"),
    ("notes", "notes"),
    ("project", "project"),
    ("microphone", "micType"),
    ("is_designed", "isDesigned"),
    ("manufacturer", "manufacturer"),
    ("rec_type", "recType"),
    ("creator_id", "creatorId"),
    ("source_id", "sourceId"),
];

/// ASWG tags sourced from a differently named metadata field.
const ASWG_EXTRA_MAP: &[(&str, &str)] = &[("originator", "designer")];

/// Built-in USER tag names; custom field tags must not collide with these.
pub const BUILTIN_USER_TAGS: &[&str] = &[
    "CATEGORY",
    "SUBCATEGORY",
    "CATID",
    "CATEGORYFULL",
    "FXNAME",
    "DESCRIPTION",
    "KEYWORDS",
    "NOTES",
    "DESIGNER",
    "LIBRARY",
    "USERCATEGORY",
    "MICROPHONE",
    "MICPERSPECTIVE",
    "RECMEDIUM",
    "RELEASEDATE",
    "RATING",
    "MANUFACTURER",
    "RECTYPE",
    "CREATORID",
    "SOURCEID",
    "EMBEDDER",
];

const CUSTOM_TAG_MAX_LEN: usize = 32;

/// Validate a custom USER tag: `[A-Z0-9_]+`, at most 32 chars, disjoint
/// from the built-in tag set.
pub fn validate_custom_tag(tag: &str) -> Result<()> {
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(Error::Validation(format!(
            "Invalid custom field tag '{}': must match [A-Z0-9_]+",
            tag
        )));
    }
    if tag.len() > CUSTOM_TAG_MAX_LEN {
        return Err(Error::Validation(format!(
            "Custom field tag '{}' too long ({} chars, max {})",
            tag,
            tag.len(),
            CUSTOM_TAG_MAX_LEN
        )));
    }
    if BUILTIN_USER_TAGS.contains(&tag) {
        return Err(Error::Validation(format!(
            "Custom field tag '{}' clashes with a built-in USER tag",
            tag
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

/// Minimal order-preserving XML element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Find-or-create a direct child; new children append at the end.
    pub fn child_mut(&mut self, name: &str) -> &mut XmlElement {
        if let Some(idx) = self.children.iter().position(|c| c.name == name) {
            &mut self.children[idx]
        } else {
            self.children.push(XmlElement::new(name));
            self.children.last_mut().unwrap()
        }
    }

    /// Set a child's text, creating the element if absent. Existing
    /// siblings keep their document order.
    pub fn set_child_text(&mut self, name: &str, text: &str) {
        self.child_mut(name).text = text.to_string();
    }
}

/// Decode iXML chunk bytes: UTF-16 BOM, then UTF-8, then Latin-1 fallback.
pub fn decode_ixml_bytes(raw: &[u8]) -> String {
    if raw.len() >= 2 && raw[0] == 0xFF && raw[1] == 0xFE {
        let units: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if raw.len() >= 2 && raw[0] == 0xFE && raw[1] == 0xFF {
        let units: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => {
            tracing::warn!("iXML chunk is not valid UTF-8, falling back to Latin-1");
            raw.iter().map(|&b| b as char).collect()
        }
    }
}

/// Parse iXML chunk bytes into an element tree. Returns `None` when the
/// document is unparseable or not rooted at `<BWFXML>`.
pub fn parse_ixml(raw: &[u8]) -> Option<XmlElement> {
    let text = decode_ixml_bytes(raw);
    let text = text.trim_end_matches('\0').trim();

    let mut reader = Reader::from_str(text);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                stack.push(XmlElement::new(name));
            }
            Ok(Event::Empty(start)) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                let element = XmlElement::new(name);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Ok(Event::Text(text_event)) => {
                if let (Ok(value), Some(current)) = (text_event.unescape(), stack.last_mut()) {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        current.text.push_str(trimmed);
                    }
                }
            }
            Ok(Event::CData(cdata)) => {
                if let Some(current) = stack.last_mut() {
                    let raw = cdata.into_inner();
                    current.text.push_str(String::from_utf8_lossy(&raw).trim());
                }
            }
            Ok(Event::End(_)) => {
                let element = stack.pop()?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => {
                        root = Some(element);
                        break;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "Failed to parse iXML source");
                return None;
            }
        }
    }

    let root = root?;
    if root.name != ROOT_TAG {
        tracing::warn!(root = %root.name, "iXML root is not BWFXML, discarding");
        return None;
    }
    Some(root)
}

/// Serialize an element tree to UTF-8 bytes with an XML declaration and
/// two-space indentation.
pub fn serialize_ixml(root: &XmlElement) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| Error::Internal(format!("iXML serialization failed: {}", e)))?;
    write_element(&mut writer, root)?;
    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    fn map_err(e: impl std::fmt::Display) -> Error {
        Error::Internal(format!("iXML serialization failed: {}", e))
    }

    if element.children.is_empty() && element.text.is_empty() {
        writer
            .write_event(Event::Empty(BytesStart::new(element.name.as_str())))
            .map_err(map_err)?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(BytesStart::new(element.name.as_str())))
        .map_err(map_err)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(element.text.as_str())))
            .map_err(map_err)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(map_err)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Field extraction (read path)
// ---------------------------------------------------------------------------

/// Extract metadata fields from an iXML tree. ASWG values load first,
/// then USER values overwrite them (USER is authoritative). Unknown USER
/// children become custom fields keyed by their raw tag name.
pub fn extract_fields(root: &XmlElement) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut custom: BTreeMap<String, String> = BTreeMap::new();

    if let Some(aswg) = root.find("ASWG") {
        for (aswg_tag, field) in ASWG_EXTRA_MAP {
            if let Some(el) = aswg.find(aswg_tag) {
                if !el.text.is_empty() {
                    fields.insert(field.to_string(), el.text.clone());
                }
            }
        }
        for (field, tag) in ASWG_FIELD_MAP {
            if let Some(el) = aswg.find(tag) {
                if !el.text.is_empty() {
                    fields.insert(field.to_string(), el.text.clone());
                }
            }
        }
    }

    if let Some(user) = root.find("USER") {
        for (field, tag) in USER_FIELD_MAP {
            if let Some(el) = user.find(tag) {
                if !el.text.is_empty() {
                    fields.insert(field.to_string(), el.text.clone());
                }
            }
        }
        for child in &user.children {
            if !BUILTIN_USER_TAGS.contains(&child.name.as_str()) && !child.text.is_empty() {
                custom.insert(child.name.clone(), child.text.clone());
            }
        }
    }

    (fields, custom)
}

// ---------------------------------------------------------------------------
// Merge (write path)
// ---------------------------------------------------------------------------

/// Merge the write set into an existing iXML document (or build a fresh
/// one) and return the serialized UTF-8 bytes.
///
/// Custom field tags must be pre-validated with [`validate_custom_tag`].
pub fn merge_document(
    existing: Option<&[u8]>,
    fields: &BTreeMap<String, String>,
    custom_fields: &BTreeMap<String, String>,
) -> Result<Vec<u8>> {
    let mut root = existing.and_then(parse_ixml).unwrap_or_else(new_document);

    apply_user_block(&mut root, fields, custom_fields);
    apply_aswg_block(&mut root, fields);

    serialize_ixml(&root)
}

fn new_document() -> XmlElement {
    let mut root = XmlElement::new(ROOT_TAG);
    root.children
        .push(XmlElement::with_text("IXML_VERSION", IXML_VERSION));
    root
}

fn apply_user_block(
    root: &mut XmlElement,
    fields: &BTreeMap<String, String>,
    custom_fields: &BTreeMap<String, String>,
) {
    let user = root.child_mut("USER");
    for (field, tag) in USER_FIELD_MAP {
        if let Some(value) = fields.get(*field) {
            user.set_child_text(tag, value);
        }
    }
    user.set_child_text("EMBEDDER", EMBEDDER_NAME);
    for (tag, value) in custom_fields {
        if !BUILTIN_USER_TAGS.contains(&tag.as_str()) {
            user.set_child_text(tag, value);
        }
    }
}

fn apply_aswg_block(root: &mut XmlElement, fields: &BTreeMap<String, String>) {
    let aswg = root.child_mut("ASWG");
    for (field, tag) in ASWG_FIELD_MAP {
        if let Some(value) = fields.get(*field) {
            aswg.set_child_text(tag, value);
        }
    }
    for (aswg_tag, field) in ASWG_EXTRA_MAP {
        if let Some(value) = fields.get(*field) {
            aswg.set_child_text(aswg_tag, value);
        }
    }
    aswg.set_child_text("contentType", "sfx");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_and_extracts_user_over_aswg() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<BWFXML>
  <ASWG><category>WIND</category><fxName>Gale</fxName></ASWG>
  <USER><CATEGORY>DOORS</CATEGORY></USER>
</BWFXML>"#;
        let root = parse_ixml(xml).unwrap();
        let (fields, custom) = extract_fields(&root);
        assert_eq!(fields["category"], "DOORS");
        assert_eq!(fields["fx_name"], "Gale");
        assert!(custom.is_empty());
    }

    #[test]
    fn aswg_originator_maps_to_designer_until_user_overrides() {
        let xml = br#"<BWFXML><ASWG><originator>ACME</originator></ASWG></BWFXML>"#;
        let root = parse_ixml(xml).unwrap();
        let (fields, _) = extract_fields(&root);
        assert_eq!(fields["designer"], "ACME");

        let xml = br#"<BWFXML>
  <ASWG><originator>ACME</originator></ASWG>
  <USER><DESIGNER>JDOE</DESIGNER></USER>
</BWFXML>"#;
        let root = parse_ixml(xml).unwrap();
        let (fields, _) = extract_fields(&root);
        assert_eq!(fields["designer"], "JDOE");
    }

    #[test]
    fn unknown_user_tags_become_custom_fields() {
        let xml = br#"<BWFXML><USER>
  <FXNAME>Door</FXNAME>
  <PROJECTCODE>X42</PROJECTCODE>
  <EMBEDDER>SomeTool</EMBEDDER>
</USER></BWFXML>"#;
        let root = parse_ixml(xml).unwrap();
        let (fields, custom) = extract_fields(&root);
        assert_eq!(fields["fx_name"], "Door");
        assert_eq!(custom.len(), 1);
        assert_eq!(custom["PROJECTCODE"], "X42");
    }

    #[test]
    fn merge_synchronizes_user_and_aswg() {
        let xml = br#"<BWFXML>
  <ASWG><category>WIND</category></ASWG>
  <USER><CATEGORY>DOORS</CATEGORY></USER>
</BWFXML>"#;
        let merged = merge_document(
            Some(xml.as_slice()),
            &write_map(&[("category", "DOORS")]),
            &BTreeMap::new(),
        )
        .unwrap();
        let root = parse_ixml(&merged).unwrap();
        assert_eq!(root.find("USER").unwrap().find("CATEGORY").unwrap().text, "DOORS");
        assert_eq!(root.find("ASWG").unwrap().find("category").unwrap().text, "DOORS");
        assert_eq!(
            root.find("USER").unwrap().find("EMBEDDER").unwrap().text,
            EMBEDDER_NAME
        );
        assert_eq!(
            root.find("ASWG").unwrap().find("contentType").unwrap().text,
            "sfx"
        );
    }

    #[test]
    fn merge_preserves_foreign_top_level_elements() {
        let xml = br#"<BWFXML>
  <IXML_VERSION>1.52</IXML_VERSION>
  <PROJECT>Big Game</PROJECT>
  <STEINBERG><ATTR><NAME>MediaComment</NAME></ATTR></STEINBERG>
  <USER><NOTES>keep me</NOTES></USER>
</BWFXML>"#;
        let merged = merge_document(
            Some(xml.as_slice()),
            &write_map(&[("fx_name", "Door Slam")]),
            &BTreeMap::new(),
        )
        .unwrap();
        let root = parse_ixml(&merged).unwrap();
        assert_eq!(root.find("PROJECT").unwrap().text, "Big Game");
        assert_eq!(root.find("IXML_VERSION").unwrap().text, "1.52");
        let steinberg = root.find("STEINBERG").unwrap();
        assert_eq!(
            steinberg.find("ATTR").unwrap().find("NAME").unwrap().text,
            "MediaComment"
        );
        // Untouched USER children survive alongside the new field
        let user = root.find("USER").unwrap();
        assert_eq!(user.find("NOTES").unwrap().text, "keep me");
        assert_eq!(user.find("FXNAME").unwrap().text, "Door Slam");
        // Document order preserved: NOTES was first in the block
        assert_eq!(user.children[0].name, "NOTES");
    }

    #[test]
    fn merge_builds_fresh_document_when_absent_or_invalid() {
        for existing in [None, Some(b"not xml at all".as_slice()), Some(b"<WRONG/>".as_slice())] {
            let merged = merge_document(
                existing,
                &write_map(&[("cat_id", "DOORWood")]),
                &BTreeMap::new(),
            )
            .unwrap();
            let root = parse_ixml(&merged).unwrap();
            assert_eq!(root.find("IXML_VERSION").unwrap().text, IXML_VERSION);
            assert_eq!(root.find("USER").unwrap().find("CATID").unwrap().text, "DOORWood");
            assert_eq!(root.find("ASWG").unwrap().find("catId").unwrap().text, "DOORWood");
        }
    }

    #[test]
    fn custom_fields_round_trip_with_exact_tags() {
        let merged = merge_document(
            None,
            &BTreeMap::new(),
            &write_map(&[("PROJECTCODE", "X42"), ("MY_TAG_2", "v")]),
        )
        .unwrap();
        let root = parse_ixml(&merged).unwrap();
        let (_, custom) = extract_fields(&root);
        assert_eq!(custom["PROJECTCODE"], "X42");
        assert_eq!(custom["MY_TAG_2"], "v");
    }

    #[test]
    fn xml_escaping_round_trips() {
        let merged = merge_document(
            None,
            &write_map(&[("description", "Door <heavy> & \"old\"")]),
            &BTreeMap::new(),
        )
        .unwrap();
        let root = parse_ixml(&merged).unwrap();
        let (fields, _) = extract_fields(&root);
        assert_eq!(fields["description"], "Door <heavy> & \"old\"");
    }

    #[test]
    fn decodes_utf16_and_latin1_sources() {
        let source = "<BWFXML><USER><FXNAME>Tür</FXNAME></USER></BWFXML>";
        let mut utf16: Vec<u8> = vec![0xFF, 0xFE];
        for unit in source.encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        let root = parse_ixml(&utf16).unwrap();
        let (fields, _) = extract_fields(&root);
        assert_eq!(fields["fx_name"], "Tür");

        let latin1: Vec<u8> = source.chars().map(|c| c as u32 as u8).collect();
        let root = parse_ixml(&latin1).unwrap();
        let (fields, _) = extract_fields(&root);
        assert_eq!(fields["fx_name"], "Tür");
    }

    #[test]
    fn trailing_nuls_are_tolerated() {
        let mut xml = b"<BWFXML><USER><CATID>DOORWood</CATID></USER></BWFXML>".to_vec();
        xml.extend_from_slice(&[0, 0, 0]);
        let root = parse_ixml(&xml).unwrap();
        let (fields, _) = extract_fields(&root);
        assert_eq!(fields["cat_id"], "DOORWood");
    }

    #[test]
    fn custom_tag_validation() {
        assert!(validate_custom_tag("PROJECTCODE").is_ok());
        assert!(validate_custom_tag("TAG_2").is_ok());
        assert!(validate_custom_tag("lowercase").is_err());
        assert!(validate_custom_tag("").is_err());
        assert!(validate_custom_tag("HAS SPACE").is_err());
        assert!(validate_custom_tag(&"X".repeat(33)).is_err());
        assert!(validate_custom_tag("FXNAME").is_err());
        assert!(validate_custom_tag("EMBEDDER").is_err());
    }
}
