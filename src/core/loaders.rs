//! Data loaders for motion-capture XML exports.
//!
//! This module provides parsers for:
//! - Session descriptors (`session.xml`, UTF-16 by default) flattened into a
//!   two-column field/value table
//! - Generic exports (`timeseries.xml`, `metrics_per_trial.xml`, ...) with the
//!   `owner/type/folder/name/component` layout, flattened into tidy records

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use log::{debug, warn};
use roxmltree::{Document, Node};
use serde::Serialize;
use thiserror::Error;

use crate::config::{PipelineConfig, SessionConfig, TraversalMode};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed XML in {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Unknown text encoding label: {0}")]
    UnknownEncoding(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// One `<component>` element flattened together with its ancestors' values.
///
/// Attribute values are kept verbatim; an attribute missing from the
/// document is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TidyRecord {
    pub owner: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub folder: Option<String>,
    pub name: Option<String>,
    pub component_value: Option<String>,
    #[serde(rename = "Event_Sequence")]
    pub event_sequence: Option<String>,
    #[serde(rename = "Frame_Start")]
    pub frame_start: Option<String>,
    #[serde(rename = "Frame_End")]
    pub frame_end: Option<String>,
    #[serde(rename = "Time_Start")]
    pub time_start: Option<String>,
    #[serde(rename = "Time_End")]
    pub time_end: Option<String>,
    pub frames: Option<String>,
    pub data: Option<String>,
}

impl TidyRecord {
    /// Short human-readable label used in error messages and logs.
    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}/{}[{}]",
            self.owner.as_deref().unwrap_or("?"),
            self.kind.as_deref().unwrap_or("?"),
            self.folder.as_deref().unwrap_or("?"),
            self.name.as_deref().unwrap_or("?"),
            self.component_value.as_deref().unwrap_or("?"),
        )
    }
}

/// Records of a generic export in document order.
#[derive(Debug, Clone, Default)]
pub struct TidyTable {
    pub records: Vec<TidyRecord>,
    /// Source file path.
    pub source_path: Option<PathBuf>,
}

impl TidyTable {
    /// Returns the number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the table has no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TidyRecord> {
        self.records.iter()
    }
}

/// One row of a session table: original field name and its first value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionField {
    #[serde(rename = "index")]
    pub field: String,
    pub data: Option<String>,
}

/// Flattened session descriptor, one row per distinct field name.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    pub fields: Vec<SessionField>,
    pub source_path: Option<PathBuf>,
}

impl SessionTable {
    /// Look up the value of a field by its original name.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.field == field)
            .and_then(|f| f.data.as_deref())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SessionField> {
        self.fields.iter()
    }
}

/// Result of parsing an export file.
#[derive(Debug, Clone)]
pub enum XmlTable {
    Session(SessionTable),
    Tidy(TidyTable),
}

impl XmlTable {
    pub fn into_tidy(self) -> Option<TidyTable> {
        match self {
            XmlTable::Tidy(table) => Some(table),
            XmlTable::Session(_) => None,
        }
    }

    pub fn into_session(self) -> Option<SessionTable> {
        match self {
            XmlTable::Session(table) => Some(table),
            XmlTable::Tidy(_) => None,
        }
    }

    /// Number of rows regardless of the table kind.
    pub fn len(&self) -> usize {
        match self {
            XmlTable::Session(table) => table.len(),
            XmlTable::Tidy(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read a file and decode it to text.
///
/// `label` is a WHATWG encoding label. A byte-order mark in the file
/// overrides it.
pub fn read_text<P: AsRef<Path>>(path: P, label: &str) -> Result<String> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| LoaderError::UnknownEncoding(label.to_string()))?;

    let bytes = fs::read(path.as_ref())?;
    let (text, used, had_errors) = encoding.decode(&bytes);
    if had_errors {
        warn!(
            "{} contained byte sequences invalid in {}, replaced",
            path.as_ref().display(),
            used.name()
        );
    }

    Ok(text.into_owned())
}

/// Parse an export file into a table.
///
/// Files whose name contains the configured session suffix are read as
/// session descriptors; anything else is read as a generic export.
pub fn parse_xml<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<XmlTable> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if file_name.contains(config.scan.session_suffix.as_str()) {
        debug!("Parsing session descriptor: {}", path.display());
        parse_session_xml(path, &config.session).map(XmlTable::Session)
    } else {
        debug!("Parsing generic export: {}", path.display());
        parse_tidy_xml(path, config.extraction.traversal).map(XmlTable::Tidy)
    }
}

/// Parse a session descriptor into a field/value table.
///
/// The subject row is taken from the root's first child element only.
/// Sibling sections such as `Session` contribute through the selectors, not
/// as empty subject columns.
pub fn parse_session_xml<P: AsRef<Path>>(path: P, config: &SessionConfig) -> Result<SessionTable> {
    let path = path.as_ref();
    let text = read_text(path, &config.encoding)?;
    let doc = Document::parse(&text).map_err(|source| LoaderError::Xml {
        path: path.to_path_buf(),
        source,
    })?;
    let root = doc.root_element();

    let mut columns: Vec<(String, Option<String>)> = Vec::new();

    // Subject row: first child element of the document root
    match root.children().find(|n| n.is_element()) {
        Some(node) => columns.extend(row_columns(node)),
        None => warn!("{}: root element has no children", path.display()),
    }

    for selector in &config.selectors {
        match select_first(root, selector) {
            Some(node) => columns.extend(row_columns(node)),
            None => warn!("{}: no element matches {}", path.display(), selector),
        }
    }

    let mut seen = HashSet::new();
    let fields = columns
        .into_iter()
        .filter(|(name, _)| seen.insert(name.clone()))
        .map(|(field, data)| SessionField { field, data })
        .collect();

    Ok(SessionTable {
        fields,
        source_path: Some(path.to_path_buf()),
    })
}

/// Parse a generic export into tidy records.
pub fn parse_tidy_xml<P: AsRef<Path>>(path: P, traversal: TraversalMode) -> Result<TidyTable> {
    let path = path.as_ref();
    let text = read_text(path, "utf-8")?;
    let doc = Document::parse(&text).map_err(|source| LoaderError::Xml {
        path: path.to_path_buf(),
        source,
    })?;

    let records = tidy_records(&doc, traversal);
    debug!("{}: {} component records", path.display(), records.len());

    Ok(TidyTable {
        records,
        source_path: Some(path.to_path_buf()),
    })
}

/// Flatten `owner/type/folder/name/component` elements of a document.
pub fn tidy_records(doc: &Document, traversal: TraversalMode) -> Vec<TidyRecord> {
    let root = doc.root_element();
    let mut records = Vec::new();

    for owner in descendants_named(root, "owner") {
        let kinds = match traversal {
            TraversalMode::Nested => descendants_named(owner, "type"),
            TraversalMode::CrossProduct => descendants_named(root, "type"),
        };

        for kind in kinds {
            let folders = match traversal {
                TraversalMode::Nested => descendants_named(kind, "folder"),
                TraversalMode::CrossProduct => descendants_named(root, "folder"),
            };

            for folder in folders {
                for name in children_named(folder, "name") {
                    for component in children_named(name, "component") {
                        records.push(TidyRecord {
                            owner: owner.attribute("value").map(str::to_string),
                            kind: kind.attribute("value").map(str::to_string),
                            folder: folder.attribute("value").map(str::to_string),
                            name: name.attribute("value").map(str::to_string),
                            component_value: attr(component, "value"),
                            event_sequence: attr(component, "Event_Sequence"),
                            frame_start: attr(component, "Frame_Start"),
                            frame_end: attr(component, "Frame_End"),
                            time_start: attr(component, "Time_Start"),
                            time_end: attr(component, "Time_End"),
                            frames: attr(component, "frames"),
                            data: attr(component, "data"),
                        });
                    }
                }
            }
        }
    }

    records
}

fn attr(node: Node, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

/// Element descendants of `node` (excluding `node`) with the given tag.
fn descendants_named<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Vec<Node<'a, 'input>> {
    node.descendants()
        .skip(1)
        .filter(|n| n.is_element() && n.has_tag_name(tag))
        .collect()
}

/// Direct element children of `node` with the given tag.
fn children_named<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Vec<Node<'a, 'input>> {
    node.children()
        .filter(|n| n.is_element() && n.has_tag_name(tag))
        .collect()
}

/// First element matching a slash-separated path.
///
/// The first segment matches any descendant of `root`, each following
/// segment a direct child of the previous match. Leading `.` and `//`
/// are accepted and ignored.
fn select_first<'a, 'input>(root: Node<'a, 'input>, path: &str) -> Option<Node<'a, 'input>> {
    let mut segments = path
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != ".");

    let first = segments.next()?;
    let mut current = descendants_named(root, first);
    for segment in segments {
        current = current
            .into_iter()
            .flat_map(|n| children_named(n, segment))
            .collect();
    }

    current.into_iter().next()
}

/// Columns contributed by a single row element: attributes, own text,
/// then child element texts.
fn row_columns(node: Node) -> Vec<(String, Option<String>)> {
    let mut columns: Vec<(String, Option<String>)> = node
        .attributes()
        .map(|a| (a.name().to_string(), Some(a.value().to_string())))
        .collect();

    if let Some(text) = non_blank(node.text()) {
        columns.push((node.tag_name().name().to_string(), Some(text)));
    }

    for child in node.children().filter(|n| n.is_element()) {
        columns.push((
            child.tag_name().name().to_string(),
            non_blank(child.text()),
        ));
    }

    columns
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const TIMESERIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<v3d>
  <owner value="Gait_01.c3d">
    <type value="DERIVED">
      <folder value="PROCESSED">
        <name value="Left Knee Angles">
          <component value="X" frames="3" data="1.0,2.0,3.0"/>
          <component value="Y" frames="3" data="4.0,nodata,6.0"/>
        </name>
      </folder>
    </type>
  </owner>
  <owner value="Static_01.c3d">
    <type value="LINK_MODEL_BASED">
      <folder value="ORIGINAL">
        <name value="Right Knee Angles">
          <component value="X" Frame_Start="10" data="7.0,8.0,9.0"/>
        </name>
      </folder>
    </type>
  </owner>
</v3d>"#;

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    const SESSION: &str = r#"<?xml version="1.0" encoding="UTF-16"?>
<Subject>
  <Fields>
    <Name>Jane Doe</Name>
    <Height>172</Height>
    <Notes>  </Notes>
  </Fields>
  <Session>
    <Fields>
      <Name>Walking</Name>
      <Date>2024-03-01</Date>
    </Fields>
    <Subsession>
      <Fields Leg="Left">
        <Speed>1.2</Speed>
      </Fields>
      <Measurement>
        <Fields>
          <Trial>Gait_01</Trial>
          <Date>2024-03-02</Date>
        </Fields>
      </Measurement>
    </Subsession>
  </Session>
</Subject>"#;

    #[test]
    fn test_nested_traversal_keeps_only_real_paths() {
        let doc = Document::parse(TIMESERIES).unwrap();
        let records = tidy_records(&doc, TraversalMode::Nested);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].owner.as_deref(), Some("Gait_01.c3d"));
        assert_eq!(records[0].kind.as_deref(), Some("DERIVED"));
        assert_eq!(records[0].name.as_deref(), Some("Left Knee Angles"));
        assert_eq!(records[0].component_value.as_deref(), Some("X"));
        assert_eq!(records[1].data.as_deref(), Some("4.0,nodata,6.0"));
        assert_eq!(records[2].owner.as_deref(), Some("Static_01.c3d"));
        assert_eq!(records[2].frame_start.as_deref(), Some("10"));
        assert_eq!(records[2].frames, None);
    }

    #[test]
    fn test_cross_product_traversal() {
        let doc = Document::parse(TIMESERIES).unwrap();
        let records = tidy_records(&doc, TraversalMode::CrossProduct);

        // 2 owners x 2 types x (2 + 1 components under the two folders)
        assert_eq!(records.len(), 12);
        assert!(records.iter().any(|r| {
            r.owner.as_deref() == Some("Static_01.c3d")
                && r.kind.as_deref() == Some("DERIVED")
                && r.name.as_deref() == Some("Left Knee Angles")
        }));
    }

    #[test]
    fn test_parse_tidy_xml_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", TIMESERIES).unwrap();
        file.flush().unwrap();

        let table = parse_tidy_xml(file.path(), TraversalMode::Nested).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.source_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "<v3d><owner value=\"x\"></v3d>").unwrap();
        file.flush().unwrap();

        let result = parse_tidy_xml(file.path(), TraversalMode::Nested);
        assert!(matches!(result, Err(LoaderError::Xml { .. })));
    }

    #[test]
    fn test_parse_session_xml_utf16() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.xml");
        fs::write(&path, utf16le_with_bom(SESSION)).unwrap();

        let table = parse_session_xml(&path, &SessionConfig::default()).unwrap();

        let names: Vec<&str> = table.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(
            names,
            vec!["Name", "Height", "Notes", "Date", "Leg", "Speed", "Trial"]
        );
        // Duplicates keep the first occurrence
        assert_eq!(table.get("Name"), Some("Jane Doe"));
        assert_eq!(table.get("Date"), Some("2024-03-01"));
        assert_eq!(table.get("Leg"), Some("Left"));
        assert_eq!(table.get("Notes"), None);
        assert_eq!(table.get("Trial"), Some("Gait_01"));
        // Sibling sections of the subject row are not columns
        assert!(!table.iter().any(|f| f.field == "Session" || f.field == "Fields"));
    }

    #[test]
    fn test_parse_session_missing_section_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.xml");
        let text = r#"<Subject><Fields><Name>A</Name></Fields></Subject>"#;
        fs::write(&path, utf16le_with_bom(text)).unwrap();

        let table = parse_session_xml(&path, &SessionConfig::default()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("Name"), Some("A"));
    }

    #[test]
    fn test_parse_xml_dispatches_on_file_name() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::default();

        let session_path = dir.path().join("2024_session.xml");
        fs::write(&session_path, utf16le_with_bom(SESSION)).unwrap();
        let timeseries_path = dir.path().join("trial_timeseries.xml");
        fs::write(&timeseries_path, TIMESERIES).unwrap();

        assert!(matches!(
            parse_xml(&session_path, &config).unwrap(),
            XmlTable::Session(_)
        ));
        let table = parse_xml(&timeseries_path, &config).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.into_tidy().is_some());
    }

    #[test]
    fn test_unknown_encoding_label() {
        let file = NamedTempFile::new().unwrap();
        let result = read_text(file.path(), "klingon-8");
        assert!(matches!(result, Err(LoaderError::UnknownEncoding(_))));
    }

    #[test]
    fn test_select_first_path() {
        let doc = Document::parse(SESSION).unwrap();
        let root = doc.root_element();

        let node = select_first(root, ".//Measurement/Fields").unwrap();
        assert!(node.children().any(|c| c.has_tag_name("Trial")));
        assert!(select_first(root, "Missing/Fields").is_none());
    }

    #[test]
    fn test_record_label() {
        let record = TidyRecord {
            owner: Some("Gait".into()),
            name: Some("Knee".into()),
            ..Default::default()
        };
        assert_eq!(record.label(), "Gait/?/?/Knee[?]");
    }
}
