//! Label Reader
//!
//! Read-only access to the hierarchical key/value labels the toolkit writes
//! into cubes and report files. Lookup is by key name, first match,
//! depth-first: a section's own entries are checked before any nested section.

mod parser;

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Upper bound on bytes read while looking for the end of an attached label
const MAX_LABEL_BYTES: usize = 64 * 1024 * 1024;

/// Label read/parse errors
#[derive(Debug, Error)]
pub enum LabelError {
    /// Label file could not be read
    #[error("I/O error reading label: {0}")]
    Io(#[from] std::io::Error),

    /// Label text is malformed
    #[error("Label parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Required key is absent
    #[error("Keyword not found in label: {0}")]
    Missing(String),
}

/// Scalar or compound label value
#[derive(Debug, Clone, PartialEq)]
pub enum LabelValue {
    Integer(i64),
    Real(f64),
    Text(String),
    /// Value with a units annotation, e.g. `1.5 <km>`
    Units {
        value: Box<LabelValue>,
        units: String,
    },
    /// `( … )` sequence or `{ … }` set
    Sequence(Vec<LabelValue>),
}

impl LabelValue {
    /// The value with any units wrapper removed
    pub fn strip_units(&self) -> &LabelValue {
        match self {
            LabelValue::Units { value, .. } => value.strip_units(),
            other => other,
        }
    }

    /// Numeric view (units are ignored, numeric text is parsed)
    pub fn as_f64(&self) -> Option<f64> {
        match self.strip_units() {
            LabelValue::Integer(i) => Some(*i as f64),
            LabelValue::Real(r) => Some(*r),
            LabelValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.strip_units() {
            LabelValue::Integer(i) => Some(*i),
            LabelValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Elements when the value (ignoring units) is a sequence
    pub fn as_sequence(&self) -> Option<&[LabelValue]> {
        match self.strip_units() {
            LabelValue::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Integer(i) => write!(f, "{}", i),
            LabelValue::Real(r) => write!(f, "{:?}", r),
            LabelValue::Text(s) => f.write_str(s),
            LabelValue::Units { value, units } => write!(f, "{} <{}>", value, units),
            LabelValue::Sequence(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Entry in a label: a value or a nested `Object`/`Group` section
#[derive(Debug, Clone, PartialEq)]
pub enum LabelNode {
    Value(LabelValue),
    Section(Label),
}

impl LabelNode {
    pub fn as_value(&self) -> Option<&LabelValue> {
        match self {
            LabelNode::Value(v) => Some(v),
            LabelNode::Section(_) => None,
        }
    }

    pub fn as_section(&self) -> Option<&Label> {
        match self {
            LabelNode::Section(s) => Some(s),
            LabelNode::Value(_) => None,
        }
    }
}

/// Ordered key/value tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Label {
    entries: Vec<(String, LabelNode)>,
}

impl Label {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, key: String, node: LabelNode) {
        self.entries.push((key, node));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &LabelNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse label text
    pub fn parse(text: &str) -> Result<Self, LabelError> {
        parser::parse(text)
    }

    /// Read and parse a label file (attached cube label or detached report)
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let text = read_label_text(path)?;
        Self::parse(&text)
    }

    /// Read a report label, retrying once on sanitized text when it fails to parse
    ///
    /// Report programs occasionally emit unquoted values containing `;` or `&`
    /// and wrap long values with a trailing hyphen.
    pub fn load_lenient(path: &Path) -> Result<Self, LabelError> {
        let text = read_label_text(path)?;
        match Self::parse(&text) {
            Ok(label) => Ok(label),
            Err(first) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %first,
                    "Label failed to parse, retrying with sanitized text"
                );
                Self::parse(&sanitize(&text))
            }
        }
    }

    /// Direct child lookup (first entry with this key)
    pub fn get(&self, key: &str) -> Option<&LabelNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First-match depth-first lookup by key name
    pub fn find(&self, key: &str) -> Option<&LabelNode> {
        if let Some(node) = self.get(key) {
            return Some(node);
        }
        self.entries.iter().find_map(|(_, node)| match node {
            LabelNode::Section(section) => section.find(key),
            LabelNode::Value(_) => None,
        })
    }

    /// Value found by [`Label::find`], if the match is a value
    pub fn find_value(&self, key: &str) -> Option<&LabelValue> {
        self.find(key).and_then(LabelNode::as_value)
    }

    /// Exact descent through nested sections
    pub fn get_path(&self, path: &[&str]) -> Option<&LabelNode> {
        let (last, parents) = path.split_last()?;
        let mut section = self;
        for key in parents {
            section = section.get(key)?.as_section()?;
        }
        section.get(last)
    }

    pub fn value_at(&self, path: &[&str]) -> Option<&LabelValue> {
        self.get_path(path).and_then(LabelNode::as_value)
    }

    /// Catalog-style lookup: `Key` or `Section/Sub/Key`
    ///
    /// The first segment is found depth-first, the rest by exact descent.
    pub fn lookup(&self, path: &str) -> Option<&LabelNode> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let mut node = self.find(segments.next()?)?;
        for segment in segments {
            node = node.as_section()?.get(segment)?;
        }
        Some(node)
    }
}

/// Read label text up to and including the top-level `End` line
///
/// Attached labels are followed by binary cube data, so reading stops at `End`
/// and invalid UTF-8 is replaced rather than rejected.
fn read_label_text(path: &Path) -> Result<String, LabelError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut text = String::new();
    let mut line = Vec::new();
    let mut total = 0usize;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }
        total += read;

        let decoded = String::from_utf8_lossy(&line);
        text.push_str(&decoded);
        if decoded.trim().eq_ignore_ascii_case("end") || total >= MAX_LABEL_BYTES {
            break;
        }
    }

    Ok(text)
}

/// Hyphen line-continuation inside a long report value
static HYPHEN_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\s+").expect("Invalid hyphen break regex"));

fn sanitize(text: &str) -> String {
    let replaced = text.replace([';', '&'], "-");
    HYPHEN_BREAK.replace_all(&replaced, "").into_owned()
}
