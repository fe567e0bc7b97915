//! Keyword Catalog and Metadata Extractor
//!
//! The catalog document maps semantic keyword names to a declared type and a
//! label path, grouped by `COMMON` plus one group per archive:
//!
//! ```json
//! {"instrument": {"COMMON": {"targetname": {"type": "string", "keyword": "TargetName"}},
//!                 "mro_ctx": {"spacecraftclock": {"type": "string", "keyword": "SpacecraftClockCount"}}}}
//! ```
//!
//! Each name must also exist in the `keywords` table, which supplies its
//! typeid per instrument. Catalogs are intentionally partial: a name with no
//! typeid row, or a label without the keyword, is skipped without complaint.

use crate::db::{reference, KeywordTypeRow, MetaValue};
use crate::error::{ProcessError, ProcessResult};
use crate::label::{Label, LabelNode, LabelValue};
use serde::Deserialize;
use sqlx::SqlitePool;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Catalog group holding keywords shared by every instrument
pub const COMMON_GROUP: &str = "COMMON";

/// Instrument id reserved for common keywords
pub const COMMON_INSTRUMENT_ID: i64 = 1;

/// Declared keyword type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordType {
    Time,
    String,
    Boolean,
    Double,
    Integer,
    Geometry,
}

impl FromStr for KeywordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" => Ok(KeywordType::Time),
            "string" => Ok(KeywordType::String),
            "boolean" => Ok(KeywordType::Boolean),
            "double" => Ok(KeywordType::Double),
            "integer" => Ok(KeywordType::Integer),
            "geometry" => Ok(KeywordType::Geometry),
            other => Err(format!("unknown keyword type '{}'", other)),
        }
    }
}

impl std::fmt::Display for KeywordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeywordType::Time => "time",
            KeywordType::String => "string",
            KeywordType::Boolean => "boolean",
            KeywordType::Double => "double",
            KeywordType::Integer => "integer",
            KeywordType::Geometry => "geometry",
        };
        f.write_str(name)
    }
}

/// Coerce a raw label value to its declared type
///
/// `double` and `integer` unwrap units; `boolean` is true only for a
/// case-insensitive `true`; the text types take the value as written.
pub fn coerce(kind: KeywordType, raw: &LabelValue) -> Result<MetaValue, String> {
    match kind {
        KeywordType::Double => raw
            .as_f64()
            .map(MetaValue::Double)
            .ok_or_else(|| format!("'{}' is not a number", raw)),
        KeywordType::Integer => raw
            .as_i64()
            .map(MetaValue::Integer)
            .ok_or_else(|| format!("'{}' is not an integer", raw)),
        KeywordType::Boolean => Ok(MetaValue::Boolean(
            raw.strip_units().to_string().eq_ignore_ascii_case("true"),
        )),
        KeywordType::Time => Ok(MetaValue::Time(raw.strip_units().to_string())),
        KeywordType::String => Ok(MetaValue::String(raw.to_string())),
        KeywordType::Geometry => Ok(MetaValue::Geometry(raw.to_string())),
    }
}

/// One catalog entry as written in the document
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub kind: String,
    /// Label path (`Key` or `Group/Key`)
    pub keyword: String,
}

/// Groups keep their keyword objects as raw maps so entry order survives
#[derive(Debug, Deserialize)]
struct CatalogDocument {
    instrument: HashMap<String, Map<String, Value>>,
}

/// A value ready to store
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedValue {
    pub typeid: i64,
    pub typename: String,
    pub kind: KeywordType,
    pub value: MetaValue,
}

/// Catalog document joined with the `keywords` table
///
/// Each group lists its entries in document order.
#[derive(Debug, Clone, Default)]
pub struct KeywordCatalog {
    groups: HashMap<String, Vec<(String, CatalogEntry)>>,
    typeids: HashMap<(String, i64), i64>,
}

impl KeywordCatalog {
    pub fn from_parts(document: &str, types: Vec<KeywordTypeRow>) -> ProcessResult<Self> {
        let parsed: CatalogDocument = serde_json::from_str(document)?;
        let mut groups = HashMap::new();
        for (group, entries) in parsed.instrument {
            let entries = entries
                .into_iter()
                .map(|(name, entry)| serde_json::from_value(entry).map(|entry| (name, entry)))
                .collect::<Result<Vec<(String, CatalogEntry)>, serde_json::Error>>()?;
            groups.insert(group, entries);
        }

        let mut typeids = HashMap::new();
        for row in types {
            typeids.entry((row.typename, row.instrumentid)).or_insert(row.typeid);
        }
        Ok(Self { groups, typeids })
    }

    pub async fn load(document_path: &Path, upc_db: &SqlitePool) -> ProcessResult<Self> {
        let document = std::fs::read_to_string(document_path).map_err(|e| {
            ProcessError::Common(upc_common::Error::Config(format!(
                "Read keyword catalog {} failed: {}",
                document_path.display(),
                e
            )))
        })?;
        let types = reference::load_keyword_types(upc_db).await?;
        let catalog = Self::from_parts(&document, types)?;

        info!(
            path = %document_path.display(),
            groups = catalog.groups.len(),
            keyword_types = catalog.typeids.len(),
            "Keyword catalog loaded"
        );
        Ok(catalog)
    }

    /// Typeid of a keyword name for one instrument scope
    pub fn typeid(&self, typename: &str, instrument_id: i64) -> Option<i64> {
        self.typeids.get(&(typename.to_string(), instrument_id)).copied()
    }

    /// Typeid of a fixed bookkeeping keyword (`error`, `checksum`, …)
    ///
    /// The common scope wins; otherwise the lowest typeid under any instrument.
    pub fn fixed_typeid(&self, typename: &str) -> Option<i64> {
        self.typeid(typename, COMMON_INSTRUMENT_ID).or_else(|| {
            self.typeids
                .iter()
                .filter(|((name, _), _)| name == typename)
                .map(|(_, typeid)| *typeid)
                .min()
        })
    }

    /// Values for the `COMMON` group
    pub fn extract_common(&self, label: &Label) -> Vec<ExtractedValue> {
        self.extract_group(label, COMMON_GROUP, |name| {
            self.typeid(name, COMMON_INSTRUMENT_ID)
        })
    }

    /// Values for an archive's group; an instrument-scoped typeid wins over a common one
    pub fn extract_archive(&self, label: &Label, archive: &str, instrument_id: i64) -> Vec<ExtractedValue> {
        self.extract_group(label, archive, |name| {
            self.typeid(name, instrument_id)
                .or_else(|| self.typeid(name, COMMON_INSTRUMENT_ID))
        })
    }

    /// Common values followed by the archive's values
    pub fn extract(&self, label: &Label, archive: &str, instrument_id: i64) -> Vec<ExtractedValue> {
        let mut values = self.extract_common(label);
        values.extend(self.extract_archive(label, archive, instrument_id));
        values
    }

    fn extract_group(
        &self,
        label: &Label,
        group: &str,
        resolve_typeid: impl Fn(&str) -> Option<i64>,
    ) -> Vec<ExtractedValue> {
        let Some(entries) = self.groups.get(group) else {
            debug!(group = %group, "No catalog group");
            return Vec::new();
        };

        let mut values = Vec::new();
        for (typename, entry) in entries {
            let Some(typeid) = resolve_typeid(typename) else {
                continue;
            };
            let raw = match label.lookup(&entry.keyword) {
                Some(LabelNode::Value(raw)) => raw,
                Some(LabelNode::Section(_)) => {
                    warn!(keyword = %entry.keyword, "Catalog keyword names a section, skipped");
                    continue;
                }
                None => {
                    debug!(keyword = %entry.keyword, "Keyword not found");
                    continue;
                }
            };

            let coerced = entry
                .kind
                .parse::<KeywordType>()
                .and_then(|kind| coerce(kind, raw).map(|value| (kind, value)));

            match coerced {
                Ok((kind, value)) => values.push(ExtractedValue {
                    typeid,
                    typename: typename.clone(),
                    kind,
                    value,
                }),
                Err(reason) => {
                    let err = ProcessError::Coercion {
                        keyword: typename.clone(),
                        kind: entry.kind.clone(),
                        reason,
                    };
                    warn!(error = %err, "Keyword skipped");
                }
            }
        }
        values
    }
}
