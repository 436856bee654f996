use std::collections::BTreeMap;

use arbor_common::{Result, error::Error};
use arbor_encodings::{BlockSize, CompressionStrategy};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisConfig;

/// Storage options of a single field, fixed when the field's postings are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldConfig {
    pub block_size: BlockSize,
    pub compression: CompressionStrategy,
}

impl FieldConfig {
    pub fn new(block_size: BlockSize, compression: CompressionStrategy) -> Self {
        FieldConfig {
            block_size,
            compression,
        }
    }
}

/// Index-creation options, passed explicitly to every segment writer.
///
/// ```json
/// {
///   "default_field": { "block_size": 128, "compression": "adaptive" },
///   "fields": { "body": { "block_size": 32, "compression": "frame_of_reference" } },
///   "analysis": { "tokenizer": "unicode-word", "lowercase": true }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexConfig {
    pub default_field: FieldConfig,
    pub fields: BTreeMap<String, FieldConfig>,
    pub analysis: AnalysisConfig,
}

impl IndexConfig {
    /// Parses a configuration document. Malformed documents and unknown
    /// options are `Json` errors; block sizes outside the supported set are
    /// `UnsupportedConfiguration` errors and are never adjusted.
    pub fn from_json(json: &str) -> Result<IndexConfig> {
        let document: IndexConfigDocument =
            serde_json::from_str(json).map_err(|e| Error::json("index config", e))?;
        IndexConfig::try_from(document)
    }

    pub fn with_field(mut self, name: impl Into<String>, config: FieldConfig) -> Self {
        self.fields.insert(name.into(), config);
        self
    }

    pub fn field_config(&self, field: &str) -> FieldConfig {
        self.fields.get(field).copied().unwrap_or(self.default_field)
    }
}

/// Field options as written in a configuration document.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FieldConfigDocument {
    block_size: u32,
    compression: CompressionStrategy,
}

impl Default for FieldConfigDocument {
    fn default() -> Self {
        FieldConfigDocument {
            block_size: BlockSize::DEFAULT.into(),
            compression: CompressionStrategy::default(),
        }
    }
}

impl TryFrom<FieldConfigDocument> for FieldConfig {
    type Error = Error;

    fn try_from(document: FieldConfigDocument) -> Result<FieldConfig> {
        Ok(FieldConfig::new(
            BlockSize::new(document.block_size)?,
            document.compression,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct IndexConfigDocument {
    default_field: FieldConfigDocument,
    fields: BTreeMap<String, FieldConfigDocument>,
    analysis: AnalysisConfig,
}

impl TryFrom<IndexConfigDocument> for IndexConfig {
    type Error = Error;

    fn try_from(document: IndexConfigDocument) -> Result<IndexConfig> {
        let fields = document
            .fields
            .into_iter()
            .map(|(name, field)| Ok((name, FieldConfig::try_from(field)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(IndexConfig {
            default_field: document.default_field.try_into()?,
            fields,
            analysis: document.analysis,
        })
    }
}
