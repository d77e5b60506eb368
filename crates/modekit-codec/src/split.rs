//! Split-document codec
//!
//! One file per record, named `<slug>.yaml` (or `<slug>.yml`). The slug
//! comes from the file name; a `slug` key inside the document is ignored.
//!
//! ```yaml
//! # yaml-language-server: $schema=https://example.com/mode.schema.json
//! name: Architect
//! roleDefinition: You plan.
//! groups:
//!   read: {}
//!   edit:
//!     fileRegex: \.md$
//! ```

use crate::error::CodecError;
use crate::groups::{decode_groups, encode_map, kind_of};
use crate::{strip_bom, Decoded, ModeCodec, SourceFile};
use indexmap::IndexMap;
use modekit_model::{GroupOptions, ModeConfig, ModeFormat, ModeScope, Slug};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;

/// Primary split-file extension
pub const SPLIT_EXTENSION: &str = "yaml";

/// Accepted alias extension
pub const SPLIT_EXTENSION_ALIAS: &str = "yml";

/// Schema referenced by the annotation line of encoded split documents
pub const DEFAULT_SCHEMA_URL: &str =
    "https://raw.githubusercontent.com/example/modekit/main/schema/mode.schema.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SplitDocIn {
    name: String,
    role_definition: String,
    #[serde(default)]
    when_to_use: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    custom_instructions: Option<String>,
    #[serde(default)]
    groups: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SplitDocOut<'a> {
    name: &'a str,
    role_definition: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    when_to_use: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_instructions: Option<&'a str>,
    groups: IndexMap<String, GroupOptions>,
}

/// Codec for one-record-per-file documents
#[derive(Debug, Clone)]
pub struct SplitCodec {
    schema_url: Option<String>,
}

impl SplitCodec {
    /// Create split codec annotating documents with [`DEFAULT_SCHEMA_URL`]
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema_url: Some(DEFAULT_SCHEMA_URL.to_string()),
        }
    }

    /// Encode without a schema annotation line
    #[inline]
    #[must_use]
    pub fn without_schema_url(mut self) -> Self {
        self.schema_url = None;
        self
    }

    /// Emit a `yaml-language-server` schema annotation on encode
    #[inline]
    #[must_use]
    pub fn with_schema_url(mut self, url: impl Into<String>) -> Self {
        self.schema_url = Some(url.into());
        self
    }

    /// Schema annotation target, if any
    #[inline]
    #[must_use]
    pub fn schema_url(&self) -> Option<&str> {
        self.schema_url.as_deref()
    }

    /// Slug implied by a split file name (extension stripped)
    ///
    /// Returns `None` when the path has no stem or a foreign extension.
    #[must_use]
    pub fn slug_for_path(path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        if ext != SPLIT_EXTENSION && ext != SPLIT_EXTENSION_ALIAS {
            return None;
        }
        path.file_stem()?.to_str()
    }

    /// Encode one record as a split document
    ///
    /// # Errors
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn encode(&self, mode: &ModeConfig) -> Result<String, CodecError> {
        let doc = SplitDocOut {
            name: &mode.name,
            role_definition: &mode.role_definition,
            when_to_use: mode.when_to_use.as_deref(),
            description: mode.description.as_deref(),
            custom_instructions: mode.custom_instructions.as_deref(),
            groups: encode_map(&mode.groups),
        };
        let body = serde_yaml::to_string(&doc)?;
        Ok(match &self.schema_url {
            Some(url) => format!("# yaml-language-server: $schema={url}\n{body}"),
            None => body,
        })
    }

    /// Decode one document, taking the slug from `slug`
    ///
    /// # Errors
    /// Fails on syntax errors, a non-mapping top level, schema mismatches or
    /// an invalid slug.
    pub fn decode_one(
        &self,
        origin: &Path,
        slug: &str,
        text: &str,
        scope: ModeScope,
    ) -> Result<ModeConfig, CodecError> {
        let text = strip_bom(text);
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| CodecError::parse(origin, &e))?;

        match &value {
            Value::Mapping(_) => {}
            Value::Null => return Err(CodecError::shape(origin, "document is empty")),
            other => {
                return Err(CodecError::shape(
                    origin,
                    format!("top level must be a mapping, got {}", kind_of(other)),
                ))
            }
        }

        let slug = Slug::new(slug).map_err(|source| CodecError::Validation {
            origin: origin.to_path_buf(),
            slug: Some(slug.to_string()),
            source,
        })?;
        let schema_err = |message: String| CodecError::Schema {
            origin: origin.to_path_buf(),
            slug: Some(slug.to_string()),
            message,
        };

        let doc: SplitDocIn = serde_yaml::from_value(value).map_err(|e| schema_err(e.to_string()))?;
        let groups = decode_groups(doc.groups.as_ref()).map_err(schema_err)?;

        let mode = ModeConfig {
            slug,
            name: doc.name,
            role_definition: doc.role_definition,
            when_to_use: doc.when_to_use,
            description: doc.description,
            custom_instructions: doc.custom_instructions,
            groups,
            scope,
            format: ModeFormat::Split,
        };
        mode.validate().map_err(|source| CodecError::Validation {
            origin: origin.to_path_buf(),
            slug: Some(mode.slug.to_string()),
            source,
        })?;
        Ok(mode)
    }
}

impl Default for SplitCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeCodec for SplitCodec {
    fn format(&self) -> ModeFormat {
        ModeFormat::Split
    }

    fn decode(&self, source: &SourceFile<'_>, scope: ModeScope) -> Decoded {
        let mut decoded = Decoded::default();
        let Some(stem) = source.path.file_stem().and_then(|s| s.to_str()) else {
            decoded.reject(CodecError::shape(source.path, "file name has no usable stem"));
            return decoded;
        };
        match self.decode_one(source.path, stem, source.text, scope) {
            Ok(mode) => decoded.accept(source.path, mode),
            Err(e) => decoded.reject(e),
        }
        decoded
    }
}
