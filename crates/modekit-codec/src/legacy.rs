//! Legacy aggregate-file codec
//!
//! One file per scope holds every record under a single top-level key:
//!
//! ```yaml
//! customModes:
//!   - slug: architect
//!     name: Architect
//!     roleDefinition: You plan.
//!     groups: [read, [edit, {fileRegex: "\\.md$"}]]
//! ```
//!
//! Unknown top-level keys are preserved when the file is rewritten.

use crate::error::CodecError;
use crate::groups::{decode_groups, encode_list, kind_of};
use crate::{strip_bom, Decoded, ModeCodec, SourceFile};
use modekit_model::{
    Diagnostic, DiagnosticKind, ModeConfig, ModeFormat, ModeScope, Severity, Slug,
};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Top-level key holding the record array
pub const LEGACY_KEY: &str = "customModes";

/// Record body as it appears inside the aggregate array
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyBodyIn {
    slug: String,
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
struct LegacyBodyOut<'a> {
    slug: &'a str,
    name: &'a str,
    role_definition: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    when_to_use: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_instructions: Option<&'a str>,
    groups: Vec<Value>,
}

/// Codec for the single aggregate file
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCodec;

impl LegacyCodec {
    /// Create legacy codec
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Insert or replace `mode` inside an existing aggregate document
    ///
    /// `existing` is `None` when the file does not exist yet. The entry with
    /// the same slug is replaced in place; otherwise the record is appended.
    ///
    /// # Errors
    /// Fails if the existing document cannot be parsed or has a top-level
    /// shape that cannot hold the record array. A malformed file is never
    /// overwritten.
    pub fn upsert(
        &self,
        origin: &Path,
        existing: Option<&str>,
        mode: &ModeConfig,
    ) -> Result<String, CodecError> {
        let mut root = Self::load_root(origin, existing)?;
        let body = Self::encode_body(mode)?;
        let entries = Self::entries_mut(origin, &mut root)?;

        match entries
            .iter()
            .position(|e| entry_slug(e) == Some(mode.slug.as_str()))
        {
            Some(idx) => entries[idx] = body,
            None => entries.push(body),
        }

        Ok(serde_yaml::to_string(&root)?)
    }

    /// Remove the entry for `slug`
    ///
    /// Returns the rewritten document and whether an entry was removed.
    ///
    /// # Errors
    /// Fails if the document cannot be parsed or has the wrong shape.
    pub fn remove(
        &self,
        origin: &Path,
        existing: &str,
        slug: &Slug,
    ) -> Result<(String, bool), CodecError> {
        let mut root = Self::load_root(origin, Some(existing))?;
        let entries = Self::entries_mut(origin, &mut root)?;
        let before = entries.len();
        entries.retain(|e| entry_slug(e) != Some(slug.as_str()));
        let removed = entries.len() != before;
        Ok((serde_yaml::to_string(&root)?, removed))
    }

    /// Replace the whole record array
    ///
    /// # Errors
    /// Fails if the existing document cannot be parsed or has the wrong shape.
    pub fn replace_all(
        &self,
        origin: &Path,
        existing: Option<&str>,
        modes: &[ModeConfig],
    ) -> Result<String, CodecError> {
        let mut root = Self::load_root(origin, existing)?;
        let bodies = modes
            .iter()
            .map(Self::encode_body)
            .collect::<Result<Vec<_>, _>>()?;
        *Self::entries_mut(origin, &mut root)? = bodies;
        Ok(serde_yaml::to_string(&root)?)
    }

    fn load_root(origin: &Path, existing: Option<&str>) -> Result<Mapping, CodecError> {
        let text = existing.map(strip_bom).unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(Mapping::new());
        }
        match serde_yaml::from_str::<Value>(text).map_err(|e| CodecError::parse(origin, &e))? {
            Value::Mapping(map) => Ok(map),
            Value::Null => Ok(Mapping::new()),
            other => Err(CodecError::shape(
                origin,
                format!("top level must be a mapping, got {}", kind_of(&other)),
            )),
        }
    }

    fn entries_mut<'a>(
        origin: &Path,
        root: &'a mut Mapping,
    ) -> Result<&'a mut Vec<Value>, CodecError> {
        let slot = root
            .entry(Value::String(LEGACY_KEY.to_string()))
            .or_insert_with(|| Value::Sequence(Vec::new()));
        if slot.is_null() {
            *slot = Value::Sequence(Vec::new());
        }
        match slot {
            Value::Sequence(seq) => Ok(seq),
            other => Err(CodecError::shape(
                origin,
                format!("'{LEGACY_KEY}' must be a list, got {}", kind_of(other)),
            )),
        }
    }

    fn encode_body(mode: &ModeConfig) -> Result<Value, CodecError> {
        let body = LegacyBodyOut {
            slug: mode.slug.as_str(),
            name: &mode.name,
            role_definition: &mode.role_definition,
            when_to_use: mode.when_to_use.as_deref(),
            description: mode.description.as_deref(),
            custom_instructions: mode.custom_instructions.as_deref(),
            groups: encode_list(&mode.groups)?,
        };
        Ok(serde_yaml::to_value(body)?)
    }

    fn decode_entry(
        origin: &Path,
        index: usize,
        entry: Value,
        scope: ModeScope,
    ) -> Result<ModeConfig, CodecError> {
        let declared = entry_slug(&entry).map(str::to_string);
        let schema_err = |message: String| CodecError::Schema {
            origin: origin.to_path_buf(),
            slug: declared.clone(),
            message: format!("entry #{index}: {message}"),
        };

        if !entry.is_mapping() {
            return Err(schema_err(format!(
                "record must be a mapping, got {}",
                kind_of(&entry)
            )));
        }

        let body: LegacyBodyIn =
            serde_yaml::from_value(entry).map_err(|e| schema_err(e.to_string()))?;
        let slug = Slug::new(body.slug.clone()).map_err(|source| CodecError::Validation {
            origin: origin.to_path_buf(),
            slug: Some(body.slug.clone()),
            source,
        })?;
        let groups = decode_groups(body.groups.as_ref()).map_err(schema_err)?;

        let mode = ModeConfig {
            slug,
            name: body.name,
            role_definition: body.role_definition,
            when_to_use: body.when_to_use,
            description: body.description,
            custom_instructions: body.custom_instructions,
            groups,
            scope,
            format: ModeFormat::Legacy,
        };
        mode.validate().map_err(|source| CodecError::Validation {
            origin: origin.to_path_buf(),
            slug: Some(mode.slug.to_string()),
            source,
        })?;
        Ok(mode)
    }
}

impl ModeCodec for LegacyCodec {
    fn format(&self) -> ModeFormat {
        ModeFormat::Legacy
    }

    fn decode(&self, source: &SourceFile<'_>, scope: ModeScope) -> Decoded {
        let mut decoded = Decoded::default();
        let text = strip_bom(source.text);
        if text.trim().is_empty() {
            return decoded;
        }

        let root = match serde_yaml::from_str::<Value>(text) {
            Ok(value) => value,
            Err(e) => {
                decoded.reject(CodecError::parse(source.path, &e));
                return decoded;
            }
        };

        let entries = match root {
            Value::Null => return decoded,
            Value::Mapping(mut map) => match map.remove(LEGACY_KEY) {
                Some(Value::Sequence(seq)) => seq,
                Some(Value::Null) => return decoded,
                Some(other) => {
                    decoded.reject(CodecError::shape(
                        source.path,
                        format!("'{LEGACY_KEY}' must be a list, got {}", kind_of(&other)),
                    ));
                    return decoded;
                }
                None => {
                    decoded.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::Shape,
                            format!("no '{LEGACY_KEY}' key; file contributes no modes"),
                        )
                        .with_severity(Severity::Info)
                        .at_path(source.path),
                    );
                    return decoded;
                }
            },
            other => {
                decoded.reject(CodecError::shape(
                    source.path,
                    format!("top level must be a mapping, got {}", kind_of(&other)),
                ));
                return decoded;
            }
        };

        for (index, entry) in entries.into_iter().enumerate() {
            match Self::decode_entry(source.path, index, entry, scope) {
                Ok(mode) => decoded.accept(source.path, mode),
                Err(e) => decoded.reject(e),
            }
        }

        decoded
    }
}

fn entry_slug(entry: &Value) -> Option<&str> {
    entry.get("slug").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modekit_model::{GroupEntry, GroupOptions, ToolGroup};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const SAMPLE: &str = r#"
customModes:
  - slug: architect
    name: Architect
    roleDefinition: You plan systems.
    groups: ["read"]
  - slug: docs-writer
    name: Docs Writer
    roleDefinition: You write docs.
    customInstructions: Be brief.
    groups:
      - read
      - - edit
        - fileRegex: \.md$
          description: Markdown files
"#;

    fn decode(text: &str) -> Decoded {
        let path = PathBuf::from("/repo/.roomodes");
        LegacyCodec.decode(&SourceFile::new(&path, text), ModeScope::Project)
    }

    #[test]
    fn decodes_sample() {
        let decoded = decode(SAMPLE);
        assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);
        assert_eq!(decoded.modes.len(), 2);

        let architect = &decoded.modes[0];
        assert_eq!(architect.slug.as_str(), "architect");
        assert_eq!(architect.scope, ModeScope::Project);
        assert_eq!(architect.format, ModeFormat::Legacy);
        assert_eq!(architect.groups, vec![GroupEntry::bare(ToolGroup::Read)]);

        let docs = &decoded.modes[1];
        assert_eq!(docs.custom_instructions.as_deref(), Some("Be brief."));
        assert_eq!(
            docs.groups[1],
            GroupEntry::with_options(
                ToolGroup::Edit,
                GroupOptions::file_regex(r"\.md$").with_description("Markdown files"),
            )
        );
    }

    #[test]
    fn json_documents_are_accepted() {
        let decoded = decode(
            r#"{"customModes": [{"slug": "a", "name": "A", "roleDefinition": "r", "groups": ["read"]}]}"#,
        );
        assert_eq!(decoded.modes.len(), 1);
    }

    #[test]
    fn bom_is_ignored() {
        let text = format!("\u{feff}{SAMPLE}");
        assert_eq!(decode(&text).modes.len(), 2);
    }

    #[test]
    fn bad_records_are_dropped_siblings_survive() {
        let decoded = decode(
            r#"
customModes:
  - slug: "bad slug"
    name: Bad
    roleDefinition: r
  - slug: no-role
    name: No Role
    roleDefinition: ""
  - slug: good
    name: Good
    roleDefinition: r
  - slug: dup-groups
    name: Dup
    roleDefinition: r
    groups: [read, read]
  - just a string
"#,
        );
        assert_eq!(decoded.modes.len(), 1);
        assert_eq!(decoded.modes[0].slug.as_str(), "good");
        assert_eq!(decoded.diagnostics.len(), 4);
        assert!(decoded
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::Validation));
        assert_eq!(decoded.diagnostics[0].slug.as_deref(), Some("bad slug"));
    }

    #[test]
    fn malformed_top_level_yields_zero_records_and_diagnostic() {
        let decoded = decode("customModes:\n  slug: architect\n");
        assert!(decoded.modes.is_empty());
        assert_eq!(decoded.diagnostics.len(), 1);
        assert_eq!(decoded.diagnostics[0].kind, DiagnosticKind::Shape);

        let decoded = decode("- a\n- b\n");
        assert!(decoded.modes.is_empty());
        assert_eq!(decoded.diagnostics[0].kind, DiagnosticKind::Shape);
    }

    #[test]
    fn syntax_error_has_position() {
        let decoded = decode("customModes:\n  - slug: a\n   name: [broken\n");
        assert!(decoded.modes.is_empty());
        match &decoded.diagnostics[0].kind {
            DiagnosticKind::Parse { line, .. } => assert!(line.is_some()),
            other => panic!("expected parse diagnostic, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_silent() {
        let decoded = decode("  \n");
        assert!(decoded.modes.is_empty());
        assert!(decoded.diagnostics.is_empty());
    }

    #[test]
    fn duplicate_slug_last_wins() {
        let decoded = decode(
            r#"
customModes:
  - {slug: a, name: First, roleDefinition: r}
  - {slug: a, name: Second, roleDefinition: r}
"#,
        );
        assert_eq!(decoded.modes.len(), 1);
        assert_eq!(decoded.modes[0].name, "Second");
        assert_eq!(decoded.diagnostics[0].kind, DiagnosticKind::DuplicateSlug);
    }

    #[test]
    fn upsert_replaces_in_place_and_preserves_other_keys() {
        let origin = PathBuf::from(".roomodes");
        let existing = "version: 2\ncustomModes:\n  - {slug: a, name: A, roleDefinition: r}\n  - {slug: b, name: B, roleDefinition: r}\n";
        let mode = ModeConfig::new(Slug::new("a").unwrap(), "A2", "r2")
            .with_origin(ModeScope::Project, ModeFormat::Legacy);

        let text = LegacyCodec.upsert(&origin, Some(existing), &mode).unwrap();
        let decoded = decode(&text);
        assert_eq!(decoded.modes.len(), 2);
        assert_eq!(decoded.modes[0].name, "A2");
        assert_eq!(decoded.modes[1].name, "B");

        let root: Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(root.get("version").and_then(Value::as_u64), Some(2));
    }

    #[test]
    fn upsert_appends_and_creates() {
        let origin = PathBuf::from(".roomodes");
        let mode = ModeConfig::new(Slug::new("new").unwrap(), "New", "r")
            .with_group(ToolGroup::Command);
        let text = LegacyCodec.upsert(&origin, None, &mode).unwrap();
        let decoded = decode(&text);
        assert_eq!(decoded.modes.len(), 1);
        assert!(decoded.modes[0].same_content(&mode));
    }

    #[test]
    fn upsert_refuses_to_clobber_malformed_file() {
        let origin = PathBuf::from(".roomodes");
        let mode = ModeConfig::new(Slug::new("a").unwrap(), "A", "r");
        let err = LegacyCodec
            .upsert(&origin, Some("customModes: 12\n"), &mode)
            .unwrap_err();
        assert!(matches!(err, CodecError::Shape { .. }));

        let err = LegacyCodec
            .upsert(&origin, Some("customModes: [\n"), &mode)
            .unwrap_err();
        assert!(matches!(err, CodecError::Parse { .. }));
    }

    #[test]
    fn remove_reports_whether_entry_existed() {
        let origin = PathBuf::from(".roomodes");
        let existing = "customModes:\n  - {slug: a, name: A, roleDefinition: r}\n";
        let slug = Slug::new("a").unwrap();

        let (text, removed) = LegacyCodec.remove(&origin, existing, &slug).unwrap();
        assert!(removed);
        assert!(decode(&text).modes.is_empty());

        let (_, removed) = LegacyCodec.remove(&origin, &text, &slug).unwrap();
        assert!(!removed);
    }
}
