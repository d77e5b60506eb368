//! Group-grant wire shapes shared by both codecs
//!
//! Two spellings exist:
//! - list form: `["read", ["edit", {fileRegex: "\\.md$"}]]`
//! - mapping form: `{read: {}, edit: {fileRegex: "\\.md$"}}`

use indexmap::IndexMap;
use modekit_model::{GroupEntry, GroupOptions, ToolGroup};
use serde_yaml::Value;

/// Decode a `groups` value in either spelling
///
/// A missing or null value yields no grants.
pub(crate) fn decode_groups(value: Option<&Value>) -> Result<Vec<GroupEntry>, String> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items.iter().map(decode_list_entry).collect(),
        Some(Value::Mapping(map)) => map
            .iter()
            .map(|(key, options)| {
                let name = key
                    .as_str()
                    .ok_or_else(|| format!("group name must be a string, got {}", kind_of(key)))?;
                decode_entry(name, options)
            })
            .collect(),
        Some(other) => Err(format!(
            "'groups' must be a list or a mapping, got {}",
            kind_of(other)
        )),
    }
}

fn decode_list_entry(item: &Value) -> Result<GroupEntry, String> {
    match item {
        Value::String(name) => decode_entry(name, &Value::Null),
        Value::Sequence(pair) if pair.len() == 2 => {
            let name = pair[0]
                .as_str()
                .ok_or_else(|| "group pair must start with a group name".to_string())?;
            decode_entry(name, &pair[1])
        }
        Value::Sequence(pair) => Err(format!(
            "group pair must have exactly two elements, got {}",
            pair.len()
        )),
        other => Err(format!(
            "group entry must be a name or a [name, options] pair, got {}",
            kind_of(other)
        )),
    }
}

fn decode_entry(name: &str, options: &Value) -> Result<GroupEntry, String> {
    let group: ToolGroup = name.parse().map_err(|e| format!("{e}"))?;
    let options = match options {
        Value::Null => GroupOptions::default(),
        Value::Mapping(_) => serde_yaml::from_value::<GroupOptions>(options.clone())
            .map_err(|e| format!("invalid options for group '{group}': {e}"))?,
        other => {
            return Err(format!(
                "options for group '{group}' must be a mapping, got {}",
                kind_of(other)
            ))
        }
    };
    Ok(GroupEntry::with_options(group, options))
}

/// Encode grants in list form (legacy aggregate file)
pub(crate) fn encode_list(groups: &[GroupEntry]) -> Result<Vec<Value>, serde_yaml::Error> {
    groups
        .iter()
        .map(|entry| {
            let name = Value::String(entry.group.as_str().to_string());
            match entry.options() {
                None => Ok(name),
                Some(options) => Ok(Value::Sequence(vec![name, serde_yaml::to_value(options)?])),
            }
        })
        .collect()
}

/// Encode grants in mapping form (split document)
///
/// Absent options are written as an empty mapping rather than `null`.
pub(crate) fn encode_map(groups: &[GroupEntry]) -> IndexMap<String, GroupOptions> {
    groups
        .iter()
        .map(|entry| {
            (
                entry.group.as_str().to_string(),
                entry.options().cloned().unwrap_or_default(),
            )
        })
        .collect()
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn list_form_decodes() {
        let value = yaml(r#"["read", ["edit", {fileRegex: "\\.md$", description: "Docs"}]]"#);
        let groups = decode_groups(Some(&value)).unwrap();
        assert_eq!(
            groups,
            vec![
                GroupEntry::bare(ToolGroup::Read),
                GroupEntry::with_options(
                    ToolGroup::Edit,
                    GroupOptions::file_regex(r"\.md$").with_description("Docs"),
                ),
            ]
        );
    }

    #[test]
    fn mapping_form_decodes_empty_and_null_markers() {
        let value = yaml("read: {}\ncommand:\nedit:\n  fileRegex: src/.*\n");
        let groups = decode_groups(Some(&value)).unwrap();
        assert_eq!(groups.len(), 3);
        assert!(groups[0].options().is_none());
        assert!(groups[1].options().is_none());
        assert_eq!(
            groups[2].options().and_then(|o| o.file_regex.as_deref()),
            Some("src/.*")
        );
    }

    #[test]
    fn unknown_group_reports_name() {
        let err = decode_groups(Some(&yaml("[\"teleport\"]"))).unwrap_err();
        assert!(err.contains("teleport"));
    }

    #[test]
    fn malformed_pair_is_rejected() {
        assert!(decode_groups(Some(&yaml("[[\"edit\"]]"))).is_err());
        assert!(decode_groups(Some(&yaml("[42]"))).is_err());
        assert!(decode_groups(Some(&yaml("edit: 5"))).is_err());
    }

    #[test]
    fn encode_map_uses_empty_marker() {
        let groups = vec![
            GroupEntry::bare(ToolGroup::Read),
            GroupEntry::with_options(ToolGroup::Edit, GroupOptions::file_regex("x")),
        ];
        let text = serde_yaml::to_string(&encode_map(&groups)).unwrap();
        assert_eq!(text, "read: {}\nedit:\n  fileRegex: x\n");
    }

    #[test]
    fn encode_list_round_trips() {
        let groups = vec![
            GroupEntry::bare(ToolGroup::Mcp),
            GroupEntry::with_options(ToolGroup::Edit, GroupOptions::file_regex("x")),
        ];
        let encoded = Value::Sequence(encode_list(&groups).unwrap());
        assert_eq!(decode_groups(Some(&encoded)).unwrap(), groups);
    }
}
