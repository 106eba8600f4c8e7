//! `{name}.meta.ts` parsing
//!
//! The meta file exports one object of four flat strings. Anything else the
//! file exports (alias metas, helper constants) is kept verbatim so that
//! regeneration does not drop it.

use serde::Serialize;
use tree_sitter::Node;

use super::typescript::{named_children, SourceFile};
use crate::import::{extract_imports, ImportStatement};

const META_KEYS: [&str; 4] = ["type", "endpoint", "nodeName", "labelName"];

/// Identity strings of an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedMeta {
    /// API resource type (`type`)
    pub resource_type: String,
    pub endpoint: String,
    pub node_name: String,
    pub label_name: String,
    /// Name of the exported constant (e.g. `photoMeta`)
    pub const_name: String,
    /// Declared type of the constant, without the leading colon
    pub type_annotation: Option<String>,
    pub imports: Vec<ImportStatement>,
    /// Comments above the imports (license headers)
    pub header_comments: Vec<String>,
    /// Comments directly above the meta constant
    pub leading_comments: Vec<String>,
    /// Other top-level statements with their comments, verbatim
    pub extra_declarations: Vec<String>,
}

impl ParsedMeta {
    /// The four identity strings paired with their keys, in file order
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("type", &self.resource_type),
            ("endpoint", &self.endpoint),
            ("nodeName", &self.node_name),
            ("labelName", &self.label_name),
        ]
    }
}

/// Parse a meta file; absent keys become empty strings
pub fn parse_meta(file: &SourceFile) -> ParsedMeta {
    let mut meta = ParsedMeta {
        imports: extract_imports(file),
        ..ParsedMeta::default()
    };
    let mut found = false;
    // Comments travel with the statement that follows them
    let mut pending: Vec<String> = Vec::new();

    for statement in named_children(file.root()) {
        match statement.kind() {
            "comment" => {
                pending.push(file.text(statement).to_string());
                continue;
            }
            "import_statement" => {
                meta.header_comments.append(&mut pending);
                continue;
            }
            "export_statement" | "lexical_declaration" if !found => {
                if let Some(declarator) = meta_declarator(file, statement) {
                    found = true;
                    meta.leading_comments.append(&mut pending);
                    read_declarator(file, declarator, &mut meta);
                    continue;
                }
            }
            _ => {}
        }
        pending.push(file.text(statement).to_string());
        meta.extra_declarations.push(pending.join("\n"));
        pending.clear();
    }
    if !pending.is_empty() {
        meta.extra_declarations.push(pending.join("\n"));
    }

    if meta.const_name.is_empty() && !meta.node_name.is_empty() {
        meta.const_name = format!("{}Meta", meta.node_name);
    }

    meta
}

/// First variable declarator whose object value carries a meta key
fn meta_declarator<'t>(file: &SourceFile, statement: Node<'t>) -> Option<Node<'t>> {
    let declaration = if statement.kind() == "export_statement" {
        statement.child_by_field_name("declaration")?
    } else {
        statement
    };
    if declaration.kind() != "lexical_declaration" {
        return None;
    }

    named_children(declaration)
        .into_iter()
        .filter(|n| n.kind() == "variable_declarator")
        .find(|declarator| {
            declarator
                .child_by_field_name("value")
                .and_then(unwrap_object)
                .is_some_and(|object| {
                    object_pairs(file, object)
                        .iter()
                        .any(|(key, _)| META_KEYS.contains(&key.as_str()))
                })
        })
}

fn read_declarator(file: &SourceFile, declarator: Node<'_>, meta: &mut ParsedMeta) {
    meta.const_name = file.field_text(declarator, "name").unwrap_or_default().to_string();
    meta.type_annotation = declarator
        .child_by_field_name("type")
        .map(|t| file.text(t).trim_start_matches(':').trim().to_string());

    let Some(object) = declarator.child_by_field_name("value").and_then(unwrap_object) else {
        return;
    };

    for (key, value) in object_pairs(file, object) {
        let Some(value) = file.string_value(value) else {
            continue;
        };
        match key.as_str() {
            "type" => meta.resource_type = value,
            "endpoint" => meta.endpoint = value,
            "nodeName" => meta.node_name = value,
            "labelName" => meta.label_name = value,
            _ => {}
        }
    }
}

/// Strip `as const` / `satisfies X` wrappers around an object literal
pub(crate) fn unwrap_object(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "object" => Some(node),
        "as_expression" | "satisfies_expression" | "parenthesized_expression" => {
            named_children(node).into_iter().find_map(unwrap_object)
        }
        _ => None,
    }
}

/// `key: value` pairs of an object literal, keys unquoted
pub(crate) fn object_pairs<'t>(file: &SourceFile, object: Node<'t>) -> Vec<(String, Node<'t>)> {
    named_children(object)
        .into_iter()
        .filter(|n| n.kind() == "pair")
        .filter_map(|pair| {
            let key = pair.child_by_field_name("key")?;
            let value = pair.child_by_field_name("value")?;
            let key = file
                .string_value(key)
                .unwrap_or_else(|| file.text(key).to_string());
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(source: &str) -> ParsedMeta {
        let file = SourceFile::parse(Path::new("photo.meta.ts"), source.to_string()).unwrap();
        parse_meta(&file)
    }

    #[test]
    fn reads_four_identity_strings() {
        let meta = parse(
            r#"import { DataMeta } from "../../common";

export const photoMeta: DataMeta = {
  type: "photos",
  endpoint: "photos",
  nodeName: "photo",
  labelName: "Photo",
};
"#,
        );

        assert_eq!(meta.resource_type, "photos");
        assert_eq!(meta.endpoint, "photos");
        assert_eq!(meta.node_name, "photo");
        assert_eq!(meta.label_name, "Photo");
        assert_eq!(meta.const_name, "photoMeta");
        assert_eq!(meta.type_annotation.as_deref(), Some("DataMeta"));
        assert_eq!(meta.imports.len(), 1);
        assert!(meta.extra_declarations.is_empty());
    }

    #[test]
    fn missing_keys_are_empty() {
        let meta = parse("export const photoMeta = { nodeName: 'photo' } as const;\n");

        assert_eq!(meta.node_name, "photo");
        assert_eq!(meta.endpoint, "");
        assert_eq!(meta.label_name, "");
        assert!(meta.type_annotation.is_none());
    }

    #[test]
    fn comments_are_kept_in_place() {
        let meta = parse(
            r#"// Copyright (c) Gallery Ltd.
import { DataMeta } from "../../common";

/** Identity of a photo */
export const photoMeta: DataMeta = { type: "photos", endpoint: "photos", nodeName: "photo", labelName: "Photo" };

// cover photos share the label
export const coverMeta = { type: "photos", endpoint: "covers", nodeName: "cover", labelName: "Photo" };
// end
"#,
        );

        assert_eq!(meta.header_comments, vec!["// Copyright (c) Gallery Ltd."]);
        assert_eq!(meta.leading_comments, vec!["/** Identity of a photo */"]);
        assert_eq!(meta.extra_declarations.len(), 2);
        assert!(meta.extra_declarations[0].starts_with("// cover photos share the label\nexport const coverMeta"));
        assert_eq!(meta.extra_declarations[1], "// end");
    }

    #[test]
    fn keeps_additional_exports() {
        let meta = parse(
            r#"export const userMeta = { type: "users", endpoint: "users", nodeName: "user", labelName: "User" };
export const ownerMeta = { type: "users", endpoint: "owners", nodeName: "owner", labelName: "User" };
"#,
        );

        assert_eq!(meta.const_name, "userMeta");
        assert_eq!(meta.extra_declarations.len(), 1);
        assert!(meta.extra_declarations[0].contains("ownerMeta"));
    }
}
