//! Entity type shape parsing (`{name}.entity.ts` / `{name}.ts`)

use serde::Serialize;
use tree_sitter::Node;

use super::serialiser::ParsedSerialiser;
use super::typescript::{descendants, named_children, SourceFile};
use crate::import::{extract_imports, ImportStatement};
use crate::paths::has_legacy_suffix;

/// Entity types the framework exports itself
pub const FRAMEWORK_TYPES: &[&str] = &["Company", "User", "Role", "Feature", "Module"];

/// One member of the entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeField {
    pub name: String,
    /// Type as written, without the leading colon
    pub type_name: String,
    pub optional: bool,
}

impl TypeField {
    /// Type with `null`/`undefined` union members removed
    pub fn base_type(&self) -> &str {
        strip_nullish(&self.type_name)
    }

    pub fn is_array(&self) -> bool {
        element_type(self.base_type()).is_some()
    }

    /// Element type for arrays, the type itself otherwise
    pub fn item_type(&self) -> &str {
        element_type(self.base_type()).unwrap_or(self.base_type())
    }
}

/// Parsed entity type declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedEntityType {
    pub name: String,
    /// Scalar members
    pub fields: Vec<TypeField>,
    /// Members whose type names another entity
    pub relationship_fields: Vec<TypeField>,
    pub imports: Vec<ImportStatement>,
}

impl ParsedEntityType {
    /// Empty shape used when no type file exists
    pub fn fallback(label_name: &str) -> Self {
        Self {
            name: label_name.to_string(),
            ..Self::default()
        }
    }

    pub fn relationship_field(&self, name: &str) -> Option<&TypeField> {
        self.relationship_fields.iter().find(|f| f.name == name)
    }
}

/// Parse the first type alias or interface describing the entity
///
/// A member is a relationship only when its type is a known entity: a
/// framework entity, the target of a serialiser relationship, or a type
/// imported from another legacy entity file. Every other member is a field.
pub fn parse_entity_type(file: &SourceFile, label_name: &str, serialiser: &ParsedSerialiser) -> ParsedEntityType {
    let mut parsed = ParsedEntityType::fallback(label_name);
    parsed.imports = extract_imports(file);

    let declarations: Vec<Node<'_>> = file
        .descendants()
        .into_iter()
        .filter(|n| matches!(n.kind(), "type_alias_declaration" | "interface_declaration"))
        .collect();

    // Prefer the declaration named after the label, else the first one
    let declaration = declarations
        .iter()
        .find(|d| file.field_text(**d, "name") == Some(label_name))
        .or_else(|| declarations.first());

    let Some(declaration) = declaration else {
        return parsed;
    };

    if let Some(name) = file.field_text(*declaration, "name") {
        parsed.name = name.to_string();
    }

    let body = match declaration.kind() {
        "type_alias_declaration" => declaration.child_by_field_name("value"),
        _ => declaration.child_by_field_name("body"),
    };
    let Some(body) = body else {
        return parsed;
    };

    for member in member_signatures(body) {
        let Some(field) = read_member(file, member) else {
            continue;
        };
        if is_relationship(&field, &parsed.imports, serialiser) {
            parsed.relationship_fields.push(field);
        } else {
            parsed.fields.push(field);
        }
    }

    parsed
}

/// Property signatures of the object types inside an intersection or body
fn member_signatures(body: Node<'_>) -> Vec<Node<'_>> {
    let objects: Vec<Node<'_>> = match body.kind() {
        "object_type" | "interface_body" => vec![body],
        "intersection_type" => descendants(body)
            .into_iter()
            .filter(|n| n.kind() == "object_type")
            .collect(),
        _ => Vec::new(),
    };

    objects
        .into_iter()
        .flat_map(named_children)
        .filter(|n| n.kind() == "property_signature")
        .collect()
}

fn read_member(file: &SourceFile, member: Node<'_>) -> Option<TypeField> {
    let name = file.field_text(member, "name")?.to_string();
    let type_name = member
        .child_by_field_name("type")
        .map(|t| file.text(t).trim_start_matches(':').trim().to_string())
        .unwrap_or_else(|| "any".to_string());

    let mut cursor = member.walk();
    let optional = member.children(&mut cursor).any(|c| c.kind() == "?");

    Some(TypeField {
        name,
        type_name,
        optional,
    })
}

fn is_relationship(field: &TypeField, imports: &[ImportStatement], serialiser: &ParsedSerialiser) -> bool {
    let item = field.item_type();
    if !is_type_identifier(item) {
        return false;
    }

    FRAMEWORK_TYPES.contains(&item)
        || serialiser
            .relationships
            .iter()
            .any(|r| r.name == field.name || r.target_type() == item)
        || imports
            .iter()
            .any(|i| i.binds(item) && has_legacy_suffix(&i.source))
}

/// A capitalized bare identifier (`User`, not `Record<string, any>`)
pub fn is_type_identifier(type_name: &str) -> bool {
    type_name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && type_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strip_nullish(type_name: &str) -> &str {
    let parts: Vec<&str> = type_name
        .split('|')
        .map(str::trim)
        .filter(|p| !matches!(*p, "null" | "undefined" | ""))
        .collect();
    if parts.len() == 1 {
        parts[0]
    } else {
        type_name.trim()
    }
}

fn element_type(type_name: &str) -> Option<&str> {
    if let Some(inner) = type_name.strip_suffix("[]") {
        return Some(inner.trim());
    }
    type_name
        .strip_prefix("Array<")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(str::trim)
}
