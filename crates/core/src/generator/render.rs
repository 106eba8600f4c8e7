//! Deterministic source rendering
//!
//! Every block is emitted in a fixed order from ordered inputs, so identical
//! parsed entities always render byte-identical files.

use super::fields::{signing_transform, ComputedConfig, FieldConfig};
use super::relationships::RelationshipConfig;
use crate::import::ImportStatement;
use crate::parser::{AliasModelInfo, ParsedEntity, ParsedMeta, TypeField};

const INDENT: &str = "  ";

/// Everything the descriptor file needs, already resolved
pub struct DescriptorParts<'a> {
    pub entity_name: &'a str,
    pub label: &'a str,
    pub meta_const: &'a str,
    pub imports: &'a [ImportStatement],
    pub type_fields: Vec<&'a TypeField>,
    pub fields: &'a [FieldConfig],
    pub computed: &'a [ComputedConfig],
    pub relationships: &'a [RelationshipConfig],
    pub aliases: &'a [AliasModelInfo],
}

pub fn render_descriptor(parts: &DescriptorParts<'_>) -> String {
    let label = parts.label;
    let descriptor = format!("{label}Descriptor");
    let mut out = String::new();

    out.push_str("/**\n");
    out.push_str(&format!(" * {label} descriptor.\n"));
    out.push_str(" *\n");
    out.push_str(&format!(
        " * Single definition of the `{}` entity: fields, computed values and relationships.\n",
        parts.entity_name
    ));
    out.push_str(" */\n");

    for statement in parts.imports {
        out.push_str(&statement.text);
        out.push('\n');
    }
    out.push('\n');

    render_entity_type(&mut out, label, &parts.type_fields);
    out.push('\n');

    out.push_str(&format!("export const {descriptor} = defineEntity<{label}>()({{\n"));
    out.push_str(&format!("{INDENT}...{},\n", parts.meta_const));

    if parts.fields.iter().any(|f| f.transform.is_some()) {
        out.push_str(&format!("{INDENT}injectServices: [S3Service],\n"));
    }

    if !parts.fields.is_empty() {
        out.push_str(&format!("{INDENT}fields: {{\n"));
        for field in parts.fields {
            render_field(&mut out, field);
        }
        out.push_str(&format!("{INDENT}}},\n"));
    }

    if !parts.computed.is_empty() {
        out.push_str(&format!("{INDENT}computed: {{\n"));
        for computed in parts.computed {
            render_computed(&mut out, computed);
        }
        out.push_str(&format!("{INDENT}}},\n"));
    }

    if !parts.relationships.is_empty() {
        out.push_str(&format!("{INDENT}relationships: {{\n"));
        for relationship in parts.relationships {
            render_relationship(&mut out, relationship);
        }
        out.push_str(&format!("{INDENT}}},\n"));
    }

    out.push_str("});\n\n");
    out.push_str(&format!("export type {descriptor}Type = typeof {descriptor};\n"));

    for alias in parts.aliases {
        out.push('\n');
        out.push_str(&format!(
            "export const {} = defineEntityAlias({descriptor}, {});\n",
            alias.descriptor_name, alias.meta_name
        ));
    }

    out
}

fn render_entity_type(out: &mut String, label: &str, members: &[&TypeField]) {
    if members.is_empty() {
        out.push_str(&format!("export type {label} = Entity;\n"));
        return;
    }

    out.push_str(&format!("export type {label} = Entity & {{\n"));
    for member in members {
        let optional = if member.optional { "?" } else { "" };
        out.push_str(&format!(
            "{INDENT}{}{optional}: {};\n",
            property_key(&member.name),
            member.type_name
        ));
    }
    out.push_str("};\n");
}

fn render_field(out: &mut String, field: &FieldConfig) {
    let key = property_key(&field.name);
    let mut properties = vec![format!("type: \"{}\"", field.type_literal())];
    if field.required {
        properties.push("required: true".to_string());
    }
    if field.meta {
        properties.push("meta: true".to_string());
    }
    if let Some(default) = &field.default {
        properties.push(format!("default: {default}"));
    }

    let Some(transform) = &field.transform else {
        out.push_str(&format!("{INDENT}{INDENT}{key}: {{ {} }},\n", properties.join(", ")));
        return;
    };

    let inner = INDENT.repeat(3);
    out.push_str(&format!("{INDENT}{INDENT}{key}: {{\n"));
    for property in properties {
        out.push_str(&format!("{inner}{property},\n"));
    }
    out.push_str(&format!("{inner}transform: async (data, services) => {{\n"));
    for line in signing_transform(&transform.field_name, transform.is_array) {
        out.push_str(&format!("{inner}{INDENT}{line}\n"));
    }
    out.push_str(&format!("{inner}}},\n"));
    out.push_str(&format!("{INDENT}{INDENT}}},\n"));
}

fn render_computed(out: &mut String, computed: &ComputedConfig) {
    let inner = INDENT.repeat(3);
    out.push_str(&format!("{INDENT}{INDENT}{}: {{\n", property_key(&computed.name)));
    out.push_str(&format!("{inner}compute: (params) => {},\n", computed.expression));
    if computed.meta {
        out.push_str(&format!("{inner}meta: true,\n"));
    }
    out.push_str(&format!("{INDENT}{INDENT}}},\n"));
}

fn render_relationship(out: &mut String, relationship: &RelationshipConfig) {
    let inner = INDENT.repeat(3);
    out.push_str(&format!("{INDENT}{INDENT}{}: {{\n", property_key(&relationship.name)));
    out.push_str(&format!("{inner}model: {},\n", relationship.model));
    out.push_str(&format!("{inner}direction: \"{}\",\n", relationship.direction));
    out.push_str(&format!("{inner}relationship: \"{}\",\n", relationship.relationship));
    out.push_str(&format!("{inner}cardinality: \"{}\",\n", relationship.cardinality.as_str()));
    if let Some(required) = relationship.required {
        out.push_str(&format!("{inner}required: {required},\n"));
    }
    if let Some(context_key) = &relationship.context_key {
        out.push_str(&format!("{inner}contextKey: \"{context_key}\",\n"));
    }
    if let Some(dto_key) = &relationship.dto_key {
        out.push_str(&format!("{inner}dtoKey: \"{dto_key}\",\n"));
    }
    if !relationship.fields.is_empty() {
        let fields: Vec<String> = relationship
            .fields
            .iter()
            .map(|name| format!("{{ name: \"{name}\", type: \"string\" }}"))
            .collect();
        out.push_str(&format!("{inner}fields: [{}],\n", fields.join(", ")));
    }
    out.push_str(&format!("{INDENT}{INDENT}}},\n"));
}

/// Regenerated `{name}.meta.ts`: original imports, the four identity strings,
/// then any other declarations the file carried
pub fn render_meta(parsed: &ParsedEntity) -> String {
    let meta: &ParsedMeta = &parsed.meta;
    let mut out = String::new();

    for comment in &meta.header_comments {
        out.push_str(comment);
        out.push('\n');
    }
    if !meta.header_comments.is_empty() {
        out.push('\n');
    }

    for statement in &meta.imports {
        out.push_str(&statement.text);
        out.push('\n');
    }
    if !meta.imports.is_empty() {
        out.push('\n');
    }

    let annotation = meta
        .type_annotation
        .as_ref()
        .map(|t| format!(": {t}"))
        .unwrap_or_default();
    for comment in &meta.leading_comments {
        out.push_str(comment);
        out.push('\n');
    }
    out.push_str(&format!("export const {}{annotation} = {{\n", parsed.meta_const()));
    for (key, value) in meta.entries() {
        if !value.is_empty() {
            out.push_str(&format!("{INDENT}{key}: \"{value}\",\n"));
        }
    }
    out.push_str("};\n");

    for declaration in &meta.extra_declarations {
        out.push('\n');
        out.push_str(declaration);
        out.push('\n');
    }

    out
}

/// Quote keys that are not plain identifiers
fn property_key(name: &str) -> String {
    let is_identifier = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_identifier {
        name.to_string()
    } else {
        format!("\"{name}\"")
    }
}
