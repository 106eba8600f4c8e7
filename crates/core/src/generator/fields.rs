//! Field and computed-field synthesis

use serde::Serialize;

use crate::diagnostics::Diagnostic;
use crate::parser::{ParsedEntity, S3Transform, TypeField};

/// Known defaults keyed by field name
const FIELD_DEFAULTS: &[(&str, &str)] = &[
    ("isActive", "true"),
    ("isDeleted", "false"),
    ("position", "0"),
    ("order", "0"),
    ("tags", "[]"),
];

/// Primitive kind of a descriptor field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    DateTime,
    Json,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::DateTime => "datetime",
            FieldKind::Json => "json",
        }
    }

    /// Kind for a TypeScript element type; `None` when unrecognised
    pub fn from_type(type_name: &str) -> Option<Self> {
        let type_name = type_name.trim();
        match type_name {
            "string" => Some(FieldKind::String),
            "number" | "bigint" => Some(FieldKind::Number),
            "boolean" => Some(FieldKind::Boolean),
            "Date" => Some(FieldKind::DateTime),
            "any" | "unknown" | "object" => Some(FieldKind::Json),
            _ if type_name.starts_with("Record<") || type_name.starts_with('{') => {
                Some(FieldKind::Json)
            }
            _ if is_string_literal_union(type_name) => Some(FieldKind::String),
            _ => None,
        }
    }
}

fn is_string_literal_union(type_name: &str) -> bool {
    type_name
        .split('|')
        .map(str::trim)
        .all(|member| member.starts_with('"') || member.starts_with('\''))
}

/// One entry of the descriptor's `fields` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldConfig {
    pub name: String,
    pub kind: FieldKind,
    pub is_array: bool,
    pub required: bool,
    pub meta: bool,
    pub default: Option<String>,
    /// Signing transform, when the serialiser signed this attribute
    pub transform: Option<S3Transform>,
}

impl FieldConfig {
    /// `"string"`, `"string[]"`, ...
    pub fn type_literal(&self) -> String {
        if self.is_array {
            format!("{}[]", self.kind.as_str())
        } else {
            self.kind.as_str().to_string()
        }
    }
}

/// One entry of the descriptor's `computed` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputedConfig {
    pub name: String,
    /// Mapper expression, verbatim
    pub expression: String,
    pub meta: bool,
}

pub fn build_fields(parsed: &ParsedEntity, diagnostics: &mut Vec<Diagnostic>) -> Vec<FieldConfig> {
    let serialiser = &parsed.serialiser;
    let computed: Vec<&str> = parsed.mapper.computed().map(|f| f.name.as_str()).collect();

    let fields: Vec<FieldConfig> = parsed
        .entity_type
        .fields
        .iter()
        .filter(|field| !computed.contains(&field.name.as_str()))
        .map(|field| build_field(field, parsed, diagnostics))
        .collect();

    for transform in &serialiser.s3_transforms {
        if !fields.iter().any(|f| f.name == transform.field_name) {
            diagnostics.push(Diagnostic::warning(format!(
                "signed attribute `{}` has no matching type field; its transform was not carried over",
                transform.field_name
            )));
        }
    }

    fields
}

fn build_field(field: &TypeField, parsed: &ParsedEntity, diagnostics: &mut Vec<Diagnostic>) -> FieldConfig {
    let serialiser = &parsed.serialiser;

    let kind = FieldKind::from_type(field.item_type()).unwrap_or_else(|| {
        diagnostics.push(Diagnostic::info(format!(
            "field `{}` has type `{}`; emitted as string",
            field.name, field.type_name
        )));
        FieldKind::String
    });

    let transform = serialiser.transform_for(&field.name).cloned();
    let is_array = transform
        .as_ref()
        .map_or_else(|| field.is_array(), |t| t.is_array);

    FieldConfig {
        name: field.name.clone(),
        kind,
        is_array,
        required: !field.optional && serialiser.has_attribute(&field.name),
        meta: serialiser.is_meta(&field.name),
        default: FIELD_DEFAULTS
            .iter()
            .find(|(name, _)| *name == field.name)
            .map(|(_, value)| (*value).to_string()),
        transform,
    }
}

pub fn build_computed(parsed: &ParsedEntity) -> Vec<ComputedConfig> {
    parsed
        .mapper
        .computed()
        .map(|field| ComputedConfig {
            name: field.name.clone(),
            expression: field.mapping.clone(),
            meta: parsed.serialiser.is_meta(&field.name),
        })
        .collect()
}

/// Body of a signing transform, one statement per line
///
/// Scalar: null guard, then one signing call. Array: length guard, then every
/// element signed and combined.
pub fn signing_transform(field_name: &str, is_array: bool) -> Vec<String> {
    if is_array {
        vec![
            format!("if (!data.{field_name}?.length) return [];"),
            format!(
                "return await Promise.all(data.{field_name}.map((item: string) => services.S3Service.generateSignedUrl({{ key: item }})));"
            ),
        ]
    } else {
        vec![
            format!("if (!data.{field_name}) return undefined;"),
            format!("return await services.S3Service.generateSignedUrl({{ key: data.{field_name} }});"),
        ]
    }
}
