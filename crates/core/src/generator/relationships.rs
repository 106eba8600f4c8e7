//! Relationship synthesis
//!
//! Serialiser relationships supply name, renamed key and target model; the
//! resolver chain supplies direction and edge label.

use heck::{ToKebabCase, ToLowerCamelCase};
use serde::Serialize;

use crate::cypher::Direction;
use crate::diagnostics::Diagnostic;
use crate::parser::{ParsedEntity, SerialiserRelationship};
use crate::paths::{has_legacy_suffix, strip_legacy_suffix};
use crate::resolver::{RelationshipSource, ResolverChain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    /// `many` iff the exposed key ends in the plural marker
    pub fn for_key(key: &str) -> Self {
        if key.ends_with('s') {
            Cardinality::Many
        } else {
            Cardinality::One
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cardinality::One => "one",
            Cardinality::Many => "many",
        }
    }
}

/// One entry of the descriptor's `relationships` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipConfig {
    pub name: String,
    /// Expression placed after `model:` (`userMeta`, `AlbumDescriptor.model`)
    pub model: String,
    /// Symbol that expression needs in scope
    pub model_symbol: String,
    /// Module specifier the symbol is imported from
    pub model_path: String,
    pub direction: Direction,
    pub relationship: String,
    pub cardinality: Cardinality,
    /// `Some(false)` when the type declares the relationship optional
    pub required: Option<bool>,
    pub context_key: Option<String>,
    pub dto_key: Option<String>,
    pub fields: Vec<String>,
    pub source: RelationshipSource,
}

pub fn build_relationships(
    parsed: &ParsedEntity,
    resolvers: &ResolverChain,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<RelationshipConfig> {
    parsed
        .serialiser
        .relationships
        .iter()
        .map(|relationship| build_relationship(parsed, relationship, resolvers, diagnostics))
        .collect()
}

fn build_relationship(
    parsed: &ParsedEntity,
    relationship: &SerialiserRelationship,
    resolvers: &ResolverChain,
    diagnostics: &mut Vec<Diagnostic>,
) -> RelationshipConfig {
    let resolved = resolvers.resolve(&relationship.name);
    match resolved.source {
        RelationshipSource::Fallback => diagnostics.push(Diagnostic::warning(format!(
            "relationship `{}` matched no query or known name; defaulted to {} {}, verify it",
            relationship.name, resolved.direction, resolved.relationship
        ))),
        source => diagnostics.push(Diagnostic::info(format!(
            "relationship `{}` resolved from {}: {} {}",
            relationship.name,
            source.describe(),
            resolved.direction,
            resolved.relationship
        ))),
    }

    let (model, model_symbol, model_path) = target_reference(relationship, diagnostics);
    let key = relationship.dto_key.as_deref().unwrap_or(&relationship.name);

    RelationshipConfig {
        name: relationship.name.clone(),
        model,
        model_symbol,
        model_path,
        direction: resolved.direction,
        relationship: resolved.relationship,
        cardinality: Cardinality::for_key(key),
        required: parsed
            .entity_type
            .relationship_field(&relationship.name)
            .filter(|field| field.optional)
            .map(|_| false),
        context_key: resolved.context_key,
        dto_key: relationship.dto_key.clone(),
        fields: resolved.fields,
        source: resolved.source,
    }
}

/// Model expression, symbol and import path for a relationship target
fn target_reference(
    relationship: &SerialiserRelationship,
    diagnostics: &mut Vec<Diagnostic>,
) -> (String, String, String) {
    let symbol = relationship.model_symbol().to_string();
    let base = relationship.target_type().to_string();

    if relationship.is_migrated_target() {
        let path = relationship.import_path.clone().unwrap_or_else(|| {
            let guess = format!("./{}", base.to_kebab_case());
            unresolved_target(relationship, &guess, diagnostics);
            guess
        });
        return (relationship.model_import.clone(), symbol, path);
    }

    let meta_symbol = format!("{}Meta", base.to_lower_camel_case());
    let path = match &relationship.import_path {
        Some(path) if has_legacy_suffix(path) => format!("{}.meta", strip_legacy_suffix(path)),
        Some(path) => path.clone(),
        None => {
            let guess = format!("./{}.meta", base.to_kebab_case());
            unresolved_target(relationship, &guess, diagnostics);
            guess
        }
    };
    (meta_symbol.clone(), meta_symbol, path)
}

fn unresolved_target(relationship: &SerialiserRelationship, guess: &str, diagnostics: &mut Vec<Diagnostic>) {
    diagnostics.push(Diagnostic::warning(format!(
        "no import found for `{}` (relationship `{}`); assumed \"{}\"",
        relationship.model_import, relationship.name, guess
    )));
}
