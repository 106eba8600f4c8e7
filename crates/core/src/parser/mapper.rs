//! `{name}.map.ts` parsing
//!
//! The mapper returns one object literal. Each property either forwards a
//! record property (`params.data.url`) or computes a value from the query
//! record (`params.record.has("x") ? ... : 0`); computed ones keep their
//! expression verbatim for the generator.

use serde::Serialize;
use tree_sitter::Node;

use super::meta::object_pairs;
use super::typescript::SourceFile;

/// Substrings that mark an expression as probing the query record
const RECORD_PROBES: &[&str] = &["record.has(", "record.get("];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapperField {
    pub name: String,
    /// Right-hand side expression, verbatim
    pub mapping: String,
    pub is_computed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedMapper {
    pub fields: Vec<MapperField>,
}

impl ParsedMapper {
    pub fn computed(&self) -> impl Iterator<Item = &MapperField> {
        self.fields.iter().filter(|f| f.is_computed)
    }
}

pub fn parse_mapper(file: &SourceFile) -> ParsedMapper {
    let Some(object) = returned_object(file) else {
        return ParsedMapper::default();
    };

    let fields = object_pairs(file, object)
        .into_iter()
        .map(|(name, value)| {
            let mapping = file.text(value).to_string();
            let is_computed = value.kind() == "ternary_expression"
                || RECORD_PROBES.iter().any(|probe| mapping.contains(probe));
            MapperField {
                name,
                mapping,
                is_computed,
            }
        })
        .collect();

    ParsedMapper { fields }
}

/// The object literal the mapper function returns
fn returned_object<'t>(file: &'t SourceFile) -> Option<Node<'t>> {
    file.descendants().into_iter().find(|node| {
        if node.kind() != "object" {
            return false;
        }
        match node.parent() {
            Some(parent) if parent.kind() == "return_statement" => true,
            Some(parent) if parent.kind() == "parenthesized_expression" => parent
                .parent()
                .is_some_and(|grand| grand.kind() == "arrow_function"),
            _ => false,
        }
    })
}
