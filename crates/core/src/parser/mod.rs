//! Parser module for turning legacy entity files into an intermediate representation
//!
//! Each legacy file is parsed independently with tree-sitter. Only the meta
//! file is mandatory; every other absence degrades to an empty structure so a
//! partially legacy entity still produces a reviewable descriptor.
//!
//! # Output
//!
//! [`parse_entity()`] returns a [`ParsedEntity`]: the meta identity strings,
//! the entity type shape, mapper fields, serialiser shape and any alias
//! models, plus the diagnostics raised while reading them.

use heck::ToUpperCamelCase;
use serde::Serialize;

use crate::diagnostics::Diagnostic;
use crate::discovery::EntityFileSet;
use crate::error::MigrationError;
use crate::overlay::Overlay;

pub mod entity_type;
pub mod mapper;
pub mod meta;
pub mod model;
pub mod serialiser;
pub mod typescript;

pub use entity_type::{ParsedEntityType, TypeField};
pub use mapper::{MapperField, ParsedMapper};
pub use meta::ParsedMeta;
pub use model::AliasModelInfo;
pub use serialiser::{ParsedSerialiser, S3Transform, SerialiserRelationship};
use typescript::SourceFile;

/// Service the signing transforms depend on
pub const SIGNING_SERVICE: &str = "S3Service";

/// Everything known about one legacy entity
#[derive(Debug, Clone, Serialize)]
pub struct ParsedEntity {
    pub entity_name: String,
    pub meta: ParsedMeta,
    pub entity_type: ParsedEntityType,
    pub mapper: ParsedMapper,
    pub serialiser: ParsedSerialiser,
    pub alias_models: Vec<AliasModelInfo>,
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedEntity {
    /// Graph label / type name, derived from the entity name when the meta omits it
    pub fn label(&self) -> String {
        if self.meta.label_name.is_empty() {
            self.entity_name.to_upper_camel_case()
        } else {
            self.meta.label_name.clone()
        }
    }

    /// Exported meta constant (e.g. `photoMeta`)
    pub fn meta_const(&self) -> String {
        if self.meta.const_name.is_empty() {
            format!("{}Meta", heck::AsLowerCamelCase(&self.entity_name))
        } else {
            self.meta.const_name.clone()
        }
    }

    /// Legacy model symbol (e.g. `PhotoModel`)
    pub fn model_symbol(&self) -> String {
        format!("{}Model", self.label())
    }

    /// Generated descriptor symbol (e.g. `PhotoDescriptor`)
    pub fn descriptor_symbol(&self) -> String {
        format!("{}Descriptor", self.label())
    }
}

/// Parse every legacy file of an entity, reading through `overlay`
///
/// # Errors
/// Fails when the meta file cannot be read, or when any present file cannot be
/// read or parsed.
pub fn parse_entity(files: &EntityFileSet, overlay: &Overlay) -> Result<ParsedEntity, MigrationError> {
    let meta = meta::parse_meta(&SourceFile::read(&files.meta, overlay)?);

    let label = if meta.label_name.is_empty() {
        files.entity_name.to_upper_camel_case()
    } else {
        meta.label_name.clone()
    };

    let serialiser = match &files.serialiser {
        Some(path) => serialiser::parse_serialiser(&SourceFile::read(path, overlay)?, &files.entity_dir),
        None => ParsedSerialiser::default(),
    };

    // Serialiser relationships decide which type members are relationships
    let entity_type = match &files.entity {
        Some(path) => entity_type::parse_entity_type(&SourceFile::read(path, overlay)?, &label, &serialiser),
        None => ParsedEntityType::fallback(&label),
    };

    let mapper = match &files.map {
        Some(path) => mapper::parse_mapper(&SourceFile::read(path, overlay)?),
        None => ParsedMapper::default(),
    };

    let mut parsed = ParsedEntity {
        entity_name: files.entity_name.clone(),
        meta,
        entity_type,
        mapper,
        serialiser,
        alias_models: Vec::new(),
        diagnostics: Vec::new(),
    };

    if let Some(path) = &files.model {
        let model = SourceFile::read(path, overlay)?;
        parsed.alias_models = model::parse_alias_models(
            &model,
            &parsed.model_symbol(),
            &parsed.meta_const(),
            &files.entity_name,
        );
    }

    parsed.diagnostics = review_serialiser(&parsed, files);
    Ok(parsed)
}

/// Serialiser features the descriptor cannot express
fn review_serialiser(parsed: &ParsedEntity, files: &EntityFileSet) -> Vec<Diagnostic> {
    let Some(path) = &files.serialiser else {
        return Vec::new();
    };
    let serialiser = &parsed.serialiser;
    let mut diagnostics = Vec::new();

    if !serialiser.custom_methods.is_empty() {
        diagnostics.push(
            Diagnostic::warning(format!(
                "serialiser defines custom method(s) {}; port them to the descriptor by hand",
                serialiser.custom_methods.join(", ")
            ))
            .in_file(path),
        );
    }

    for service in &serialiser.services {
        if service != SIGNING_SERVICE {
            diagnostics.push(
                Diagnostic::info(format!("injected service {service} is not carried over"))
                    .in_file(path),
            );
        }
    }

    diagnostics
}
