//! `{name}.serialiser.ts` parsing
//!
//! Walks the serialiser class: constructor parameters give the injected
//! services, `this.attributes` / `this.meta` / `this.relationships`
//! assignments give the JSON:API shape, and attribute functions that call the
//! URL signer become signing transforms.

use serde::Serialize;
use std::path::Path;
use tree_sitter::Node;

use super::meta::{object_pairs, unwrap_object};
use super::typescript::{descendants, named_children, SourceFile};
use crate::import::{extract_imports, ImportStatement};
use crate::paths::rebase_specifier;

/// Call that signs a storage key into a URL
pub const SIGNING_CALL: &str = "generateSignedUrl";
/// Combinator used when signing every element of an array
pub const BATCH_COMBINATOR: &str = "Promise.all";
/// The framework's own dependency, never carried over
const SERIALISER_FACTORY: &str = "SerialiserFactory";
/// Methods every serialiser has
const STANDARD_METHODS: &[&str] = &["constructor", "type", "create"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialiserRelationship {
    pub name: String,
    /// Renamed key in the JSON:API document, if any
    pub dto_key: Option<String>,
    /// Model expression passed to the factory (`UserModel`, `UserDescriptor.model`)
    pub model_import: String,
    /// Module specifier of the model symbol, rebased onto the entity directory
    pub import_path: Option<String>,
}

impl SerialiserRelationship {
    /// Whether the target already uses the descriptor form
    pub fn is_migrated_target(&self) -> bool {
        self.model_import.ends_with("Descriptor.model")
    }

    /// Symbol the model expression starts with
    pub fn model_symbol(&self) -> &str {
        self.model_import
            .split('.')
            .next()
            .unwrap_or(&self.model_import)
    }

    /// Entity type the target model stands for (`UserModel` -> `User`)
    pub fn target_type(&self) -> &str {
        let symbol = self.model_symbol();
        symbol
            .strip_suffix("Descriptor")
            .or_else(|| symbol.strip_suffix("Model"))
            .unwrap_or(symbol)
    }
}

/// Attribute whose value is a signed URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct S3Transform {
    pub field_name: String,
    pub is_array: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedSerialiser {
    pub class_name: Option<String>,
    /// Every serialised attribute, flat or computed, in source order
    pub attributes: Vec<String>,
    pub meta: Vec<String>,
    pub relationships: Vec<SerialiserRelationship>,
    pub imports: Vec<ImportStatement>,
    /// Type names of constructor-injected services
    pub services: Vec<String>,
    /// Methods beyond the standard serialiser surface
    pub custom_methods: Vec<String>,
    pub s3_transforms: Vec<S3Transform>,
}

impl ParsedSerialiser {
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    pub fn is_meta(&self, name: &str) -> bool {
        self.meta.iter().any(|m| m == name)
    }

    pub fn transform_for(&self, name: &str) -> Option<&S3Transform> {
        self.s3_transforms.iter().find(|t| t.field_name == name)
    }
}

/// Parse a serialiser; relationship import paths are rebased onto `entity_dir`
pub fn parse_serialiser(file: &SourceFile, entity_dir: &Path) -> ParsedSerialiser {
    let mut parsed = ParsedSerialiser {
        imports: extract_imports(file),
        ..ParsedSerialiser::default()
    };

    let Some(class) = file
        .descendants()
        .into_iter()
        .find(|n| n.kind() == "class_declaration")
    else {
        return parsed;
    };

    parsed.class_name = file.field_text(class, "name").map(str::to_string);

    if let Some(body) = class.child_by_field_name("body") {
        read_methods(file, body, &mut parsed);
        read_assignments(file, body, &mut parsed);
    }

    let serialiser_dir = file.path().parent().unwrap_or(entity_dir);
    for relationship in &mut parsed.relationships {
        let symbol = relationship.model_symbol().to_string();
        relationship.import_path = parsed
            .imports
            .iter()
            .find(|i| i.binds(&symbol))
            .map(|i| rebase_specifier(&i.source, serialiser_dir, entity_dir));
    }

    parsed
}

fn read_methods(file: &SourceFile, body: Node<'_>, parsed: &mut ParsedSerialiser) {
    for member in named_children(body) {
        if member.kind() != "method_definition" {
            continue;
        }
        let Some(name) = file.field_text(member, "name") else {
            continue;
        };

        if name == "constructor" {
            if let Some(parameters) = member.child_by_field_name("parameters") {
                parsed.services.extend(constructor_services(file, parameters));
            }
        } else if !STANDARD_METHODS.contains(&name) && !parsed.custom_methods.iter().any(|m| m == name) {
            parsed.custom_methods.push(name.to_string());
        }
    }
}

fn constructor_services(file: &SourceFile, parameters: Node<'_>) -> Vec<String> {
    named_children(parameters)
        .into_iter()
        .filter(|p| matches!(p.kind(), "required_parameter" | "optional_parameter"))
        .filter_map(|parameter| {
            let annotation = parameter.child_by_field_name("type")?;
            let type_text = file.text(annotation).trim_start_matches(':').trim();
            // Generic arguments are irrelevant for injection (`ConfigService<X>`)
            let type_name = type_text.split('<').next().unwrap_or(type_text).trim();
            (type_name != SERIALISER_FACTORY).then(|| type_name.to_string())
        })
        .collect()
}

fn read_assignments(file: &SourceFile, body: Node<'_>, parsed: &mut ParsedSerialiser) {
    for node in descendants(body) {
        if node.kind() != "assignment_expression" {
            continue;
        }
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            continue;
        };
        let Some(object) = unwrap_object(right) else {
            continue;
        };

        match file.text(left) {
            "this.attributes" => read_attributes(file, object, parsed),
            "this.meta" => {
                parsed.meta.extend(object_keys(file, object));
            }
            "this.relationships" => read_relationships(file, object, parsed),
            _ => {}
        }
    }
}

fn read_attributes(file: &SourceFile, object: Node<'_>, parsed: &mut ParsedSerialiser) {
    for member in named_children(object) {
        let (name, definition) = match member.kind() {
            "pair" => {
                let Some(key) = member.child_by_field_name("key") else {
                    continue;
                };
                let name = file
                    .string_value(key)
                    .unwrap_or_else(|| file.text(key).to_string());
                (name, member.child_by_field_name("value"))
            }
            "method_definition" => match file.field_text(member, "name") {
                Some(name) => (name.to_string(), Some(member)),
                None => continue,
            },
            "shorthand_property_identifier" => (file.text(member).to_string(), None),
            _ => continue,
        };

        if let Some(definition) = definition {
            let body = file.text(definition);
            if body.contains(SIGNING_CALL) {
                parsed.s3_transforms.push(S3Transform {
                    field_name: name.clone(),
                    is_array: body.contains(BATCH_COMBINATOR),
                });
            }
        }

        parsed.attributes.push(name);
    }
}

fn read_relationships(file: &SourceFile, object: Node<'_>, parsed: &mut ParsedSerialiser) {
    for (name, value) in object_pairs(file, object) {
        let Some(config) = unwrap_object(value) else {
            continue;
        };

        let mut dto_key = None;
        let mut model_import = None;
        for (key, value) in object_pairs(file, config) {
            match key.as_str() {
                "dtoKey" => dto_key = file.string_value(value),
                "data" => model_import = factory_argument(file, value),
                _ => {}
            }
        }

        let Some(model_import) = model_import else {
            continue;
        };
        parsed.relationships.push(SerialiserRelationship {
            name,
            dto_key,
            model_import,
            import_path: None,
        });
    }
}

/// First argument of `this.serialiserFactory.create(X)`
fn factory_argument(file: &SourceFile, value: Node<'_>) -> Option<String> {
    let call = descendants(value)
        .into_iter()
        .find(|n| n.kind() == "call_expression")?;
    let arguments = call.child_by_field_name("arguments")?;
    named_children(arguments)
        .into_iter()
        .next()
        .map(|arg| file.text(arg).to_string())
}

fn object_keys(file: &SourceFile, object: Node<'_>) -> Vec<String> {
    named_children(object)
        .into_iter()
        .filter_map(|member| match member.kind() {
            "pair" => member.child_by_field_name("key").map(|key| {
                file.string_value(key)
                    .unwrap_or_else(|| file.text(key).to_string())
            }),
            "shorthand_property_identifier" => Some(file.text(member).to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SERIALISER: &str = r#"import { Injectable } from "@nestjs/common";
import { UserModel } from "../../../user/entities/user.model";
import { AlbumDescriptor } from "../album";

@Injectable()
export class PhotoSerialiser extends AbstractJsonApiSerialiser implements JsonApiSerialiserFactory {
  constructor(
    serialiserFactory: SerialiserFactory,
    private readonly s3Service: S3Service,
    configService: ConfigService<BaseConfigInterface>,
  ) {
    super(serialiserFactory, configService);
  }

  get type(): string {
    return photoMeta.endpoint;
  }

  create(): JsonApiDataInterface {
    this.attributes = {
      title: "title",
      url: async (data: Photo) => {
        if (!data.url) return undefined;
        return await this.s3Service.generateSignedUrl({ key: data.url });
      },
      gallery: async (data: Photo) => {
        if (!data.gallery?.length) return [];
        return await Promise.all(data.gallery.map((key) => this.s3Service.generateSignedUrl({ key })));
      },
    };

    this.meta = {
      commentCount: "commentCount",
    };

    this.relationships = {
      author: {
        data: this.serialiserFactory.create(UserModel),
      },
      album: {
        dtoKey: "albums",
        data: this.serialiserFactory.create(AlbumDescriptor.model),
      },
    };

    return super.create();
  }

  private formatTitle(title: string): string {
    return title.trim();
  }
}
"#;

    fn parse() -> ParsedSerialiser {
        let file = SourceFile::parse(
            Path::new("/src/photo/entities/serialisers/photo.serialiser.ts"),
            SERIALISER.to_string(),
        )
        .unwrap();
        parse_serialiser(&file, &PathBuf::from("/src/photo/entities"))
    }

    #[test]
    fn attributes_meta_and_transforms() {
        let parsed = parse();

        assert_eq!(parsed.class_name.as_deref(), Some("PhotoSerialiser"));
        assert_eq!(parsed.attributes, vec!["title", "url", "gallery"]);
        assert_eq!(parsed.meta, vec!["commentCount"]);
        assert_eq!(
            parsed.s3_transforms,
            vec![
                S3Transform {
                    field_name: "url".to_string(),
                    is_array: false
                },
                S3Transform {
                    field_name: "gallery".to_string(),
                    is_array: true
                },
            ]
        );
    }

    #[test]
    fn services_exclude_factory() {
        let parsed = parse();
        assert_eq!(parsed.services, vec!["S3Service", "ConfigService"]);
        assert_eq!(parsed.custom_methods, vec!["formatTitle"]);
    }

    #[test]
    fn relationships_with_rebased_imports() {
        let parsed = parse();

        assert_eq!(parsed.relationships.len(), 2);
        let author = &parsed.relationships[0];
        assert_eq!(author.model_import, "UserModel");
        assert_eq!(author.dto_key, None);
        assert_eq!(
            author.import_path.as_deref(),
            Some("../../user/entities/user.model")
        );
        assert!(!author.is_migrated_target());

        let album = &parsed.relationships[1];
        assert_eq!(album.dto_key.as_deref(), Some("albums"));
        assert!(album.is_migrated_target());
        assert_eq!(album.model_symbol(), "AlbumDescriptor");
        assert_eq!(album.target_type(), "Album");
        assert_eq!(author.target_type(), "User");
        assert_eq!(album.import_path.as_deref(), Some("./album"));
    }
}
