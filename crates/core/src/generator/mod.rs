//! Descriptor generation
//!
//! Turns a [`ParsedEntity`] into the source text of the consolidated
//! descriptor (`{name}.ts`) and the regenerated meta file (`{name}.meta.ts`).
//! Nothing here touches the file system.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cypher::CypherRelationship;
use crate::diagnostics::Diagnostic;
use crate::import::ImportStatement;
use crate::parser::entity_type::FRAMEWORK_TYPES;
use crate::parser::{ParsedEntity, TypeField, SIGNING_SERVICE};
use crate::paths::{relative_specifier, strip_legacy_suffix};
use crate::resolver::ResolverChain;

pub mod fields;
pub mod imports;
pub mod relationships;
pub mod render;

pub use fields::{ComputedConfig, FieldConfig, FieldKind};
pub use imports::{ImportGroup, ImportPlan};
pub use relationships::{Cardinality, RelationshipConfig};

/// Module specifier prefixes that are project path aliases, not packages
const PATH_ALIAS_PREFIXES: &[&str] = &["@/", "~/", "src/"];

/// Inputs beyond the parsed entity
#[derive(Debug, Clone)]
pub struct GeneratorContext {
    /// Absolute path of the framework barrel module (no extension)
    pub framework_barrel: PathBuf,
    /// Public framework package; never imported from directly
    pub framework_package: String,
    /// Edges found in the module's query text
    pub extracted_relationships: Vec<CypherRelationship>,
}

/// Generated sources plus the structured configuration behind them
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDescriptor {
    pub descriptor_name: String,
    pub code: String,
    pub meta_code: String,
    pub imports: Vec<ImportStatement>,
    pub fields: Vec<FieldConfig>,
    pub computed: Vec<ComputedConfig>,
    pub relationships: Vec<RelationshipConfig>,
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Generate the descriptor and meta sources for one entity
///
/// `entity_dir` is the directory the descriptor is written to; every relative
/// import is computed from it.
pub fn generate(parsed: &ParsedEntity, entity_dir: &Path, context: &GeneratorContext) -> GeneratedDescriptor {
    let mut diagnostics = Vec::new();
    let label = parsed.label();

    let fields = fields::build_fields(parsed, &mut diagnostics);
    let computed = fields::build_computed(parsed);
    let resolvers = ResolverChain::new(context.extracted_relationships.clone());
    let relationships = relationships::build_relationships(parsed, &resolvers, &mut diagnostics);

    let imports = plan_imports(parsed, entity_dir, context, &fields, &relationships, &mut diagnostics);

    let type_fields: Vec<&TypeField> = parsed
        .entity_type
        .fields
        .iter()
        .chain(parsed.entity_type.relationship_fields.iter())
        .collect();

    let meta_const = parsed.meta_const();
    let code = render::render_descriptor(&render::DescriptorParts {
        entity_name: &parsed.entity_name,
        label: &label,
        meta_const: &meta_const,
        imports: &imports,
        type_fields,
        fields: &fields,
        computed: &computed,
        relationships: &relationships,
        aliases: &parsed.alias_models,
    });

    GeneratedDescriptor {
        descriptor_name: parsed.descriptor_symbol(),
        code,
        meta_code: render::render_meta(parsed),
        imports,
        fields,
        computed,
        relationships,
        diagnostics,
    }
}

fn plan_imports(
    parsed: &ParsedEntity,
    entity_dir: &Path,
    context: &GeneratorContext,
    fields: &[FieldConfig],
    relationships: &[RelationshipConfig],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ImportStatement> {
    let mut plan = ImportPlan::new();
    let entity_type = &parsed.entity_type;
    let label = parsed.label();

    // 1. framework barrel
    let barrel = relative_specifier(entity_dir, &context.framework_barrel);
    plan.add(ImportGroup::Framework, &barrel, "defineEntity", false);
    if !parsed.alias_models.is_empty() {
        plan.add(ImportGroup::Framework, &barrel, "defineEntityAlias", false);
    }
    plan.add(ImportGroup::Framework, &barrel, "Entity", false);
    if fields.iter().any(|f| f.transform.is_some()) {
        plan.add(ImportGroup::Framework, &barrel, SIGNING_SERVICE, false);
    }

    let is_framework_source = |source: &str| {
        source == context.framework_package
            || source.starts_with(&format!("{}/", context.framework_package))
    };
    let all_members: Vec<&TypeField> = entity_type
        .fields
        .iter()
        .chain(entity_type.relationship_fields.iter())
        .collect();

    for statement in entity_type.imports.iter().filter(|s| is_framework_source(&s.source)) {
        for name in &statement.names {
            let used = all_members
                .iter()
                .any(|member| mentions(&member.type_name, name.local()));
            if used {
                plan.add(ImportGroup::Framework, &barrel, name.local(), false);
            }
        }
    }
    for member in &entity_type.relationship_fields {
        let type_name = member.item_type();
        if FRAMEWORK_TYPES.contains(&type_name) {
            plan.add(ImportGroup::Framework, &barrel, type_name, false);
        }
    }

    // 2. external packages, verbatim
    for statement in &entity_type.imports {
        let source = statement.source.as_str();
        let is_alias = PATH_ALIAS_PREFIXES.iter().any(|p| source.starts_with(p));
        if statement.is_relative() || is_alias || is_framework_source(source) {
            continue;
        }
        plan.add_verbatim(ImportGroup::External, statement);
    }

    // 3. relationship field types, type-only
    for member in &entity_type.relationship_fields {
        let type_name = member.item_type();
        if type_name == label || plan.is_bound(type_name) {
            continue;
        }

        let source = entity_type
            .imports
            .iter()
            .find(|s| s.binds(type_name))
            .map(|s| strip_legacy_suffix(&s.source))
            .or_else(|| {
                parsed
                    .serialiser
                    .relationships
                    .iter()
                    .find(|r| r.name == member.name)
                    .and_then(|r| r.import_path.as_deref())
                    .map(strip_legacy_suffix)
            });

        match source {
            Some(source) => {
                plan.add(ImportGroup::RelationshipTypes, &source, type_name, true);
            }
            None => diagnostics.push(Diagnostic::warning(format!(
                "type `{type_name}` of relationship field `{}` has no import to copy; add it by hand",
                member.name
            ))),
        }
    }

    // local value types of scalar members (enums, value objects)
    for statement in entity_type.imports.iter().filter(|s| s.is_relative()) {
        for name in statement.names.iter().filter(|n| n.alias.is_none()) {
            let used = entity_type
                .fields
                .iter()
                .any(|field| mentions(&field.type_name, &name.name));
            if used && !plan.is_bound(&name.name) {
                let source = strip_legacy_suffix(&statement.source);
                plan.add(ImportGroup::RelationshipTypes, &source, &name.name, true);
            }
        }
    }

    // 4. own meta, alias metas, relationship targets
    plan.add(
        ImportGroup::Local,
        &format!("./{}.meta", parsed.entity_name),
        &parsed.meta_const(),
        false,
    );
    for alias in &parsed.alias_models {
        let source = alias.meta_import.strip_suffix(".ts").unwrap_or(&alias.meta_import);
        plan.add(ImportGroup::Local, source, &alias.meta_name, false);
    }
    for relationship in relationships {
        plan.add(
            ImportGroup::Local,
            &relationship.model_path,
            &relationship.model_symbol,
            false,
        );
    }

    plan.into_statements()
}

/// Whether `ident` appears as a whole identifier inside a type expression
fn mentions(type_expression: &str, ident: &str) -> bool {
    type_expression
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
        .any(|token| token == ident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::cypher::Direction;
    use crate::parser::entity_type::parse_entity_type;
    use crate::parser::mapper::parse_mapper;
    use crate::parser::meta::parse_meta;
    use crate::parser::serialiser::parse_serialiser;
    use crate::parser::typescript::SourceFile;
    use crate::parser::{AliasModelInfo, ParsedMapper, ParsedSerialiser};

    const ENTITY_DIR: &str = "/app/src/features/photo/entities";

    fn source(name: &str, content: &str) -> SourceFile {
        SourceFile::parse(&Path::new(ENTITY_DIR).join(name), content.to_string()).unwrap()
    }

    fn context() -> GeneratorContext {
        GeneratorContext {
            framework_barrel: PathBuf::from("/app/src/common"),
            framework_package: "@carlonicora/nestjs-neo4jsonapi".to_string(),
            extracted_relationships: Vec::new(),
        }
    }

    fn photo() -> ParsedEntity {
        let meta = parse_meta(&source(
            "photo.meta.ts",
            "export const photoMeta: DataMeta = {\n  type: \"photos\",\n  endpoint: \"photos\",\n  nodeName: \"photo\",\n  labelName: \"Photo\",\n};\n",
        ));
        let mapper = parse_mapper(&source(
            "photo.map.ts",
            r#"export const mapPhoto = (params: { data: any; record: any }) => {
  return {
    title: params.data.title,
    commentCount: params.record.has("commentCount") ? Number(params.record.get("commentCount")) : 0,
  };
};
"#,
        ));
        let serialiser = parse_serialiser(
            &source(
                "photo.serialiser.ts",
                r#"import { UserModel } from "../../user/entities/user.model";
import { AlbumDescriptor } from "../../album/entities/album";

export class PhotoSerialiser extends AbstractJsonApiSerialiser {
  constructor(serialiserFactory: SerialiserFactory, private readonly s3Service: S3Service) {
    super(serialiserFactory);
  }

  create(): JsonApiDataInterface {
    this.attributes = {
      title: "title",
      metadata: "metadata",
      url: async (data: Photo) => {
        return await this.s3Service.generateSignedUrl({ key: data.url });
      },
      gallery: async (data: Photo) => {
        return await Promise.all(data.gallery.map((key) => this.s3Service.generateSignedUrl({ key })));
      },
      createdAt: "createdAt",
    };
    this.meta = { commentCount: "commentCount" };
    this.relationships = {
      author: { data: this.serialiserFactory.create(UserModel) },
      albums: { dtoKey: "albums", data: this.serialiserFactory.create(AlbumDescriptor.model) },
    };
    return super.create();
  }
}
"#,
            ),
            Path::new(ENTITY_DIR),
        );
        let entity_type = parse_entity_type(
            &source(
                "photo.entity.ts",
                r#"import { Entity, User } from "@carlonicora/nestjs-neo4jsonapi";
import type { JsonValue } from "type-fest";
import { Album } from "../../album/entities/album.entity";

export type Photo = Entity & {
  title: string;
  metadata?: Record<string, JsonValue>;
  url: string;
  gallery: string[];
  isActive: boolean;
  createdAt: Date;
  commentCount?: number;
  author: User;
  albums?: Album[];
};
"#,
            ),
            "Photo",
            &serialiser,
        );

        ParsedEntity {
            entity_name: "photo".to_string(),
            meta,
            entity_type,
            mapper,
            serialiser,
            alias_models: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn photo_descriptor_fields() {
        let generated = generate(&photo(), Path::new(ENTITY_DIR), &context());

        let names: Vec<&str> = generated.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["title", "metadata", "url", "gallery", "isActive", "createdAt"]);

        let title = &generated.fields[0];
        assert!(title.required);
        let metadata = &generated.fields[1];
        assert!(!metadata.required);
        assert_eq!(metadata.kind, FieldKind::Json);
        let is_active = &generated.fields[4];
        assert!(!is_active.required);
        assert_eq!(is_active.default.as_deref(), Some("true"));
        assert_eq!(generated.fields[5].kind, FieldKind::DateTime);

        assert_eq!(generated.computed.len(), 1);
        assert!(generated.computed[0].meta);
    }

    #[test]
    fn photo_descriptor_code_layout() {
        let generated = generate(&photo(), Path::new(ENTITY_DIR), &context());
        let code = &generated.code;

        assert!(code.contains(
            "import { defineEntity, Entity, S3Service, User } from \"../../../common\";"
        ));
        assert!(code.contains("import type { JsonValue } from \"type-fest\";"));
        assert!(code.contains(
            "import { Album, AlbumDescriptor } from \"../../album/entities/album\";"
        ));
        assert!(code.contains("import { photoMeta } from \"./photo.meta\";"));
        assert!(code.contains("import { userMeta } from \"../../user/entities/user.meta\";"));

        let framework = code.find("../../../common").unwrap();
        let external = code.find("type-fest").unwrap();
        let own_meta = code.find("./photo.meta").unwrap();
        assert!(framework < external && external < own_meta);

        assert!(code.contains("export const PhotoDescriptor = defineEntity<Photo>()({\n  ...photoMeta,\n  injectServices: [S3Service],\n"));
        assert!(code.contains("    title: { type: \"string\", required: true },\n"));
        assert!(code.contains("    gallery: {\n      type: \"string[]\",\n      required: true,\n"));
        assert!(code.contains("if (!data.url) return undefined;"));
        assert!(code.contains("if (!data.gallery?.length) return [];"));
        assert!(code.contains("export type PhotoDescriptorType = typeof PhotoDescriptor;"));

        let fields = code.find("  fields: {").unwrap();
        let computed = code.find("  computed: {").unwrap();
        let relationships = code.find("  relationships: {").unwrap();
        assert!(fields < computed && computed < relationships);
    }

    #[test]
    fn photo_relationships() {
        let generated = generate(&photo(), Path::new(ENTITY_DIR), &context());
        let relationships = &generated.relationships;

        assert_eq!(relationships[0].name, "author");
        assert_eq!(relationships[0].model, "userMeta");
        assert_eq!(relationships[0].cardinality, Cardinality::One);
        assert_eq!(relationships[0].direction, Direction::In);
        assert_eq!(relationships[0].required, None);

        assert_eq!(relationships[1].model, "AlbumDescriptor.model");
        assert_eq!(relationships[1].cardinality, Cardinality::Many);
        assert_eq!(relationships[1].required, Some(false));

        assert!(generated.code.contains(
            "    albums: {\n      model: AlbumDescriptor.model,\n      direction: \"out\",\n      relationship: \"RELATED_TO\",\n      cardinality: \"many\",\n      required: false,\n      dtoKey: \"albums\",\n    },\n"
        ));
    }

    #[test]
    fn extracted_relationships_override_heuristics() {
        let mut context = context();
        context.extracted_relationships = vec![CypherRelationship {
            name: "author".to_string(),
            relationship_type: "WROTE".to_string(),
            direction: Direction::Out,
            related_label: None,
            fields: Vec::new(),
        }];

        let generated = generate(&photo(), Path::new(ENTITY_DIR), &context);
        assert_eq!(generated.relationships[0].relationship, "WROTE");
        assert_eq!(generated.relationships[0].direction, Direction::Out);
    }

    #[test]
    fn generation_is_deterministic() {
        let first = generate(&photo(), Path::new(ENTITY_DIR), &context());
        let second = generate(&photo(), Path::new(ENTITY_DIR), &context());
        assert_eq!(first.code, second.code);
        assert_eq!(first.meta_code, second.meta_code);
    }

    #[test]
    fn imports_never_repeat_a_symbol() {
        let generated = generate(&photo(), Path::new(ENTITY_DIR), &context());
        let mut seen = std::collections::HashSet::new();
        for statement in &generated.imports {
            for name in &statement.names {
                assert!(seen.insert(name.local().to_string()), "{} imported twice", name.local());
            }
        }
    }

    #[test]
    fn enum_typed_members_stay_fields() {
        let serialiser = parse_serialiser(
            &source(
                "photo.serialiser.ts",
                "export class PhotoSerialiser {\n  create() {\n    this.attributes = { title: \"title\", status: \"status\", metadata: \"metadata\" };\n  }\n}\n",
            ),
            Path::new(ENTITY_DIR),
        );
        let entity_type = parse_entity_type(
            &source(
                "photo.entity.ts",
                "import type { JsonValue } from \"type-fest\";\nimport { PhotoStatus } from \"./photo.status\";\n\nexport type Photo = Entity & {\n  title: string;\n  status: PhotoStatus;\n  metadata: JsonValue;\n};\n",
            ),
            "Photo",
            &serialiser,
        );
        let mut parsed = photo();
        parsed.entity_type = entity_type;
        parsed.mapper = ParsedMapper::default();
        parsed.serialiser = serialiser;

        let generated = generate(&parsed, Path::new(ENTITY_DIR), &context());

        let names: Vec<&str> = generated.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["title", "status", "metadata"]);
        assert_eq!(generated.fields[1].kind, FieldKind::String);
        assert!(generated.fields[1].required);
        assert!(generated.relationships.is_empty());
        assert!(generated
            .diagnostics
            .iter()
            .any(|d| d.severity == crate::diagnostics::Severity::Info
                && d.message.contains("`status` has type `PhotoStatus`")));
        assert!(generated.code.contains("    status: { type: \"string\", required: true },\n"));
        assert!(generated
            .code
            .contains("import type { PhotoStatus } from \"./photo.status\";"));
    }

    #[test]
    fn plain_entity_has_fields_only() {
        let entity_type = parse_entity_type(
            &source(
                "note.ts",
                "export type Note = Entity & {\n  title: string;\n  count: number;\n  isActive: boolean;\n  createdAt: Date;\n};\n",
            ),
            "Note",
            &ParsedSerialiser::default(),
        );
        let parsed = ParsedEntity {
            entity_name: "note".to_string(),
            meta: parse_meta(&source(
                "note.meta.ts",
                "export const noteMeta = { type: \"notes\", endpoint: \"notes\", nodeName: \"note\", labelName: \"Note\" };\n",
            )),
            entity_type,
            mapper: ParsedMapper::default(),
            serialiser: ParsedSerialiser::default(),
            alias_models: Vec::new(),
            diagnostics: Vec::new(),
        };

        let generated = generate(&parsed, Path::new(ENTITY_DIR), &context());

        assert!(generated.code.contains("  fields: {"));
        assert!(generated.code.contains("createdAt: { type: \"datetime\" }"));
        assert!(!generated.code.contains("injectServices"));
        assert!(!generated.code.contains("computed:"));
        assert!(!generated.code.contains("relationships:"));
    }

    #[test]
    fn aliases_render_after_type_export() {
        let mut parsed = photo();
        parsed.alias_models = vec![AliasModelInfo {
            model_name: "CoverModel".to_string(),
            meta_name: "coverMeta".to_string(),
            descriptor_name: "CoverDescriptor".to_string(),
            meta_import: "./cover.meta".to_string(),
        }];

        let generated = generate(&parsed, Path::new(ENTITY_DIR), &context());
        assert!(generated.code.contains("defineEntityAlias"));
        assert!(generated.code.contains("import { coverMeta } from \"./cover.meta\";"));
        assert!(generated
            .code
            .ends_with("export const CoverDescriptor = defineEntityAlias(PhotoDescriptor, coverMeta);\n"));
    }

    #[test]
    fn meta_file_keeps_comments() {
        let mut parsed = photo();
        parsed.meta = parse_meta(&source(
            "photo.meta.ts",
            "// Copyright (c) Gallery Ltd.\nimport { DataMeta } from \"../../common\";\n\n/** Photo identity */\nexport const photoMeta: DataMeta = { type: \"photos\", endpoint: \"photos\", nodeName: \"photo\", labelName: \"Photo\" };\n",
        ));

        let generated = generate(&parsed, Path::new(ENTITY_DIR), &context());
        assert_eq!(
            generated.meta_code,
            "// Copyright (c) Gallery Ltd.\n\nimport { DataMeta } from \"../../common\";\n\n/** Photo identity */\nexport const photoMeta: DataMeta = {\n  type: \"photos\",\n  endpoint: \"photos\",\n  nodeName: \"photo\",\n  labelName: \"Photo\",\n};\n"
        );
    }

    #[test]
    fn meta_file_keeps_annotation_and_order() {
        let generated = generate(&photo(), Path::new(ENTITY_DIR), &context());
        assert_eq!(
            generated.meta_code,
            "export const photoMeta: DataMeta = {\n  type: \"photos\",\n  endpoint: \"photos\",\n  nodeName: \"photo\",\n  labelName: \"Photo\",\n};\n"
        );
    }
}
