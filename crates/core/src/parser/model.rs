//! Alias model detection in `{name}.model.ts`
//!
//! An alias model spreads the base model and a different meta object:
//! `export const OwnerModel = { ...UserModel, ...ownerMeta };`

use serde::Serialize;

use super::meta::unwrap_object;
use super::typescript::{named_children, SourceFile};
use crate::import::extract_imports;

/// Secondary exported view of a base entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasModelInfo {
    /// Legacy model symbol (e.g. `OwnerModel`)
    pub model_name: String,
    /// Meta constant spread into it (e.g. `ownerMeta`)
    pub meta_name: String,
    /// Generated descriptor symbol (e.g. `OwnerDescriptor`)
    pub descriptor_name: String,
    /// Specifier of the meta constant as imported by the model file
    pub meta_import: String,
}

/// Find alias models; `base_model` and `own_meta` identify the entity itself
pub fn parse_alias_models(
    file: &SourceFile,
    base_model: &str,
    own_meta: &str,
    entity_name: &str,
) -> Vec<AliasModelInfo> {
    let imports = extract_imports(file);
    let mut aliases = Vec::new();

    for node in file.descendants() {
        if node.kind() != "variable_declarator" {
            continue;
        }
        let Some(model_name) = file.field_text(node, "name") else {
            continue;
        };
        if model_name == base_model {
            continue;
        }
        let Some(object) = node.child_by_field_name("value").and_then(unwrap_object) else {
            continue;
        };

        let spreads: Vec<String> = named_children(object)
            .into_iter()
            .filter(|n| n.kind() == "spread_element")
            .filter_map(|spread| named_children(spread).into_iter().next())
            .map(|expr| file.text(expr).to_string())
            .collect();

        let spreads_base = spreads.iter().any(|s| s.ends_with("Model"));
        let Some(meta_name) = spreads
            .iter()
            .find(|s| s.ends_with("Meta") && s.as_str() != own_meta)
        else {
            continue;
        };
        if !spreads_base {
            continue;
        }

        let meta_import = imports
            .iter()
            .find(|i| i.binds(meta_name))
            .map(|i| i.source.clone())
            .unwrap_or_else(|| format!("./{entity_name}.meta"));

        aliases.push(AliasModelInfo {
            model_name: model_name.to_string(),
            meta_name: meta_name.clone(),
            descriptor_name: descriptor_name_for(model_name),
            meta_import,
        });
    }

    aliases
}

/// `OwnerModel` → `OwnerDescriptor`
pub fn descriptor_name_for(model_name: &str) -> String {
    let base = model_name.strip_suffix("Model").unwrap_or(model_name);
    format!("{base}Descriptor")
}
