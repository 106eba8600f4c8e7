//! Relationship extraction from graph query text
//!
//! Repository and service files carry the queries that actually traverse an
//! entity's edges. Query strings are never parsed; two edge shapes are
//! pattern-matched:
//!
//! - `(a)<-[:REL]-(b:Label)` → direction `in`
//! - `(a)-[:REL]->(b:Label)` → direction `out`
//!
//! Aliases and labels may be template placeholders (`${userMeta.labelName}`).

use heck::ToLowerCamelCase;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use crate::diagnostics::Diagnostic;
use crate::discovery::find_query_files;
use crate::error::MigrationError;
use crate::overlay::Overlay;

/// Tenant-scoping edge, never a domain relationship
pub const OWNERSHIP_EDGE: &str = "BELONGS_TO";

/// Parameter names that mark a query as assembled at runtime
const QUERY_BUILDER_PARAMS: &[&str] = &["buildQuery", "queryParams", "customCypher"];

/// Identifier characters or `${...}` placeholders
const TOKEN: &str = r"(?:[A-Za-z0-9_]|\$\{[^}]*\})+";

static INCOMING_EDGE: LazyLock<Regex> = LazyLock::new(|| {
    edge_pattern(r"<-\[", r"\]-")
});

static OUTGOING_EDGE: LazyLock<Regex> = LazyLock::new(|| {
    edge_pattern(r"-\[", r"\]->")
});

static META_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{\s*([A-Za-z0-9_]+?)Meta\.labelName\s*\}$").expect("meta label pattern is valid")
});

static META_NODE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{\s*([A-Za-z0-9_]+?)Meta\.nodeName\s*\}$").expect("meta node pattern is valid")
});

static AGGREGATE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(count|collect|sum|avg)\s*\(").expect("aggregate pattern is valid")
});

fn edge_pattern(open: &str, close: &str) -> Regex {
    let pattern = format!(
        r"\(\s*(?P<left>{TOKEN})[^)]*\)\s*{open}\s*(?:[A-Za-z0-9_]+\s*)?:\s*(?P<rel>[A-Za-z0-9_]+)(?P<props>[^\]]*){close}\s*\(\s*(?P<alias>{TOKEN})?\s*(?::\s*(?P<label>{TOKEN}))?[^)]*\)"
    );
    Regex::new(&pattern).expect("edge pattern is valid")
}

/// Which way an edge points, seen from the migrated entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An edge found in query text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CypherRelationship {
    /// Property name the relationship is exposed under
    pub name: String,
    /// Raw edge label (e.g. `PUBLISHED`)
    pub relationship_type: String,
    pub direction: Direction,
    /// Label of the node at the other end, as written
    pub related_label: Option<String>,
    /// Edge property keys written inline (`[:REL {position: $p}]`)
    pub fields: Vec<String>,
}

/// Extract relationships of `node_name` from one chunk of query-bearing source
pub fn extract_relationships(source: &str, node_name: &str) -> Vec<CypherRelationship> {
    if node_name.is_empty() {
        return Vec::new();
    }

    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let shapes = [(&*INCOMING_EDGE, Direction::In), (&*OUTGOING_EDGE, Direction::Out)];

    for (pattern, direction) in shapes {
        for captures in pattern.captures_iter(source) {
            let Some(relationship) = read_edge(&captures, direction, node_name) else {
                continue;
            };
            let key = (
                relationship.name.clone(),
                relationship.relationship_type.clone(),
                relationship.direction,
            );
            if seen.insert(key) {
                found.push(relationship);
            }
        }
    }

    found
}

/// Extract relationships from every query file of a module
///
/// # Errors
/// Fails when a query file cannot be read.
pub fn extract_module_relationships(
    module_dir: &Path,
    node_name: &str,
    overlay: &Overlay,
) -> Result<Vec<CypherRelationship>, MigrationError> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    for path in overlay.merge_listing(find_query_files(module_dir), |_| false) {
        let source = overlay.read(&path)?;
        for relationship in extract_relationships(&source, node_name) {
            let key = (
                relationship.name.clone(),
                relationship.relationship_type.clone(),
                relationship.direction,
            );
            if seen.insert(key) {
                tracing::debug!(
                    file = %path.display(),
                    name = %relationship.name,
                    edge = %relationship.relationship_type,
                    "extracted relationship"
                );
                found.push(relationship);
            }
        }
    }

    Ok(found)
}

fn read_edge(captures: &Captures<'_>, direction: Direction, node_name: &str) -> Option<CypherRelationship> {
    let left = captures.name("left")?.as_str();
    if !is_anchor(left, node_name) {
        return None;
    }

    let relationship_type = captures.name("rel")?.as_str().to_string();
    if relationship_type == OWNERSHIP_EDGE {
        return None;
    }

    let alias = captures.name("alias").map(|m| m.as_str());
    let related_label = captures.name("label").map(|m| m.as_str().to_string());

    let name = related_label
        .as_deref()
        .and_then(name_from_label)
        .or_else(|| alias.and_then(name_from_alias))
        .unwrap_or_else(|| relationship_type.to_lowercase());

    let fields = captures
        .name("props")
        .map(|m| edge_fields(m.as_str()))
        .unwrap_or_default();

    Some(CypherRelationship {
        name,
        relationship_type,
        direction,
        related_label,
        fields,
    })
}

/// The entity's own node: `photo` or `${photoMeta.nodeName}`, never `photo_album`
fn is_anchor(alias: &str, node_name: &str) -> bool {
    alias == node_name
        || META_NODE_NAME
            .captures(alias)
            .is_some_and(|captures| &captures[1] == node_name)
}

/// `${userMeta.labelName}` → `user`, `ContentType` → `contentType`
fn name_from_label(label: &str) -> Option<String> {
    if let Some(captures) = META_LABEL.captures(label) {
        return Some(captures[1].to_string());
    }
    if label.contains('$') {
        return None;
    }
    Some(label.to_lower_camel_case())
}

/// `photo_author` → `author`
fn name_from_alias(alias: &str) -> Option<String> {
    if alias.contains('$') {
        return None;
    }
    alias
        .rsplit('_')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Keys of an inline property map (`{position: $position, since: $since}`)
fn edge_fields(props: &str) -> Vec<String> {
    let Some(start) = props.find('{') else {
        return Vec::new();
    };
    let Some(end) = props.rfind('}') else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    props[start + 1..end]
        .split(',')
        .filter_map(|entry| entry.split(':').next())
        .map(str::trim)
        .filter(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .map(str::to_string)
        .collect()
}

/// Warn about query logic a descriptor cannot express
///
/// Only files named after the entity (`photo.repository.ts`) are reviewed.
///
/// # Errors
/// Fails when a query file cannot be read.
pub fn review_query_files(
    module_dir: &Path,
    entity_name: &str,
    overlay: &Overlay,
) -> Result<Vec<Diagnostic>, MigrationError> {
    let prefix = format!("{entity_name}.");
    let mut diagnostics = Vec::new();

    for path in overlay.merge_listing(find_query_files(module_dir), |_| false) {
        let owned = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(&prefix));
        if !owned {
            continue;
        }
        let source = overlay.read(&path)?;
        diagnostics.extend(review_query_source(&path, &source));
    }

    Ok(diagnostics)
}

fn review_query_source(path: &Path, source: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let builders: Vec<&str> = QUERY_BUILDER_PARAMS
        .iter()
        .copied()
        .filter(|param| source.contains(param))
        .collect();
    if !builders.is_empty() {
        diagnostics.push(
            Diagnostic::warning(format!(
                "queries are assembled at runtime ({}); review the generated descriptor against them",
                builders.join(", ")
            ))
            .in_file(path),
        );
    }

    if AGGREGATE_CALL.is_match(source) {
        diagnostics.push(
            Diagnostic::warning(
                "queries compute inline aggregates; move them to computed fields by hand",
            )
            .in_file(path),
        );
    }

    diagnostics
}
