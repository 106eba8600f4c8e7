//! Relationship direction and edge-label resolution
//!
//! Resolution is an ordered chain of strategies. The first resolver that
//! recognises a relationship name wins:
//!
//! 1. [`ExtractedResolver`] - edges found in the module's query text
//! 2. [`HeuristicResolver`] - a fixed table keyed by relationship name
//! 3. [`FallbackResolver`] - `RELATED_TO`, outgoing
//!
//! Every result records which strategy produced it so misclassified edges can
//! be traced back in the migration report.

use serde::Serialize;

use crate::cypher::{CypherRelationship, Direction};

/// Edge label used when nothing better is known
pub const FALLBACK_EDGE: &str = "RELATED_TO";

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipSource {
    Extracted,
    Heuristic,
    Fallback,
}

impl RelationshipSource {
    pub fn describe(self) -> &'static str {
        match self {
            RelationshipSource::Extracted => "query text",
            RelationshipSource::Heuristic => "name heuristics",
            RelationshipSource::Fallback => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRelationship {
    pub direction: Direction,
    /// Raw edge label
    pub relationship: String,
    pub context_key: Option<String>,
    /// Edge property names
    pub fields: Vec<String>,
    pub source: RelationshipSource,
}

/// One strategy in the resolution chain
pub trait RelationshipResolver {
    fn resolve(&self, name: &str) -> Option<ResolvedRelationship>;
}

/// Ground truth from query text
pub struct ExtractedResolver {
    relationships: Vec<CypherRelationship>,
}

impl ExtractedResolver {
    pub fn new(relationships: Vec<CypherRelationship>) -> Self {
        Self { relationships }
    }
}

impl RelationshipResolver for ExtractedResolver {
    fn resolve(&self, name: &str) -> Option<ResolvedRelationship> {
        self.relationships
            .iter()
            .find(|r| r.name == name)
            .map(|r| ResolvedRelationship {
                direction: r.direction,
                relationship: r.relationship_type.clone(),
                context_key: None,
                fields: r.fields.clone(),
                source: RelationshipSource::Extracted,
            })
    }
}

struct Heuristic {
    name: &'static str,
    direction: Direction,
    relationship: &'static str,
    context_key: Option<&'static str>,
}

const HEURISTICS: &[Heuristic] = &[
    Heuristic { name: "author", direction: Direction::In, relationship: "PUBLISHED", context_key: None },
    Heuristic { name: "creator", direction: Direction::In, relationship: "CREATED", context_key: None },
    Heuristic { name: "editor", direction: Direction::In, relationship: "EDITED", context_key: None },
    Heuristic { name: "owner", direction: Direction::In, relationship: "OWNS", context_key: None },
    Heuristic { name: "user", direction: Direction::In, relationship: "PUBLISHED", context_key: None },
    Heuristic { name: "assignee", direction: Direction::Out, relationship: "ASSIGNED_TO", context_key: None },
    Heuristic { name: "company", direction: Direction::Out, relationship: "BELONGS_TO", context_key: Some("companyId") },
    Heuristic { name: "parent", direction: Direction::Out, relationship: "CHILD_OF", context_key: None },
    Heuristic { name: "children", direction: Direction::In, relationship: "CHILD_OF", context_key: None },
    Heuristic { name: "members", direction: Direction::In, relationship: "MEMBER_OF", context_key: None },
    Heuristic { name: "roles", direction: Direction::Out, relationship: "MEMBER_OF", context_key: None },
    Heuristic { name: "tags", direction: Direction::Out, relationship: "TAGGED_WITH", context_key: None },
];

/// Fixed name → edge table
#[derive(Default)]
pub struct HeuristicResolver;

impl RelationshipResolver for HeuristicResolver {
    fn resolve(&self, name: &str) -> Option<ResolvedRelationship> {
        HEURISTICS.iter().find(|h| h.name == name).map(|h| ResolvedRelationship {
            direction: h.direction,
            relationship: h.relationship.to_string(),
            context_key: h.context_key.map(str::to_string),
            fields: Vec::new(),
            source: RelationshipSource::Heuristic,
        })
    }
}

/// Resolves anything to an outgoing `RELATED_TO` edge
#[derive(Default)]
pub struct FallbackResolver;

impl RelationshipResolver for FallbackResolver {
    fn resolve(&self, _name: &str) -> Option<ResolvedRelationship> {
        Some(fallback())
    }
}

fn fallback() -> ResolvedRelationship {
    ResolvedRelationship {
        direction: Direction::Out,
        relationship: FALLBACK_EDGE.to_string(),
        context_key: None,
        fields: Vec::new(),
        source: RelationshipSource::Fallback,
    }
}

/// Ordered resolver chain
pub struct ResolverChain {
    resolvers: Vec<Box<dyn RelationshipResolver>>,
}

impl ResolverChain {
    /// Extracted → heuristic → fallback
    pub fn new(extracted: Vec<CypherRelationship>) -> Self {
        Self::with_resolvers(vec![
            Box::new(ExtractedResolver::new(extracted)),
            Box::new(HeuristicResolver),
        ])
    }

    /// Chain with custom strategies; the fallback is always appended
    pub fn with_resolvers(mut resolvers: Vec<Box<dyn RelationshipResolver>>) -> Self {
        resolvers.push(Box::new(FallbackResolver));
        Self { resolvers }
    }

    pub fn resolve(&self, name: &str) -> ResolvedRelationship {
        self.resolvers
            .iter()
            .find_map(|resolver| resolver.resolve(name))
            .unwrap_or_else(fallback)
    }
}
