//! Import planning for generated descriptors
//!
//! Imports are emitted in four groups: the framework barrel, external
//! packages, type-only relationship types, then local metas and descriptors.
//! A symbol is bound by at most one statement, and statements sharing a
//! module specifier are merged.

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::import::{ImportStatement, ImportedName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportGroup {
    Framework,
    External,
    RelationshipTypes,
    Local,
}

#[derive(Debug, Default)]
pub struct ImportPlan {
    entries: IndexMap<String, (ImportGroup, ImportStatement)>,
    bound: HashSet<String>,
}

impl ImportPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bound.contains(name)
    }

    /// Add a named import; returns `false` when the name is already bound
    pub fn add(&mut self, group: ImportGroup, source: &str, name: &str, type_only: bool) -> bool {
        if !self.bound.insert(name.to_string()) {
            return false;
        }

        match self.entries.get_mut(source) {
            Some((_, statement)) => {
                statement.names.push(ImportedName::new(name));
                statement.type_only &= type_only;
                statement.text = statement.render();
            }
            None => {
                let statement = ImportStatement::named([name], source, type_only);
                self.entries.insert(source.to_string(), (group, statement));
            }
        }
        true
    }

    /// Copy an existing statement, keeping its text unless bindings collide
    pub fn add_verbatim(&mut self, group: ImportGroup, statement: &ImportStatement) {
        let mut bindings: Vec<&str> = statement.names.iter().map(ImportedName::local).collect();
        bindings.extend(statement.default.as_deref());
        bindings.extend(statement.namespace.as_deref());

        let clashes = bindings.iter().any(|b| self.bound.contains(*b));
        if !clashes && !self.entries.contains_key(&statement.source) {
            self.bound.extend(bindings.iter().map(|b| (*b).to_string()));
            self.entries
                .insert(statement.source.clone(), (group, statement.clone()));
            return;
        }

        // Fall back to merging the free names one by one
        for name in &statement.names {
            if name.alias.is_none() {
                self.add(group, &statement.source, &name.name, statement.type_only);
            }
        }
    }

    /// Statements ordered by group, insertion order within a group
    pub fn into_statements(self) -> Vec<ImportStatement> {
        let mut entries: Vec<(ImportGroup, ImportStatement)> = self.entries.into_values().collect();
        entries.sort_by_key(|(group, _)| *group);
        entries.into_iter().map(|(_, statement)| statement).collect()
    }
}
