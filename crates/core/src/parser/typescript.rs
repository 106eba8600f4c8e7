//! TypeScript parsing using tree-sitter
//!
//! Wraps a parsed source file and the small set of node helpers every stage
//! needs: node text, pre-order traversal, string literal values and
//! ancestor checks.

use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser as TsParser, Tree};

use crate::error::MigrationError;
use crate::overlay::Overlay;

/// Grammar flavour, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    TypeScript,
    Tsx,
}

impl Dialect {
    /// Pick the grammar for a path (`.tsx` gets the JSX-aware grammar)
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tsx") => Dialect::Tsx,
            _ => Dialect::TypeScript,
        }
    }

    fn language(self) -> tree_sitter::Language {
        match self {
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

/// A TypeScript source file together with its syntax tree
pub struct SourceFile {
    path: PathBuf,
    source: String,
    tree: Tree,
}

impl SourceFile {
    /// Read and parse a file, planned content first
    pub fn read(path: &Path, overlay: &Overlay) -> Result<Self, MigrationError> {
        let source = overlay.read(path)?;
        Self::parse(path, source)
    }

    /// Parse in-memory source; `path` only selects the dialect and labels errors
    pub fn parse(path: &Path, source: String) -> Result<Self, MigrationError> {
        let mut parser = TsParser::new();
        parser
            .set_language(&Dialect::for_path(path).language())
            .map_err(|e| MigrationError::ParserInit(e.to_string()))?;

        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| MigrationError::syntax(path, "parser produced no tree"))?;

        Ok(Self {
            path: path.to_path_buf(),
            source,
            tree,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by a node
    pub fn text(&self, node: Node<'_>) -> &str {
        &self.source[node.byte_range()]
    }

    /// Every node of the file in pre-order
    pub fn descendants(&self) -> Vec<Node<'_>> {
        descendants(self.root())
    }

    /// Text of a named field child, if present
    pub fn field_text(&self, node: Node<'_>, field: &str) -> Option<&str> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    /// Unquoted value of a `string` or plain `template_string` node
    pub fn string_value(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "string" | "template_string" => {
                let text = self.text(node);
                if text.len() >= 2 {
                    Some(text[1..text.len() - 1].to_string())
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Collect `node` and all of its descendants in pre-order
pub fn descendants(node: Node<'_>) -> Vec<Node<'_>> {
    let mut nodes = Vec::new();
    let mut stack = vec![node];
    let mut cursor = node.walk();

    while let Some(current) = stack.pop() {
        nodes.push(current);
        let children: Vec<Node<'_>> = current.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    nodes
}

/// Named children of a node, collected
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Whether any ancestor of `node` has one of the given kinds
pub fn has_ancestor(node: Node<'_>, kinds: &[&str]) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if kinds.contains(&parent.kind()) {
            return true;
        }
        current = parent.parent();
    }
    false
}

/// 1-indexed line a node starts on
pub fn start_line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typescript_and_reads_strings() {
        let file = SourceFile::parse(
            Path::new("photo.meta.ts"),
            "export const photoMeta = { type: \"photos\" };\n".to_string(),
        )
        .unwrap();

        let strings: Vec<String> = file
            .descendants()
            .into_iter()
            .filter_map(|n| file.string_value(n))
            .collect();

        assert_eq!(strings, vec!["photos".to_string()]);
        assert!(!file.root().has_error());
    }

    #[test]
    fn dialect_by_extension() {
        assert_eq!(Dialect::for_path(Path::new("a/b.tsx")), Dialect::Tsx);
        assert_eq!(Dialect::for_path(Path::new("a/b.ts")), Dialect::TypeScript);
    }

    #[test]
    fn ancestor_lookup() {
        let file = SourceFile::parse(
            Path::new("x.ts"),
            "import { A } from \"./a\";\nconst b = A;\n".to_string(),
        )
        .unwrap();

        let identifiers: Vec<bool> = file
            .descendants()
            .into_iter()
            .filter(|n| n.kind() == "identifier" && file.text(*n) == "A")
            .map(|n| has_ancestor(n, &["import_statement"]))
            .collect();

        assert_eq!(identifiers, vec![true, false]);
    }
}
