//! Module specifier arithmetic
//!
//! Import specifiers are computed lexically; nothing here touches the file
//! system.

use std::path::{Component, Path, PathBuf};

/// Legacy per-entity file suffixes dropped when pointing at the new descriptor
const LEGACY_SUFFIXES: &[&str] = &[".meta", ".model", ".entity", ".map", ".serialiser"];

/// Resolve `.` and `..` components without consulting the file system
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Relative module specifier from `from_dir` to `target` (no extension)
///
/// Always starts with `./` or `../` and uses forward slashes.
pub fn relative_specifier(from_dir: &Path, target: &Path) -> String {
    let from = normalize(from_dir);
    let target = normalize(target);

    let from_parts: Vec<Component<'_>> = from.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();

    let common = from_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();
    for _ in common..from_parts.len() {
        segments.push("..".to_string());
    }
    for part in &target_parts[common..] {
        segments.push(part.as_os_str().to_string_lossy().into_owned());
    }

    let joined = segments.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{joined}")
    }
}

/// Re-express a relative specifier written in `from_dir` as seen from `to_dir`
///
/// Package and alias specifiers (`@/x`, `lodash`) are returned unchanged.
pub fn rebase_specifier(specifier: &str, from_dir: &Path, to_dir: &Path) -> String {
    if !specifier.starts_with('.') {
        return specifier.to_string();
    }
    relative_specifier(to_dir, &from_dir.join(specifier))
}

/// Drop a trailing `.ts` and any legacy per-entity suffix
pub fn strip_legacy_suffix(specifier: &str) -> String {
    let mut stripped = specifier.strip_suffix(".ts").unwrap_or(specifier);
    for suffix in LEGACY_SUFFIXES {
        if let Some(rest) = stripped.strip_suffix(suffix) {
            stripped = rest;
            break;
        }
    }
    stripped.to_string()
}

/// Whether a specifier points at a legacy per-entity file
pub fn has_legacy_suffix(specifier: &str) -> bool {
    strip_legacy_suffix(specifier) != specifier.strip_suffix(".ts").unwrap_or(specifier)
}
