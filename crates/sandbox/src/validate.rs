use std::path::{Component, Path, PathBuf};

use crate::{SandboxError, DENIED_FILENAMES, PROTECTED_WRITE_DIRS};

/// Whether a path is being validated for a read or a write/delete.
/// Write-protected directories only reject [`AccessMode::Write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Validate and resolve `requested` against `root` under the sandbox's
/// seven-step contract:
///
/// 1. Normalize Unicode whitespace (`\u{00A0}` and friends) to plain spaces.
/// 2. Expand a leading `~/` to the user's home directory, then require the
///    result still resolve inside `root`.
/// 3. Reject absolute paths and raw `..` components in the unparsed input.
/// 4. Reject any path component matching [`DENIED_FILENAMES`].
/// 5. Canonicalize the root and resolve the candidate (walking up to the
///    nearest existing ancestor when the target doesn't exist yet).
/// 6. Reject the resolved path if any ancestor between the candidate and
///    its existing prefix is a symlink.
/// 7. Containment check, then (for writes) reject [`PROTECTED_WRITE_DIRS`].
pub fn validate_sandboxed_path(
    root: &Path,
    requested: &str,
    mode: AccessMode,
) -> Result<PathBuf, SandboxError> {
    let normalized = normalize_unicode_spaces(requested);

    let expanded = if let Some(rest) = normalized.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| SandboxError::Escape(normalized.clone()))?
    } else {
        PathBuf::from(&normalized)
    };

    if expanded.is_absolute() {
        let canonical_root = root
            .canonicalize()
            .map_err(|_| SandboxError::Escape(normalized.clone()))?;
        if !expanded.starts_with(&canonical_root) {
            return Err(SandboxError::Escape(normalized));
        }
    }

    let relative = if expanded.is_absolute() {
        expanded
            .strip_prefix(root.canonicalize().unwrap_or_else(|_| root.to_path_buf()))
            .unwrap_or(&expanded)
            .to_path_buf()
    } else {
        expanded.clone()
    };

    for component in relative.components() {
        match component {
            Component::ParentDir => return Err(SandboxError::Escape(normalized)),
            Component::Normal(part) => {
                let name = part.to_string_lossy();
                if DENIED_FILENAMES.iter().any(|d| d.eq_ignore_ascii_case(&name)) {
                    return Err(SandboxError::DeniedFile(normalized));
                }
            }
            _ => {}
        }
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|_| SandboxError::Escape(normalized.clone()))?;
    let candidate = canonical_root.join(&relative);

    let resolved = resolve_with_symlink_check(&candidate, &normalized)?;

    if !resolved.starts_with(&canonical_root) {
        return Err(SandboxError::Escape(normalized));
    }

    if mode == AccessMode::Write {
        let rel = resolved
            .strip_prefix(&canonical_root)
            .unwrap_or(&resolved)
            .to_string_lossy()
            .replace('\\', "/");
        if PROTECTED_WRITE_DIRS.iter().any(|p| rel.starts_with(*p)) {
            return Err(SandboxError::ProtectedWrite(normalized));
        }
    }

    Ok(resolved)
}

/// Collapse non-breaking and other Unicode space variants to `' '` so a
/// denylist or `..` check can't be smuggled past via lookalike whitespace.
fn normalize_unicode_spaces(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_whitespace() && c != ' ' && c != '\n' && c != '\t' { ' ' } else { c })
        .collect()
}

/// Walk up to the nearest existing ancestor, rejecting the resolution if
/// any existing ancestor component turns out to be a symlink, then append
/// the remaining (not-yet-existing) tail components.
fn resolve_with_symlink_check(candidate: &Path, original: &str) -> Result<PathBuf, SandboxError> {
    let mut existing = candidate;
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        if existing.exists() {
            break;
        }
        match existing.parent() {
            Some(parent) => {
                if let Some(name) = existing.file_name() {
                    tail.push(name);
                }
                existing = parent;
            }
            None => break,
        }
    }

    if existing.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
        return Err(SandboxError::SymlinkNotAllowed(original.to_owned()));
    }

    let mut resolved = existing
        .canonicalize()
        .map_err(|_| SandboxError::Escape(original.to_owned()))?;
    for part in tail.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn accepts_relative_path_inside_root() {
        let ws = workspace();
        std::fs::write(ws.path().join("a.txt"), "hi").unwrap();
        let resolved = validate_sandboxed_path(ws.path(), "a.txt", AccessMode::Read).unwrap();
        assert_eq!(resolved, ws.path().canonicalize().unwrap().join("a.txt"));
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        let ws = workspace();
        let err = validate_sandboxed_path(ws.path(), "../escape.txt", AccessMode::Read).unwrap_err();
        assert!(matches!(err, SandboxError::Escape(_)));
    }

    #[test]
    fn rejects_denied_filename() {
        let ws = workspace();
        let err = validate_sandboxed_path(ws.path(), ".ssh/id_rsa", AccessMode::Read).unwrap_err();
        assert!(matches!(err, SandboxError::DeniedFile(_)));
    }

    #[test]
    fn rejects_protected_write_dir_on_write_only() {
        let ws = workspace();
        std::fs::create_dir_all(ws.path().join(".git")).unwrap();
        let read = validate_sandboxed_path(ws.path(), ".git/config", AccessMode::Read);
        assert!(read.is_ok());
        let write = validate_sandboxed_path(ws.path(), ".git/config", AccessMode::Write);
        assert!(matches!(write.unwrap_err(), SandboxError::ProtectedWrite(_)));
    }

    #[test]
    fn normalizes_unicode_spaces_before_checking() {
        let ws = workspace();
        std::fs::write(ws.path().join("a b.txt"), "hi").unwrap();
        let requested = "a\u{00A0}b.txt";
        let resolved = validate_sandboxed_path(ws.path(), requested, AccessMode::Read).unwrap();
        assert!(resolved.ends_with("a b.txt"));
    }

    #[test]
    fn rejects_symlink_ancestor() {
        let ws = workspace();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "nope").unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(outside.path(), ws.path().join("link")).unwrap();
            let err =
                validate_sandboxed_path(ws.path(), "link/secret.txt", AccessMode::Read).unwrap_err();
            assert!(matches!(err, SandboxError::SymlinkNotAllowed(_)));
        }
    }
}
