use std::path::{Component, Path, PathBuf};

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Normalize a path for equality checks.
///
/// Existing paths are canonicalized so symlinked prefixes compare equal.
/// Paths that do not exist yet are cleaned lexically (`.` dropped, `..`
/// folded, trailing separators removed).
pub fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Whole-path equality after normalization. No prefix matching.
pub fn same_path(a: &Path, b: &Path) -> bool {
    a == b || normalize(a) == normalize(b)
}

/// True when `path` is `root` or lies somewhere below it
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root) || normalize(path).starts_with(normalize(root))
}
