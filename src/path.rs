use std::path::{Component, Path, PathBuf};

/// Resolve a raw path reference from tool input into a canonical absolute
/// key. Two spellings of the same file must land on the same key.
///
/// Returns `None` for empty or unusable input; callers skip the operation.
pub fn resolve(raw: &str, worktree: Option<&Path>) -> Option<PathBuf> {
    let trimmed = strip_quotes(raw.trim()).trim();
    if trimmed.is_empty() || trimmed.contains('\0') {
        return None;
    }

    let expanded = expand_home(trimmed)?;
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        let base = match worktree {
            Some(root) => root.to_path_buf(),
            None => std::env::current_dir().ok()?,
        };
        base.join(expanded)
    };

    Some(normalize(&absolute))
}

/// Path shown to the model and used for synthetic call ids: relative to the
/// worktree when the file lives inside it.
pub fn display_relative(path: &Path, worktree: Option<&Path>) -> String {
    worktree
        .and_then(|root| path.strip_prefix(root).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Deterministic, identifier-safe slug for a file path.
pub fn call_id_slug(path: &Path, worktree: Option<&Path>) -> String {
    display_relative(path, worktree)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

const QUOTES: [char; 3] = ['"', '\'', '`'];

fn strip_quotes(s: &str) -> &str {
    // Nothing but quote marks is not a path.
    if s.chars().all(|c| QUOTES.contains(&c)) {
        return "";
    }
    for quote in QUOTES {
        if let Some(inner) = s
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    s
}

fn expand_home(s: &str) -> Option<PathBuf> {
    if s == "~" {
        return dirs::home_dir();
    }
    if let Some(rest) = s.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    Some(PathBuf::from(s))
}

/// Lexical normalization: drops `.`, folds `..`, collapses repeated
/// separators. Never touches the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
