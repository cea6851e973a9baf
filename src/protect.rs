use std::path::Path;

use regex::Regex;
use tracing::warn;

/// Files the engines must never touch, by extension or glob.
///
/// Globs support `*` (any run of characters) and `?` (one character) and are
/// tested against both the full path and its base name.
#[derive(Debug, Clone, Default)]
pub struct ProtectionRules {
    extensions: Vec<String>,
    patterns: Vec<Regex>,
}

impl ProtectionRules {
    pub fn new<E, P>(extensions: E, patterns: P) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().to_lowercase())
            .filter(|e| !e.is_empty() && e != ".")
            .map(|e| if e.starts_with('.') { e } else { format!(".{e}") })
            .collect();

        let patterns = patterns
            .into_iter()
            .filter_map(|p| {
                let glob = p.as_ref();
                match compile_glob(glob) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(pattern = glob, error = %e, "ignoring invalid protection pattern");
                        None
                    }
                }
            })
            .collect();

        Self {
            extensions,
            patterns,
        }
    }

    pub fn is_protected(&self, path: &Path) -> bool {
        let full = path.to_string_lossy();
        let lower = full.to_lowercase();
        if self.extensions.iter().any(|ext| lower.ends_with(ext.as_str())) {
            return true;
        }

        let base = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        self.patterns
            .iter()
            .any(|re| re.is_match(&full) || re.is_match(&base))
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.patterns.is_empty()
    }
}

/// Free-function form of the predicate for one-off checks.
pub fn is_protected(path: &Path, extensions: &[String], patterns: &[String]) -> bool {
    ProtectionRules::new(extensions, patterns).is_protected(path)
}

/// Compile a `*`/`?` glob into an anchored matcher.
pub(crate) fn compile_glob(glob: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(glob.len() + 8);
    re.push('^');
    for c in glob.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}
