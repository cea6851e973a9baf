pub mod consolidate;
pub mod finalize;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::protect::ProtectionRules;
use crate::tokens::{part_cost, TokenCounter};
use crate::types::Part;

pub use consolidate::consolidate;
pub use finalize::finalize;

/// Read-only inputs shared by both engines for one pass.
pub struct PassContext<'a> {
    pub worktree: Option<&'a Path>,
    pub protection: &'a ProtectionRules,
    /// Files made untrustworthy by delegated work in this session.
    pub invalidated: &'a HashSet<PathBuf>,
    pub tokens: &'a dyn TokenCounter,
}

impl PassContext<'_> {
    pub(crate) fn cost(&self, part: &Part) -> u64 {
        part.completed_tool()
            .map(|(_, done)| part_cost(self.tokens, done))
            .unwrap_or(0)
    }
}
