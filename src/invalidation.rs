use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::HistoryError;
use crate::path;

/// A file a child session changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub file: String,
}

/// Source of per-session change history. Backed by the host's session store.
#[async_trait]
pub trait SessionHistory: Send + Sync {
    /// Files changed by the given (child) session.
    async fn changed_files(&self, session_id: &str) -> Result<Vec<ChangedFile>, HistoryError>;
}

/// No history available. Delegated work never invalidates anything.
pub struct NoHistory;

#[async_trait]
impl SessionHistory for NoHistory {
    async fn changed_files(&self, _: &str) -> Result<Vec<ChangedFile>, HistoryError> {
        Ok(Vec::new())
    }
}

/// Files made untrustworthy by delegated sub-task execution, keyed by the
/// parent session. Sets only grow; nothing here removes an entry.
#[derive(Debug, Default)]
pub struct InvalidationTracker {
    sessions: HashMap<String, HashSet<PathBuf>>,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a completed delegated task. Fetches the child session's diff
    /// and folds it into the parent's set. Returns how many paths were new.
    ///
    /// History failures are logged and treated as an empty diff.
    pub async fn on_task_completed(
        &mut self,
        parent_session_id: &str,
        metadata: &Value,
        history: &dyn SessionHistory,
        worktree: Option<&Path>,
    ) -> usize {
        let Some(child) = child_session_id(metadata) else {
            debug!(parent = parent_session_id, "task completion without child session id");
            return 0;
        };

        let changed = match history.changed_files(child).await {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    parent = parent_session_id,
                    child,
                    error = %e,
                    "failed to fetch child session diff, assuming no changes"
                );
                return 0;
            }
        };

        let added = self.invalidate(
            parent_session_id,
            changed
                .iter()
                .filter_map(|c| path::resolve(&c.file, worktree)),
        );
        if added > 0 {
            info!(
                parent = parent_session_id,
                child,
                added,
                "files invalidated by delegated task"
            );
        }
        added
    }

    /// Union already-resolved paths into a session's set.
    pub fn invalidate(
        &mut self,
        session_id: &str,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> usize {
        let set = self.sessions.entry(session_id.to_string()).or_default();
        let mut added = 0;
        for p in paths {
            if set.insert(p) {
                added += 1;
            }
        }
        added
    }

    pub fn invalidated(&self, session_id: &str) -> Option<&HashSet<PathBuf>> {
        self.sessions.get(session_id)
    }

    pub fn is_invalidated(&self, session_id: &str, file: &Path) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|set| set.contains(file))
    }
}

/// Child session id from a task completion's metadata.
pub fn child_session_id(metadata: &Value) -> Option<&str> {
    ["sessionId", "session_id"]
        .iter()
        .find_map(|key| metadata.get(*key).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
}
