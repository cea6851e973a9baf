pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod invalidation;
pub mod path;
pub mod protect;
pub mod report;
pub mod stats;
pub mod timeline;
pub mod tokens;
pub mod types;

#[cfg(test)]
mod testing;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use config::Config;
pub use delta::{StepTokenDelta, TokenBucket};
pub use engine::{consolidate, finalize, PassContext};
pub use error::{ConfigError, HistoryError, NotifyError, TokenizeError};
pub use invalidation::{ChangedFile, InvalidationTracker, NoHistory, SessionHistory};
pub use protect::{is_protected, ProtectionRules};
pub use report::{format_summary, Notifier};
pub use stats::{SessionStatsStore, SessionTokenStats};
pub use tokens::{estimate_tokens, HeuristicCounter, TokenCounter};
pub use types::{
    CompletedTime, CompletedTool, Message, ModelRef, Part, Role, TextPart, ToolPart, ToolState,
};

/// Keeps file state in a session's context window coherent.
///
/// The host calls [`transform`](Self::transform) before every outbound
/// request, [`on_session_idle`](Self::on_session_idle) when a session goes
/// idle, and [`on_task_completed`](Self::on_task_completed) when a delegated
/// task finishes. Hooks take `&mut self`: the host must not run two hooks
/// for the same session concurrently.
pub struct FileContextSync {
    /// `None` when configuration could not be loaded; every pass is skipped.
    config: Option<Config>,
    protection: ProtectionRules,
    worktree: Option<PathBuf>,
    tokens: Box<dyn TokenCounter>,
    history: Arc<dyn SessionHistory>,
    notifier: Option<Arc<dyn Notifier>>,
    invalidations: InvalidationTracker,
    stats: Arc<Mutex<SessionStatsStore>>,
    /// Sessions whose next pass runs finalization. Consumed on use.
    pending_finalize: HashSet<String>,
}

impl FileContextSync {
    pub fn new(config: Config) -> Self {
        Self {
            protection: config.protection(),
            config: Some(config),
            worktree: None,
            tokens: Box::new(HeuristicCounter),
            history: Arc::new(NoHistory),
            notifier: None,
            invalidations: InvalidationTracker::new(),
            stats: Arc::new(Mutex::new(SessionStatsStore::new())),
            pending_finalize: HashSet::new(),
        }
    }

    /// Load (or create) the config file. A config that still cannot be read
    /// leaves the plugin inert rather than failing the host.
    pub async fn from_config_file(path: &Path) -> Self {
        match Config::load_or_create(path).await {
            Ok(config) => Self::new(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unusable config, file context cleanup disabled");
                let mut sync = Self::new(Config::default());
                sync.config = None;
                sync
            }
        }
    }

    pub fn with_worktree(mut self, root: impl Into<PathBuf>) -> Self {
        self.worktree = Some(root.into());
        self
    }

    pub fn with_history(mut self, history: impl SessionHistory + 'static) -> Self {
        self.history = Arc::new(history);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub fn with_token_counter(mut self, counter: impl TokenCounter + 'static) -> Self {
        self.tokens = Box::new(counter);
        self
    }

    /// Pre-request hook. Rewrites the window in place and returns the pass's
    /// delta, or `None` if nothing ran.
    pub async fn transform(&mut self, messages: &mut [Message]) -> Option<StepTokenDelta> {
        let Some(config) = &self.config else {
            debug!("no usable config, skipping file context pass");
            return None;
        };
        if !config.enabled {
            return None;
        }
        let session_id = messages.last()?.session_id.clone();

        if let Some(model) = messages.iter().rev().find_map(|m| m.model.as_ref()) {
            let qualified = model.qualified();
            if config.skips_model(&qualified) {
                debug!(session = %session_id, model = %qualified, "model skipped");
                return None;
            }
        }

        let no_invalidations = HashSet::new();
        let ctx = PassContext {
            worktree: self.worktree.as_deref(),
            protection: &self.protection,
            invalidated: self
                .invalidations
                .invalidated(&session_id)
                .unwrap_or(&no_invalidations),
            tokens: self.tokens.as_ref(),
        };

        let delta = if self.pending_finalize.remove(&session_id) {
            info!(session = %session_id, "running finalization");
            engine::finalize(messages, &ctx)?
        } else {
            engine::consolidate(messages, &ctx)
        };

        self.stats.lock().await.record(&session_id, delta);
        Some(delta)
    }

    /// Idle hook. Arms finalization for the session's next pass and, if a
    /// summary is due, sends it in the background. The returned handle may
    /// be dropped; a failed send leaves the report due for the next idle.
    pub async fn on_session_idle(&mut self, session_id: &str) -> Option<JoinHandle<()>> {
        let config = self.config.as_ref()?;
        if !config.enabled {
            return None;
        }
        if config.finalize_on_idle {
            self.pending_finalize.insert(session_id.to_string());
        }
        if !config.notify_on_idle {
            return None;
        }
        let notifier = self.notifier.clone()?;

        let text = {
            let mut store = self.stats.lock().await;
            let text = store
                .get(session_id)
                .filter(|s| !s.latest.is_empty())
                .map(format_summary)?;
            if !store.begin_report(session_id) {
                return None;
            }
            text
        };

        let stats = Arc::clone(&self.stats);
        let session = session_id.to_string();
        Some(tokio::spawn(async move {
            let delivered = match notifier.send_detached_text(&session, &text).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(session = %session, error = %e, "failed to send idle summary");
                    false
                }
            };
            stats.lock().await.finish_report(&session, delivered);
        }))
    }

    /// Delegated-task hook. Invalidates whatever the child session changed.
    pub async fn on_task_completed(&mut self, parent_session_id: &str, metadata: &Value) -> usize {
        self.invalidations
            .on_task_completed(
                parent_session_id,
                metadata,
                self.history.as_ref(),
                self.worktree.as_deref(),
            )
            .await
    }

    pub async fn stats(&self, session_id: &str) -> Option<SessionTokenStats> {
        self.stats.lock().await.get(session_id).cloned()
    }

    pub fn invalidated_files(&self, session_id: &str) -> Option<&HashSet<PathBuf>> {
        self.invalidations.invalidated(session_id)
    }

    pub fn is_finalize_pending(&self, session_id: &str) -> bool {
        self.pending_finalize.contains(session_id)
    }

    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }
}
