use serde::{Deserialize, Serialize};

use crate::timeline::FileOpKind;

/// Before/after token totals for one category of file operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBucket {
    pub before: u64,
    pub after: u64,
}

impl TokenBucket {
    pub fn saved(&self) -> i64 {
        self.before as i64 - self.after as i64
    }
}

/// What a single pass did to the window. Produced fresh each pass and never
/// merged with an earlier one: every pass already sees the whole window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTokenDelta {
    pub read: TokenBucket,
    pub edit_write: TokenBucket,
    /// Tokens removed because the file was invalidated by delegated work.
    /// Also included in `read`/`edit_write` before totals.
    pub invalidated_before: u64,
    pub files_consolidated: usize,
    pub files_invalidated: usize,
}

impl StepTokenDelta {
    pub fn record_before(&mut self, kind: FileOpKind, tokens: u64) {
        self.bucket_mut(kind).before += tokens;
    }

    pub fn record_after(&mut self, kind: FileOpKind, tokens: u64) {
        self.bucket_mut(kind).after += tokens;
    }

    pub fn record_invalidated(&mut self, kind: FileOpKind, tokens: u64) {
        self.record_before(kind, tokens);
        self.invalidated_before += tokens;
    }

    pub fn before_total(&self) -> u64 {
        self.read.before + self.edit_write.before
    }

    pub fn after_total(&self) -> u64 {
        self.read.after + self.edit_write.after
    }

    /// Net tokens removed by the pass (negative if the pass grew the window).
    pub fn net_saved(&self) -> i64 {
        self.before_total() as i64 - self.after_total() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.before_total() == 0
            && self.after_total() == 0
            && self.files_consolidated == 0
            && self.files_invalidated == 0
    }

    fn bucket_mut(&mut self, kind: FileOpKind) -> &mut TokenBucket {
        if kind.is_read() {
            &mut self.read
        } else {
            &mut self.edit_write
        }
    }
}
