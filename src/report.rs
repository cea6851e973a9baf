use async_trait::async_trait;

use crate::error::NotifyError;
use crate::stats::SessionTokenStats;

/// Out-of-band channel into a session (e.g. an ignored text message the
/// user sees but the model does not).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_detached_text(&self, session_id: &str, text: &str) -> Result<(), NotifyError>;
}

/// One-line idle summary of the latest pass.
pub fn format_summary(stats: &SessionTokenStats) -> String {
    let d = &stats.latest;
    let mut out = format!(
        "File context: {} tokens saved ({} -> {})",
        format_tokens(stats.net_saved()),
        format_tokens(d.before_total() as i64),
        format_tokens(d.after_total() as i64),
    );

    let mut details = Vec::new();
    if d.read.before > 0 {
        details.push(format!("reads {}", format_tokens(d.read.saved())));
    }
    if d.edit_write.before > 0 {
        details.push(format!("edits/writes {}", format_tokens(d.edit_write.saved())));
    }
    if d.files_consolidated > 0 {
        details.push(format!("{} consolidated", plural(d.files_consolidated, "file")));
    }
    if d.files_invalidated > 0 {
        details.push(format!(
            "{} invalidated ({} stale)",
            plural(d.files_invalidated, "file"),
            format_tokens(d.invalidated_before as i64)
        ));
    }
    if !details.is_empty() {
        out.push_str(" | ");
        out.push_str(&details.join(", "));
    }
    out
}

fn format_tokens(n: i64) -> String {
    if n.abs() >= 1_000 {
        format!("{:.1}k", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
