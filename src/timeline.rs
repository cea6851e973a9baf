//! Per-file operation history rebuilt from the current window.
//!
//! Nothing here outlives a pass: timelines are derived from the messages on
//! every call and thrown away afterwards.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::path;
use crate::protect::ProtectionRules;
use crate::types::Message;

/// Input keys that may carry the target file of a tool call.
const PATH_KEYS: [&str; 3] = ["filePath", "file_path", "path"];

pub const READ_TOOL: &str = "read";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOpKind {
    Read,
    Edit,
    MultiEdit,
    Write,
}

impl FileOpKind {
    pub fn from_tool(name: &str) -> Option<Self> {
        match name {
            "read" => Some(Self::Read),
            "edit" => Some(Self::Edit),
            "multiedit" => Some(Self::MultiEdit),
            "write" => Some(Self::Write),
            _ => None,
        }
    }

    pub fn is_read(self) -> bool {
        self == Self::Read
    }
}

/// Position of a part inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartRef {
    pub message: usize,
    pub part: usize,
}

/// Where a content snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Output of a real read, already in read format.
    ReadOutput,
    /// Raw file content recovered from an edit or write payload.
    Reconstructed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Ordering key: position of the producing part in the window.
    pub seq: usize,
    pub content: String,
    pub provenance: Provenance,
}

impl Snapshot {
    /// The snapshot as a read tool would have returned it.
    pub fn render(&self) -> String {
        match self.provenance {
            Provenance::ReadOutput => self.content.clone(),
            Provenance::Reconstructed => render_read_output(&self.content),
        }
    }
}

/// Everything the window says about one file.
#[derive(Debug, Clone)]
pub struct FileTimeline {
    pub path: PathBuf,
    pub invalidated: bool,
    pub ops: Vec<(PartRef, FileOpKind)>,
    /// Most recent read (the keeper candidate). Not tracked for invalidated files.
    pub latest_read: Option<(PartRef, Snapshot)>,
    /// Most recent content recovered from an edit/multiedit/write.
    /// Not tracked for invalidated files.
    pub latest_write: Option<Snapshot>,
}

impl FileTimeline {
    fn new(path: PathBuf, invalidated: bool) -> Self {
        Self {
            path,
            invalidated,
            ops: Vec::new(),
            latest_read: None,
            latest_write: None,
        }
    }

    pub fn has_read(&self) -> bool {
        self.ops.iter().any(|(_, kind)| kind.is_read())
    }

    pub fn is_edited(&self) -> bool {
        self.ops.iter().any(|(_, kind)| !kind.is_read())
    }

    pub fn keeper(&self) -> Option<PartRef> {
        self.latest_read.as_ref().map(|(r, _)| *r)
    }

    /// Edit/write content that postdates the keeper read, if any.
    pub fn newer_write(&self) -> Option<&Snapshot> {
        let read_seq = self.latest_read.as_ref().map(|(_, s)| s.seq)?;
        self.latest_write.as_ref().filter(|w| w.seq > read_seq)
    }

    /// Best content for a fabricated view: edit/write payloads first, a
    /// prior read's output only when no payload was recoverable.
    pub fn canonical_view(&self) -> Option<&Snapshot> {
        self.latest_write
            .as_ref()
            .or_else(|| self.latest_read.as_ref().map(|(_, s)| s))
    }
}

/// All file timelines in a window, in order of first appearance.
#[derive(Debug, Default)]
pub struct Timelines {
    files: Vec<FileTimeline>,
    by_part: HashMap<PartRef, (usize, FileOpKind)>,
}

impl Timelines {
    /// Walk the window once and group completed file operations by resolved
    /// path. Protected files and unresolvable paths are left out entirely.
    pub fn build(
        messages: &[Message],
        worktree: Option<&Path>,
        protection: &ProtectionRules,
        invalidated: &HashSet<PathBuf>,
    ) -> Self {
        let mut timelines = Self::default();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();
        let mut seq = 0usize;

        for (message_idx, message) in messages.iter().enumerate() {
            for (part_idx, part) in message.parts.iter().enumerate() {
                seq += 1;
                let Some((tool, done)) = part.completed_tool() else {
                    continue;
                };
                let Some(kind) = FileOpKind::from_tool(&tool.tool) else {
                    continue;
                };
                let Some(file) = file_path_arg(&done.input).and_then(|raw| path::resolve(raw, worktree))
                else {
                    continue;
                };
                if !protection.is_empty() && protection.is_protected(&file) {
                    continue;
                }

                let slot = *index.entry(file.clone()).or_insert_with(|| {
                    let is_invalid = invalidated.contains(&file);
                    timelines.files.push(FileTimeline::new(file.clone(), is_invalid));
                    timelines.files.len() - 1
                });
                let part_ref = PartRef {
                    message: message_idx,
                    part: part_idx,
                };
                let timeline = &mut timelines.files[slot];
                timeline.ops.push((part_ref, kind));
                timelines.by_part.insert(part_ref, (slot, kind));

                if timeline.invalidated {
                    continue;
                }
                let content = match kind {
                    FileOpKind::Read => {
                        timeline.latest_read = Some((
                            part_ref,
                            Snapshot {
                                seq,
                                content: done.output.clone(),
                                provenance: Provenance::ReadOutput,
                            },
                        ));
                        continue;
                    }
                    FileOpKind::Edit | FileOpKind::MultiEdit => extract_after(&done.metadata),
                    FileOpKind::Write => done.input.get("content").and_then(Value::as_str),
                };
                if let Some(content) = content {
                    timeline.latest_write = Some(Snapshot {
                        seq,
                        content: content.to_string(),
                        provenance: Provenance::Reconstructed,
                    });
                }
            }
        }

        timelines
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileTimeline> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The tracked file (by index) and operation kind for a part, if tracked.
    pub fn lookup(&self, part: PartRef) -> Option<(usize, &FileTimeline, FileOpKind)> {
        let &(slot, kind) = self.by_part.get(&part)?;
        Some((slot, &self.files[slot], kind))
    }
}

pub fn file_path_arg(input: &Value) -> Option<&str> {
    PATH_KEYS
        .iter()
        .find_map(|key| input.get(*key).and_then(Value::as_str))
}

/// Post-edit file content from edit metadata.
///
/// Looks in exactly two places: `filediff.after`, or `filediff.after` on the
/// last entry of `results` (multi-edit). Anything else yields `None`.
pub fn extract_after(metadata: &Value) -> Option<&str> {
    fn after_of(value: &Value) -> Option<&str> {
        value.get("filediff")?.get("after")?.as_str()
    }

    after_of(metadata).or_else(|| {
        metadata
            .get("results")?
            .as_array()?
            .last()
            .and_then(after_of)
    })
}

/// Render raw file content the way the read tool does: numbered lines in a
/// `<file>` block with an end-of-file footer.
pub fn render_read_output(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = String::with_capacity(content.len() + lines.len() * 8 + 64);
    out.push_str("<file>\n");
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format!("{:05}| {}\n", i + 1, line));
    }
    out.push_str(&format!(
        "\n(End of file - total {} lines)\n</file>",
        lines.len()
    ));
    out
}
