use std::collections::HashSet;

use chrono::Utc;
use serde_json::{json, Map};
use tracing::debug;

use super::PassContext;
use crate::delta::StepTokenDelta;
use crate::path::{call_id_slug, display_relative};
use crate::timeline::{FileOpKind, FileTimeline, PartRef, Snapshot, Timelines, READ_TOOL};
use crate::types::{CompletedTime, CompletedTool, Message, Part, ToolPart, ToolState};

/// What finalization does with one file.
enum Plan<'a> {
    /// Invalidated: drop everything, add nothing.
    Wipe,
    /// Edited with recoverable content: drop everything, append one
    /// synthetic read.
    Replace(&'a Snapshot),
    /// Read-only file with repeated reads: keep the newest.
    KeepLatestRead(PartRef),
    Leave,
}

/// Boundary reduction. Every visible operation on an edited or invalidated
/// file is removed; each edited file gets exactly one synthetic read,
/// attached to the last assistant message.
///
/// Returns `None` without touching the window when there is no assistant
/// message to attach to.
pub fn finalize(messages: &mut [Message], ctx: &PassContext<'_>) -> Option<StepTokenDelta> {
    let Some(anchor) = messages.iter().rposition(Message::is_assistant) else {
        debug!("no assistant message in window, skipping finalization");
        return None;
    };

    let timelines = Timelines::build(messages, ctx.worktree, ctx.protection, ctx.invalidated);
    let mut delta = StepTokenDelta::default();

    let plans: Vec<Plan<'_>> = timelines.iter().map(plan_for).collect();
    let mut keepers: HashSet<PartRef> = HashSet::new();
    for plan in &plans {
        match plan {
            Plan::Wipe => delta.files_invalidated += 1,
            Plan::Replace(_) => delta.files_consolidated += 1,
            Plan::KeepLatestRead(keeper) => {
                delta.files_consolidated += 1;
                keepers.insert(*keeper);
            }
            Plan::Leave => {}
        }
    }

    for (message_idx, message) in messages.iter_mut().enumerate() {
        let parts = std::mem::take(&mut message.parts);
        let mut kept = Vec::with_capacity(parts.len());

        for (part_idx, part) in parts.into_iter().enumerate() {
            let part_ref = PartRef {
                message: message_idx,
                part: part_idx,
            };
            let Some((slot, _, kind)) = timelines.lookup(part_ref) else {
                kept.push(part);
                continue;
            };

            match plans[slot] {
                Plan::Leave => kept.push(part),
                Plan::Wipe => delta.record_invalidated(kind, ctx.cost(&part)),
                Plan::Replace(_) => delta.record_before(kind, ctx.cost(&part)),
                Plan::KeepLatestRead(_) => {
                    let cost = ctx.cost(&part);
                    delta.record_before(kind, cost);
                    if keepers.contains(&part_ref) {
                        delta.record_after(kind, cost);
                        kept.push(part);
                    }
                }
            }
        }

        message.parts = kept;
    }

    let now = Utc::now().timestamp_millis();
    for (file, plan) in timelines.iter().zip(&plans) {
        if let Plan::Replace(view) = plan {
            let part = synthetic_read(file, view, ctx, now);
            delta.record_after(FileOpKind::Read, ctx.cost(&part));
            messages[anchor].parts.push(part);
        }
    }

    debug!(
        files = timelines.len(),
        replaced = delta.files_consolidated,
        invalidated = delta.files_invalidated,
        before = delta.before_total(),
        after = delta.after_total(),
        "finalization pass complete"
    );

    Some(delta)
}

fn plan_for(file: &FileTimeline) -> Plan<'_> {
    if file.invalidated {
        return Plan::Wipe;
    }
    if file.is_edited() {
        // Edited but nothing recoverable: leave it rather than lose it.
        return file.canonical_view().map_or(Plan::Leave, Plan::Replace);
    }
    let reads = file.ops.iter().filter(|(_, kind)| kind.is_read()).count();
    match file.keeper() {
        Some(keeper) if reads > 1 => Plan::KeepLatestRead(keeper),
        _ => Plan::Leave,
    }
}

fn synthetic_read(file: &FileTimeline, view: &Snapshot, ctx: &PassContext<'_>, now: i64) -> Part {
    let slug = call_id_slug(&file.path, ctx.worktree);
    Part::Tool(ToolPart {
        id: format!("prt_finalize_{slug}"),
        call_id: format!("finalize_read_{slug}"),
        tool: READ_TOOL.to_string(),
        state: ToolState::Completed(CompletedTool {
            input: json!({ "filePath": file.path.to_string_lossy() }),
            output: view.render(),
            title: display_relative(&file.path, ctx.worktree),
            metadata: json!({ "synthetic": true }),
            time: CompletedTime {
                start: now,
                end: now,
                compacted: None,
            },
            extra: Map::new(),
        }),
        extra: Map::new(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::protect::ProtectionRules;
    use crate::testing::*;
    use crate::timeline::render_read_output;
    use crate::tokens::HeuristicCounter;

    fn run(
        messages: &mut [Message],
        protection: &ProtectionRules,
        invalidated: &HashSet<PathBuf>,
    ) -> Option<StepTokenDelta> {
        let ctx = PassContext {
            worktree: Some(Path::new(ROOT)),
            protection,
            invalidated,
            tokens: &HeuristicCounter,
        };
        finalize(messages, &ctx)
    }

    fn window() -> Vec<Message> {
        vec![
            user("m1", vec![text("fix it")]),
            assistant(
                "m2",
                vec![
                    read("c1", "src/a.rs", "<file>\n00001| old\n</file>"),
                    edit("c2", "src/a.rs", "new line"),
                ],
            ),
            user("m3", vec![text("thanks")]),
            assistant("m4", vec![text("done"), write("c3", "src/b.rs", "b body")]),
            user("m5", vec![text("bye")]),
        ]
    }

    #[test]
    fn replaces_edited_files_with_one_synthetic_read() {
        let mut w = window();
        let delta = run(&mut w, &ProtectionRules::default(), &HashSet::new()).unwrap();

        assert!(w[1].parts.is_empty());
        assert_eq!(w[3].parts.len(), 3);
        assert_eq!(w[3].parts[0], text("done"));

        let a = parts_for(&w, "src/a.rs");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].0.call_id, "finalize_read_src_a_rs");
        assert_eq!(a[0].0.tool, "read");
        assert_eq!(a[0].1.output, render_read_output("new line"));

        let b = parts_for(&w, "src/b.rs");
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].1.output, render_read_output("b body"));

        assert_eq!(delta.files_consolidated, 2);
        assert!(delta.read.after > 0);
        assert_eq!(delta.edit_write.after, 0);
    }

    #[test]
    fn second_run_is_stable() {
        let mut w = window();
        run(&mut w, &ProtectionRules::default(), &HashSet::new()).unwrap();
        let after_first = w.clone();

        let delta = run(&mut w, &ProtectionRules::default(), &HashSet::new()).unwrap();
        assert_eq!(w, after_first);
        assert_eq!(count_ops(&w, "src/a.rs"), 1);
        assert_eq!(count_ops(&w, "src/b.rs"), 1);
        assert_eq!(delta.files_consolidated, 0);
    }

    #[test]
    fn falls_back_to_read_output_when_edit_has_no_snapshot() {
        let broken = completed(
            "c2",
            "edit",
            serde_json::json!({"filePath": "a.txt"}),
            "",
            serde_json::json!({}),
        );
        let mut w = vec![assistant("m1", vec![read("c1", "a.txt", "verbatim read"), broken])];
        run(&mut w, &ProtectionRules::default(), &HashSet::new()).unwrap();

        assert_eq!(outputs_for(&w, "a.txt"), vec!["verbatim read".to_string()]);
        assert_eq!(parts_for(&w, "a.txt")[0].0.call_id, "finalize_read_a_txt");
    }

    #[test]
    fn edited_file_without_any_content_is_left_alone() {
        let broken = completed(
            "c1",
            "edit",
            serde_json::json!({"filePath": "a.txt"}),
            "",
            serde_json::json!({}),
        );
        let original = vec![assistant("m1", vec![broken])];
        let mut w = original.clone();
        run(&mut w, &ProtectionRules::default(), &HashSet::new()).unwrap();
        assert_eq!(w, original);
    }

    #[test]
    fn invalidated_files_get_no_replacement() {
        let mut w = window();
        let invalid: HashSet<PathBuf> = [PathBuf::from(ROOT).join("src/a.rs")].into();
        let delta = run(&mut w, &ProtectionRules::default(), &invalid).unwrap();

        assert_eq!(count_ops(&w, "src/a.rs"), 0);
        assert_eq!(count_ops(&w, "src/b.rs"), 1);
        assert_eq!(delta.files_invalidated, 1);
        assert!(delta.invalidated_before > 0);
    }

    #[test]
    fn no_assistant_message_is_a_noop() {
        let original = vec![user(
            "m1",
            vec![read("c1", "a.txt", "x"), write("c2", "a.txt", "y")],
        )];
        let mut w = original.clone();
        assert!(run(&mut w, &ProtectionRules::default(), &HashSet::new()).is_none());
        assert_eq!(w, original);
    }

    #[test]
    fn attaches_to_last_assistant_even_if_user_follows() {
        let mut w = window();
        run(&mut w, &ProtectionRules::default(), &HashSet::new()).unwrap();
        assert!(w[4].parts.iter().all(|p| matches!(p, Part::Text(_))));
        assert!(w[3]
            .parts
            .iter()
            .any(|p| matches!(p, Part::Tool(t) if t.call_id.starts_with("finalize_read_"))));
    }

    #[test]
    fn repeated_reads_of_untouched_file_collapse() {
        let mut w = vec![
            assistant("m1", vec![read("c1", "r.txt", "same")]),
            assistant("m2", vec![read("c2", "r.txt", "same")]),
        ];
        run(&mut w, &ProtectionRules::default(), &HashSet::new()).unwrap();
        let parts = parts_for(&w, "r.txt");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].0.call_id, "c2");
    }

    #[test]
    fn protected_files_survive_finalization() {
        let original = vec![assistant(
            "m1",
            vec![read("c1", "notes.md", "a"), edit("c2", "notes.md", "b")],
        )];
        let mut w = original.clone();
        let rules = ProtectionRules::new(["md"], Vec::<String>::new());
        let invalid: HashSet<PathBuf> = [PathBuf::from(ROOT).join("notes.md")].into();
        let delta = run(&mut w, &rules, &invalid).unwrap();
        assert_eq!(w, original);
        assert!(delta.is_empty());
    }
}
