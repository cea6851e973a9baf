use std::collections::HashMap;

use tracing::debug;

use super::PassContext;
use crate::delta::StepTokenDelta;
use crate::timeline::{PartRef, Timelines};
use crate::types::Message;

/// Mid-conversation reduction. Collapses each file's operations onto its
/// most recent real read, refreshing that read's output when an edit or
/// write happened after it. Never fabricates a read for a file that has
/// none. Invalidated files lose every visible operation.
pub fn consolidate(messages: &mut [Message], ctx: &PassContext<'_>) -> StepTokenDelta {
    let timelines = Timelines::build(messages, ctx.worktree, ctx.protection, ctx.invalidated);
    let mut delta = StepTokenDelta::default();
    if timelines.is_empty() {
        return delta;
    }

    // Keeper selection: keeper part -> replacement output, if stale.
    let mut keepers: HashMap<PartRef, Option<String>> = HashMap::new();
    for file in timelines.iter() {
        if file.invalidated {
            delta.files_invalidated += 1;
            continue;
        }
        let Some(keeper) = file.keeper() else {
            continue;
        };
        let refresh = file.newer_write().map(|snapshot| snapshot.render());
        if file.ops.len() > 1 || refresh.is_some() {
            delta.files_consolidated += 1;
        }
        keepers.insert(keeper, refresh);
    }

    for (message_idx, message) in messages.iter_mut().enumerate() {
        let parts = std::mem::take(&mut message.parts);
        let mut kept = Vec::with_capacity(parts.len());

        for (part_idx, mut part) in parts.into_iter().enumerate() {
            let part_ref = PartRef {
                message: message_idx,
                part: part_idx,
            };
            let Some((_, file, kind)) = timelines.lookup(part_ref) else {
                kept.push(part);
                continue;
            };

            if file.invalidated {
                delta.record_invalidated(kind, ctx.cost(&part));
                continue;
            }
            if file.keeper().is_none() {
                // No real read to consolidate onto: leave history as is.
                kept.push(part);
                continue;
            }

            delta.record_before(kind, ctx.cost(&part));
            let Some(refresh) = keepers.get(&part_ref) else {
                continue;
            };
            if let (Some(output), Some(done)) = (refresh, part.completed_tool_mut()) {
                done.output = output.clone();
                done.time.compacted = None;
            }
            delta.record_after(kind, ctx.cost(&part));
            kept.push(part);
        }

        message.parts = kept;
    }

    debug!(
        files = timelines.len(),
        consolidated = delta.files_consolidated,
        invalidated = delta.files_invalidated,
        before = delta.before_total(),
        after = delta.after_total(),
        "consolidation pass complete"
    );

    delta
}
