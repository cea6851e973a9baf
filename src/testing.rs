//! Window builders shared by the unit tests.

use std::path::Path;

use serde_json::{json, Map, Value};

use crate::path::resolve;
use crate::types::{
    CompletedTime, CompletedTool, Message, ModelRef, Part, Role, TextPart, ToolPart, ToolState,
};

pub const ROOT: &str = "/work/repo";
pub const SESSION: &str = "ses_parent";

pub fn message(id: &str, role: Role, parts: Vec<Part>) -> Message {
    Message {
        id: id.into(),
        session_id: SESSION.into(),
        role,
        agent: None,
        model: Some(ModelRef {
            provider_id: "anthropic".into(),
            model_id: "claude-sonnet-4".into(),
        }),
        parts,
        extra: Map::new(),
    }
}

pub fn user(id: &str, parts: Vec<Part>) -> Message {
    message(id, Role::User, parts)
}

pub fn assistant(id: &str, parts: Vec<Part>) -> Message {
    message(id, Role::Assistant, parts)
}

pub fn text(s: &str) -> Part {
    Part::Text(TextPart {
        text: s.into(),
        extra: Map::new(),
    })
}

pub fn completed(call_id: &str, tool: &str, input: Value, output: &str, metadata: Value) -> Part {
    Part::Tool(ToolPart {
        id: format!("prt_{call_id}"),
        call_id: call_id.into(),
        tool: tool.into(),
        state: ToolState::Completed(CompletedTool {
            input,
            output: output.into(),
            title: String::new(),
            metadata,
            time: CompletedTime {
                start: 1,
                end: 2,
                compacted: None,
            },
            extra: Map::new(),
        }),
        extra: Map::new(),
    })
}

pub fn read(call_id: &str, path: &str, output: &str) -> Part {
    completed(call_id, "read", json!({"filePath": path}), output, json!({}))
}

pub fn edit(call_id: &str, path: &str, after: &str) -> Part {
    completed(
        call_id,
        "edit",
        json!({"filePath": path, "oldString": "a", "newString": "b"}),
        "",
        json!({"diff": "@@", "filediff": {"file": path, "before": "", "after": after}}),
    )
}

pub fn multiedit(call_id: &str, path: &str, afters: &[&str]) -> Part {
    let results: Vec<Value> = afters
        .iter()
        .map(|a| json!({"filediff": {"after": a}}))
        .collect();
    completed(
        call_id,
        "multiedit",
        json!({"filePath": path, "edits": []}),
        "",
        json!({"results": results}),
    )
}

pub fn write(call_id: &str, path: &str, content: &str) -> Part {
    completed(
        call_id,
        "write",
        json!({"filePath": path, "content": content}),
        "",
        json!({}),
    )
}

pub fn pending_read(call_id: &str, path: &str) -> Part {
    Part::Tool(ToolPart {
        id: format!("prt_{call_id}"),
        call_id: call_id.into(),
        tool: "read".into(),
        state: ToolState::Pending {
            input: json!({"filePath": path}),
            extra: Map::new(),
        },
        extra: Map::new(),
    })
}

/// Completed tool parts in the window that refer to `path`.
pub fn parts_for<'a>(messages: &'a [Message], path: &str) -> Vec<(&'a ToolPart, &'a CompletedTool)> {
    let root = Path::new(ROOT);
    let target = resolve(path, Some(root));
    messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .filter_map(Part::completed_tool)
        .filter(|(_, done)| {
            done.input
                .get("filePath")
                .and_then(Value::as_str)
                .and_then(|raw| resolve(raw, Some(root)))
                == target
        })
        .collect()
}

pub fn count_ops(messages: &[Message], path: &str) -> usize {
    parts_for(messages, path).len()
}

pub fn outputs_for(messages: &[Message], path: &str) -> Vec<String> {
    parts_for(messages, path)
        .into_iter()
        .map(|(_, done)| done.output.clone())
        .collect()
}
