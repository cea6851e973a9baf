use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Who authored a message. Roles the engines do not care about are kept
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    #[serde(untagged)]
    Other(String),
}

/// The model a message was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider_id: String,
    pub model_id: String,
}

impl ModelRef {
    /// `provider/model`, the form skip patterns are matched against.
    pub fn qualified(&self) -> String {
        format!("{}/{}", self.provider_id, self.model_id)
    }
}

/// One unit of the transcript. Engines replace `parts` in place and never
/// reorder messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    #[serde(default)]
    pub parts: Vec<Part>,
    /// Host fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A content part, tagged by its `type` field. Only tool parts are ever
/// inspected; unknown kinds (and known kinds that fail to parse) are kept
/// as raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Tool(ToolPart),
    Text(TextPart),
    Other(Value),
}

const TOOL_KIND: &str = "tool";
const TEXT_KIND: &str = "text";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPart {
    pub id: String,
    pub call_id: String,
    pub tool: String,
    pub state: ToolState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    inner: &'a T,
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Part::Tool(tool) => Tagged {
                kind: TOOL_KIND,
                inner: tool,
            }
            .serialize(serializer),
            Part::Text(text) => Tagged {
                kind: TEXT_KIND,
                inner: text,
            }
            .serialize(serializer),
            Part::Other(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let known = match value.get("type").and_then(Value::as_str) {
            Some(TOOL_KIND) => untag(&value).map(Part::Tool),
            Some(TEXT_KIND) => untag(&value).map(Part::Text),
            _ => None,
        };
        Ok(known.unwrap_or(Part::Other(value)))
    }
}

/// Parse a tagged part body without its `type` key.
fn untag<T: DeserializeOwned>(value: &Value) -> Option<T> {
    let mut fields = value.as_object()?.clone();
    fields.remove("type");
    serde_json::from_value(Value::Object(fields)).ok()
}

/// Lifecycle of a tool invocation. Each stage carries only what is valid
/// for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolState {
    Pending {
        input: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Running {
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        started_at: i64,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Completed(CompletedTool),
    Error {
        input: Value,
        error: String,
        started_at: i64,
        ended_at: i64,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTool {
    pub input: Value,
    pub output: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
    pub time: CompletedTime,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTime {
    pub start: i64,
    pub end: i64,
    /// Set when the host has collapsed this output; cleared when the
    /// output is rewritten with live content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compacted: Option<i64>,
}

impl Part {
    /// The completed tool payload, if this is a finished tool invocation.
    pub fn completed_tool(&self) -> Option<(&ToolPart, &CompletedTool)> {
        match self {
            Part::Tool(tool) => match &tool.state {
                ToolState::Completed(done) => Some((tool, done)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn completed_tool_mut(&mut self) -> Option<&mut CompletedTool> {
        match self {
            Part::Tool(ToolPart {
                state: ToolState::Completed(done),
                ..
            }) => Some(done),
            _ => None,
        }
    }
}

impl Message {
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
