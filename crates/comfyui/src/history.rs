//! Typed parsing of the engine's execution history.
//!
//! `GET /history/{prompt_id}` returns a JSON document describing one
//! execution: a `status` block and an `outputs` map keyed by node id.
//! Output is only recognized under the fixed terminal node ids every
//! graph builder saves to — the terminal node is an explicit part of
//! the graph contract, not discovered by trial.

use serde::{Deserialize, Serialize};

/// Node ids at which graph builders place their save node and under
/// which this client looks for output.
pub const TERMINAL_NODE_IDS: &[&str] = &["9", "10"];

/// JSON keys under which the engine lists produced media.
const MEDIA_KEYS: &[&str] = &["images", "videos", "gifs", "audio"];

/// One produced file, echoed back by the engine's history response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// The engine's `type` field (`output`, `temp`, ...), needed to
    /// construct the retrieval URL.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Result of inspecting one history snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionPoll {
    /// No output and no error yet; keep polling.
    Pending,
    /// Output found under a terminal node id.
    Completed(OutputRef),
    /// The engine reported an execution error for this prompt.
    Failed(String),
}

/// Inspect a raw history response for `prompt_id`.
///
/// The engine may return the entry directly or wrapped in an object
/// keyed by prompt id; both shapes are accepted. Anything that parses
/// but matches neither completion nor error is `Pending` — transient
/// oddities are not errors, the overall deadline handles a stuck run.
pub fn inspect_history(raw: &serde_json::Value, prompt_id: &str) -> ExecutionPoll {
    let entry = match raw.get(prompt_id) {
        Some(wrapped) => wrapped,
        None => raw,
    };

    if let Some(message) = execution_error(entry) {
        return ExecutionPoll::Failed(message);
    }

    if let Some(output) = find_output(entry) {
        return ExecutionPoll::Completed(output);
    }

    ExecutionPoll::Pending
}

/// Extract an execution-error message from the entry's status block,
/// if the run failed.
fn execution_error(entry: &serde_json::Value) -> Option<String> {
    let status = entry.get("status")?;
    if status.get("status_str").and_then(|s| s.as_str()) != Some("error") {
        return None;
    }

    // The engine appends ["execution_error", {exception_message}] to
    // status.messages on failure; surface that text when present.
    if let Some(messages) = status.get("messages").and_then(|m| m.as_array()) {
        for message in messages {
            let Some(pair) = message.as_array() else {
                continue;
            };
            if pair.first().and_then(|t| t.as_str()) == Some("execution_error") {
                if let Some(text) = pair
                    .get(1)
                    .and_then(|d| d.get("exception_message"))
                    .and_then(|m| m.as_str())
                {
                    return Some(text.to_string());
                }
            }
        }
    }

    Some("Engine reported an execution error without a message".to_string())
}

/// Look for produced media under the terminal node ids.
fn find_output(entry: &serde_json::Value) -> Option<OutputRef> {
    let outputs = entry.get("outputs")?;

    for node_id in TERMINAL_NODE_IDS {
        let Some(node_outputs) = outputs.get(*node_id) else {
            continue;
        };
        for key in MEDIA_KEYS {
            if let Some(first) = node_outputs
                .get(*key)
                .and_then(|list| list.as_array())
                .and_then(|list| list.first())
            {
                if let Ok(output) = serde_json::from_value::<OutputRef>(first.clone()) {
                    return Some(output);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completed_entry() -> serde_json::Value {
        json!({
            "status": { "status_str": "success", "completed": true },
            "outputs": {
                "9": { "images": [
                    { "filename": "r.png", "subfolder": "", "type": "output" }
                ]}
            }
        })
    }

    #[test]
    fn completed_output_found_under_terminal_node() {
        let poll = inspect_history(&completed_entry(), "p-1");
        assert_eq!(
            poll,
            ExecutionPoll::Completed(OutputRef {
                filename: "r.png".into(),
                subfolder: "".into(),
                kind: "output".into(),
            })
        );
    }

    #[test]
    fn wrapped_entry_unwrapped_by_prompt_id() {
        let raw = json!({ "p-1": completed_entry() });
        assert!(matches!(
            inspect_history(&raw, "p-1"),
            ExecutionPoll::Completed(_)
        ));
    }

    #[test]
    fn output_under_unknown_node_id_is_ignored() {
        let raw = json!({
            "outputs": {
                "42": { "images": [
                    { "filename": "r.png", "subfolder": "", "type": "output" }
                ]}
            }
        });
        assert_eq!(inspect_history(&raw, "p-1"), ExecutionPoll::Pending);
    }

    #[test]
    fn video_and_audio_media_keys_recognized() {
        for key in ["videos", "gifs", "audio"] {
            let raw = json!({
                "outputs": {
                    "9": { key: [
                        { "filename": "out.bin", "subfolder": "clips", "type": "output" }
                    ]}
                }
            });
            let poll = inspect_history(&raw, "p-1");
            match poll {
                ExecutionPoll::Completed(output) => {
                    assert_eq!(output.filename, "out.bin");
                    assert_eq!(output.subfolder, "clips");
                }
                other => panic!("expected completion for {key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn execution_error_surfaced_verbatim() {
        let raw = json!({
            "status": {
                "status_str": "error",
                "completed": false,
                "messages": [
                    ["execution_start", {}],
                    ["execution_error", {
                        "exception_message": "Checkpoint file not found: missing.safetensors"
                    }]
                ]
            },
            "outputs": {}
        });
        assert_eq!(
            inspect_history(&raw, "p-1"),
            ExecutionPoll::Failed(
                "Checkpoint file not found: missing.safetensors".to_string()
            )
        );
    }

    #[test]
    fn error_status_without_message_still_fails() {
        let raw = json!({ "status": { "status_str": "error" } });
        assert!(matches!(inspect_history(&raw, "p-1"), ExecutionPoll::Failed(_)));
    }

    #[test]
    fn empty_history_is_pending() {
        assert_eq!(inspect_history(&json!({}), "p-1"), ExecutionPoll::Pending);
        assert_eq!(
            inspect_history(&json!({ "status": { "status_str": "running" } }), "p-1"),
            ExecutionPoll::Pending
        );
    }
}
