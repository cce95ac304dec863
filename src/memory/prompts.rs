//! Prompt templates for memory synthesis.

use crate::llm::{ConversationMessage, Part, Role};
use crate::memory::document::{PENDING_TASKS, RESOLVED_ARCHITECTURE, TECHNICAL_CONSTRAINTS};

/// Tool payloads longer than this are cut in transcripts.
const TRANSCRIPT_PAYLOAD_CHARS: usize = 2000;

pub const SYNTHESIS_SYSTEM: &str = "You maintain the long-term memory of a coding agent. \
You merge new conversation history into an existing memory document. \
You never invent facts that are not in the inputs.";

/// Prompt asking the model to merge `transcript` into `existing`.
pub fn merge_prompt(existing: &str, transcript: &str, max_words: usize) -> String {
    let existing = if existing.trim().is_empty() {
        "(empty)"
    } else {
        existing.trim()
    };
    format!(
        r#"Merge the conversation transcript below into the existing memory document.

Rules:
- Preserve every fact from the existing memory unless the transcript explicitly invalidates it.
- Use exactly these three markdown sections and no others:
  ## {TECHNICAL_CONSTRAINTS}
  ## {RESOLVED_ARCHITECTURE}
  ## {PENDING_TASKS}
- Record only what the inputs state. Do not fabricate files, decisions or results.
- Drop completed tasks from {PENDING_TASKS}; keep decisions that were made.
- Stay under {max_words} words in total.
- Reply with the document only.

<existing_memory>
{existing}
</existing_memory>

<transcript>
{transcript}
</transcript>"#
    )
}

/// Prompt asking the model to shorten an over-budget document.
pub fn condense_prompt(document: &str, current_words: usize, max_words: usize) -> String {
    format!(
        r#"The memory document below has {current_words} words; the limit is {max_words}.
Rewrite it to fit the limit. Keep the same section headers, keep every constraint and open task,
merge duplicates and shorten wording. Reply with the document only.

<memory>
{document}
</memory>"#
    )
}

/// Role-tagged plain-text rendering of messages.
pub fn render_transcript(messages: &[ConversationMessage]) -> String {
    let mut lines = Vec::new();
    for message in messages {
        let role = match message.role {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::Tool => "TOOL",
        };
        for part in &message.parts {
            match part {
                Part::Text { text } => lines.push(format!("[{}]: {}", role, text)),
                Part::ToolCall { name, args } => {
                    lines.push(format!("[{} -> {}]: {}", role, name, args))
                }
                Part::ToolResult { name, payload } => {
                    let payload = payload.to_string();
                    let shown: String = payload.chars().take(TRANSCRIPT_PAYLOAD_CHARS).collect();
                    let suffix = if shown.len() < payload.len() {
                        " ...[truncated]"
                    } else {
                        ""
                    };
                    lines.push(format!("[{} {}]: {}{}", role, name, shown, suffix));
                }
            }
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FunctionCall;
    use serde_json::json;

    #[test]
    fn test_render_transcript_tags_roles() {
        let messages = vec![
            ConversationMessage::user("fix the bug"),
            ConversationMessage::tool_calls(
                None,
                &[FunctionCall {
                    name: "bash".to_string(),
                    args: json!({"command": "pytest"}),
                }],
            ),
            ConversationMessage::tool_results(vec![(
                "bash".to_string(),
                json!({"status": "success"}),
            )]),
            ConversationMessage::assistant("fixed"),
        ];
        let transcript = render_transcript(&messages);
        assert_eq!(
            transcript,
            "[USER]: fix the bug\n\
             [ASSISTANT -> bash]: {\"command\":\"pytest\"}\n\
             [TOOL bash]: {\"status\":\"success\"}\n\
             [ASSISTANT]: fixed"
        );
    }

    #[test]
    fn test_long_payloads_are_cut() {
        let messages = vec![ConversationMessage::tool_results(vec![(
            "bash".to_string(),
            json!({"output": "x".repeat(5000)}),
        )])];
        let transcript = render_transcript(&messages);
        assert!(transcript.ends_with("...[truncated]"));
        assert!(transcript.len() < 2100);
    }

    #[test]
    fn test_merge_prompt_names_sections_and_budget() {
        let prompt = merge_prompt("", "[USER]: hi", 5000);
        assert!(prompt.contains("## Technical Constraints"));
        assert!(prompt.contains("## Pending Tasks"));
        assert!(prompt.contains("5000 words"));
        assert!(prompt.contains("(empty)"));
    }
}
