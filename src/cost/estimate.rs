// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Character-based token estimation.

use crate::types::{ContentBlockType, Message, MessageContent};

/// Average characters per token used by the estimator.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a piece of text: `ceil(chars / 4)`, never below one.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN).max(1) as u32
}

/// Extract the plain text of a message.
///
/// Text blocks and tool results contribute their text. A message with no
/// identifiable text is serialized to JSON instead, so tool calls still count.
pub fn message_text(message: &Message) -> String {
    match &message.content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => {
            let text: String = blocks
                .iter()
                .filter_map(|b| match b.block_type {
                    ContentBlockType::Text => b.text.as_deref(),
                    ContentBlockType::ToolResult => b.content.as_deref(),
                    ContentBlockType::ToolUse => None,
                })
                .collect();
            if text.is_empty() {
                serde_json::to_string(message).unwrap_or_default()
            } else {
                text
            }
        }
    }
}

/// Estimate the combined token count of a message sequence.
pub fn estimate_messages(messages: &[Message]) -> u32 {
    let text: String = messages.iter().map(message_text).collect();
    estimate_tokens(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, Role};
    use serde_json::json;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_estimate_tokens_minimum_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("a"), 1);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        // four multi-byte characters
        assert_eq!(estimate_tokens("ñçøü"), 1);
    }

    #[test]
    fn test_message_text_concatenates_blocks() {
        let msg = Message::with_blocks(
            Role::Assistant,
            vec![
                ContentBlock::text("one "),
                ContentBlock::tool_use("c1", "t", json!({})),
                ContentBlock::text("two"),
            ],
        );
        assert_eq!(message_text(&msg), "one two");
    }

    #[test]
    fn test_message_text_falls_back_to_json() {
        let msg = Message::with_blocks(
            Role::Assistant,
            vec![ContentBlock::tool_use("c1", "current_time", json!({}))],
        );
        let text = message_text(&msg);
        assert!(text.contains("current_time"));
        assert!(text.starts_with('{'));
    }

    #[test]
    fn test_estimate_messages() {
        let msgs = vec![Message::system("12345678"), Message::user("1234")];
        assert_eq!(estimate_messages(&msgs), 3);
        assert_eq!(estimate_messages(&[]), 1);
    }
}
