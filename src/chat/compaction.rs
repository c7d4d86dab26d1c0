// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transcript compaction strategies.

use std::collections::HashSet;

use crate::cost::{estimate_tokens, message_text};
use crate::types::{Message, Role};

/// Shrinks a message sequence to fit a token budget.
pub trait CompactionStrategy: Send + Sync {
    /// Return the compacted messages and their estimated token count.
    fn compact(&self, messages: &[Message], current_tokens: usize, max_tokens: usize) -> (Vec<Message>, usize);
}

/// Drops the oldest messages after the system head until the rest fits.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOld;

fn tokens_of(message: &Message) -> usize {
    estimate_tokens(&message_text(message)) as usize
}

impl CompactionStrategy for DeleteOld {
    fn compact(&self, messages: &[Message], current_tokens: usize, max_tokens: usize) -> (Vec<Message>, usize) {
        if messages.is_empty() || current_tokens <= max_tokens {
            return (messages.to_vec(), current_tokens);
        }

        let (head, rest) = match messages.split_first() {
            Some((first, rest)) if first.role == Role::System => (Some(first), rest),
            _ => (None, messages),
        };

        let mut total = head.map(tokens_of).unwrap_or(0);
        let mut start = rest.len();
        for (i, message) in rest.iter().enumerate().rev() {
            let tokens = tokens_of(message);
            if total + tokens > max_tokens {
                break;
            }
            total += tokens;
            start = i;
        }

        // a result whose call was dropped would be rejected by the provider
        let kept = &rest[start..];
        let calls: HashSet<&str> = kept.iter().flat_map(|m| m.tool_use_ids()).collect();
        let mut compacted: Vec<Message> = head.into_iter().cloned().collect();
        for message in kept {
            match message.tool_result_id() {
                Some(id) if !calls.contains(id) => total -= tokens_of(message),
                _ => compacted.push(message.clone()),
            }
        }

        (compacted, total)
    }
}
