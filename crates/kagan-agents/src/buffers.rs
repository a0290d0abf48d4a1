//! Response/message ring buffers for an agent session (§4.C.2).
//!
//! Grounded on `original_source/src/kagan/acp/buffers.py`'s `AgentBuffers`
//! (bounded `deque`s, non-draining `replay_messages_to`) combined with the
//! teacher's `VecDeque`-based bounded-collection idiom.

use std::collections::VecDeque;

use kagan_core::limits::{MAX_TOOL_CALLS, MESSAGE_BUFFER, RESPONSE_BUFFER};

use crate::protocol::SessionUpdate;

/// Bounded response/message buffers for one agent session.
pub struct SessionBuffers {
    response: VecDeque<String>,
    messages: VecDeque<SessionUpdate>,
    tool_calls: VecDeque<SessionUpdate>,
}

impl SessionBuffers {
    pub fn new() -> Self {
        Self {
            response: VecDeque::with_capacity(RESPONSE_BUFFER.min(64)),
            messages: VecDeque::with_capacity(MESSAGE_BUFFER.min(64)),
            tool_calls: VecDeque::with_capacity(MAX_TOOL_CALLS.min(64)),
        }
    }

    pub fn append_response(&mut self, chunk: impl Into<String>) {
        if self.response.len() == RESPONSE_BUFFER {
            self.response.pop_front();
        }
        self.response.push_back(chunk.into());
    }

    /// Buffer an update in the general message ring, additionally tracking
    /// `ToolCall`/`ToolCallUpdate` updates in their own ring so a chatty tool
    /// loop can't crowd the rest of a turn's history out of `messages`.
    pub fn buffer_message(&mut self, update: SessionUpdate) {
        if matches!(update, SessionUpdate::ToolCall { .. } | SessionUpdate::ToolCallUpdate { .. }) {
            if self.tool_calls.len() == MAX_TOOL_CALLS {
                self.tool_calls.pop_front();
            }
            self.tool_calls.push_back(update.clone());
        }

        if self.messages.len() == MESSAGE_BUFFER {
            self.messages.pop_front();
        }
        self.messages.push_back(update);
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.len()
    }

    pub fn response_text(&self) -> String {
        self.response.iter().map(String::as_str).collect()
    }

    pub fn clear_response(&mut self) {
        self.response.clear();
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.tool_calls.clear();
    }

    pub fn clear_all(&mut self) {
        self.clear_response();
        self.clear_messages();
    }

    /// Replay buffered messages to `sink` without draining, so a second late
    /// reconnect can still observe full history.
    pub fn replay_messages_to(&self, sink: &mut dyn FnMut(&SessionUpdate)) {
        for update in &self.messages {
            sink(update);
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

impl Default for SessionBuffers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_buffer_caps_at_limit() {
        let mut buffers = SessionBuffers::new();
        for i in 0..RESPONSE_BUFFER + 10 {
            buffers.append_response(format!("chunk-{i}"));
        }
        assert_eq!(buffers.response.len(), RESPONSE_BUFFER);
    }

    #[test]
    fn replay_does_not_drain_buffer() {
        let mut buffers = SessionBuffers::new();
        buffers.buffer_message(SessionUpdate::Ready);
        buffers.buffer_message(SessionUpdate::Ready);

        let mut seen = 0;
        buffers.replay_messages_to(&mut |_| seen += 1);
        assert_eq!(seen, 2);
        assert_eq!(buffers.message_count(), 2);

        let mut seen_again = 0;
        buffers.replay_messages_to(&mut |_| seen_again += 1);
        assert_eq!(seen_again, 2);
    }

    #[test]
    fn clear_all_empties_both_buffers() {
        let mut buffers = SessionBuffers::new();
        buffers.append_response("hi");
        buffers.buffer_message(SessionUpdate::Ready);
        buffers.clear_all();
        assert_eq!(buffers.response_text(), "");
        assert_eq!(buffers.message_count(), 0);
    }

    #[test]
    fn tool_call_ring_caps_independently_of_the_message_ring() {
        let mut buffers = SessionBuffers::new();
        for _ in 0..MAX_TOOL_CALLS + 10 {
            buffers.buffer_message(SessionUpdate::ToolCall { tool_call: serde_json::json!({}) });
        }
        assert_eq!(buffers.tool_call_count(), MAX_TOOL_CALLS);
    }

    #[test]
    fn non_tool_call_updates_do_not_consume_the_tool_call_ring() {
        let mut buffers = SessionBuffers::new();
        buffers.buffer_message(SessionUpdate::Ready);
        buffers.buffer_message(SessionUpdate::Complete);
        assert_eq!(buffers.tool_call_count(), 0);
    }
}
