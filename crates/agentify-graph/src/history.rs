use agentify_llm::{Message, ToolCall};
use agentify_persist::{Message as StoredMessage, MessageRole};

/// Provider messages for a stored history window.
///
/// A window cut in the middle of a tool exchange would start with tool
/// results whose request is gone; providers reject those, so they are
/// skipped.
pub fn to_llm_messages(history: &[StoredMessage]) -> Vec<Message> {
    history
        .iter()
        .skip_while(|m| m.role == MessageRole::Tool)
        .map(to_llm_message)
        .collect()
}

fn to_llm_message(message: &StoredMessage) -> Message {
    match message.role {
        MessageRole::User => Message::human(message.content.as_str()),
        MessageRole::System => Message::system(message.content.as_str()),
        MessageRole::Tool => Message::tool_result(
            message.tool_call_id.clone().unwrap_or_default(),
            message.content.as_str(),
        ),
        MessageRole::Assistant => {
            let calls = message
                .tool_calls
                .clone()
                .and_then(|raw| match serde_json::from_value::<Vec<ToolCall>>(raw) {
                    Ok(calls) if !calls.is_empty() => Some(calls),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(message_id = %message.id, error = %e, "Dropping unreadable tool calls");
                        None
                    }
                });
            match calls {
                Some(calls) => Message::ai_with_tools(Some(message.content.clone()), calls),
                None => Message::ai(message.content.as_str()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn stored(seq: u64, role: MessageRole, content: &str) -> StoredMessage {
        StoredMessage {
            id: format!("m{}", seq),
            thread_id: "t1".into(),
            seq,
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            metadata: Value::Null,
            created_at: Default::default(),
        }
    }

    #[test]
    fn leading_orphan_tool_results_are_skipped() {
        let mut orphan = stored(1, MessageRole::Tool, "stale");
        orphan.tool_call_id = Some("c0".into());
        let history = vec![
            orphan,
            stored(2, MessageRole::Assistant, "ok"),
            stored(3, MessageRole::User, "next"),
        ];

        let messages = to_llm_messages(&history);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role(), "assistant");
    }

    #[test]
    fn tool_exchange_round_trips_into_provider_shape() {
        let mut request = stored(1, MessageRole::Assistant, "");
        request.tool_calls = Some(json!([
            {"id": "c1", "type": "function", "function": {"name": "search", "arguments": "{}"}}
        ]));
        let mut result = stored(2, MessageRole::Tool, "found");
        result.tool_call_id = Some("c1".into());

        let messages = to_llm_messages(&[request, result]);
        match &messages[0] {
            Message::AI { content, tool_calls: Some(calls) } => {
                assert!(content.is_none());
                assert_eq!(calls[0].function.name, "search");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            messages[1],
            Message::tool_result("c1", "found")
        );
    }
}
