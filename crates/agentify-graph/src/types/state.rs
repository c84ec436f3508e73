use crate::types::config::LLMConfig;
use agentify_llm::{ChatResponse, Message, TokenUsage, Tool, ToolCall};
use agentify_persist::{NewMessage, PersistError};

/// Working state of one chat turn.
///
/// `messages` is what the provider sees. `records` collects what this turn
/// produced for storage; it is written in one batch once the loop finishes,
/// so an aborted turn leaves nothing half-written behind.
#[derive(Debug, Clone)]
pub struct GraphState {
    pub user_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub llm_config: LLMConfig,
    pub records: Vec<NewMessage>,
    pub usage: Option<TokenUsage>,
}

impl GraphState {
    pub fn new(
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        messages: Vec<Message>,
        tools: Vec<Tool>,
        llm_config: LLMConfig,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            messages,
            tools,
            llm_config,
            records: Vec::new(),
            usage: None,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        matches!(
            self.last_message(),
            Some(Message::AI { tool_calls: Some(calls), .. }) if !calls.is_empty()
        )
    }

    pub fn get_pending_tool_calls(&self) -> Vec<ToolCall> {
        match self.last_message() {
            Some(Message::AI { tool_calls: Some(calls), .. }) => calls.clone(),
            _ => Vec::new(),
        }
    }

    /// Record an assistant turn, with or without tool calls.
    pub fn add_ai_response(&mut self, response: ChatResponse) -> Result<(), PersistError> {
        if let Some(usage) = response.usage {
            self.usage = Some(usage);
        }

        let text = response.content.unwrap_or_default();
        match response.tool_calls.filter(|calls| !calls.is_empty()) {
            Some(calls) => {
                let wire = serde_json::to_value(&calls)?;
                self.records.push(NewMessage::assistant_tool_calls(text.clone(), wire));
                self.messages.push(Message::ai_with_tools(Some(text), calls));
            }
            None => {
                self.records.push(NewMessage::assistant(text.clone()));
                self.messages.push(Message::ai(text));
            }
        }
        Ok(())
    }

    pub fn add_tool_result(&mut self, tool_call_id: String, result: String) {
        self.records.push(NewMessage::tool_result(tool_call_id.clone(), result.clone()));
        self.messages.push(Message::tool_result(tool_call_id, result));
    }

    /// Text of the latest assistant turn.
    pub fn final_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::AI { .. }))
            .map(Message::text)
            .unwrap_or_default()
    }

    /// Append a note to the final assistant text, in both views.
    pub fn append_note(&mut self, note: &str) {
        let text = self.final_text();
        let noted = if text.is_empty() {
            note.to_string()
        } else {
            format!("{}\n\n{}", text, note)
        };
        self.records.push(NewMessage::assistant(noted.clone()));
        self.messages.push(Message::ai(noted));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GraphState {
        GraphState::new("u1", "t1", vec![Message::human("hi")], vec![], LLMConfig::default())
    }

    #[test]
    fn tool_call_turn_is_pending_until_answered() {
        let mut state = state();
        let response = ChatResponse {
            tool_calls: Some(vec![ToolCall::new("call_1", "search", r#"{"q":"x"}"#)]),
            ..Default::default()
        };
        state.add_ai_response(response).unwrap();
        assert!(state.has_pending_tool_calls());
        assert_eq!(state.get_pending_tool_calls()[0].id, "call_1");
        assert!(state.records[0].tool_calls.is_some());

        state.add_tool_result("call_1".into(), "found".into());
        assert!(!state.has_pending_tool_calls());
        assert_eq!(state.records.len(), 2);
    }

    #[test]
    fn empty_tool_call_list_is_a_plain_answer() {
        let mut state = state();
        let response = ChatResponse {
            content: Some("done".into()),
            tool_calls: Some(vec![]),
            ..Default::default()
        };
        state.add_ai_response(response).unwrap();
        assert!(!state.has_pending_tool_calls());
        assert_eq!(state.final_text(), "done");
        assert!(state.records[0].tool_calls.is_none());
    }

    #[test]
    fn note_extends_last_answer() {
        let mut state = state();
        state.add_ai_response(ChatResponse::text("partial")).unwrap();
        state.append_note("[stopped]");
        assert_eq!(state.final_text(), "partial\n\n[stopped]");
    }
}
