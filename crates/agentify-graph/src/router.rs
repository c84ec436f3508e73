use crate::node::NodeType;
use crate::types::GraphState;

/// Decides which node runs next.
pub trait Router: Send + Sync {
    fn next(&self, state: &GraphState, current: NodeType) -> NextNode;
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextNode {
    LLM,
    Tool,
    End,
}

/// LLM -> Tool while the model asks for tools, Tool -> LLM, otherwise stop.
pub struct SimpleRouter;

impl Router for SimpleRouter {
    fn next(&self, state: &GraphState, current: NodeType) -> NextNode {
        match current {
            NodeType::LLM if state.has_pending_tool_calls() => NextNode::Tool,
            NodeType::LLM => NextNode::End,
            NodeType::Tool => NextNode::LLM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LLMConfig;
    use agentify_llm::{Message, ToolCall};

    fn state_ending_with(message: Message) -> GraphState {
        GraphState::new("u1", "t1", vec![message], vec![], LLMConfig::default())
    }

    #[test]
    fn tool_calls_route_to_tool_node() {
        let state = state_ending_with(Message::ai_with_tools(
            None,
            vec![ToolCall::new("c1", "search", "{}")],
        ));
        assert_eq!(SimpleRouter.next(&state, NodeType::LLM), NextNode::Tool);
        assert_eq!(SimpleRouter.next(&state, NodeType::Tool), NextNode::LLM);
    }

    #[test]
    fn plain_answer_ends_the_loop() {
        let state = state_ending_with(Message::ai("hi"));
        assert_eq!(SimpleRouter.next(&state, NodeType::LLM), NextNode::End);
    }
}
