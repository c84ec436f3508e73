use agentify_llm::{ChatOptions, ChatRequest, ChatResponse, Content, Message, Tool, ToolCall, ToolChoice};
use serde_json::json;

#[test]
fn test_message_roles() {
    assert_eq!(Message::system("be brief").role(), "system");
    assert_eq!(Message::human("Hello").role(), "user");
    assert_eq!(Message::ai("Hi there!").role(), "assistant");
    assert_eq!(Message::tool_result("call_123", "42").role(), "tool");
}

#[test]
fn test_message_serialization_human() {
    let json = serde_json::to_value(Message::human("Hello")).unwrap();
    assert_eq!(json, json!({"role": "user", "content": "Hello"}));
}

#[test]
fn test_tool_call_turn_omits_empty_content() {
    let msg = Message::ai_with_tools(Some(String::new()), vec![ToolCall::new("call_1", "search", "{}")]);
    let json = serde_json::to_value(&msg).unwrap();
    assert!(json.get("content").is_none());
    assert_eq!(json["tool_calls"][0]["id"], "call_1");
    assert_eq!(msg.text(), "");
}

#[test]
fn test_tool_result_serialization() {
    let json = serde_json::to_value(Message::tool_result("call_9", "done")).unwrap();
    assert_eq!(json["role"], "tool");
    assert_eq!(json["tool_call_id"], "call_9");
}

#[test]
fn test_message_deserialization() {
    let msg: Message = serde_json::from_str(r#"{"role":"assistant","content":"Sure"}"#).unwrap();
    assert_eq!(msg, Message::AI { content: Some(Content::text("Sure")), tool_calls: None });
}

#[test]
fn test_chat_request_with_tools() {
    let tools = vec![Tool::function("search", None, json!({"type": "object"}))];
    let request = ChatRequest::new("gpt-4o", vec![Message::human("Hi")])
        .with_options(ChatOptions::new().max_tokens(200).tools(tools));

    assert_eq!(request.model, "gpt-4o");
    assert_eq!(request.options.max_tokens, Some(200));
    assert_eq!(request.options.tool_choice, Some(ToolChoice::Auto));
}

#[test]
fn test_chat_response_tool_call_detection() {
    assert!(!ChatResponse::text("plain").has_tool_calls());

    let response = ChatResponse {
        tool_calls: Some(vec![ToolCall::new("c", "search", "{}")]),
        ..Default::default()
    };
    assert!(response.has_tool_calls());
}
