//! Unit tests for Langbase wire types.

use super::*;

#[test]
fn test_message_role_wire_names() {
    let json = serde_json::to_string(&Message::system("be terse")).unwrap();
    assert_eq!(json, r#"{"role":"system","content":"be terse"}"#);

    let msg: Message = serde_json::from_str(r#"{"role": "assistant", "content": "ok"}"#).unwrap();
    assert_eq!(msg.role, MessageRole::Assistant);
}

#[test]
fn test_prompted_request_layout() {
    let req = PipeRequest::prompted("thought-expand-v1", "system text", "expand this");

    assert_eq!(req.name, "thought-expand-v1");
    assert!(!req.stream);
    assert_eq!(
        req.messages,
        vec![Message::system("system text"), Message::user("expand this")]
    );
}

#[test]
fn test_pipe_request_serialize() {
    let json = serde_json::to_value(PipeRequest::new("p", vec![Message::user("hi")])).unwrap();
    assert_eq!(json["name"], "p");
    assert_eq!(json["stream"], false);
    assert_eq!(json["messages"][0]["role"], "user");
    assert!(json.get("threadId").is_none());
}

#[test]
fn test_pipe_response_deserialize() {
    let json = r#"{
        "success": true,
        "completion": "{\"ok\": true}",
        "threadId": "t-123",
        "raw": {"model": "gpt-4o-mini", "usage": {"prompt_tokens": 10, "total_tokens": 30}}
    }"#;
    let resp: PipeResponse = serde_json::from_str(json).unwrap();
    assert!(resp.success);
    assert_eq!(resp.thread_id.as_deref(), Some("t-123"));
    assert_eq!(resp.total_tokens(), Some(30));
    assert_eq!(resp.model(), Some("gpt-4o-mini"));
    let usage = resp.raw.as_ref().and_then(|r| r.usage.as_ref()).unwrap();
    assert!(usage.completion_tokens.is_none());
}

#[test]
fn test_pipe_response_minimal() {
    let resp: PipeResponse = serde_json::from_str(r#"{"success": false, "completion": ""}"#).unwrap();
    assert!(!resp.success);
    assert!(resp.raw.is_none());
    assert!(resp.thread_id.is_none());
    assert_eq!(resp.total_tokens(), None);
    assert_eq!(resp.model(), None);
}
