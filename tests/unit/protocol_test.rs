//! Tests for the wire envelope and verdict parsing

use bus_admission::core::protocol::{action_of, required_str, REASON_NOT_SPECIFIED};
use bus_admission::core::{BridgeError, Reply, Status, Verdict};
use serde_json::json;

#[test]
fn test_reply_round_trips_through_serde() {
    let reply: Reply = serde_json::from_value(json!({ "status": "error", "message": "nope" })).unwrap();
    assert_eq!(reply.status, Status::Error);
    assert_eq!(reply.result, None);
    assert_eq!(reply.message.as_deref(), Some("nope"));
}

#[test]
fn test_result_reply_omits_message() {
    let doc = Reply::ok_with(json!({ "items": [] })).to_document();
    assert!(doc.get("message").is_none());
    assert_eq!(doc["status"], "ok");
}

#[test]
fn test_reply_from_outcome() {
    assert_eq!(Reply::from(Ok::<_, BridgeError>(Reply::ok())), Reply::ok());
    assert_eq!(
        Reply::from(Err::<Reply, _>(BridgeError::HandlerMismatch)),
        Reply::error("handler ID mismatch")
    );
}

#[test]
fn test_verdict_block_without_reason() {
    let blockage = Verdict::from_reply(&json!({ "canRun": false })).into_blockage().unwrap();
    assert_eq!(blockage.to_string(), REASON_NOT_SPECIFIED);
}

#[test]
fn test_verdict_ignores_unknown_fields() {
    let verdict = Verdict::from_reply(&json!({ "canRun": false, "reason": "busy", "extra": 1 }));
    assert!(!verdict.can_run);
    assert_eq!(verdict.reason.as_deref(), Some("busy"));
}

#[test]
fn test_null_reply_allows() {
    assert_eq!(Verdict::from_reply(&serde_json::Value::Null), Verdict::allow());
}

#[test]
fn test_field_helpers() {
    let body = json!({ "action": 3, "handlerAddress": "svc" });
    assert_eq!(action_of(&body), Err(BridgeError::NoAction));
    assert_eq!(required_str(&body, "handlerAddress"), Ok("svc"));
}
