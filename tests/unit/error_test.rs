//! Tests for error types

use bus_admission::core::{BridgeError, BusError, Reply, SerializeError};

#[test]
fn test_missing_field_error() {
    let err = BridgeError::MissingField("handlerAddress");
    assert_eq!(format!("{}", err), "missing handlerAddress");
}

#[test]
fn test_missing_job_data_error() {
    let err = BridgeError::MissingField("job data");
    assert_eq!(format!("{}", err), "missing job data");
}

#[test]
fn test_request_level_messages() {
    assert_eq!(BridgeError::NoAction.to_string(), "no action provided");
    assert_eq!(BridgeError::NotFound.to_string(), "no such project");
    assert_eq!(BridgeError::SchedulingFailure.to_string(), "failed to schedule");
    assert_eq!(BridgeError::InvalidField("quietPeriod").to_string(), "invalid quietPeriod");
}

#[test]
fn test_error_reply_carries_display_text() {
    let reply = Reply::from(&BridgeError::UnknownAction("explode".to_string()));
    assert!(!reply.is_ok());
    assert_eq!(reply.message.as_deref(), Some("unknown action explode"));
}

#[test]
fn test_bus_error() {
    let err = BusError::NoHandlers("svc".to_string());
    assert_eq!(format!("{}", err), "no handlers for address svc");
    assert_eq!(BusError::Closed.to_string(), "bus is closed");
}

#[test]
fn test_serialize_error_kinds() {
    assert_eq!(SerializeError::Failed("boom".into()).kind(), "failed");
    assert_eq!(SerializeError::Panicked("boom".into()).kind(), "panic");
    assert_eq!(SerializeError::Cycle { type_name: "Node" }.kind(), "cycle");
}

#[test]
fn test_app_result_wraps_bridge_error() {
    fn fails() -> bus_admission::core::AppResult<()> {
        Err(BridgeError::InvalidConfig("reply_timeout_ms must be greater than 0".into()).into())
    }
    let err = fails().unwrap_err();
    assert!(err.to_string().contains("reply_timeout_ms"));
    assert!(err.downcast_ref::<BridgeError>().is_some());
}
