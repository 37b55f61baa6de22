//! Reply contract validation tests.

use deskmate::assistant::contract::{parse_response, TaskStatus};
use deskmate::assistant::{AiResponse, ContractError};

fn expect_invalid(raw: &str) -> ContractError {
    match parse_response(raw) {
        Ok(parsed) => panic!("expected {raw} to be rejected, got {parsed:?}"),
        Err(err) => err,
    }
}

#[test]
fn non_json_is_malformed() {
    for raw in ["", "Sure! Here you go", "{\"code\":1,", "```json\n{}\n```"] {
        assert!(
            matches!(expect_invalid(raw), ContractError::Malformed(_)),
            "{raw:?}"
        );
    }
}

#[test]
fn non_object_json_is_structure_error() {
    for raw in ["[]", "42", "\"hello\"", "null"] {
        assert!(
            matches!(expect_invalid(raw), ContractError::Structure(_)),
            "{raw:?}"
        );
    }
}

#[test]
fn missing_code_or_output_is_rejected() {
    assert!(matches!(
        expect_invalid(r#"{"output":"hi"}"#),
        ContractError::Structure(_)
    ));
    assert!(matches!(
        expect_invalid(r#"{"code":1}"#),
        ContractError::Structure(_)
    ));
    assert!(matches!(
        expect_invalid(r#"{"code":1,"output":""}"#),
        ContractError::Structure(_)
    ));
    assert!(matches!(
        expect_invalid(r#"{"code":1,"output":7}"#),
        ContractError::Structure(_)
    ));
}

#[test]
fn code_outside_range_is_rejected() {
    for code in ["0", "4", "-1", "1.5", "null"] {
        let raw = format!(r#"{{"code":{code},"output":"hi"}}"#);
        assert!(
            matches!(expect_invalid(&raw), ContractError::Structure(_)),
            "code {code}"
        );
    }
}

#[test]
fn informational_reply_parses() {
    let parsed = parse_response(r#"{"code":1,"output":"Hello"}"#).expect("valid reply");
    assert_eq!(parsed.code(), 1);
    assert_eq!(parsed.output(), "Hello");
}

#[test]
fn event_requires_summary_start_and_end() {
    let complete = serde_json::json!({
        "summary": "Sync",
        "start": {"dateTime": "2024-01-02T14:00:00+07:00", "timeZone": "Asia/Bangkok"},
        "end": {"dateTime": "2024-01-02T15:00:00+07:00", "timeZone": "Asia/Bangkok"}
    });

    let raw = serde_json::json!({"code": 2, "output": "Added.", "var": complete}).to_string();
    let parsed = parse_response(&raw).expect("complete event");
    let AiResponse::EventRequest { event, .. } = parsed else {
        panic!("expected an event request");
    };
    assert_eq!(event.summary, "Sync");
    assert_eq!(event.end.date_time, "2024-01-02T15:00:00+07:00");

    for pointer in ["/summary", "/start/dateTime", "/end/dateTime"] {
        let mut var = complete.clone();
        let (parent, field) = pointer.rsplit_once('/').expect("pointer has a slash");
        let target = if parent.is_empty() {
            &mut var
        } else {
            var.pointer_mut(parent).expect("parent exists")
        };
        target
            .as_object_mut()
            .expect("object")
            .remove(field);

        let raw = serde_json::json!({"code": 2, "output": "Added.", "var": var}).to_string();
        assert!(
            matches!(expect_invalid(&raw), ContractError::InvalidEvent(_)),
            "without {pointer}"
        );
    }
}

#[test]
fn event_with_empty_summary_is_rejected() {
    let raw = r#"{"code":2,"output":"ok","var":{"summary":"",
        "start":{"dateTime":"2024-01-02T14:00:00+07:00"},
        "end":{"dateTime":"2024-01-02T15:00:00+07:00"}}}"#;
    assert!(matches!(expect_invalid(raw), ContractError::InvalidEvent(_)));
}

#[test]
fn whitespace_summary_satisfies_the_contract() {
    let raw = r#"{"code":2,"output":"ok","var":{"summary":"  ",
        "start":{"dateTime":"2024-01-02T14:00:00+07:00"},
        "end":{"dateTime":"2024-01-02T15:00:00+07:00"}}}"#;
    assert!(parse_response(raw).is_ok());
}

#[test]
fn integral_float_code_is_accepted() {
    let parsed = parse_response(r#"{"code":1.0,"output":"Hello"}"#).expect("1.0 is code 1");
    assert_eq!(parsed.code(), 1);

    let raw = r#"{"code":3.0,"output":"Done.","var":{"title":"Buy milk"}}"#;
    assert_eq!(parse_response(raw).expect("3.0 is code 3").code(), 3);
}

#[test]
fn mistyped_event_extras_are_dropped() {
    let raw = r#"{"code":2,"output":"Added.","var":{"summary":"Sync",
        "start":{"dateTime":"2024-01-02T14:00:00+07:00","timeZone":7},
        "end":{"dateTime":"2024-01-02T15:00:00+07:00"},
        "location":{"room":4},
        "recurrence":"RRULE:FREQ=DAILY",
        "attendees":["bob@example.com"],
        "reminders":{"overrides":[{"method":"popup","minutes":10}]}}}"#;
    let AiResponse::EventRequest { event, .. } = parse_response(raw).expect("required fields present")
    else {
        panic!("expected an event request");
    };
    assert_eq!(event.summary, "Sync");
    assert_eq!(event.start.time_zone, None);
    assert_eq!(event.location, None);
    assert_eq!(event.recurrence, None);
    assert_eq!(event.attendees, None);
    let reminders = event.reminders.expect("reminders without useDefault");
    assert!(!reminders.use_default);
    assert_eq!(reminders.overrides.map(|o| o.len()), Some(1));
}

#[test]
fn mistyped_task_extras_are_dropped() {
    let raw = r#"{"code":3,"output":"Done.","var":{"title":"Buy milk",
        "status":"pending","notes":["a","b"],"due":"2024-01-03T00:00:00Z"}}"#;
    let AiResponse::TaskRequest { task, .. } = parse_response(raw).expect("title present") else {
        panic!("expected a task request");
    };
    assert_eq!(task.title, "Buy milk");
    assert_eq!(task.status, None);
    assert_eq!(task.notes, None);
    assert_eq!(task.due.as_deref(), Some("2024-01-03T00:00:00Z"));
}

#[test]
fn event_optional_fields_are_carried() {
    let raw = r#"{"code":2,"output":"ok","var":{
        "summary":"Standup","location":"Room 4","description":"Daily",
        "start":{"dateTime":"2024-01-02T09:00:00+07:00","timeZone":"Asia/Bangkok"},
        "end":{"dateTime":"2024-01-02T09:15:00+07:00","timeZone":"Asia/Bangkok"},
        "recurrence":["RRULE:FREQ=DAILY;COUNT=5"],
        "attendees":[{"email":"sam@example.com"}],
        "reminders":{"useDefault":false,"overrides":[{"method":"popup","minutes":10}]}}}"#;
    let AiResponse::EventRequest { event, .. } = parse_response(raw).expect("valid") else {
        panic!("expected an event request");
    };
    assert_eq!(event.location.as_deref(), Some("Room 4"));
    assert_eq!(
        event.recurrence,
        Some(vec!["RRULE:FREQ=DAILY;COUNT=5".to_owned()])
    );
    assert_eq!(event.attendees.map(|a| a.len()), Some(1));
    assert_eq!(event.reminders.map(|r| r.use_default), Some(false));
}

#[test]
fn task_requires_title() {
    let err = expect_invalid(r#"{"code":3,"output":"Done.","var":{}}"#);
    assert!(matches!(err, ContractError::InvalidTask(_)));

    let err = expect_invalid(r#"{"code":3,"output":"Done."}"#);
    assert!(matches!(err, ContractError::InvalidTask(_)));
}

#[test]
fn task_with_optional_fields_parses() {
    let raw = r#"{"code":3,"output":"Done.","var":{"title":"Buy milk",
        "notes":"2 litres","due":"2024-01-03T00:00:00Z","status":"needsAction"}}"#;
    let AiResponse::TaskRequest { task, output } = parse_response(raw).expect("valid") else {
        panic!("expected a task request");
    };
    assert_eq!(output, "Done.");
    assert_eq!(task.title, "Buy milk");
    assert_eq!(task.notes.as_deref(), Some("2 litres"));
    assert_eq!(task.status, Some(TaskStatus::NeedsAction));
}

#[test]
fn parsing_is_deterministic() {
    for raw in [
        r#"{"code":1,"output":"Hello"}"#,
        r#"{"code":3,"output":"Done.","var":{}}"#,
        "not json",
    ] {
        assert_eq!(parse_response(raw), parse_response(raw));
    }
}
