//! End-to-end submit tests: one user turn and exactly one model turn each.

use std::sync::atomic::Ordering;
use std::sync::Mutex;

use deskmate::assistant::dispatch::GENERIC_FAILURE;
use deskmate::conversation::Role;
use deskmate::session::SessionError;

use crate::fakes::{
    event, forbidden, server_error, FakeCalendar, FakeIdentity, FakeMail, FakeProvider,
    FakeTasks, Harness,
};

const SCENARIO_TWO: &str = r#"{"code":2,"output":"Added.","var":{"summary":"Sync","start":{"dateTime":"2024-01-02T14:00:00+07:00","timeZone":"Asia/Bangkok"}}}"#;

async fn signed_in(harness: &Harness) -> deskmate::session::Session {
    let mut session = harness.session();
    session.on_auth_change(true).await;
    session
}

fn with_replies(replies: &[&str]) -> Harness {
    Harness::new(
        FakeMail::default(),
        FakeCalendar::default(),
        FakeTasks::with_default_list(),
        FakeProvider::replying(replies),
    )
}

#[tokio::test]
async fn informational_reply_appends_one_model_turn() {
    let harness = with_replies(&[r#"{"code":1,"output":"Hello"}"#]);
    let mut session = signed_in(&harness).await;

    let turn = session.submit("hi").await.expect("accepted").clone();
    assert_eq!(turn.role, Role::Model);
    assert_eq!(turn.text, "Hello");

    let conversation = &session.state().conversation;
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.turns()[0].role, Role::User);
    assert_eq!(conversation.turns()[0].text, "hi");
    assert_eq!(harness.calendar.inserts(), 0);
    assert_eq!(harness.tasks.inserts(), 0);
}

#[tokio::test]
async fn created_event_refreshes_events_only() {
    let harness = with_replies(&[SCENARIO_TWO]);
    let mut session = signed_in(&harness).await;
    assert!(session.state().context.upcoming_events.is_empty());
    let task_listings = harness.tasks.list_calls.load(Ordering::SeqCst);

    let turn = session.submit("add a sync at 2pm").await.expect("accepted");
    assert_eq!(turn.text, "Added.");

    let events = &session.state().context.upcoming_events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].end.as_deref(), Some("2024-01-02T15:00:00+07:00"));
    assert_eq!(harness.calendar.list_events_calls.load(Ordering::SeqCst), 2);
    assert_eq!(harness.tasks.list_calls.load(Ordering::SeqCst), task_listings);
}

#[tokio::test]
async fn failed_events_refresh_keeps_previous_list() {
    let harness = Harness::new(
        FakeMail::default(),
        FakeCalendar {
            events: Mutex::new(vec![event(
                "Existing",
                "2024-01-02T09:00:00+07:00",
                "2024-01-02T10:00:00+07:00",
            )]),
            ..FakeCalendar::default()
        },
        FakeTasks::default(),
        FakeProvider::replying(&[SCENARIO_TWO]),
    );
    let mut session = signed_in(&harness).await;
    harness
        .calendar
        .event_failures
        .lock()
        .expect("lock")
        .push_back(server_error());

    let turn = session.submit("add a sync").await.expect("accepted");
    assert_eq!(turn.text, "Added.");
    let events = &session.state().context.upcoming_events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].summary.as_deref(), Some("Existing"));
}

#[tokio::test]
async fn task_without_title_reports_validation_error() {
    let harness = with_replies(&[r#"{"code":3,"output":"Done.","var":{}}"#]);
    let mut session = signed_in(&harness).await;
    let listings = harness.tasks.list_calls.load(Ordering::SeqCst);

    let turn = session.submit("remind me").await.expect("accepted");
    assert_eq!(turn.role, Role::Model);
    assert!(turn.text.contains("title"), "{}", turn.text);
    assert_ne!(turn.text, "Done.");
    assert_eq!(harness.tasks.inserts(), 0);
    assert_eq!(harness.tasks.list_calls.load(Ordering::SeqCst), listings);
}

#[tokio::test]
async fn permission_retry_yields_one_success_turn() {
    let harness = Harness::new(
        FakeMail::default(),
        FakeCalendar::with_insert_failures(vec![forbidden()]),
        FakeTasks::default(),
        FakeProvider::replying(&[SCENARIO_TWO]),
    );
    let mut session = signed_in(&harness).await;

    let turn = session.submit("add a sync").await.expect("accepted");
    assert_eq!(turn.text, "Added.");
    assert_eq!(harness.calendar.inserts(), 2);
    assert_eq!(harness.identity.reauthorizations(), 1);
    assert_eq!(session.state().conversation.len(), 2);
}

#[tokio::test]
async fn failed_reauthorization_yields_one_failure_turn() {
    let mut harness = Harness::new(
        FakeMail::default(),
        FakeCalendar::with_insert_failures(vec![forbidden()]),
        FakeTasks::default(),
        FakeProvider::replying(&[SCENARIO_TWO]),
    );
    harness.identity = std::sync::Arc::new(FakeIdentity::failing_reauthorization());
    let mut session = signed_in(&harness).await;

    let turn = session.submit("add a sync").await.expect("accepted");
    assert_ne!(turn.text, "Added.");
    assert!(turn.text.contains("permission"), "{}", turn.text);
    assert_eq!(harness.calendar.inserts(), 1);
    assert_eq!(harness.identity.reauthorizations(), 1);
    assert_eq!(session.state().conversation.len(), 2);
}

#[tokio::test]
async fn malformed_reply_yields_generic_notice() {
    let harness = with_replies(&["I think you should relax today."]);
    let mut session = signed_in(&harness).await;

    let turn = session.submit("plan my day").await.expect("accepted");
    assert_eq!(turn.text, GENERIC_FAILURE);
    assert_eq!(harness.calendar.inserts(), 0);
}

#[tokio::test]
async fn model_failure_yields_generic_notice() {
    let harness = with_replies(&[]);
    let mut session = signed_in(&harness).await;

    let turn = session.submit("hello").await.expect("accepted");
    assert_eq!(turn.text, GENERIC_FAILURE);
    assert_eq!(session.state().conversation.len(), 2);
}

#[tokio::test]
async fn history_excludes_the_current_message() {
    let harness = with_replies(&[
        r#"{"code":1,"output":"First"}"#,
        r#"{"code":1,"output":"Second"}"#,
    ]);
    let mut session = signed_in(&harness).await;
    session.submit("one").await.expect("accepted");
    session.submit("two").await.expect("accepted");

    let requests = harness.provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].history.is_empty());
    assert_eq!(requests[1].history.len(), 2);
    assert_eq!(requests[1].history[0].text, "one");
    assert_eq!(requests[1].history[1].text, "First");
    assert!(requests[1].prompt.ends_with("User's question: two"));
}

#[tokio::test]
async fn blank_or_signed_out_submissions_are_rejected() {
    let harness = with_replies(&[r#"{"code":1,"output":"Hello"}"#]);
    let mut session = harness.session();
    assert_eq!(
        session.submit("hello").await.map(|t| t.text.clone()),
        Err(SessionError::NotSignedIn)
    );

    session.on_auth_change(true).await;
    assert_eq!(
        session.submit("   ").await.map(|t| t.text.clone()),
        Err(SessionError::EmptyMessage)
    );
    assert!(session.state().conversation.is_empty());
    assert!(harness.provider.requests().is_empty());
}
