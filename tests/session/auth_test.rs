//! Auth-state transition tests.

use std::sync::atomic::Ordering;
use std::sync::Mutex;

use deskmate::google::IdentityProvider;
use deskmate::session::AuthTransition;

use crate::fakes::{event, FakeCalendar, FakeMail, FakeProvider, FakeTasks, Harness};

fn harness() -> Harness {
    Harness::new(
        FakeMail {
            fail_listing: true,
            ..FakeMail::default()
        },
        FakeCalendar {
            events: Mutex::new(vec![event(
                "Review",
                "2024-01-02T13:00:00+07:00",
                "2024-01-02T14:00:00+07:00",
            )]),
            ..FakeCalendar::default()
        },
        FakeTasks::with_default_list(),
        FakeProvider::replying(&[r#"{"code":1,"output":"Hi"}"#]),
    )
}

#[tokio::test]
async fn sign_in_fetches_context_even_when_a_source_fails() {
    let harness = harness();
    let mut session = harness.session();

    assert_eq!(session.on_auth_change(true).await, AuthTransition::SignedIn);
    let state = session.state();
    assert!(state.signed_in);
    assert!(state.context.unread_emails.is_empty());
    assert_eq!(state.context.upcoming_events.len(), 1);
    assert_eq!(harness.mail.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.tasks.list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_notification_is_unchanged() {
    let harness = harness();
    let mut session = harness.session();
    session.on_auth_change(true).await;

    assert_eq!(session.on_auth_change(true).await, AuthTransition::Unchanged);
    assert_eq!(
        harness.calendar.list_events_calls.load(Ordering::SeqCst),
        1,
        "no second fetch"
    );
    assert_eq!(
        session.on_auth_change(true).await,
        AuthTransition::Unchanged
    );
}

#[tokio::test]
async fn sign_out_clears_context_and_conversation() {
    let harness = harness();
    let mut session = harness.session();
    session.on_auth_change(true).await;
    session.submit("hello").await.expect("signed in");
    assert_eq!(session.state().conversation.len(), 2);

    assert_eq!(session.on_auth_change(false).await, AuthTransition::SignedOut);
    let state = session.state();
    assert!(!state.signed_in);
    assert!(state.context.upcoming_events.is_empty());
    assert!(state.conversation.is_empty());
}

#[tokio::test]
async fn subscription_drives_transitions() {
    let harness = harness();
    let mut session = harness.session();
    let mut auth = harness.identity.subscribe();

    harness.identity.sign_in().await.expect("fake sign-in");
    auth.changed().await.expect("sender alive");
    let signed_in = *auth.borrow_and_update();
    assert_eq!(
        session.on_auth_change(signed_in).await,
        AuthTransition::SignedIn
    );

    harness.identity.sign_out().await.expect("fake sign-out");
    auth.changed().await.expect("sender alive");
    let signed_in = *auth.borrow_and_update();
    assert_eq!(
        session.on_auth_change(signed_in).await,
        AuthTransition::SignedOut
    );
}
