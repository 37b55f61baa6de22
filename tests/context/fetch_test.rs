//! Context fetcher tests: per-source degradation and normalization.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use deskmate::context::{EmailSummary, EventSummary, TaskSummary, NO_SUBJECT, UNKNOWN_SENDER};

use crate::fakes::{
    event, message, server_error, task, task_list, FakeCalendar, FakeMail, FakeProvider,
    FakeTasks, Harness,
};

fn populated_calendar() -> FakeCalendar {
    FakeCalendar {
        events: Mutex::new(vec![event(
            "Standup",
            "2024-01-02T09:00:00+07:00",
            "2024-01-02T09:15:00+07:00",
        )]),
        ..FakeCalendar::default()
    }
}

fn populated_tasks() -> FakeTasks {
    FakeTasks {
        lists: vec![task_list("a", "My Tasks"), task_list("b", "Errands")],
        tasks: HashMap::from([
            ("a".to_owned(), vec![task("Write report", Some("2024-01-05T00:00:00.000Z"))]),
            ("b".to_owned(), vec![task("Buy milk", None), task("Post letter", None)]),
        ]),
        ..FakeTasks::default()
    }
}

#[tokio::test]
async fn failed_mail_listing_degrades_to_empty() {
    let harness = Harness::new(
        FakeMail {
            fail_listing: true,
            ..FakeMail::default()
        },
        populated_calendar(),
        populated_tasks(),
        FakeProvider::default(),
    );

    let report = harness.fetcher().fetch_all().await;
    assert!(report.emails.is_err());
    assert!(report.events.is_ok());
    assert!(report.tasks.is_ok());

    let snapshot = report.into_snapshot();
    assert!(snapshot.unread_emails.is_empty());
    assert_eq!(snapshot.upcoming_events.len(), 1);
    assert_eq!(snapshot.upcoming_tasks.len(), 3);
}

#[tokio::test]
async fn every_source_can_fail_independently() {
    let calendar = FakeCalendar {
        event_failures: Mutex::new(vec![server_error()].into()),
        ..FakeCalendar::default()
    };
    let tasks = FakeTasks {
        fail_listing: true,
        ..FakeTasks::default()
    };
    let harness = Harness::new(
        FakeMail {
            messages: vec![message("m1", Some("Hi"), Some("Ana"), "hello")],
            ..FakeMail::default()
        },
        calendar,
        tasks,
        FakeProvider::default(),
    );

    let snapshot = harness.fetcher().fetch_context().await;
    assert_eq!(snapshot.unread_emails.len(), 1);
    assert!(snapshot.upcoming_events.is_empty());
    assert!(snapshot.upcoming_tasks.is_empty());
}

#[tokio::test]
async fn messages_are_flattened_with_placeholders() {
    let harness = Harness::new(
        FakeMail {
            messages: vec![
                message("m1", Some("Invoice"), Some("Billing <b@example.com>"), "Due soon"),
                message("m2", None, None, "No headers here"),
            ],
            ..FakeMail::default()
        },
        FakeCalendar::default(),
        FakeTasks::default(),
        FakeProvider::default(),
    );

    let emails = harness.fetcher().fetch_emails().await.expect("mail loads");
    assert_eq!(
        emails,
        vec![
            EmailSummary {
                subject: "Invoice".to_owned(),
                from: "Billing <b@example.com>".to_owned(),
                snippet: "Due soon".to_owned(),
            },
            EmailSummary {
                subject: NO_SUBJECT.to_owned(),
                from: UNKNOWN_SENDER.to_owned(),
                snippet: "No headers here".to_owned(),
            },
        ]
    );
    assert_eq!(harness.mail.get_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unread_listing_is_capped() {
    let messages = (0..15)
        .map(|i| message(&format!("m{i}"), Some("s"), Some("f"), "x"))
        .collect();
    let harness = Harness::new(
        FakeMail {
            messages,
            ..FakeMail::default()
        },
        FakeCalendar::default(),
        FakeTasks::default(),
        FakeProvider::default(),
    );

    let emails = harness.fetcher().fetch_emails().await.expect("mail loads");
    assert_eq!(emails.len(), 10);
}

#[tokio::test]
async fn tasks_are_flattened_in_list_order() {
    let harness = Harness::new(
        FakeMail::default(),
        FakeCalendar::default(),
        populated_tasks(),
        FakeProvider::default(),
    );

    let tasks = harness.fetcher().fetch_tasks().await.expect("tasks load");
    assert_eq!(
        tasks,
        vec![
            TaskSummary {
                title: Some("Write report".to_owned()),
                due: Some("2024-01-05T00:00:00.000Z".to_owned()),
            },
            TaskSummary {
                title: Some("Buy milk".to_owned()),
                due: None,
            },
            TaskSummary {
                title: Some("Post letter".to_owned()),
                due: None,
            },
        ]
    );
}

#[tokio::test]
async fn events_keep_start_and_end() {
    let harness = Harness::new(
        FakeMail::default(),
        populated_calendar(),
        FakeTasks::default(),
        FakeProvider::default(),
    );

    let events = harness.fetcher().fetch_events().await.expect("events load");
    assert_eq!(
        events,
        vec![EventSummary {
            summary: Some("Standup".to_owned()),
            start: Some("2024-01-02T09:00:00+07:00".to_owned()),
            end: Some("2024-01-02T09:15:00+07:00".to_owned()),
        }]
    );
}

#[test]
fn snapshot_serializes_with_camel_case_lists_and_skips_missing_fields() {
    let snapshot = deskmate::context::ContextSnapshot {
        upcoming_tasks: vec![TaskSummary {
            title: Some("Buy milk".to_owned()),
            due: None,
        }],
        ..Default::default()
    };
    let json = serde_json::to_value(&snapshot).expect("serializes");
    assert_eq!(
        json,
        serde_json::json!({
            "unreadEmails": [],
            "upcomingEvents": [],
            "upcomingTasks": [{"title": "Buy milk"}]
        })
    );
}
