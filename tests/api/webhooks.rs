use claims::{assert_matches, assert_ok};

use reqwest::StatusCode;

use mailsync::domain::{MemberStatus, SyncAction};
use mailsync::repo::StatusStore;
use mailsync::sync::{WebhookError, WebhookEvent, WebhookKind, WebhookOutcome};

use crate::helpers::{list, Call, TestApp, TestSync, L1_SECRET};

fn unsubscribe_form<'a>(list_id: &'a str, email: &'a str) -> [(&'a str, &'a str); 3] {
    [
        ("type", "unsubscribe"),
        ("data[list_id]", list_id),
        ("data[email]", email),
    ]
}

#[tokio::test]
async fn endpoint_answers_validation_requests() {
    let app = TestApp::spawn().await;

    let res = app.webhook_ping().await.expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());
}

#[tokio::test]
async fn unsubscribe_with_correct_secret_unsubscribes_the_user() {
    let app = TestApp::spawn().await;
    app.sync
        .remote
        .add_member("L1", "bob@x.com", MemberStatus::Subscribed);

    let res = app
        .webhook(Some(L1_SECRET), &unsubscribe_form("L1", "bob@x.com"))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());
    assert_eq!(
        Some(MemberStatus::Unsubscribed),
        app.sync.remote.member_status("L1", "bob@x.com")
    );

    let status = app.sync.store.status(2).await.unwrap().expect("No status recorded");
    assert_eq!(SyncAction::Unsubscribe, status.last_action_performed);
    assert!(status.unsubscribed.contains(&list("L1")));
}

#[tokio::test]
async fn bad_secret_is_not_found() {
    let app = TestApp::spawn().await;
    app.sync
        .remote
        .add_member("L1", "bob@x.com", MemberStatus::Subscribed);

    let test_cases = vec![
        ("wrong secret", Some("not-the-secret"), "L1"),
        ("missing secret", None, "L1"),
        ("list without a secret", Some(L1_SECRET), "L2"),
        ("unknown list", Some(L1_SECRET), "L404"),
    ];

    for (desc, secret, list_id) in test_cases {
        let res = app
            .webhook(secret, &unsubscribe_form(list_id, "bob@x.com"))
            .await
            .expect("Failed to execute request");

        assert_eq!(
            StatusCode::NOT_FOUND,
            res.status(),
            "The API did not reject a webhook with {}",
            desc
        );
        let body = res.text().await.unwrap();
        assert!(body.is_empty(), "Expected an empty body with {}", desc);
    }

    assert!(app
        .sync
        .remote
        .calls()
        .iter()
        .all(|call| !matches!(call, Call::Unsubscribe(..))));
    assert_eq!(
        Some(MemberStatus::Subscribed),
        app.sync.remote.member_status("L1", "bob@x.com")
    );
}

#[tokio::test]
async fn other_event_types_are_acknowledged() {
    let app = TestApp::spawn().await;

    let res = app
        .webhook(
            Some(L1_SECRET),
            &[("type", "profile"), ("data[list_id]", "L1"), ("data[email]", "bob@x.com")],
        )
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());
    assert!(app.sync.remote.calls().is_empty());
}

#[tokio::test]
async fn unknown_address_is_acknowledged() {
    let app = TestApp::spawn().await;

    let res = app
        .webhook(Some(L1_SECRET), &unsubscribe_form("L1", "stranger@x.com"))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());
    assert!(app.sync.remote.mutations().is_empty());
}

#[tokio::test]
async fn list_id_is_sanitized_before_lookup() {
    let sync = TestSync::new();
    sync.remote.add_member("L1", "bob@x.com", MemberStatus::Subscribed);

    let event = WebhookEvent {
        kind: WebhookKind::Unsubscribe,
        list_id: " L1<> ".into(),
        email: Some("bob@x.com".into()),
    };
    let outcome = sync
        .bridge
        .handle_webhook(event, Some(L1_SECRET))
        .await
        .expect("Failed to handle webhook");

    assert_matches!(outcome, WebhookOutcome::Unsubscribed(_));
    assert!(sync
        .remote
        .calls()
        .contains(&Call::Unsubscribe(list("L1"), "bob@x.com".into(), false)));
}

#[tokio::test]
async fn webhook_events_resolve_without_a_server() {
    let sync = TestSync::new();

    let mismatch = sync
        .bridge
        .handle_webhook(
            WebhookEvent {
                kind: WebhookKind::Unsubscribe,
                list_id: "L1".into(),
                email: Some("bob@x.com".into()),
            },
            Some("l1-webhook-secre"),
        )
        .await;
    assert_matches!(mismatch, Err(WebhookError::SecretMismatch(id)) if id == list("L1"));

    let missing_email = sync
        .bridge
        .handle_webhook(
            WebhookEvent {
                kind: WebhookKind::Unsubscribe,
                list_id: "L1".into(),
                email: None,
            },
            Some(L1_SECRET),
        )
        .await;
    assert_matches!(missing_email, Ok(WebhookOutcome::UnknownUser));

    let ignored = assert_ok!(
        sync.bridge
            .handle_webhook(
                WebhookEvent {
                    kind: "cleaned".into(),
                    list_id: "L1".into(),
                    email: Some("bob@x.com".into()),
                },
                Some(L1_SECRET),
            )
            .await
    );
    assert_matches!(ignored, WebhookOutcome::Ignored(WebhookKind::Other(kind)) if kind == "cleaned");
}
