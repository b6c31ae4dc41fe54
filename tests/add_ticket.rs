pub mod common;

use it_ticketing::api::ticket::{Priority, Status};
use reqwest::StatusCode;
use serde_json::json;
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn creates_valid_ticket() {
    let base_url = common::spawn_app().await;
    let client =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await;
    let me = client.user().await.unwrap();

    let ticket = client
        .create_ticket(json!({
            "title": "VPN down",
            "description": "Cannot reach the VPN from home",
            "reporter": "Alice",
            "priority": "High",
        }))
        .await
        .unwrap();

    assert_eq!(ticket.display_id.to_string(), "IT000001");
    assert_eq!(ticket.title, "VPN down");
    assert_eq!(ticket.description, "Cannot reach the VPN from home");
    assert_eq!(ticket.reporter, "Alice");
    assert_eq!(ticket.status, Status::Open);
    assert_eq!(ticket.priority, Priority::High);
    assert_eq!(ticket.creator_uid, me.id);
    assert_eq!(ticket.creator_email, "alice@example.com");
    assert_eq!(ticket.assigned_to_email, None);
    assert!(ticket.comments.is_empty());
    assert!(!ticket.overdue);
    assert_eq!(ticket.resolved_at, None);

    let due_in = ticket.due_date.unwrap() - ticket.created_at;
    assert_eq!(due_in, Duration::days(10));
    assert!(ticket.created_at <= OffsetDateTime::now_utc());
}

#[tokio::test]
async fn defaults_priority_and_status() {
    let base_url = common::spawn_app().await;
    let ticket =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await
            .add_ticket("Printer jammed")
            .await
            .unwrap();

    assert_eq!(ticket.priority, Priority::Low);
    assert_eq!(ticket.status, Status::Open);
}

#[tokio::test]
async fn numbers_tickets_sequentially() {
    let base_url = common::spawn_app().await;
    let client =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await;

    for n in 1..=3 {
        let ticket = client.add_ticket(&format!("Ticket {n}")).await.unwrap();
        assert_eq!(ticket.display_id.to_string(), format!("IT00000{n}"));
    }
}

#[tokio::test]
async fn requires_title_description_and_reporter() {
    let base_url = common::spawn_app().await;
    let client =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await;

    for body in [
        json!({ "description": "d", "reporter": "r" }),
        json!({ "title": "t", "description": " ", "reporter": "r" }),
        json!({ "title": "t", "description": "d" }),
    ] {
        let status = client.create_ticket(body).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn rejects_unknown_priority() {
    let base_url = common::spawn_app().await;
    let status =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await
            .create_ticket(json!({
                "title": "t",
                "description": "d",
                "reporter": "r",
                "priority": "Urgent",
            }))
            .await
            .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn assigns_only_to_support_associates() {
    let base_url = common::spawn_app().await;
    let alice =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await;
    common::Client::signed_up(&base_url, "bob@example.com", "user").await;
    common::Client::signed_up(&base_url, "sam@example.com", "support").await;

    let body = |assignee: &str| {
        json!({
            "title": "Monitor flickers",
            "description": "Second monitor flickers",
            "reporter": "Alice",
            "assigned_to_email": assignee,
        })
    };

    let ticket = alice.create_ticket(body("sam@example.com")).await.unwrap();
    assert_eq!(ticket.assigned_to_email.as_deref(), Some("sam@example.com"));

    let status = alice
        .create_ticket(body("bob@example.com"))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = alice
        .create_ticket(body("ghost@example.com"))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn requires_authentication() {
    let base_url = common::spawn_app().await;
    let status = common::Client::new(&base_url)
        .add_ticket("Anonymous")
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
