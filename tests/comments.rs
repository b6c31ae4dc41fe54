pub mod common;

use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn appends_comments_in_order() {
    let base_url = common::spawn_app().await;
    let alice =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await;
    let sam =
        common::Client::signed_up(&base_url, "sam@example.com", "support")
            .await;
    let id = alice.add_ticket("Ticket 1").await.unwrap().id.to_string();

    let first = alice.add_comment(&id, "It broke again").await.unwrap();
    assert_eq!(first.comments.len(), 1);
    assert_eq!(first.comments[0].text, "It broke again");
    assert_eq!(first.comments[0].commenter, "alice@example.com");

    let second = sam.add_comment(&id, "Looking into it").await.unwrap();
    assert_eq!(second.comments.len(), 2);
    assert_eq!(second.comments[0], first.comments[0]);
    assert_eq!(second.comments[1].commenter, "sam@example.com");
    assert!(second.comments[0].timestamp <= second.comments[1].timestamp);
    assert_eq!(second.updated_at, second.comments[1].timestamp);
}

#[tokio::test]
async fn updates_keep_comments() {
    let base_url = common::spawn_app().await;
    let alice =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await;
    let id = alice.add_ticket("Ticket 1").await.unwrap().id.to_string();
    let commented = alice.add_comment(&id, "First comment").await.unwrap();

    alice
        .update_ticket(&id, json!({ "title": "Renamed" }))
        .await
        .unwrap();

    let ticket = alice.get_ticket(&id).await.unwrap();
    assert_eq!(ticket.title, "Renamed");
    assert_eq!(ticket.comments, commented.comments);
}

#[tokio::test]
async fn rejects_empty_comment() {
    let base_url = common::spawn_app().await;
    let alice =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await;
    let id = alice.add_ticket("Ticket 1").await.unwrap().id.to_string();

    let status = alice.add_comment(&id, "   ").await.unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn finished_tickets_take_no_comments() {
    let base_url = common::spawn_app().await;
    let sam =
        common::Client::signed_up(&base_url, "sam@example.com", "support")
            .await;
    let id = sam.add_ticket("Ticket 1").await.unwrap().id.to_string();
    sam.update_ticket(&id, json!({ "status": "Resolved" }))
        .await
        .unwrap();

    let status = sam.add_comment(&id, "One more thing").await.unwrap_err();
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn commenting_on_missing_ticket_is_not_found() {
    let base_url = common::spawn_app().await;
    let alice =
        common::Client::signed_up(&base_url, "alice@example.com", "user")
            .await;

    let status = alice.add_comment("IT000009", "Hello?").await.unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
}
