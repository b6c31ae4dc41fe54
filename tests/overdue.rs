pub mod common;

use serde_json::json;

#[tokio::test]
async fn past_due_open_tickets_are_overdue() {
    let base_url = common::spawn_app().await;
    let sam =
        common::Client::signed_up(&base_url, "sam@example.com", "support")
            .await;
    let late = sam.add_ticket("Late").await.unwrap().id.to_string();
    let done = sam.add_ticket("Late but done").await.unwrap().id.to_string();
    sam.add_ticket("On time").await.unwrap();

    let updated = sam
        .update_ticket(&late, json!({ "due_date": "2020-01-01" }))
        .await
        .unwrap();
    assert!(updated.overdue);
    let updated = sam
        .update_ticket(
            &done,
            json!({ "due_date": "2020-01-01", "status": "Closed" }),
        )
        .await
        .unwrap();
    assert!(!updated.overdue);

    let list = sam.my_tickets("due=overdue").await.unwrap();
    assert_eq!(list.total_count, 1);
    assert_eq!(list.tickets[0].title, "Late");
    assert!(list.tickets[0].overdue);

    let counts = sam.summary_counts().await.unwrap();
    assert_eq!(counts.overdue, 1);
}
