pub mod common;

use it_ticketing::api;
use reqwest::StatusCode;

#[tokio::test]
async fn registers_user() {
    let base_url = common::spawn_app().await;
    let client = common::Client::new(&base_url);

    let registered = client
        .register("alice@example.com", common::PASSWORD, None)
        .await
        .unwrap();
    assert_eq!(
        registered.message,
        "User alice@example.com registered successfully!",
    );

    let session = client
        .login("alice@example.com", common::PASSWORD)
        .await
        .unwrap();
    assert_eq!(session.user.id, registered.user_id);
    assert_eq!(session.user.email, "alice@example.com");
    assert_eq!(session.user.role, api::user::Role::User);
}

#[tokio::test]
async fn registers_support_associate() {
    let base_url = common::spawn_app().await;
    let client =
        common::Client::signed_up(&base_url, "sam@example.com", "support")
            .await;

    let me = client.user().await.unwrap();
    assert_eq!(me.role, api::user::Role::Support);
}

#[tokio::test]
async fn rejects_duplicate_email() {
    let base_url = common::spawn_app().await;
    let client = common::Client::new(&base_url);
    client
        .register("alice@example.com", common::PASSWORD, None)
        .await
        .unwrap();

    let status = client
        .register("alice@example.com", "another password", Some("user"))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn matches_emails_case_insensitively() {
    let base_url = common::spawn_app().await;
    let client = common::Client::new(&base_url);
    let registered = client
        .register("Alice@Example.com", common::PASSWORD, None)
        .await
        .unwrap();

    let session = client
        .login("alice@example.COM", common::PASSWORD)
        .await
        .unwrap();
    assert_eq!(session.user.id, registered.user_id);
    assert_eq!(session.user.email, "alice@example.com");

    let status = client
        .register("ALICE@example.com", common::PASSWORD, None)
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn rejects_unknown_role() {
    let base_url = common::spawn_app().await;
    let status = common::Client::new(&base_url)
        .register("alice@example.com", common::PASSWORD, Some("admin"))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn requires_email_and_password() {
    let base_url = common::spawn_app().await;
    let client = common::Client::new(&base_url);

    let status = client
        .register("", common::PASSWORD, None)
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = client
        .register("alice@example.com", "", None)
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
