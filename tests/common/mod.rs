use std::{collections::BTreeMap, sync::Arc, time::Duration};

use it_ticketing::{
    api, config,
    db::{self, Store},
    server::{self, AppState},
};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const PASSWORD: &str = "password";

/// Starts the service on an ephemeral port backed by a fresh in-memory
/// store, returning its base URL.
pub async fn spawn_app() -> String {
    spawn_app_with(Some(Arc::new(db::Memory::default()))).await
}

pub async fn spawn_app_with(db: Option<Arc<dyn Store>>) -> String {
    let state = AppState::new(
        db,
        &config::Jwt {
            secret: "test-secret".into(),
            expiration_time: Duration::from_secs(3600),
        },
        config::Password { hash_cost: 4 },
        config::Tickets::default(),
    )
    .expect("failed to build app state");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind a listener");
    let addr = listener.local_addr().expect("failed to get local address");
    tokio::spawn(async move {
        axum::serve(listener, server::router(state))
            .await
            .expect("server failed");
    });
    format!("http://{addr}")
}

pub struct Client {
    inner: reqwest::Client,
    base_url: String,
    pub auth_token: Option<String>,
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.to_owned(),
            auth_token: None,
        }
    }

    /// Registers `email` with `role` and logs in as them.
    pub async fn signed_up(base_url: &str, email: &str, role: &str) -> Self {
        let client = Self::new(base_url);
        client
            .register(email, PASSWORD, Some(role))
            .await
            .expect("failed to register");
        client.auth(email, PASSWORD).await
    }

    pub async fn auth(mut self, email: &str, password: &str) -> Self {
        let session = self
            .login(email, password)
            .await
            .expect("failed to log in");
        self.auth_token = Some(session.token);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut req: RequestBuilder,
    ) -> Result<T, StatusCode> {
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<T>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<api::user::Registered, StatusCode> {
        let req = self.inner.post(self.url("/register")).json(&json!({
            "email": email,
            "password": password,
            "role": role,
        }));
        self.send(req).await
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<api::user::Session, StatusCode> {
        let req = self.inner.post(self.url("/login")).json(&json!({
            "email": email,
            "password": password,
        }));
        self.send(req).await
    }

    pub async fn logout(&self) -> Result<api::Message, StatusCode> {
        self.send(self.inner.post(self.url("/logout"))).await
    }

    pub async fn user(&self) -> Result<api::User, StatusCode> {
        self.send(self.inner.get(self.url("/user"))).await
    }

    pub async fn profile(
        &self,
        id: &str,
    ) -> Result<api::User, StatusCode> {
        self.send(self.inner.get(self.url(&format!("/api/profile/{id}"))))
            .await
    }

    pub async fn my_tickets(
        &self,
        query: &str,
    ) -> Result<api::ticket::List, StatusCode> {
        self.send(self.inner.get(self.url(&format!("/tickets/my?{query}"))))
            .await
    }

    pub async fn all_tickets(
        &self,
        query: &str,
    ) -> Result<api::ticket::List, StatusCode> {
        self.send(self.inner.get(self.url(&format!("/tickets/all?{query}"))))
            .await
    }

    pub async fn create_ticket(
        &self,
        body: Value,
    ) -> Result<api::Ticket, StatusCode> {
        self.send(self.inner.post(self.url("/tickets")).json(&body))
            .await
    }

    pub async fn add_ticket(
        &self,
        title: &str,
    ) -> Result<api::Ticket, StatusCode> {
        self.create_ticket(json!({
            "title": title,
            "description": format!("Description of {title}"),
            "reporter": "Front desk",
        }))
        .await
    }

    pub async fn get_ticket(
        &self,
        id: &str,
    ) -> Result<api::Ticket, StatusCode> {
        self.send(self.inner.get(self.url(&format!("/ticket/{id}"))))
            .await
    }

    pub async fn update_ticket(
        &self,
        id: &str,
        body: Value,
    ) -> Result<api::Ticket, StatusCode> {
        let req = self
            .inner
            .patch(self.url(&format!("/ticket/{id}")))
            .json(&body);
        self.send(req).await
    }

    pub async fn add_comment(
        &self,
        id: &str,
        text: &str,
    ) -> Result<api::Ticket, StatusCode> {
        let req = self
            .inner
            .post(self.url(&format!("/ticket/{id}/add_comment")))
            .json(&json!({ "comment_text": text }));
        self.send(req).await
    }

    pub async fn delete_ticket(
        &self,
        id: &str,
    ) -> Result<api::Message, StatusCode> {
        self.send(self.inner.delete(self.url(&format!("/ticket/{id}"))))
            .await
    }

    pub async fn summary_counts(
        &self,
    ) -> Result<api::ticket::Counts, StatusCode> {
        self.send(self.inner.get(self.url("/tickets/summary-counts")))
            .await
    }

    pub async fn status_summary(
        &self,
    ) -> Result<BTreeMap<String, usize>, StatusCode> {
        self.send(self.inner.get(self.url("/tickets/status-summary")))
            .await
    }
}
