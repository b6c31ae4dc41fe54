pub mod auth;
pub mod ticket;
pub mod user;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jsonwebtoken::{DecodingKey, EncodingKey};
use time::OffsetDateTime;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{api, config, db};

pub use self::auth::{AuthClaims, AuthError, Me};

pub type SharedAppState = Arc<AppState>;

pub struct AppState {
    /// `None` when the database was unreachable at startup.
    db: Option<Arc<dyn db::Store>>,

    jwt_expiration_time: Duration,

    jwt_decoding_key: DecodingKey,

    jwt_encoding_key: EncodingKey,

    password_hash_cost: u32,

    /// Checked on logins with an unknown email, so they take as long as a
    /// wrong password.
    dummy_password_hash: db::user::PasswordHash,

    ticket_due_in: Duration,

    /// Logged out token ids, with their expiry as a unix timestamp.
    revoked_tokens: Mutex<HashMap<Uuid, i64>>,
}

impl AppState {
    pub fn new(
        db: Option<Arc<dyn db::Store>>,
        jwt: &config::Jwt,
        password: config::Password,
        tickets: config::Tickets,
    ) -> Result<Self, bcrypt::BcryptError> {
        let dummy_password_hash =
            db::user::PasswordHash::new("not a password", password.hash_cost)?;
        Ok(Self {
            db,
            jwt_expiration_time: jwt.expiration_time,
            jwt_decoding_key: DecodingKey::from_secret(jwt.secret.as_bytes()),
            jwt_encoding_key: EncodingKey::from_secret(jwt.secret.as_bytes()),
            password_hash_cost: password.hash_cost,
            dummy_password_hash,
            ticket_due_in: tickets.due_in,
            revoked_tokens: Mutex::default(),
        })
    }

    fn revoke_token(&self, claims: &AuthClaims) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut revoked = self
            .revoked_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        revoked.retain(|_, exp| *exp >= now);
        revoked.insert(claims.jti, claims.exp);
    }

    fn is_token_revoked(&self, jti: Uuid) -> bool {
        self.revoked_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&jti)
    }
}

/// Every route, served both at the root and under `/api`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes())
        .nest("/api", routes())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

fn routes() -> Router<SharedAppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout).post(auth::logout))
        .route("/user", get(user::get_user))
        .route("/profile", get(user::get_user))
        .route("/profile/:user_id", get(user::get_profile))
        .route("/", get(ticket::list_my_tickets))
        .route("/tickets/my", get(ticket::list_my_tickets))
        .route("/all_tickets", get(ticket::list_all_tickets))
        .route("/tickets/all", get(ticket::list_all_tickets))
        .route("/create", post(ticket::create_ticket))
        .route("/tickets", post(ticket::create_ticket))
        .route("/tickets/summary-counts", get(ticket::summary_counts))
        .route("/tickets/status-summary", get(ticket::status_summary))
        .route(
            "/ticket/:id",
            get(ticket::get_ticket)
                .patch(ticket::update_ticket)
                .delete(ticket::delete_ticket),
        )
        .route("/ticket/:id/update", post(ticket::update_ticket))
        .route("/ticket/:id/add_comment", post(ticket::add_comment))
        .route("/ticket/:id/delete", post(ticket::delete_ticket))
}

/// Storage handle, rejecting the request when the database is unreachable.
pub struct Db(pub Arc<dyn db::Store>);

#[async_trait]
impl FromRequestParts<SharedAppState> for Db {
    type Rejection = DbUnavailable;

    async fn from_request_parts(
        _: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        state.db.clone().map(Db).ok_or(DbUnavailable)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DbUnavailable;

impl IntoResponse for DbUnavailable {
    fn into_response(self) -> Response {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Database connection not established.",
        )
    }
}

/// Emails are matched case-insensitively.
pub(crate) fn normalize_email(email: String) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn error_response(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(api::Error {
            error: error.to_owned(),
        }),
    )
        .into_response()
}

/// Response for a failed storage call.
pub(crate) fn db_error_response(e: &db::Error) -> Response {
    tracing::error!(error = %e, "database request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Database request failed.")
}
