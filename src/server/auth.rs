use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{request, StatusCode},
    response::{IntoResponse, Response},
    Json, RequestPartsExt as _,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use derive_more::From;
use jsonwebtoken::{decode, encode, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task;
use uuid::Uuid;

use crate::{api, db};

use super::{
    db_error_response, error_response, normalize_email, Db, DbUnavailable,
    SharedAppState,
};

#[derive(Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: Option<String>,
}

pub async fn register(
    State(state): State<SharedAppState>,
    Db(db): Db,
    input: Result<Json<RegisterInput>, JsonRejection>,
) -> Result<(StatusCode, Json<api::user::Registered>), RegisterError> {
    use RegisterError as E;

    let Json(RegisterInput {
        email,
        password,
        role,
    }) = input?;

    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(E::MissingCredentials);
    }
    let role = match role.as_deref().map(str::trim) {
        None | Some("") | Some("user") => api::user::Role::User,
        Some("support") => api::user::Role::Support,
        Some(_) => return Err(E::InvalidRole),
    };

    let cost = state.password_hash_cost;
    let password_hash =
        task::spawn_blocking(move || db::user::PasswordHash::new(&password, cost))
            .await
            .map_err(|_| E::PasswordHashing)?
            .map_err(|_| E::PasswordHashing)?;

    let user = db::User {
        id: db::user::Id::new(),
        email,
        password_hash,
        role,
        created_at: OffsetDateTime::now_utc(),
    };
    db.create_user(&user).await?;
    tracing::info!(user_id = %user.id, role = ?user.role, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(api::user::Registered {
            message: format!("User {} registered successfully!", user.email),
            user_id: user.id,
        }),
    ))
}

#[derive(Debug, From)]
pub enum RegisterError {
    #[from]
    DbError(db::Error),
    #[from]
    DbUnavailable(DbUnavailable),
    #[from]
    InvalidBody(JsonRejection),
    InvalidRole,
    MissingCredentials,
    PasswordHashing,
}

impl IntoResponse for RegisterError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::DbError(db::Error::EmailTaken) => (
                StatusCode::CONFLICT,
                "Email already registered. Please login or use a different \
                 email.",
            ),
            Self::DbError(e) => return db_error_response(&e),
            Self::DbUnavailable(e) => return e.into_response(),
            Self::InvalidBody(e) => {
                return error_response(StatusCode::BAD_REQUEST, &e.body_text())
            }
            Self::InvalidRole => {
                (StatusCode::BAD_REQUEST, "Invalid role specified.")
            }
            Self::MissingCredentials => {
                (StatusCode::BAD_REQUEST, "Email and password are required!")
            }
            Self::PasswordHashing => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password.")
            }
        };
        error_response(status, error)
    }
}

#[derive(Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub async fn login(
    State(state): State<SharedAppState>,
    Db(db): Db,
    input: Result<Json<LoginInput>, JsonRejection>,
) -> Result<Json<api::user::Session>, AuthError> {
    use AuthError as E;

    let Json(LoginInput { email, password }) = input?;
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(E::MissingCredentials);
    }

    let user = db.get_user_by_email(&email).await?;
    // Unknown emails still pay for a bcrypt check.
    let password_hash = user.as_ref().map_or_else(
        || state.dummy_password_hash.clone(),
        |u| u.password_hash.clone(),
    );
    let verified =
        task::spawn_blocking(move || password_hash.verify(&password))
            .await
            .unwrap_or(false);
    let user = user
        .filter(|_| verified)
        .ok_or(E::WrongEmailOrPassword)?;

    let expires_at = OffsetDateTime::now_utc() + state.jwt_expiration_time;
    let token = encode(
        &Header::default(),
        &AuthClaims {
            user_id: user.id,
            jti: Uuid::new_v4(),
            exp: expires_at.unix_timestamp(),
        },
        &state.jwt_encoding_key,
    )
    .map_err(|_| E::TokenEncoding)?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(api::user::Session {
        token,
        user: api::User::from(&user),
    }))
}

pub async fn logout(
    State(state): State<SharedAppState>,
    claims: AuthClaims,
) -> Json<api::Message> {
    state.revoke_token(&claims);
    tracing::info!(user_id = %claims.user_id, "user logged out");

    Json(api::Message {
        message: "You have been logged out.".to_owned(),
    })
}

#[derive(Debug, From)]
pub enum AuthError {
    #[from]
    DbError(db::Error),
    #[from]
    DbUnavailable(DbUnavailable),
    #[from]
    InvalidBody(JsonRejection),
    InvalidToken,
    MissingCredentials,
    TokenEncoding,
    WrongEmailOrPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::DbError(e) => return db_error_response(&e),
            Self::DbUnavailable(e) => return e.into_response(),
            Self::InvalidBody(e) => {
                return error_response(StatusCode::BAD_REQUEST, &e.body_text())
            }
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired authentication token. Please log in \
                 again.",
            ),
            Self::MissingCredentials => {
                (StatusCode::BAD_REQUEST, "Email and password are required!")
            }
            Self::TokenEncoding => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue a token.")
            }
            Self::WrongEmailOrPassword => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password.")
            }
        };
        error_response(status, error)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    pub user_id: api::user::Id,
    /// Token id, used to revoke the token on logout.
    pub jti: Uuid,
    pub exp: i64,
}

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;
        if state.is_token_revoked(token_data.claims.jti) {
            return Err(AuthError::InvalidToken);
        }

        Ok(token_data.claims)
    }
}

/// The authenticated user, loaded from storage.
pub struct Me(pub db::User);

#[async_trait]
impl FromRequestParts<SharedAppState> for Me {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let Db(db) = Db::from_request_parts(parts, state).await?;
        let claims = AuthClaims::from_request_parts(parts, state).await?;
        let user = db
            .get_user_by_id(claims.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        Ok(Me(user))
    }
}
