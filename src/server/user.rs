use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use derive_more::From;

use crate::{api, db};

use super::{db_error_response, error_response, Db, Me};

pub async fn get_user(Me(my): Me) -> Json<api::User> {
    Json(api::User::from(&my))
}

pub async fn get_profile(
    Db(db): Db,
    Me(my): Me,
    Path(user_id): Path<String>,
) -> Result<Json<api::User>, GetProfileError> {
    use GetProfileError as E;

    let user_id = user_id
        .parse::<api::user::Id>()
        .map_err(|_| E::UserNotFound)?;
    if user_id != my.id && my.role != api::user::Role::Support {
        tracing::warn!(
            user_id = %my.id,
            profile = %user_id,
            "profile access denied"
        );
        return Err(E::AccessDenied);
    }

    let user = db.get_user_by_id(user_id).await?.ok_or(E::UserNotFound)?;

    Ok(Json(api::User::from(&user)))
}

#[derive(Debug, From)]
pub enum GetProfileError {
    #[from]
    DbError(db::Error),
    AccessDenied,
    UserNotFound,
}

impl IntoResponse for GetProfileError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::DbError(e) => return db_error_response(&e),
            Self::AccessDenied => (
                StatusCode::FORBIDDEN,
                "You are not authorized to view this profile.",
            ),
            Self::UserNotFound => (StatusCode::NOT_FOUND, "User not found."),
        };
        error_response(status, error)
    }
}
