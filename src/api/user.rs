use serde::{Deserialize, Serialize};

use crate::db;

pub use crate::db::user::{Id, Role};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub role: Role,
}

impl From<&db::User> for User {
    fn from(user: &db::User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Issued on login.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Registered {
    pub message: String,
    pub user_id: Id,
}
