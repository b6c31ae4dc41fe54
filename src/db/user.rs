use std::{error::Error as StdError, str::FromStr};

use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{
    error::SqlState,
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Row,
};
use uuid::Uuid;

use super::{Error, Postgres};

#[derive(Clone, Debug)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub password_hash: PasswordHash,
    pub role: Role,
    pub created_at: OffsetDateTime,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<u128> for Id {
    fn from(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl FromSql<'_> for Id {
    accepts!(UUID);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Uuid::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(UUID);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, TryFromRepr, PartialEq,
    Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sees and edits only the tickets they opened.
    #[default]
    User = 1,

    /// Support associate, works on every ticket.
    Support = 2,
}

impl FromSql<'_> for Role {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let role = Self::try_from(repr).map_err(|_| "invalid role")?;
        Ok(role)
    }
}

impl ToSql for Role {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

/// bcrypt hash of a user's password.
#[derive(Clone, Debug, PartialEq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hashes `secret` with the given bcrypt `cost`.
    ///
    /// CPU-bound, so call it off the async executor.
    pub fn new(secret: &str, cost: u32) -> Result<Self, bcrypt::BcryptError> {
        bcrypt::hash(secret, cost).map(Self)
    }

    pub fn verify(&self, secret: &str) -> bool {
        bcrypt::verify(secret, &self.0).unwrap_or(false)
    }
}

impl FromSql<'_> for PasswordHash {
    accepts!(TEXT);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        String::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for PasswordHash {
    accepts!(TEXT);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        created_at: row.get("created_at"),
    }
}

impl Postgres {
    pub(super) async fn insert_user(&self, user: &User) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO users (id, email, password_hash, role, created_at) \
            VALUES ($1, $2, $3, $4, $5)";
        self.client
            .execute(
                SQL,
                &[
                    &user.id,
                    &user.email,
                    &user.password_hash,
                    &user.role,
                    &user.created_at,
                ],
            )
            .await
            .map_err(|e| match e.code() {
                Some(code) if *code == SqlState::UNIQUE_VIOLATION => {
                    Error::EmailTaken
                }
                _ => Error::Postgres(e),
            })?;
        Ok(())
    }

    pub(super) async fn select_user_by_id(
        &self,
        id: Id,
    ) -> Result<Option<User>, Error> {
        const SQL: &str = "SELECT id, email, password_hash, role, created_at \
                           FROM users \
                           WHERE id = $1 \
                           LIMIT 1";
        Ok(self
            .client
            .query_opt(SQL, &[&id])
            .await?
            .map(|row| user_from_row(&row)))
    }

    pub(super) async fn select_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, Error> {
        const SQL: &str = "SELECT id, email, password_hash, role, created_at \
                           FROM users \
                           WHERE email = $1 \
                           LIMIT 1";
        Ok(self
            .client
            .query_opt(SQL, &[&email])
            .await?
            .map(|row| user_from_row(&row)))
    }
}
