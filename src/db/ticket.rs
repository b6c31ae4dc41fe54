use std::{error::Error as StdError, fmt, str::FromStr};

use derive_more::Display;
use enum_utils::TryFromRepr;
use itertools::Itertools as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{Duration, OffsetDateTime};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, Json,
        ToSql, Type,
    },
    Row,
};
use uuid::Uuid;

use super::{user, Error, Postgres};

#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Id,
    pub number: DisplayId,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub reporter: String,
    pub creator: user::Id,
    pub creator_email: String,
    pub assigned_to_email: Option<String>,
    pub due_date: Option<OffsetDateTime>,
    pub comments: Vec<Comment>,
    pub resolved_at: Option<OffsetDateTime>,
    pub time_spent_minutes: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Ticket {
    /// Due date has passed and nobody closed or resolved the ticket yet.
    pub fn is_overdue(&self, now: OffsetDateTime) -> bool {
        !self.status.is_finished()
            && self.due_date.is_some_and(|due| due < now)
    }

    /// Moves the ticket to `status`, keeping the resolution bookkeeping in
    /// step with it.
    pub fn set_status(&mut self, status: Status, now: OffsetDateTime) {
        if status == self.status {
            return;
        }
        if status.is_finished() {
            self.resolved_at = Some(now);
            self.time_spent_minutes =
                Some(whole_minutes(now - self.created_at));
        } else if self.status.is_finished() {
            self.resolved_at = None;
            self.time_spent_minutes = None;
        }
        self.status = status;
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Id(Uuid::new_v4())
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

/// Sequential, human-readable ticket number, shown as `IT000042`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DisplayId(u64);

impl DisplayId {
    pub const PREFIX: &'static str = "IT";

    pub fn number(self) -> u64 {
        self.0
    }
}

impl From<u64> for DisplayId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:06}", Self::PREFIX, self.0)
    }
}

/// Accepts `IT000042`, `it42` and a bare `42`.
impl FromStr for DisplayId {
    type Err = InvalidDisplayId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = match s.get(..Self::PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(Self::PREFIX) => {
                &s[Self::PREFIX.len()..]
            }
            _ => s,
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidDisplayId);
        }
        digits.parse().map(Self).map_err(|_| InvalidDisplayId)
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error)]
#[error("invalid display id")]
pub struct InvalidDisplayId;

impl Serialize for DisplayId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DisplayId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        String::deserialize(d)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq,
    PartialOrd, Serialize, TryFromRepr,
)]
#[repr(u8)]
pub enum Status {
    /// Just reported, nobody has started on it.
    #[default]
    Open = 1,

    /// Support is working on it.
    #[serde(rename = "In Progress", alias = "InProgress")]
    InProgress = 2,

    /// Closed without necessarily being fixed.
    Closed = 3,

    /// Fixed.
    Resolved = 4,
}

impl Status {
    pub const ALL: [Self; 4] =
        [Self::Open, Self::InProgress, Self::Closed, Self::Resolved];

    /// Closed and resolved tickets are out of the work queue.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Closed | Self::Resolved)
    }
}

impl FromStr for Status {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "In Progress" | "InProgress" => Ok(Self::InProgress),
            "Closed" => Ok(Self::Closed),
            "Resolved" => Ok(Self::Resolved),
            _ => Err(()),
        }
    }
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
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

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
    TryFromRepr,
)]
#[repr(u8)]
pub enum Priority {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl FromSql<'_> for Priority {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let priority = Self::try_from(repr).map_err(|_| "invalid priority")?;
        Ok(priority)
    }
}

impl ToSql for Priority {
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

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Comment {
    pub text: String,
    pub commenter: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Which tickets a listing should return.
///
/// Every field narrows the selection, `None` leaves that dimension open.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub creator: Option<user::Id>,
    pub number: Option<DisplayId>,
    pub status: Option<Status>,
    pub assignment: Option<Assignment>,
    /// Keep only tickets overdue at this instant.
    pub overdue_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Assignment {
    AssignedTo(String),
    AssignedToOthersThan(String),
    Unassigned,
}

impl Filter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if self.creator.is_some_and(|id| id != ticket.creator) {
            return false;
        }
        if self.number.is_some_and(|n| n != ticket.number) {
            return false;
        }
        if self.status.is_some_and(|s| s != ticket.status) {
            return false;
        }
        let assignee = ticket.assigned_to_email.as_deref();
        match &self.assignment {
            Some(Assignment::AssignedTo(email))
                if assignee != Some(email.as_str()) =>
            {
                return false
            }
            Some(Assignment::AssignedToOthersThan(email))
                if assignee.is_none() || assignee == Some(email.as_str()) =>
            {
                return false
            }
            Some(Assignment::Unassigned) if assignee.is_some() => {
                return false
            }
            _ => {}
        }
        if let Some(now) = self.overdue_at {
            if !ticket.is_overdue(now) {
                return false;
            }
        }
        true
    }

    /// Renders the filter as an SQL `WHERE` clause (empty when nothing is
    /// filtered) together with its positional parameters.
    fn to_sql(&self) -> (String, Vec<Box<dyn ToSql + Sync + Send>>) {
        let mut conditions = Vec::new();
        let mut params = Vec::<Box<dyn ToSql + Sync + Send>>::new();
        let mut bind = |param: Box<dyn ToSql + Sync + Send>| {
            params.push(param);
            format!("${}", params.len())
        };

        if let Some(creator) = self.creator {
            conditions.push(format!("creator_id = {}", bind(Box::new(creator))));
        }
        if let Some(number) = self.number {
            let number = i64::try_from(number.number()).unwrap_or(i64::MAX);
            conditions.push(format!("number = {}", bind(Box::new(number))));
        }
        if let Some(status) = self.status {
            conditions.push(format!("status = {}", bind(Box::new(status))));
        }
        match &self.assignment {
            Some(Assignment::AssignedTo(email)) => {
                let p = bind(Box::new(email.clone()));
                conditions.push(format!("assigned_to_email = {p}"));
            }
            Some(Assignment::AssignedToOthersThan(email)) => {
                let p = bind(Box::new(email.clone()));
                conditions.push(format!(
                    "assigned_to_email IS NOT NULL \
                     AND assigned_to_email <> {p}"
                ));
            }
            Some(Assignment::Unassigned) => {
                conditions.push("assigned_to_email IS NULL".to_owned());
            }
            None => {}
        }
        if let Some(now) = self.overdue_at {
            let p = bind(Box::new(now));
            conditions.push(format!(
                "due_date < {p} AND status NOT IN ({}, {})",
                Status::Closed as u8,
                Status::Resolved as u8,
            ));
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.iter().join(" AND "))
        };
        (clause, params)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Page {
    pub offset: usize,
    pub limit: Option<usize>,
}

const TICKET_COLUMNS: &str = "\
    id, number, title, description, status, priority, reporter, \
    creator_id, creator_email, assigned_to_email, due_date, comments, \
    resolved_at, time_spent_minutes, created_at, updated_at";

const TICKET_COUNTER: &str = "tickets";

fn ticket_from_row(row: &Row) -> Ticket {
    let number = row.get::<_, i64>("number");
    Ticket {
        id: row.get("id"),
        number: DisplayId(u64::try_from(number).unwrap_or_default()),
        title: row.get("title"),
        description: row.get("description"),
        status: row.get("status"),
        priority: row.get("priority"),
        reporter: row.get("reporter"),
        creator: row.get("creator_id"),
        creator_email: row.get("creator_email"),
        assigned_to_email: row.get("assigned_to_email"),
        due_date: row.get("due_date"),
        comments: row.get::<_, Json<Vec<Comment>>>("comments").0,
        resolved_at: row.get("resolved_at"),
        time_spent_minutes: row.get("time_spent_minutes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl Postgres {
    pub(super) async fn increment_counter(&self) -> Result<u64, Error> {
        // The row lock taken by the upsert serializes concurrent callers.
        const SQL: &str = "\
            INSERT INTO counters (name, count) VALUES ($1, 1) \
            ON CONFLICT (name) DO UPDATE SET count = counters.count + 1 \
            RETURNING count";
        let count = self
            .client
            .query_one(SQL, &[&TICKET_COUNTER])
            .await?
            .get::<_, i64>(0);
        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub(super) async fn select_ticket_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Ticket>, Error> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
        Ok(self
            .client
            .query_opt(sql.as_str(), &[&id])
            .await?
            .map(|row| ticket_from_row(&row)))
    }

    pub(super) async fn insert_ticket_row(
        &self,
        ticket: &Ticket,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO tickets (\
                id, number, title, description, status, priority, reporter, \
                creator_id, creator_email, assigned_to_email, due_date, \
                comments, resolved_at, time_spent_minutes, \
                created_at, updated_at\
            ) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
                    $13, $14, $15, $16)";

        let number = i64::try_from(ticket.number.number()).unwrap_or(i64::MAX);
        self.client
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &number,
                    &ticket.title,
                    &ticket.description,
                    &ticket.status,
                    &ticket.priority,
                    &ticket.reporter,
                    &ticket.creator,
                    &ticket.creator_email,
                    &ticket.assigned_to_email,
                    &ticket.due_date,
                    &Json(&ticket.comments),
                    &ticket.resolved_at,
                    &ticket.time_spent_minutes,
                    &ticket.created_at,
                    &ticket.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    pub(super) async fn update_ticket_row(
        &self,
        ticket: &Ticket,
    ) -> Result<bool, Error> {
        // Comments are only ever appended through `push_comment`.
        const SQL: &str = "\
            UPDATE tickets SET \
                title = $2, \
                description = $3, \
                status = $4, \
                priority = $5, \
                reporter = $6, \
                assigned_to_email = $7, \
                due_date = $8, \
                resolved_at = $9, \
                time_spent_minutes = $10, \
                updated_at = $11 \
            WHERE id = $1";

        let updated = self
            .client
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.title,
                    &ticket.description,
                    &ticket.status,
                    &ticket.priority,
                    &ticket.reporter,
                    &ticket.assigned_to_email,
                    &ticket.due_date,
                    &ticket.resolved_at,
                    &ticket.time_spent_minutes,
                    &ticket.updated_at,
                ],
            )
            .await?;
        Ok(updated > 0)
    }

    pub(super) async fn select_tickets(
        &self,
        filter: &Filter,
        page: Page,
    ) -> Result<Vec<Ticket>, Error> {
        let (clause, mut params) = filter.to_sql();
        params.push(Box::new(i64::try_from(page.offset).unwrap_or(i64::MAX)));
        let offset = params.len();
        params.push(Box::new(
            page.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)),
        ));
        let limit = params.len();

        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets {clause} \
             ORDER BY created_at DESC, number DESC \
             OFFSET ${offset} LIMIT ${limit}"
        );
        let params = params
            .iter()
            .map(|p| &**p as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        Ok(self
            .client
            .query(sql.as_str(), &params)
            .await?
            .iter()
            .map(ticket_from_row)
            .collect())
    }

    pub(super) async fn count_tickets_where(
        &self,
        filter: &Filter,
    ) -> Result<usize, Error> {
        let (clause, params) = filter.to_sql();
        let sql = format!("SELECT COUNT(*) FROM tickets {clause}");
        let params = params
            .iter()
            .map(|p| &**p as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        let count = self.client.query_one(sql.as_str(), &params).await?.get::<_, i64>(0);
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub(super) async fn push_comment(
        &self,
        id: Id,
        comment: &Comment,
    ) -> Result<bool, Error> {
        const SQL: &str = "\
            UPDATE tickets \
            SET comments = comments || $2::JSONB, updated_at = $3 \
            WHERE id = $1";
        let appended = self
            .client
            .execute(
                SQL,
                &[&id, &Json([comment]), &comment.timestamp],
            )
            .await?;
        Ok(appended > 0)
    }

    pub(super) async fn remove_ticket(&self, id: Id) -> Result<bool, Error> {
        const SQL: &str = "DELETE FROM tickets WHERE id = $1";
        Ok(self.client.execute(SQL, &[&id]).await? > 0)
    }
}

/// Rounds a duration to whole minutes, as stored in `time_spent_minutes`.
pub fn whole_minutes(duration: Duration) -> i64 {
    (duration.as_seconds_f64() / 60.0).round() as i64
}
