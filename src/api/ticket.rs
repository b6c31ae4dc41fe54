use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db;

pub use crate::db::ticket::{Comment, DisplayId, Id, Priority, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Ticket {
    pub id: Id,
    pub display_id: DisplayId,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub reporter: String,
    pub creator_uid: crate::api::user::Id,
    pub creator_email: String,
    pub assigned_to_email: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub overdue: bool,
    pub comments: Vec<Comment>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    pub time_spent_minutes: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Ticket {
    /// Wire form of `ticket`, with overdue status evaluated at `now`.
    pub fn new(ticket: db::Ticket, now: OffsetDateTime) -> Self {
        Self {
            overdue: ticket.is_overdue(now),
            id: ticket.id,
            display_id: ticket.number,
            title: ticket.title,
            description: ticket.description,
            status: ticket.status,
            priority: ticket.priority,
            reporter: ticket.reporter,
            creator_uid: ticket.creator,
            creator_email: ticket.creator_email,
            assigned_to_email: ticket.assigned_to_email,
            due_date: ticket.due_date,
            comments: ticket.comments,
            resolved_at: ticket.resolved_at,
            time_spent_minutes: ticket.time_spent_minutes,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct List {
    pub tickets: Vec<Ticket>,
    pub total_count: usize,
}

/// Per-category ticket totals for the dashboard filters.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Counts {
    pub total_tickets: usize,
    pub open_tickets: usize,
    pub in_progress_tickets: usize,
    pub closed_tickets: usize,
    pub resolved_tickets: usize,
    pub assigned_to_me: usize,
    pub assigned_to_others: usize,
    pub unassigned: usize,
    pub overdue: usize,
}

impl Counts {
    /// Tallies `tickets` as seen by the user with email `me`.
    pub fn tally<'a>(
        tickets: impl IntoIterator<Item = &'a db::Ticket>,
        me: &str,
        now: OffsetDateTime,
    ) -> Self {
        let mut counts = Self::default();
        for ticket in tickets {
            counts.total_tickets += 1;
            match ticket.status {
                Status::Open => counts.open_tickets += 1,
                Status::InProgress => counts.in_progress_tickets += 1,
                Status::Closed => counts.closed_tickets += 1,
                Status::Resolved => counts.resolved_tickets += 1,
            }
            match ticket.assigned_to_email.as_deref() {
                None => counts.unassigned += 1,
                Some(email) if email == me => counts.assigned_to_me += 1,
                Some(_) => counts.assigned_to_others += 1,
            }
            if ticket.is_overdue(now) {
                counts.overdue += 1;
            }
        }
        counts
    }
}

/// Number of tickets in each status, every status present.
pub type StatusSummary = BTreeMap<Status, usize>;

pub fn status_summary<'a>(
    tickets: impl IntoIterator<Item = &'a db::Ticket>,
) -> StatusSummary {
    let mut summary =
        Status::ALL.into_iter().map(|s| (s, 0)).collect::<StatusSummary>();
    for ticket in tickets {
        *summary.entry(ticket.status).or_default() += 1;
    }
    summary
}
