use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use derive_more::From;
use serde::{Deserialize, Deserializer};
use time::{
    format_description::well_known::Rfc3339, macros::format_description,
    Date, OffsetDateTime,
};

use crate::{
    api,
    db::{
        self,
        ticket::{Assignment, DisplayId, Filter, Page, Priority, Status},
        user::Role,
        Store,
    },
};

use super::{
    db_error_response, error_response, normalize_email, Db, Me,
    SharedAppState,
};

#[derive(Deserialize)]
pub struct ListTicketsInput {
    #[serde(default)]
    status: String,
    #[serde(default)]
    assignment: String,
    #[serde(default)]
    due: String,
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    offset: String,
    #[serde(default)]
    limit: String,
}

pub async fn list_my_tickets(
    Db(db): Db,
    Me(my): Me,
    input: Result<Query<ListTicketsInput>, QueryRejection>,
) -> Result<Json<api::ticket::List>, ListTicketsError> {
    let Query(input) = input?;
    let scope = Filter {
        creator: Some(my.id),
        ..Filter::default()
    };
    list_tickets(&*db, &my, scope, input).await.map(Json)
}

pub async fn list_all_tickets(
    Db(db): Db,
    Me(my): Me,
    input: Result<Query<ListTicketsInput>, QueryRejection>,
) -> Result<Json<api::ticket::List>, ListTicketsError> {
    let Query(input) = input?;
    if my.role != Role::Support {
        tracing::warn!(user_id = %my.id, "listing all tickets denied");
        return Err(ListTicketsError::AccessDenied);
    }
    list_tickets(&*db, &my, Filter::default(), input).await.map(Json)
}

async fn list_tickets(
    db: &dyn Store,
    my: &db::User,
    scope: Filter,
    input: ListTicketsInput,
) -> Result<api::ticket::List, ListTicketsError> {
    use ListTicketsError as E;

    let now = OffsetDateTime::now_utc();

    // A ticket number in the search box wins over every other filter.
    if let Ok(number) = input.keyword.parse::<DisplayId>() {
        let by_number = Filter {
            number: Some(number),
            ..scope.clone()
        };
        let found = db.find_tickets(&by_number, Page::default()).await?;
        if !found.is_empty() {
            return Ok(api::ticket::List {
                total_count: found.len(),
                tickets: found
                    .into_iter()
                    .map(|t| api::Ticket::new(t, now))
                    .collect(),
            });
        }
    }

    let status = match input.status.trim() {
        "" => None,
        s => Some(s.parse::<Status>().map_err(|()| E::InvalidStatus)?),
    };
    let assignment = match input.assignment.trim() {
        "" => None,
        "assigned_to_me" => Some(Assignment::AssignedTo(my.email.clone())),
        "assigned_to_others" => {
            Some(Assignment::AssignedToOthersThan(my.email.clone()))
        }
        "unassigned" => Some(Assignment::Unassigned),
        _ => return Err(E::InvalidAssignment),
    };
    let overdue_at = match input.due.trim() {
        "" => None,
        "overdue" => Some(now),
        _ => return Err(E::InvalidDue),
    };
    let filter = Filter {
        status,
        assignment,
        overdue_at,
        ..scope
    };
    let page = Page {
        offset: parse_count(&input.offset)
            .map_err(|_| E::InvalidPage)?
            .unwrap_or_default(),
        limit: parse_count(&input.limit).map_err(|_| E::InvalidPage)?,
    };

    let page_fut = db.find_tickets(&filter, page);
    let total_count_fut = db.count_tickets(&filter);
    let (page, total_count) = tokio::try_join!(page_fut, total_count_fut)?;

    Ok(api::ticket::List {
        tickets: page.into_iter().map(|t| api::Ticket::new(t, now)).collect(),
        total_count,
    })
}

#[derive(Debug, From)]
pub enum ListTicketsError {
    #[from]
    DbError(db::Error),
    #[from]
    InvalidQuery(QueryRejection),
    AccessDenied,
    InvalidAssignment,
    InvalidDue,
    InvalidPage,
    InvalidStatus,
}

impl IntoResponse for ListTicketsError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::DbError(e) => return db_error_response(&e),
            Self::InvalidQuery(e) => {
                return error_response(StatusCode::BAD_REQUEST, &e.body_text())
            }
            Self::AccessDenied => (
                StatusCode::FORBIDDEN,
                "Only support associates can view all tickets.",
            ),
            Self::InvalidAssignment => {
                (StatusCode::BAD_REQUEST, "Invalid assignment filter.")
            }
            Self::InvalidDue => (StatusCode::BAD_REQUEST, "Invalid due filter."),
            Self::InvalidPage => (
                StatusCode::BAD_REQUEST,
                "Offset and limit must be non-negative integers.",
            ),
            Self::InvalidStatus => {
                (StatusCode::BAD_REQUEST, "Invalid status filter.")
            }
        };
        error_response(status, error)
    }
}

#[derive(Deserialize)]
pub struct CreateTicketInput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reporter: String,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    status: Status,
    #[serde(default)]
    assigned_to_email: Option<String>,
}

pub async fn create_ticket(
    State(state): State<SharedAppState>,
    Db(db): Db,
    Me(my): Me,
    input: Result<Json<CreateTicketInput>, JsonRejection>,
) -> Result<(StatusCode, Json<api::Ticket>), CreateTicketError> {
    use CreateTicketError as E;

    let Json(CreateTicketInput {
        title,
        description,
        reporter,
        priority,
        status,
        assigned_to_email,
    }) = input?;

    let (title, description, reporter) =
        (title.trim(), description.trim(), reporter.trim());
    if title.is_empty() || description.is_empty() || reporter.is_empty() {
        return Err(E::MissingFields);
    }

    let assigned_to_email = non_empty(assigned_to_email).map(normalize_email);
    if let Some(email) = &assigned_to_email {
        check_assignee(&*db, email).await?;
    }

    let number = db.next_ticket_number().await?;
    let now = OffsetDateTime::now_utc();
    let mut ticket = db::Ticket {
        id: db::ticket::Id::new(),
        number,
        title: title.to_owned(),
        description: description.to_owned(),
        status: Status::Open,
        priority,
        reporter: reporter.to_owned(),
        creator: my.id,
        creator_email: my.email.clone(),
        assigned_to_email,
        due_date: Some(now + state.ticket_due_in),
        comments: Vec::new(),
        resolved_at: None,
        time_spent_minutes: None,
        created_at: now,
        updated_at: now,
    };
    ticket.set_status(status, now);

    db.insert_ticket(&ticket).await?;
    tracing::info!(
        ticket = %ticket.number,
        creator = %my.id,
        "ticket created"
    );

    Ok((StatusCode::CREATED, Json(api::Ticket::new(ticket, now))))
}

#[derive(Debug, From)]
pub enum CreateTicketError {
    #[from]
    DbError(db::Error),
    #[from]
    InvalidAssignee(AssigneeError),
    #[from]
    InvalidBody(JsonRejection),
    MissingFields,
}

impl IntoResponse for CreateTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => db_error_response(&e),
            Self::InvalidAssignee(e) => e.into_response(),
            Self::InvalidBody(e) => {
                error_response(StatusCode::BAD_REQUEST, &e.body_text())
            }
            Self::MissingFields => error_response(
                StatusCode::BAD_REQUEST,
                "Title, Description, and Reporter are required!",
            ),
        }
    }
}

pub async fn get_ticket(
    Db(db): Db,
    Me(my): Me,
    Path(id): Path<String>,
) -> Result<Json<api::Ticket>, GetTicketError> {
    use GetTicketError as E;

    let ticket = find_ticket(&*db, &id).await?.ok_or(E::TicketNotFound)?;
    if !can_access(&my, &ticket) {
        tracing::warn!(
            user_id = %my.id,
            ticket = %ticket.number,
            "ticket access denied"
        );
        return Err(E::AccessDenied);
    }

    Ok(Json(api::Ticket::new(ticket, OffsetDateTime::now_utc())))
}

#[derive(Debug, From)]
pub enum GetTicketError {
    #[from]
    DbError(db::Error),
    AccessDenied,
    TicketNotFound,
}

impl IntoResponse for GetTicketError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::DbError(e) => return db_error_response(&e),
            Self::AccessDenied => (
                StatusCode::FORBIDDEN,
                "You are not authorized to view this ticket.",
            ),
            Self::TicketNotFound => (StatusCode::NOT_FOUND, "Ticket not found."),
        };
        error_response(status, error)
    }
}

#[derive(Deserialize)]
pub struct UpdateTicketInput {
    title: Option<String>,
    description: Option<String>,
    status: Option<Status>,
    priority: Option<Priority>,
    /// `null` or `""` unassigns.
    #[serde(default, deserialize_with = "present")]
    assigned_to_email: Option<Option<String>>,
    /// `null` or `""` clears the due date.
    #[serde(default, deserialize_with = "present")]
    due_date: Option<Option<String>>,
}

/// Tells an explicit `null` apart from a missing field.
fn present<'de, T, D>(d: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(d).map(Some)
}

pub async fn update_ticket(
    Db(db): Db,
    Me(my): Me,
    Path(id): Path<String>,
    input: Result<Json<UpdateTicketInput>, JsonRejection>,
) -> Result<Json<api::Ticket>, UpdateTicketError> {
    use UpdateTicketError as E;

    let Json(input) = input?;

    let mut ticket = find_ticket(&*db, &id).await?.ok_or(E::TicketNotFound)?;
    if !can_access(&my, &ticket) {
        tracing::warn!(
            user_id = %my.id,
            ticket = %ticket.number,
            "ticket update denied"
        );
        return Err(E::AccessDenied);
    }
    if my.role != Role::Support && ticket.status.is_finished() {
        return Err(E::TicketFinished);
    }

    if let Some(assignee) = input.assigned_to_email {
        match non_empty(assignee).map(normalize_email) {
            Some(email) => {
                if my.role != Role::Support {
                    return Err(E::AssignmentDenied);
                }
                check_assignee(&*db, &email).await?;
                ticket.assigned_to_email = Some(email);
            }
            None => ticket.assigned_to_email = None,
        }
    }
    if let Some(due_date) = input.due_date {
        ticket.due_date = match non_empty(due_date) {
            Some(s) => Some(parse_due_date(&s).ok_or(E::InvalidDueDate)?),
            None => None,
        };
    }
    if let Some(title) = non_empty(input.title) {
        ticket.title = title;
    }
    if let Some(description) = non_empty(input.description) {
        ticket.description = description;
    }
    if let Some(priority) = input.priority {
        ticket.priority = priority;
    }

    let now = OffsetDateTime::now_utc();
    if let Some(status) = input.status {
        if status != ticket.status {
            tracing::info!(
                ticket = %ticket.number,
                from = ?ticket.status,
                to = ?status,
                "ticket status changed"
            );
        }
        ticket.set_status(status, now);
    }
    ticket.updated_at = now;

    // The ticket may have been deleted since it was read.
    if !db.update_ticket(&ticket).await? {
        return Err(E::TicketNotFound);
    }

    Ok(Json(api::Ticket::new(ticket, now)))
}

#[derive(Debug, From)]
pub enum UpdateTicketError {
    #[from]
    DbError(db::Error),
    #[from]
    InvalidAssignee(AssigneeError),
    #[from]
    InvalidBody(JsonRejection),
    AccessDenied,
    AssignmentDenied,
    InvalidDueDate,
    TicketFinished,
    TicketNotFound,
}

impl IntoResponse for UpdateTicketError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::DbError(e) => return db_error_response(&e),
            Self::InvalidAssignee(e) => return e.into_response(),
            Self::InvalidBody(e) => {
                return error_response(StatusCode::BAD_REQUEST, &e.body_text())
            }
            Self::AccessDenied => (
                StatusCode::FORBIDDEN,
                "You are not authorized to update this ticket.",
            ),
            Self::AssignmentDenied => (
                StatusCode::FORBIDDEN,
                "Only support associates can assign tickets.",
            ),
            Self::InvalidDueDate => (
                StatusCode::BAD_REQUEST,
                "Invalid due date, expected YYYY-MM-DD.",
            ),
            Self::TicketFinished => (
                StatusCode::FORBIDDEN,
                "Closed or resolved tickets can not be updated.",
            ),
            Self::TicketNotFound => (StatusCode::NOT_FOUND, "Ticket not found."),
        };
        error_response(status, error)
    }
}

#[derive(Deserialize)]
pub struct AddCommentInput {
    #[serde(default)]
    comment_text: String,
}

pub async fn add_comment(
    Db(db): Db,
    Me(my): Me,
    Path(id): Path<String>,
    input: Result<Json<AddCommentInput>, JsonRejection>,
) -> Result<Json<api::Ticket>, AddCommentError> {
    use AddCommentError as E;

    let Json(AddCommentInput { comment_text }) = input?;
    let text = comment_text.trim();
    if text.is_empty() {
        return Err(E::EmptyComment);
    }

    let ticket = find_ticket(&*db, &id).await?.ok_or(E::TicketNotFound)?;
    if !can_access(&my, &ticket) {
        tracing::warn!(
            user_id = %my.id,
            ticket = %ticket.number,
            "comment denied"
        );
        return Err(E::AccessDenied);
    }
    if ticket.status.is_finished() {
        return Err(E::TicketFinished);
    }

    let now = OffsetDateTime::now_utc();
    let comment = db::Comment {
        text: text.to_owned(),
        commenter: my.email.clone(),
        timestamp: now,
    };
    if !db.append_comment(ticket.id, &comment).await? {
        return Err(E::TicketNotFound);
    }

    let ticket = db
        .get_ticket_by_id(ticket.id)
        .await?
        .ok_or(E::TicketNotFound)?;

    Ok(Json(api::Ticket::new(ticket, now)))
}

#[derive(Debug, From)]
pub enum AddCommentError {
    #[from]
    DbError(db::Error),
    #[from]
    InvalidBody(JsonRejection),
    AccessDenied,
    EmptyComment,
    TicketFinished,
    TicketNotFound,
}

impl IntoResponse for AddCommentError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::DbError(e) => return db_error_response(&e),
            Self::InvalidBody(e) => {
                return error_response(StatusCode::BAD_REQUEST, &e.body_text())
            }
            Self::AccessDenied => (
                StatusCode::FORBIDDEN,
                "You are not authorized to comment on this ticket.",
            ),
            Self::EmptyComment => {
                (StatusCode::BAD_REQUEST, "Comment text is required!")
            }
            Self::TicketFinished => (
                StatusCode::FORBIDDEN,
                "Closed or resolved tickets can not be commented on.",
            ),
            Self::TicketNotFound => (StatusCode::NOT_FOUND, "Ticket not found."),
        };
        error_response(status, error)
    }
}

pub async fn delete_ticket(
    Db(db): Db,
    Me(my): Me,
    Path(id): Path<String>,
) -> Result<Json<api::Message>, DeleteTicketError> {
    use DeleteTicketError as E;

    if my.role != Role::Support {
        tracing::warn!(
            user_id = %my.id,
            ticket = %id,
            "ticket deletion denied"
        );
        return Err(E::AccessDenied);
    }

    let ticket = find_ticket(&*db, &id).await?.ok_or(E::TicketNotFound)?;
    if !db.delete_ticket(ticket.id).await? {
        return Err(E::TicketNotFound);
    }
    tracing::info!(
        ticket = %ticket.number,
        user_id = %my.id,
        "ticket deleted"
    );

    Ok(Json(api::Message {
        message: format!("Ticket {} deleted successfully.", ticket.number),
    }))
}

#[derive(Debug, From)]
pub enum DeleteTicketError {
    #[from]
    DbError(db::Error),
    AccessDenied,
    TicketNotFound,
}

impl IntoResponse for DeleteTicketError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::DbError(e) => return db_error_response(&e),
            Self::AccessDenied => (
                StatusCode::FORBIDDEN,
                "Only support associates can delete tickets.",
            ),
            Self::TicketNotFound => (StatusCode::NOT_FOUND, "Ticket not found."),
        };
        error_response(status, error)
    }
}

pub async fn summary_counts(
    Db(db): Db,
    Me(my): Me,
) -> Result<Json<api::ticket::Counts>, SummaryError> {
    let tickets = db.find_tickets(&visible_to(&my), Page::default()).await?;

    Ok(Json(api::ticket::Counts::tally(
        &tickets,
        &my.email,
        OffsetDateTime::now_utc(),
    )))
}

pub async fn status_summary(
    Db(db): Db,
    Me(my): Me,
) -> Result<Json<api::ticket::StatusSummary>, SummaryError> {
    let tickets = db.find_tickets(&visible_to(&my), Page::default()).await?;

    Ok(Json(api::ticket::status_summary(&tickets)))
}

#[derive(Debug, From)]
pub enum SummaryError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for SummaryError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => db_error_response(&e),
        }
    }
}

#[derive(Debug, From)]
pub enum AssigneeError {
    #[from]
    DbError(db::Error),
    NotFound,
    NotSupport,
}

impl IntoResponse for AssigneeError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::DbError(e) => return db_error_response(&e),
            Self::NotFound => (StatusCode::NOT_FOUND, "Assignee not found."),
            Self::NotSupport => (
                StatusCode::BAD_REQUEST,
                "Tickets can only be assigned to support associates.",
            ),
        };
        error_response(status, error)
    }
}

/// Only registered support associates can be assigned a ticket.
async fn check_assignee(
    db: &dyn Store,
    email: &str,
) -> Result<(), AssigneeError> {
    let assignee = db
        .get_user_by_email(email)
        .await?
        .ok_or(AssigneeError::NotFound)?;
    if assignee.role != Role::Support {
        return Err(AssigneeError::NotSupport);
    }
    Ok(())
}

/// Looks a ticket up by its UUID or by its display id.
async fn find_ticket(
    db: &dyn Store,
    id: &str,
) -> Result<Option<db::Ticket>, db::Error> {
    if let Ok(id) = id.parse::<db::ticket::Id>() {
        return db.get_ticket_by_id(id).await;
    }
    let Ok(number) = id.parse::<DisplayId>() else {
        return Ok(None);
    };
    let filter = Filter {
        number: Some(number),
        ..Filter::default()
    };
    let page = Page {
        offset: 0,
        limit: Some(1),
    };
    Ok(db.find_tickets(&filter, page).await?.into_iter().next())
}

fn can_access(my: &db::User, ticket: &db::Ticket) -> bool {
    my.role == Role::Support || ticket.creator == my.id
}

/// Tickets the user may see: their own, or every ticket for support.
fn visible_to(my: &db::User) -> Filter {
    Filter {
        creator: (my.role != Role::Support).then_some(my.id),
        ..Filter::default()
    }
}

/// Empty means absent.
fn parse_count(s: &str) -> Result<Option<usize>, std::num::ParseIntError> {
    match s.trim() {
        "" => Ok(None),
        s => s.parse().map(Some),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Accepts a calendar date, due at midnight UTC, or a full RFC 3339
/// timestamp.
fn parse_due_date(s: &str) -> Option<OffsetDateTime> {
    let date = format_description!("[year]-[month]-[day]");
    Date::parse(s, date)
        .map(|d| d.midnight().assume_utc())
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok()
}
