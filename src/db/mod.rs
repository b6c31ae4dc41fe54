pub mod memory;
pub mod ticket;
pub mod user;

use async_trait::async_trait;
use tokio_postgres::{tls::NoTlsStream, NoTls, Socket};

pub use self::{
    memory::Memory,
    ticket::{Comment, Ticket},
    user::User,
};

pub type Connection = tokio_postgres::Connection<Socket, NoTlsStream>;

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("postgres: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Another user already registered with this email.
    #[error("email is already registered")]
    EmailTaken,
}

/// Storage backing users, tickets and the ticket number counter.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`Error::EmailTaken`] if the email is already registered.
    async fn create_user(&self, user: &User) -> Result<(), Error>;

    async fn get_user_by_id(
        &self,
        id: user::Id,
    ) -> Result<Option<User>, Error>;

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, Error>;

    /// Atomically increments the ticket counter and returns the new value.
    ///
    /// Concurrent callers never observe the same number.
    async fn next_ticket_number(&self) -> Result<ticket::DisplayId, Error>;

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), Error>;

    /// Overwrites the editable fields of an existing ticket, leaving its
    /// comments, number, creator and creation time alone. Returns `false`
    /// if there is no such ticket.
    async fn update_ticket(&self, ticket: &Ticket) -> Result<bool, Error>;

    async fn get_ticket_by_id(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Error>;

    /// Newest tickets first.
    async fn find_tickets(
        &self,
        filter: &ticket::Filter,
        page: ticket::Page,
    ) -> Result<Vec<Ticket>, Error>;

    async fn count_tickets(
        &self,
        filter: &ticket::Filter,
    ) -> Result<usize, Error>;

    /// Appends to the ticket's comments and bumps its `updated_at` to the
    /// comment's timestamp. Returns `false` if there is no such ticket.
    async fn append_comment(
        &self,
        id: ticket::Id,
        comment: &Comment,
    ) -> Result<bool, Error>;

    /// Returns `false` if there is no such ticket.
    async fn delete_ticket(&self, id: ticket::Id) -> Result<bool, Error>;
}

pub async fn connect(
    url: &str,
) -> Result<(Postgres, Connection), tokio_postgres::Error> {
    tokio_postgres::connect(url, NoTls)
        .await
        .map(|(client, connection)| (Postgres { client }, connection))
}

pub struct Postgres {
    client: tokio_postgres::Client,
}

impl Postgres {
    /// Creates the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), Error> {
        self.client.batch_execute(SCHEMA).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for Postgres {
    async fn create_user(&self, user: &User) -> Result<(), Error> {
        self.insert_user(user).await
    }

    async fn get_user_by_id(
        &self,
        id: user::Id,
    ) -> Result<Option<User>, Error> {
        self.select_user_by_id(id).await
    }

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, Error> {
        self.select_user_by_email(email).await
    }

    async fn next_ticket_number(&self) -> Result<ticket::DisplayId, Error> {
        self.increment_counter().await.map(ticket::DisplayId::from)
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), Error> {
        self.insert_ticket_row(ticket).await
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<bool, Error> {
        self.update_ticket_row(ticket).await
    }

    async fn get_ticket_by_id(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Error> {
        self.select_ticket_by_id(id).await
    }

    async fn find_tickets(
        &self,
        filter: &ticket::Filter,
        page: ticket::Page,
    ) -> Result<Vec<Ticket>, Error> {
        self.select_tickets(filter, page).await
    }

    async fn count_tickets(
        &self,
        filter: &ticket::Filter,
    ) -> Result<usize, Error> {
        self.count_tickets_where(filter).await
    }

    async fn append_comment(
        &self,
        id: ticket::Id,
        comment: &Comment,
    ) -> Result<bool, Error> {
        self.push_comment(id, comment).await
    }

    async fn delete_ticket(&self, id: ticket::Id) -> Result<bool, Error> {
        self.remove_ticket(id).await
    }
}
