//! Process-local [`Store`], used by the test suite and for running the
//! service without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    ticket::{self, DisplayId},
    user, Comment, Error, Store, Ticket, User,
};

#[derive(Default)]
pub struct Memory {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<user::Id, User>,
    tickets: HashMap<ticket::Id, Ticket>,
    ticket_count: u64,
}

impl Inner {
    /// Matching tickets, newest first.
    fn select<'a>(&'a self, filter: &'a ticket::Filter) -> Vec<&'a Ticket> {
        let mut tickets = self
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .collect::<Vec<_>>();
        tickets.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.number.cmp(&a.number))
        });
        tickets
    }
}

#[async_trait]
impl Store for Memory {
    async fn create_user(&self, user: &User) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(Error::EmailTaken);
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user_by_id(
        &self,
        id: user::Id,
    ) -> Result<Option<User>, Error> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn next_ticket_number(&self) -> Result<DisplayId, Error> {
        let mut inner = self.inner.write().await;
        inner.ticket_count += 1;
        Ok(DisplayId::from(inner.ticket_count))
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<bool, Error> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.tickets.get_mut(&ticket.id) else {
            return Ok(false);
        };
        *stored = Ticket {
            number: stored.number,
            creator: stored.creator,
            creator_email: stored.creator_email.clone(),
            comments: std::mem::take(&mut stored.comments),
            created_at: stored.created_at,
            ..ticket.clone()
        };
        Ok(true)
    }

    async fn get_ticket_by_id(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Error> {
        Ok(self.inner.read().await.tickets.get(&id).cloned())
    }

    async fn find_tickets(
        &self,
        filter: &ticket::Filter,
        page: ticket::Page,
    ) -> Result<Vec<Ticket>, Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .select(filter)
            .into_iter()
            .skip(page.offset)
            .take(page.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_tickets(
        &self,
        filter: &ticket::Filter,
    ) -> Result<usize, Error> {
        let inner = self.inner.read().await;
        Ok(inner.tickets.values().filter(|t| filter.matches(t)).count())
    }

    async fn append_comment(
        &self,
        id: ticket::Id,
        comment: &Comment,
    ) -> Result<bool, Error> {
        let mut inner = self.inner.write().await;
        let Some(ticket) = inner.tickets.get_mut(&id) else {
            return Ok(false);
        };
        ticket.comments.push(comment.clone());
        ticket.updated_at = comment.timestamp;
        Ok(true)
    }

    async fn delete_ticket(&self, id: ticket::Id) -> Result<bool, Error> {
        Ok(self.inner.write().await.tickets.remove(&id).is_some())
    }
}
